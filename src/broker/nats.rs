//! NATS broker implementation using `async-nats`.
//!
//! Maps the domain [`Broker`] operations one-to-one onto the NATS client:
//!
//! - `publish` → `publish` / `publish_with_reply`
//! - `request` → `send_request` with a per-call timeout; the client owns the
//!   reply inbox and correlation
//! - `subscribe` → `subscribe` / `queue_subscribe`
//!
//! Each subscription gets a forwarding task that moves messages from the NATS
//! subscriber stream into the domain inbox channel. `unsubscribe` signals the
//! task, which unsubscribes from the server and exits.
//!
//! Both `TimedOut` and `NoResponders` request failures surface as
//! [`RpcError::Timeout`]: the caller observes the same outcome it would get
//! from a subject without subscribers on a broker lacking no-responder
//! notifications.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_nats::{Client, RequestErrorKind};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    log_info,
    log_warn,
    Broker,
    BrokerPtr,
    BrokerSubscription,
    RawMessage,
    Result,
    RpcError,
    SubscriptionId,
    TransportConfig,
};

const INBOX_CAPACITY: usize = 1024;

struct Forwarder {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// NATS-backed implementation of the [`Broker`] trait.
pub struct NatsBroker {
    // ---
    name: String,
    client: Client,
    next_id: AtomicU64,
    forwarders: Mutex<HashMap<SubscriptionId, Forwarder>>,
    closed: AtomicBool,
}

impl NatsBroker {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(RpcError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl Broker for NatsBroker {
    // ---
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, subject: &str, reply: Option<&str>, data: Bytes) -> Result<()> {
        // ---
        self.ensure_open()?;

        let sent = match reply {
            Some(reply) => {
                self.client
                    .publish_with_reply(subject.to_string(), reply.to_string(), data)
                    .await
            }
            None => self.client.publish(subject.to_string(), data).await,
        };
        sent.map_err(|e| RpcError::Transport(e.to_string()))
    }

    async fn request(&self, subject: &str, data: Bytes, timeout: Duration) -> Result<RawMessage> {
        // ---
        self.ensure_open()?;

        let request = async_nats::Request::new().payload(data).timeout(Some(timeout));

        let msg = self
            .client
            .send_request(subject.to_string(), request)
            .await
            .map_err(|e| match e.kind() {
                RequestErrorKind::TimedOut | RequestErrorKind::NoResponders => RpcError::Timeout,
                _ => RpcError::Transport(e.to_string()),
            })?;

        Ok(RawMessage {
            subject: msg.subject.to_string(),
            reply: msg.reply.map(|r| r.to_string()),
            queue: None,
            data: msg.payload,
        })
    }

    async fn subscribe(&self, subject: &str, queue: Option<&str>) -> Result<BrokerSubscription> {
        // ---
        self.ensure_open()?;

        let mut subscriber = match queue {
            Some(group) => {
                self.client
                    .queue_subscribe(subject.to_string(), group.to_string())
                    .await
            }
            None => self.client.subscribe(subject.to_string()).await,
        }
        .map_err(|e| RpcError::Transport(e.to_string()))?;

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let queue_name = queue.map(str::to_string);
        let group = queue_name.clone();
        let name = self.name.clone();

        let task = tokio::spawn(async move {
            // ---
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        if let Err(_err) = subscriber.unsubscribe().await {
                            log_warn!("{name}: unsubscribe {id} failed: {_err}");
                        }
                        break;
                    }
                    next = subscriber.next() => {
                        let Some(msg) = next else { break };
                        let raw = RawMessage {
                            subject: msg.subject.to_string(),
                            reply: msg.reply.map(|r| r.to_string()),
                            queue: group.clone(),
                            data: msg.payload,
                        };
                        if tx.send(raw).await.is_err() {
                            break;
                        }
                    }
                }
            }
            log_debug!("{name}: forwarder for {id} stopped");
        });

        lock_ignore_poison(&self.forwarders).insert(id, Forwarder { stop: stop_tx, task });

        Ok(BrokerSubscription {
            id,
            subject: subject.to_string(),
            queue: queue_name,
            inbox: rx,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        // ---
        let forwarder = lock_ignore_poison(&self.forwarders).remove(&id);
        if let Some(forwarder) = forwarder {
            let _ = forwarder.stop.send(());
            let _ = forwarder.task.await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // ---
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let forwarders: Vec<Forwarder> = lock_ignore_poison(&self.forwarders)
            .drain()
            .map(|(_, f)| f)
            .collect();
        for forwarder in forwarders {
            let _ = forwarder.stop.send(());
            let _ = forwarder.task.await;
        }

        // Flushes pending publishes, then shuts the connection down.
        self.client
            .drain()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        log_info!("{}: nats connection closed", self.name);
        Ok(())
    }
}

/// Connect to a NATS server and return a broker.
///
/// # Errors
///
/// Returns [`RpcError::Transport`] if the connection cannot be established.
pub async fn create_nats_broker(uri: &str, config: &TransportConfig) -> Result<BrokerPtr> {
    // ---
    let client = async_nats::connect(uri)
        .await
        .map_err(|e| RpcError::Transport(format!("connect {uri}: {e}")))?;

    log_info!("{}: connected to {uri}", config.name);

    Ok(Arc::new(NatsBroker {
        name: config.name.clone(),
        client,
        next_id: AtomicU64::new(1),
        forwarders: Mutex::new(HashMap::new()),
        closed: AtomicBool::new(false),
    }))
}
