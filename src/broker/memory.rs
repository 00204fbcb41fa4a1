//! In-memory broker implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! [`Broker`] trait. It is intended primarily for testing, local execution,
//! and as a reference for broker semantics.
//!
//! ## Reference Semantics
//!
//! - Once `subscribe()` returns successfully, messages published *after* that
//!   point on the same subject are deliverable.
//! - Subject matching is exact string equality; there are no wildcards.
//! - Subscribers without a queue group each receive every message.
//! - Within a queue group, each message goes to exactly one live member,
//!   chosen round-robin.
//! - `request()` uses a private `_INBOX.<uuid>` reply subject and waits for the
//!   first reply; with no responder it waits the full timeout.
//!
//! ## Non-Goals
//!
//! This broker does not attempt to emulate the failure modes, persistence,
//! or delivery guarantees of any specific broker.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::{
    // ---
    log_debug,
    Broker,
    BrokerPtr,
    BrokerSubscription,
    RawMessage,
    Result,
    RpcError,
    SubscriptionId,
    TransportConfig,
};

/// Per-subscription inbox depth.
const INBOX_CAPACITY: usize = 1024;

struct Entry {
    id: SubscriptionId,
    queue: Option<String>,
    tx: mpsc::Sender<RawMessage>,
}

/// Shared message bus for the in-memory broker.
///
/// All connections created on the same hub see each other's messages, exactly
/// as processes connected to one real broker would. Queue groups span
/// connections, so several connections on one hub model horizontally scaled
/// service instances.
///
/// For isolation between parallel tests, construct a hub explicitly and pass
/// it to [`create_memory_broker_with_hub`]:
///
/// ```
/// # use subject_rpc::{MemoryHub, Transport, TransportConfig};
/// # async fn example() -> subject_rpc::Result<()> {
/// let hub = MemoryHub::new();
///
/// let server = subject_rpc::create_memory_broker_with_hub(&TransportConfig::memory("server"), hub.clone()).await?;
/// let client = subject_rpc::create_memory_broker_with_hub(&TransportConfig::memory("client"), hub.clone()).await?;
///
/// let server = Transport::new(server, TransportConfig::memory("server"));
/// let client = Transport::new(client, TransportConfig::memory("client"));
/// # Ok(())
/// # }
/// ```
pub struct MemoryHub {
    // ---
    subscriptions: RwLock<HashMap<String, Vec<Entry>>>,
    next_id: AtomicU64,
    round_robin: AtomicUsize,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn publish(&self, conn: &str, subject: &str, reply: Option<&str>, data: Bytes) {
        // ---
        // Pick targets under the read lock, send after releasing it.
        let targets: Vec<(Option<String>, mpsc::Sender<RawMessage>)> = {
            let subs = self.subscriptions.read().await;
            let Some(entries) = subs.get(subject) else {
                log_debug!("{conn}: publish to {subject} with no subscribers");
                return;
            };

            let mut targets = Vec::new();
            let mut groups: HashMap<&str, Vec<&Entry>> = HashMap::new();

            for entry in entries.iter().filter(|e| !e.tx.is_closed()) {
                match entry.queue.as_deref() {
                    None => targets.push((None, entry.tx.clone())),
                    Some(group) => groups.entry(group).or_default().push(entry),
                }
            }

            for (group, members) in groups {
                let pick = self.round_robin.fetch_add(1, Ordering::Relaxed) % members.len();
                targets.push((Some(group.to_string()), members[pick].tx.clone()));
            }
            targets
        };

        log_debug!("{conn}: publish to {subject}, {} deliveries", targets.len());

        for (queue, tx) in targets {
            let msg = RawMessage {
                subject: subject.to_string(),
                reply: reply.map(str::to_string),
                queue,
                data: data.clone(),
            };
            // A closed channel means the subscription went away mid-publish.
            if tx.send(msg).await.is_err() {
                log_debug!("{conn}: dropped delivery on {subject}, inbox closed");
            }
        }
    }

    async fn subscribe(
        &self,
        conn: &str,
        subject: &str,
        queue: Option<&str>,
    ) -> BrokerSubscription {
        // ---
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        log_debug!("{conn}: subscribe {id} to {subject} queue={queue:?}");

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

        let mut subs = self.subscriptions.write().await;
        subs.entry(subject.to_string()).or_default().push(Entry {
            id,
            queue: queue.map(str::to_string),
            tx,
        });

        BrokerSubscription {
            id,
            subject: subject.to_string(),
            queue: queue.map(str::to_string),
            inbox: rx,
        }
    }

    async fn remove(&self, ids: &HashSet<SubscriptionId>) {
        // ---
        let mut subs = self.subscriptions.write().await;
        for entries in subs.values_mut() {
            entries.retain(|e| !ids.contains(&e.id));
        }
        subs.retain(|_, entries| !entries.is_empty());
    }

    /// Number of live subscriptions on `subject`.
    pub async fn subscriber_count(&self, subject: &str) -> usize {
        let subs = self.subscriptions.read().await;
        subs.get(subject)
            .map(|entries| entries.iter().filter(|e| !e.tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            round_robin: AtomicUsize::new(0),
        }
    }
}

/// Process-global hub used by [`create_memory_broker`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One connection to a [`MemoryHub`].
struct MemoryBroker {
    // ---
    name: String,
    hub: Arc<MemoryHub>,
    owned: Mutex<HashSet<SubscriptionId>>,
    closed: AtomicBool,
}

impl MemoryBroker {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(RpcError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl Broker for MemoryBroker {
    // ---
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, subject: &str, reply: Option<&str>, data: Bytes) -> Result<()> {
        // ---
        self.ensure_open()?;
        self.hub.publish(&self.name, subject, reply, data).await;
        Ok(())
    }

    async fn request(&self, subject: &str, data: Bytes, timeout: Duration) -> Result<RawMessage> {
        // ---
        self.ensure_open()?;

        let inbox = format!("_INBOX.{}", Uuid::new_v4().simple());
        let mut sub = self.hub.subscribe(&self.name, &inbox, None).await;

        self.hub.publish(&self.name, subject, Some(&inbox), data).await;

        let outcome = tokio::time::timeout(timeout, sub.inbox.recv()).await;

        // The inbox is private to this call; later replies have nowhere to go.
        self.hub.remove(&HashSet::from([sub.id])).await;

        match outcome {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(RpcError::ConnectionClosed),
            Err(_) => Err(RpcError::Timeout),
        }
    }

    async fn subscribe(&self, subject: &str, queue: Option<&str>) -> Result<BrokerSubscription> {
        // ---
        self.ensure_open()?;
        if subject.is_empty() {
            return Err(RpcError::InvalidSubject(subject.to_string()));
        }

        let sub = self.hub.subscribe(&self.name, subject, queue).await;
        lock_ignore_poison(&self.owned).insert(sub.id);
        Ok(sub)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        // ---
        self.ensure_open()?;
        lock_ignore_poison(&self.owned).remove(&id);
        self.hub.remove(&HashSet::from([id])).await;
        Ok(())
    }

    /// Close the connection.
    ///
    /// Removes every subscription this connection created; subscriptions of
    /// other connections on the same hub are untouched.
    async fn close(&self) -> Result<()> {
        // ---
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        log_debug!("{}: closing memory broker connection", self.name);

        let owned = std::mem::take(&mut *lock_ignore_poison(&self.owned));
        self.hub.remove(&owned).await;
        Ok(())
    }
}

/// Create a memory broker connection on the process-global hub.
///
/// All connections created with this function share a single message bus.
/// For isolated parallel testing, use [`create_memory_broker_with_hub`].
///
/// # Errors
///
/// Currently infallible; always returns `Ok`.
pub async fn create_memory_broker(config: &TransportConfig) -> Result<BrokerPtr> {
    create_memory_broker_with_hub(config, global_hub()).await
}

/// Create a memory broker connection on the provided hub.
///
/// # Errors
///
/// Currently infallible; always returns `Ok`.
pub async fn create_memory_broker_with_hub(
    config: &TransportConfig,
    hub: Arc<MemoryHub>,
) -> Result<BrokerPtr> {
    // ---
    log_debug!("{}: create memory broker", config.name);

    Ok(Arc::new(MemoryBroker {
        name: config.name.clone(),
        hub,
        owned: Mutex::new(HashSet::new()),
        closed: AtomicBool::new(false),
    }))
}
