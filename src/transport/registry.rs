//! Subscription registry.
//!
//! Binds handlers to broker subscriptions and keeps every live binding under
//! one mutex so the transport can tear them all down together.
//!
//! Each subscription runs a receive loop over its broker inbox. The loop
//! spawns one task per inbound message, so a slow or failing handler never
//! holds up delivery of the next message. The loop exits when the inbox
//! closes (unsubscribe or broker shutdown) or when the registry aborts it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::task::JoinHandle;

use super::dispatcher::dispatch;
use super::handler::HandlerPtr;
use crate::{
    // ---
    log_debug,
    log_warn,
    BrokerPtr,
    BrokerSubscription,
    Result,
    RpcError,
    SubscribeOptions,
    SubscriptionId,
};

/// Identifies a live subscription created by
/// [`Transport::subscribe`](crate::Transport::subscribe).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub subject: String,
    pub queue: Option<String>,
}

struct Entry {
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

/// Acquire a mutex guard, ignoring poisoning.
///
/// The entry list holds no invariants spanning multiple entries; the worst
/// outcome of a poisoned lock is a subscription that is torn down late.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) struct Registry {
    // ---
    broker: BrokerPtr,
    entries: Mutex<Vec<Entry>>,
    closed: AtomicBool,
}

impl Registry {
    // ---
    pub(crate) fn new(broker: BrokerPtr) -> Self {
        Self {
            broker,
            entries: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) async fn subscribe(
        &self,
        subject: &str,
        handler: HandlerPtr,
        opts: SubscribeOptions,
    ) -> Result<SubscriptionHandle> {
        // ---
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::ConnectionClosed);
        }

        let sub = self
            .broker
            .subscribe(subject, opts.queue_group.as_deref())
            .await?;

        let handle = SubscriptionHandle {
            id: sub.id,
            subject: sub.subject.clone(),
            queue: sub.queue.clone(),
        };
        let task = spawn_receive_loop(self.broker.clone(), handler, sub);

        {
            let mut entries = lock_ignore_poison(&self.entries);
            if !self.closed.load(Ordering::Acquire) {
                entries.push(Entry {
                    handle: handle.clone(),
                    task,
                });
                log_debug!(
                    "{}: subscribed {} subject={} queue={:?}",
                    self.broker.name(),
                    handle.id,
                    handle.subject,
                    handle.queue
                );
                return Ok(handle);
            }
            task.abort();
        }

        // Lost the race against close(); the broker is already shutting down.
        if let Err(_err) = self.broker.unsubscribe(handle.id).await {
            log_warn!(
                "{}: unsubscribe {} subject={} failed after close: {_err}",
                self.broker.name(),
                handle.id,
                handle.subject
            );
        }
        Err(RpcError::ConnectionClosed)
    }

    /// Remove one subscription. Unknown handles are ignored.
    pub(crate) async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        // ---
        let entry = {
            let mut entries = lock_ignore_poison(&self.entries);
            entries
                .iter()
                .position(|e| e.handle.id == handle.id)
                .map(|idx| entries.swap_remove(idx))
        };

        let Some(entry) = entry else {
            return Ok(());
        };

        let result = self.broker.unsubscribe(entry.handle.id).await;
        entry.task.abort();
        result
    }

    pub(crate) fn handles(&self) -> Vec<SubscriptionHandle> {
        lock_ignore_poison(&self.entries)
            .iter()
            .map(|e| e.handle.clone())
            .collect()
    }

    /// Tear down every subscription, then release the broker connection.
    ///
    /// Individual unsubscribe failures are logged and skipped. Only the first
    /// call does any work.
    pub(crate) async fn close(&self) -> Result<()> {
        // ---
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let entries = std::mem::take(&mut *lock_ignore_poison(&self.entries));
        for entry in entries {
            entry.task.abort();
            if let Err(_err) = self.broker.unsubscribe(entry.handle.id).await {
                log_warn!(
                    "{}: unsubscribe {} subject={} failed during close: {_err}",
                    self.broker.name(),
                    entry.handle.id,
                    entry.handle.subject
                );
            }
        }

        self.broker.close().await
    }
}

fn spawn_receive_loop(
    broker: BrokerPtr,
    handler: HandlerPtr,
    mut sub: BrokerSubscription,
) -> JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        // ---
        while let Some(raw) = sub.inbox.recv().await {
            tokio::spawn(dispatch(broker.clone(), handler.clone(), raw));
        }
        log_debug!(
            "{}: subscription {} subject={} closed",
            broker.name(),
            sub.id,
            sub.subject
        );
    })
}
