//! Transaction-received event dispatch
//!
//! Subscribers are called one after another on the dispatching task. Every
//! call goes through the fault barrier; a failing subscriber is logged and
//! skipped so the remaining subscribers (and the dispatcher) keep running.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::{ObservedTransaction, SubscriptionHandle, TransactionReceivedHandler, TransactionSource};
use crate::forwarder::FaultBarrier;

type Subscribers = DashMap<u64, Arc<dyn TransactionReceivedHandler>>;

/// In-process [`TransactionSource`]
pub struct EventDispatcher {
    subscribers: Arc<Subscribers>,
    next_id: AtomicU64,
    barrier: FaultBarrier,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::with_barrier(FaultBarrier::new())
    }

    pub fn with_barrier(barrier: FaultBarrier) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            barrier,
        }
    }

    /// Deliver `tx` to every current subscriber
    ///
    /// Returns the number of subscribers that handled it without failing.
    pub fn dispatch(&self, tx: ObservedTransaction) -> usize {
        // Snapshot so no map guard is held while handlers run
        let subscribers: Vec<(u64, Arc<dyn TransactionReceivedHandler>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        if subscribers.is_empty() {
            debug!("No subscribers for transaction {}", tx.signature);
            return 0;
        }

        let mut delivered = 0;
        for (id, handler) in subscribers {
            let context = format!("transaction-received {} (subscriber {})", tx.signature, id);
            let event = tx.clone();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.barrier
                    .run(&context, || handler.on_transaction_received(event))
            }));

            match outcome {
                Ok(Ok(())) => delivered += 1,
                // Already logged by the barrier
                Ok(Err(_)) | Err(_) => {
                    warn!("Subscriber {} failed on {}, continuing", id, tx.signature)
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn barrier(&self) -> &FaultBarrier {
        &self.barrier
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionSource for EventDispatcher {
    fn subscribe(&self, handler: Arc<dyn TransactionReceivedHandler>) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, handler);
        debug!("Subscriber {} registered", id);

        let subscribers = Arc::downgrade(&self.subscribers);
        SubscriptionHandle::new(id, move |id| {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.remove(&id);
                debug!("Subscriber {} released", id);
            }
        })
    }
}
