//! Confirmation waiter
//!
//! Registrations are cheap: a oneshot sender parked in a map keyed by
//! signature. The chain client reports confirmation progress through
//! [`ConfirmationTracker::observe`]; registrations whose depth is reached are
//! fired and removed. No task or thread is held per pending transaction.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use dashmap::DashMap;
use solana_sdk::signature::Signature;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, info};

use crate::wallet::Confirmations;

/// How a confirmation wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Requested depth reached; carries the observed state
    Reached(Confirmations),
    /// Tracker shut down before the depth was reached
    Abandoned,
}

struct Registration {
    depth: u64,
    sender: oneshot::Sender<Confirmations>,
}

/// Single-fire completion signal for one registration
#[derive(Debug)]
pub struct ConfirmationSignal {
    receiver: oneshot::Receiver<Confirmations>,
}

impl ConfirmationSignal {
    /// Non-blocking check; `None` while still waiting
    pub fn try_outcome(&mut self) -> Option<WaitOutcome> {
        match self.receiver.try_recv() {
            Ok(confirmations) => Some(WaitOutcome::Reached(confirmations)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(WaitOutcome::Abandoned),
        }
    }
}

impl Future for ConfirmationSignal {
    type Output = WaitOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|result| match result {
            Ok(confirmations) => WaitOutcome::Reached(confirmations),
            Err(_) => WaitOutcome::Abandoned,
        })
    }
}

/// Registry of pending confirmation waits
#[derive(Default)]
pub struct ConfirmationTracker {
    pending: DashMap<Signature, Vec<Registration>>,
    closed: AtomicBool,
}

impl ConfirmationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `signature` reaching `depth` confirmations
    ///
    /// Depth 0 fires immediately. Every call gets its own signal, even for the
    /// same signature.
    pub fn await_depth(&self, signature: Signature, depth: u64) -> ConfirmationSignal {
        let (sender, receiver) = oneshot::channel();
        let signal = ConfirmationSignal { receiver };

        if depth == 0 {
            let _ = sender.send(Confirmations::Unseen);
            return signal;
        }

        if self.closed.load(Ordering::Acquire) {
            // Dropping the sender resolves the signal as abandoned
            return signal;
        }

        self.pending
            .entry(signature)
            .or_default()
            .push(Registration { depth, sender });

        // Lost a race with abandon_all
        if self.closed.load(Ordering::Acquire) {
            self.pending.remove(&signature);
        }

        signal
    }

    /// Report the current confirmation state of `signature`
    ///
    /// Returns how many registrations fired.
    pub fn observe(&self, signature: &Signature, confirmations: Confirmations) -> usize {
        let mut fired = 0;

        self.pending.remove_if_mut(signature, |_, registrations| {
            let mut still_waiting = Vec::with_capacity(registrations.len());
            for registration in registrations.drain(..) {
                if confirmations.reaches(registration.depth) {
                    // Receiver may be gone if its task was cancelled
                    let _ = registration.sender.send(confirmations);
                    fired += 1;
                } else {
                    still_waiting.push(registration);
                }
            }
            *registrations = still_waiting;
            registrations.is_empty()
        });

        if fired > 0 {
            info!(
                "Transaction {} reached {}, {} waiter(s) released",
                signature, confirmations, fired
            );
        } else if self.pending.contains_key(signature) {
            debug!("Confidence of {} changed, is now: {}", signature, confirmations);
        }

        fired
    }

    /// Signatures with at least one pending registration
    pub fn pending_signatures(&self) -> Vec<Signature> {
        self.pending.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of pending registrations across all signatures
    pub fn pending_count(&self) -> usize {
        self.pending.iter().map(|entry| entry.value().len()).sum()
    }

    /// Drop every pending registration; their signals resolve as abandoned
    pub fn abandon_all(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let abandoned = self.pending_count();
        self.pending.clear();
        if abandoned > 0 {
            info!("Abandoned {} pending confirmation wait(s)", abandoned);
        }
        abandoned
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    fn sig(byte: u8) -> Signature {
        Signature::from([byte; 64])
    }

    #[test]
    fn test_depth_zero_fires_immediately() {
        let tracker = ConfirmationTracker::new();
        let mut signal = tracker.await_depth(sig(1), 0);

        assert_eq!(
            signal.try_outcome(),
            Some(WaitOutcome::Reached(Confirmations::Unseen))
        );
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_fires_only_once_depth_is_reached() {
        let tracker = ConfirmationTracker::new();
        let mut signal = task::spawn(tracker.await_depth(sig(2), 3));

        assert_pending!(signal.poll());
        assert_eq!(tracker.observe(&sig(2), Confirmations::Unseen), 0);
        assert_eq!(tracker.observe(&sig(2), Confirmations::Count(2)), 0);
        assert_pending!(signal.poll());

        assert_eq!(tracker.observe(&sig(2), Confirmations::Count(3)), 1);
        assert!(signal.is_woken());
        assert_ready_eq!(
            signal.poll(),
            WaitOutcome::Reached(Confirmations::Count(3))
        );
        assert!(tracker.pending_signatures().is_empty());
    }

    #[test]
    fn test_fires_exactly_once() {
        let tracker = ConfirmationTracker::new();
        let mut signal = tracker.await_depth(sig(3), 1);

        assert_eq!(tracker.observe(&sig(3), Confirmations::Count(1)), 1);
        // Dropped out and back in: nothing left to fire
        assert_eq!(tracker.observe(&sig(3), Confirmations::Unseen), 0);
        assert_eq!(tracker.observe(&sig(3), Confirmations::Count(5)), 0);

        assert_eq!(
            signal.try_outcome(),
            Some(WaitOutcome::Reached(Confirmations::Count(1)))
        );
    }

    #[test]
    fn test_finalized_satisfies_any_depth() {
        let tracker = ConfirmationTracker::new();
        let mut signal = tracker.await_depth(sig(4), 500);

        assert_eq!(tracker.observe(&sig(4), Confirmations::Finalized), 1);
        assert_eq!(
            signal.try_outcome(),
            Some(WaitOutcome::Reached(Confirmations::Finalized))
        );
    }

    #[test]
    fn test_independent_waiters_on_same_signature() {
        let tracker = ConfirmationTracker::new();
        let mut shallow = tracker.await_depth(sig(5), 1);
        let mut deep = tracker.await_depth(sig(5), 2);
        let mut twin = tracker.await_depth(sig(5), 1);
        assert_eq!(tracker.pending_count(), 3);

        assert_eq!(tracker.observe(&sig(5), Confirmations::Count(1)), 2);
        assert!(shallow.try_outcome().is_some());
        assert!(twin.try_outcome().is_some());
        assert_eq!(deep.try_outcome(), None);
        assert_eq!(tracker.pending_signatures(), vec![sig(5)]);

        assert_eq!(tracker.observe(&sig(5), Confirmations::Count(2)), 1);
        assert!(deep.try_outcome().is_some());
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_unrelated_signature_is_untouched() {
        let tracker = ConfirmationTracker::new();
        let mut signal = tracker.await_depth(sig(6), 1);

        assert_eq!(tracker.observe(&sig(7), Confirmations::Finalized), 0);
        assert_eq!(signal.try_outcome(), None);
    }

    #[tokio::test]
    async fn test_abandon_all_resolves_signals() {
        let tracker = ConfirmationTracker::new();
        let first = tracker.await_depth(sig(8), 1);
        let second = tracker.await_depth(sig(9), 6);

        assert_eq!(tracker.abandon_all(), 2);
        assert!(tracker.is_closed());
        assert_eq!(first.await, WaitOutcome::Abandoned);
        assert_eq!(second.await, WaitOutcome::Abandoned);

        // Later registrations are abandoned straight away, depth 0 still fires
        let late = tracker.await_depth(sig(10), 1);
        assert_eq!(late.await, WaitOutcome::Abandoned);
        let immediate = tracker.await_depth(sig(10), 0);
        assert_eq!(
            immediate.await,
            WaitOutcome::Reached(Confirmations::Unseen)
        );
        assert_eq!(tracker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_signal_resolves_across_tasks() {
        let tracker = std::sync::Arc::new(ConfirmationTracker::new());
        let signal = tracker.await_depth(sig(11), 2);

        let waiter = tokio::spawn(signal);
        tokio::task::yield_now().await;
        tracker.observe(&sig(11), Confirmations::Count(2));

        assert_eq!(
            waiter.await.unwrap(),
            WaitOutcome::Reached(Confirmations::Count(2))
        );
    }
}
