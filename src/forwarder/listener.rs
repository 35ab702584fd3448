//! Incoming payment listener
//!
//! Per transaction: OBSERVED → AWAITING_CONFIRMATION → FORWARDED | FAILED.
//!
//! The receive callback only does bookkeeping: it records the signature
//! (insert-if-absent, which also deduplicates re-delivered events), registers
//! a confirmation wait and spawns a [`ForwardTask`]. The task sleeps on the
//! signal and performs the send inside the fault barrier.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::barrier::FaultBarrier;
use super::policy::ForwardingPolicy;
use super::types::{ForwardState, ForwardStats, ForwardStatsSnapshot, ForwarderSettings};
use super::waiter::{ConfirmationSignal, ConfirmationTracker, WaitOutcome};
use crate::error::{Error, Result};
use crate::wallet::{ObservedTransaction, SendResult, TransactionReceivedHandler, Wallet};

type StateMap = Arc<DashMap<Signature, ForwardState>>;

/// Forwards every payment credited to the wallet once it is deep enough
pub struct IncomingPaymentListener {
    wallet: Arc<dyn Wallet>,
    tracker: Arc<ConfirmationTracker>,
    policy: ForwardingPolicy,
    destination: Pubkey,
    confirmation_depth: u64,
    barrier: FaultBarrier,
    states: StateMap,
    stats: Arc<ForwardStats>,
    runtime: Handle,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl IncomingPaymentListener {
    /// Create a listener whose forward tasks run on `runtime`
    pub fn new(
        settings: &ForwarderSettings,
        wallet: Arc<dyn Wallet>,
        tracker: Arc<ConfirmationTracker>,
        barrier: FaultBarrier,
        runtime: Handle,
    ) -> Self {
        Self {
            wallet,
            tracker,
            policy: ForwardingPolicy::new(settings.fee_lamports),
            destination: settings.destination,
            confirmation_depth: settings.confirmation_depth,
            barrier,
            states: Arc::new(DashMap::new()),
            stats: Arc::new(ForwardStats::new()),
            runtime,
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Current state of a transaction, if it was ever observed
    pub fn state(&self, signature: &Signature) -> Option<ForwardState> {
        self.states.get(signature).map(|state| *state)
    }

    /// Number of transactions observed so far
    pub fn observed_count(&self) -> usize {
        self.states.len()
    }

    pub fn stats(&self) -> ForwardStatsSnapshot {
        self.stats.snapshot()
    }

    /// Observed transactions that were neither forwarded nor failed
    pub fn unfinished_count(&self) -> usize {
        self.states
            .iter()
            .filter(|entry| !entry.value().is_terminal())
            .count()
    }

    /// Forward tasks still running (waiting or sending)
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Stop waiting tasks and let tasks that already fired finish
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    fn spawn_forward(&self, signature: Signature, gross_lamports: u64, signal: ConfirmationSignal) {
        let task = ForwardTask {
            signature,
            gross_lamports,
            destination: self.destination,
            policy: self.policy,
            wallet: self.wallet.clone(),
            barrier: self.barrier.clone(),
            states: self.states.clone(),
            stats: self.stats.clone(),
        };
        let cancel = self.cancel.clone();
        self.tasks
            .spawn_on(task.run(signal, cancel), &self.runtime);
    }
}

impl TransactionReceivedHandler for IncomingPaymentListener {
    fn on_transaction_received(&self, tx: ObservedTransaction) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Shutdown);
        }

        let gross_lamports = self.wallet.value_received(&tx);
        if gross_lamports == 0 {
            debug!("Transaction {} credits nothing to us, ignoring", tx.signature);
            return Ok(());
        }

        match self.states.entry(tx.signature) {
            Entry::Occupied(existing) => {
                debug!(
                    "Duplicate receive event for {} (state {}), ignoring",
                    tx.signature,
                    existing.get()
                );
                return Ok(());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ForwardState::Observed);
            }
        }

        info!(
            "Received {} lamports in {} (slot {}), waiting for {} confirmation(s)",
            gross_lamports, tx.signature, tx.slot, self.confirmation_depth
        );

        let signal = self
            .tracker
            .await_depth(tx.signature, self.confirmation_depth);
        self.states
            .insert(tx.signature, ForwardState::AwaitingConfirmation);
        self.spawn_forward(tx.signature, gross_lamports, signal);

        Ok(())
    }
}

/// Continuation for one incoming transaction
///
/// Owns everything the forward needs so nothing is shared implicitly
/// between concurrent callbacks.
struct ForwardTask {
    signature: Signature,
    gross_lamports: u64,
    destination: Pubkey,
    policy: ForwardingPolicy,
    wallet: Arc<dyn Wallet>,
    barrier: FaultBarrier,
    states: StateMap,
    stats: Arc<ForwardStats>,
}

impl ForwardTask {
    async fn run(self, signal: ConfirmationSignal, cancel: CancellationToken) {
        let outcome = tokio::select! {
            biased;
            outcome = signal => outcome,
            _ = cancel.cancelled() => WaitOutcome::Abandoned,
        };

        let confirmations = match outcome {
            WaitOutcome::Reached(confirmations) => confirmations,
            WaitOutcome::Abandoned => {
                info!(
                    "Abandoned wait for {} ({} lamports not forwarded)",
                    self.signature, self.gross_lamports
                );
                return;
            }
        };

        debug!("{} is {}, forwarding", self.signature, confirmations);

        let context = format!("forward {}", self.signature);
        let policy = self.policy;
        let request = self
            .barrier
            .run(&context, || {
                policy.build_request(self.signature, self.gross_lamports, self.destination)
            });

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                self.fail(&e);
                return;
            }
        };

        info!(
            "Forwarding {} lamports ({} received, {} fee) from {} to {}",
            request.net_lamports(),
            request.gross_lamports(),
            request.fee_lamports(),
            self.signature,
            request.destination()
        );

        let sent: Result<SendResult> = self
            .barrier
            .run_async(
                &context,
                self.wallet
                    .send_payment(request.destination(), request.net_lamports()),
            )
            .await;

        match sent {
            Ok(result) => {
                self.states.insert(self.signature, ForwardState::Forwarded);
                self.stats.record_forward(&request);
                info!(
                    "Sent coins onwards! {} forwarded in {}",
                    self.signature, result.signature
                );
            }
            Err(e) => self.fail(&e),
        }
    }

    /// Mark the transaction FAILED; forwards are never retried
    fn fail(&self, e: &Error) {
        self.states.insert(self.signature, ForwardState::Failed);
        self.stats.record_failure();
        if e.is_transaction_scoped() {
            warn!("Forward of {} failed, not retrying: {}", self.signature, e);
        } else {
            // Service-level failure
            error!(
                kind = ?e.kind(),
                "Forward of {} aborted by a {:?} failure: {}",
                self.signature,
                e.kind(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::memory::{incoming, wait_for_state, MemoryWallet};
    use crate::wallet::Confirmations;

    fn listener_with(
        wallet: Arc<MemoryWallet>,
        depth: u64,
        fee: u64,
    ) -> (IncomingPaymentListener, Arc<ConfirmationTracker>, Pubkey) {
        let destination = Pubkey::new_unique();
        let tracker = Arc::new(ConfirmationTracker::new());
        let settings = ForwarderSettings {
            destination,
            confirmation_depth: depth,
            fee_lamports: fee,
        };
        let listener = IncomingPaymentListener::new(
            &settings,
            wallet,
            tracker.clone(),
            FaultBarrier::new(),
            Handle::current(),
        );
        (listener, tracker, destination)
    }

    #[tokio::test]
    async fn test_forwards_after_depth_reached() {
        let wallet = Arc::new(MemoryWallet::new());
        let (listener, tracker, destination) = listener_with(wallet.clone(), 1, 1_000);
        let tx = incoming(1, wallet.address(), 10_000);

        listener.on_transaction_received(tx.clone()).unwrap();
        assert_eq!(
            listener.state(&tx.signature),
            Some(ForwardState::AwaitingConfirmation)
        );

        // Seen but unconfirmed: nothing sent
        tracker.observe(&tx.signature, Confirmations::Count(0));
        tokio::task::yield_now().await;
        assert!(wallet.sends().is_empty());

        tracker.observe(&tx.signature, Confirmations::Count(1));
        wait_for_state(&listener, &tx.signature, ForwardState::Forwarded).await;

        let sends = wallet.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].destination, destination);
        assert_eq!(sends[0].lamports, 9_000);

        let stats = listener.stats();
        assert_eq!(stats.forwarded, 1);
        assert_eq!(stats.forwarded_lamports, 9_000);
        assert_eq!(stats.fee_lamports, 1_000);
    }

    #[tokio::test]
    async fn test_depth_zero_forwards_on_receipt() {
        let wallet = Arc::new(MemoryWallet::new());
        let (listener, _tracker, _) = listener_with(wallet.clone(), 0, 5_000);
        let tx = incoming(2, wallet.address(), 20_000);

        listener.on_transaction_received(tx.clone()).unwrap();
        wait_for_state(&listener, &tx.signature, ForwardState::Forwarded).await;

        assert_eq!(wallet.sends()[0].lamports, 15_000);
    }

    #[tokio::test]
    async fn test_duplicate_events_forward_once() {
        let wallet = Arc::new(MemoryWallet::new());
        let (listener, tracker, _) = listener_with(wallet.clone(), 1, 1_000);
        let tx = incoming(3, wallet.address(), 10_000);

        listener.on_transaction_received(tx.clone()).unwrap();
        listener.on_transaction_received(tx.clone()).unwrap();
        assert_eq!(tracker.pending_count(), 1);

        tracker.observe(&tx.signature, Confirmations::Count(1));
        wait_for_state(&listener, &tx.signature, ForwardState::Forwarded).await;

        // Re-delivery after forwarding is ignored as well
        listener.on_transaction_received(tx.clone()).unwrap();
        listener.shutdown().await;

        assert_eq!(wallet.sends().len(), 1);
        assert_eq!(listener.observed_count(), 1);
    }

    #[tokio::test]
    async fn test_ignores_transactions_that_credit_nothing() {
        let wallet = Arc::new(MemoryWallet::new());
        let (listener, tracker, _) = listener_with(wallet.clone(), 1, 1_000);
        let tx = incoming(4, Pubkey::new_unique(), 10_000);

        listener.on_transaction_received(tx.clone()).unwrap();

        assert_eq!(listener.state(&tx.signature), None);
        assert_eq!(tracker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_amount_below_fee_fails_without_sending() {
        let wallet = Arc::new(MemoryWallet::new());
        let (listener, _tracker, _) = listener_with(wallet.clone(), 0, 1_000);
        let tx = incoming(5, wallet.address(), 800);

        listener.on_transaction_received(tx.clone()).unwrap();
        wait_for_state(&listener, &tx.signature, ForwardState::Failed).await;

        assert!(wallet.sends().is_empty());
        assert_eq!(listener.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_send_failure_does_not_block_other_forwards() {
        let wallet = Arc::new(MemoryWallet::new());
        // Net amount of the first transaction
        wallet.fail_sends_of(6_000);
        let (listener, tracker, _) = listener_with(wallet.clone(), 2, 1_000);

        let doomed = incoming(6, wallet.address(), 7_000);
        let healthy = incoming(7, wallet.address(), 10_000);
        listener.on_transaction_received(doomed.clone()).unwrap();
        listener.on_transaction_received(healthy.clone()).unwrap();

        tracker.observe(&doomed.signature, Confirmations::Count(2));
        tracker.observe(&healthy.signature, Confirmations::Count(2));

        wait_for_state(&listener, &doomed.signature, ForwardState::Failed).await;
        wait_for_state(&listener, &healthy.signature, ForwardState::Forwarded).await;

        let sends = wallet.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].lamports, 9_000);
        assert_eq!(listener.stats().failed, 1);
        assert_eq!(listener.stats().forwarded, 1);
    }

    #[tokio::test]
    async fn test_wallet_level_failure_marks_failed() {
        let wallet = Arc::new(MemoryWallet::new());
        wallet.fail_all_sends();
        let (listener, _tracker, _) = listener_with(wallet.clone(), 0, 1_000);
        let tx = incoming(10, wallet.address(), 10_000);

        listener.on_transaction_received(tx.clone()).unwrap();
        wait_for_state(&listener, &tx.signature, ForwardState::Failed).await;

        assert!(wallet.sends().is_empty());
        assert_eq!(listener.stats().failed, 1);
        assert_eq!(listener.unfinished_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_abandons_pending_waits() {
        let wallet = Arc::new(MemoryWallet::new());
        let (listener, tracker, _) = listener_with(wallet.clone(), 3, 1_000);
        let tx = incoming(8, wallet.address(), 10_000);

        listener.on_transaction_received(tx.clone()).unwrap();
        assert_eq!(listener.in_flight(), 1);

        listener.shutdown().await;
        assert_eq!(listener.in_flight(), 0);
        assert_eq!(listener.unfinished_count(), 1);

        // Confirmation arriving after shutdown changes nothing
        tracker.observe(&tx.signature, Confirmations::Finalized);
        tokio::task::yield_now().await;

        assert!(wallet.sends().is_empty());
        assert_eq!(
            listener.state(&tx.signature),
            Some(ForwardState::AwaitingConfirmation)
        );
        assert!(matches!(
            listener.on_transaction_received(incoming(9, wallet.address(), 10_000)),
            Err(Error::Shutdown)
        ));
    }
}
