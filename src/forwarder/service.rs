//! Forwarding service
//!
//! Process-level composition: owns the settings, the wallet handle, the
//! event source and the subscription of the payment listener.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{info, warn};

use super::barrier::FaultBarrier;
use super::listener::IncomingPaymentListener;
use super::types::{ForwardStatsSnapshot, ForwarderSettings};
use super::waiter::ConfirmationTracker;
use crate::error::{Error, Result};
use crate::wallet::{SubscriptionHandle, TransactionSource, Wallet};

pub struct ForwardingService {
    settings: ForwarderSettings,
    wallet: Arc<dyn Wallet>,
    source: Arc<dyn TransactionSource>,
    tracker: Arc<ConfirmationTracker>,
    barrier: FaultBarrier,
    listener: Option<Arc<IncomingPaymentListener>>,
    subscription: Option<SubscriptionHandle>,
}

impl ForwardingService {
    pub fn new(
        settings: ForwarderSettings,
        wallet: Arc<dyn Wallet>,
        source: Arc<dyn TransactionSource>,
        tracker: Arc<ConfirmationTracker>,
    ) -> Result<Self> {
        if settings.destination == wallet.receive_address() {
            return Err(Error::Config(format!(
                "Destination {} is the wallet's own address; forwarding would loop",
                settings.destination
            )));
        }

        Ok(Self {
            settings,
            wallet,
            source,
            tracker,
            barrier: FaultBarrier::new(),
            listener: None,
            subscription: None,
        })
    }

    /// Subscribe the payment listener. Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.subscription.is_some() {
            return Err(Error::Internal("Forwarding service already running".to_string()));
        }
        let runtime = Handle::try_current()
            .map_err(|e| Error::Internal(format!("No tokio runtime: {}", e)))?;

        let listener = Arc::new(IncomingPaymentListener::new(
            &self.settings,
            self.wallet.clone(),
            self.tracker.clone(),
            self.barrier.clone(),
            runtime,
        ));
        self.subscription = Some(self.source.subscribe(listener.clone()));
        self.listener = Some(listener);

        info!(
            "Forwarding payments to {} after {} confirmation(s), fee {} lamports",
            self.settings.destination, self.settings.confirmation_depth, self.settings.fee_lamports
        );
        info!(
            "Send SOL to {} to have it forwarded. Waiting for coins to arrive...",
            self.wallet.receive_address()
        );
        Ok(())
    }

    /// Unsubscribe, abandon pending waits, let fired forwards finish
    pub async fn shutdown(&mut self) -> ForwardStatsSnapshot {
        match self.subscription.take() {
            Some(subscription) => subscription.unsubscribe(),
            None => warn!("Shutdown requested but service was not running"),
        }

        self.tracker.abandon_all();

        let stats = match self.listener.take() {
            Some(listener) => {
                listener.shutdown().await;
                let unfinished = listener.unfinished_count();
                if unfinished > 0 {
                    warn!(
                        "{} received payment(s) were not forwarded before shutdown",
                        unfinished
                    );
                }
                listener.stats()
            }
            None => ForwardStatsSnapshot::default(),
        };

        info!(
            "Forwarder stopped: {} forwarded ({} lamports, {} in fees), {} failed",
            stats.forwarded, stats.forwarded_lamports, stats.fee_lamports, stats.failed
        );
        stats
    }

    /// Start, run until `shutdown_signal` completes, then shut down
    pub async fn run_until<F>(mut self, shutdown_signal: F) -> Result<ForwardStatsSnapshot>
    where
        F: Future<Output = ()>,
    {
        self.start()?;
        shutdown_signal.await;
        info!("Shutting down...");
        Ok(self.shutdown().await)
    }

    pub fn is_running(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn listener(&self) -> Option<&Arc<IncomingPaymentListener>> {
        self.listener.as_ref()
    }

    pub fn settings(&self) -> &ForwarderSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::ForwardState;
    use crate::wallet::memory::{incoming, wait_for_state, MemoryWallet};
    use crate::wallet::{Confirmations, EventDispatcher};
    use solana_sdk::pubkey::Pubkey;

    struct Harness {
        wallet: Arc<MemoryWallet>,
        dispatcher: Arc<EventDispatcher>,
        tracker: Arc<ConfirmationTracker>,
        service: ForwardingService,
    }

    fn harness(depth: u64, fee: u64) -> Harness {
        let wallet = Arc::new(MemoryWallet::new());
        let dispatcher = Arc::new(EventDispatcher::new());
        let tracker = Arc::new(ConfirmationTracker::new());
        let settings = ForwarderSettings {
            destination: Pubkey::new_unique(),
            confirmation_depth: depth,
            fee_lamports: fee,
        };
        let service = ForwardingService::new(
            settings,
            wallet.clone(),
            dispatcher.clone(),
            tracker.clone(),
        )
        .unwrap();
        Harness {
            wallet,
            dispatcher,
            tracker,
            service,
        }
    }

    #[test]
    fn test_rejects_own_address_as_destination() {
        let wallet = Arc::new(MemoryWallet::new());
        let settings = ForwarderSettings {
            destination: wallet.address(),
            confirmation_depth: 1,
            fee_lamports: 5_000,
        };
        let result = ForwardingService::new(
            settings,
            wallet,
            Arc::new(EventDispatcher::new()),
            Arc::new(ConfirmationTracker::new()),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_end_to_end_forward() {
        let mut h = harness(1, 1_000);
        h.service.start().unwrap();
        assert!(h.service.is_running());
        assert_eq!(h.dispatcher.subscriber_count(), 1);

        let tx = incoming(1, h.wallet.address(), 10_000);
        assert_eq!(h.dispatcher.dispatch(tx.clone()), 1);
        tokio::task::yield_now().await;
        assert!(h.wallet.sends().is_empty());

        h.tracker.observe(&tx.signature, Confirmations::Count(1));
        let listener = h.service.listener().unwrap().clone();
        wait_for_state(&listener, &tx.signature, ForwardState::Forwarded).await;

        let sends = h.wallet.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].lamports, 9_000);
        assert_eq!(sends[0].destination, h.service.settings().destination);

        // Further confirmations and re-delivery change nothing
        h.tracker.observe(&tx.signature, Confirmations::Finalized);
        h.dispatcher.dispatch(tx.clone());
        let stats = h.service.shutdown().await;
        assert_eq!(h.wallet.sends().len(), 1);
        assert_eq!(stats.forwarded, 1);
        assert_eq!(stats.forwarded_lamports, 9_000);
    }

    #[tokio::test]
    async fn test_no_forwarding_after_unsubscribe() {
        let mut h = harness(0, 1_000);
        h.service.start().unwrap();
        h.service.shutdown().await;

        assert!(!h.service.is_running());
        assert_eq!(h.dispatcher.subscriber_count(), 0);

        let tx = incoming(2, h.wallet.address(), 10_000);
        assert_eq!(h.dispatcher.dispatch(tx), 0);
        tokio::task::yield_now().await;
        assert!(h.wallet.sends().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_drops_pending_waiters() {
        let mut h = harness(2, 1_000);
        h.service.start().unwrap();
        let listener = h.service.listener().unwrap().clone();

        let tx = incoming(3, h.wallet.address(), 10_000);
        h.dispatcher.dispatch(tx.clone());
        assert_eq!(h.tracker.pending_count(), 1);

        let stats = h.service.shutdown().await;
        assert_eq!(h.tracker.pending_count(), 0);
        assert_eq!(listener.in_flight(), 0);

        h.tracker.observe(&tx.signature, Confirmations::Count(2));
        tokio::task::yield_now().await;
        assert!(h.wallet.sends().is_empty());
        assert_eq!(stats.forwarded, 0);
        assert_eq!(
            listener.state(&tx.signature),
            Some(ForwardState::AwaitingConfirmation)
        );
    }

    #[tokio::test]
    async fn test_run_until_stops_on_signal() {
        let h = harness(0, 1_000);
        let dispatcher = h.dispatcher.clone();

        let stats = h.service.run_until(async {}).await.unwrap();

        assert_eq!(stats, ForwardStatsSnapshot::default());
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut h = harness(1, 1_000);
        h.service.start().unwrap();
        assert!(h.service.start().is_err());
        h.service.shutdown().await;
    }
}
