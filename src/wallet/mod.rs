//! Wallet / chain client module
//!
//! Everything the forwarder needs from the outside world, behind three seams:
//! - [`Wallet`]: receive address, value credited by a transaction, sending
//! - [`TransactionSource`]: subscription to "transaction received" events
//! - [`TransactionReceivedHandler`]: the capability a subscriber implements
//!
//! # Architecture
//!
//! ```text
//! AddressWatcher ──(ObservedTransaction)──▶ EventDispatcher ──▶ subscribers
//!       │
//!       └──(signature statuses)──▶ ConfirmationTracker
//!
//! RpcWallet / DryRunWallet ◀── send_payment
//! ```

pub mod credentials;
pub mod dry_run;
pub mod events;
#[cfg(test)]
pub mod memory;
pub mod rpc;
pub mod types;
pub mod watcher;

use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::error::Result;

pub use credentials::load_keypair;
pub use dry_run::DryRunWallet;
pub use events::EventDispatcher;
pub use rpc::RpcWallet;
pub use types::{Confirmations, ObservedTransaction, SendResult};
pub use watcher::AddressWatcher;

/// The wallet the forwarder receives into and sends from
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Address operators fund
    fn receive_address(&self) -> Pubkey;

    /// Lamports credited to this wallet by `tx`
    fn value_received(&self, tx: &ObservedTransaction) -> u64 {
        tx.credited_to(&self.receive_address())
    }

    /// Send `lamports` to `destination`
    async fn send_payment(&self, destination: &Pubkey, lamports: u64) -> Result<SendResult>;
}

/// Capability invoked for each transaction the wallet receives
pub trait TransactionReceivedHandler: Send + Sync {
    fn on_transaction_received(&self, tx: ObservedTransaction) -> Result<()>;
}

/// Source of "transaction received" events
pub trait TransactionSource: Send + Sync {
    /// Register `handler`; notifications stop once the handle is released
    fn subscribe(&self, handler: Arc<dyn TransactionReceivedHandler>) -> SubscriptionHandle;
}

/// Live registration of a handler with a [`TransactionSource`]
///
/// Released by [`SubscriptionHandle::unsubscribe`] or on drop.
pub struct SubscriptionHandle {
    id: u64,
    release: Option<Box<dyn FnOnce(u64) + Send + Sync>>,
}

impl SubscriptionHandle {
    pub fn new(id: u64, release: impl FnOnce(u64) + Send + Sync + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop future notifications
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("active", &self.release.is_some())
            .finish()
    }
}
