//! Wallet data types shared between the chain client and the forwarder

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

/// A transaction touching the watched wallet, as reported by the chain client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedTransaction {
    /// Transaction signature (unique transaction id)
    pub signature: Signature,
    /// Slot the transaction landed in
    pub slot: u64,
    /// All accounts referenced by the transaction, in message order
    pub account_keys: Vec<Pubkey>,
    /// Lamport balances before execution, indexed like `account_keys`
    pub pre_balances: Vec<u64>,
    /// Lamport balances after execution, indexed like `account_keys`
    pub post_balances: Vec<u64>,
}

impl ObservedTransaction {
    /// Lamports credited to `address` by this transaction
    ///
    /// Returns 0 when the address is not referenced or its balance did not grow
    /// (for example our own outgoing forward).
    pub fn credited_to(&self, address: &Pubkey) -> u64 {
        self.account_keys
            .iter()
            .position(|key| key == address)
            .and_then(|idx| {
                let pre = *self.pre_balances.get(idx)?;
                let post = *self.post_balances.get(idx)?;
                Some(post.saturating_sub(pre))
            })
            .unwrap_or(0)
    }
}

/// Confirmation state of a transaction as seen by the chain client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmations {
    /// Not (or no longer) visible to the node
    Unseen,
    /// Included, with this many blocks voted on top
    Count(u64),
    /// Rooted; satisfies every depth
    Finalized,
}

impl Confirmations {
    /// Whether this state satisfies the requested depth
    pub fn reaches(&self, depth: u64) -> bool {
        match self {
            Confirmations::Unseen => depth == 0,
            Confirmations::Count(n) => *n >= depth,
            Confirmations::Finalized => true,
        }
    }
}

impl std::fmt::Display for Confirmations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confirmations::Unseen => write!(f, "unseen"),
            Confirmations::Count(n) => write!(f, "{} confirmation(s)", n),
            Confirmations::Finalized => write!(f, "finalized"),
        }
    }
}

/// Outcome of a successful send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    /// Signature of the outgoing transaction
    pub signature: Signature,
    /// Destination address
    pub destination: Pubkey,
    /// Lamports sent
    pub lamports: u64,
    /// When the send was accepted by the node
    pub sent_at: chrono::DateTime<chrono::Utc>,
}
