//! In-memory wallet for tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use super::{ObservedTransaction, SendResult, Wallet};
use crate::error::{Error, Result};
use crate::forwarder::{ForwardState, IncomingPaymentListener};

/// Wallet that records sends instead of touching a chain
pub struct MemoryWallet {
    address: Pubkey,
    sends: Mutex<Vec<SendResult>>,
    failing_amounts: Mutex<HashSet<u64>>,
    broken: AtomicBool,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::with_address(Pubkey::new_unique())
    }

    pub fn with_address(address: Pubkey) -> Self {
        Self {
            address,
            sends: Mutex::new(Vec::new()),
            failing_amounts: Mutex::new(HashSet::new()),
            broken: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> Pubkey {
        self.address
    }

    /// Make every send of exactly `lamports` fail
    pub fn fail_sends_of(&self, lamports: u64) {
        self.failing_amounts.lock().unwrap().insert(lamports);
    }

    /// Make every send fail with an error unrelated to the payment
    pub fn fail_all_sends(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn sends(&self) -> Vec<SendResult> {
        self.sends.lock().unwrap().clone()
    }
}

#[async_trait]
impl Wallet for MemoryWallet {
    fn receive_address(&self) -> Pubkey {
        self.address
    }

    async fn send_payment(&self, destination: &Pubkey, lamports: u64) -> Result<SendResult> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(Error::Internal("wallet store unavailable".to_string()));
        }
        if self.failing_amounts.lock().unwrap().contains(&lamports) {
            return Err(Error::TransactionSend(format!(
                "injected failure sending {} lamports",
                lamports
            )));
        }

        let mut sends = self.sends.lock().unwrap();
        let mut signature_bytes = [0xAAu8; 64];
        signature_bytes[..8].copy_from_slice(&(sends.len() as u64).to_le_bytes());
        let result = SendResult {
            signature: Signature::from(signature_bytes),
            destination: *destination,
            lamports,
            sent_at: chrono::Utc::now(),
        };
        sends.push(result.clone());
        Ok(result)
    }
}

/// A transfer of `lamports` into `to`, identified by `id`
pub fn incoming(id: u8, to: Pubkey, lamports: u64) -> ObservedTransaction {
    let funder_balance = 1_000_000_000;
    ObservedTransaction {
        signature: Signature::from([id; 64]),
        slot: 1_000 + id as u64,
        account_keys: vec![Pubkey::new_unique(), to],
        pre_balances: vec![funder_balance, 0],
        post_balances: vec![funder_balance - lamports - 5_000, lamports],
    }
}

/// Wait (bounded) until the listener reports `expected` for `signature`
pub async fn wait_for_state(
    listener: &IncomingPaymentListener,
    signature: &Signature,
    expected: ForwardState,
) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while listener.state(signature) != Some(expected) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    assert!(
        reached.is_ok(),
        "{} never reached {} (last state {:?})",
        signature,
        expected,
        listener.state(signature)
    );
}
