//! Lamport Forwarder Library
//!
//! Watches a wallet for incoming payments and, once each one reaches the
//! configured confirmation depth, forwards it (minus a fixed fee) to a single
//! destination address.

pub mod cli;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use forwarder::{ForwardingService, ForwarderSettings};
