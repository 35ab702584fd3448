//! Error types for the forwarder

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the forwarder
#[derive(Error, Debug)]
pub enum Error {
    // Configuration / lifecycle errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("Insecure keypair permissions: {0}")]
    InsecureKeypair(String),

    #[error("Service is shutting down")]
    Shutdown,

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    // Forwarding policy errors
    #[error("Insufficient funds: received {gross} lamports, fee is {fee} lamports")]
    InsufficientFunds { gross: u64, fee: u64 },

    // Send errors
    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    // Listener errors
    #[error("Listener callback failed: {0}")]
    Listener(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Coarse failure category, attached to every failure log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Received amount cannot cover the fee
    Policy,
    /// The chain client refused or failed to send
    CollaboratorSend,
    /// A callback invoked by the event dispatcher failed
    ListenerCallback,
    /// Startup / configuration / shutdown failure
    Lifecycle,
    /// Anything else
    Internal,
}

impl Error {
    /// Failure category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InsufficientFunds { .. } => ErrorKind::Policy,
            Error::Rpc(_) | Error::TransactionBuild(_) | Error::TransactionSend(_) => {
                ErrorKind::CollaboratorSend
            }
            Error::Listener(_) => ErrorKind::ListenerCallback,
            Error::Config(_)
            | Error::InvalidKeypair(_)
            | Error::InsecureKeypair(_)
            | Error::RpcConnection(_)
            | Error::Shutdown
            | Error::Io(_) => ErrorKind::Lifecycle,
            Error::Serialization(_) | Error::Internal(_) | Error::Anyhow(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error only affects a single transaction
    ///
    /// Transaction-scoped failures mark one forward FAILED and never stop the service.
    pub fn is_transaction_scoped(&self) -> bool {
        matches!(self.kind(), ErrorKind::Policy | ErrorKind::CollaboratorSend)
    }

    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Rpc(_) | Error::RpcConnection(_))
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
