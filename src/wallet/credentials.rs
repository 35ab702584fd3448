//! Keypair loading
//!
//! The forwarding wallet is a single keypair stored as a JSON byte array
//! (the format written by `solana-keygen`).

use std::path::Path;

use solana_sdk::signature::Keypair;
use tracing::debug;

use crate::error::{Error, Result};

/// Load the signing keypair from `path`
///
/// On unix, refuses key files readable by group or others.
pub fn load_keypair(path: &Path) -> Result<Keypair> {
    debug!("Loading keypair from: {:?}", path);

    // Validate permissions on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(Error::InsecureKeypair(format!(
                    "Keypair {} has insecure permissions {:o}. Run 'chmod 600 {}'",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }
        }
    }

    let keypair_bytes = std::fs::read(path).map_err(|e| {
        Error::InvalidKeypair(format!("Failed to read keypair {}: {}", path.display(), e))
    })?;

    let keypair_json: Vec<u8> = serde_json::from_slice(&keypair_bytes).map_err(|e| {
        Error::InvalidKeypair(format!(
            "Failed to parse keypair JSON {}: {}",
            path.display(),
            e
        ))
    })?;

    Keypair::from_bytes(&keypair_json).map_err(|e| {
        Error::InvalidKeypair(format!("Invalid keypair bytes in {}: {}", path.display(), e))
    })
}
