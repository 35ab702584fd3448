//! Configuration loading and validation

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;

use crate::forwarder::{ForwarderSettings, REFERENCE_MIN_FEE_LAMPORTS};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub forwarder: ForwarderConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForwarderConfig {
    /// Address every received payment is forwarded to
    pub destination_address: String,
    #[serde(default = "default_confirmation_depth")]
    pub confirmation_depth: u64,
    #[serde(default)]
    pub network: Network,
    #[serde(default = "default_fee_lamports")]
    pub fee_lamports: u64,
}

/// Cluster the forwarder runs against
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    #[serde(alias = "mainnet", alias = "mainnet-beta")]
    Main,
    #[default]
    #[serde(alias = "testnet")]
    Test,
    #[serde(alias = "devnet")]
    Dev,
    /// Local test validator
    #[serde(alias = "localnet")]
    Local,
}

impl Network {
    pub fn default_rpc_endpoint(&self) -> &'static str {
        match self {
            Network::Main => "https://api.mainnet-beta.solana.com",
            Network::Test => "https://api.testnet.solana.com",
            Network::Dev => "https://api.devnet.solana.com",
            Network::Local => "http://127.0.0.1:8899",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Main => write!(f, "main"),
            Network::Test => write!(f, "test"),
            Network::Dev => write!(f, "dev"),
            Network::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Commitment {
    #[default]
    Confirmed,
    Finalized,
}

impl From<Commitment> for CommitmentConfig {
    fn from(commitment: Commitment) -> Self {
        match commitment {
            Commitment::Confirmed => CommitmentConfig::confirmed(),
            Commitment::Finalized => CommitmentConfig::finalized(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// Overrides the network's public endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub commitment: Commitment,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            commitment: Commitment::default(),
            startup_timeout_secs: default_startup_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_keypair_path")]
    pub keypair_path: PathBuf,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

fn default_confirmation_depth() -> u64 {
    1
}

fn default_fee_lamports() -> u64 {
    REFERENCE_MIN_FEE_LAMPORTS
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_startup_timeout_secs() -> u64 {
    120
}

fn default_keypair_path() -> PathBuf {
    std::env::var("KEYPAIR_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("forwarder-keypair.json"))
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("forwarder.confirmation_depth", default_confirmation_depth() as i64)?
            .set_default("forwarder.fee_lamports", default_fee_lamports() as i64)?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            .set_default("rpc.poll_interval_ms", default_poll_interval_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix FORWARDER_)
            .add_source(
                config::Environment::with_prefix("FORWARDER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        self.destination()?;

        if self.forwarder.fee_lamports == 0 {
            anyhow::bail!("fee_lamports must be positive");
        }

        if self.rpc.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be positive");
        }

        for warning in self.warnings() {
            tracing::warn!("{}", warning);
        }

        Ok(())
    }

    /// Settings that are valid but probably not what the operator wants
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.forwarder.confirmation_depth == 0 {
            warnings.push(
                "confirmation_depth is 0 - payments are forwarded before they are confirmed"
                    .to_string(),
            );
        }

        if self.forwarder.fee_lamports < REFERENCE_MIN_FEE_LAMPORTS {
            warnings.push(format!(
                "fee_lamports {} is below the network base fee of {} - every forward \
                 is paid partly from the wallet's existing balance",
                self.forwarder.fee_lamports, REFERENCE_MIN_FEE_LAMPORTS
            ));
        }

        warnings
    }

    /// Parsed destination address
    pub fn destination(&self) -> Result<Pubkey> {
        Pubkey::from_str(self.forwarder.destination_address.trim()).with_context(|| {
            format!(
                "Invalid destination_address: {}",
                self.forwarder.destination_address
            )
        })
    }

    /// Immutable settings handed to the forwarding service
    pub fn forwarder_settings(&self) -> Result<ForwarderSettings> {
        Ok(ForwarderSettings {
            destination: self.destination()?,
            confirmation_depth: self.forwarder.confirmation_depth,
            fee_lamports: self.forwarder.fee_lamports,
        })
    }

    /// RPC endpoint, falling back to the network's public endpoint
    pub fn rpc_endpoint(&self) -> String {
        self.rpc
            .endpoint
            .clone()
            .unwrap_or_else(|| self.forwarder.network.default_rpc_endpoint().to_string())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Forwarder:
    destination: {}
    confirmation_depth: {}
    network: {}
    fee: {} lamports
  RPC:
    endpoint: {}
    timeout: {}ms
    poll_interval: {}ms
    commitment: {:?}
  Wallet:
    keypair_path: {}
"#,
            self.forwarder.destination_address,
            self.forwarder.confirmation_depth,
            self.forwarder.network,
            self.forwarder.fee_lamports,
            mask_url(&self.rpc_endpoint()),
            self.rpc.timeout_ms,
            self.rpc.poll_interval_ms,
            self.rpc.commitment,
            self.wallet.keypair_path.display(),
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}
