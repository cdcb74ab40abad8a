//! Layered configuration of a deployment run.
//!
//! Values are resolved, lowest precedence first, from:
//! 1. built-in defaults (including the predeployed devnet account),
//! 2. the per-network variables `RPC_URL_<NETWORK>`, `ACCOUNT_ADDRESS_<NETWORK>`
//!    and `PRIVATE_KEY_<NETWORK>`,
//! 3. the `Tracekit.toml` file,
//! 4. `TRACEKIT_*` environment variables,
//! 5. the network selected on the command line.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use starknet::core::{chain_id, types::Felt};

use crate::chain::AccountCredentials;

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "Tracekit.toml";

/// Prefix of the environment variables overriding configuration keys.
pub const ENV_PREFIX: &str = "TRACEKIT_";

/// RPC endpoint of a local `starknet-devnet`.
pub const DEVNET_RPC_URL: &str = "http://127.0.0.1:5050/rpc";

/// First predeployed account of `starknet-devnet --seed 0`.
pub const DEVNET_ACCOUNT_ADDRESS: Felt =
    Felt::from_hex_unchecked("0x64b48806902a367c8598f4f95c305e8c1a1acba5f082d294a43793113115691");
pub const DEVNET_PRIVATE_KEY: Felt = Felt::from_hex_unchecked("0x71d7bb07b9a64f6f78ac4c816aff4da9");

/// STRK token, deployed at the same address on every network.
pub const STRK_TOKEN_ADDRESS: Felt =
    Felt::from_hex_unchecked("0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d");

/// Target Starknet network.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Network {
    #[default]
    Devnet,
    Sepolia,
    Mainnet,
}

impl Network {
    /// The chain id transactions are signed for.
    pub fn chain_id(&self) -> Felt {
        match self {
            // starknet-devnet runs with the Sepolia chain id by default.
            Network::Devnet | Network::Sepolia => chain_id::SEPOLIA,
            Network::Mainnet => chain_id::MAINNET,
        }
    }

    fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::Devnet => DEVNET_RPC_URL,
            Network::Sepolia => "https://starknet-sepolia.public.blastapi.io/rpc/v0_8",
            Network::Mainnet => "https://starknet-mainnet.public.blastapi.io/rpc/v0_8",
        }
    }

    fn env_suffix(&self) -> &'static str {
        match self {
            Network::Devnet => "DEVNET",
            Network::Sepolia => "SEPOLIA",
            Network::Mainnet => "MAINNET",
        }
    }
}

/// Configuration of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// The network to deploy to.
    pub network: Network,
    /// The JSON-RPC endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    /// Address of the deployer account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_address: Option<Felt>,
    /// Private key of the deployer account. Never written back to disk.
    #[serde(skip_serializing)]
    pub private_key: Option<Felt>,

    /// Scarb output directory holding the compiled classes.
    pub artifacts_dir: PathBuf,
    /// Scarb package name, the prefix of every artifact file.
    pub package: String,
    /// Path of the deployment manifest.
    pub manifest_path: PathBuf,
    /// Keep a timestamped copy of the previous manifest when overwriting it.
    pub archive_previous: bool,
    /// Ignore the manifest and redeploy every contract.
    pub reset: bool,

    /// Maximum number of calls submitted in one multicall transaction.
    pub max_calls_per_tx: usize,
    /// Upper bound for the RPC liveness probe.
    pub probe_timeout_secs: u64,
    /// Upper bound for a transaction to be accepted.
    pub receipt_timeout_secs: u64,
    /// Delay between two receipt polls.
    pub poll_interval_ms: u64,

    /// Fixed deployment salt. A random salt is drawn per contract when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt: Option<Felt>,
    /// Token distributed by the reward manager.
    pub reward_token: Felt,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            rpc_url: None,
            account_address: None,
            private_key: None,
            artifacts_dir: PathBuf::from("contracts/target/dev"),
            package: "contracts".to_string(),
            manifest_path: PathBuf::from("deployments/manifest.json"),
            archive_previous: false,
            reset: false,
            max_calls_per_tx: 10,
            probe_timeout_secs: 10,
            receipt_timeout_secs: 300,
            poll_interval_ms: 2000,
            salt: None,
            reward_token: STRK_TOKEN_ADDRESS,
        }
    }
}

/// Built-in values that depend on the selected network.
#[derive(Serialize)]
struct NetworkDefaults {
    rpc_url: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_address: Option<Felt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_key: Option<Felt>,
}

impl NetworkDefaults {
    fn for_network(network: Network) -> Self {
        let devnet = network == Network::Devnet;
        Self {
            rpc_url: network.default_rpc_url(),
            account_address: devnet.then_some(DEVNET_ACCOUNT_ADDRESS),
            private_key: devnet.then_some(DEVNET_PRIVATE_KEY),
        }
    }
}

/// The `RPC_URL_<NETWORK>`-style variables, mapped onto configuration keys.
fn network_env(network: Network) -> Env {
    let suffix = network.env_suffix();
    let keys = [
        format!("RPC_URL_{suffix}"),
        format!("ACCOUNT_ADDRESS_{suffix}"),
        format!("PRIVATE_KEY_{suffix}"),
    ];
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();

    Env::raw().only(&keys).map(|key| {
        let key = key.as_str().to_ascii_uppercase();
        if key.starts_with("RPC_URL_") {
            "rpc_url".into()
        } else if key.starts_with("ACCOUNT_ADDRESS_") {
            "account_address".into()
        } else {
            "private_key".into()
        }
    })
}

impl DeployConfig {
    /// Resolve the configuration.
    ///
    /// # Arguments
    /// * `path` - Explicit configuration file; must exist when given. Defaults to
    ///   an optional `Tracekit.toml` in the working directory.
    /// * `network` - Network selected on the command line, overriding every source.
    pub fn load(path: Option<&Path>, network: Option<Network>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                let file = if path.is_dir() {
                    path.join(CONFIG_FILENAME)
                } else {
                    path.to_path_buf()
                };
                if !file.exists() {
                    anyhow::bail!("Configuration file not found: {}", file.display());
                }
                file
            }
            None => PathBuf::from(CONFIG_FILENAME),
        };

        let network = match network {
            Some(network) => network,
            None => Figment::from(Serialized::defaults(Self::default()))
                .merge(Toml::file(&file))
                .merge(Env::prefixed(ENV_PREFIX))
                .extract_inner("network")
                .context("Failed to resolve the target network")?,
        };

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Serialized::defaults(NetworkDefaults::for_network(network)))
            .merge(network_env(network))
            .merge(Toml::file(&file))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::default("network", network))
            .extract()
            .context("Failed to load deployment configuration")?;

        tracing::debug!(
            config_path = %file.display(),
            network = %config.network,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Save the configuration (without the private key) to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// The deployer credentials, when both halves are configured.
    pub fn credentials(&self) -> Option<AccountCredentials> {
        Some(AccountCredentials {
            address: self.account_address?,
            private_key: self.private_key?,
        })
    }

    pub fn rpc_url(&self) -> &str {
        self.rpc_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_rpc_url())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
