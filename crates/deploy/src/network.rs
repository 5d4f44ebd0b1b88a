//! Network profiles.
//!
//! A profile says where a network's RPC endpoint is, who signs, where its lock
//! file lives and whether deployed contracts are verified. Five profiles are
//! built in; the project file can override any field or add new networks.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use url::Url;

use crate::{
    ChainSigner, DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_VERIFY_MAX_POLLS,
    DEFAULT_VERIFY_POLL_INTERVAL, LockStore,
};

/// RPC used by remote profiles whose RPC variable is unset.
pub const DEFAULT_RPC_URL: &str = "https://random.com";

/// RPC of a local hardhat or anvil node.
pub const LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";

/// Environment variable holding the deployer key.
pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";

/// Environment variable holding the `mint` recipient.
pub const FAUCET_ADDRESS_ENV: &str = "FAUCET_ADDRESS";

/// Networks with a built-in profile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "camelCase")]
pub enum KnownNetwork {
    Hardhat,
    Localhost,
    ArbitrumSepolia,
    BaseSepolia,
    OpSepolia,
}

impl KnownNetwork {
    pub fn profile(self) -> NetworkProfile {
        let remote = |chain_id, rpc_env: &str, explorer: ExplorerConfig, verify| NetworkProfile {
            chain_id: Some(chain_id),
            rpc_url: None,
            rpc_env: Some(rpc_env.to_string()),
            accounts: Accounts::PrivateKeyEnv(PRIVATE_KEY_ENV.to_string()),
            lock_file: Some(PathBuf::from("./deployment-lock.json")),
            verify,
            explorer: Some(explorer),
            units: None,
            ..NetworkProfile::default()
        };

        match self {
            Self::Hardhat => NetworkProfile {
                chain_id: Some(31337),
                rpc_url: Some(LOCAL_RPC_URL.to_string()),
                lock_file: None,
                ..NetworkProfile::default()
            },
            Self::Localhost => NetworkProfile {
                chain_id: Some(31337),
                rpc_url: Some(LOCAL_RPC_URL.to_string()),
                lock_file: Some(PathBuf::from("./local.deployment-lock.json")),
                ..NetworkProfile::default()
            },
            Self::ArbitrumSepolia => remote(
                421614,
                "ARBITRUM_SEPOLIA_RPC",
                ExplorerConfig::new(
                    "https://api-sepolia.arbiscan.io/api",
                    "https://sepolia-explorer.arbitrum.io",
                    "ARBISCAN_API_KEY",
                ),
                true,
            ),
            Self::BaseSepolia => remote(
                84532,
                "BASE_SEPOLIA_RPC",
                ExplorerConfig::new(
                    "https://api-sepolia.basescan.org/api",
                    "https://sepolia.basescan.org/",
                    "BASE_API_KEY",
                ),
                false,
            ),
            Self::OpSepolia => remote(
                11155420,
                "OP_SEPOLIA_RPC",
                ExplorerConfig::new(
                    "https://api-sepolia-optimistic.etherscan.io/api",
                    "https://sepolia-optimistic.etherscan.io",
                    "OP_API_KEY",
                ),
                false,
            ),
        }
    }
}

/// Built-in profiles keyed by network name.
pub fn builtin_networks() -> BTreeMap<String, NetworkProfile> {
    KnownNetwork::iter()
        .map(|network| (network.to_string(), network.profile()))
        .collect()
}

/// Where transaction signing happens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accounts {
    /// The node's first unlocked account.
    #[default]
    Node,
    /// A private key read from the named environment variable. The zero hash
    /// stands in when the variable is unset.
    PrivateKeyEnv(String),
}

/// Block explorer used for source verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    pub api_url: String,
    pub browser_url: String,
    /// Environment variable holding the explorer API key.
    pub api_key_env: String,
}

impl ExplorerConfig {
    fn new(api_url: &str, browser_url: &str, api_key_env: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            browser_url: browser_url.to_string(),
            api_key_env: api_key_env.to_string(),
        }
    }

    pub fn api_url(&self) -> Result<Url> {
        Url::parse(&self.api_url)
            .with_context(|| format!("Invalid explorer API URL: {}", self.api_url))
    }

    /// The API key, if its variable is set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|key| !key.is_empty())
    }

    /// Explorer page of `address`.
    pub fn address_url(&self, address: Address) -> String {
        format!(
            "{}/address/{address}",
            self.browser_url.trim_end_matches('/')
        )
    }
}

/// Configuration of one target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkProfile {
    /// Expected chain id. Checked against the node before deploying.
    pub chain_id: Option<u64>,
    /// RPC endpoint. Takes precedence over `rpc_env`.
    pub rpc_url: Option<String>,
    /// Environment variable holding the RPC endpoint.
    pub rpc_env: Option<String>,
    pub accounts: Accounts,
    /// Lock file path. Without one, deployments are kept in memory.
    pub lock_file: Option<PathBuf>,
    /// Verify deployed contracts on `explorer`.
    pub verify: bool,
    pub explorer: Option<ExplorerConfig>,
    /// Units deployed on this network. All declared units when unset.
    pub units: Option<Vec<String>>,
    /// Seconds to wait for a transaction to be mined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_timeout_secs: Option<u64>,
    /// Milliseconds between receipt polls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    /// Seconds between explorer verification status polls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_poll_interval_secs: Option<u64>,
    /// Status polls before verification is given up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_max_polls: Option<usize>,
}

impl Default for NetworkProfile {
    fn default() -> Self {
        Self {
            chain_id: None,
            rpc_url: None,
            rpc_env: None,
            accounts: Accounts::Node,
            lock_file: None,
            verify: false,
            explorer: None,
            units: None,
            confirmation_timeout_secs: None,
            poll_interval_ms: None,
            verify_poll_interval_secs: None,
            verify_max_polls: None,
        }
    }
}

impl NetworkProfile {
    /// The RPC endpoint: `rpc_url`, else `rpc_env`, else [`DEFAULT_RPC_URL`].
    pub fn resolve_rpc_url(&self) -> Result<Url> {
        let from_env = || {
            self.rpc_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|url| !url.is_empty())
        };
        let url = self
            .rpc_url
            .clone()
            .or_else(from_env)
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());

        Url::parse(&url).with_context(|| format!("Invalid RPC URL: {url}"))
    }

    /// The transaction signer. Fails when a private key is expected but none
    /// is configured.
    pub fn signer(&self) -> Result<ChainSigner> {
        match &self.accounts {
            Accounts::Node => Ok(ChainSigner::Node),
            Accounts::PrivateKeyEnv(var) => {
                let key = match std::env::var(var) {
                    Ok(value) if !value.trim().is_empty() => value
                        .trim()
                        .parse::<B256>()
                        .with_context(|| format!("{var} is not a 32-byte hex key"))?,
                    _ => B256::ZERO,
                };
                ChainSigner::from_private_key(key)
            }
        }
    }

    /// The lock store of this network.
    pub fn lock_store(&self) -> LockStore {
        match &self.lock_file {
            Some(path) => LockStore::file(path),
            None => LockStore::in_memory(),
        }
    }

    /// Receipt poll interval and overall confirmation timeout.
    pub fn confirmation(&self) -> (Duration, Duration) {
        (
            self.poll_interval_ms
                .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis),
            self.confirmation_timeout_secs
                .map_or(DEFAULT_CONFIRMATION_TIMEOUT, Duration::from_secs),
        )
    }

    /// Verification status poll interval and number of polls.
    pub fn verify_polling(&self) -> (Duration, usize) {
        (
            self.verify_poll_interval_secs
                .map_or(DEFAULT_VERIFY_POLL_INTERVAL, Duration::from_secs),
            self.verify_max_polls.unwrap_or(DEFAULT_VERIFY_MAX_POLLS),
        )
    }

    /// Whether `unit` is deployed on this network.
    pub fn includes(&self, unit: &str) -> bool {
        self.units
            .as_ref()
            .is_none_or(|units| units.iter().any(|name| name == unit))
    }
}
