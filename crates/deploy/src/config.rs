//! Project configuration.
//!
//! Configuration is layered with figment: built-in defaults, then the project
//! file (`Bundl.toml`), then `BUNDL_`-prefixed environment variables where
//! `__` separates nested keys (`BUNDL_NETWORKS__LOCALHOST__RPC_URL`). Network
//! names in those keys match configured networks case-insensitively, so
//! `BUNDL_NETWORKS__BASESEPOLIA__RPC_URL` reaches `baseSepolia`.
//!
//! Units are declared as an array so their declaration order, which breaks
//! ties in the deployment order, survives:
//!
//! ```toml
//! [[units]]
//! name = "LedgerLib"
//!
//! [[units]]
//! name = "Ledger"
//! args = [{ address_of = "LedgerLib" }, 42, { override = "feed" }]
//! libraries = { LedgerLib = { dynamic = "LedgerLib" } }
//! overrides.baseSepolia.feed = "0x4aDC67696bA383F43DD60A9e78F2C97Fbbfc7cb1"
//! ```

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize, de::IgnoredAny};

use crate::{Arg, ArgValue, LibraryRef, NetworkProfile, Unit, network::builtin_networks};

/// The default name of the project file.
pub const CONFIG_FILENAME: &str = "Bundl.toml";

/// Prefix of environment variables overriding the project file.
pub const ENV_PREFIX: &str = "BUNDL_";

/// A constructor argument as written in the project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgConfig {
    /// The deployed address of another unit.
    AddressOf { address_of: String },
    /// The chain id of the active network.
    ChainId { chain_id: bool },
    /// A value from the unit's `overrides` for the active network.
    Override {
        #[serde(rename = "override")]
        key: String,
    },
    Literal(ArgValue),
}

/// A library reference as written in the project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LibraryConfig {
    /// The deployed address of another unit.
    Dynamic { dynamic: String },
    Address(Address),
}

/// A unit as written in the project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    /// Artifact name, when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub libraries: BTreeMap<String, LibraryConfig>,
    /// Network name to override key to value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, BTreeMap<String, ArgValue>>,
}

impl UnitConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: None,
            args: Vec::new(),
            libraries: BTreeMap::new(),
            overrides: BTreeMap::new(),
        }
    }

    /// Build the [`Unit`] this declaration describes.
    pub fn to_unit(&self) -> Result<Unit> {
        let mut unit = Unit::new(&self.name);
        unit.contract_name = self.contract.clone();
        unit.overrides = self.overrides.clone();

        for arg in &self.args {
            let arg = match arg {
                ArgConfig::AddressOf { address_of } => Arg::address_of(address_of),
                ArgConfig::ChainId { chain_id: true } => Arg::chain_id(),
                ArgConfig::ChainId { chain_id: false } => {
                    anyhow::bail!("unit `{}`: `chain_id = false` is not an argument", self.name)
                }
                ArgConfig::Override { key } => Arg::overridden(key),
                ArgConfig::Literal(value) => Arg::Literal(value.clone()),
            };
            unit = unit.arg(arg);
        }

        for (placeholder, library) in &self.libraries {
            let reference = match library {
                LibraryConfig::Dynamic { dynamic } => LibraryRef::Dynamic(dynamic.clone()),
                LibraryConfig::Address(address) => LibraryRef::Address(*address),
            };
            unit = unit.library(placeholder, reference);
        }

        Ok(unit)
    }
}

/// Everything a deployment needs to know about the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Directory holding compiled contract artifacts.
    pub artifacts: PathBuf,
    /// Directory holding solc build info, used for verification.
    pub build_info: PathBuf,
    /// Network profiles keyed by network name.
    pub networks: BTreeMap<String, NetworkProfile>,
    /// Units in declaration order.
    pub units: Vec<UnitConfig>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        let mut ledger = UnitConfig::new("Ledger");
        ledger.libraries.insert(
            "LedgerLib".to_string(),
            LibraryConfig::Dynamic {
                dynamic: "LedgerLib".to_string(),
            },
        );

        Self {
            artifacts: PathBuf::from("out"),
            build_info: PathBuf::from("out/build-info"),
            networks: builtin_networks(),
            units: vec![UnitConfig::new("LedgerLib"), ledger],
        }
    }
}

impl ProjectConfig {
    /// Load the configuration, layering the project file at `path` (when it
    /// exists) and the environment over the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Self::default())).merge(Toml::file(path));
        let networks: Vec<String> = figment
            .extract_inner::<BTreeMap<String, IgnoredAny>>("networks")
            .map(|networks| networks.into_keys().collect())
            .unwrap_or_default();

        let config: Self = figment
            .merge(env_provider(networks))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        tracing::debug!(
            path = %path.display(),
            networks = config.networks.len(),
            units = config.units.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Profile of `network`.
    pub fn network(&self, network: &str) -> Result<&NetworkProfile> {
        self.networks.get(network).with_context(|| {
            let known: Vec<_> = self.networks.keys().map(String::as_str).collect();
            format!(
                "unknown network `{network}` (configured: {})",
                known.join(", ")
            )
        })
    }

    /// Units deployed on `network`, in declaration order.
    pub fn units_for(&self, network: &str) -> Result<Vec<Unit>> {
        let profile = self.network(network)?;
        self.units
            .iter()
            .filter(|unit| profile.includes(&unit.name))
            .map(UnitConfig::to_unit)
            .collect()
    }
}

/// `BUNDL_`-prefixed variables, with `__` nesting. Keys are lowercased except
/// network names, which take the casing of the matching entry in `networks`.
fn env_provider(networks: Vec<String>) -> Env {
    Env::prefixed(ENV_PREFIX)
        .map(move |key| env_key(key.as_str(), &networks).into())
        .lowercase(false)
}

fn env_key(key: &str, networks: &[String]) -> String {
    let mut parts: Vec<String> = key.split("__").map(str::to_ascii_lowercase).collect();
    if parts.len() > 1
        && parts[0] == "networks"
        && let Some(name) = networks
            .iter()
            .find(|name| name.eq_ignore_ascii_case(&parts[1]))
    {
        parts[1] = name.clone();
    }
    parts.join(".")
}

/// Load `.env` from the working directory or its parents into the process
/// environment. Returns the loaded file, or `None` when there is none.
pub fn load_dotenv() -> Result<Option<PathBuf>> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(err) if err.not_found() => Ok(None),
        Err(err) => Err(err).context("Failed to load .env"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_defaults_when_file_is_missing() {
        let temp_dir = TempDir::new("bundl-test").expect("Failed to create temp dir");
        let config = ProjectConfig::load(&temp_dir.path().join(CONFIG_FILENAME)).unwrap();

        assert_eq!(config.artifacts, PathBuf::from("out"));
        assert_eq!(config.networks.len(), 5);
        let names: Vec<_> = config.units.iter().map(|unit| unit.name.as_str()).collect();
        assert_eq!(names, vec!["LedgerLib", "Ledger"]);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp_dir = TempDir::new("bundl-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
artifacts = "artifacts"

[networks.localhost]
lock_file = "./other.lock.json"

[networks.devnet]
chain_id = 1337
rpc_url = "http://127.0.0.1:9545"

[[units]]
name = "Registry"

[[units]]
name = "Balancer"
contract = "BalancerV1"
args = [{ address_of = "Registry" }, { chain_id = true }, 5, "text", { override = "feed" }]
libraries = { MathLib = "0x1111111111111111111111111111111111111111" }
overrides.localhost.feed = "0x2222222222222222222222222222222222222222"
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(&path).unwrap();

        assert_eq!(config.artifacts, PathBuf::from("artifacts"));
        assert_eq!(config.build_info, PathBuf::from("out/build-info"));

        let localhost = config.network("localhost").unwrap();
        assert_eq!(
            localhost.lock_file.as_deref(),
            Some(Path::new("./other.lock.json"))
        );
        // Fields not set in the file keep their built-in value.
        assert_eq!(localhost.chain_id, Some(31337));
        assert_eq!(config.network("devnet").unwrap().chain_id, Some(1337));

        let balancer = &config.units[1];
        assert_eq!(
            balancer.args,
            vec![
                ArgConfig::AddressOf {
                    address_of: "Registry".to_string()
                },
                ArgConfig::ChainId { chain_id: true },
                ArgConfig::Literal(ArgValue::Int(5)),
                ArgConfig::Literal(ArgValue::Text("text".to_string())),
                ArgConfig::Override {
                    key: "feed".to_string()
                },
            ]
        );
        assert_eq!(
            balancer.libraries["MathLib"],
            LibraryConfig::Address(Address::repeat_byte(0x11))
        );
    }

    #[test]
    fn test_units_for_builds_units() {
        let mut config = ProjectConfig::default();
        config
            .networks
            .get_mut("localhost")
            .unwrap()
            .units = Some(vec!["LedgerLib".to_string()]);

        let all = config.units_for("hardhat").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            all[1].libraries["LedgerLib"],
            LibraryRef::Dynamic("LedgerLib".to_string())
        );

        let subset = config.units_for("localhost").unwrap();
        assert_eq!(subset.len(), 1);
        assert_eq!(subset[0].name, "LedgerLib");
    }

    #[test]
    fn test_env_key_restores_network_casing() {
        let networks = vec!["baseSepolia".to_string(), "localhost".to_string()];

        assert_eq!(
            env_key("NETWORKS__BASESEPOLIA__RPC_URL", &networks),
            "networks.baseSepolia.rpc_url"
        );
        assert_eq!(
            env_key("NETWORKS__LOCALHOST__LOCK_FILE", &networks),
            "networks.localhost.lock_file"
        );
        // Unknown networks are added under the lowercased name.
        assert_eq!(
            env_key("NETWORKS__DEVNET__CHAIN_ID", &networks),
            "networks.devnet.chain_id"
        );
        assert_eq!(env_key("ARTIFACTS", &networks), "artifacts");
    }

    #[test]
    fn test_unknown_network() {
        let err = ProjectConfig::default().network("mainnet").unwrap_err();
        assert!(err.to_string().contains("unknown network `mainnet`"));
    }

    #[test]
    fn test_toml_round_trip() {
        let temp_dir = TempDir::new("bundl-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILENAME);

        let config = ProjectConfig::default();
        config.save_to_file(&path).unwrap();

        assert_eq!(ProjectConfig::load(&path).unwrap(), config);
    }
}
