//! Lock file store.
//!
//! The lock file is a JSON document keyed by network name. Each network maps
//! unit names to the [`LockEntry`] written when that unit was deployed:
//!
//! ```json
//! {
//!   "localhost": {
//!     "LedgerLib": { "address": "0x…", "abi": [], "bytecodeHash": "…" }
//!   }
//! }
//! ```
//!
//! Writes merge into whatever is on disk, so entries of other units and other
//! networks survive partial runs.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

/// Persisted record of a deployed unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    pub address: Address,
    pub abi: serde_json::Value,
    /// Version marker, see [`UnitFingerprint`](crate::UnitFingerprint).
    /// Empty for entries recorded without one, which never match.
    #[serde(default)]
    pub bytecode_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// RFC 3339 timestamp of the deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<String>,
    /// Fields written by other tools, kept as-is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Unit name to entry, for one network.
pub type NetworkLock = BTreeMap<String, LockEntry>;

/// Network name to [`NetworkLock`].
pub type LockDocument = BTreeMap<String, NetworkLock>;

#[derive(Debug)]
enum Backing {
    File(PathBuf),
    Memory(Mutex<LockDocument>),
}

/// Durable mapping from (network, unit) to [`LockEntry`].
#[derive(Debug)]
pub struct LockStore {
    backing: Backing,
}

impl LockStore {
    /// A store backed by the lock file at `path`. The file is created on the
    /// first write.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    /// A store that lives only as long as this value.
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(Mutex::new(LockDocument::new())),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(path) => Some(path),
            Backing::Memory(_) => None,
        }
    }

    /// Entries of `network`; empty when the file or network is absent.
    pub fn read(&self, network: &str) -> Result<NetworkLock> {
        Ok(self
            .read_all()?
            .remove(network)
            .unwrap_or_default())
    }

    /// The entry of `unit` on `network`, if any.
    pub fn entry(&self, network: &str, unit: &str) -> Result<Option<LockEntry>> {
        Ok(self.read(network)?.remove(unit))
    }

    /// The whole document.
    pub fn read_all(&self) -> Result<LockDocument> {
        match &self.backing {
            Backing::File(path) => load_document(path),
            Backing::Memory(doc) => Ok(doc
                .lock()
                .map_err(|_| anyhow::anyhow!("in-memory lock store poisoned"))?
                .clone()),
        }
    }

    /// Insert or replace the entry of `unit` on `network`, keeping every
    /// other entry.
    pub fn write(&self, network: &str, unit: &str, entry: LockEntry) -> Result<()> {
        match &self.backing {
            Backing::File(path) => {
                let guard = acquire_file_lock(path)?;
                let mut document = load_document(path)?;
                document
                    .entry(network.to_string())
                    .or_default()
                    .insert(unit.to_string(), entry);
                let result = save_document(path, &document);
                let _ = guard.unlock();
                result?;
            }
            Backing::Memory(doc) => {
                doc.lock()
                    .map_err(|_| anyhow::anyhow!("in-memory lock store poisoned"))?
                    .entry(network.to_string())
                    .or_default()
                    .insert(unit.to_string(), entry);
            }
        }

        tracing::debug!(network, unit, "Lock entry written");
        Ok(())
    }
}

fn load_document(path: &Path) -> Result<LockDocument> {
    if !path.exists() {
        return Ok(LockDocument::new());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read lock file {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(LockDocument::new());
    }

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse lock file {}", path.display()))
}

/// Write to a sibling temp file, then rename over the lock file.
fn save_document(path: &Path, document: &LockDocument) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(document).context("Failed to serialize lock file")?;

    let tmp_path = sibling_with_suffix(path, "tmp");
    fs::write(&tmp_path, json)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace lock file {}", path.display()))?;

    Ok(())
}

fn acquire_file_lock(path: &Path) -> Result<fs::File> {
    let lock_path = sibling_with_suffix(path, "lock");
    if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let file = fs::File::create(&lock_path)
        .with_context(|| format!("Failed to open {}", lock_path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("Failed to lock {}", lock_path.display()))?;
    Ok(file)
}

/// `deployment-lock.json` -> `deployment-lock.json.<suffix>`.
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
