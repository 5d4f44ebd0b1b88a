//! Deployment execution.
//!
//! The executor walks a [`DeploymentPlan`] in order, one unit at a time. Every
//! unit is checked against the lock file first: a unit whose fingerprint is
//! unchanged and whose code is still on chain is reused, anything else is
//! deployed and recorded before the next unit starts. A failed run therefore
//! leaves the lock file describing every unit that did deploy, and the next
//! run resumes from the failing unit.

use std::collections::BTreeMap;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Context;

use crate::{
    Arg, ArgValue, Artifact, ArtifactStore, Chain, DeployError, DeployedContext, DeployedUnit,
    DeploymentPlan, LibraryRef, LockEntry, LockStore, NetworkLock, NoVerify, Unit, UnitFingerprint,
    VerificationError, VerificationRequest, Verifier,
};

/// What happened to a unit during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    /// A deployment transaction was sent and mined.
    Deployed { tx_hash: B256 },
    /// The lock file entry was reused.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub name: String,
    pub address: Address,
    pub status: UnitStatus,
}

/// Result of a successful run.
#[derive(Debug)]
pub struct DeploymentReport {
    pub network: String,
    pub chain_id: u64,
    /// Units in deployment order.
    pub units: Vec<UnitOutcome>,
    pub verification_failures: Vec<VerificationError>,
}

impl DeploymentReport {
    pub fn deployed_count(&self) -> usize {
        self.units
            .iter()
            .filter(|unit| matches!(unit.status, UnitStatus::Deployed { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.units
            .iter()
            .filter(|unit| unit.status == UnitStatus::Skipped)
            .count()
    }

    /// Address of unit `name`.
    pub fn address(&self, name: &str) -> Option<Address> {
        self.units
            .iter()
            .find(|unit| unit.name == name)
            .map(|unit| unit.address)
    }
}

/// Deploys a plan to one network.
pub struct Executor<'a, C, V = NoVerify> {
    network: &'a str,
    chain: &'a C,
    lock: &'a LockStore,
    artifacts: &'a ArtifactStore,
    verifier: V,
    force: bool,
    expected_chain_id: Option<u64>,
}

impl<'a, C: Chain> Executor<'a, C> {
    pub fn new(
        network: &'a str,
        chain: &'a C,
        lock: &'a LockStore,
        artifacts: &'a ArtifactStore,
    ) -> Self {
        Self {
            network,
            chain,
            lock,
            artifacts,
            verifier: NoVerify,
            force: false,
            expected_chain_id: None,
        }
    }
}

impl<'a, C: Chain, V: Verifier> Executor<'a, C, V> {
    /// Run `verifier` after every unit that gets deployed.
    pub fn with_verifier<W: Verifier>(self, verifier: W) -> Executor<'a, C, W> {
        Executor {
            network: self.network,
            chain: self.chain,
            lock: self.lock,
            artifacts: self.artifacts,
            verifier,
            force: self.force,
            expected_chain_id: self.expected_chain_id,
        }
    }

    /// Redeploy every unit, ignoring the lock file.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Refuse to run unless the node reports `chain_id`.
    pub fn expect_chain_id(mut self, chain_id: Option<u64>) -> Self {
        self.expected_chain_id = chain_id;
        self
    }

    /// Deploy every unit of `plan` that is not already deployed.
    pub async fn run(&self, plan: &DeploymentPlan) -> Result<DeploymentReport, DeployError> {
        let network = self.network;
        let chain_error = |source| DeployError::Chain {
            network: network.to_string(),
            source,
        };

        let chain_id = self.chain.chain_id().await.map_err(chain_error)?;
        if let Some(expected) = self.expected_chain_id
            && expected != chain_id
        {
            return Err(chain_error(anyhow::anyhow!(
                "node reports chain id {chain_id}, expected {expected}"
            )));
        }

        let artifacts = self.preflight(plan)?;
        let mut locked = self.lock.read(network).map_err(DeployError::Lock)?;

        tracing::info!(
            network,
            chain_id,
            units = plan.order().len(),
            force = self.force,
            "Starting deployment"
        );

        let registry = plan.registry();
        let mut deployed: BTreeMap<String, DeployedUnit> = BTreeMap::new();
        let mut report = DeploymentReport {
            network: network.to_string(),
            chain_id,
            units: Vec::with_capacity(plan.order().len()),
            verification_failures: Vec::new(),
        };

        for &id in plan.order() {
            let unit = registry.unit(id);
            let artifact = &artifacts[id.index()];

            let argument_error = |source| DeployError::Argument {
                unit: unit.name.clone(),
                source,
            };
            let args =
                evaluate_args(unit, network, chain_id, &deployed).map_err(argument_error)?;
            let libraries = resolve_libraries(unit, &deployed).map_err(argument_error)?;
            let linked = artifact.link(&libraries).map_err(argument_error)?;
            let constructor_args = artifact
                .encode_constructor(&args)
                .map_err(argument_error)?;

            let mut init_code = linked.to_vec();
            init_code.extend_from_slice(&constructor_args);
            let bytecode_hash = UnitFingerprint::new(&init_code).compute_hash();

            if let Some(entry) = locked.remove(&unit.name)
                && self.is_reusable(unit, &entry, &bytecode_hash).await?
            {
                tracing::info!(unit = %unit.name, address = %entry.address, "Unchanged, skipping");
                report.units.push(UnitOutcome {
                    name: unit.name.clone(),
                    address: entry.address,
                    status: UnitStatus::Skipped,
                });
                deployed.insert(
                    unit.name.clone(),
                    DeployedUnit {
                        address: entry.address,
                        abi: entry.abi,
                    },
                );
                continue;
            }

            tracing::info!(
                unit = %unit.name,
                contract = unit.contract_name(),
                "Deploying"
            );
            let transaction_error = |source| DeployError::Transaction {
                unit: unit.name.clone(),
                network: network.to_string(),
                source,
            };
            let receipt = self
                .chain
                .deploy(Bytes::from(init_code))
                .await
                .map_err(transaction_error)?;
            let address = receipt
                .contract_address
                .context("receipt carries no contract address")
                .map_err(transaction_error)?;

            let entry = LockEntry {
                address,
                abi: artifact.raw_abi.clone(),
                bytecode_hash,
                contract_name: Some(unit.contract_name().to_string()),
                tx_hash: Some(receipt.tx_hash),
                block_number: receipt.block_number,
                deployed_at: Some(chrono::Utc::now().to_rfc3339()),
                extra: BTreeMap::new(),
            };
            self.lock
                .write(network, &unit.name, entry)
                .map_err(DeployError::Lock)?;

            tracing::info!(
                unit = %unit.name,
                %address,
                tx_hash = %receipt.tx_hash,
                "Deployed"
            );

            let request = VerificationRequest {
                unit: &unit.name,
                address,
                artifact,
                constructor_args: &constructor_args,
                libraries: &libraries,
            };
            if let Err(err) = self.verifier.verify(&request).await {
                tracing::warn!(error = %err, "Verification failed, continuing");
                report.verification_failures.push(err);
            }

            report.units.push(UnitOutcome {
                name: unit.name.clone(),
                address,
                status: UnitStatus::Deployed {
                    tx_hash: receipt.tx_hash,
                },
            });
            deployed.insert(
                unit.name.clone(),
                DeployedUnit {
                    address,
                    abi: artifact.raw_abi.clone(),
                },
            );
        }

        tracing::info!(
            network,
            deployed = report.deployed_count(),
            skipped = report.skipped_count(),
            "Deployment complete"
        );
        Ok(report)
    }

    /// Load every artifact and check overrides and library placeholders
    /// before any transaction is sent. Artifacts are indexed by unit id.
    fn preflight(&self, plan: &DeploymentPlan) -> Result<Vec<Artifact>, DeployError> {
        let registry = plan.registry();

        registry
            .ids()
            .map(|id| {
                let unit = registry.unit(id);
                check_unit(unit, self.network, self.artifacts).map_err(|source| {
                    DeployError::Preflight {
                        unit: unit.name.clone(),
                        source,
                    }
                })
            })
            .collect()
    }

    /// Whether the lock `entry` of `unit` can be reused instead of deploying.
    async fn is_reusable(
        &self,
        unit: &Unit,
        entry: &LockEntry,
        bytecode_hash: &str,
    ) -> Result<bool, DeployError> {
        if self.force {
            tracing::debug!(unit = %unit.name, "Forced redeployment");
            return Ok(false);
        }
        if entry.bytecode_hash != bytecode_hash {
            tracing::info!(
                unit = %unit.name,
                previous = %entry.bytecode_hash,
                current = %bytecode_hash,
                "Unit changed, redeploying"
            );
            return Ok(false);
        }

        let code = self
            .chain
            .code_at(entry.address)
            .await
            .map_err(|source| DeployError::Chain {
                network: self.network.to_string(),
                source,
            })?;
        if code.is_empty() {
            tracing::warn!(
                unit = %unit.name,
                address = %entry.address,
                "No code at locked address, redeploying"
            );
            return Ok(false);
        }

        Ok(true)
    }
}

fn check_unit(unit: &Unit, network: &str, artifacts: &ArtifactStore) -> anyhow::Result<Artifact> {
    let artifact = artifacts.load(unit.contract_name())?;

    for arg in &unit.args {
        if let Arg::Override(key) = arg
            && unit.override_for(network, key).is_none()
        {
            anyhow::bail!("no override `{key}` for network `{network}`");
        }
    }

    // Linking against placeholder addresses catches unknown and missing
    // libraries alike.
    let placeholders: BTreeMap<String, Address> = unit
        .libraries
        .keys()
        .map(|name| (name.clone(), Address::ZERO))
        .collect();
    artifact.link(&placeholders)?;

    Ok(artifact)
}

/// Evaluate the constructor arguments of `unit`. Derived arguments only see
/// the units they declared.
fn evaluate_args(
    unit: &Unit,
    network: &str,
    chain_id: u64,
    deployed: &BTreeMap<String, DeployedUnit>,
) -> anyhow::Result<Vec<ArgValue>> {
    unit.args
        .iter()
        .enumerate()
        .map(|(index, arg)| match arg {
            Arg::Literal(value) => Ok(value.clone()),
            Arg::Override(key) => unit
                .override_for(network, key)
                .cloned()
                .with_context(|| format!("no override `{key}` for network `{network}`")),
            Arg::Derived { reads, resolver } => {
                let visible = reads
                    .iter()
                    .map(|name| {
                        deployed
                            .get_key_value(name.as_str())
                            .map(|(name, unit)| (name.as_str(), unit))
                            .with_context(|| format!("unit `{name}` is not deployed yet"))
                    })
                    .collect::<anyhow::Result<BTreeMap<_, _>>>()?;
                let context = DeployedContext::new(network, chain_id, visible);
                resolver(chain_id, &context).with_context(|| format!("argument #{index} failed"))
            }
        })
        .collect()
}

/// Library placeholder to address.
fn resolve_libraries(
    unit: &Unit,
    deployed: &BTreeMap<String, DeployedUnit>,
) -> anyhow::Result<BTreeMap<String, Address>> {
    unit.libraries
        .iter()
        .map(|(placeholder, reference)| {
            let address = match reference {
                LibraryRef::Address(address) => *address,
                LibraryRef::Dynamic(name) => deployed
                    .get(name)
                    .map(|unit| unit.address)
                    .with_context(|| format!("library unit `{name}` is not deployed yet"))?,
            };
            Ok((placeholder.clone(), address))
        })
        .collect()
}

/// Entries of `network` that no longer correspond to a planned unit.
pub fn stale_entries<'a>(plan: &DeploymentPlan, lock: &'a NetworkLock) -> Vec<&'a str> {
    lock.keys()
        .map(String::as_str)
        .filter(|name| plan.registry().id(name).is_none())
        .collect()
}
