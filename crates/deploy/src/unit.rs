//! Deployment unit declarations.
//!
//! A [`Unit`] describes one contract or library to deploy: which artifact it
//! comes from, how its constructor arguments are produced and which libraries
//! are linked into its bytecode. Units reference each other by name; the
//! [`UnitRegistry`](crate::UnitRegistry) resolves those names once into typed
//! handles.

use std::{collections::BTreeMap, fmt, sync::Arc};

use alloy_core::primitives::{Address, Bytes, U256};
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// A value passed to a constructor or contract call.
///
/// Values are coerced to the parameter type declared in the contract ABI when
/// encoded, so `Text("1000")` is accepted for a `uint256` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<ArgValue>),
    #[serde(skip)]
    Address(Address),
    #[serde(skip)]
    Uint(U256),
    #[serde(skip)]
    Bytes(Bytes),
}

impl From<Address> for ArgValue {
    fn from(value: Address) -> Self {
        Self::Address(value)
    }
}

impl From<U256> for ArgValue {
    fn from(value: U256) -> Self {
        Self::Uint(value)
    }
}

impl From<u64> for ArgValue {
    fn from(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Bytes> for ArgValue {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

/// A unit that has been deployed (or found in the lock file) during the
/// current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedUnit {
    pub address: Address,
    pub abi: serde_json::Value,
}

/// Read-only snapshot of the units a derived argument declared it reads.
pub struct DeployedContext<'a> {
    network: &'a str,
    chain_id: u64,
    visible: BTreeMap<&'a str, &'a DeployedUnit>,
}

impl<'a> DeployedContext<'a> {
    pub(crate) fn new(
        network: &'a str,
        chain_id: u64,
        visible: BTreeMap<&'a str, &'a DeployedUnit>,
    ) -> Self {
        Self {
            network,
            chain_id,
            visible,
        }
    }

    /// Name of the network being deployed to.
    pub fn network(&self) -> &str {
        self.network
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Deployed unit `name`. Fails if the argument did not declare it.
    pub fn unit(&self, name: &str) -> anyhow::Result<&DeployedUnit> {
        self.visible.get(name).copied().with_context(|| {
            format!("unit `{name}` was read but is not a declared dependency of this argument")
        })
    }

    /// Address of the deployed unit `name`.
    pub fn address(&self, name: &str) -> anyhow::Result<Address> {
        self.unit(name).map(|unit| unit.address)
    }

    /// ABI of the deployed unit `name`.
    pub fn abi(&self, name: &str) -> anyhow::Result<&serde_json::Value> {
        self.unit(name).map(|unit| &unit.abi)
    }
}

/// Function producing a constructor argument at deploy time.
pub type ResolverFn =
    Arc<dyn Fn(u64, &DeployedContext<'_>) -> anyhow::Result<ArgValue> + Send + Sync>;

/// A constructor argument.
#[derive(Clone)]
pub enum Arg {
    /// A value known at declaration time.
    Literal(ArgValue),
    /// A network-specific value read from the unit's overrides under `key`.
    Override(String),
    /// A value computed from already-deployed units. `reads` lists every unit
    /// the resolver looks at; each one becomes a dependency edge.
    Derived { reads: Vec<String>, resolver: ResolverFn },
}

impl Arg {
    pub fn literal(value: impl Into<ArgValue>) -> Self {
        Self::Literal(value.into())
    }

    pub fn overridden(key: impl Into<String>) -> Self {
        Self::Override(key.into())
    }

    /// A derived argument reading the given units.
    pub fn derived<I, S, F>(reads: I, resolver: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(u64, &DeployedContext<'_>) -> anyhow::Result<ArgValue> + Send + Sync + 'static,
    {
        Self::Derived {
            reads: reads.into_iter().map(Into::into).collect(),
            resolver: Arc::new(resolver),
        }
    }

    /// The deployed address of `unit`.
    pub fn address_of(unit: impl Into<String>) -> Self {
        let unit = unit.into();
        let target = unit.clone();
        Self::derived([unit], move |_, ctx| ctx.address(&target).map(ArgValue::Address))
    }

    /// The chain id of the network being deployed to.
    pub fn chain_id() -> Self {
        Self::derived(Vec::<String>::new(), |chain_id, _| Ok(ArgValue::from(chain_id)))
    }

    /// Units this argument reads.
    pub fn reads(&self) -> &[String] {
        match self {
            Self::Derived { reads, .. } => reads,
            Self::Literal(_) | Self::Override(_) => &[],
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Override(key) => f.debug_tuple("Override").field(key).finish(),
            Self::Derived { reads, .. } => f.debug_struct("Derived").field("reads", reads).finish(),
        }
    }
}

/// Address linked into a library placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryRef {
    /// A library already deployed at a known address.
    Address(Address),
    /// The address of another unit, known once that unit is deployed.
    Dynamic(String),
}

/// Shorthand for [`LibraryRef::Dynamic`].
pub fn dynamic_address(unit: impl Into<String>) -> LibraryRef {
    LibraryRef::Dynamic(unit.into())
}

/// A single deployable contract or library declaration.
#[derive(Debug, Clone)]
pub struct Unit {
    /// Unique key, stable across runs. Used as the lock file key.
    pub name: String,
    /// Artifact name, when it differs from `name`.
    pub contract_name: Option<String>,
    pub args: Vec<Arg>,
    /// Library placeholder name to linked address.
    pub libraries: BTreeMap<String, LibraryRef>,
    /// Network name to override key to value.
    pub overrides: BTreeMap<String, BTreeMap<String, ArgValue>>,
}

impl Unit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract_name: None,
            args: Vec::new(),
            libraries: BTreeMap::new(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn contract(mut self, contract_name: impl Into<String>) -> Self {
        self.contract_name = Some(contract_name.into());
        self
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn library(mut self, placeholder: impl Into<String>, reference: LibraryRef) -> Self {
        self.libraries.insert(placeholder.into(), reference);
        self
    }

    pub fn override_value(
        mut self,
        network: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<ArgValue>,
    ) -> Self {
        self.overrides
            .entry(network.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    /// The artifact to deploy.
    pub fn contract_name(&self) -> &str {
        self.contract_name.as_deref().unwrap_or(&self.name)
    }

    /// Every unit name this unit references, in declaration order, with
    /// duplicates kept.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        let from_libs = self.libraries.values().filter_map(|reference| match reference {
            LibraryRef::Dynamic(name) => Some(name.as_str()),
            LibraryRef::Address(_) => None,
        });
        let from_args = self.args.iter().flat_map(|arg| arg.reads().iter().map(String::as_str));
        from_libs.chain(from_args)
    }

    /// Value of override `key` on `network`.
    pub fn override_for(&self, network: &str, key: &str) -> Option<&ArgValue> {
        self.overrides.get(network).and_then(|values| values.get(key))
    }
}
