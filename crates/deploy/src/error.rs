//! Error taxonomy for planning, deploying and running tasks.

use thiserror::Error;

/// Errors raised while validating a unit set, before anything touches a chain.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A unit references a name that is not declared in the registry.
    #[error("unit `{unit}` references unknown unit `{reference}`")]
    UnknownReference { unit: String, reference: String },

    /// The reference graph contains a cycle. Members are listed in cycle order.
    #[error("cyclic dependency between units: {}", .members.join(" -> "))]
    CyclicDependency { members: Vec<String> },

    /// Two units were declared with the same name.
    #[error("unit `{0}` is declared more than once")]
    DuplicateUnit(String),
}

/// Errors raised by a deployment run.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The unit set is invalid.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A pre-flight check failed; no transaction has been sent.
    #[error("pre-flight check failed for unit `{unit}`: {source:#}")]
    Preflight {
        unit: String,
        #[source]
        source: anyhow::Error,
    },

    /// Constructor arguments or library addresses could not be resolved.
    #[error("failed to resolve arguments of unit `{unit}`: {source:#}")]
    Argument {
        unit: String,
        #[source]
        source: anyhow::Error,
    },

    /// The deployment transaction of a unit failed. Units deployed before it
    /// remain recorded in the lock file.
    #[error("deployment of unit `{unit}` on network `{network}` failed: {source:#}")]
    Transaction {
        unit: String,
        network: String,
        #[source]
        source: anyhow::Error,
    },

    /// The chain could not be queried, or is not the chain the network
    /// profile expects.
    #[error("chain error on network `{network}`: {source:#}")]
    Chain {
        network: String,
        #[source]
        source: anyhow::Error,
    },

    /// The lock file could not be read or written.
    #[error("lock file error: {0:#}")]
    Lock(#[source] anyhow::Error),
}

/// Explorer verification failure. Never fails a deployment run.
#[derive(Debug, Error)]
#[error("verification of `{unit}` at {address} failed: {source:#}")]
pub struct VerificationError {
    pub unit: String,
    pub address: String,
    #[source]
    pub source: anyhow::Error,
}

/// Failure inside a post-deployment task.
#[derive(Debug, Error)]
#[error("task `{task}` failed: {source:#}")]
pub struct TaskError {
    pub task: &'static str,
    #[source]
    pub source: anyhow::Error,
}

impl TaskError {
    pub fn new(task: &'static str, source: anyhow::Error) -> Self {
        Self { task, source }
    }
}
