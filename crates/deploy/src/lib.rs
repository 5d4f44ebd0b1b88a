//! bundl-deploy - Smart contract deployment orchestration.
//!
//! Units declare contracts and libraries to deploy. The crate orders them by
//! the references between them, deploys each one once its dependencies are
//! on chain, and records the results in a per-network lock file so that
//! re-runs only deploy what changed.

mod error;
pub use error::{DeployError, ResolveError, TaskError, VerificationError};

mod unit;
pub use unit::{
    Arg, ArgValue, DeployedContext, DeployedUnit, LibraryRef, ResolverFn, Unit, dynamic_address,
};

mod registry;
pub use registry::{UnitId, UnitRegistry};

mod graph;
pub use graph::DeploymentPlan;

mod fingerprint;
pub use fingerprint::UnitFingerprint;

mod lock;
pub use lock::{LockDocument, LockEntry, LockStore, NetworkLock};

mod artifacts;
pub use artifacts::{Artifact, ArtifactStore, LinkOffset, LinkReferences, coerce, encode_call};

pub mod rpc;

mod chain;
pub use chain::{
    Chain, ChainSigner, DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL, RpcChain, TxReceipt,
};

mod verify;
pub use verify::{
    CompilerInput, DEFAULT_VERIFY_MAX_POLLS, DEFAULT_VERIFY_POLL_INTERVAL, EtherscanVerifier,
    NoVerify, VerificationRequest, Verifier, find_compiler_input,
};

pub mod network;
pub use network::{Accounts, ExplorerConfig, KnownNetwork, NetworkProfile};

mod config;
pub use config::{
    ArgConfig, CONFIG_FILENAME, LibraryConfig, ProjectConfig, UnitConfig, load_dotenv,
};

mod executor;
pub use executor::{
    DeploymentReport, Executor, UnitOutcome, UnitStatus, stale_entries,
};

pub mod tasks;
