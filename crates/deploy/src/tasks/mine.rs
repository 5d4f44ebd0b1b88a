use serde_json::json;

use crate::{Chain, TaskError};

/// Block interval set by `mine` when none is given.
pub const DEFAULT_MINING_INTERVAL_MS: u64 = 2000;

/// Switch the node to interval mining, one block every `interval_ms`.
pub async fn mine<C: Chain>(chain: &C, interval_ms: u64) -> Result<(), TaskError> {
    chain
        .request("evm_setIntervalMining", vec![json!(interval_ms)])
        .await
        .map_err(|source| TaskError::new("mine", source))?;

    tracing::info!(interval_ms, "Interval mining enabled");
    Ok(())
}
