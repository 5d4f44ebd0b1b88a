use crate::{ArgValue, Chain, LockStore, TaskError, TxReceipt};

use super::{calldata, locked_unit};

/// Register the deployed `Balancer` with the deployed `Registry`.
pub async fn register<C: Chain>(
    chain: &C,
    lock: &LockStore,
    network: &str,
) -> Result<TxReceipt, TaskError> {
    register_balancer(chain, lock, network)
        .await
        .map_err(|source| TaskError::new("register", source))
}

async fn register_balancer<C: Chain>(
    chain: &C,
    lock: &LockStore,
    network: &str,
) -> anyhow::Result<TxReceipt> {
    let registry = locked_unit(lock, network, "Registry")?;
    let balancer = locked_unit(lock, network, "Balancer")?;

    let data = calldata(&registry, "register", &[ArgValue::Address(balancer.address)])?;
    let receipt = chain.send(registry.address, data).await?;

    tracing::info!(
        registry = %registry.address,
        balancer = %balancer.address,
        tx_hash = %receipt.tx_hash,
        "Balancer registered"
    );
    Ok(receipt)
}
