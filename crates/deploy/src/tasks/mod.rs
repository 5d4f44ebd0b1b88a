//! Post-deployment tasks.
//!
//! Tasks read unit addresses and ABIs from the lock file of the active network
//! and send transactions to the deployed contracts.

mod mine;
pub use mine::{DEFAULT_MINING_INTERVAL_MS, mine};

mod mint;
pub use mint::{EXPOSURE_MINT_ETHER, HEDGE_MINT_ETHER, MintReceipt, ether, faucet_address, mint};

mod register;
pub use register::register;

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use anyhow::Context;

use crate::{ArgValue, LockEntry, LockStore, encode_call};

/// Lock entry of `unit` on `network`.
fn locked_unit(lock: &LockStore, network: &str, unit: &str) -> anyhow::Result<LockEntry> {
    lock.entry(network, unit)?.with_context(|| {
        format!("unit `{unit}` has no lock entry on network `{network}`; deploy it first")
    })
}

/// Calldata for `function` of a locked unit, encoded with the unit's ABI.
fn calldata(entry: &LockEntry, function: &str, args: &[ArgValue]) -> anyhow::Result<Bytes> {
    let abi: JsonAbi =
        serde_json::from_value(entry.abi.clone()).context("Lock entry holds an invalid ABI")?;
    encode_call(&abi, function, args)
}
