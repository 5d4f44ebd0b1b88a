use alloy_core::primitives::{Address, U256};
use anyhow::Context;

use crate::{Chain, LockStore, TaskError, TxReceipt, network::FAUCET_ADDRESS_ENV};

use super::{calldata, locked_unit};

/// Amount of `ExposureToken` minted, in ether.
pub const EXPOSURE_MINT_ETHER: u64 = 10_000;

/// Amount of `HedgeToken` minted, in ether.
pub const HEDGE_MINT_ETHER: u64 = 1_000_000_000_000_000;

/// `amount` ether in wei.
pub fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(18u64))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    pub faucet: Address,
    pub exposure: TxReceipt,
    pub hedge: TxReceipt,
}

/// Recipient of minted tokens: the signer on `localhost`, elsewhere the
/// configured faucet or, failing that, the signer.
///
/// `configured` is only parsed off `localhost`.
pub fn faucet_address(
    network: &str,
    signer: Address,
    configured: Option<&str>,
) -> anyhow::Result<Address> {
    if network == "localhost" {
        return Ok(signer);
    }
    match configured.map(str::trim) {
        Some(value) if !value.is_empty() => value
            .parse()
            .with_context(|| format!("{FAUCET_ADDRESS_ENV} is not an address")),
        _ => Ok(signer),
    }
}

/// Mint test tokens to the faucet.
pub async fn mint<C: Chain>(
    chain: &C,
    lock: &LockStore,
    network: &str,
) -> Result<MintReceipt, TaskError> {
    mint_to_faucet(chain, lock, network)
        .await
        .map_err(|source| TaskError::new("mint", source))
}

async fn mint_to_faucet<C: Chain>(
    chain: &C,
    lock: &LockStore,
    network: &str,
) -> anyhow::Result<MintReceipt> {
    let exposure = locked_unit(lock, network, "ExposureToken")?;
    let hedge = locked_unit(lock, network, "HedgeToken")?;

    let configured = std::env::var(FAUCET_ADDRESS_ENV).ok();
    let faucet = faucet_address(network, chain.sender().await?, configured.as_deref())?;
    tracing::info!(%faucet, "Minting tokens");

    let exposure_receipt = chain
        .send(
            exposure.address,
            calldata(
                &exposure,
                "mintTo",
                &[faucet.into(), ether(EXPOSURE_MINT_ETHER).into()],
            )?,
        )
        .await
        .context("ExposureToken mint failed")?;

    let hedge_receipt = chain
        .send(
            hedge.address,
            calldata(
                &hedge,
                "mintTo",
                &[faucet.into(), ether(HEDGE_MINT_ETHER).into()],
            )?,
        )
        .await
        .context("HedgeToken mint failed")?;

    Ok(MintReceipt {
        faucet,
        exposure: exposure_receipt,
        hedge: hedge_receipt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ether_amounts() {
        assert_eq!(ether(1), U256::from(1_000_000_000_000_000_000u128));
        assert_eq!(
            ether(EXPOSURE_MINT_ETHER).to_string(),
            "10000000000000000000000"
        );
        assert_eq!(
            ether(HEDGE_MINT_ETHER).to_string(),
            "1000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_faucet_address() {
        let signer = Address::repeat_byte(0x01);
        let faucet = Address::repeat_byte(0x02);
        let configured = faucet.to_string();

        assert_eq!(
            faucet_address("localhost", signer, Some(&configured)).unwrap(),
            signer
        );
        assert_eq!(
            faucet_address("baseSepolia", signer, Some(&configured)).unwrap(),
            faucet
        );
        assert_eq!(faucet_address("baseSepolia", signer, None).unwrap(), signer);
        assert_eq!(faucet_address("baseSepolia", signer, Some("  ")).unwrap(), signer);
    }

    #[test]
    fn test_malformed_faucet_ignored_on_localhost() {
        let signer = Address::repeat_byte(0x01);

        assert_eq!(
            faucet_address("localhost", signer, Some("not-an-address")).unwrap(),
            signer
        );
        let err = faucet_address("baseSepolia", signer, Some("not-an-address")).unwrap_err();
        assert!(err.to_string().contains(FAUCET_ADDRESS_ENV));
    }
}
