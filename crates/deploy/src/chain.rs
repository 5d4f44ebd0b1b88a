//! Chain access used by the executor and the tasks.

use std::{future::Future, time::Duration};

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use url::Url;

use crate::rpc;

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default time to wait for a transaction to be mined.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Gas estimate margin, in percent.
const GAS_MARGIN_PERCENT: u64 = 20;

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    /// Set for contract creations.
    pub contract_address: Option<Address>,
}

/// Operations the deployer needs from a chain.
///
/// Every transaction-sending method resolves only once the transaction is
/// mined, and fails if it reverted.
pub trait Chain: Send + Sync {
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Account that signs transactions.
    fn sender(&self) -> impl Future<Output = Result<Address>> + Send;

    /// Send a contract creation transaction with `init_code`.
    fn deploy(&self, init_code: Bytes) -> impl Future<Output = Result<TxReceipt>> + Send;

    /// Send a call transaction to `to`.
    fn send(&self, to: Address, data: Bytes) -> impl Future<Output = Result<TxReceipt>> + Send;

    /// Runtime code at `address`; empty when nothing is deployed there.
    fn code_at(&self, address: Address) -> impl Future<Output = Result<Bytes>> + Send;

    /// Raw JSON-RPC request, for node-specific methods such as
    /// `evm_setIntervalMining`.
    fn request(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> impl Future<Output = Result<Value>> + Send;
}

/// How transactions are signed.
#[derive(Debug, Clone)]
pub enum ChainSigner {
    /// Sign locally and submit with `eth_sendRawTransaction`.
    Local(PrivateKeySigner),
    /// Use the node's first unlocked account with `eth_sendTransaction`.
    Node,
}

impl ChainSigner {
    /// A local signer for `key`. The zero key is the placeholder used when no
    /// key is configured and is rejected.
    pub fn from_private_key(key: B256) -> Result<Self> {
        if key.is_zero() {
            anyhow::bail!("no deployer private key configured (set PRIVATE_KEY)");
        }
        let signer = PrivateKeySigner::from_bytes(&key).context("Invalid deployer private key")?;
        Ok(Self::Local(signer))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// [`Chain`] over HTTP JSON-RPC.
#[derive(Debug)]
pub struct RpcChain {
    client: reqwest::Client,
    url: Url,
    signer: ChainSigner,
    poll_interval: Duration,
    confirmation_timeout: Duration,
    chain_id: OnceCell<u64>,
    node_account: OnceCell<Address>,
}

impl RpcChain {
    pub fn new(url: Url, signer: ChainSigner) -> Result<Self> {
        Ok(Self {
            client: rpc::create_client(rpc::DEFAULT_REQUEST_TIMEOUT)?,
            url,
            signer,
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            chain_id: OnceCell::new(),
            node_account: OnceCell::new(),
        })
    }

    /// Set how often receipts are polled and how long to wait overall.
    pub fn with_confirmation(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.confirmation_timeout = timeout;
        self
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T> {
        rpc::json_rpc_call(&self.client, self.url.as_str(), method, params).await
    }

    async fn quantity(&self, method: &str, params: Vec<Value>) -> Result<u128> {
        let hex: String = self.call(method, params).await?;
        u128::from_str_radix(hex.trim_start_matches("0x"), 16)
            .with_context(|| format!("{method} returned a malformed quantity: {hex}"))
    }

    /// Submit a transaction and return its hash.
    async fn submit(&self, to: Option<Address>, data: Bytes) -> Result<B256> {
        let from = self.sender().await?;
        let mut request = json!({ "from": from, "data": data });
        if let Some(to) = to {
            request["to"] = json!(to);
        }

        let signer = match &self.signer {
            ChainSigner::Node => {
                return self.call("eth_sendTransaction", vec![request]).await;
            }
            ChainSigner::Local(signer) => signer,
        };

        let chain_id = self.chain_id().await?;
        let nonce = self
            .quantity("eth_getTransactionCount", vec![json!(from), json!("pending")])
            .await?;
        let gas_price = self.quantity("eth_gasPrice", Vec::new()).await?;
        let estimate = self
            .quantity("eth_estimateGas", vec![request])
            .await
            .context("Gas estimation failed; the transaction would revert")?;
        let gas_limit = u64::try_from(estimate)? * (100 + GAS_MARGIN_PERCENT) / 100;

        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce: u64::try_from(nonce)?,
            gas_price,
            gas_limit,
            to: to.map_or(TxKind::Create, TxKind::Call),
            value: U256::ZERO,
            input: data,
        };
        let signature = signer
            .sign_hash_sync(&tx.signature_hash())
            .context("Failed to sign transaction")?;
        let raw = TxEnvelope::from(tx.into_signed(signature)).encoded_2718();

        self.call(
            "eth_sendRawTransaction",
            vec![json!(format!("0x{}", hex::encode(raw)))],
        )
        .await
    }

    /// Poll for the receipt of `tx_hash` until it is mined.
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt> {
        let attempts = (self.confirmation_timeout.as_millis()
            / self.poll_interval.as_millis().max(1))
        .max(1) as usize;

        let fetch = || async {
            let receipt: Option<RawReceipt> = self
                .call("eth_getTransactionReceipt", vec![json!(tx_hash)])
                .await?;
            receipt.context("transaction not mined yet")
        };

        let receipt = fetch
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(attempts),
            )
            .notify(|err, _| tracing::trace!(%tx_hash, error = %err, "Waiting for receipt"))
            .await
            .with_context(|| format!("Transaction {tx_hash} was not confirmed"))?;

        if receipt.status.as_deref() == Some("0x0") {
            anyhow::bail!("transaction {tx_hash} reverted");
        }

        let block_number = match receipt.block_number.as_deref() {
            Some(number) => Some(rpc::parse_quantity(number)?),
            None => None,
        };

        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number,
            contract_address: receipt.contract_address,
        })
    }
}

impl Chain for RpcChain {
    async fn chain_id(&self) -> Result<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                let id = self.quantity("eth_chainId", Vec::new()).await?;
                Ok::<_, anyhow::Error>(u64::try_from(id)?)
            })
            .await
            .copied()
    }

    async fn sender(&self) -> Result<Address> {
        match &self.signer {
            ChainSigner::Local(signer) => Ok(signer.address()),
            ChainSigner::Node => self
                .node_account
                .get_or_try_init(|| async {
                    let accounts: Vec<Address> = self.call("eth_accounts", Vec::new()).await?;
                    accounts
                        .first()
                        .copied()
                        .context("node exposes no unlocked account and no private key is set")
                })
                .await
                .copied(),
        }
    }

    async fn deploy(&self, init_code: Bytes) -> Result<TxReceipt> {
        let tx_hash = self.submit(None, init_code).await?;
        tracing::debug!(%tx_hash, "Deployment transaction sent");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if receipt.contract_address.is_none() {
            anyhow::bail!("receipt of {tx_hash} carries no contract address");
        }
        Ok(receipt)
    }

    async fn send(&self, to: Address, data: Bytes) -> Result<TxReceipt> {
        let tx_hash = self.submit(Some(to), data).await?;
        tracing::debug!(%tx_hash, %to, "Transaction sent");

        self.wait_for_receipt(tx_hash).await
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.call("eth_getCode", vec![json!(address), json!("latest")])
            .await
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.call(method, params).await
    }
}
