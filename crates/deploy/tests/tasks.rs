//! Post-deployment tasks against an in-process chain.

mod common;

use std::collections::BTreeMap;

use alloy_core::{json_abi::JsonAbi, primitives::Address};
use bundl_deploy::{
    ArgValue, Chain, LockEntry, encode_call,
    tasks::{self, DEFAULT_MINING_INTERVAL_MS, EXPOSURE_MINT_ETHER, HEDGE_MINT_ETHER, ether},
};
use common::{MockChain, TestContext, function_abi, init_tracing};
use serde_json::json;

/// Deploy `name` on the mock chain and record it in the lock file with `abi`.
async fn deploy_locked(
    ctx: &TestContext,
    network: &str,
    name: &str,
    abi: serde_json::Value,
) -> Address {
    let receipt = ctx
        .chain
        .deploy(vec![0x60, 0x80].into())
        .await
        .expect("mock deployment");
    let address = receipt.contract_address.expect("contract address");

    ctx.lock
        .write(
            network,
            name,
            LockEntry {
                address,
                abi,
                bytecode_hash: "00".repeat(32),
                contract_name: Some(name.to_string()),
                tx_hash: Some(receipt.tx_hash),
                block_number: receipt.block_number,
                deployed_at: None,
                extra: BTreeMap::new(),
            },
        )
        .expect("lock write");
    address
}

fn expected_call(abi: &serde_json::Value, function: &str, args: &[ArgValue]) -> Vec<u8> {
    let abi: JsonAbi = serde_json::from_value(abi.clone()).unwrap();
    encode_call(&abi, function, args).unwrap().to_vec()
}

#[tokio::test]
async fn test_mint_on_localhost_goes_to_signer() {
    init_tracing();
    let ctx = TestContext::new();
    let abi = function_abi("mintTo", &["address", "uint256"]);
    let exposure = deploy_locked(&ctx, "localhost", "ExposureToken", abi.clone()).await;
    let hedge = deploy_locked(&ctx, "localhost", "HedgeToken", abi.clone()).await;

    let receipt = tasks::mint(&ctx.chain, &ctx.lock, "localhost").await.unwrap();

    let signer = ctx.chain.sender_address();
    assert_eq!(receipt.faucet, signer);

    let calls = ctx.chain.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, exposure);
    assert_eq!(
        calls[0].1.to_vec(),
        expected_call(
            &abi,
            "mintTo",
            &[signer.into(), ether(EXPOSURE_MINT_ETHER).into()]
        )
    );
    assert_eq!(calls[1].0, hedge);
    assert_eq!(
        calls[1].1.to_vec(),
        expected_call(
            &abi,
            "mintTo",
            &[signer.into(), ether(HEDGE_MINT_ETHER).into()]
        )
    );
}

#[tokio::test]
async fn test_mint_without_lock_entries_fails() {
    init_tracing();
    let ctx = TestContext::new();

    let err = tasks::mint(&ctx.chain, &ctx.lock, "localhost")
        .await
        .unwrap_err();

    assert_eq!(err.task, "mint");
    assert!(format!("{err}").contains("ExposureToken"));
    assert!(ctx.chain.calls().is_empty());
}

#[tokio::test]
async fn test_register_balancer() {
    init_tracing();
    let ctx = TestContext::new();
    let registry_abi = function_abi("register", &["address"]);
    let registry = deploy_locked(&ctx, "localhost", "Registry", registry_abi.clone()).await;
    let balancer = deploy_locked(&ctx, "localhost", "Balancer", json!([])).await;

    tasks::register(&ctx.chain, &ctx.lock, "localhost")
        .await
        .unwrap();

    let calls = ctx.chain.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, registry);
    assert_eq!(
        calls[0].1.to_vec(),
        expected_call(&registry_abi, "register", &[balancer.into()])
    );
}

#[tokio::test]
async fn test_register_with_address_and_abi_only_entries() {
    init_tracing();
    let ctx = TestContext::new();
    let registry = Address::repeat_byte(0x21);
    let balancer = Address::repeat_byte(0x22);
    let registry_abi = function_abi("register", &["address"]);
    std::fs::write(
        ctx.lock_path(),
        json!({
            "localhost": {
                "Registry": { "address": registry, "abi": registry_abi },
                "Balancer": { "address": balancer, "abi": [] }
            }
        })
        .to_string(),
    )
    .unwrap();

    tasks::register(&ctx.chain, &ctx.lock, "localhost")
        .await
        .unwrap();

    let calls = ctx.chain.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, registry);
    assert_eq!(
        calls[0].1.to_vec(),
        expected_call(&registry_abi, "register", &[balancer.into()])
    );
}

#[tokio::test]
async fn test_register_reads_only_the_active_network() {
    init_tracing();
    let ctx = TestContext::new();
    let registry_abi = function_abi("register", &["address"]);
    deploy_locked(&ctx, "baseSepolia", "Registry", registry_abi).await;
    deploy_locked(&ctx, "baseSepolia", "Balancer", json!([])).await;

    let err = tasks::register(&ctx.chain, &ctx.lock, "localhost")
        .await
        .unwrap_err();
    assert_eq!(err.task, "register");
}

#[tokio::test]
async fn test_mine_sets_interval() {
    let chain = MockChain::new();

    tasks::mine(&chain, DEFAULT_MINING_INTERVAL_MS).await.unwrap();

    assert_eq!(
        chain.requests(),
        vec![("evm_setIntervalMining".to_string(), vec![json!(2000)])]
    );
}
