//! Shared test infrastructure: an in-process chain and artifact fixtures.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Result;
use bundl_deploy::{ArtifactStore, Chain, LockStore, TxReceipt};
use serde_json::{Value, json};
use tempdir::TempDir;

/// Chain id reported by [`MockChain`].
pub const MOCK_CHAIN_ID: u64 = 31337;

/// Runtime code stored at every address the mock deploys to.
const RUNTIME_CODE: [u8; 2] = [0x60, 0x80];

#[derive(Debug, Default)]
struct MockState {
    code: HashMap<Address, Bytes>,
    /// Init code of every deployment, in order.
    deployments: Vec<Bytes>,
    calls: Vec<(Address, Bytes)>,
    requests: Vec<(String, Vec<Value>)>,
    nonce: u8,
    /// Deployment attempts left before the next one fails.
    fail_after: Option<usize>,
}

/// Chain kept in memory. Deployments land at sequential addresses.
#[derive(Debug)]
pub struct MockChain {
    sender: Address,
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            sender: Address::repeat_byte(0xaa),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Let `successes` deployments through, then fail the next one.
    pub fn fail_deployment_after(&self, successes: usize) {
        self.state.lock().unwrap().fail_after = Some(successes);
    }

    pub fn clear_failure(&self) {
        self.state.lock().unwrap().fail_after = None;
    }

    /// Forget the code at `address`, as after a node restart.
    pub fn wipe_code(&self, address: Address) {
        self.state.lock().unwrap().code.remove(&address);
    }

    pub fn deployments(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().deployments.clone()
    }

    pub fn calls(&self) -> Vec<(Address, Bytes)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn requests(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn sender_address(&self) -> Address {
        self.sender
    }

    fn next_tx(state: &mut MockState) -> (B256, u64) {
        state.nonce += 1;
        (B256::with_last_byte(state.nonce), u64::from(state.nonce))
    }
}

impl Chain for MockChain {
    async fn chain_id(&self) -> Result<u64> {
        Ok(MOCK_CHAIN_ID)
    }

    async fn sender(&self) -> Result<Address> {
        Ok(self.sender)
    }

    async fn deploy(&self, init_code: Bytes) -> Result<TxReceipt> {
        let mut state = self.state.lock().unwrap();
        match state.fail_after {
            Some(0) => anyhow::bail!("transaction reverted"),
            Some(left) => state.fail_after = Some(left - 1),
            None => {}
        }

        let (tx_hash, block_number) = Self::next_tx(&mut state);
        let address = Address::with_last_byte(0x10 + state.nonce);
        state.code.insert(address, Bytes::from_static(&RUNTIME_CODE));
        state.deployments.push(init_code);

        Ok(TxReceipt {
            tx_hash,
            block_number: Some(block_number),
            contract_address: Some(address),
        })
    }

    async fn send(&self, to: Address, data: Bytes) -> Result<TxReceipt> {
        let mut state = self.state.lock().unwrap();
        if !state.code.contains_key(&to) {
            anyhow::bail!("no contract at {to}");
        }

        let (tx_hash, block_number) = Self::next_tx(&mut state);
        state.calls.push((to, data));

        Ok(TxReceipt {
            tx_hash,
            block_number: Some(block_number),
            contract_address: None,
        })
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .code
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.state
            .lock()
            .unwrap()
            .requests
            .push((method.to_string(), params));
        Ok(Value::Null)
    }
}

/// Bytecode of a library placeholder at byte offset 2.
pub const LINKED_BYTECODE: &str =
    "0x6080__$aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa$__6000";

/// A Hardhat-style artifact.
pub fn artifact(name: &str, abi: Value, bytecode: &str, link_references: Value) -> Value {
    json!({
        "contractName": name,
        "sourceName": format!("contracts/{name}.sol"),
        "abi": abi,
        "bytecode": bytecode,
        "linkReferences": link_references,
    })
}

/// Artifact without constructor arguments or libraries.
pub fn plain_artifact(name: &str, bytecode: &str) -> Value {
    artifact(name, json!([]), bytecode, json!({}))
}

/// Artifact linking `library` at offset 2.
pub fn linking_artifact(name: &str, library: &str) -> Value {
    artifact(
        name,
        json!([]),
        LINKED_BYTECODE,
        json!({
            format!("contracts/{library}.sol"): {
                library: [{ "start": 2, "length": 20 }]
            }
        }),
    )
}

/// Artifact whose constructor takes the given Solidity types.
pub fn constructor_artifact(name: &str, bytecode: &str, inputs: &[&str]) -> Value {
    let inputs: Vec<Value> = inputs
        .iter()
        .enumerate()
        .map(|(index, ty)| json!({ "name": format!("arg{index}"), "type": ty, "internalType": ty }))
        .collect();
    artifact(
        name,
        json!([{ "type": "constructor", "inputs": inputs, "stateMutability": "nonpayable" }]),
        bytecode,
        json!({}),
    )
}

/// ABI with a single non-payable function.
pub fn function_abi(name: &str, inputs: &[&str]) -> Value {
    let inputs: Vec<Value> = inputs
        .iter()
        .enumerate()
        .map(|(index, ty)| json!({ "name": format!("arg{index}"), "type": ty, "internalType": ty }))
        .collect();
    json!([{
        "type": "function",
        "name": name,
        "inputs": inputs,
        "outputs": [],
        "stateMutability": "nonpayable"
    }])
}

/// Scratch project: artifacts directory, lock file and mock chain.
pub struct TestContext {
    pub temp_dir: TempDir,
    pub artifacts: ArtifactStore,
    pub lock: LockStore,
    pub chain: MockChain,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new("bundl-test").expect("Failed to create temp dir");
        let artifacts_dir = temp_dir.path().join("out");
        std::fs::create_dir_all(&artifacts_dir).expect("Failed to create artifacts dir");

        Self {
            artifacts: ArtifactStore::new(&artifacts_dir),
            lock: LockStore::file(temp_dir.path().join("local.deployment-lock.json")),
            chain: MockChain::new(),
            temp_dir,
        }
    }

    /// Write `artifact` as `out/<name>.sol/<name>.json`.
    pub fn add_artifact(&self, name: &str, artifact: Value) {
        let dir = self.artifacts.root().join(format!("{name}.sol"));
        std::fs::create_dir_all(&dir).expect("Failed to create artifact dir");
        std::fs::write(dir.join(format!("{name}.json")), artifact.to_string())
            .expect("Failed to write artifact");
    }

    pub fn lock_path(&self) -> PathBuf {
        self.lock.path().map(Path::to_path_buf).expect("file-backed lock store")
    }

    pub fn lock_contents(&self) -> String {
        std::fs::read_to_string(self.lock_path()).expect("Failed to read lock file")
    }
}

/// Route library logs to the test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
