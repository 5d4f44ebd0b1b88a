//! Block explorer source verification.

use std::{
    collections::BTreeMap,
    fs,
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::{Artifact, VerificationError, rpc};

/// Default interval between `checkverifystatus` polls.
pub const DEFAULT_VERIFY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of `checkverifystatus` polls.
pub const DEFAULT_VERIFY_MAX_POLLS: usize = 24;

/// What a verifier needs to know about a freshly deployed unit.
#[derive(Debug)]
pub struct VerificationRequest<'a> {
    pub unit: &'a str,
    pub address: Address,
    pub artifact: &'a Artifact,
    /// ABI-encoded constructor arguments.
    pub constructor_args: &'a [u8],
    /// Linked libraries, placeholder name to address.
    pub libraries: &'a BTreeMap<String, Address>,
}

/// Post-deployment verification hook.
pub trait Verifier: Send + Sync {
    fn verify(
        &self,
        request: &VerificationRequest<'_>,
    ) -> impl Future<Output = Result<(), VerificationError>> + Send;
}

/// Verification disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVerify;

impl Verifier for NoVerify {
    async fn verify(&self, _request: &VerificationRequest<'_>) -> Result<(), VerificationError> {
        Ok(())
    }
}

/// `None` disables verification.
impl<V: Verifier> Verifier for Option<V> {
    async fn verify(&self, request: &VerificationRequest<'_>) -> Result<(), VerificationError> {
        match self {
            Some(verifier) => verifier.verify(request).await,
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

impl ExplorerResponse {
    fn result_text(&self) -> String {
        match &self.result {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("verification still pending")]
struct Pending;

/// Solidity compiler input and version for one contract.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerInput {
    /// `path/Source.sol:Name`.
    pub qualified_name: String,
    /// Long compiler version, e.g. `v0.8.24+commit.e11b9ed9`.
    pub compiler_version: String,
    /// Standard JSON input the contract was compiled from.
    pub standard_json: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    solc_long_version: String,
    input: Value,
    #[serde(default)]
    output: Value,
}

/// Etherscan-compatible explorer verifier (Arbiscan, Basescan and the like).
#[derive(Debug)]
pub struct EtherscanVerifier {
    client: reqwest::Client,
    api_url: Url,
    api_key: String,
    build_info_dir: PathBuf,
    poll_interval: Duration,
    max_polls: usize,
}

impl EtherscanVerifier {
    pub fn new(
        api_url: Url,
        api_key: impl Into<String>,
        build_info_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            client: rpc::create_client(rpc::DEFAULT_REQUEST_TIMEOUT)?,
            api_url,
            api_key: api_key.into(),
            build_info_dir: build_info_dir.into(),
            poll_interval: DEFAULT_VERIFY_POLL_INTERVAL,
            max_polls: DEFAULT_VERIFY_MAX_POLLS,
        })
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    async fn submit(&self, request: &VerificationRequest<'_>) -> Result<Option<String>> {
        let input = find_compiler_input(&self.build_info_dir, request.artifact)?;
        let source_code = serde_json::to_string(&input.standard_json)
            .context("Failed to serialize compiler input")?;

        let mut form: Vec<(String, String)> = vec![
            ("apikey".into(), self.api_key.clone()),
            ("module".into(), "contract".into()),
            ("action".into(), "verifysourcecode".into()),
            ("contractaddress".into(), request.address.to_string()),
            ("sourceCode".into(), source_code),
            ("codeformat".into(), "solidity-standard-json-input".into()),
            ("contractname".into(), input.qualified_name.clone()),
            ("compilerversion".into(), input.compiler_version.clone()),
            // Misspelling is part of the explorer API.
            (
                "constructorArguements".into(),
                hex::encode(request.constructor_args),
            ),
        ];
        for (index, (name, address)) in request.libraries.iter().enumerate() {
            let name = name.rsplit_once(':').map_or(name.as_str(), |(_, name)| name);
            form.push((format!("libraryname{}", index + 1), name.to_string()));
            form.push((format!("libraryaddress{}", index + 1), address.to_string()));
        }

        let response: ExplorerResponse = self
            .client
            .post(self.api_url.clone())
            .form(&form)
            .send()
            .await
            .context("Failed to submit verification request")?
            .json()
            .await
            .context("Failed to parse verification response")?;

        let result = response.result_text();
        if is_already_verified(&result) {
            return Ok(None);
        }
        if response.status != "1" {
            anyhow::bail!("explorer rejected submission: {} ({result})", response.message);
        }

        Ok(Some(result))
    }

    async fn submit_and_wait(&self, request: &VerificationRequest<'_>) -> Result<()> {
        let Some(guid) = self.submit(request).await? else {
            tracing::info!(unit = request.unit, address = %request.address, "Already verified");
            return Ok(());
        };
        tracing::debug!(unit = request.unit, %guid, "Verification submitted");

        (|| self.check_status(&guid))
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(self.max_polls),
            )
            .when(|err| err.is::<Pending>())
            .await?;

        tracing::info!(unit = request.unit, address = %request.address, "Verified");
        Ok(())
    }

    async fn check_status(&self, guid: &str) -> Result<()> {
        let response: ExplorerResponse = self
            .client
            .get(self.api_url.clone())
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .context("Failed to query verification status")?
            .json()
            .await
            .context("Failed to parse verification status")?;

        let result = response.result_text();
        if response.status == "1" || is_already_verified(&result) {
            return Ok(());
        }
        if result.to_lowercase().contains("pending") {
            return Err(Pending.into());
        }
        anyhow::bail!("verification failed: {result}")
    }
}

impl Verifier for EtherscanVerifier {
    async fn verify(&self, request: &VerificationRequest<'_>) -> Result<(), VerificationError> {
        self.submit_and_wait(request)
            .await
            .map_err(|source| VerificationError {
                unit: request.unit.to_string(),
                address: request.address.to_string(),
                source,
            })
    }
}

fn is_already_verified(result: &str) -> bool {
    result.to_lowercase().contains("already verified")
}

/// Find the build-info file that compiled `artifact`.
pub fn find_compiler_input(build_info_dir: &Path, artifact: &Artifact) -> Result<CompilerInput> {
    let entries = fs::read_dir(build_info_dir)
        .with_context(|| format!("Failed to read build info in {}", build_info_dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let Ok(build_info) = serde_json::from_str::<BuildInfo>(&content) else {
            tracing::trace!(path = %path.display(), "Skipping unrecognised build info");
            continue;
        };

        if let Some(source) = compiled_source(&build_info, artifact) {
            return Ok(CompilerInput {
                qualified_name: format!("{source}:{}", artifact.contract_name),
                compiler_version: format!("v{}", build_info.solc_long_version),
                standard_json: build_info.input,
            });
        }
    }

    anyhow::bail!(
        "no build info for contract `{}` in {}",
        artifact.contract_name,
        build_info_dir.display()
    )
}

/// Source path under which `build_info` compiled the artifact's contract.
fn compiled_source(build_info: &BuildInfo, artifact: &Artifact) -> Option<String> {
    let contracts = build_info.output.get("contracts")?.as_object()?;
    let name = artifact.contract_name.as_str();

    match &artifact.source_name {
        Some(source) => contracts
            .get(source)
            .and_then(|entries| entries.get(name))
            .map(|_| source.clone()),
        None => contracts
            .iter()
            .find(|(_, entries)| entries.get(name).is_some())
            .map(|(source, _)| source.clone()),
    }
}
