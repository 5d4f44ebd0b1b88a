//! Shared utilities for talking to Ethereum JSON-RPC endpoints.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Default timeout for a single RPC request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// An error response is turned into an error carrying the node's code and
/// message. A `null` result deserializes into `Option::None` when `T` is an
/// `Option`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {method} request"))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {method} response"))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "{method} returned RPC error {}: {}",
            error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .with_context(|| format!("No result in {method} response"))?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {method} result"))
}

/// Parse a hex quantity such as `0x1a`.
pub fn parse_quantity(s: &str) -> Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x66eee").unwrap(), 421614);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
    }
}
