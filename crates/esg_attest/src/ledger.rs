//! Ledger confirmation: wait until a transaction handle is buried under the
//! required number of blocks, within a bounded time.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use esg_common::config::LedgerConfig;
use esg_common::error::LedgerError;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

#[async_trait]
pub trait Ledger: Send + Sync {
    /// `Ok(true)` once `handle` has `depth` confirmations; `Ok(false)` when
    /// the transaction failed on chain or `timeout` elapsed first.
    async fn await_confirmation(
        &self,
        handle: &str,
        depth: u64,
        timeout: Duration,
    ) -> Result<bool, LedgerError>;
}

/// Accept only `0x` followed by 64 hex digits.
pub fn validate_handle(handle: &str) -> Result<(), LedgerError> {
    let valid = handle
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()));
    if valid {
        Ok(())
    } else {
        Err(LedgerError::InvalidHandle(handle.to_string()))
    }
}

/// Decode a JSON-RPC hex quantity such as `"0x1b4"`.
fn parse_quantity(value: &JsonValue) -> Result<u64, LedgerError> {
    value
        .as_str()
        .and_then(|s| s.strip_prefix("0x"))
        .and_then(|hex| u64::from_str_radix(hex, 16).ok())
        .ok_or_else(|| LedgerError::Decode(format!("expected hex quantity, got {}", value)))
}

/// EVM-compatible JSON-RPC ledger, polled for receipt and chain head.
pub struct JsonRpcLedger {
    client: Client,
    rpc_url: String,
    poll_interval: Duration,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        if config.rpc_url.is_empty() {
            return Err(LedgerError::Rpc("ledger rpc url is empty".into()));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.confirm_timeout())
            .build()
            .map_err(|e| LedgerError::Rpc(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            poll_interval: config.poll_interval(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Rpc(format!("{}: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Rpc(format!("{}: HTTP {}", method, status)));
        }

        let mut reply: JsonValue = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("{}: {}", method, e)))?;
        if let Some(err) = reply.get("error").filter(|e| !e.is_null()) {
            return Err(LedgerError::Rpc(format!("{}: {}", method, err)));
        }
        Ok(reply
            .get_mut("result")
            .map(JsonValue::take)
            .unwrap_or(JsonValue::Null))
    }

    /// Poll until the receipt is deep enough or reports failure. Unbounded;
    /// the caller applies the timeout. RPC failures are retried at the poll
    /// interval; malformed replies end the wait.
    async fn poll(&self, handle: &str, depth: u64) -> Result<bool, LedgerError> {
        loop {
            match self.check(handle, depth).await {
                Ok(Some(confirmed)) => return Ok(confirmed),
                Ok(None) => {}
                Err(LedgerError::Rpc(e)) => {
                    warn!("Polling transaction {} failed: {}; retrying", handle, e);
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One receipt check. `None` while the transaction is pending or not yet
    /// deep enough.
    async fn check(&self, handle: &str, depth: u64) -> Result<Option<bool>, LedgerError> {
        let receipt = self
            .call("eth_getTransactionReceipt", json!([handle]))
            .await?;
        if receipt.is_null() {
            return Ok(None);
        }
        if receipt.get("status").and_then(JsonValue::as_str) == Some("0x0") {
            warn!("Transaction {} reverted on chain", handle);
            return Ok(Some(false));
        }
        let mined_in = parse_quantity(&receipt["blockNumber"])?;
        let head = parse_quantity(&self.call("eth_blockNumber", json!([])).await?)?;
        let confirmations = (head + 1).saturating_sub(mined_in);
        debug!(
            "Transaction {}: {} of {} confirmations",
            handle, confirmations, depth
        );
        Ok((confirmations >= depth).then_some(true))
    }
}

impl fmt::Debug for JsonRpcLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcLedger")
            .field("rpc_url", &self.rpc_url)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[async_trait]
impl Ledger for JsonRpcLedger {
    async fn await_confirmation(
        &self,
        handle: &str,
        depth: u64,
        timeout: Duration,
    ) -> Result<bool, LedgerError> {
        validate_handle(handle)?;
        match tokio::time::timeout(timeout, self.poll(handle, depth)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Transaction {} not confirmed within {:?}",
                    handle, timeout
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_http::serve;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    const HANDLE: &str = "0x6f1c2d9a0b7e4c3f8a5d2e1b0c9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3b2a1f";

    fn ledger(url: &str) -> JsonRpcLedger {
        JsonRpcLedger::from_config(&LedgerConfig {
            rpc_url: url.to_string(),
            confirmations: 5,
            confirm_timeout_ms: 2_000,
            poll_interval_ms: 20,
        })
        .unwrap()
    }

    fn method_of(body: &str) -> String {
        let v: JsonValue = serde_json::from_str(body).unwrap();
        v["method"].as_str().unwrap_or_default().to_string()
    }

    #[test]
    fn test_validate_handle() {
        assert!(validate_handle(HANDLE).is_ok());
        assert!(validate_handle("0x1234").is_err());
        assert!(validate_handle(&HANDLE[2..]).is_err());
        assert!(validate_handle(&HANDLE.replace('f', "g")).is_err());
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity(&json!("0x1b4")).unwrap(), 436);
        assert!(parse_quantity(&json!(436)).is_err());
        assert!(parse_quantity(&JsonValue::Null).is_err());
    }

    #[tokio::test]
    async fn test_invalid_handle_issues_no_request() {
        let (url, mut requests) = serve(|_| (200, "{}".to_string())).await;
        let err = ledger(&url)
            .await_confirmation("not-a-hash", 5, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidHandle(_)));
        assert!(requests.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_confirmed_at_depth() {
        let (url, _requests) = serve(|body| {
            let result = match method_of(body).as_str() {
                "eth_getTransactionReceipt" => json!({"blockNumber": "0x10", "status": "0x1"}),
                _ => json!("0x14"),
            };
            (200, json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string())
        })
        .await;
        let confirmed = ledger(&url)
            .await_confirmation(HANDLE, 5, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(confirmed);
    }

    #[tokio::test]
    async fn test_reverted_transaction_is_unconfirmed() {
        let (url, _requests) = serve(|_| {
            let result = json!({"blockNumber": "0x10", "status": "0x0"});
            (200, json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string())
        })
        .await;
        let confirmed = ledger(&url)
            .await_confirmation(HANDLE, 5, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(!confirmed);
    }

    #[tokio::test]
    async fn test_missing_receipt_times_out() {
        let (url, _requests) = serve(|_| {
            (200, json!({"jsonrpc": "2.0", "id": 1, "result": null}).to_string())
        })
        .await;
        let confirmed = ledger(&url)
            .await_confirmation(HANDLE, 5, Duration::from_millis(150))
            .await
            .unwrap();
        assert!(!confirmed);
    }

    #[tokio::test]
    async fn test_persistent_rpc_error_times_out_unconfirmed() {
        let (url, mut requests) = serve(|_| {
            (
                200,
                json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "boom"}})
                    .to_string(),
            )
        })
        .await;
        let confirmed = ledger(&url)
            .await_confirmation(HANDLE, 5, Duration::from_millis(150))
            .await
            .unwrap();
        assert!(!confirmed);
        let mut polls = 0;
        while requests.try_recv().is_ok() {
            polls += 1;
        }
        assert!(polls > 1, "expected retries, saw {} request(s)", polls);
    }

    #[tokio::test]
    async fn test_transient_gateway_error_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let (url, _requests) = serve(move |body| {
            if seen.fetch_add(1, AtomicOrdering::SeqCst) == 0 {
                return (502, "bad gateway".to_string());
            }
            let result = match method_of(body).as_str() {
                "eth_getTransactionReceipt" => json!({"blockNumber": "0x10", "status": "0x1"}),
                _ => json!("0x14"),
            };
            (200, json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string())
        })
        .await;
        let confirmed = ledger(&url)
            .await_confirmation(HANDLE, 5, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(confirmed);
        assert!(calls.load(AtomicOrdering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_malformed_receipt_is_reported() {
        let (url, _requests) = serve(|_| {
            let result = json!({"blockNumber": 16, "status": "0x1"});
            (200, json!({"jsonrpc": "2.0", "id": 1, "result": result}).to_string())
        })
        .await;
        let err = ledger(&url)
            .await_confirmation(HANDLE, 5, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Decode(_)));
    }
}
