//! External scorer: takes a page of payloads, returns a ledger transaction
//! handle and one index per payload.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use esg_common::config::ScorerConfig;
use esg_common::error::ScorerError;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::transform::AttestPayload;

/// Scorer response for one submitted page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationResult {
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    #[serde(rename = "entryIndex")]
    pub entry_index: Vec<i64>,
    pub count: usize,
}

impl AttestationResult {
    /// `count == entry_index.len() == page_len`. Indices may only be written
    /// back when this holds.
    pub fn matches_page(&self, page_len: usize) -> bool {
        self.count == page_len && self.entry_index.len() == page_len
    }
}

#[async_trait]
pub trait Scorer: Send + Sync {
    /// Submit one whole page in a single call.
    async fn submit(&self, payloads: &[AttestPayload]) -> Result<AttestationResult, ScorerError>;
}

/// Scorer reached over HTTP: POST a JSON array, optional bearer token.
pub struct HttpScorer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpScorer {
    pub fn from_config(config: &ScorerConfig) -> Result<Self, ScorerError> {
        if config.endpoint.is_empty() {
            return Err(ScorerError::Request("scorer endpoint is empty".into()));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ScorerError::Request(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: (!config.api_key.is_empty()).then(|| config.api_key.clone()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Debug for HttpScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpScorer")
            .field("endpoint", &self.endpoint)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn submit(&self, payloads: &[AttestPayload]) -> Result<AttestationResult, ScorerError> {
        let mut request = self.client.post(&self.endpoint).json(payloads);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ScorerError::Request(format!("scorer request timed out: {}", e))
            } else if e.is_connect() {
                ScorerError::Request(format!("failed to connect to scorer: {}", e))
            } else {
                ScorerError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScorerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<AttestationResult>()
            .await
            .map_err(|e| ScorerError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_http::serve;
    use crate::transform::to_payload;
    use esg_common::record::Record;

    fn config(endpoint: &str, key: &str) -> ScorerConfig {
        ScorerConfig {
            endpoint: endpoint.to_string(),
            api_key: key.to_string(),
            request_timeout_ms: 5_000,
        }
    }

    #[test]
    fn test_matches_page() {
        let r = AttestationResult {
            tx_hash: "0xab".into(),
            entry_index: vec![1, 2, 3],
            count: 3,
        };
        assert!(r.matches_page(3));
        assert!(!r.matches_page(4));
        let lying_count = AttestationResult { count: 4, ..r };
        assert!(!lying_count.matches_page(3));
    }

    #[test]
    fn test_debug_hides_key() {
        let scorer = HttpScorer::from_config(&config("http://localhost:1/x", "secret")).unwrap();
        let dbg = format!("{:?}", scorer);
        assert!(dbg.contains("has_api_key: true"));
        assert!(!dbg.contains("secret"));
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        assert!(HttpScorer::from_config(&config("", "")).is_err());
    }

    #[tokio::test]
    async fn test_submit_posts_array_with_bearer() {
        let (url, mut requests) = serve(|_| {
            (
                200,
                r#"{"txHash":"0xfeed","entryIndex":[10,11],"count":2}"#.to_string(),
            )
        })
        .await;
        let scorer = HttpScorer::from_config(&config(&url, "k3y")).unwrap();
        let payloads = vec![to_payload(&Record::empty()), to_payload(&Record::empty())];

        let result = scorer.submit(&payloads).await.unwrap();
        assert_eq!(result.tx_hash, "0xfeed");
        assert_eq!(result.entry_index, vec![10, 11]);

        let req = requests.recv().await.unwrap();
        assert!(req.head.starts_with("POST "));
        assert!(req
            .head
            .to_ascii_lowercase()
            .contains("authorization: bearer k3y"));
        let sent: serde_json::Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(sent.as_array().unwrap().len(), 2);
        assert_eq!(sent[0]["dataTime"], 0);
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let (url, _requests) = serve(|_| (503, r#"{"error":"busy"}"#.to_string())).await;
        let scorer = HttpScorer::from_config(&config(&url, "")).unwrap();
        match scorer.submit(&[]).await {
            Err(ScorerError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert!(body.contains("busy"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let (url, _requests) = serve(|_| (200, r#"{"hash":"0x1"}"#.to_string())).await;
        let scorer = HttpScorer::from_config(&config(&url, "")).unwrap();
        assert!(matches!(
            scorer.submit(&[]).await,
            Err(ScorerError::Decode(_))
        ));
    }
}
