//! HTTP retrieval backend.
//!
//! Calls `POST {url}/search` on the retrieval service with
//! `{"query": ..., "limit": top_k}`. The service answers with the top `limit`
//! results for the query:
//!
//! ```json
//! { "searchResults": [ { "content": "...", "score": 0.82,
//!                        "metadata": { "boundingBox": [...], "pageNum": 2, ... } } ],
//!   "records": [ ... ] }
//! ```
//!
//! Results already delivered by an earlier window are sliced off, so each
//! [`ResultPage`] only holds new items.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, ... (capped at 2^5)

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use citation_harness_core::backend::SearchBackend;
use citation_harness_core::error::FetchError;
use citation_harness_core::models::{FetchWindow, NormalizedCitation, ResultPage};
use serde_json::Value;

use crate::config::BackendConfig;

pub struct HttpSearchBackend {
    client: reqwest::Client,
    endpoint: String,
    max_retries: u32,
}

impl HttpSearchBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/search", config.url.trim_end_matches('/')),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(
        &self,
        query: &str,
        window: FetchWindow,
    ) -> Result<ResultPage<NormalizedCitation>, FetchError> {
        let body = serde_json::json!({
            "query": query,
            "limit": window.top_k,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&self.endpoint).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response
                            .json()
                            .await
                            .map_err(|e| FetchError::Decode(e.to_string()))?;
                        return parse_search_response(&json, window);
                    }

                    let message = response.text().await.unwrap_or_default();
                    let err = FetchError::Backend {
                        status: status.as_u16(),
                        message,
                    };

                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::debug!(attempt, "retryable search error: {}", err);
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    tracing::debug!(attempt, "search request failed: {}", e);
                    last_err = Some(FetchError::Network(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| FetchError::Network("search failed after retries".into())))
    }
}

/// Turn the retrieval service's response into the citations of `window`.
///
/// Each result's `metadata` object is merged with its top-level `content`
/// and `score`. Results that do not decode are skipped with a warning.
pub fn parse_search_response(
    json: &Value,
    window: FetchWindow,
) -> Result<ResultPage<NormalizedCitation>, FetchError> {
    let results = json
        .get("searchResults")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Decode("missing searchResults array".into()))?;

    let has_more = results.len() >= window.top_k;
    let consumed = results.len().saturating_sub(window.offset);

    let items = results
        .iter()
        .enumerate()
        .skip(window.offset)
        .filter_map(|(rank, result)| {
            let mut fields = result
                .get("metadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            for key in ["content", "score"] {
                if let Some(v) = result.get(key) {
                    fields.entry(key).or_insert_with(|| v.clone());
                }
            }
            match serde_json::from_value::<NormalizedCitation>(Value::Object(fields)) {
                Ok(citation) => Some(citation),
                Err(e) => {
                    tracing::warn!(rank, "skipping undecodable search result: {}", e);
                    None
                }
            }
        })
        .collect();

    Ok(ResultPage::new(items, has_more).with_consumed(consumed))
}
