use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::{MatchRequest, MatchResult, Matcher};
use crate::config::{MatcherConfig, RequestConfig};
use crate::error::{MatcherError, MatcherResult};

/// Client for a remote semantic matching service
#[derive(Clone)]
pub struct HttpMatcher {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_config: RequestConfig,
}

impl HttpMatcher {
    /// Create a new matcher client
    pub fn new(config: &MatcherConfig, request_config: RequestConfig) -> MatcherResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(MatcherError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a single request (internal)
    async fn execute_request(&self, url: &str, request: &MatchRequest) -> MatcherResult<MatchResult> {
        debug!(
            text_len = request.text.len(),
            history = request.dialogue_history.len(),
            pending = request.pending_recommendations.len(),
            "Calling matcher"
        );

        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                MatcherError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                MatcherError::Http(e)
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(MatcherError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json::<MatchResult>()
            .await
            .map_err(|e| MatcherError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }
}

#[async_trait]
impl Matcher for HttpMatcher {
    async fn match_text(&self, request: &MatchRequest) -> MatcherResult<MatchResult> {
        let url = format!("{}/v1/match", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying matcher request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, request).await {
                Ok(result) => {
                    info!(
                        phenomena = result.phenomena.len(),
                        root_causes = result.root_causes.len(),
                        tickets = result.tickets.len(),
                        needs_clarification = result.needs_clarification,
                        latency_ms = start.elapsed().as_millis(),
                        "Matcher call succeeded"
                    );
                    return Ok(result);
                }
                // A malformed body will not get better on retry.
                Err(e @ MatcherError::InvalidResponse { .. }) => return Err(e),
                Err(e) => {
                    error!(
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Matcher call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(MatcherError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }
}
