//! HTTP transport for the generation worker, built on `reqwest`.

use std::time::Duration;

use async_trait::async_trait;

use super::{DispatchAck, DispatchError, DispatchRequest, GenerationWorker};
use crate::config::WorkerConfig;

/// Longest response body kept in a rejection error
const MAX_ERROR_BODY_LEN: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpGenerationWorker {
    client: reqwest::Client,
    dispatch_url: String,
    timeout: Duration,
}

impl HttpGenerationWorker {
    pub fn new(dispatch_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            dispatch_url: dispatch_url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.dispatch_url(), config.request_timeout())
    }

    pub fn dispatch_url(&self) -> &str {
        &self.dispatch_url
    }
}

#[async_trait]
impl GenerationWorker for HttpGenerationWorker {
    #[tracing::instrument(skip(self, request), fields(batch_id = %request.batch_id, rows = request.rows.len()))]
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchAck, DispatchError> {
        tracing::debug!(
            url = %self.dispatch_url,
            timeout_ms = self.timeout.as_millis() as u64,
            "Posting batch to generation worker"
        );

        let response = self
            .client
            .post(&self.dispatch_url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout(self.timeout)
                } else if e.is_builder() {
                    DispatchError::Encoding(e.to_string())
                } else {
                    DispatchError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            tracing::debug!(status = status, "Generation worker acknowledged batch");
            return Ok(DispatchAck { status });
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY_LEN {
            let cut = (0..=MAX_ERROR_BODY_LEN)
                .rev()
                .find(|index| body.is_char_boundary(*index))
                .unwrap_or(0);
            body.truncate(cut);
        }

        Err(DispatchError::Rejected { status, body })
    }
}
