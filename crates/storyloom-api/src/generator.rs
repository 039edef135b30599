//! HTTP adapter for the generator contract.
//!
//! The provider receives the `GenerationRequest` as JSON and answers with
//! the structured content as a JSON object.

use async_trait::async_trait;
use reqwest::StatusCode;
use storyloom_core::generator::{
    GenerationError, GenerationRequest, Generator, StructuredContent,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::GeneratorConfig;
use crate::error::AppError;

/// Generator backed by a remote HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpGenerator {
    /// Builds the HTTP client for `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the client cannot be constructed.
    pub fn new(config: &GeneratorConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Config(format!("generator client: {e}")))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn send(&self, request: &GenerationRequest) -> Result<StructuredContent, GenerationError> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| GenerationError::Failed(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            warn!(kind = %request.kind, "generator rate limited the request");
            return Err(GenerationError::RateLimited(describe(status, &body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Failed(describe(status, &body)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerationError::Failed(e.to_string()))?;
        let content: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        if !content.is_object() {
            return Err(GenerationError::Malformed(
                "expected a JSON object".to_owned(),
            ));
        }
        debug!(kind = %request.kind, "generator responded");
        Ok(StructuredContent(content))
    }
}

fn describe(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<StructuredContent, GenerationError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(GenerationError::Cancelled),
            result = self.send(&request) => result,
        }
    }
}
