//! Responses API trait — the orchestrator's provider seam.
//!
//! The production implementation is `OpenAiResponsesClient` in
//! `responses.rs`; tests substitute scripted mocks.

use async_trait::async_trait;
use thiserror::Error;

use crate::responses::{ResponseRequest, ResponsesPayload};

/// Errors from the responses gateway.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection/timeout level failure.
    #[error("responses request failed: {0}")]
    Transport(String),

    /// Non-2xx answer from the gateway.
    #[error("responses API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// 2xx answer that did not parse.
    #[error("failed to parse responses payload: {0}")]
    Parse(String),
}

/// One round against the responses gateway.
///
/// Implementations must not retry; the orchestrator decides how to degrade
/// on failure (partial results, failure outcome).
#[async_trait]
pub trait ResponsesApi: Send + Sync {
    async fn create(&self, request: &ResponseRequest) -> Result<ResponsesPayload, ProviderError>;
}
