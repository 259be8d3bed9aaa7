//! OpenAI Responses API client — request/payload wire types plus the
//! reqwest implementation of [`ResponsesApi`].
//!
//! The orchestrator drives multi-turn sessions against `POST {base}/responses`:
//! an initial request with a text input, then continuation requests keyed by
//! `previous_response_id` whose input is a batch of `mcp_approval_response`
//! items. MCP tools are registered per request; the gateway owns the tool
//! handshake and surfaces `mcp_call` / `mcp_approval_request` /
//! `mcp_list_tools` items in the output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::traits::{ProviderError, ResponsesApi};

// ─────────────────────────────────────────────
// Request types
// ─────────────────────────────────────────────

/// An MCP server registration attached to a responses request.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct McpToolRegistration {
    #[serde(rename = "type")]
    pub kind: String,
    pub server_label: String,
    pub server_description: String,
    pub server_url: String,
    /// `"never"`, `"always"`, or `"auto"`.
    pub require_approval: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    /// Inclusion filter over the server's advertised tools; absent = all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
}

impl McpToolRegistration {
    pub fn new(
        server_label: impl Into<String>,
        server_description: impl Into<String>,
        server_url: impl Into<String>,
        require_approval: impl Into<String>,
    ) -> Self {
        McpToolRegistration {
            kind: "mcp".to_string(),
            server_label: server_label.into(),
            server_description: server_description.into(),
            server_url: server_url.into(),
            require_approval: require_approval.into(),
            authorization: None,
            allowed_tools: None,
        }
    }

    pub fn with_authorization(mut self, token: impl Into<String>) -> Self {
        self.authorization = Some(token.into());
        self
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = Some(tools);
        self
    }
}

/// Input of a responses request: plain text for the opening round, approval
/// responses for continuations.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ResponseInput {
    Text(String),
    Items(Vec<ApprovalResponseItem>),
}

/// An auto-approval emitted for one pending `mcp_approval_request`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ApprovalResponseItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub approve: bool,
    pub approval_request_id: String,
}

impl ApprovalResponseItem {
    /// Approve the request with the given id.
    pub fn approve(request_id: impl Into<String>) -> Self {
        ApprovalResponseItem {
            kind: "mcp_approval_response".to_string(),
            approve: true,
            approval_request_id: request_id.into(),
        }
    }
}

/// Body of `POST /responses`.
#[derive(Clone, Debug, Serialize)]
pub struct ResponseRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<McpToolRegistration>>,
    pub input: ResponseInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

// ─────────────────────────────────────────────
// Payload types
// ─────────────────────────────────────────────

/// A parsed response from the gateway.
#[derive(Clone, Debug, Deserialize)]
pub struct ResponsesPayload {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

/// One item of the response `output` array, discriminated by `type`.
///
/// Unknown kinds deserialize to `Other` instead of failing the payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum OutputItem {
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(rename = "mcp_call")]
    McpCall {
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        server_label: String,
        #[serde(default)]
        arguments: String,
        #[serde(default)]
        error: Option<McpCallError>,
        #[serde(default)]
        output: Option<String>,
    },
    #[serde(rename = "mcp_approval_request")]
    McpApprovalRequest {
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        server_label: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(rename = "mcp_list_tools")]
    McpListTools {
        #[serde(default)]
        server_label: String,
        #[serde(default)]
        tools: Vec<ToolListing>,
    },
    #[serde(other)]
    Other,
}

/// A content part inside a `message` output item.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "output_text")]
    OutputText { text: String },
    #[serde(other)]
    Other,
}

/// Tool call errors arrive either as a bare string or as `{message}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum McpCallError {
    Text(String),
    Object { message: String },
}

impl McpCallError {
    pub fn message(&self) -> &str {
        match self {
            McpCallError::Text(s) => s,
            McpCallError::Object { message } => message,
        }
    }
}

/// One advertised tool inside an `mcp_list_tools` item.
#[derive(Clone, Debug, Deserialize)]
pub struct ToolListing {
    pub name: String,
}

// ─────────────────────────────────────────────
// HTTP client
// ─────────────────────────────────────────────

/// Reqwest-backed [`ResponsesApi`] implementation.
pub struct OpenAiResponsesClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiResponsesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiResponsesClient")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl OpenAiResponsesClient {
    /// Create a client for the given API base (e.g. `https://api.openai.com/v1`).
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        OpenAiResponsesClient {
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
        }
    }

    fn responses_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/responses", base)
    }
}

#[async_trait]
impl ResponsesApi for OpenAiResponsesClient {
    async fn create(&self, request: &ResponseRequest) -> Result<ResponsesPayload, ProviderError> {
        debug!(
            model = %request.model,
            tools = request.tools.as_ref().map_or(0, |t| t.len()),
            continuation = request.previous_response_id.is_some(),
            "Calling responses gateway"
        );

        let result = self
            .client
            .post(self.responses_url())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await;

        let response = match result {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = %e, "responses HTTP request failed");
                return Err(ProviderError::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(status = %status, body = %body, "responses API error");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        match response.json::<ResponsesPayload>().await {
            Ok(payload) => {
                debug!(
                    id = %payload.id,
                    items = payload.output.len(),
                    "responses payload received"
                );
                Ok(payload)
            }
            Err(e) => {
                error!(error = %e, "failed to parse responses payload");
                Err(ProviderError::Parse(e.to_string()))
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
