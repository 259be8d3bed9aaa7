//! Tool orchestrator — the LLM ↔ MCP approval loop.
//!
//! One `chat()` call runs a full session: an opening request with the
//! composed input, then as many auto-approval continuations as the gateway
//! asks for (bounded by `max_approval_iterations`). Tool calls are
//! accumulated across all iterations and deduplicated on call id, because
//! continuation responses legitimately re-emit earlier call records.
//!
//! Failure policy: a transport error before any successful round yields a
//! failure outcome; a transport error mid-loop terminates the session with
//! the partial tool calls collected so far; hitting the iteration bound is
//! reported but is not an error.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use decidoc_core::types::{AnalysisOutcome, Analyzer, ToolCall, ToolStats};
use decidoc_providers::responses::{
    ApprovalResponseItem, ContentPart, McpToolRegistration, OutputItem, ResponseInput,
    ResponseRequest, ResponsesPayload,
};
use decidoc_providers::traits::ResponsesApi;

/// Default bound on the auto-approval loop.
const DEFAULT_MAX_APPROVAL_ITERATIONS: u32 = 50;

// ─────────────────────────────────────────────
// Local session types
// ─────────────────────────────────────────────

/// A pending tool invocation gated on consent. Always auto-approved here.
#[derive(Clone, Debug, PartialEq)]
pub struct ApprovalRequest {
    pub id: String,
    pub name: String,
    pub server_label: String,
    pub arguments: String,
}

/// One payload reduced to the three disjoint lists the loop consumes, plus
/// any advertised tool listings.
#[derive(Debug, Default)]
struct Extracted {
    content: String,
    tool_calls: Vec<ToolCall>,
    approval_requests: Vec<ApprovalRequest>,
    /// `(server_label, tool_name)` pairs from `mcp_list_tools` items.
    advertised: Vec<(String, String)>,
}

// ─────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────

/// An LLM session handle bound to one tenant's MCP registrations.
pub struct Orchestrator {
    api: Arc<dyn ResponsesApi>,
    model: String,
    instructions: String,
    tools: Vec<McpToolRegistration>,
    max_approval_iterations: u32,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn ResponsesApi>,
        model: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Orchestrator {
            api,
            model: model.into(),
            instructions: instructions.into(),
            tools: Vec::new(),
            max_approval_iterations: DEFAULT_MAX_APPROVAL_ITERATIONS,
        }
    }

    pub fn with_max_approval_iterations(mut self, bound: u32) -> Self {
        self.max_approval_iterations = bound;
        self
    }

    /// Register an MCP server for this session.
    #[allow(clippy::too_many_arguments)]
    pub fn add_mcp_tool(
        &mut self,
        server_label: impl Into<String>,
        server_description: impl Into<String>,
        server_url: impl Into<String>,
        require_approval: impl Into<String>,
        authorization: Option<String>,
        allowed_tools: Option<Vec<String>>,
    ) {
        let mut registration = McpToolRegistration::new(
            server_label,
            server_description,
            server_url,
            require_approval,
        );
        if let Some(token) = authorization {
            registration = registration.with_authorization(token);
        }
        if let Some(tools) = allowed_tools {
            registration = registration.with_allowed_tools(tools);
        }
        self.tools.push(registration);
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Run one full session and return the outcome.
    pub async fn chat(&self, message: &str, system_prompt: Option<&str>) -> AnalysisOutcome {
        let instructions = system_prompt.unwrap_or(&self.instructions).to_string();

        let initial = ResponseRequest {
            model: self.model.clone(),
            instructions: Some(instructions.clone()),
            tools: self.request_tools(),
            input: ResponseInput::Text(message.to_string()),
            previous_response_id: None,
        };

        let mut payload = match self.api.create(&initial).await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "orchestrator session failed before first round");
                return AnalysisOutcome::failure(e.to_string());
            }
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut all_calls: Vec<ToolCall> = Vec::new();
        let mut iterations: u32 = 0;
        let mut approvals_processed: u32 = 0;
        let mut initial_content = String::new();
        let mut final_content = String::new();
        let mut first_round = true;

        loop {
            let extracted = extract(&payload);

            if first_round {
                initial_content = extracted.content.clone();
                first_round = false;
            }
            if !extracted.advertised.is_empty() {
                let retained = filter_advertised(&self.tools, &extracted.advertised);
                debug!(retained = ?retained, "tools retained after allowed-tools filter");
            }

            let fresh = absorb(&mut all_calls, &mut seen, extracted.tool_calls);
            if fresh > 0 {
                debug!(fresh, total = all_calls.len(), "accumulated tool calls");
            }

            if extracted.approval_requests.is_empty() {
                final_content = extracted.content;
                break;
            }
            if iterations >= self.max_approval_iterations {
                warn!(
                    iterations,
                    "approval loop hit iteration bound, returning partial session"
                );
                final_content = extracted.content;
                break;
            }

            iterations += 1;
            approvals_processed += extracted.approval_requests.len() as u32;
            debug!(
                iteration = iterations,
                pending = extracted.approval_requests.len(),
                "auto-approving tool calls"
            );

            let continuation = ResponseRequest {
                model: self.model.clone(),
                instructions: Some(instructions.clone()),
                tools: self.request_tools(),
                input: ResponseInput::Items(
                    extracted
                        .approval_requests
                        .iter()
                        .map(|r| ApprovalResponseItem::approve(r.id.as_str()))
                        .collect(),
                ),
                previous_response_id: Some(payload.id.clone()),
            };

            match self.api.create(&continuation).await {
                Ok(next) => payload = next,
                Err(e) => {
                    warn!(error = %e, "approval continuation failed, keeping partial results");
                    final_content = extracted.content;
                    break;
                }
            }
        }

        let content = if final_content.is_empty() {
            initial_content
        } else {
            final_content
        };
        let tool_stats = ToolStats::from_calls(&all_calls);

        info!(
            tool_calls = tool_stats.total,
            successful = tool_stats.successful,
            approval_iterations = iterations,
            "orchestrator session completed"
        );

        AnalysisOutcome {
            success: true,
            response: content.clone(),
            content,
            tool_calls: all_calls,
            tool_stats,
            response_id: Some(payload.id),
            approval_iterations: iterations,
            total_approvals_processed: approvals_processed,
            error: None,
        }
    }

    fn request_tools(&self) -> Option<Vec<McpToolRegistration>> {
        if self.tools.is_empty() {
            None
        } else {
            Some(self.tools.clone())
        }
    }
}

#[async_trait]
impl Analyzer for Orchestrator {
    async fn analyze(&self, input: &str) -> AnalysisOutcome {
        self.chat(input, None).await
    }
}

// ─────────────────────────────────────────────
// Payload reduction helpers
// ─────────────────────────────────────────────

/// Reduce a payload into content, tool calls, approvals, and listings.
///
/// Content is the first `output_text` span found across message items.
fn extract(payload: &ResponsesPayload) -> Extracted {
    let mut extracted = Extracted::default();

    for item in &payload.output {
        match item {
            OutputItem::Message { content } => {
                if extracted.content.is_empty() {
                    for part in content {
                        if let ContentPart::OutputText { text } = part {
                            extracted.content = text.clone();
                            break;
                        }
                    }
                }
            }
            OutputItem::McpCall {
                id,
                name,
                server_label,
                arguments,
                error,
                output,
            } => {
                extracted.tool_calls.push(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    server_label: server_label.clone(),
                    arguments: arguments.clone(),
                    success: error.is_none(),
                    error: error.as_ref().map(|e| e.message().to_string()),
                    output: output.clone(),
                });
            }
            OutputItem::McpApprovalRequest {
                id,
                name,
                server_label,
                arguments,
            } => {
                extracted.approval_requests.push(ApprovalRequest {
                    id: id.clone(),
                    name: name.clone(),
                    server_label: server_label.clone(),
                    arguments: arguments.clone(),
                });
            }
            OutputItem::McpListTools {
                server_label,
                tools,
            } => {
                for tool in tools {
                    extracted
                        .advertised
                        .push((server_label.clone(), tool.name.clone()));
                }
            }
            OutputItem::Other => {}
        }
    }

    extracted
}

/// Append only calls whose id has not been seen. Returns how many were new.
fn absorb(all: &mut Vec<ToolCall>, seen: &mut HashSet<String>, new: Vec<ToolCall>) -> usize {
    let mut fresh = 0;
    for call in new {
        if seen.insert(call.id.clone()) {
            all.push(call);
            fresh += 1;
        }
    }
    fresh
}

/// Apply the allowed-tools inclusion filter to advertised tools.
///
/// The filter is the union of every registration's `allowed_tools`; when no
/// registration declares one, everything advertised is retained.
fn filter_advertised(
    registrations: &[McpToolRegistration],
    advertised: &[(String, String)],
) -> Vec<String> {
    let allowed: HashSet<&str> = registrations
        .iter()
        .filter_map(|r| r.allowed_tools.as_ref())
        .flatten()
        .map(String::as_str)
        .collect();

    if allowed.is_empty() {
        return advertised.iter().map(|(_, name)| name.clone()).collect();
    }

    advertised
        .iter()
        .filter(|(_, name)| allowed.contains(name.as_str()))
        .map(|(_, name)| name.clone())
        .collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
