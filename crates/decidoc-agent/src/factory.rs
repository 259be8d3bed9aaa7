//! Orchestrator handle factory.
//!
//! Builds a per-tenant orchestrator with up to three MCP registrations:
//! documentation (Notion), code search (GitHub), and file content (GitHub
//! file gateway). A registration is skipped when its token or gateway URL
//! is missing — the session still runs with whatever tools remain.

use std::sync::Arc;

use tracing::debug;

use decidoc_core::config::{AnalysisConfig, McpConfig, OpenAiConfig};
use decidoc_core::directory::Credentials;
use decidoc_providers::traits::ResponsesApi;

use crate::instructions::AI_INSTRUCTIONS;
use crate::orchestrator::Orchestrator;

/// Notion tools the documentation role is allowed to use.
const NOTION_ALLOWED_TOOLS: &[&str] = &[
    "get_notion_page_content",
    "create_page",
    "search_a_page_in_notion",
    "append_text_block",
    "append_title_block",
    "append_code_block",
    "update_block",
];

/// GitHub search tools.
const GITHUB_ALLOWED_TOOLS: &[&str] = &["search_code", "search_repositories"];

/// GitHub file-content tool.
const GITHUB_FILE_ALLOWED_TOOLS: &[&str] = &["get_github_file_content"];

/// Which provider integrations a session should register.
///
/// The webhook path always wants both; the direct `/analyze` path can turn
/// either off.
#[derive(Clone, Copy, Debug)]
pub struct AnalysisToggles {
    pub use_notion: bool,
    pub use_github: bool,
}

impl Default for AnalysisToggles {
    fn default() -> Self {
        Self {
            use_notion: true,
            use_github: true,
        }
    }
}

/// Build an orchestrator bound to one tenant's credentials.
pub fn build_orchestrator(
    api: Arc<dyn ResponsesApi>,
    openai: &OpenAiConfig,
    mcp: &McpConfig,
    analysis: &AnalysisConfig,
    credentials: &Credentials,
    toggles: AnalysisToggles,
) -> Orchestrator {
    let mut orchestrator = Orchestrator::new(api, openai.model.clone(), AI_INSTRUCTIONS)
        .with_max_approval_iterations(analysis.max_approval_iterations);

    if toggles.use_notion && !mcp.notion_url.is_empty() {
        if let Some(token) = credentials.notion() {
            orchestrator.add_mcp_tool(
                "Notion",
                "Perform actions in Notion",
                mcp.notion_url.clone(),
                "always",
                Some(token.to_string()),
                Some(owned(NOTION_ALLOWED_TOOLS)),
            );
        } else {
            debug!("no notion token, skipping Notion registration");
        }
    }

    if toggles.use_github {
        if let Some(token) = credentials.github() {
            if !mcp.github_url.is_empty() {
                orchestrator.add_mcp_tool(
                    "GitHub",
                    "Perform actions in GitHub",
                    mcp.github_url.clone(),
                    "always",
                    Some(token.to_string()),
                    Some(owned(GITHUB_ALLOWED_TOOLS)),
                );
            }
            if !mcp.github_file_url.is_empty() {
                orchestrator.add_mcp_tool(
                    "GitHubFile",
                    "Fetch file contents from GitHub",
                    mcp.github_file_url.clone(),
                    "always",
                    Some(token.to_string()),
                    Some(owned(GITHUB_FILE_ALLOWED_TOOLS)),
                );
            }
        } else {
            debug!("no github token, skipping GitHub registrations");
        }
    }

    debug!(tools = orchestrator.tool_count(), "orchestrator handle built");
    orchestrator
}

fn owned(tools: &[&str]) -> Vec<String> {
    tools.iter().map(|t| t.to_string()).collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
