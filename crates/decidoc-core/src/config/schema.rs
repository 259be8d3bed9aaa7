//! Configuration schema.
//!
//! Hierarchy: `Config` → `ServerConfig`, `BatchConfig`, `ClassifierConfig`,
//! `OpenAiConfig`, `McpConfig`, `SinkConfig`, `DirectoryConfig`,
//! `AnalysisConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.decidoc/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub server: ServerConfig,
    pub batch: BatchConfig,
    pub classifier: ClassifierConfig,
    pub openai: OpenAiConfig,
    pub mcp: McpConfig,
    pub sink: SinkConfig,
    pub directory: DirectoryConfig,
    pub analysis: AnalysisConfig,
}

// ─────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

// ─────────────────────────────────────────────
// Batch coalescer
// ─────────────────────────────────────────────

/// Coalescing window settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchConfig {
    /// Inactivity window in seconds before a channel batch flushes.
    pub timeout_seconds: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { timeout_seconds: 30 }
    }
}

// ─────────────────────────────────────────────
// Classifier service
// ─────────────────────────────────────────────

/// External short-text classifier endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierConfig {
    /// Base URL of the classification service. Unset means every message
    /// gets the neutral default verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

// ─────────────────────────────────────────────
// OpenAI
// ─────────────────────────────────────────────

/// LLM gateway settings for the tool orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: String,
    /// API base URL.
    pub api_base: String,
    /// Model identifier used for every orchestrator session.
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-5-mini".to_string(),
        }
    }
}

impl OpenAiConfig {
    /// Whether an API key is present.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

// ─────────────────────────────────────────────
// MCP gateways
// ─────────────────────────────────────────────

/// URLs of the MCP gateways exposing documentation and code-host tools.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpConfig {
    /// Documentation (Notion) MCP gateway.
    #[serde(default)]
    pub notion_url: String,
    /// Code-host (GitHub) MCP gateway — public endpoint.
    pub github_url: String,
    /// File-content MCP gateway for the code host.
    #[serde(default)]
    pub github_file_url: String,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            notion_url: String::new(),
            github_url: "https://api.githubcopilot.com/mcp/".to_string(),
            github_file_url: String::new(),
        }
    }
}

// ─────────────────────────────────────────────
// Analysis log sink
// ─────────────────────────────────────────────

/// Where persisted classification/analysis records go.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SinkConfig {
    /// Directory holding the append-only log files.
    pub dir: String,
    /// Table identifier (file stem within the sink directory).
    pub table_name: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            dir: "~/.decidoc/log".to_string(),
            table_name: "classification_results".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Tenant directory
// ─────────────────────────────────────────────

/// Location of the tenant directory file (accounts + associations).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectoryConfig {
    pub path: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: "~/.decidoc/directory.json".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Analysis
// ─────────────────────────────────────────────

/// Orchestrator session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    /// Tenant used by the direct `/analyze` path, which carries no team id.
    pub default_user_id: i64,
    /// Bound on the auto-approval loop.
    pub max_approval_iterations: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_user_id: 1,
            max_approval_iterations: 50,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
