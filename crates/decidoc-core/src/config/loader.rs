//! Config loader — reads `~/.decidoc/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.decidoc/config.json`
//! 3. Environment variables (override JSON)
//!
//! Two families of env vars are honored: `DECIDOC_<SECTION>__<FIELD>` for
//! decidoc-native settings, and the plain deployment names the service
//! inherited from its operators (`BATCH_TIMEOUT_SECONDS`,
//! `CLASSIFICATION_SERVICE`, `TABLE_NAME`, `OPENAI_API_KEY`, MCP URLs).

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be
/// parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Apply environment variable overrides on top of a loaded config.
fn apply_env_overrides(mut config: Config) -> Config {
    // Server
    if let Ok(val) = std::env::var("DECIDOC_SERVER__HOST") {
        config.server.host = val;
    }
    if let Ok(val) = std::env::var("DECIDOC_SERVER__PORT") {
        if let Ok(p) = val.parse::<u16>() {
            config.server.port = p;
        }
    }

    // Batch window
    if let Ok(val) = std::env::var("BATCH_TIMEOUT_SECONDS") {
        if let Ok(s) = val.parse::<u64>() {
            config.batch.timeout_seconds = s;
        }
    }

    // Classifier
    if let Ok(val) = std::env::var("CLASSIFICATION_SERVICE") {
        if !val.is_empty() {
            config.classifier.base_url = Some(val);
        }
    }

    // OpenAI
    if let Ok(val) = std::env::var("OPENAI_API_KEY") {
        config.openai.api_key = val;
    }
    if let Ok(val) = std::env::var("OPENAI_API_BASE") {
        config.openai.api_base = val;
    }
    if let Ok(val) = std::env::var("OPENAI_MODEL") {
        config.openai.model = val;
    }

    // MCP gateways
    if let Ok(val) = std::env::var("NOTION_MCP_URL") {
        config.mcp.notion_url = val;
    }
    if let Ok(val) = std::env::var("GITHUB_MCP_URL") {
        config.mcp.github_url = val;
    }
    if let Ok(val) = std::env::var("GITHUB_FILE_MCP_URL") {
        config.mcp.github_file_url = val;
    }

    // Sink
    if let Ok(val) = std::env::var("TABLE_NAME") {
        config.sink.table_name = val;
    }
    if let Ok(val) = std::env::var("DECIDOC_SINK__DIR") {
        config.sink.dir = val;
    }

    // Directory
    if let Ok(val) = std::env::var("DECIDOC_DIRECTORY__PATH") {
        config.directory.path = val;
    }

    // Analysis
    if let Ok(val) = std::env::var("DECIDOC_ANALYSIS__DEFAULT_USER_ID") {
        if let Ok(id) = val.parse::<i64>() {
            config.analysis.default_user_id = id;
        }
    }

    config
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path == "~" {
        let home = std::env::var("HOME")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        if path == "~" {
            home
        } else {
            home.join(&path[2..])
        }
    } else {
        PathBuf::from(path)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
