//! Configuration: typed schema + file/env loader.

pub mod loader;
pub mod schema;

pub use loader::{expand_home, get_config_path, load_config};
pub use schema::{
    AnalysisConfig, BatchConfig, ClassifierConfig, Config, DirectoryConfig, McpConfig,
    OpenAiConfig, ServerConfig, SinkConfig,
};
