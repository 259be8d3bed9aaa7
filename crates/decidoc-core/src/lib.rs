//! Decidoc core — shared data model, configuration, tenant directory,
//! error taxonomy, and the analysis log sink.
//!
//! # Architecture
//!
//! - [`types`] — ingest events, classification + analysis records, tool
//!   calls, the [`types::Analyzer`] seam trait
//! - [`config`] — typed config schema + file/env loader
//! - [`directory`] — read-only tenant directory (credentials + associations)
//! - [`sink`] — best-effort append-only analysis log
//! - [`error`] — typed upstream error taxonomy

pub mod config;
pub mod directory;
pub mod error;
pub mod sink;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use config::{load_config, Config};
pub use directory::{Credentials, Directory, UserAccount};
pub use error::{UpstreamError, UpstreamResult};
pub use sink::{AnalysisLog, JsonlAnalysisLog};
pub use types::{
    AnalysisOutcome, AnalysisRecord, Analyzer, Classification, ClassificationLabel,
    ClassificationRecord, EnrichedMessage, IngestEvent, LinkedDatabase, ToolCall, ToolStats,
    UserProfile,
};
