//! Decidoc Agent — the tool orchestrator.
//!
//! This crate contains:
//! - **orchestrator**: the LLM ↔ MCP approval loop with tool-call
//!   deduplication and per-session stats
//! - **factory**: builds per-tenant orchestrator handles from credentials
//!   and gateway config
//! - **instructions**: the fixed documentation-generator role prompt

pub mod factory;
pub mod instructions;
pub mod orchestrator;

pub use factory::{build_orchestrator, AnalysisToggles};
pub use instructions::AI_INSTRUCTIONS;
pub use orchestrator::{ApprovalRequest, Orchestrator};
