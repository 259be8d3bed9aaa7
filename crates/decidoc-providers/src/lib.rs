//! Provider layer for Decidoc — direct HTTP clients for the model services
//! the pipeline depends on.
//!
//! # Architecture
//!
//! - [`traits::ResponsesApi`] — one-round seam against the LLM responses
//!   gateway; the orchestrator loops over it
//! - [`responses`] — wire types + `OpenAiResponsesClient`
//! - [`classifier`] — short-text classifier RPC with local short-circuit
//!   and neutral fallback

pub mod classifier;
pub mod responses;
pub mod traits;

// Re-export main types for convenience
pub use classifier::ClassifierClient;
pub use responses::{
    ApprovalResponseItem, ContentPart, McpCallError, McpToolRegistration, OpenAiResponsesClient,
    OutputItem, ResponseInput, ResponseRequest, ResponsesPayload, ToolListing,
};
pub use traits::{ProviderError, ResponsesApi};
