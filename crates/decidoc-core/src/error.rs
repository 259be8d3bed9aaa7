//! Error taxonomy for upstream providers.
//!
//! Direct (dashboard-style) calls surface these as typed failures; the
//! webhook pipeline degrades them instead — enrichment errors become empty
//! strings, classifier errors become the neutral verdict, sink errors are
//! logged and swallowed.

use thiserror::Error;

/// Result alias for upstream provider calls.
pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;

/// Errors from external providers (chat platform, classifier, LLM gateway).
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The provider rejected our credentials.
    #[error("upstream rejected credentials: {0}")]
    AuthInvalid(String),

    /// The referenced channel/user/message does not exist upstream.
    #[error("upstream resource not found: {0}")]
    NotFound(String),

    /// Transport failure or 5xx — not retried in the pipeline; the next
    /// message redrives.
    #[error("upstream transport failure: {0}")]
    Transport(String),

    /// The provider answered with an application-level error.
    #[error("upstream API error: {0}")]
    Api(String),
}

impl UpstreamError {
    pub fn auth(msg: impl Into<String>) -> Self {
        UpstreamError::AuthInvalid(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        UpstreamError::NotFound(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        UpstreamError::Transport(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        UpstreamError::Api(msg.into())
    }
}
