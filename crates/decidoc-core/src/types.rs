//! Core types for Decidoc — the data model shared by the intake pipeline,
//! the batch coalescer, and the tool orchestrator.
//!
//! Wire-facing records (classification results, analysis results) keep the
//! camelCase field names of the persisted log format; in-process types stay
//! plain Rust structs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils;

// ─────────────────────────────────────────────
// Ingest events
// ─────────────────────────────────────────────

/// A single chat message event routed out of the webhook envelope.
///
/// Lives for one webhook handler invocation plus the batch window.
#[derive(Clone, Debug)]
pub struct IngestEvent {
    /// Verification token sent by the provider (unused beyond logging).
    pub token: Option<String>,
    /// Workspace/team identifier — the tenant routing key.
    pub team_id: String,
    /// Provider-assigned event id.
    pub event_id: String,
    /// Provider-assigned event time (epoch seconds).
    pub event_time: i64,
    /// External channel id (e.g. `"C024BE91L"`).
    pub channel_id: String,
    /// Sender user id within the chat provider (not the tenant).
    pub user_id: String,
    /// Raw message text.
    pub text: String,
    /// Slack-style decimal timestamp string (e.g. `"1712345678.000200"`).
    pub ts: String,
    /// Channel type (`"channel"`, `"group"`, `"im"`).
    pub channel_type: String,
    /// Present when the message was produced by a bot.
    pub bot_id: Option<String>,
    /// Message subtype (e.g. `"message_deleted"`), if any.
    pub subtype: Option<String>,
}

/// Sender enrichment attached to a message before analysis.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    /// Job title from the chat provider profile.
    pub role: String,
    /// Real name from the chat provider profile.
    pub name: String,
    /// Permalink to the original message.
    pub message_link: String,
}

/// A batch element: the routed event plus its enrichment.
///
/// Owned exclusively by the batch that holds it until flush.
#[derive(Clone, Debug)]
pub struct EnrichedMessage {
    pub event: IngestEvent,
    pub profile: UserProfile,
}

impl EnrichedMessage {
    pub fn new(event: IngestEvent, profile: UserProfile) -> Self {
        Self { event, profile }
    }
}

// ─────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────

/// Label assigned by the short-text classifier.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationLabel {
    Decision,
    Explanation,
    Question,
    GeneralConversation,
    None,
}

impl ClassificationLabel {
    /// The wire string for this label (matches the serialized form).
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationLabel::Decision => "DECISION",
            ClassificationLabel::Explanation => "EXPLANATION",
            ClassificationLabel::Question => "QUESTION",
            ClassificationLabel::GeneralConversation => "GENERAL_CONVERSATION",
            ClassificationLabel::None => "NONE",
        }
    }
}

/// Classifier verdict for one message.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    #[serde(rename = "classification")]
    pub label: ClassificationLabel,
    pub confidence: f64,
}

impl Classification {
    pub fn new(label: ClassificationLabel, confidence: f64) -> Self {
        Self { label, confidence }
    }

    /// Fallback when the classifier service is unavailable.
    pub fn neutral() -> Self {
        Self::new(ClassificationLabel::GeneralConversation, 0.5)
    }

    /// Verdict for texts under the token threshold.
    pub fn too_short() -> Self {
        Self::new(ClassificationLabel::None, 0.0)
    }
}

// ─────────────────────────────────────────────
// Persisted records
// ─────────────────────────────────────────────

/// Classification record written synchronously in the webhook path.
///
/// `user_id` identifies the *owning tenant* (resolved via team-id reverse
/// lookup), never the message sender.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRecord {
    pub message_id: String,
    pub original_message: String,
    pub classification: ClassificationLabel,
    pub confidence: String,
    pub datetime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(rename = "slackChannelId", skip_serializing_if = "Option::is_none")]
    pub slack_channel_id: Option<String>,
    #[serde(rename = "slackChannelName", skip_serializing_if = "Option::is_none")]
    pub slack_channel_name: Option<String>,
}

impl ClassificationRecord {
    /// Build a record for a direct classification (no channel context).
    pub fn new(message: impl Into<String>, result: &Classification) -> Self {
        ClassificationRecord {
            message_id: uuid::Uuid::new_v4().to_string(),
            original_message: message.into(),
            classification: result.label,
            confidence: result.confidence.to_string(),
            datetime: utils::timestamp(),
            user_id: None,
            slack_channel_id: None,
            slack_channel_name: None,
        }
    }

    /// Attach tenant and channel attribution (webhook path).
    pub fn with_channel(
        mut self,
        user_id: i64,
        channel_id: impl Into<String>,
        channel_name: impl Into<String>,
    ) -> Self {
        self.user_id = Some(user_id);
        self.slack_channel_id = Some(channel_id.into());
        self.slack_channel_name = Some(channel_name.into());
        self
    }
}

/// Analysis record written after a flush that produced at least one tool call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub message_id: String,
    pub original_message: String,
    pub ai_response: String,
    pub tools_used: usize,
    pub tools_successful: usize,
    pub tools_failed: usize,
    /// Integer percent (0–100).
    pub success_rate: i64,
    pub timestamp: String,
}

impl AnalysisRecord {
    /// Derive a record from an orchestrator outcome.
    ///
    /// The key is content-stable: the same input text always maps to the
    /// same `messageId`, so re-analysis overwrites logically rather than
    /// accumulating duplicates downstream.
    pub fn from_outcome(input: &str, outcome: &AnalysisOutcome) -> Self {
        AnalysisRecord {
            message_id: format!("analysis_{}", utils::stable_hash(input)),
            original_message: input.to_string(),
            ai_response: if outcome.content.is_empty() {
                outcome.response.clone()
            } else {
                outcome.content.clone()
            },
            tools_used: outcome.tool_stats.total,
            tools_successful: outcome.tool_stats.successful,
            tools_failed: outcome.tool_stats.failed,
            success_rate: outcome.tool_stats.success_rate as i64,
            timestamp: utils::timestamp(),
        }
    }
}

// ─────────────────────────────────────────────
// Linked databases (association projection)
// ─────────────────────────────────────────────

/// A documentation database a tenant has linked to a chat channel.
///
/// Read-only to the core pipeline; produced by the tenant directory.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LinkedDatabase {
    pub association_id: i64,
    pub internal_db_id: i64,
    pub external_db_id: String,
    pub database_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub auto_sync: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ─────────────────────────────────────────────
// Tool calls and analysis outcomes
// ─────────────────────────────────────────────

/// One completed tool invocation observed during an orchestrator session.
///
/// Uniqueness key is `id`: providers legitimately re-emit prior calls in
/// continuation responses, and accumulation deduplicates on it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub server_label: String,
    pub arguments: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ToolCall {
    /// A successful call (test/record helper).
    pub fn ok(
        id: impl Into<String>,
        name: impl Into<String>,
        server_label: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        ToolCall {
            id: id.into(),
            name: name.into(),
            server_label: server_label.into(),
            arguments: arguments.into(),
            success: true,
            error: None,
            output: None,
        }
    }

    /// A failed call with an error message.
    pub fn failed(
        id: impl Into<String>,
        name: impl Into<String>,
        server_label: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        ToolCall {
            id: id.into(),
            name: name.into(),
            server_label: server_label.into(),
            arguments: String::new(),
            success: false,
            error: Some(error.into()),
            output: None,
        }
    }
}

/// Aggregate statistics over the unique tool calls of one session.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Percent in [0, 100], rounded to 2 decimals. 0 when `total == 0`.
    pub success_rate: f64,
}

impl ToolStats {
    pub fn from_calls(calls: &[ToolCall]) -> Self {
        if calls.is_empty() {
            return ToolStats::default();
        }
        let total = calls.len();
        let successful = calls.iter().filter(|c| c.success).count();
        let failed = total - successful;
        let rate = (successful as f64 / total as f64) * 100.0;
        ToolStats {
            total,
            successful,
            failed,
            success_rate: (rate * 100.0).round() / 100.0,
        }
    }
}

/// Result of one orchestrator session (one batch flush or direct analysis).
#[derive(Clone, Debug, Default)]
pub struct AnalysisOutcome {
    pub success: bool,
    /// Human-facing answer (falls back to an error description on failure).
    pub response: String,
    /// Final text content from the model, if any.
    pub content: String,
    /// Unique tool calls accumulated across all iterations.
    pub tool_calls: Vec<ToolCall>,
    pub tool_stats: ToolStats,
    /// Provider id of the last response in the session.
    pub response_id: Option<String>,
    pub approval_iterations: u32,
    pub total_approvals_processed: u32,
    pub error: Option<String>,
}

impl AnalysisOutcome {
    /// Outcome for a session that failed before any successful round.
    pub fn failure(err: impl Into<String>) -> Self {
        let err = err.into();
        AnalysisOutcome {
            success: false,
            response: format!("Error: {err}"),
            error: Some(err),
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The seam between the coalescer and the tool orchestrator.
///
/// A batch carries one handle implementing this trait; flushing invokes it
/// with the composed input. Implementations must contain their own failures
/// and report them through the outcome.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, input: &str) -> AnalysisOutcome;
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
