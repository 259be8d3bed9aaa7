//! Webhook intake — envelope parsing and the routing pipeline.
//!
//! The endpoint acks `200` for every non-malformed body, and for malformed
//! ones too (the provider retries on non-2xx; an error field in a `200` is
//! the contract). Downstream trouble — unknown tenant, enrichment failures,
//! sink unavailability — never turns into a non-2xx answer.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use decidoc_agent::AnalysisToggles;
use decidoc_core::types::{ClassificationRecord, EnrichedMessage, IngestEvent, UserProfile};

use crate::state::AppState;

// ─────────────────────────────────────────────
// Envelope types
// ─────────────────────────────────────────────

/// Top-level webhook document. Only the consumed fields are contractual.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WebhookEnvelope {
    pub token: Option<String>,
    /// URL-verification handshake value.
    pub challenge: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub team_id: Option<String>,
    pub event_id: Option<String>,
    pub event_time: Option<i64>,
    pub event: Option<WebhookEvent>,
}

/// The inner event of an `event_callback` document.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: Option<String>,
    pub channel: String,
    pub channel_type: String,
    pub user: String,
    pub text: String,
    pub ts: String,
    pub bot_id: Option<String>,
}

// ─────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────

/// Process one webhook body and produce the (always-200) response body.
pub async fn handle_webhook(state: &AppState, body: &[u8]) -> Value {
    let envelope: WebhookEnvelope = match serde_json::from_slice(body) {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %e, "webhook body is not valid JSON");
            return json!({"error": "invalid json"});
        }
    };

    // URL verification handshake: echo the challenge, mutate nothing.
    if let Some(challenge) = envelope.challenge {
        info!("answering URL verification challenge");
        return json!({"challenge": challenge});
    }

    if envelope.kind.as_deref() != Some("event_callback") {
        debug!(kind = ?envelope.kind, "unsupported webhook document kind");
        return json!({"ok": true, "error": "unsupported"});
    }

    let Some(event) = envelope.event else {
        return json!({"ok": true, "message": "ignored"});
    };

    // Only live user messages move on: no deletions, no bot echoes.
    if event.kind != "message"
        || event.subtype.as_deref() == Some("message_deleted")
        || event.bot_id.is_some()
    {
        debug!(
            event_kind = %event.kind,
            subtype = ?event.subtype,
            bot = event.bot_id.is_some(),
            "ignoring non-user-message event"
        );
        return json!({"ok": true, "message": "ignored"});
    }

    let ingest = IngestEvent {
        token: envelope.token,
        team_id: envelope.team_id.unwrap_or_default(),
        event_id: envelope.event_id.unwrap_or_default(),
        event_time: envelope.event_time.unwrap_or_default(),
        channel_id: event.channel,
        user_id: event.user,
        text: event.text,
        ts: event.ts,
        channel_type: event.channel_type,
        bot_id: event.bot_id,
        subtype: event.subtype,
    };

    route_message(state, ingest).await
}

/// Route a real user message: tenant lookup → association check →
/// enrichment → classification record → batch append.
async fn route_message(state: &AppState, event: IngestEvent) -> Value {
    // 1. Tenant reverse lookup on the workspace team id.
    let Some(user) = state.directory.find_user_by_team_id(&event.team_id) else {
        warn!(team_id = %event.team_id, "no tenant for team id");
        return json!({"ok": true, "error": "user not found"});
    };

    // 2. Association lookup — unlinked channels short-circuit before any
    //    enrichment or enqueue.
    let links = state
        .directory
        .databases_linked_to_channel(&event.channel_id, user.id);
    if links.is_empty() {
        debug!(channel = %event.channel_id, "channel has no linked databases");
        return json!({"ok": true, "error": "channel has no linked databases"});
    }
    for link in &links {
        debug!(
            channel = %event.channel_id,
            database = %link.database_name,
            auto_sync = link.auto_sync,
            "linked database"
        );
    }

    // 3. Channel display name, best effort.
    let channel_name = state
        .directory
        .channel_name(&event.channel_id, user.id)
        .unwrap_or_else(|| "unknown".to_string());

    // 4. Enrichment, best effort: failures degrade to empty strings.
    let profile = enrich(state, user.credentials.slack(), &event).await;

    // 5. Per-tenant orchestrator handle for this batch.
    let orchestrator = state.orchestrator_for(&user.credentials, AnalysisToggles::default());

    // 6. Classify (neutral fallback inside the client).
    let classification = state.classifier.classify(&event.text).await;

    // 7. Classification record, best effort. Attribution is the owning
    //    tenant, not the sender.
    let record = ClassificationRecord::new(event.text.clone(), &classification).with_channel(
        user.id,
        event.channel_id.clone(),
        channel_name,
    );
    if !state.sink.put_classification(&record).await {
        warn!("classification record write failed");
    }

    // 8. Enqueue into the channel's batch.
    let channel_id = event.channel_id.clone();
    info!(
        channel = %channel_id,
        tenant = user.id,
        label = classification.label.as_str(),
        "message enqueued for batched analysis"
    );
    state
        .coalescer
        .append(
            &channel_id,
            EnrichedMessage::new(event, profile),
            orchestrator,
            user.id,
        )
        .await;

    json!({"ok": true, "message": "message added to batch"})
}

/// Look up sender profile and message permalink. Any failure yields empty
/// fields; the pipeline never stops on enrichment.
async fn enrich(state: &AppState, slack_token: Option<&str>, event: &IngestEvent) -> UserProfile {
    let Some(token) = slack_token else {
        debug!("tenant has no slack token, skipping enrichment");
        return UserProfile::default();
    };

    let mut profile = UserProfile::default();

    match state.slack.user_profile(token, &event.user_id).await {
        Ok(user) => {
            profile.role = user.title;
            profile.name = user.real_name;
        }
        Err(e) => debug!(error = %e, "sender profile lookup failed (non-fatal)"),
    }

    match state
        .slack
        .message_permalink(token, &event.channel_id, &event.ts)
        .await
    {
        Ok(link) => profile.message_link = link,
        Err(e) => debug!(error = %e, "permalink lookup failed (non-fatal)"),
    }

    profile
}
