//! Slack Web API client.
//!
//! Multi-tenant: every call takes the tenant's bot token instead of binding
//! one token at construction. Four calls are exposed: conversation listing
//! (cursor-paged), conversation info, user profile, and message permalink.
//!
//! Slack answers `200` with `{"ok": false, "error": "..."}` on application
//! errors; those are mapped onto the shared upstream taxonomy
//! (`invalid_auth` → AuthInvalid, `*_not_found` → NotFound, anything else →
//! Api). Webhook enrichment swallows these errors; direct callers get them
//! typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use decidoc_core::error::{UpstreamError, UpstreamResult};

/// Slack Web API base URL.
const SLACK_API_BASE: &str = "https://slack.com/api";

/// Page size for `conversations.list`.
const CONVERSATIONS_PAGE_LIMIT: u32 = 200;

// ─────────────────────────────────────────────
// Response types
// ─────────────────────────────────────────────

/// One conversation from `conversations.list` / `conversations.info`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub is_private: bool,
    pub is_member: bool,
    pub num_members: u32,
    pub topic: String,
    pub purpose: String,
}

/// Sender profile from `users.profile.get`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SlackUserProfile {
    pub user_id: String,
    pub real_name: String,
    pub display_name: String,
    /// Job title; empty when the user never set one.
    pub title: String,
    pub email: Option<String>,
    pub image_192: Option<String>,
    pub image_512: Option<String>,
}

// ─────────────────────────────────────────────
// SlackClient
// ─────────────────────────────────────────────

/// HTTP client for the Slack Web API.
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
}

impl Default for SlackClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SlackClient {
    /// Create a client against the production Slack API.
    pub fn new() -> Self {
        Self::with_base(SLACK_API_BASE)
    }

    /// Create a client against a custom base URL (tests).
    pub fn with_base(api_base: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        SlackClient {
            http,
            api_base: api_base.into(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), endpoint)
    }

    /// GET an endpoint and unwrap Slack's `ok`/`error` envelope.
    async fn get_ok(
        &self,
        token: &str,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> UpstreamResult<Value> {
        let response = self
            .http
            .get(self.url(endpoint))
            .bearer_auth(token)
            .query(params)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::transport(format!(
                "{endpoint} returned {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::transport(e.to_string()))?;

        if body["ok"].as_bool() != Some(true) {
            let err = body["error"].as_str().unwrap_or("unknown").to_string();
            return Err(map_slack_error(endpoint, &err));
        }

        Ok(body)
    }

    // ─────────────────────────────────────────
    // Calls
    // ─────────────────────────────────────────

    /// List the workspace's conversations, excluding archived ones.
    ///
    /// Pages through `conversations.list` until the cursor runs out.
    pub async fn list_channels(
        &self,
        token: &str,
        include_private: bool,
    ) -> UpstreamResult<Vec<ChannelInfo>> {
        let types = if include_private {
            "public_channel,private_channel"
        } else {
            "public_channel"
        };
        let limit = CONVERSATIONS_PAGE_LIMIT.to_string();

        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params: Vec<(&str, &str)> = vec![
                ("types", types),
                ("exclude_archived", "true"),
                ("limit", &limit),
            ];
            if let Some(ref c) = cursor {
                params.push(("cursor", c));
            }

            let body = self.get_ok(token, "conversations.list", &params).await?;

            if let Some(list) = body["channels"].as_array() {
                for channel in list {
                    channels.push(parse_channel(channel));
                }
            }

            cursor = body["response_metadata"]["next_cursor"]
                .as_str()
                .filter(|c| !c.is_empty())
                .map(String::from);

            if cursor.is_none() {
                break;
            }
        }

        debug!(count = channels.len(), "listed slack conversations");
        Ok(channels)
    }

    /// Fetch one conversation's metadata.
    pub async fn channel_info(&self, token: &str, channel_id: &str) -> UpstreamResult<ChannelInfo> {
        let body = self
            .get_ok(token, "conversations.info", &[("channel", channel_id)])
            .await?;
        Ok(parse_channel(&body["channel"]))
    }

    /// Fetch a sender's profile.
    pub async fn user_profile(
        &self,
        token: &str,
        user_id: &str,
    ) -> UpstreamResult<SlackUserProfile> {
        let body = self
            .get_ok(token, "users.profile.get", &[("user", user_id)])
            .await?;

        let profile = &body["profile"];
        Ok(SlackUserProfile {
            user_id: user_id.to_string(),
            real_name: profile["real_name"].as_str().unwrap_or("").to_string(),
            display_name: profile["display_name"].as_str().unwrap_or("").to_string(),
            title: profile["title"].as_str().unwrap_or("").to_string(),
            email: profile["email"].as_str().map(String::from),
            image_192: profile["image_192"].as_str().map(String::from),
            image_512: profile["image_512"].as_str().map(String::from),
        })
    }

    /// Fetch the permalink for a message timestamp.
    pub async fn message_permalink(
        &self,
        token: &str,
        channel_id: &str,
        message_ts: &str,
    ) -> UpstreamResult<String> {
        let body = self
            .get_ok(
                token,
                "chat.getPermalink",
                &[("channel", channel_id), ("message_ts", message_ts)],
            )
            .await?;

        body["permalink"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| UpstreamError::api("chat.getPermalink: no permalink in response"))
    }
}

/// Map Slack's application error strings onto the upstream taxonomy.
fn map_slack_error(endpoint: &str, err: &str) -> UpstreamError {
    match err {
        "invalid_auth" | "not_authed" | "token_revoked" | "token_expired" => {
            UpstreamError::auth(format!("{endpoint}: {err}"))
        }
        "channel_not_found" | "user_not_found" | "users_not_found" | "message_not_found" => {
            UpstreamError::not_found(format!("{endpoint}: {err}"))
        }
        _ => UpstreamError::api(format!("{endpoint}: {err}")),
    }
}

fn parse_channel(channel: &Value) -> ChannelInfo {
    ChannelInfo {
        id: channel["id"].as_str().unwrap_or("").to_string(),
        name: channel["name"].as_str().unwrap_or("").to_string(),
        is_private: channel["is_private"].as_bool().unwrap_or(false),
        is_member: channel["is_member"].as_bool().unwrap_or(false),
        num_members: channel["num_members"].as_u64().unwrap_or(0) as u32,
        topic: channel["topic"]["value"].as_str().unwrap_or("").to_string(),
        purpose: channel["purpose"]["value"].as_str().unwrap_or("").to_string(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
