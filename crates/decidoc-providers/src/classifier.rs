//! Short-text classifier client.
//!
//! Contract: `classify(text) → {label, confidence}`.
//!
//! - Fewer than 4 whitespace-separated tokens short-circuits locally to
//!   `{NONE, 0.0}` without touching the network.
//! - An unset service URL or any transport/API failure degrades to the
//!   neutral `{GENERAL_CONVERSATION, 0.5}` — the pipeline never fails on
//!   classifier trouble.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use decidoc_core::types::{Classification, ClassificationLabel};
use decidoc_core::utils;

/// Minimum whitespace tokens before the external classifier is consulted.
const MIN_TOKENS: usize = 4;

/// Wire shape of the classifier's `/analyze` answer.
#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    classification: Option<ClassificationLabel>,
    #[serde(default)]
    confidence: f64,
}

/// HTTP client for the zero-shot labeling service.
pub struct ClassifierClient {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl ClassifierClient {
    /// Create a client. `base_url = None` disables the remote call entirely.
    pub fn new(base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        ClassifierClient { client, base_url }
    }

    /// Classify one message.
    pub async fn classify(&self, text: &str) -> Classification {
        if utils::token_count(text) < MIN_TOKENS {
            debug!("text under token threshold, skipping classifier");
            return Classification::too_short();
        }

        let Some(base) = &self.base_url else {
            warn!("classification service not configured, using neutral default");
            return Classification::neutral();
        };

        let url = format!("{}/analyze", base.trim_end_matches('/'));

        let result = self
            .client
            .post(&url)
            .json(&json!({ "text": text }))
            .send()
            .await;

        let response = match result {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "classifier request failed, using neutral default");
                return Classification::neutral();
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "classifier returned error status");
            return Classification::neutral();
        }

        match response.json::<ClassifyResponse>().await {
            Ok(parsed) => {
                let label = parsed
                    .classification
                    .unwrap_or(ClassificationLabel::GeneralConversation);
                let confidence = (parsed.confidence * 10_000.0).round() / 10_000.0;
                debug!(label = label.as_str(), confidence, "classifier verdict");
                Classification::new(label, confidence)
            }
            Err(e) => {
                warn!(error = %e, "failed to parse classifier response");
                Classification::neutral()
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
