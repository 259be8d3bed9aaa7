//! Utility helpers — timestamps, hashing, tokenization, string manipulation.

use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Get the Decidoc data directory (e.g. `~/.decidoc/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".decidoc")
}

/// Get current ISO 8601 timestamp.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Count whitespace-separated tokens in a text.
///
/// The classifier short-circuits below 4 tokens.
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Content-stable hash for analysis record keys.
///
/// Same input text always yields the same 16-hex-char digest, across
/// processes and restarts.
pub fn stable_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// Helper to get home directory.
fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}
