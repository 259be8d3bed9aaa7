//! Tenant directory — read-only view over user accounts, their provider
//! credentials, and channel→database associations.
//!
//! The pipeline consumes exactly three lookups: reverse team-id resolution,
//! linked databases for a channel, and the channel display name. Writes
//! (account onboarding, association CRUD) belong to an external system; the
//! directory only loads what that system produced.
//!
//! File format: JSON at `~/.decidoc/directory.json`, camelCase keys.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::LinkedDatabase;

// ─────────────────────────────────────────────
// Accounts and credentials
// ─────────────────────────────────────────────

/// Per-tenant provider tokens. Empty string means "not configured".
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Credentials {
    pub slack_token: String,
    pub notion_token: String,
    pub github_token: String,
}

impl Credentials {
    pub fn slack(&self) -> Option<&str> {
        non_empty(&self.slack_token)
    }

    pub fn notion(&self) -> Option<&str> {
        non_empty(&self.notion_token)
    }

    pub fn github(&self) -> Option<&str> {
        non_empty(&self.github_token)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// One tenant: identity, Slack workspace binding, credentials, channels.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    /// Slack team id used for reverse lookup on inbound events.
    pub slack_team_id: String,
    pub credentials: Credentials,
    pub channels: Vec<ChannelEntry>,
}

impl Default for UserAccount {
    fn default() -> Self {
        Self {
            id: 0,
            username: String::new(),
            slack_team_id: String::new(),
            credentials: Credentials::default(),
            channels: Vec::new(),
        }
    }
}

/// A saved chat channel with its documentation associations.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelEntry {
    /// External channel id as the chat provider knows it.
    pub external_id: String,
    pub name: String,
    pub is_active: bool,
    pub associations: Vec<AssociationEntry>,
}

impl Default for ChannelEntry {
    fn default() -> Self {
        Self {
            external_id: String::new(),
            name: String::new(),
            is_active: true,
            associations: Vec::new(),
        }
    }
}

/// One channel→database association.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssociationEntry {
    pub id: i64,
    pub auto_sync: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub is_active: bool,
    pub database: DatabaseEntry,
}

impl Default for AssociationEntry {
    fn default() -> Self {
        Self {
            id: 0,
            auto_sync: true,
            notes: None,
            is_active: true,
            database: DatabaseEntry::default(),
        }
    }
}

/// A documentation database as stored in the directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseEntry {
    pub internal_id: i64,
    pub external_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub is_active: bool,
}

impl Default for DatabaseEntry {
    fn default() -> Self {
        Self {
            internal_id: 0,
            external_id: String::new(),
            name: String::new(),
            url: None,
            is_active: true,
        }
    }
}

// ─────────────────────────────────────────────
// Directory
// ─────────────────────────────────────────────

/// On-disk shape of the directory file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DirectoryFile {
    accounts: Vec<UserAccount>,
}

/// Immutable tenant directory with index by team id.
pub struct Directory {
    accounts: Vec<UserAccount>,
    /// team_id → index into `accounts`.
    by_team: HashMap<String, usize>,
    /// user id → index into `accounts`.
    by_id: HashMap<i64, usize>,
}

impl Directory {
    /// Build a directory from in-memory accounts (tests, embedding).
    pub fn from_accounts(accounts: Vec<UserAccount>) -> Self {
        let mut by_team = HashMap::new();
        let mut by_id = HashMap::new();
        for (idx, account) in accounts.iter().enumerate() {
            if !account.slack_team_id.is_empty() {
                by_team.insert(account.slack_team_id.clone(), idx);
            }
            by_id.insert(account.id, idx);
        }
        Directory {
            accounts,
            by_team,
            by_id,
        }
    }

    /// Load the directory from a JSON file.
    ///
    /// A missing or unreadable file yields an empty directory — the server
    /// still answers webhooks, it just resolves no tenants.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            warn!(path = %path.display(), "no directory file, starting with zero tenants");
            return Self::from_accounts(Vec::new());
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read directory file");
                return Self::from_accounts(Vec::new());
            }
        };

        let file: DirectoryFile = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse directory file");
                return Self::from_accounts(Vec::new());
            }
        };

        info!(
            path = %path.display(),
            accounts = file.accounts.len(),
            "loaded tenant directory"
        );
        Self::from_accounts(file.accounts)
    }

    /// Number of tenants.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Resolve the tenant owning a Slack workspace.
    pub fn find_user_by_team_id(&self, team_id: &str) -> Option<&UserAccount> {
        self.by_team.get(team_id).map(|&idx| &self.accounts[idx])
    }

    /// Resolve a tenant by internal id.
    pub fn user_by_id(&self, user_id: i64) -> Option<&UserAccount> {
        self.by_id.get(&user_id).map(|&idx| &self.accounts[idx])
    }

    /// Documentation databases linked to a channel, for one tenant.
    ///
    /// Inactive channels, associations, and databases are filtered out.
    /// Empty result means the channel has not opted into analysis.
    pub fn databases_linked_to_channel(
        &self,
        channel_external_id: &str,
        user_id: i64,
    ) -> Vec<LinkedDatabase> {
        let Some(account) = self.user_by_id(user_id) else {
            return Vec::new();
        };

        let Some(channel) = account
            .channels
            .iter()
            .find(|c| c.external_id == channel_external_id && c.is_active)
        else {
            return Vec::new();
        };

        channel
            .associations
            .iter()
            .filter(|a| a.is_active && a.database.is_active)
            .map(|a| LinkedDatabase {
                association_id: a.id,
                internal_db_id: a.database.internal_id,
                external_db_id: a.database.external_id.clone(),
                database_name: a.database.name.clone(),
                database_url: a.database.url.clone(),
                auto_sync: a.auto_sync,
                notes: a.notes.clone(),
            })
            .collect()
    }

    /// Display name of a saved channel, if the tenant saved it.
    pub fn channel_name(&self, channel_external_id: &str, user_id: i64) -> Option<String> {
        self.user_by_id(user_id)?
            .channels
            .iter()
            .find(|c| c.external_id == channel_external_id && c.is_active)
            .map(|c| c.name.clone())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
