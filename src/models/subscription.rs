//! Repository subscriptions and configured delivery channels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::distribution::ChannelKind;
use crate::models::release::Audience;

/// Subscription/config record for one connected repository
#[derive(Debug, Clone, FromRow)]
pub struct RepoSubscription {
    pub repo_id: Uuid,
    pub full_name: String,
    pub webhook_secret: String,
    pub access_token_ciphertext: String,
    pub host_webhook_id: Option<i64>,
    pub active: bool,
    pub tone: Option<String>,
    pub language: Option<String>,
    pub extra_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RepoSubscription {
    /// Split "owner/name" into its halves
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        self.full_name.split_once('/')
    }

    pub fn style(&self) -> StyleConfig {
        StyleConfig {
            tone: self.tone.clone(),
            language: self.language.clone(),
            extra_instructions: self.extra_instructions.clone(),
        }
    }
}

/// Per-repository generation style configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleConfig {
    pub tone: Option<String>,
    pub language: Option<String>,
    pub extra_instructions: Option<String>,
}

/// Configured delivery destination
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    pub channel_id: Uuid,
    pub repo_id: Uuid,
    pub kind: ChannelKind,
    pub audience: Audience,
    pub endpoint: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Channel spec supplied when connecting a repository
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSpec {
    pub kind: ChannelKind,
    pub audience: Audience,
    pub endpoint: String,
}

/// Request payload for connecting a repository
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRepoRequest {
    pub full_name: String,
    pub access_token: String,
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
    #[serde(default)]
    pub style: StyleConfig,
    /// OAuth connect-flow state token, when the connect came through the
    /// browser flow rather than a direct API call
    #[serde(default)]
    pub state: Option<String>,
}
