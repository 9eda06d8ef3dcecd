//! Distribution targets and per-target delivery outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::release::Audience;

/// Delivery channel variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "channel_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Chat,
    Email,
    Hosted,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Email => "email",
            Self::Hosted => "hosted",
        }
    }
}

/// One configured destination for a given audience's document.
///
/// Never persisted as an entity; only the outcome of attempting it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionTarget {
    Chat { webhook_url: String, audience: Audience },
    Email { address: String, audience: Audience },
    Hosted { audience: Audience },
}

impl DistributionTarget {
    pub fn audience(&self) -> Audience {
        match self {
            Self::Chat { audience, .. }
            | Self::Email { audience, .. }
            | Self::Hosted { audience } => *audience,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Chat { .. } => ChannelKind::Chat,
            Self::Email { .. } => ChannelKind::Email,
            Self::Hosted { .. } => ChannelKind::Hosted,
        }
    }
}

/// Result of one delivery attempt, in target order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionOutcome {
    pub audience: Audience,
    pub channel_kind: ChannelKind,
    pub success: bool,
    pub error_detail: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl DistributionOutcome {
    pub fn success(audience: Audience, kind: ChannelKind, responded_at: Option<DateTime<Utc>>) -> Self {
        Self {
            audience,
            channel_kind: kind,
            success: true,
            error_detail: None,
            responded_at,
        }
    }

    pub fn failure(audience: Audience, kind: ChannelKind, detail: String) -> Self {
        Self {
            audience,
            channel_kind: kind,
            success: false,
            error_detail: Some(detail),
            responded_at: None,
        }
    }
}

/// Persisted outcome row, append-only
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub outcome_id: Uuid,
    pub release_id: Uuid,
    pub audience: Audience,
    pub channel_kind: ChannelKind,
    pub success: bool,
    pub error_detail: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
