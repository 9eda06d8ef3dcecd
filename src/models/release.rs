//! Release entity, generated notes, and related API payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::distribution::OutcomeRecord;

/// Lifecycle state of a release as it moves through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "release_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Received,
    Processing,
    Ready,
    Published,
    Failed,
}

/// One of the three generated-document variants per release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audience", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Customer,
    Developer,
    Stakeholder,
}

impl Audience {
    /// All audiences, in the order documents are stored
    pub const ALL: [Audience; 3] = [Audience::Customer, Audience::Developer, Audience::Stakeholder];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Developer => "developer",
            Self::Stakeholder => "stakeholder",
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Release entity, keyed by (repo_id, tag_name)
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub release_id: Uuid,
    pub repo_id: Uuid,
    pub tag_name: String,
    pub release_url: Option<String>,
    pub status: ReleaseStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted generated-document set, one row per release
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseNotes {
    pub release_id: Uuid,
    pub customer_md: String,
    pub developer_md: String,
    pub stakeholder_md: String,
    pub customer_edited: bool,
    pub developer_edited: bool,
    pub stakeholder_edited: bool,
    pub tokens_used: i32,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

impl ReleaseNotes {
    /// The document text for one audience
    pub fn document(&self, audience: Audience) -> &str {
        match audience {
            Audience::Customer => &self.customer_md,
            Audience::Developer => &self.developer_md,
            Audience::Stakeholder => &self.stakeholder_md,
        }
    }

    /// Whether the document for one audience carries a manual override
    pub fn edited(&self, audience: Audience) -> bool {
        match audience {
            Audience::Customer => self.customer_edited,
            Audience::Developer => self.developer_edited,
            Audience::Stakeholder => self.stakeholder_edited,
        }
    }
}

/// Output of the note generator before persistence
#[derive(Debug, Clone)]
pub struct GeneratedNotes {
    pub customer_md: String,
    pub developer_md: String,
    pub stakeholder_md: String,
    pub tokens_used: u32,
    pub model: String,
}

impl GeneratedNotes {
    pub fn document(&self, audience: Audience) -> &str {
        match audience {
            Audience::Customer => &self.customer_md,
            Audience::Developer => &self.developer_md,
            Audience::Stakeholder => &self.stakeholder_md,
        }
    }
}

/// Full release view: entity, notes, and per-target outcomes
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDetail {
    pub release: Release,
    pub notes: Option<ReleaseNotes>,
    pub outcomes: Vec<OutcomeRecord>,
}

/// Request payload for manual regeneration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateRequest {
    /// Overwrite edited audiences too and clear their edited flags
    #[serde(default)]
    pub force: bool,
}

/// Request payload for editing one or more audience documents
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditNotesRequest {
    pub customer_md: Option<String>,
    pub developer_md: Option<String>,
    pub stakeholder_md: Option<String>,
}

/// Request payload for bulk import of historical releases
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillRequest {
    /// How many of the newest releases to consider (default: 10)
    #[serde(default = "default_backfill_count")]
    pub count: u32,
}

fn default_backfill_count() -> u32 {
    10
}

/// Outcome of a backfill run: imported tags, skipped tags, per-tag errors
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub imported: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<BackfillError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillError {
    pub tag_name: String,
    pub message: String,
}
