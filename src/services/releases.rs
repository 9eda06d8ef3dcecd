//! Release Store
//!
//! Persistence for releases, generated notes, distribution outcomes, and
//! repository subscriptions. All pipeline writes are single-row
//! idempotent-by-key operations; the UNIQUE (repo_id, tag_name) constraint on
//! `releases` is the duplicate-delivery safeguard.

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Audience, ChannelKind, DistributionOutcome, EditNotesRequest, GeneratedNotes,
    NotificationChannel, OutcomeRecord, Release, ReleaseNotes, ReleaseStatus, RepoSubscription,
    StyleConfig,
};

/// Errors from the persistence layer
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// True when the error is a Postgres unique-constraint violation
    /// (SQLSTATE 23505), e.g. a duplicate (repo_id, tag_name) insert.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}

/// Store for the pipeline's persistent records
#[derive(Clone)]
pub struct ReleaseStore {
    pool: PgPool,
}

impl ReleaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ------------------------------------------------------------------
    // Subscriptions and channels
    // ------------------------------------------------------------------

    pub async fn find_subscription_by_full_name(
        &self,
        full_name: &str,
    ) -> Result<Option<RepoSubscription>, StoreError> {
        let row = sqlx::query_as::<_, RepoSubscription>(
            r#"
            SELECT repo_id, full_name, webhook_secret, access_token_ciphertext,
                   host_webhook_id, active, tone, language, extra_instructions, created_at
            FROM repositories
            WHERE full_name = $1
            "#,
        )
        .bind(full_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_subscription(
        &self,
        repo_id: Uuid,
    ) -> Result<Option<RepoSubscription>, StoreError> {
        let row = sqlx::query_as::<_, RepoSubscription>(
            r#"
            SELECT repo_id, full_name, webhook_secret, access_token_ciphertext,
                   host_webhook_id, active, tone, language, extra_instructions, created_at
            FROM repositories
            WHERE repo_id = $1
            "#,
        )
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Insert a new subscription. A duplicate full name surfaces as a
    /// unique violation.
    pub async fn insert_subscription(
        &self,
        full_name: &str,
        webhook_secret: &str,
        access_token_ciphertext: &str,
        style: &StyleConfig,
    ) -> Result<RepoSubscription, StoreError> {
        let repo_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO repositories
                (repo_id, full_name, webhook_secret, access_token_ciphertext,
                 active, tone, language, extra_instructions, created_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $6, $7, $8)
            "#,
        )
        .bind(repo_id)
        .bind(full_name)
        .bind(webhook_secret)
        .bind(access_token_ciphertext)
        .bind(&style.tone)
        .bind(&style.language)
        .bind(&style.extra_instructions)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(RepoSubscription {
            repo_id,
            full_name: full_name.to_string(),
            webhook_secret: webhook_secret.to_string(),
            access_token_ciphertext: access_token_ciphertext.to_string(),
            host_webhook_id: None,
            active: true,
            tone: style.tone.clone(),
            language: style.language.clone(),
            extra_instructions: style.extra_instructions.clone(),
            created_at: now,
        })
    }

    pub async fn set_host_webhook_id(
        &self,
        repo_id: Uuid,
        host_webhook_id: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE repositories SET host_webhook_id = $2 WHERE repo_id = $1")
            .bind(repo_id)
            .bind(host_webhook_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn deactivate_subscription(&self, repo_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE repositories SET active = FALSE WHERE repo_id = $1")
            .bind(repo_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("repository {repo_id}")));
        }
        Ok(())
    }

    pub async fn insert_channel(
        &self,
        repo_id: Uuid,
        kind: ChannelKind,
        audience: Audience,
        endpoint: &str,
    ) -> Result<NotificationChannel, StoreError> {
        let channel_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO channels (channel_id, repo_id, kind, audience, endpoint, enabled, created_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6)
            "#,
        )
        .bind(channel_id)
        .bind(repo_id)
        .bind(kind)
        .bind(audience)
        .bind(endpoint)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(NotificationChannel {
            channel_id,
            repo_id,
            kind,
            audience,
            endpoint: endpoint.to_string(),
            enabled: true,
            created_at: now,
        })
    }

    /// Enabled channels for a repository.
    pub async fn list_enabled_channels(
        &self,
        repo_id: Uuid,
    ) -> Result<Vec<NotificationChannel>, StoreError> {
        let rows = sqlx::query_as::<_, NotificationChannel>(
            r#"
            SELECT channel_id, repo_id, kind, audience, endpoint, enabled, created_at
            FROM channels
            WHERE repo_id = $1 AND enabled
            ORDER BY created_at
            "#,
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Releases
    // ------------------------------------------------------------------

    pub async fn find_release(
        &self,
        repo_id: Uuid,
        tag_name: &str,
    ) -> Result<Option<Release>, StoreError> {
        let row = sqlx::query_as::<_, Release>(
            r#"
            SELECT release_id, repo_id, tag_name, release_url, status, error_message,
                   created_at, updated_at
            FROM releases
            WHERE repo_id = $1 AND tag_name = $2
            "#,
        )
        .bind(repo_id)
        .bind(tag_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_release_by_id(
        &self,
        release_id: Uuid,
    ) -> Result<Option<Release>, StoreError> {
        let row = sqlx::query_as::<_, Release>(
            r#"
            SELECT release_id, repo_id, tag_name, release_url, status, error_message,
                   created_at, updated_at
            FROM releases
            WHERE release_id = $1
            "#,
        )
        .bind(release_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Insert a release in the given initial status.
    ///
    /// A concurrent duplicate for the same (repo_id, tag_name) surfaces as a
    /// unique violation; callers treat that as "already processed".
    pub async fn insert_release(
        &self,
        repo_id: Uuid,
        tag_name: &str,
        release_url: Option<&str>,
        status: ReleaseStatus,
    ) -> Result<Release, StoreError> {
        let release_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO releases (release_id, repo_id, tag_name, release_url, status,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            "#,
        )
        .bind(release_id)
        .bind(repo_id)
        .bind(tag_name)
        .bind(release_url)
        .bind(status)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Release {
            release_id,
            repo_id,
            tag_name: tag_name.to_string(),
            release_url: release_url.map(str::to_string),
            status,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn set_status(
        &self,
        release_id: Uuid,
        status: ReleaseStatus,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE releases SET status = $2, updated_at = NOW() WHERE release_id = $1",
        )
        .bind(release_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Move a release to `failed` with the error recorded.
    pub async fn set_failed(&self, release_id: Uuid, message: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE releases
            SET status = 'failed', error_message = $2, updated_at = NOW()
            WHERE release_id = $1
            "#,
        )
        .bind(release_id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_release_url(
        &self,
        release_id: Uuid,
        release_url: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE releases SET release_url = $2, updated_at = NOW() WHERE release_id = $1",
        )
        .bind(release_id)
        .bind(release_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Generated notes
    // ------------------------------------------------------------------

    pub async fn find_notes(&self, release_id: Uuid) -> Result<Option<ReleaseNotes>, StoreError> {
        let row = sqlx::query_as::<_, ReleaseNotes>(
            r#"
            SELECT release_id, customer_md, developer_md, stakeholder_md,
                   customer_edited, developer_edited, stakeholder_edited,
                   tokens_used, model, generated_at
            FROM release_notes
            WHERE release_id = $1
            "#,
        )
        .bind(release_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Write the full document set, overwriting every audience and clearing
    /// all edited flags. Used for first generation and forced regeneration.
    pub async fn replace_notes(
        &self,
        release_id: Uuid,
        notes: &GeneratedNotes,
    ) -> Result<ReleaseNotes, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO release_notes
                (release_id, customer_md, developer_md, stakeholder_md,
                 customer_edited, developer_edited, stakeholder_edited,
                 tokens_used, model, generated_at)
            VALUES ($1, $2, $3, $4, FALSE, FALSE, FALSE, $5, $6, NOW())
            ON CONFLICT (release_id) DO UPDATE SET
                customer_md = EXCLUDED.customer_md,
                developer_md = EXCLUDED.developer_md,
                stakeholder_md = EXCLUDED.stakeholder_md,
                customer_edited = FALSE,
                developer_edited = FALSE,
                stakeholder_edited = FALSE,
                tokens_used = EXCLUDED.tokens_used,
                model = EXCLUDED.model,
                generated_at = NOW()
            "#,
        )
        .bind(release_id)
        .bind(&notes.customer_md)
        .bind(&notes.developer_md)
        .bind(&notes.stakeholder_md)
        .bind(notes.tokens_used as i32)
        .bind(&notes.model)
        .execute(&self.pool)
        .await?;

        self.require_notes(release_id).await
    }

    /// Write the document set, preserving any audience whose edited flag is
    /// set: edited text and flags stay untouched, unedited audiences are
    /// overwritten. Used for non-forced regeneration.
    pub async fn merge_unedited_notes(
        &self,
        release_id: Uuid,
        notes: &GeneratedNotes,
    ) -> Result<ReleaseNotes, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE release_notes SET
                customer_md = CASE WHEN customer_edited THEN customer_md ELSE $2 END,
                developer_md = CASE WHEN developer_edited THEN developer_md ELSE $3 END,
                stakeholder_md = CASE WHEN stakeholder_edited THEN stakeholder_md ELSE $4 END,
                tokens_used = $5,
                model = $6,
                generated_at = NOW()
            WHERE release_id = $1
            "#,
        )
        .bind(release_id)
        .bind(&notes.customer_md)
        .bind(&notes.developer_md)
        .bind(&notes.stakeholder_md)
        .bind(notes.tokens_used as i32)
        .bind(&notes.model)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // No prior set to merge into; behaves like a first generation.
            return self.replace_notes(release_id, notes).await;
        }
        self.require_notes(release_id).await
    }

    /// Apply a manual edit, setting the edited flag for each supplied
    /// audience document.
    pub async fn edit_notes(
        &self,
        release_id: Uuid,
        edit: &EditNotesRequest,
    ) -> Result<ReleaseNotes, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE release_notes SET
                customer_md = COALESCE($2, customer_md),
                customer_edited = customer_edited OR $2 IS NOT NULL,
                developer_md = COALESCE($3, developer_md),
                developer_edited = developer_edited OR $3 IS NOT NULL,
                stakeholder_md = COALESCE($4, stakeholder_md),
                stakeholder_edited = stakeholder_edited OR $4 IS NOT NULL
            WHERE release_id = $1
            "#,
        )
        .bind(release_id)
        .bind(&edit.customer_md)
        .bind(&edit.developer_md)
        .bind(&edit.stakeholder_md)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("notes for {release_id}")));
        }
        self.require_notes(release_id).await
    }

    async fn require_notes(&self, release_id: Uuid) -> Result<ReleaseNotes, StoreError> {
        self.find_notes(release_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("notes for {release_id}")))
    }

    // ------------------------------------------------------------------
    // Distribution outcomes
    // ------------------------------------------------------------------

    /// Append one outcome row per result. Retried publishes add rows rather
    /// than mutating old ones.
    pub async fn append_outcomes(
        &self,
        release_id: Uuid,
        outcomes: &[DistributionOutcome],
    ) -> Result<(), StoreError> {
        for outcome in outcomes {
            sqlx::query(
                r#"
                INSERT INTO distribution_outcomes
                    (outcome_id, release_id, audience, channel_kind, success,
                     error_detail, responded_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(release_id)
            .bind(outcome.audience)
            .bind(outcome.channel_kind)
            .bind(outcome.success)
            .bind(&outcome.error_detail)
            .bind(outcome.responded_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn list_outcomes(&self, release_id: Uuid) -> Result<Vec<OutcomeRecord>, StoreError> {
        let rows = sqlx::query_as::<_, OutcomeRecord>(
            r#"
            SELECT outcome_id, release_id, audience, channel_kind, success,
                   error_detail, responded_at, created_at
            FROM distribution_outcomes
            WHERE release_id = $1
            ORDER BY created_at, outcome_id
            "#,
        )
        .bind(release_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
