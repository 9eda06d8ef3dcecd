//! shipnotes - release-notes automation backend
//!
//! Receives source-host release webhooks, aggregates the commit/PR delta for
//! the new tag, generates audience-specific summaries, persists them, and
//! fans the result out to configured delivery channels.

use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::AppError;

// Re-export specific items to avoid ambiguous glob re-exports
pub use models::{
    Audience, BackfillReport, ChangeSet, ChannelKind, CommitInfo, DistributionOutcome,
    DistributionTarget, GeneratedNotes, PullRequestInfo, Release, ReleaseNotes, ReleaseStatus,
    ReleaseSummary, RepoSubscription,
};
pub use services::{
    CompletionBackend, CredentialCipher, DiffAggregator, Distributor, GitHubClient, Mailer,
    NoteGenerator, OAuthStateStore, OrchestratorError, ReleaseHost, ReleaseOrchestrator,
    ReleaseStore, WebhookOutcome, WebhookVerifier,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Config,
    pub cipher: services::CredentialCipher,
    pub host: Arc<dyn services::ReleaseHost>,
    pub completions: Arc<dyn services::CompletionBackend>,
    pub mailer: Arc<dyn services::Mailer>,
    pub oauth_states: services::OAuthStateStore,
}

impl AppState {
    pub fn store(&self) -> services::ReleaseStore {
        services::ReleaseStore::new(self.db.clone())
    }

    /// Assemble the pipeline for one orchestration run.
    pub fn orchestrator(&self) -> services::ReleaseOrchestrator {
        services::ReleaseOrchestrator::new(
            self.store(),
            self.cipher.clone(),
            self.host.clone(),
            self.completions.clone(),
            self.mailer.clone(),
            Duration::from_secs(self.config.http_timeout_secs),
        )
    }
}
