//! Release Orchestrator
//!
//! Top-level state machine for the pipeline: verify → aggregate → generate →
//! persist → distribute → persist, on the webhook path, the manual backfill
//! path, and the regeneration path. Releases move RECEIVED → PROCESSING →
//! READY → PUBLISHED, with FAILED reachable from PROCESSING.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::change_set::ReleaseEvent;
use crate::models::release::BackfillError;
use crate::models::{
    Audience, BackfillReport, ChannelKind, DistributionOutcome, DistributionTarget,
    NotificationChannel, Release, ReleaseNotes, ReleaseStatus, ReleaseSummary, RepoSubscription,
};
use crate::services::crypto::{CredentialCipher, CryptoError};
use crate::services::diff::{DiffAggregator, DiffError};
use crate::services::distribution::Distributor;
use crate::services::github::ReleaseHost;
use crate::services::llm::CompletionBackend;
use crate::services::mailer::Mailer;
use crate::services::notes::{GenerationError, NoteGenerator};
use crate::services::releases::{ReleaseStore, StoreError};
use crate::services::signature::WebhookVerifier;

/// Errors surfaced to the caller of an orchestration run
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Release not found: {0}")]
    ReleaseNotFound(Uuid),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(Uuid),

    #[error("Release has no generated notes yet: {0}")]
    NotesMissing(Uuid),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Result of handling one inbound webhook delivery
#[derive(Debug)]
pub enum WebhookOutcome {
    /// Event not applicable or repository not subscribed; acknowledged
    Ignored {
        reason: &'static str,
        event: Option<String>,
    },
    /// The (repository, tag) was already processed; idempotent success
    Duplicate { release_id: Uuid },
    /// Full pipeline ran; partial delivery failure still counts as processed
    Processed {
        release_id: Uuid,
        targets_attempted: usize,
        targets_delivered: usize,
    },
}

/// Wire shape of the inbound notification body
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    action: Option<String>,
    release: Option<PayloadRelease>,
    repository: Option<PayloadRepository>,
}

#[derive(Debug, Deserialize)]
struct PayloadRelease {
    tag_name: String,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayloadRepository {
    full_name: String,
}

/// What an inbound delivery turned out to be
enum ParsedEvent {
    Published(ReleaseEvent),
    NotApplicable { event: Option<String> },
}

/// Parse the event headers and body into a processable release, or an
/// acknowledgment that the delivery is not applicable.
fn parse_event(
    event_type: Option<&str>,
    raw_body: &[u8],
) -> Result<ParsedEvent, OrchestratorError> {
    if event_type != Some("release") {
        return Ok(ParsedEvent::NotApplicable {
            event: event_type.map(str::to_string),
        });
    }

    let payload: WebhookPayload = serde_json::from_slice(raw_body)
        .map_err(|e| OrchestratorError::MalformedPayload(e.to_string()))?;

    if payload.action.as_deref() != Some("published") {
        return Ok(ParsedEvent::NotApplicable {
            event: Some(format!(
                "release.{}",
                payload.action.as_deref().unwrap_or("unknown")
            )),
        });
    }

    let release = payload
        .release
        .ok_or_else(|| OrchestratorError::MalformedPayload("missing release".to_string()))?;
    let repository = payload
        .repository
        .ok_or_else(|| OrchestratorError::MalformedPayload("missing repository".to_string()))?;

    Ok(ParsedEvent::Published(ReleaseEvent {
        repo_full_name: repository.full_name,
        tag_name: release.tag_name,
        action: "published".to_string(),
        release_url: release.html_url,
    }))
}

/// Sequences the whole pipeline for one release
pub struct ReleaseOrchestrator {
    store: ReleaseStore,
    verifier: WebhookVerifier,
    cipher: CredentialCipher,
    aggregator: DiffAggregator,
    generator: NoteGenerator,
    distributor: Distributor,
}

impl ReleaseOrchestrator {
    pub fn new(
        store: ReleaseStore,
        cipher: CredentialCipher,
        host: Arc<dyn ReleaseHost>,
        backend: Arc<dyn CompletionBackend>,
        mailer: Arc<dyn Mailer>,
        http_timeout: Duration,
    ) -> Self {
        Self {
            store,
            verifier: WebhookVerifier::new(),
            cipher,
            aggregator: DiffAggregator::new(host),
            generator: NoteGenerator::new(backend),
            distributor: Distributor::new(mailer, http_timeout),
        }
    }

    /// Handle one inbound webhook delivery end to end.
    ///
    /// Rejections (bad signature, malformed body) and processing failures
    /// surface as errors; unknown repositories and inapplicable events are
    /// acknowledged as `Ignored`; a duplicate tag is an idempotent success.
    pub async fn handle_webhook(
        &self,
        event_type: Option<&str>,
        signature: Option<&str>,
        raw_body: &[u8],
    ) -> Result<WebhookOutcome, OrchestratorError> {
        let event = match parse_event(event_type, raw_body)? {
            ParsedEvent::Published(event) => event,
            ParsedEvent::NotApplicable { event } => {
                return Ok(WebhookOutcome::Ignored {
                    reason: "unsupported_event",
                    event,
                });
            }
        };

        // Unknown repositories are expected traffic, not an error.
        let Some(subscription) = self
            .store
            .find_subscription_by_full_name(&event.repo_full_name)
            .await?
            .filter(|s| s.active)
        else {
            return Ok(WebhookOutcome::Ignored {
                reason: "repo_not_connected",
                event: event_type.map(str::to_string),
            });
        };

        if !self
            .verifier
            .verify(raw_body, signature, &subscription.webhook_secret)
        {
            return Err(OrchestratorError::InvalidSignature);
        }

        // Pre-check for a duplicate delivery before creating any state.
        if let Some(existing) = self
            .store
            .find_release(subscription.repo_id, &event.tag_name)
            .await?
        {
            info!(
                repo = %event.repo_full_name,
                tag = %event.tag_name,
                "duplicate webhook delivery acknowledged"
            );
            return Ok(WebhookOutcome::Duplicate {
                release_id: existing.release_id,
            });
        }

        let release = match self
            .store
            .insert_release(
                subscription.repo_id,
                &event.tag_name,
                event.release_url.as_deref(),
                ReleaseStatus::Received,
            )
            .await
        {
            Ok(release) => release,
            // A concurrent delivery won the insert race; same idempotent
            // acknowledgment as the pre-check.
            Err(e) if e.is_unique_violation() => {
                let existing = self
                    .store
                    .find_release(subscription.repo_id, &event.tag_name)
                    .await?
                    .ok_or(StoreError::NotFound(format!(
                        "release {} after duplicate insert",
                        event.tag_name
                    )))?;
                return Ok(WebhookOutcome::Duplicate {
                    release_id: existing.release_id,
                });
            }
            Err(e) => return Err(e.into()),
        };

        self.store
            .set_status(release.release_id, ReleaseStatus::Processing)
            .await?;

        let notes = self
            .run_generation(&subscription, &release, false)
            .await?;
        self.store
            .set_status(release.release_id, ReleaseStatus::Ready)
            .await?;

        let summary = self.summary_for(&subscription, &release).await?;
        let targets = self.build_targets(&subscription).await?;
        let outcomes = self
            .distributor
            .distribute(&summary, &notes, &targets)
            .await;
        self.store
            .append_outcomes(release.release_id, &outcomes)
            .await?;

        // Partial delivery success is still "published".
        self.store
            .set_status(release.release_id, ReleaseStatus::Published)
            .await?;

        let targets_delivered = outcomes.iter().filter(|o| o.success).count();
        info!(
            repo = %event.repo_full_name,
            tag = %event.tag_name,
            targets_attempted = outcomes.len(),
            targets_delivered,
            "release processed"
        );

        Ok(WebhookOutcome::Processed {
            release_id: release.release_id,
            targets_attempted: outcomes.len(),
            targets_delivered,
        })
    }

    /// Bulk-import the newest `count` releases that are not already present.
    ///
    /// Imported releases get notes and a synthetic hosted outcome but no
    /// live fan-out, and are marked published. One tag's failure is recorded
    /// and the batch continues.
    pub async fn backfill(
        &self,
        repo_id: Uuid,
        count: u32,
    ) -> Result<BackfillReport, OrchestratorError> {
        let subscription = self
            .store
            .find_subscription(repo_id)
            .await?
            .ok_or(OrchestratorError::RepositoryNotFound(repo_id))?;
        let (owner, name) = split_full_name(&subscription)?;
        let token = self.cipher.decrypt(&subscription.access_token_ciphertext)?;

        let releases = self
            .aggregator
            .list_recent(&token, owner, name, count)
            .await?;

        let mut report = BackfillReport {
            imported: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
        };

        for host_release in releases {
            let tag_name = host_release.tag_name.clone();

            if self
                .store
                .find_release(subscription.repo_id, &tag_name)
                .await?
                .is_some()
            {
                report.skipped.push(tag_name);
                continue;
            }

            match self
                .import_one(&subscription, &tag_name, host_release.html_url.as_deref())
                .await
            {
                Ok(()) => report.imported.push(tag_name),
                Err(OrchestratorError::Store(e)) if e.is_unique_violation() => {
                    report.skipped.push(tag_name);
                }
                Err(e) => {
                    warn!(tag = %tag_name, error = %e, "backfill import failed");
                    report.errors.push(BackfillError {
                        tag_name,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn import_one(
        &self,
        subscription: &RepoSubscription,
        tag_name: &str,
        release_url: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        let release = self
            .store
            .insert_release(
                subscription.repo_id,
                tag_name,
                release_url,
                ReleaseStatus::Received,
            )
            .await?;
        self.store
            .set_status(release.release_id, ReleaseStatus::Processing)
            .await?;

        self.run_generation(subscription, &release, false).await?;
        self.store
            .set_status(release.release_id, ReleaseStatus::Ready)
            .await?;

        // Historical imports are immediately published with a synthetic
        // hosted outcome; there is no live fan-out.
        self.store
            .append_outcomes(
                release.release_id,
                &[DistributionOutcome::success(
                    Audience::Customer,
                    ChannelKind::Hosted,
                    None,
                )],
            )
            .await?;
        self.store
            .set_status(release.release_id, ReleaseStatus::Published)
            .await?;
        Ok(())
    }

    /// Re-run aggregation and generation for an existing release.
    ///
    /// Without `force`, audiences carrying a manual edit keep their text and
    /// flags; with `force`, all three documents are overwritten and all
    /// edited flags cleared.
    pub async fn regenerate(
        &self,
        release_id: Uuid,
        force: bool,
    ) -> Result<ReleaseNotes, OrchestratorError> {
        let release = self
            .store
            .find_release_by_id(release_id)
            .await?
            .ok_or(OrchestratorError::ReleaseNotFound(release_id))?;
        let subscription = self
            .store
            .find_subscription(release.repo_id)
            .await?
            .ok_or(OrchestratorError::RepositoryNotFound(release.repo_id))?;

        let notes = self.run_generation(&subscription, &release, !force).await?;

        // A failed release recovers to ready once it has notes again; a
        // published release keeps its status.
        if matches!(
            release.status,
            ReleaseStatus::Received | ReleaseStatus::Processing | ReleaseStatus::Failed
        ) {
            self.store
                .set_status(release.release_id, ReleaseStatus::Ready)
                .await?;
        }

        Ok(notes)
    }

    /// Re-run the fan-out for an existing release with persisted notes.
    ///
    /// Outcomes are append-only: a retried publish adds rows.
    pub async fn publish(
        &self,
        release_id: Uuid,
    ) -> Result<(usize, usize), OrchestratorError> {
        let release = self
            .store
            .find_release_by_id(release_id)
            .await?
            .ok_or(OrchestratorError::ReleaseNotFound(release_id))?;
        let subscription = self
            .store
            .find_subscription(release.repo_id)
            .await?
            .ok_or(OrchestratorError::RepositoryNotFound(release.repo_id))?;
        let notes = self
            .store
            .find_notes(release_id)
            .await?
            .ok_or(OrchestratorError::NotesMissing(release_id))?;

        let summary = self.summary_for(&subscription, &release).await?;
        let targets = self.build_targets(&subscription).await?;
        let outcomes = self
            .distributor
            .distribute(&summary, &notes, &targets)
            .await;
        self.store.append_outcomes(release_id, &outcomes).await?;
        self.store
            .set_status(release_id, ReleaseStatus::Published)
            .await?;

        let delivered = outcomes.iter().filter(|o| o.success).count();
        Ok((outcomes.len(), delivered))
    }

    /// Aggregate the change-set, generate the documents, and persist them.
    /// Failures mark the release failed and propagate; nothing partial is
    /// persisted.
    async fn run_generation(
        &self,
        subscription: &RepoSubscription,
        release: &Release,
        preserve_edited: bool,
    ) -> Result<ReleaseNotes, OrchestratorError> {
        let result = self
            .aggregate_and_generate(subscription, release, preserve_edited)
            .await;
        if let Err(e) = &result {
            self.store
                .set_failed(release.release_id, &e.to_string())
                .await?;
        }
        result
    }

    async fn aggregate_and_generate(
        &self,
        subscription: &RepoSubscription,
        release: &Release,
        preserve_edited: bool,
    ) -> Result<ReleaseNotes, OrchestratorError> {
        let (owner, name) = split_full_name(subscription)?;
        let token = self.cipher.decrypt(&subscription.access_token_ciphertext)?;

        let (host_release, change_set) = self
            .aggregator
            .aggregate(&token, owner, name, &release.tag_name)
            .await?;

        let release_url = host_release
            .html_url
            .clone()
            .or_else(|| release.release_url.clone());
        if release_url != release.release_url {
            self.store
                .set_release_url(release.release_id, release_url.as_deref())
                .await?;
        }

        let summary = ReleaseSummary {
            repo_full_name: subscription.full_name.clone(),
            tag_name: release.tag_name.clone(),
            release_url,
        };
        let generated = self
            .generator
            .generate(
                &summary,
                host_release.body.as_deref(),
                &change_set,
                &subscription.style(),
            )
            .await?;

        let notes = if preserve_edited {
            self.store
                .merge_unedited_notes(release.release_id, &generated)
                .await?
        } else {
            self.store
                .replace_notes(release.release_id, &generated)
                .await?
        };
        Ok(notes)
    }

    async fn summary_for(
        &self,
        subscription: &RepoSubscription,
        release: &Release,
    ) -> Result<ReleaseSummary, OrchestratorError> {
        // The URL may have been refreshed during aggregation; read it back.
        let current = self
            .store
            .find_release_by_id(release.release_id)
            .await?
            .unwrap_or_else(|| release.clone());
        Ok(ReleaseSummary {
            repo_full_name: subscription.full_name.clone(),
            tag_name: current.tag_name,
            release_url: current.release_url,
        })
    }

    /// One target per enabled configured channel, plus one hosted target per
    /// audience unconditionally.
    async fn build_targets(
        &self,
        subscription: &RepoSubscription,
    ) -> Result<Vec<DistributionTarget>, OrchestratorError> {
        let channels = self
            .store
            .list_enabled_channels(subscription.repo_id)
            .await?;

        let mut targets: Vec<DistributionTarget> =
            channels.iter().filter_map(channel_target).collect();
        targets.extend(
            Audience::ALL
                .iter()
                .map(|a| DistributionTarget::Hosted { audience: *a }),
        );
        Ok(targets)
    }
}

fn channel_target(channel: &NotificationChannel) -> Option<DistributionTarget> {
    match channel.kind {
        ChannelKind::Chat => Some(DistributionTarget::Chat {
            webhook_url: channel.endpoint.clone(),
            audience: channel.audience,
        }),
        ChannelKind::Email => Some(DistributionTarget::Email {
            address: channel.endpoint.clone(),
            audience: channel.audience,
        }),
        // Hosted targets are not configured per channel; they are always
        // appended for every audience.
        ChannelKind::Hosted => None,
    }
}

fn split_full_name(subscription: &RepoSubscription) -> Result<(&str, &str), OrchestratorError> {
    subscription.owner_and_name().ok_or_else(|| {
        OrchestratorError::MalformedPayload(format!(
            "repository full name is not owner/name: {}",
            subscription.full_name
        ))
    })
}
