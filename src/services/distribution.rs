//! Distributor
//!
//! Fans the generated documents out to a list of delivery targets. Every
//! target is attempted concurrently and independently; a target's failure is
//! captured in its outcome and never escalates. The returned outcomes have
//! the same length and order as the target list.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use tracing::warn;

use crate::models::{
    Audience, ChannelKind, DistributionOutcome, DistributionTarget, ReleaseNotes, ReleaseSummary,
};
use crate::services::mailer::Mailer;

/// Delivers documents to chat webhooks, email recipients, and the hosted
/// surface placeholder
pub struct Distributor {
    client: reqwest::Client,
    mailer: Arc<dyn Mailer>,
}

impl Distributor {
    pub fn new(mailer: Arc<dyn Mailer>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { client, mailer }
    }

    /// Attempt delivery to every target.
    ///
    /// Never errors: each failure becomes a `DistributionOutcome` with
    /// `success == false` and the detail captured.
    pub async fn distribute(
        &self,
        summary: &ReleaseSummary,
        notes: &ReleaseNotes,
        targets: &[DistributionTarget],
    ) -> Vec<DistributionOutcome> {
        join_all(
            targets
                .iter()
                .map(|target| self.attempt(summary, notes, target)),
        )
        .await
    }

    async fn attempt(
        &self,
        summary: &ReleaseSummary,
        notes: &ReleaseNotes,
        target: &DistributionTarget,
    ) -> DistributionOutcome {
        let audience = target.audience();
        let document = notes_for_audience(notes, audience);

        let result = match target {
            // The hosted surface is served from the persisted notes; there is
            // no delivery call, only uniform outcome bookkeeping.
            DistributionTarget::Hosted { .. } => Ok(()),
            DistributionTarget::Chat { webhook_url, .. } => {
                self.post_chat(webhook_url, summary, document).await
            }
            DistributionTarget::Email { address, .. } => {
                let subject = format!(
                    "{} {} release notes",
                    summary.repo_full_name, summary.tag_name
                );
                self.mailer
                    .send(address, &subject, document)
                    .await
                    .map_err(|e| e.to_string())
            }
        };

        match result {
            Ok(()) => {
                let responded_at = match target.kind() {
                    ChannelKind::Hosted => None,
                    _ => Some(Utc::now()),
                };
                DistributionOutcome::success(audience, target.kind(), responded_at)
            }
            Err(detail) => {
                warn!(
                    repo = %summary.repo_full_name,
                    tag = %summary.tag_name,
                    channel = target.kind().as_str(),
                    %audience,
                    %detail,
                    "delivery failed"
                );
                DistributionOutcome::failure(audience, target.kind(), detail)
            }
        }
    }

    async fn post_chat(
        &self,
        webhook_url: &str,
        summary: &ReleaseSummary,
        document: &str,
    ) -> Result<(), String> {
        let text = match &summary.release_url {
            Some(url) => format!(
                "*{} {}* ({url})\n\n{document}",
                summary.repo_full_name, summary.tag_name
            ),
            None => format!(
                "*{} {}*\n\n{document}",
                summary.repo_full_name, summary.tag_name
            ),
        };

        let resp = self
            .client
            .post(webhook_url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("{}: {body}", status.as_u16()));
        }
        Ok(())
    }
}

/// Select the document for a target's audience.
///
/// The exhaustive match makes an unrecognized audience unrepresentable; the
/// selection cannot fail at distribution time.
pub fn notes_for_audience(notes: &ReleaseNotes, audience: Audience) -> &str {
    notes.document(audience)
}
