//! Webhook handlers
//!
//! Inbound release notifications from the source host. The raw body is kept
//! as bytes so the signature can be verified over exactly what was sent.

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::error::AppError;
use crate::services::{OrchestratorError, WebhookOutcome};
use crate::AppState;

/// POST /v1/webhooks/github
///
/// Receives release notifications. Only `release`/`published` deliveries run
/// the pipeline; everything else is acknowledged as ignored. Distribution
/// failures are invisible here: partial delivery is still "processed".
pub async fn receive_github_webhook(
    state: web::Data<AppState>,
    request: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let event_type = header(&request, "X-GitHub-Event");
    let signature = header(&request, "X-Hub-Signature-256");

    let outcome = state
        .orchestrator()
        .handle_webhook(event_type.as_deref(), signature.as_deref(), &body)
        .await
        .map_err(map_orchestrator_error)?;

    let response = match outcome {
        WebhookOutcome::Ignored { reason, event } => json!({
            "status": "ignored",
            "reason": reason,
            "event": event,
        }),
        WebhookOutcome::Duplicate { release_id } => json!({
            "status": "duplicate",
            "releaseId": release_id,
        }),
        WebhookOutcome::Processed {
            release_id,
            targets_attempted,
            targets_delivered,
        } => json!({
            "status": "processed",
            "releaseId": release_id,
            "targetsAttempted": targets_attempted,
            "targetsDelivered": targets_delivered,
        }),
    };

    Ok(HttpResponse::Ok().json(response))
}

fn header(request: &HttpRequest, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Map orchestrator errors to application errors
pub(crate) fn map_orchestrator_error(e: OrchestratorError) -> AppError {
    match e {
        OrchestratorError::MalformedPayload(msg) => AppError::Validation(msg),
        OrchestratorError::InvalidSignature => {
            AppError::Unauthorized("Invalid webhook signature".to_string())
        }
        OrchestratorError::ReleaseNotFound(id) => AppError::NotFound(format!("release {id}")),
        OrchestratorError::RepositoryNotFound(id) => {
            AppError::NotFound(format!("repository {id}"))
        }
        OrchestratorError::NotesMissing(id) => {
            AppError::Conflict(format!("release {id} has no generated notes"))
        }
        OrchestratorError::Diff(e) => AppError::Upstream(e.to_string()),
        OrchestratorError::Generation(e) => AppError::Upstream(e.to_string()),
        OrchestratorError::Store(e) => e.into(),
        OrchestratorError::Crypto(e) => AppError::Internal(e.to_string()),
    }
}

pub fn configure_webhook_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/webhooks").route("/github", web::post().to(receive_github_webhook)),
    );
}
