//! Repository handlers
//!
//! Connect/disconnect flow for repository subscriptions, host repository
//! listing for the picker UI, and OAuth connect-flow state issuance.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ChannelKind, ConnectRepoRequest};
use crate::services::oauth_state::OAuthState;
use crate::services::{generate_secret, HostError};
use crate::AppState;

/// Standard API response wrapper
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    data: T,
    meta: ResponseMeta,
}

#[derive(Serialize)]
struct ResponseMeta {
    request_id: String,
}

impl<T: Serialize> ApiResponse<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta {
                request_id: uuid::Uuid::new_v4().to_string(),
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRepoResponse {
    repo_id: Uuid,
    full_name: String,
    active: bool,
    channels: usize,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueStateRequest {
    #[serde(default)]
    pub return_to: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueStateResponse {
    state: String,
}

/// POST /v1/repos/connect
///
/// Store a subscription for a repository: encrypts the access token,
/// generates a webhook secret, registers the release webhook on the host,
/// and records the configured channels.
pub async fn connect_repo(
    state: web::Data<AppState>,
    body: web::Json<ConnectRepoRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();

    let Some((owner, name)) = request.full_name.split_once('/') else {
        return Err(AppError::Validation(format!(
            "repository name must be owner/name: {}",
            request.full_name
        )));
    };
    if request
        .channels
        .iter()
        .any(|c| matches!(c.kind, ChannelKind::Hosted))
    {
        return Err(AppError::Validation(
            "hosted targets are implicit and cannot be configured as channels".to_string(),
        ));
    }

    // Browser-initiated connects carry a single-use state token.
    if let Some(token) = &request.state {
        if state.oauth_states.claim(token).is_none() {
            return Err(AppError::Unauthorized(
                "invalid or expired connect state".to_string(),
            ));
        }
    }

    let webhook_secret = generate_secret();
    let ciphertext = state
        .cipher
        .encrypt(&request.access_token)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    // Register the webhook before touching the database; a host rejection
    // leaves no persisted state.
    let callback_url = format!("{}/v1/webhooks/github", state.config.public_base_url);
    let hook_id = state
        .host
        .create_release_webhook(
            &request.access_token,
            owner,
            name,
            &callback_url,
            &webhook_secret,
        )
        .await
        .map_err(map_host_error)?;

    let store = state.store();
    let subscription = match store
        .insert_subscription(&request.full_name, &webhook_secret, &ciphertext, &request.style)
        .await
    {
        Ok(subscription) => subscription,
        Err(e) if e.is_unique_violation() => {
            // Roll back the just-registered hook; best effort.
            if let Err(e) = state
                .host
                .delete_webhook(&request.access_token, owner, name, hook_id)
                .await
            {
                warn!(full_name = %request.full_name, error = %e, "failed to remove orphaned webhook");
            }
            return Err(AppError::Conflict(format!(
                "repository already connected: {}",
                request.full_name
            )));
        }
        Err(e) => return Err(e.into()),
    };
    store
        .set_host_webhook_id(subscription.repo_id, hook_id)
        .await?;

    for channel in &request.channels {
        store
            .insert_channel(
                subscription.repo_id,
                channel.kind,
                channel.audience,
                &channel.endpoint,
            )
            .await?;
    }

    Ok(HttpResponse::Created().json(ApiResponse::new(ConnectRepoResponse {
        repo_id: subscription.repo_id,
        full_name: subscription.full_name,
        active: subscription.active,
        channels: request.channels.len(),
        created_at: subscription.created_at,
    })))
}

/// DELETE /v1/repos/{repoId}
///
/// Deactivate a subscription and remove its webhook from the host. Webhook
/// removal is best effort; the subscription is deactivated regardless.
pub async fn disconnect_repo(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let repo_id = path.into_inner();
    let store = state.store();

    let subscription = store
        .find_subscription(repo_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("repository {repo_id}")))?;

    if let (Some(hook_id), Some((owner, name))) = (
        subscription.host_webhook_id,
        subscription.owner_and_name(),
    ) {
        match state.cipher.decrypt(&subscription.access_token_ciphertext) {
            Ok(token) => {
                if let Err(e) = state.host.delete_webhook(&token, owner, name, hook_id).await {
                    warn!(%repo_id, error = %e, "failed to delete host webhook");
                }
            }
            Err(e) => warn!(%repo_id, error = %e, "failed to decrypt token for webhook removal"),
        }
    }

    store.deactivate_subscription(repo_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /v1/repos/host-repos
///
/// Repositories visible to the supplied host token, for the connect picker.
/// The token comes from the Authorization header and is never stored here.
pub async fn list_host_repos(
    state: web::Data<AppState>,
    request: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

    let repos = state
        .host
        .list_viewer_repos(token)
        .await
        .map_err(map_host_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(repos)))
}

/// POST /v1/repos/oauth/state
///
/// Issue a single-use state token for the browser connect flow.
pub async fn issue_oauth_state(
    state: web::Data<AppState>,
    body: web::Json<IssueStateRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();
    let token = state.oauth_states.issue(OAuthState {
        return_to: request.return_to,
    });
    Ok(HttpResponse::Ok().json(ApiResponse::new(IssueStateResponse { state: token })))
}

fn map_host_error(e: HostError) -> AppError {
    AppError::Upstream(e.to_string())
}

pub fn configure_repo_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/repos")
            // Static paths must come before parameterized ones so that
            // "connect" is never captured as a {repoId}.
            .route("/connect", web::post().to(connect_repo))
            .route("/host-repos", web::get().to(list_host_repos))
            .route("/oauth/state", web::post().to(issue_oauth_state))
            .route(
                "/{repoId}/backfill",
                web::post().to(crate::handlers::releases::backfill_repo),
            )
            .route("/{repoId}", web::delete().to(disconnect_repo)),
    );
}
