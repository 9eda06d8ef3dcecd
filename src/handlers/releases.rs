//! Release handlers
//!
//! Manual operations against existing releases: inspection, backfill,
//! regeneration, re-publish, and note edits.

use actix_web::{web, HttpResponse};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::webhooks::map_orchestrator_error;
use crate::models::{BackfillRequest, EditNotesRequest, RegenerateRequest, ReleaseDetail};
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
struct PublishResponse {
    targets_attempted: usize,
    targets_delivered: usize,
}

/// GET /v1/releases/{releaseId}
///
/// Release entity plus its notes and all recorded distribution outcomes.
pub async fn get_release(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let release_id = path.into_inner();
    let store = state.store();

    let release = store
        .find_release_by_id(release_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("release {release_id}")))?;
    let notes = store.find_notes(release_id).await?;
    let outcomes = store.list_outcomes(release_id).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(ReleaseDetail {
        release,
        notes,
        outcomes,
    })))
}

/// POST /v1/repos/{repoId}/backfill
///
/// Bulk-import the newest releases that are not already present. Existing
/// tags are skipped; a failing tag is reported and the batch continues.
pub async fn backfill_repo(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<BackfillRequest>,
) -> Result<HttpResponse, AppError> {
    let repo_id = path.into_inner();
    let request = body.into_inner();

    let report = state
        .orchestrator()
        .backfill(repo_id, request.count)
        .await
        .map_err(map_orchestrator_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(report)))
}

/// POST /v1/releases/{releaseId}/regenerate
///
/// Re-run aggregation and generation. Audiences with a manual edit are
/// preserved unless `force` is set; a forced run clears all edited flags.
pub async fn regenerate_release(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<RegenerateRequest>,
) -> Result<HttpResponse, AppError> {
    let release_id = path.into_inner();
    let request = body.into_inner();

    let notes = state
        .orchestrator()
        .regenerate(release_id, request.force)
        .await
        .map_err(map_orchestrator_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(notes)))
}

/// POST /v1/releases/{releaseId}/publish
///
/// Re-run the fan-out with the persisted notes. Outcome rows are appended,
/// never mutated.
pub async fn publish_release(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let release_id = path.into_inner();

    let (targets_attempted, targets_delivered) = state
        .orchestrator()
        .publish(release_id)
        .await
        .map_err(map_orchestrator_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(PublishResponse {
        targets_attempted,
        targets_delivered,
    })))
}

/// PATCH /v1/releases/{releaseId}/notes
///
/// Manually override one or more audience documents; each supplied document
/// gets its edited flag set.
pub async fn edit_release_notes(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<EditNotesRequest>,
) -> Result<HttpResponse, AppError> {
    let release_id = path.into_inner();
    let edit = body.into_inner();

    if edit.customer_md.is_none() && edit.developer_md.is_none() && edit.stakeholder_md.is_none() {
        return Err(AppError::Validation(
            "at least one audience document must be supplied".to_string(),
        ));
    }

    let notes = state.store().edit_notes(release_id, &edit).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(notes)))
}

pub fn configure_release_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/releases")
            .route("/{releaseId}", web::get().to(get_release))
            .route("/{releaseId}/regenerate", web::post().to(regenerate_release))
            .route("/{releaseId}/publish", web::post().to(publish_release))
            .route("/{releaseId}/notes", web::patch().to(edit_release_notes)),
    );
}
