use crate::{
    auth::{AuthContext, ExtractAuth},
    error::{AppError, AppResult},
    membership::ReviewDecision,
    models::EventParticipation,
    participation,
    storage::FileStore,
    DbPool,
};
use axum::{
    extract::{Multipart, Path},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    decision: ReviewDecision,
    remarks: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParticipationResponse {
    id: i32,
    user_id: i32,
    event_id: i32,
    status: String,
    proof_ref: Option<String>,
    remarks: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl From<EventParticipation> for ParticipationResponse {
    fn from(p: EventParticipation) -> ParticipationResponse {
        ParticipationResponse {
            id: p.id,
            user_id: p.user_id,
            event_id: p.event_id,
            status: p.status,
            proof_ref: p.proof_ref,
            remarks: p.remarks,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

async fn enroll(
    Extension(pool): Extension<DbPool>,
    Path(event_id): Path<i32>,
    ExtractAuth(user_id): ExtractAuth,
) -> AppResult<Json<ParticipationResponse>> {
    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;

    let enrolled = participation::enroll(conn, &auth, event_id)
        .await
        .map_err(AppError::workflow)?;

    Ok(Json(enrolled.into()))
}

/// Multipart upload; the first file field is taken as the proof artifact.
async fn upload_proof(
    Extension(pool): Extension<DbPool>,
    Extension(store): Extension<Arc<FileStore>>,
    Path(participation_id): Path<i32>,
    ExtractAuth(user_id): ExtractAuth,
    mut multipart: Multipart,
) -> AppResult<Json<ParticipationResponse>> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await? {
        if let Some(file_name) = field.file_name().map(str::to_string) {
            upload = Some((file_name, field.bytes().await?.to_vec()));
            break;
        }
    }
    let Some((file_name, bytes)) = upload else {
        return Err(AppError::from(
            StatusCode::BAD_REQUEST,
            "no proof file attached",
        ));
    };

    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;

    let updated =
        participation::submit_proof(conn, &auth, &store, participation_id, &bytes, &file_name)
            .await
            .map_err(AppError::workflow)?;

    Ok(Json(updated.into()))
}

async fn review(
    Extension(pool): Extension<DbPool>,
    Path(participation_id): Path<i32>,
    ExtractAuth(user_id): ExtractAuth,
    Json(req): Json<ReviewRequest>,
) -> AppResult<Json<()>> {
    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;

    participation::review_participation(conn, &auth, participation_id, req.decision, req.remarks)
        .await
        .map_err(AppError::workflow)?;

    Ok(Json(()))
}

async fn pending(
    Extension(pool): Extension<DbPool>,
    Path(event_id): Path<i32>,
    ExtractAuth(user_id): ExtractAuth,
) -> AppResult<Json<Vec<ParticipationResponse>>> {
    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;

    let queue = participation::pending_participations(conn, &auth, event_id)
        .await
        .map_err(AppError::workflow)?;

    Ok(Json(
        queue.into_iter().map(ParticipationResponse::from).collect(),
    ))
}

pub fn app() -> Router {
    Router::new()
        .route("/enroll/:event_id", post(enroll))
        .route("/:participation_id/proof", post(upload_proof))
        .route("/:participation_id/review", post(review))
        .route("/pending/:event_id", get(pending))
}
