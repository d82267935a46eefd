use crate::{
    auth::{AuthContext, ExtractAuth},
    error::{AppError, AppResult},
    membership::{self, ReviewDecision},
    models::MembershipApplication,
    DbPool,
};
use axum::{
    extract::Path,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyRequest {
    club_id: i32,
    role_id: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    decision: ReviewDecision,
    remarks: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMembershipRequest {
    role_id: Option<i32>,
    is_active: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationResponse {
    id: i32,
    user_id: i32,
    club_id: i32,
    role_id: i32,
    status: String,
    remarks: Option<String>,
    applied_at: NaiveDateTime,
    processed_at: Option<NaiveDateTime>,
}

impl From<MembershipApplication> for ApplicationResponse {
    fn from(app: MembershipApplication) -> ApplicationResponse {
        ApplicationResponse {
            id: app.id,
            user_id: app.user_id,
            club_id: app.club_id,
            role_id: app.role_id,
            status: app.status,
            remarks: app.remarks,
            applied_at: app.applied_at,
            processed_at: app.processed_at,
        }
    }
}

async fn apply(
    Extension(pool): Extension<DbPool>,
    ExtractAuth(user_id): ExtractAuth,
    Json(req): Json<ApplyRequest>,
) -> AppResult<Json<ApplicationResponse>> {
    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;

    let application = membership::submit_application(conn, &auth, req.club_id, req.role_id)
        .await
        .map_err(AppError::workflow)?;

    Ok(Json(application.into()))
}

async fn review(
    Extension(pool): Extension<DbPool>,
    Path(application_id): Path<i32>,
    ExtractAuth(user_id): ExtractAuth,
    Json(req): Json<ReviewRequest>,
) -> AppResult<Json<()>> {
    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;

    membership::review_application(conn, &auth, application_id, req.decision, req.remarks)
        .await
        .map_err(AppError::workflow)?;

    Ok(Json(()))
}

async fn pending(
    Extension(pool): Extension<DbPool>,
    Path(club_id): Path<i32>,
    ExtractAuth(user_id): ExtractAuth,
) -> AppResult<Json<Vec<ApplicationResponse>>> {
    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;

    let queue = membership::pending_applications(conn, &auth, club_id)
        .await
        .map_err(AppError::workflow)?;

    Ok(Json(queue.into_iter().map(ApplicationResponse::from).collect()))
}

async fn remove(
    Extension(pool): Extension<DbPool>,
    Path(membership_id): Path<i32>,
    ExtractAuth(user_id): ExtractAuth,
) -> AppResult<Json<()>> {
    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;

    membership::remove_membership(conn, &auth, membership_id)
        .await
        .map_err(AppError::workflow)?;

    Ok(Json(()))
}

async fn update(
    Extension(pool): Extension<DbPool>,
    Path(membership_id): Path<i32>,
    ExtractAuth(user_id): ExtractAuth,
    Json(req): Json<UpdateMembershipRequest>,
) -> AppResult<Json<()>> {
    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;

    membership::update_membership(conn, &auth, membership_id, req.role_id, req.is_active)
        .await
        .map_err(AppError::workflow)?;

    Ok(Json(()))
}

pub fn app() -> Router {
    Router::new()
        .route("/apply", post(apply))
        .route("/queue/:club_id", get(pending))
        .route("/applications/:application_id/review", post(review))
        .route("/:membership_id", delete(remove).post(update))
}
