use crate::{
    auth::{AuthContext, ExtractAuth},
    error::{AppError, AppResult},
    models::{Role, RoleType},
    registry, DbPool,
};
use axum::{
    extract::Path,
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoleRequest {
    club_id: i32,
    name: String,
    role_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleResponse {
    id: i32,
    club_id: i32,
    name: String,
    role_type: String,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> RoleResponse {
        RoleResponse {
            id: role.id,
            club_id: role.club_id,
            name: role.name,
            role_type: role.role_type,
        }
    }
}

async fn create(
    Extension(pool): Extension<DbPool>,
    ExtractAuth(user_id): ExtractAuth,
    Json(req): Json<CreateRoleRequest>,
) -> AppResult<Json<RoleResponse>> {
    let role_type = RoleType::parse(&req.role_type).ok_or_else(|| {
        AppError::from(
            StatusCode::BAD_REQUEST,
            "roleType must be executive_body or club_member",
        )
    })?;

    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;

    let role = registry::create_role(conn, &auth, req.club_id, req.name, role_type)
        .await
        .map_err(AppError::workflow)?;

    Ok(Json(role.into()))
}

async fn remove(
    Extension(pool): Extension<DbPool>,
    Path(role_id): Path<i32>,
    ExtractAuth(user_id): ExtractAuth,
) -> AppResult<Json<()>> {
    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;

    registry::delete_role(conn, &auth, role_id)
        .await
        .map_err(AppError::workflow)?;

    Ok(Json(()))
}

async fn list(
    Extension(pool): Extension<DbPool>,
    Path(club_id): Path<i32>,
) -> AppResult<Json<Vec<RoleResponse>>> {
    let conn = &mut pool.get().await?;

    let roles = registry::list_roles(conn, club_id)
        .await
        .map_err(AppError::workflow)?;

    Ok(Json(roles.into_iter().map(RoleResponse::from).collect()))
}

pub fn app() -> Router {
    Router::new()
        .route("/", post(create))
        .route("/:role_id", delete(remove))
        .route("/list/:club_id", get(list))
}
