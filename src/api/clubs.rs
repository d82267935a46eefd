use crate::{
    auth::{AuthContext, ExtractAuth},
    error::{AppError, AppResult, WorkflowError},
    membership,
    models::{Club, User},
    registry,
    schema::{clubs, users},
    DbPool,
};
use axum::{
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use diesel::prelude::*;
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateClubRequest {
    name: String,
    category: String,
    description: Option<String>,
    /// Optional designated club admin; elevated in the same transaction.
    admin_user_id: Option<i32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClubResponse {
    id: i32,
    name: String,
    category: String,
    description: Option<String>,
    is_active: bool,
}

impl From<Club> for ClubResponse {
    fn from(club: Club) -> ClubResponse {
        ClubResponse {
            id: club.id,
            name: club.name,
            category: club.category,
            description: club.description,
            is_active: club.is_active,
        }
    }
}

/// Admin-only. Inserts the club, seeds the default role set, and optionally
/// installs the designated club admin, all in one transaction.
async fn create(
    Extension(pool): Extension<DbPool>,
    ExtractAuth(user_id): ExtractAuth,
    Json(req): Json<CreateClubRequest>,
) -> AppResult<Json<ClubResponse>> {
    #[derive(Insertable)]
    #[diesel(table_name = clubs)]
    struct NewClub {
        name: String,
        category: String,
        description: Option<String>,
        is_active: bool,
        admin_user_id: Option<i32>,
    }

    enum CreateOutcome {
        Created(Club),
        NameTaken,
        AdminAlreadyElevated,
    }

    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;
    auth.require_admin().map_err(AppError::workflow)?;

    let outcome = conn
        .transaction::<CreateOutcome, WorkflowError, _>(|conn| {
            async move {
                // The designated admin must still be elevatable; installing
                // them must not demote a global admin or the admin of another
                // club. Locked so the capability cannot shift mid-create.
                if let Some(admin_id) = req.admin_user_id {
                    let user = users::table
                        .find(admin_id)
                        .for_update()
                        .first::<User>(conn)
                        .await
                        .optional()?
                        .ok_or(WorkflowError::NotFoundOrForbidden)?;
                    if !membership::should_elevate(user.capability()) {
                        return Ok(CreateOutcome::AdminAlreadyElevated);
                    }
                }

                let Some(club) = diesel::insert_into(clubs::table)
                    .values(NewClub {
                        name: req.name,
                        category: req.category,
                        description: req.description,
                        is_active: true,
                        admin_user_id: req.admin_user_id,
                    })
                    .on_conflict(clubs::name)
                    .do_nothing()
                    .get_result::<Club>(conn)
                    .await
                    .optional()?
                else {
                    return Ok(CreateOutcome::NameTaken);
                };

                registry::seed_default_roles(conn, club.id).await?;

                if let Some(admin_id) = req.admin_user_id {
                    diesel::update(users::table.find(admin_id))
                        .set((
                            users::capability.eq("club_admin"),
                            users::club_id.eq(Some(club.id)),
                        ))
                        .execute(conn)
                        .await?;
                }

                Ok(CreateOutcome::Created(club))
            }
            .scope_boxed()
        })
        .await
        .map_err(AppError::workflow)?;

    let club = match outcome {
        CreateOutcome::Created(club) => club,
        CreateOutcome::NameTaken => {
            return Err(AppError::from(
                StatusCode::CONFLICT,
                "a club with this name already exists",
            ));
        }
        CreateOutcome::AdminAlreadyElevated => {
            return Err(AppError::from(
                StatusCode::CONFLICT,
                "the designated admin already holds an elevated position",
            ));
        }
    };

    tracing::info!(club_id = club.id, "club created");
    Ok(Json(club.into()))
}

async fn list(Extension(pool): Extension<DbPool>) -> AppResult<Json<Vec<ClubResponse>>> {
    let conn = &mut pool.get().await?;

    let all = clubs::table
        .filter(clubs::is_active.eq(true))
        .order(clubs::name.asc())
        .load::<Club>(conn)
        .await?;

    Ok(Json(all.into_iter().map(ClubResponse::from).collect()))
}

pub fn app() -> Router {
    Router::new()
        .route("/", post(create))
        .route("/list", get(list))
}
