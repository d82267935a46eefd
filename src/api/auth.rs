use crate::{
    auth,
    error::{AppError, AppResult},
    models::User,
    schema::users,
    DbPool,
};
use axum::{http::StatusCode, routing::post, Extension, Json, Router};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub student_no: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizedResponse {
    pub token: String,
}

impl AuthorizedResponse {
    fn from_user(user: &User) -> anyhow::Result<AuthorizedResponse> {
        Ok(AuthorizedResponse {
            // expires after one day
            token: auth::generate_jwt(user.id, Duration::from_secs(24 * 60 * 60))?,
        })
    }
}

async fn register(
    Extension(pool): Extension<DbPool>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<AuthorizedResponse>> {
    #[derive(Insertable)]
    #[diesel(table_name = users)]
    struct NewUser {
        name: String,
        email: String,
        password_hash: String,
        capability: String,
        student_no: Option<String>,
    }

    let conn = &mut pool.get().await?;

    let new_user = diesel::insert_into(users::table)
        .values(NewUser {
            name: req.name,
            email: req.email,
            password_hash: auth::hash_password(req.password)?,
            capability: "student".to_string(),
            student_no: req.student_no,
        })
        .on_conflict(users::email)
        .do_nothing()
        .get_result::<User>(conn)
        .await
        .optional()?;

    let Some(new_user) = new_user else {
        return Err(AppError::from(
            StatusCode::CONFLICT,
            "email is already registered",
        ));
    };

    Ok(Json(AuthorizedResponse::from_user(&new_user)?))
}

async fn login(
    Extension(pool): Extension<DbPool>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthorizedResponse>> {
    let conn = &mut pool.get().await?;

    if let Some(user) = users::table
        .filter(users::email.eq(req.email))
        .first::<User>(conn)
        .await
        .optional()?
    {
        if auth::verify_password(req.password, &user.password_hash)? {
            return Ok(Json(AuthorizedResponse::from_user(&user)?));
        }
    }
    Err(AppError::from(
        StatusCode::UNAUTHORIZED,
        "invalid email or password",
    ))
}

pub fn app() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}
