use crate::{
    auth::{AuthContext, ExtractAuth},
    error::{AppError, AppResult},
    models::{Event, EventStatus},
    schema::events,
    DbPool,
};
use axum::{
    extract::Path,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventRequest {
    club_id: i32,
    name: String,
    description: Option<String>,
    starts_at: NaiveDateTime,
    max_participants: Option<i32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventResponse {
    id: i32,
    club_id: i32,
    name: String,
    description: Option<String>,
    status: String,
    enrollment_open: bool,
    max_participants: Option<i32>,
    starts_at: NaiveDateTime,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> EventResponse {
        EventResponse {
            id: event.id,
            club_id: event.club_id,
            name: event.name,
            description: event.description,
            status: event.status,
            enrollment_open: event.enrollment_open,
            max_participants: event.max_participants,
            starts_at: event.starts_at,
        }
    }
}

async fn create(
    Extension(pool): Extension<DbPool>,
    ExtractAuth(user_id): ExtractAuth,
    Json(req): Json<CreateEventRequest>,
) -> AppResult<Json<EventResponse>> {
    #[derive(Insertable)]
    #[diesel(table_name = events)]
    struct NewEvent {
        club_id: i32,
        name: String,
        description: Option<String>,
        status: String,
        enrollment_open: bool,
        max_participants: Option<i32>,
        starts_at: NaiveDateTime,
    }

    let conn = &mut pool.get().await?;
    let auth = AuthContext::load(conn, user_id)
        .await
        .map_err(AppError::workflow)?;
    if !auth.can_review(req.club_id) {
        return Err(AppError::workflow(
            crate::error::WorkflowError::Unauthorized,
        ));
    }

    let event = diesel::insert_into(events::table)
        .values(NewEvent {
            club_id: req.club_id,
            name: req.name,
            description: req.description,
            status: EventStatus::Upcoming.as_str().to_string(),
            enrollment_open: true,
            max_participants: req.max_participants,
            starts_at: req.starts_at,
        })
        .get_result::<Event>(conn)
        .await?;

    tracing::info!(event_id = event.id, club_id = event.club_id, "event created");
    Ok(Json(event.into()))
}

async fn list(
    Extension(pool): Extension<DbPool>,
    Path(club_id): Path<i32>,
) -> AppResult<Json<Vec<EventResponse>>> {
    let conn = &mut pool.get().await?;

    let all = events::table
        .filter(events::club_id.eq(club_id))
        .order(events::starts_at.asc())
        .load::<Event>(conn)
        .await?;

    Ok(Json(all.into_iter().map(EventResponse::from).collect()))
}

pub fn app() -> Router {
    Router::new()
        .route("/", post(create))
        .route("/:club_id/list", get(list))
}
