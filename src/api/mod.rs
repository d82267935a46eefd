use axum::Router;

pub mod auth;
pub mod clubs;
pub mod events;
pub mod membership;
pub mod participation;
pub mod roles;

pub fn app() -> Router {
    Router::new()
        .nest("/auth", auth::app())
        .nest("/clubs", clubs::app())
        .nest("/roles", roles::app())
        .nest("/membership", membership::app())
        .nest("/events", events::app())
        .nest("/participation", participation::app())
}
