//! Route table.

pub mod health;
pub mod participants;
pub mod sessions;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the gateway router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/sessions", post(sessions::create))
        .route("/sessions/active", get(sessions::active))
        .route("/sessions/:id", get(sessions::get).delete(sessions::remove))
        .route("/sessions/:id/initiate", post(sessions::initiate))
        .route("/sessions/:id/close", post(sessions::close))
        .route("/sessions/:id/status-check", post(sessions::status_check))
        .route(
            "/sessions/:id/participants",
            post(participants::register).get(participants::list_all),
        )
        .route(
            "/sessions/:id/participants/active",
            get(participants::list_active),
        )
        .route("/sessions/:id/stats", get(participants::stats))
        .route(
            "/sessions/:id/participants/:user_id/leave",
            post(participants::leave),
        )
        .route(
            "/sessions/:id/participants/:user_id/media",
            put(participants::update_media),
        )
        .route("/courses/:course_id/sessions", get(sessions::by_course))
        .route(
            "/courses/:course_id/sessions/upcoming",
            get(sessions::upcoming_by_course),
        )
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
