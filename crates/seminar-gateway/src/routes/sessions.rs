//! Session endpoints: creation, queries, and lifecycle transitions.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use seminar_protocol::{SessionId, SessionStatus};
use seminar_session::SessionDraft;
use seminar_store::SessionRecord;

use crate::extract::Caller;
use crate::response::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<SessionStatus>,
}

#[derive(Debug, Serialize)]
pub struct StatusCheckResponse {
    pub transitioned: bool,
    pub session: SessionRecord,
}

/// POST /sessions — schedule a new session (instructor and up).
pub async fn create(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(draft): Json<SessionDraft>,
) -> Result<(StatusCode, Json<SessionRecord>), ApiError> {
    let session = state.lifecycle.create_session(draft, &caller).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /courses/:course_id/sessions — defaults to active + upcoming.
pub async fn by_course(
    State(state): State<AppState>,
    Caller(_caller): Caller,
    Path(course_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SessionRecord>>, ApiError> {
    let sessions = state
        .lifecycle
        .sessions_by_course(&course_id, query.status)
        .await?;
    Ok(Json(sessions))
}

/// GET /courses/:course_id/sessions/upcoming — not yet started, soonest
/// first.
pub async fn upcoming_by_course(
    State(state): State<AppState>,
    Caller(_caller): Caller,
    Path(course_id): Path<String>,
) -> Result<Json<Vec<SessionRecord>>, ApiError> {
    let sessions = state.lifecycle.upcoming_sessions_by_course(&course_id).await?;
    Ok(Json(sessions))
}

/// GET /sessions/active — platform-wide active sessions.
pub async fn active(
    State(state): State<AppState>,
    Caller(_caller): Caller,
) -> Result<Json<Vec<SessionRecord>>, ApiError> {
    Ok(Json(state.lifecycle.active_sessions().await?))
}

/// GET /sessions/:id
pub async fn get(
    State(state): State<AppState>,
    Caller(_caller): Caller,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionRecord>, ApiError> {
    Ok(Json(state.lifecycle.session(&id).await?))
}

/// POST /sessions/:id/initiate — claim the initiator slot. Exactly one
/// caller per session wins; the rest see 409.
pub async fn initiate(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionRecord>, ApiError> {
    let session = state.lifecycle.initiate_session(&id, &caller.user_id).await?;
    Ok(Json(session))
}

/// POST /sessions/:id/close — manual closure, with the live room torn
/// down and every member force-disconnected.
pub async fn close(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionRecord>, ApiError> {
    let session = state
        .coordinator
        .close_session(id, &caller.user_id, caller.role)
        .await?;
    Ok(Json(session))
}

/// POST /sessions/:id/status-check — re-evaluate the time-based status;
/// a transition to closed runs the same teardown as a manual close.
pub async fn status_check(
    State(state): State<AppState>,
    Caller(_caller): Caller,
    Path(id): Path<SessionId>,
) -> Result<Json<StatusCheckResponse>, ApiError> {
    let check = state.coordinator.check_status(id).await?;
    Ok(Json(StatusCheckResponse {
        transitioned: check.transitioned(),
        session: check.session().clone(),
    }))
}

/// DELETE /sessions/:id — admin and up; cascades participant records and
/// disconnects the room.
pub async fn remove(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<SessionId>,
) -> Result<StatusCode, ApiError> {
    state
        .coordinator
        .delete_session(id, &caller.user_id, caller.role)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
