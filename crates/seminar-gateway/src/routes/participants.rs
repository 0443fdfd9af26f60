//! Participant endpoints: registration, presence projections, and media
//! flags.
//!
//! Registration here is the REST pre-registration path: it runs the same
//! atomic upsert the live join does, so whichever path executes first
//! creates the record and the other one finds it.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use seminar_protocol::{SessionId, UserId};
use seminar_session::{Identity, ServiceError, SessionStats};
use seminar_store::ParticipantRecord;

use crate::extract::Caller;
use crate::response::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MediaUpdate {
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

/// POST /sessions/:id/participants — register or rejoin the caller.
pub async fn register(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<SessionId>,
) -> Result<(StatusCode, Json<ParticipantRecord>), ApiError> {
    let session = state.lifecycle.session(&id).await?;
    if session.status.is_closed() {
        return Err(ServiceError::conflict("session is closed").into());
    }

    let participant = state
        .registry
        .add_or_rejoin(&id, &caller.user_id, caller.role, &caller.name)
        .await?;

    state.coordinator.refresh_participant_count(&id).await?;
    state.coordinator.broadcast_participant_list(&id).await?;

    Ok((StatusCode::CREATED, Json(participant)))
}

/// POST /sessions/:id/participants/:user_id/leave — explicit leave for
/// oneself, or for anyone when the caller may moderate the session.
pub async fn leave(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((id, user_id)): Path<(SessionId, UserId)>,
) -> Result<StatusCode, ApiError> {
    authorize_self_or_moderator(&state, &id, &user_id, &caller).await?;
    // The registry call surfaces not-found/already-inactive to the caller;
    // the coordinator pass after it only detaches any live connection and
    // refreshes the room (its own registry removal finds the interval
    // already closed and moves on).
    state.registry.remove_participant(&id, &user_id).await?;
    state.coordinator.leave(id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /sessions/:id/participants — every record, active or not.
pub async fn list_all(
    State(state): State<AppState>,
    Caller(_caller): Caller,
    Path(id): Path<SessionId>,
) -> Result<Json<Vec<ParticipantRecord>>, ApiError> {
    state.lifecycle.session(&id).await?;
    Ok(Json(state.registry.all_participants(&id).await?))
}

/// GET /sessions/:id/participants/active
pub async fn list_active(
    State(state): State<AppState>,
    Caller(_caller): Caller,
    Path(id): Path<SessionId>,
) -> Result<Json<Vec<ParticipantRecord>>, ApiError> {
    state.lifecycle.session(&id).await?;
    Ok(Json(state.registry.active_participants(&id).await?))
}

/// GET /sessions/:id/stats
pub async fn stats(
    State(state): State<AppState>,
    Caller(_caller): Caller,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionStats>, ApiError> {
    state.lifecycle.session(&id).await?;
    Ok(Json(state.registry.session_stats(&id).await?))
}

/// PUT /sessions/:id/participants/:user_id/media — audio/video flags,
/// for oneself or by a moderator.
pub async fn update_media(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path((id, user_id)): Path<(SessionId, UserId)>,
    Json(update): Json<MediaUpdate>,
) -> Result<Json<ParticipantRecord>, ApiError> {
    authorize_self_or_moderator(&state, &id, &user_id, &caller).await?;
    let participant = state
        .registry
        .update_media_status(&id, &user_id, update.audio_enabled, update.video_enabled)
        .await?;
    state.coordinator.broadcast_participant_list(&id).await?;
    Ok(Json(participant))
}

/// Callers may always act on their own record; acting on someone else's
/// requires moderation rights on the session.
async fn authorize_self_or_moderator(
    state: &AppState,
    session_id: &SessionId,
    target: &UserId,
    caller: &Identity,
) -> Result<(), ApiError> {
    if caller.user_id == *target {
        return Ok(());
    }
    let session = state.lifecycle.session(session_id).await?;
    state
        .lifecycle
        .authorize_moderation(&session, &caller.user_id, caller.role)?;
    Ok(())
}
