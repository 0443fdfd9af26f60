//! Session lifecycle service: creation, queries, the status state
//! machine, and closure authorization.
//!
//! Status is monotonic — `upcoming → active → closed`, or `upcoming →
//! closed` directly — and `closed` is terminal. Time-driven transitions
//! are a pure function of the wall clock; every public operation that
//! depends on "now" has an `*_at(now)` variant so tests are deterministic.
//!
//! All writes go through the store's conditional-update primitive: the
//! transition is re-validated inside the mutation closure, so two racing
//! callers cannot both win (the loser gets a typed `Conflict`).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use seminar_protocol::{CloseReason, Role, SessionId, SessionStatus, SessionType, UserId};
use seminar_store::{SessionRecord, Store};

use crate::error::map_store;
use crate::{Identity, ServiceError};

/// Soft capacity default applied when a draft doesn't specify one.
pub const DEFAULT_MAX_PARTICIPANTS: u32 = 50;

/// Input for [`SessionLifecycle::create_session`].
#[derive(Debug, Clone, Deserialize)]
pub struct SessionDraft {
    pub course_id: String,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    pub session_type: SessionType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_participants: Option<u32>,
}

/// Outcome of a time-based status check.
#[derive(Debug, Clone)]
pub enum StatusCheck {
    /// The wall clock demanded no transition.
    Unchanged(SessionRecord),
    /// A transition was applied; `from` is the prior status.
    Transitioned {
        session: SessionRecord,
        from: SessionStatus,
    },
}

impl StatusCheck {
    pub fn session(&self) -> &SessionRecord {
        match self {
            Self::Unchanged(s) => s,
            Self::Transitioned { session, .. } => session,
        }
    }

    /// `true` when this check is what closed the session.
    pub fn closed_now(&self) -> bool {
        matches!(
            self,
            Self::Transitioned { session, .. } if session.status.is_closed()
        )
    }

    pub fn transitioned(&self) -> bool {
        matches!(self, Self::Transitioned { .. })
    }
}

/// Creates sessions and drives their status over time.
#[derive(Clone)]
pub struct SessionLifecycle {
    store: Arc<dyn Store>,
}

impl SessionLifecycle {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    // -- creation & queries ----------------------------------------------

    /// Validates and persists a new upcoming session.
    ///
    /// # Errors
    /// - `Validation` — empty course/subject or `end_time <= start_time`
    /// - `Authorization` — creator is not instructor/admin/superadmin
    pub async fn create_session(
        &self,
        draft: SessionDraft,
        creator: &Identity,
    ) -> Result<SessionRecord, ServiceError> {
        if draft.course_id.trim().is_empty() {
            return Err(ServiceError::validation("course_id is required"));
        }
        if draft.subject.trim().is_empty() {
            return Err(ServiceError::validation("subject is required"));
        }
        if draft.end_time <= draft.start_time {
            return Err(ServiceError::validation(
                "end_time must be after start_time",
            ));
        }
        if !creator.role.can_moderate() {
            return Err(ServiceError::authorization(
                "only instructors and admins can create sessions",
            ));
        }

        let session = SessionRecord {
            id: SessionId::new(),
            course_id: draft.course_id,
            subject: draft.subject,
            description: draft.description,
            session_type: draft.session_type,
            creator_id: creator.user_id.clone(),
            creator_role: creator.role,
            start_time: draft.start_time,
            end_time: draft.end_time,
            status: SessionStatus::Upcoming,
            initiator_user_id: None,
            initiated_at: None,
            closed_by: None,
            closed_by_role: None,
            closed_at: None,
            close_reason: None,
            participant_count: 0,
            max_participants: draft.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS),
        };

        self.store
            .insert_session(session.clone())
            .await
            .map_err(map_store("session"))?;

        tracing::info!(
            session_id = %session.id,
            course_id = %session.course_id,
            creator = %session.creator_id,
            "session created"
        );
        Ok(session)
    }

    /// Fetches one session.
    pub async fn session(&self, id: &SessionId) -> Result<SessionRecord, ServiceError> {
        self.store
            .session(id)
            .await
            .map_err(map_store("session"))?
            .ok_or_else(|| ServiceError::not_found("session"))
    }

    /// Sessions for a course. Without an explicit status the listing
    /// covers active and upcoming sessions, newest start first.
    pub async fn sessions_by_course(
        &self,
        course_id: &str,
        status: Option<SessionStatus>,
    ) -> Result<Vec<SessionRecord>, ServiceError> {
        let mut sessions = self
            .store
            .sessions_by_course(course_id)
            .await
            .map_err(map_store("session"))?;

        sessions.retain(|s| match status {
            Some(wanted) => s.status == wanted,
            None => matches!(s.status, SessionStatus::Active | SessionStatus::Upcoming),
        });
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    /// Upcoming sessions for a course that have not started yet, soonest
    /// first.
    pub async fn upcoming_sessions_by_course(
        &self,
        course_id: &str,
    ) -> Result<Vec<SessionRecord>, ServiceError> {
        self.upcoming_sessions_by_course_at(course_id, Utc::now()).await
    }

    pub async fn upcoming_sessions_by_course_at(
        &self,
        course_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, ServiceError> {
        let mut sessions = self
            .store
            .sessions_by_course(course_id)
            .await
            .map_err(map_store("session"))?;

        sessions.retain(|s| s.status == SessionStatus::Upcoming && s.start_time > now);
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(sessions)
    }

    /// Every session currently active, platform-wide.
    pub async fn active_sessions(&self) -> Result<Vec<SessionRecord>, ServiceError> {
        let mut sessions = self
            .store
            .sessions_by_status(&[SessionStatus::Active])
            .await
            .map_err(map_store("session"))?;
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    /// Every session that is not yet closed (sweep input).
    pub async fn open_sessions(&self) -> Result<Vec<SessionRecord>, ServiceError> {
        self.store
            .sessions_by_status(&[SessionStatus::Upcoming, SessionStatus::Active])
            .await
            .map_err(map_store("session"))
    }

    // -- state machine ----------------------------------------------------

    /// Claims the initiator slot and activates an upcoming session.
    ///
    /// First writer wins: exactly one caller per session succeeds; the
    /// rest get `Conflict` and the stored initiator is untouched. Callers
    /// racing on join treat that conflict as a lost-but-harmless race.
    pub async fn initiate_session(
        &self,
        id: &SessionId,
        user_id: &UserId,
    ) -> Result<SessionRecord, ServiceError> {
        self.initiate_session_at(id, user_id, Utc::now()).await
    }

    pub async fn initiate_session_at(
        &self,
        id: &SessionId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord, ServiceError> {
        let initiator = user_id.clone();
        let session = self
            .store
            .update_session(
                id,
                Box::new(move |record| {
                    if record.initiator_user_id.is_some() {
                        return Err(seminar_store::StoreError::Conflict(
                            "session already initiated".into(),
                        ));
                    }
                    if record.status != SessionStatus::Upcoming {
                        return Err(seminar_store::StoreError::Conflict(format!(
                            "session is {}, not upcoming",
                            record.status
                        )));
                    }
                    record.initiator_user_id = Some(initiator);
                    record.initiated_at = Some(now);
                    record.status = SessionStatus::Active;
                    Ok(())
                }),
            )
            .await
            .map_err(map_store("session"))?;

        tracing::info!(
            session_id = %session.id,
            initiator = %user_id,
            "session initiated"
        );
        Ok(session)
    }

    /// Re-evaluates a session's status against the wall clock:
    /// `upcoming → active` inside the scheduled window, anything open →
    /// `closed(time_expired)` once the end time has passed.
    pub async fn check_and_update_status(
        &self,
        id: &SessionId,
    ) -> Result<StatusCheck, ServiceError> {
        self.check_and_update_status_at(id, Utc::now()).await
    }

    pub async fn check_and_update_status_at(
        &self,
        id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<StatusCheck, ServiceError> {
        let session = self.session(id).await?;
        let from = session.status;

        if time_derived_status(&session, now).is_none() {
            return Ok(StatusCheck::Unchanged(session));
        }

        // Re-derive inside the closure: a concurrent close or initiate may
        // have landed since the read above.
        let updated = self
            .store
            .update_session(
                id,
                Box::new(move |record| {
                    if let Some(next) = time_derived_status(record, now) {
                        record.status = next;
                        if next == SessionStatus::Closed && record.close_reason.is_none() {
                            record.closed_at = Some(now);
                            record.close_reason = Some(CloseReason::TimeExpired);
                        }
                    }
                    Ok(())
                }),
            )
            .await
            .map_err(map_store("session"))?;

        if updated.status == from {
            return Ok(StatusCheck::Unchanged(updated));
        }

        tracing::info!(
            session_id = %updated.id,
            from = %from,
            to = %updated.status,
            "session status updated by time check"
        );
        Ok(StatusCheck::Transitioned {
            session: updated,
            from,
        })
    }

    /// Shared moderation gate: instructors may act only on sessions they
    /// created; admins and superadmins on any session.
    pub fn authorize_moderation(
        &self,
        session: &SessionRecord,
        user_id: &UserId,
        role: Role,
    ) -> Result<(), ServiceError> {
        if !role.can_moderate() {
            return Err(ServiceError::authorization(
                "students cannot moderate sessions",
            ));
        }
        if role == Role::Instructor && session.creator_id != *user_id {
            return Err(ServiceError::authorization(
                "instructors can only moderate sessions they created",
            ));
        }
        Ok(())
    }

    /// Closes a session on behalf of a moderator.
    ///
    /// # Errors
    /// - `Authorization` — caller fails [`Self::authorize_moderation`]
    /// - `NotFound` — unknown session
    /// - `Conflict` — the session is already closed
    pub async fn close_session_manually(
        &self,
        id: &SessionId,
        user_id: &UserId,
        role: Role,
    ) -> Result<SessionRecord, ServiceError> {
        self.close_session_manually_at(id, user_id, role, Utc::now()).await
    }

    pub async fn close_session_manually_at(
        &self,
        id: &SessionId,
        user_id: &UserId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<SessionRecord, ServiceError> {
        let session = self.session(id).await?;
        self.authorize_moderation(&session, user_id, role)?;

        let closer = user_id.clone();
        let session = self
            .store
            .update_session(
                id,
                Box::new(move |record| {
                    if record.status.is_closed() {
                        return Err(seminar_store::StoreError::Conflict(
                            "session already closed".into(),
                        ));
                    }
                    record.status = SessionStatus::Closed;
                    record.closed_by = Some(closer);
                    record.closed_by_role = Some(role);
                    record.closed_at = Some(now);
                    record.close_reason = Some(CloseReason::ManualClosure);
                    Ok(())
                }),
            )
            .await
            .map_err(map_store("session"))?;

        tracing::info!(
            session_id = %session.id,
            closed_by = %user_id,
            %role,
            "session closed manually"
        );
        Ok(session)
    }

    /// Unconditional write of the denormalized active-participant count.
    pub async fn update_participant_count(
        &self,
        id: &SessionId,
        count: u32,
    ) -> Result<SessionRecord, ServiceError> {
        let session = self
            .store
            .update_session(
                id,
                Box::new(move |record| {
                    record.participant_count = count;
                    Ok(())
                }),
            )
            .await
            .map_err(map_store("session"))?;

        if count > session.max_participants {
            tracing::warn!(
                session_id = %session.id,
                count,
                max = session.max_participants,
                "session is over its soft participant cap"
            );
        }
        Ok(session)
    }

    /// Deletes the session record. The caller cascades participant
    /// deletion through the registry.
    pub async fn delete_session(&self, id: &SessionId) -> Result<(), ServiceError> {
        self.store
            .delete_session(id)
            .await
            .map_err(map_store("session"))?;
        tracing::info!(session_id = %id, "session deleted");
        Ok(())
    }
}

/// The status the wall clock demands, or `None` when no transition is due.
/// Closed is terminal and never yields a transition.
fn time_derived_status(session: &SessionRecord, now: DateTime<Utc>) -> Option<SessionStatus> {
    match session.status {
        SessionStatus::Upcoming if session.is_past_end(now) => Some(SessionStatus::Closed),
        SessionStatus::Upcoming if session.is_within_window(now) => Some(SessionStatus::Active),
        SessionStatus::Active if session.is_past_end(now) => Some(SessionStatus::Closed),
        _ => None,
    }
}

// =========================================================================
// Tests
// =========================================================================
