//! Durable record types for sessions and participants.
//!
//! These are the only shapes that cross the persistence boundary. All
//! domain logic that mutates them lives in the service layer and runs
//! inside the store's atomic update/upsert primitives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use seminar_protocol::{CloseReason, Role, SessionId, SessionStatus, SessionType, UserId};

// ---------------------------------------------------------------------------
// SessionRecord
// ---------------------------------------------------------------------------

/// A scheduled, time-boxed discussion for a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Immutable key.
    pub id: SessionId,
    pub course_id: String,
    pub subject: String,
    pub description: String,
    pub session_type: SessionType,

    /// Who scheduled the session. `creator_role` is the role they held at
    /// creation time, which is what instructor-ownership checks compare
    /// against later.
    pub creator_id: UserId,
    pub creator_role: Role,

    /// Scheduled bounds; `end_time > start_time` is validated at creation.
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    pub status: SessionStatus,

    /// First user to join while the session was upcoming. Set at most
    /// once, first writer wins; drives the upcoming → active transition.
    pub initiator_user_id: Option<UserId>,
    pub initiated_at: Option<DateTime<Utc>>,

    /// Closure stamp, populated exactly once. `closed_by`/`closed_by_role`
    /// stay `None` for time-based expiry.
    pub closed_by: Option<UserId>,
    pub closed_by_role: Option<Role>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,

    /// Denormalized active-participant count. Advisory only — recomputed
    /// from participant records on every membership change.
    pub participant_count: u32,

    /// Soft capacity hint; joins beyond it are admitted and logged.
    pub max_participants: u32,
}

impl SessionRecord {
    /// `true` once the scheduled end has passed.
    pub fn is_past_end(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    /// `true` while `now` is inside the scheduled window.
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time && now < self.end_time
    }
}

// ---------------------------------------------------------------------------
// ParticipantRecord
// ---------------------------------------------------------------------------

/// Per-user presence record within one session.
///
/// Composite key `(session_id, user_id)`: at most one record may exist
/// per pair. The store's upsert primitive is what guarantees this under
/// concurrent joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// Derived key, stable across rejoin cycles.
    pub id: String,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub user_name: String,
    /// The participant's own role in the session, independent of the
    /// session creator's role.
    pub role: Role,

    /// `true` while a live connection is attached.
    pub active: bool,

    /// Start of the current (or last) presence interval.
    pub join_time: DateTime<Utc>,
    /// End of the last closed interval; `None` while active.
    pub last_leave_time: Option<DateTime<Utc>>,

    /// Sum of all closed `(leave − join)` intervals across rejoin cycles.
    /// Folded exactly once, when an interval closes.
    pub total_duration_ms: i64,

    /// Media flags, cleared whenever the interval closes.
    pub audio_enabled: bool,
    pub video_enabled: bool,

    /// Number of rejoins (not counting the first join).
    pub disconnect_count: u32,
}

impl ParticipantRecord {
    /// Derives the stable record id for a `(session, user)` pair.
    pub fn derive_id(session_id: &SessionId, user_id: &UserId) -> String {
        format!("{session_id}:{user_id}")
    }

    /// Creates a fresh active record for a first-time join.
    pub fn new_joined(
        session_id: SessionId,
        user_id: UserId,
        role: Role,
        user_name: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::derive_id(&session_id, &user_id),
            session_id,
            user_id,
            user_name,
            role,
            active: true,
            join_time: now,
            last_leave_time: None,
            total_duration_ms: 0,
            audio_enabled: false,
            video_enabled: false,
            disconnect_count: 0,
        }
    }

    /// Closes the open presence interval: folds `now − join_time` into the
    /// running total, marks the record inactive, and clears media flags.
    ///
    /// Callers must only invoke this on an active record — folding twice
    /// would double-count the interval.
    pub fn close_interval(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.join_time).num_milliseconds().max(0);
        self.total_duration_ms += elapsed;
        self.active = false;
        self.last_leave_time = Some(now);
        self.audio_enabled = false;
        self.video_enabled = false;
    }

    /// Re-opens the record for a returning participant. The prior interval
    /// was already folded when it closed, so this only resets the bracket.
    pub fn reopen(&mut self, user_name: String, role: Role, now: DateTime<Utc>) {
        self.active = true;
        self.join_time = now;
        self.last_leave_time = None;
        self.user_name = user_name;
        self.role = role;
        self.disconnect_count += 1;
    }

    /// Total presence including the currently open interval, if any.
    pub fn effective_duration_ms(&self, now: DateTime<Utc>) -> i64 {
        if self.active {
            self.total_duration_ms + (now - self.join_time).num_milliseconds().max(0)
        } else {
            self.total_duration_ms
        }
    }
}
