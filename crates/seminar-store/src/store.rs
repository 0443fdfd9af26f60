//! The persistence contract consumed by the service layer.
//!
//! The trait exposes atomic primitives, not domain operations: the domain
//! decides *what* to change inside a mutation closure, the store guarantees
//! the read-modify-write happens without interleaving. Creation of
//! participant records goes through [`Store::upsert_participant`], the
//! native find-and-modify-or-insert that upholds the one-record-per-
//! `(session, user)` invariant under concurrent joins — it is deliberately
//! a single operation, never composed from a read followed by a write.

use async_trait::async_trait;

use seminar_protocol::{SessionId, SessionStatus, UserId};

use crate::{ParticipantRecord, SessionRecord, StoreError};

/// Conditional mutation applied to a session record inside the store's
/// atomic section. Returning an error aborts the update and leaves the
/// record untouched.
pub type SessionMutation =
    Box<dyn FnOnce(&mut SessionRecord) -> Result<(), StoreError> + Send>;

/// Conditional mutation applied to a participant record; same abort
/// semantics as [`SessionMutation`].
pub type ParticipantMutation =
    Box<dyn FnOnce(&mut ParticipantRecord) -> Result<(), StoreError> + Send>;

/// Upsert body: receives the existing record for the pair (if any) and
/// returns the record to persist.
pub type ParticipantUpsert =
    Box<dyn FnOnce(Option<ParticipantRecord>) -> ParticipantRecord + Send>;

/// Durable store for session and participant records.
///
/// Implementations must make every method atomic with respect to the
/// records it touches. [`MemoryStore`](crate::MemoryStore) does this with
/// a single mutex; a database-backed implementation would use its native
/// conditional-update/upsert primitives.
#[async_trait]
pub trait Store: Send + Sync {
    // -- sessions ---------------------------------------------------------

    /// Inserts a new session. Fails with [`StoreError::Conflict`] if the
    /// id is already present.
    async fn insert_session(&self, session: SessionRecord) -> Result<(), StoreError>;

    /// Fetches a session by id.
    async fn session(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError>;

    /// All sessions for a course, in no particular order.
    async fn sessions_by_course(
        &self,
        course_id: &str,
    ) -> Result<Vec<SessionRecord>, StoreError>;

    /// All sessions currently in one of `statuses`, in no particular order.
    async fn sessions_by_status(
        &self,
        statuses: &[SessionStatus],
    ) -> Result<Vec<SessionRecord>, StoreError>;

    /// Atomic read-modify-write of one session. [`StoreError::NotFound`]
    /// when the id is unknown; a mutation error propagates unchanged and
    /// nothing is written.
    async fn update_session(
        &self,
        id: &SessionId,
        mutation: SessionMutation,
    ) -> Result<SessionRecord, StoreError>;

    /// Deletes a session record. [`StoreError::NotFound`] when missing.
    /// Participant records are cascaded separately via
    /// [`Store::delete_session_participants`].
    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError>;

    // -- participants -----------------------------------------------------

    /// Atomic find-and-modify-or-insert for the `(session, user)` pair.
    /// Exactly one record exists for the pair after this returns, no
    /// matter how many callers race.
    async fn upsert_participant(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        apply: ParticipantUpsert,
    ) -> Result<ParticipantRecord, StoreError>;

    /// Fetches the record for a pair.
    async fn participant(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<Option<ParticipantRecord>, StoreError>;

    /// All participant records for a session.
    async fn participants_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ParticipantRecord>, StoreError>;

    /// Atomic read-modify-write of one participant record.
    /// [`StoreError::NotFound`] when the pair has no record.
    async fn update_participant(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        mutation: ParticipantMutation,
    ) -> Result<ParticipantRecord, StoreError>;

    /// Reconciliation for backends that cannot enforce the composite key:
    /// removes surplus inactive rows for the pair, keeping the active (or
    /// sole) record. Returns the number of rows removed — 0 for stores
    /// that enforce uniqueness natively.
    async fn delete_inactive_duplicates(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<u64, StoreError>;

    /// Cascading delete of every participant record for a session.
    /// Returns the number of rows removed.
    async fn delete_session_participants(
        &self,
        session_id: &SessionId,
    ) -> Result<u64, StoreError>;
}
