//! In-memory reference implementation of [`Store`].
//!
//! One async mutex guards all records, which makes every trait method
//! atomic by construction — the same guarantee a document store's
//! conditional-upsert primitive provides. Suitable for a single-instance
//! deployment and for tests; swapping in a database-backed store is a
//! matter of implementing the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use seminar_protocol::{SessionId, SessionStatus, UserId};

use crate::{
    ParticipantMutation, ParticipantRecord, ParticipantUpsert, SessionMutation,
    SessionRecord, Store, StoreError,
};

#[derive(Default)]
struct Tables {
    sessions: HashMap<SessionId, SessionRecord>,
    /// Keyed by the composite pair — the map itself enforces the
    /// at-most-one-record-per-pair invariant.
    participants: HashMap<(SessionId, UserId), ParticipantRecord>,
}

/// Process-local [`Store`] holding everything behind one mutex.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_session(&self, session: SessionRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict(format!(
                "session {} already exists",
                session.id
            )));
        }
        tables.sessions.insert(session.id, session);
        Ok(())
    }

    async fn session(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.tables.lock().await.sessions.get(id).cloned())
    }

    async fn sessions_by_course(
        &self,
        course_id: &str,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .values()
            .filter(|s| s.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn sessions_by_status(
        &self,
        statuses: &[SessionStatus],
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .values()
            .filter(|s| statuses.contains(&s.status))
            .cloned()
            .collect())
    }

    async fn update_session(
        &self,
        id: &SessionId,
        mutation: SessionMutation,
    ) -> Result<SessionRecord, StoreError> {
        let mut tables = self.tables.lock().await;
        let record = tables.sessions.get(id).ok_or(StoreError::NotFound)?;

        // Mutate a copy so a rejected mutation leaves the stored record
        // untouched.
        let mut updated = record.clone();
        mutation(&mut updated)?;
        tables.sessions.insert(*id, updated.clone());
        Ok(updated)
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables
            .sessions
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn upsert_participant(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        apply: ParticipantUpsert,
    ) -> Result<ParticipantRecord, StoreError> {
        let mut tables = self.tables.lock().await;
        let key = (*session_id, user_id.clone());
        let existing = tables.participants.get(&key).cloned();
        let record = apply(existing);
        tables.participants.insert(key, record.clone());
        Ok(record)
    }

    async fn participant(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<Option<ParticipantRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .participants
            .get(&(*session_id, user_id.clone()))
            .cloned())
    }

    async fn participants_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ParticipantRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .participants
            .values()
            .filter(|p| p.session_id == *session_id)
            .cloned()
            .collect())
    }

    async fn update_participant(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        mutation: ParticipantMutation,
    ) -> Result<ParticipantRecord, StoreError> {
        let mut tables = self.tables.lock().await;
        let key = (*session_id, user_id.clone());
        let record = tables.participants.get(&key).ok_or(StoreError::NotFound)?;

        let mut updated = record.clone();
        mutation(&mut updated)?;
        tables.participants.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete_inactive_duplicates(
        &self,
        _session_id: &SessionId,
        _user_id: &UserId,
    ) -> Result<u64, StoreError> {
        // The composite-key map cannot hold duplicates, so there is never
        // anything to reconcile here.
        Ok(0)
    }

    async fn delete_session_participants(
        &self,
        session_id: &SessionId,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.participants.len();
        tables.participants.retain(|(sid, _), _| sid != session_id);
        Ok((before - tables.participants.len()) as u64)
    }
}

// =========================================================================
// Tests
// =========================================================================
