//! Participant registry: the authoritative presence bookkeeping for a
//! session.
//!
//! Creation goes through the store's single find-and-modify-or-insert, so
//! N racing joins for the same `(session, user)` pair leave exactly one
//! record and never error. Interval accounting folds exactly once, when an
//! interval closes (leave, disconnect, or bulk cleanup) — rejoin only
//! re-opens the bracket.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use seminar_protocol::{Role, SessionId, UserId};
use seminar_store::{ParticipantRecord, Store, StoreError};

use crate::error::map_store;
use crate::ServiceError;

/// Aggregate presence figures for one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub active_count: u32,
    pub total_count: u32,
    /// Mean effective duration across all records; a currently open
    /// interval counts toward its record.
    pub average_duration_ms: i64,
    pub participants: Vec<ParticipantRecord>,
}

/// Idempotent create/update/remove of per-session presence records.
#[derive(Clone)]
pub struct ParticipantRegistry {
    store: Arc<dyn Store>,
}

impl ParticipantRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    // -- join / rejoin ----------------------------------------------------

    /// Atomic upsert for a joining user.
    ///
    /// - active record → returned unchanged (success, not a conflict)
    /// - inactive record → re-opened: `active = true`, fresh `join_time`,
    ///   `last_leave_time` cleared, `disconnect_count` incremented
    /// - no record → created fresh
    pub async fn add_or_rejoin(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        role: Role,
        user_name: &str,
    ) -> Result<ParticipantRecord, ServiceError> {
        self.add_or_rejoin_at(session_id, user_id, role, user_name, Utc::now())
            .await
    }

    pub async fn add_or_rejoin_at(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        role: Role,
        user_name: &str,
        now: DateTime<Utc>,
    ) -> Result<ParticipantRecord, ServiceError> {
        let sid = *session_id;
        let uid = user_id.clone();
        let name = user_name.to_string();

        let record = self
            .store
            .upsert_participant(
                session_id,
                user_id,
                Box::new(move |existing| match existing {
                    Some(p) if p.active => p,
                    Some(mut p) => {
                        p.reopen(name, role, now);
                        p
                    }
                    None => ParticipantRecord::new_joined(sid, uid, role, name, now),
                }),
            )
            .await
            .map_err(map_store("participant"))?;

        tracing::debug!(
            session_id = %session_id,
            user_id = %user_id,
            rejoins = record.disconnect_count,
            "participant upserted"
        );
        Ok(record)
    }

    // -- leave ------------------------------------------------------------

    /// Closes the participant's presence interval.
    ///
    /// # Errors
    /// - `NotFound` — no record for the pair
    /// - `Conflict` — already inactive; totals are not touched
    pub async fn remove_participant(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<ParticipantRecord, ServiceError> {
        self.remove_participant_at(session_id, user_id, Utc::now()).await
    }

    pub async fn remove_participant_at(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<ParticipantRecord, ServiceError> {
        let record = self
            .store
            .update_participant(
                session_id,
                user_id,
                Box::new(move |p| {
                    if !p.active {
                        return Err(StoreError::Conflict(
                            "participant already inactive".into(),
                        ));
                    }
                    p.close_interval(now);
                    Ok(())
                }),
            )
            .await
            .map_err(map_store("participant"))?;

        tracing::debug!(
            session_id = %session_id,
            user_id = %user_id,
            total_ms = record.total_duration_ms,
            "participant left"
        );
        Ok(record)
    }

    // -- projections ------------------------------------------------------

    /// Participants with a live connection attached, ordered by join time.
    pub async fn active_participants(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ParticipantRecord>, ServiceError> {
        let mut participants = self.all_participants(session_id).await?;
        participants.retain(|p| p.active);
        Ok(participants)
    }

    /// Every record for the session, active or not, ordered by join time.
    pub async fn all_participants(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ParticipantRecord>, ServiceError> {
        let mut participants = self
            .store
            .participants_by_session(session_id)
            .await
            .map_err(map_store("participant"))?;
        participants.sort_by(|a, b| a.join_time.cmp(&b.join_time));
        Ok(participants)
    }

    pub async fn active_participant_count(
        &self,
        session_id: &SessionId,
    ) -> Result<u32, ServiceError> {
        Ok(self.active_participants(session_id).await?.len() as u32)
    }

    /// Whether the user has any record in the session, regardless of
    /// `active`.
    pub async fn is_user_in_session(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .store
            .participant(session_id, user_id)
            .await
            .map_err(map_store("participant"))?
            .is_some())
    }

    pub async fn session_stats(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionStats, ServiceError> {
        self.session_stats_at(session_id, Utc::now()).await
    }

    pub async fn session_stats_at(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<SessionStats, ServiceError> {
        let participants = self.all_participants(session_id).await?;
        let total_count = participants.len() as u32;
        let active_count = participants.iter().filter(|p| p.active).count() as u32;
        let average_duration_ms = if participants.is_empty() {
            0
        } else {
            let sum: i64 = participants
                .iter()
                .map(|p| p.effective_duration_ms(now))
                .sum();
            sum / participants.len() as i64
        };

        Ok(SessionStats {
            active_count,
            total_count,
            average_duration_ms,
            participants,
        })
    }

    // -- media ------------------------------------------------------------

    /// Updates the audio/video flags.
    ///
    /// # Errors
    /// `NotFound` when the pair has no record.
    pub async fn update_media_status(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        audio_enabled: bool,
        video_enabled: bool,
    ) -> Result<ParticipantRecord, ServiceError> {
        self.store
            .update_participant(
                session_id,
                user_id,
                Box::new(move |p| {
                    p.audio_enabled = audio_enabled;
                    p.video_enabled = video_enabled;
                    Ok(())
                }),
            )
            .await
            .map_err(map_store("participant"))
    }

    // -- cleanup ----------------------------------------------------------

    /// Folds and inactivates every active record in the session (used on
    /// closure). Per-record races are tolerated: a record that went
    /// inactive meanwhile is skipped with a debug log. Returns how many
    /// records this call inactivated.
    pub async fn cleanup_session_participants(
        &self,
        session_id: &SessionId,
    ) -> Result<u32, ServiceError> {
        self.cleanup_session_participants_at(session_id, Utc::now()).await
    }

    pub async fn cleanup_session_participants_at(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<u32, ServiceError> {
        let active = self.active_participants(session_id).await?;
        let mut cleaned = 0;

        for participant in active {
            let result = self
                .store
                .update_participant(
                    session_id,
                    &participant.user_id,
                    Box::new(move |p| {
                        if !p.active {
                            return Err(StoreError::Conflict("already inactive".into()));
                        }
                        p.close_interval(now);
                        Ok(())
                    }),
                )
                .await;

            match result {
                Ok(_) => cleaned += 1,
                Err(e) => tracing::debug!(
                    session_id = %session_id,
                    user_id = %participant.user_id,
                    error = %e,
                    "participant vanished during bulk cleanup, skipping"
                ),
            }
        }

        if cleaned > 0 {
            tracing::info!(session_id = %session_id, cleaned, "bulk-inactivated participants");
        }
        Ok(cleaned)
    }

    /// Reconciles duplicate rows for a pair on backends that cannot
    /// enforce the composite key. Best-effort: callers log and continue
    /// on failure.
    pub async fn purge_inactive_duplicates(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<u64, ServiceError> {
        let purged = self
            .store
            .delete_inactive_duplicates(session_id, user_id)
            .await
            .map_err(map_store("participant"))?;
        if purged > 0 {
            tracing::warn!(
                session_id = %session_id,
                user_id = %user_id,
                purged,
                "purged duplicate participant rows"
            );
        }
        Ok(purged)
    }

    /// Cascading delete of all records for a session; only called from the
    /// privileged session delete.
    pub async fn purge_session(&self, session_id: &SessionId) -> Result<u64, ServiceError> {
        let removed = self
            .store
            .delete_session_participants(session_id)
            .await
            .map_err(map_store("participant"))?;
        tracing::info!(session_id = %session_id, removed, "participant records purged");
        Ok(removed)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use seminar_store::MemoryStore;

    use super::*;

    fn registry() -> ParticipantRegistry {
        ParticipantRegistry::new(Arc::new(MemoryStore::new()))
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    // -- add_or_rejoin ----------------------------------------------------

    #[tokio::test]
    async fn test_add_or_rejoin_first_join_creates_active_record() {
        let reg = registry();
        let sid = SessionId::new();

        let p = reg
            .add_or_rejoin(&sid, &uid("u1"), Role::Student, "Ada")
            .await
            .unwrap();

        assert!(p.active);
        assert_eq!(p.total_duration_ms, 0);
        assert_eq!(p.disconnect_count, 0);
        assert_eq!(p.id, format!("{}:u1", sid));
    }

    #[tokio::test]
    async fn test_add_or_rejoin_while_active_is_idempotent() {
        let reg = registry();
        let sid = SessionId::new();
        let t0 = Utc::now();

        let first = reg
            .add_or_rejoin_at(&sid, &uid("u1"), Role::Student, "Ada", t0)
            .await
            .unwrap();
        let second = reg
            .add_or_rejoin_at(&sid, &uid("u1"), Role::Student, "Ada", t0 + Duration::seconds(5))
            .await
            .unwrap();

        // Second call is a success and returns the unchanged record.
        assert_eq!(second, first);
        assert_eq!(second.join_time, t0);
        assert_eq!(second.disconnect_count, 0);
    }

    #[tokio::test]
    async fn test_rejoin_accumulates_closed_intervals() {
        // join@t0, leave@t1, join@t2, leave@t3 ⇒ (t1−t0) + (t3−t2)
        let reg = registry();
        let sid = SessionId::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::milliseconds(4_000);
        let t2 = t0 + Duration::milliseconds(60_000);
        let t3 = t0 + Duration::milliseconds(66_000);

        reg.add_or_rejoin_at(&sid, &uid("u1"), Role::Student, "Ada", t0)
            .await
            .unwrap();
        reg.remove_participant_at(&sid, &uid("u1"), t1).await.unwrap();
        let rejoined = reg
            .add_or_rejoin_at(&sid, &uid("u1"), Role::Student, "Ada", t2)
            .await
            .unwrap();
        assert!(rejoined.active);
        assert_eq!(rejoined.disconnect_count, 1);
        assert_eq!(rejoined.join_time, t2);
        assert!(rejoined.last_leave_time.is_none());

        let left = reg.remove_participant_at(&sid, &uid("u1"), t3).await.unwrap();
        assert_eq!(left.total_duration_ms, 4_000 + 6_000);
    }

    #[tokio::test]
    async fn test_rejoin_resets_media_flags() {
        let reg = registry();
        let sid = SessionId::new();

        reg.add_or_rejoin(&sid, &uid("u1"), Role::Student, "Ada")
            .await
            .unwrap();
        reg.update_media_status(&sid, &uid("u1"), true, true)
            .await
            .unwrap();
        reg.remove_participant(&sid, &uid("u1")).await.unwrap();

        let rejoined = reg
            .add_or_rejoin(&sid, &uid("u1"), Role::Student, "Ada")
            .await
            .unwrap();
        assert!(!rejoined.audio_enabled);
        assert!(!rejoined.video_enabled);
    }

    // -- remove_participant -----------------------------------------------

    #[tokio::test]
    async fn test_remove_participant_missing_returns_not_found() {
        let reg = registry();
        let result = reg.remove_participant(&SessionId::new(), &uid("ghost")).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_participant_twice_conflicts_without_total_change() {
        let reg = registry();
        let sid = SessionId::new();
        let t0 = Utc::now();

        reg.add_or_rejoin_at(&sid, &uid("u1"), Role::Student, "Ada", t0)
            .await
            .unwrap();
        let left = reg
            .remove_participant_at(&sid, &uid("u1"), t0 + Duration::milliseconds(2_000))
            .await
            .unwrap();

        let result = reg
            .remove_participant_at(&sid, &uid("u1"), t0 + Duration::milliseconds(9_000))
            .await;

        assert!(matches!(result, Err(ServiceError::Conflict(_))));
        let stored = reg.all_participants(&sid).await.unwrap();
        assert_eq!(stored[0].total_duration_ms, left.total_duration_ms);
    }

    // -- projections ------------------------------------------------------

    #[tokio::test]
    async fn test_active_participants_excludes_inactive() {
        let reg = registry();
        let sid = SessionId::new();
        reg.add_or_rejoin(&sid, &uid("u1"), Role::Student, "Ada")
            .await
            .unwrap();
        reg.add_or_rejoin(&sid, &uid("u2"), Role::Student, "Brian")
            .await
            .unwrap();
        reg.remove_participant(&sid, &uid("u1")).await.unwrap();

        let active = reg.active_participants(&sid).await.unwrap();
        let all = reg.all_participants(&sid).await.unwrap();

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_id, uid("u2"));
        assert_eq!(all.len(), 2);
        assert_eq!(reg.active_participant_count(&sid).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_is_user_in_session_sees_inactive_records() {
        let reg = registry();
        let sid = SessionId::new();
        reg.add_or_rejoin(&sid, &uid("u1"), Role::Student, "Ada")
            .await
            .unwrap();
        reg.remove_participant(&sid, &uid("u1")).await.unwrap();

        assert!(reg.is_user_in_session(&sid, &uid("u1")).await.unwrap());
        assert!(!reg.is_user_in_session(&sid, &uid("u9")).await.unwrap());
    }

    #[tokio::test]
    async fn test_session_stats_averages_effective_durations() {
        let reg = registry();
        let sid = SessionId::new();
        let t0 = Utc::now();

        // u1: closed interval of 8s. u2: open interval of 4s at check time.
        reg.add_or_rejoin_at(&sid, &uid("u1"), Role::Student, "Ada", t0)
            .await
            .unwrap();
        reg.remove_participant_at(&sid, &uid("u1"), t0 + Duration::milliseconds(8_000))
            .await
            .unwrap();
        reg.add_or_rejoin_at(&sid, &uid("u2"), Role::Instructor, "Grace", t0)
            .await
            .unwrap();

        let stats = reg
            .session_stats_at(&sid, t0 + Duration::milliseconds(4_000))
            .await
            .unwrap();

        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.active_count, 1);
        assert_eq!(stats.average_duration_ms, (8_000 + 4_000) / 2);
        assert_eq!(stats.participants.len(), 2);
    }

    #[tokio::test]
    async fn test_session_stats_empty_session_is_zeroed() {
        let reg = registry();
        let stats = reg.session_stats(&SessionId::new()).await.unwrap();
        assert_eq!(stats.total_count, 0);
        assert_eq!(stats.active_count, 0);
        assert_eq!(stats.average_duration_ms, 0);
    }

    // -- media ------------------------------------------------------------

    #[tokio::test]
    async fn test_update_media_status_missing_returns_not_found() {
        let reg = registry();
        let result = reg
            .update_media_status(&SessionId::new(), &uid("u1"), true, false)
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_media_status_sets_flags() {
        let reg = registry();
        let sid = SessionId::new();
        reg.add_or_rejoin(&sid, &uid("u1"), Role::Student, "Ada")
            .await
            .unwrap();

        let p = reg
            .update_media_status(&sid, &uid("u1"), true, false)
            .await
            .unwrap();
        assert!(p.audio_enabled);
        assert!(!p.video_enabled);
    }

    // -- cleanup ----------------------------------------------------------

    #[tokio::test]
    async fn test_cleanup_inactivates_all_active_participants() {
        let reg = registry();
        let sid = SessionId::new();
        let t0 = Utc::now();
        reg.add_or_rejoin_at(&sid, &uid("u1"), Role::Student, "Ada", t0)
            .await
            .unwrap();
        reg.add_or_rejoin_at(&sid, &uid("u2"), Role::Student, "Brian", t0)
            .await
            .unwrap();
        reg.update_media_status(&sid, &uid("u2"), true, true)
            .await
            .unwrap();

        let cleaned = reg
            .cleanup_session_participants_at(&sid, t0 + Duration::milliseconds(3_000))
            .await
            .unwrap();

        assert_eq!(cleaned, 2);
        let all = reg.all_participants(&sid).await.unwrap();
        for p in &all {
            assert!(!p.active);
            assert!(!p.audio_enabled);
            assert!(!p.video_enabled);
            assert_eq!(p.total_duration_ms, 3_000);
            assert!(p.last_leave_time.is_some());
        }
    }

    #[tokio::test]
    async fn test_cleanup_on_empty_session_is_zero() {
        let reg = registry();
        assert_eq!(
            reg.cleanup_session_participants(&SessionId::new())
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_purge_session_removes_every_record() {
        let reg = registry();
        let sid = SessionId::new();
        reg.add_or_rejoin(&sid, &uid("u1"), Role::Student, "Ada")
            .await
            .unwrap();
        reg.add_or_rejoin(&sid, &uid("u2"), Role::Student, "Brian")
            .await
            .unwrap();

        let removed = reg.purge_session(&sid).await.unwrap();

        assert_eq!(removed, 2);
        assert!(reg.all_participants(&sid).await.unwrap().is_empty());
    }
}
