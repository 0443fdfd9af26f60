//! The live coordinator: glues connections, rooms, and the domain
//! services together.
//!
//! Every durable mutation goes through [`SessionLifecycle`] or
//! [`ParticipantRegistry`]; the coordinator only owns the process-local
//! [`RoomRoster`]. Broadcasts are issued strictly after their triggering
//! mutation has returned from the store, so a received broadcast always
//! reflects state at least as recent as its cause.
//!
//! Best-effort steps (duplicate purge, supersession, disconnect
//! reconciliation) log failures and continue — none of them may abort a
//! join or take a room down. The roster mutex is never held across I/O.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use seminar_protocol::{
    CloseReason, ParticipantView, Role, ServerEvent, SessionId, SessionStatus, UserId,
};
use seminar_session::{
    Identity, ParticipantRegistry, ServiceError, SessionLifecycle, StatusCheck,
};
use seminar_store::{ParticipantRecord, SessionRecord};
use seminar_transport::ConnectionId;

use crate::roster::{ConnectionInfo, EventSender, RoomRoster};

/// Tunables for the live layer.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// How often the background sweep looks for expired sessions.
    pub sweep_interval: Duration,
    /// How long a connection may stay silent (no events, no heartbeat)
    /// before the server drops it.
    pub receive_timeout: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(15),
            receive_timeout: Duration::from_secs(60),
        }
    }
}

/// What a successful join hands back to the connection handler.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub session: SessionRecord,
    pub participant: ParticipantRecord,
}

/// Coordinates all live rooms in this process.
pub struct Coordinator {
    lifecycle: SessionLifecycle,
    registry: ParticipantRegistry,
    roster: Mutex<RoomRoster>,
}

impl Coordinator {
    pub fn new(lifecycle: SessionLifecycle, registry: ParticipantRegistry) -> Self {
        Self {
            lifecycle,
            registry,
            roster: Mutex::new(RoomRoster::new()),
        }
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    // -- join -------------------------------------------------------------

    /// Brings an authenticated connection into a session's room.
    ///
    /// # Errors
    /// - `NotFound` — no such session
    /// - `Conflict` — the session is closed
    /// - `Store`/registry errors from the presence upsert
    pub async fn join(
        &self,
        session_id: SessionId,
        identity: &Identity,
        connection_id: ConnectionId,
        sender: EventSender,
    ) -> Result<JoinOutcome, ServiceError> {
        let session = self.lifecycle.session(&session_id).await?;
        if session.status.is_closed() {
            return Err(ServiceError::conflict("session is closed"));
        }

        // Pre-join pipeline: independently failable cleanup steps. A
        // failure here is logged and never aborts the join.
        self.supersede_prior_connection(&identity.user_id, &session_id, connection_id)
            .await;
        self.purge_duplicate_rows(&session_id, &identity.user_id).await;

        // The atomic upsert: after this there is exactly one active
        // record for the pair, however many joins raced.
        let participant = self
            .registry
            .add_or_rejoin(&session_id, &identity.user_id, identity.role, &identity.name)
            .await?;

        {
            let mut roster = self.roster.lock().await;
            roster.register(
                connection_id,
                identity.user_id.clone(),
                session_id,
                sender,
                Utc::now(),
            );
        }

        // First joiner activates the session; losing that race is normal.
        let session = if session.status == SessionStatus::Upcoming
            && session.initiator_user_id.is_none()
        {
            match self
                .lifecycle
                .initiate_session(&session_id, &identity.user_id)
                .await
            {
                Ok(updated) => updated,
                Err(ServiceError::Conflict(_)) => self.lifecycle.session(&session_id).await?,
                Err(e) => {
                    tracing::warn!(
                        %session_id,
                        error = %e,
                        "initiation failed, continuing join"
                    );
                    session
                }
            }
        } else {
            session
        };

        self.refresh_participant_count(&session_id).await?;

        self.broadcast_participant_list(&session_id).await?;
        self.broadcast(
            &session_id,
            ServerEvent::SessionStatusUpdated {
                session_id,
                status: session.status,
                close_reason: session.close_reason,
            },
        )
        .await;
        self.notify_except(
            &session_id,
            &identity.user_id,
            ServerEvent::ParticipantJoined {
                session_id,
                user_id: identity.user_id.clone(),
                user_name: identity.name.clone(),
                role: identity.role,
            },
        )
        .await;

        tracing::info!(
            %session_id,
            user_id = %identity.user_id,
            %connection_id,
            "participant joined room"
        );
        Ok(JoinOutcome {
            session,
            participant,
        })
    }

    // -- leave & disconnect ----------------------------------------------

    /// Graceful, client-requested exit.
    ///
    /// An already-inactive record is tolerated (logged, cleanup continues);
    /// a missing one is a real `NotFound`.
    pub async fn leave(
        &self,
        session_id: SessionId,
        user_id: &UserId,
    ) -> Result<(), ServiceError> {
        match self.registry.remove_participant(&session_id, user_id).await {
            Ok(_) => {}
            Err(ServiceError::Conflict(msg)) => {
                tracing::debug!(%session_id, %user_id, %msg, "leave for inactive participant");
            }
            Err(e) => return Err(e),
        }

        self.detach_user_connection(&session_id, user_id).await;

        self.refresh_participant_count(&session_id).await?;
        self.broadcast_participant_list(&session_id).await?;
        self.notify_except(
            &session_id,
            user_id,
            ServerEvent::ParticipantLeft {
                session_id,
                user_id: user_id.clone(),
            },
        )
        .await;

        tracing::info!(%session_id, %user_id, "participant left room");
        Ok(())
    }

    /// Reconciliation for a connection that vanished without an explicit
    /// leave. Unconditionally best-effort: a connection that was already
    /// cleaned up (double disconnect, superseded, closed room) is a no-op.
    pub async fn handle_disconnect(&self, connection_id: ConnectionId) {
        let (info, user_still_connected) = {
            let mut roster = self.roster.lock().await;
            let Some(info) = roster.detach_connection(connection_id) else {
                return;
            };
            let still = roster.user_in_room(&info.session_id, &info.user_id);
            if !still {
                roster.clear_hand(&info.session_id, &info.user_id);
            }
            (info, still)
        };

        tracing::info!(
            %connection_id,
            user_id = %info.user_id,
            session_id = %info.session_id,
            "connection dropped"
        );

        if user_still_connected {
            // A newer connection superseded this one; it owns the user's
            // presence now.
            return;
        }

        if let Err(e) = self
            .registry
            .remove_participant(&info.session_id, &info.user_id)
            .await
        {
            tracing::debug!(
                session_id = %info.session_id,
                user_id = %info.user_id,
                error = %e,
                "disconnect reconciliation had nothing to close"
            );
        }
        if let Err(e) = self.refresh_participant_count(&info.session_id).await {
            tracing::warn!(session_id = %info.session_id, error = %e, "count refresh failed");
        }
        if let Err(e) = self.broadcast_participant_list(&info.session_id).await {
            tracing::warn!(session_id = %info.session_id, error = %e, "list broadcast failed");
        }
        self.notify_except(
            &info.session_id,
            &info.user_id,
            ServerEvent::ParticipantLeft {
                session_id: info.session_id,
                user_id: info.user_id.clone(),
            },
        )
        .await;
    }

    // -- moderation -------------------------------------------------------

    /// Moderator-driven closure: persist, bulk-inactivate, notify, and
    /// disconnect the whole room.
    pub async fn close_session(
        &self,
        session_id: SessionId,
        moderator: &UserId,
        role: Role,
    ) -> Result<SessionRecord, ServiceError> {
        let session = self
            .lifecycle
            .close_session_manually(&session_id, moderator, role)
            .await?;
        self.finalize_closure(&session).await;
        Ok(session)
    }

    /// Moderator-driven removal of a single participant.
    pub async fn remove_participant(
        &self,
        session_id: SessionId,
        target: &UserId,
        moderator: &UserId,
        role: Role,
    ) -> Result<(), ServiceError> {
        let session = self.lifecycle.session(&session_id).await?;
        self.lifecycle.authorize_moderation(&session, moderator, role)?;

        self.registry.remove_participant(&session_id, target).await?;

        if let Some(info) = self.detach_user_connection(&session_id, target).await {
            let _ = info.sender.send(ServerEvent::ForceDisconnect {
                reason: "removed by moderator".into(),
            });
        }

        self.refresh_participant_count(&session_id).await?;
        self.broadcast_participant_list(&session_id).await?;
        self.notify_except(
            &session_id,
            target,
            ServerEvent::ParticipantLeft {
                session_id,
                user_id: target.clone(),
            },
        )
        .await;

        tracing::info!(
            %session_id,
            target = %target,
            moderator = %moderator,
            "participant removed by moderator"
        );
        Ok(())
    }

    /// Privileged removal of a session and everything attached to it:
    /// room teardown, cascading participant purge, then the record.
    pub async fn delete_session(
        &self,
        session_id: SessionId,
        moderator: &UserId,
        role: Role,
    ) -> Result<(), ServiceError> {
        if !role.can_administer() {
            return Err(ServiceError::authorization(
                "only admins can delete sessions",
            ));
        }
        // NotFound surfaces before any teardown starts.
        self.lifecycle.session(&session_id).await?;

        let dropped = {
            let mut roster = self.roster.lock().await;
            roster.drop_room(&session_id)
        };
        for info in &dropped {
            let _ = info.sender.send(ServerEvent::ForceDisconnect {
                reason: "session deleted".into(),
            });
        }

        if let Err(e) = self.registry.purge_session(&session_id).await {
            tracing::warn!(
                %session_id,
                error = %e,
                "participant purge failed during delete"
            );
        }
        self.lifecycle.delete_session(&session_id).await?;

        tracing::info!(
            %session_id,
            moderator = %moderator,
            connections = dropped.len(),
            "session deleted"
        );
        Ok(())
    }

    // -- signaling --------------------------------------------------------

    /// Flips the volatile hand flag and re-broadcasts the roster.
    pub async fn raise_hand(
        &self,
        session_id: SessionId,
        user_id: &UserId,
        raised: bool,
    ) -> Result<(), ServiceError> {
        {
            let mut roster = self.roster.lock().await;
            if !roster.user_in_room(&session_id, user_id) {
                return Err(ServiceError::not_found("participant"));
            }
            roster.set_hand(session_id, user_id.clone(), raised);
        }
        self.broadcast_participant_list(&session_id).await
    }

    /// Stateless fan-out; any participant may send and everyone in the
    /// room (sender included) receives.
    pub async fn reaction(
        &self,
        session_id: SessionId,
        user_id: &UserId,
        user_name: &str,
        role: Role,
        emoji: String,
    ) {
        self.broadcast(
            &session_id,
            ServerEvent::UserReaction {
                session_id,
                user_id: user_id.clone(),
                user_name: user_name.to_string(),
                role,
                emoji,
            },
        )
        .await;
    }

    // -- time-driven transitions -----------------------------------------

    /// Runs the lifecycle time check; a transition is broadcast, and a
    /// transition into `closed` tears the room down exactly like a manual
    /// closure.
    pub async fn check_status(
        &self,
        session_id: SessionId,
    ) -> Result<StatusCheck, ServiceError> {
        let check = self.lifecycle.check_and_update_status(&session_id).await?;

        if check.transitioned() {
            let session = check.session().clone();
            self.broadcast(
                &session_id,
                ServerEvent::SessionStatusUpdated {
                    session_id,
                    status: session.status,
                    close_reason: session.close_reason,
                },
            )
            .await;
            if check.closed_now() {
                self.finalize_closure(&session).await;
            }
        }
        Ok(check)
    }

    /// One pass of the background sweep: drives every open session whose
    /// end time has passed through auto-closure, connections or not.
    /// Returns how many sessions this pass closed.
    pub async fn sweep_expired(&self) -> u32 {
        let open = match self.lifecycle.open_sessions().await {
            Ok(open) => open,
            Err(e) => {
                tracing::warn!(error = %e, "expiry sweep could not list open sessions");
                return 0;
            }
        };

        let now = Utc::now();
        let mut closed = 0;
        for session in open.into_iter().filter(|s| s.is_past_end(now)) {
            match self.check_status(session.id).await {
                Ok(check) if check.closed_now() => closed += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.id,
                        error = %e,
                        "expiry sweep failed for session"
                    );
                }
            }
        }
        closed
    }

    // -- internals --------------------------------------------------------

    /// Supersession steps for a user who already has a tracked connection:
    /// signal the old connection, detach it, and (when it was in a
    /// different session) drop the stale membership there. Each step is
    /// best-effort.
    ///
    /// A re-join over the user's current connection is not a supersession:
    /// same session is a no-op, and switching sessions detaches the old
    /// room membership without telling the (still live) connection to go.
    async fn supersede_prior_connection(
        &self,
        user_id: &UserId,
        new_session_id: &SessionId,
        new_connection: ConnectionId,
    ) {
        let prior = {
            let roster = self.roster.lock().await;
            roster.user_connection(user_id).cloned()
        };
        let Some(prior) = prior else { return };

        let same_connection = prior.connection_id == new_connection;
        if same_connection && prior.session_id == *new_session_id {
            return;
        }

        if !same_connection {
            let _ = prior.sender.send(ServerEvent::ForceDisconnect {
                reason: "superseded by a new connection".into(),
            });
        }
        {
            let mut roster = self.roster.lock().await;
            roster.detach_connection(prior.connection_id);
            if prior.session_id != *new_session_id {
                roster.clear_hand(&prior.session_id, user_id);
            }
        }
        tracing::info!(
            %user_id,
            old_session = %prior.session_id,
            old_connection = %prior.connection_id,
            "superseded prior connection"
        );

        if prior.session_id == *new_session_id {
            return;
        }

        // Drop the stale membership in the old session and let its room
        // know.
        match self
            .registry
            .remove_participant(&prior.session_id, user_id)
            .await
        {
            Ok(_) => {
                if let Err(e) = self.refresh_participant_count(&prior.session_id).await {
                    tracing::debug!(
                        session_id = %prior.session_id,
                        error = %e,
                        "count refresh for old session failed"
                    );
                }
                if let Err(e) = self.broadcast_participant_list(&prior.session_id).await {
                    tracing::debug!(
                        session_id = %prior.session_id,
                        error = %e,
                        "list broadcast for old session failed"
                    );
                }
                self.notify_except(
                    &prior.session_id,
                    user_id,
                    ServerEvent::ParticipantLeft {
                        session_id: prior.session_id,
                        user_id: user_id.clone(),
                    },
                )
                .await;
            }
            Err(e) => {
                tracing::debug!(
                    session_id = %prior.session_id,
                    %user_id,
                    error = %e,
                    "stale membership removal skipped"
                );
            }
        }
    }

    async fn purge_duplicate_rows(&self, session_id: &SessionId, user_id: &UserId) {
        if let Err(e) = self
            .registry
            .purge_inactive_duplicates(session_id, user_id)
            .await
        {
            tracing::warn!(
                %session_id,
                %user_id,
                error = %e,
                "duplicate purge failed, continuing"
            );
        }
    }

    /// Post-closure teardown shared by manual close, status check, and
    /// the sweep. Everything here is best-effort; the session is already
    /// durably closed.
    async fn finalize_closure(&self, session: &SessionRecord) {
        if let Err(e) = self.registry.cleanup_session_participants(&session.id).await {
            tracing::warn!(session_id = %session.id, error = %e, "participant cleanup failed");
        }
        if let Err(e) = self.lifecycle.update_participant_count(&session.id, 0).await {
            tracing::warn!(session_id = %session.id, error = %e, "count reset failed");
        }

        let reason = session.close_reason.unwrap_or(CloseReason::ManualClosure);
        let dropped = {
            let mut roster = self.roster.lock().await;
            roster.drop_room(&session.id)
        };
        for info in &dropped {
            let _ = info.sender.send(ServerEvent::SessionClosed {
                session_id: session.id,
                reason,
                closed_by: session.closed_by.clone(),
            });
            let _ = info.sender.send(ServerEvent::ForceDisconnect {
                reason: "session closed".into(),
            });
        }

        tracing::info!(
            session_id = %session.id,
            connections = dropped.len(),
            %reason,
            "session room torn down"
        );
    }

    /// Recomputes the active count from the registry and persists it on
    /// the session record. Public because the REST gateway's registration
    /// and leave paths need the same recompute.
    pub async fn refresh_participant_count(
        &self,
        session_id: &SessionId,
    ) -> Result<u32, ServiceError> {
        let count = self.registry.active_participant_count(session_id).await?;
        self.lifecycle
            .update_participant_count(session_id, count)
            .await?;
        Ok(count)
    }

    /// Detaches the user's authoritative connection when it belongs to
    /// this session, clearing their hand flag either way.
    async fn detach_user_connection(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Option<ConnectionInfo> {
        let mut roster = self.roster.lock().await;
        roster.clear_hand(session_id, user_id);
        let info = roster.user_connection(user_id).cloned()?;
        if info.session_id != *session_id {
            return None;
        }
        roster.detach_connection(info.connection_id);
        Some(info)
    }

    /// Rebuilds the participant list from the registry, merges the
    /// volatile hand flags, and broadcasts it to the whole room.
    pub async fn broadcast_participant_list(
        &self,
        session_id: &SessionId,
    ) -> Result<(), ServiceError> {
        let participants = self.registry.active_participants(session_id).await?;

        let event = {
            let roster = self.roster.lock().await;
            let views: Vec<ParticipantView> = participants
                .iter()
                .map(|p| ParticipantView {
                    user_id: p.user_id.clone(),
                    user_name: p.user_name.clone(),
                    role: p.role,
                    audio_enabled: p.audio_enabled,
                    video_enabled: p.video_enabled,
                    hand_raised: roster.hand_raised(session_id, &p.user_id),
                    join_time: p.join_time,
                })
                .collect();
            ServerEvent::ParticipantListUpdated {
                session_id: *session_id,
                active_count: views.len() as u32,
                participants: views,
            }
        };

        self.broadcast(session_id, event).await;
        Ok(())
    }

    async fn broadcast(&self, session_id: &SessionId, event: ServerEvent) {
        let senders = self.roster.lock().await.room_senders(session_id);
        for sender in senders {
            let _ = sender.send(event.clone());
        }
    }

    async fn notify_except(&self, session_id: &SessionId, excluded: &UserId, event: ServerEvent) {
        let senders = self
            .roster
            .lock()
            .await
            .room_senders_except(session_id, excluded);
        for sender in senders {
            let _ = sender.send(event.clone());
        }
    }
}
