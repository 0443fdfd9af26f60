//! Per-connection handler: identity resolution, event routing, and
//! disconnect reconciliation.
//!
//! Each accepted connection gets its own Tokio task running this handler,
//! plus a small outbound pump task. The flow is:
//!   1. Loop: receive envelopes → dispatch client events
//!   2. `join-session` resolves identity and enters a room; everything
//!      room-scoped before that is rejected with an error ack
//!   3. Outbound events (acks and room broadcasts) flow through one
//!      mpsc channel so ordering is preserved, and the pump closes the
//!      connection after delivering a `force-disconnect`
//!   4. On any exit, a drop guard reconciles presence with the
//!      coordinator — even if the handler panics

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use seminar_live::EventSender;
use seminar_protocol::{
    ClientEvent, Codec, Envelope, IdentityClaim, ServerEvent, SessionId,
};
use seminar_session::{Identity, ServiceError};
use seminar_transport::{Connection, ConnectionId, WebSocketConnection};

use crate::SeminarError;
use crate::server::ServerState;

/// Drop guard that reconciles the connection's presence when the handler
/// exits. Since `Drop` is synchronous, it spawns a fire-and-forget task.
struct DisconnectGuard {
    connection_id: ConnectionId,
    state: Arc<ServerState>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let connection_id = self.connection_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.coordinator.handle_disconnect(connection_id).await;
        });
    }
}

/// Handles a single live connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), SeminarError> {
    let connection_id = conn.id();
    tracing::debug!(%connection_id, "handling new connection");

    // All outbound traffic — error acks included — goes through this
    // channel so the pump is the single writer and `seq` stays ordered.
    let (tx, rx) = mpsc::unbounded_channel();
    let _pump = OutboundPump::spawn(conn.clone(), rx, state.codec);
    let _guard = DisconnectGuard {
        connection_id,
        state: Arc::clone(&state),
    };

    // Set once a join succeeds; room-scoped events check against it.
    let mut joined: Option<(SessionId, Identity)> = None;

    loop {
        let data = match tokio::time::timeout(state.config.receive_timeout, conn.recv()).await
        {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::debug!(%connection_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%connection_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%connection_id, "connection timed out");
                break;
            }
        };

        let envelope: Envelope<ClientEvent> = match state.codec.decode(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "failed to decode envelope");
                send_error(&tx, 400, "malformed event");
                continue;
            }
        };

        handle_event(&state, connection_id, &tx, &mut joined, envelope.event).await;
    }

    // _guard drops here → disconnect reconciliation fires.
    Ok(())
}

/// Routes one client event. Failures go back to the requester as an
/// `error` ack; they are never broadcast.
async fn handle_event(
    state: &Arc<ServerState>,
    connection_id: ConnectionId,
    tx: &EventSender,
    joined: &mut Option<(SessionId, Identity)>,
    event: ClientEvent,
) {
    match event {
        ClientEvent::JoinSession {
            session_id,
            credential,
            identity,
        } => {
            let identity = match resolve_identity(state, credential, identity).await {
                Some(identity) => identity,
                None => {
                    send_error(tx, 401, "unable to resolve identity");
                    return;
                }
            };

            match state
                .coordinator
                .join(session_id, &identity, connection_id, tx.clone())
                .await
            {
                Ok(outcome) => {
                    let _ = tx.send(ServerEvent::SessionJoined {
                        session_id,
                        user_id: identity.user_id.clone(),
                        status: outcome.session.status,
                    });
                    *joined = Some((session_id, identity));
                }
                Err(e) => send_service_error(tx, &e),
            }
        }

        ClientEvent::LeaveSession { session_id } => {
            let Some((sid, identity)) = room_scope(tx, joined, session_id) else {
                return;
            };
            if let Err(e) = state.coordinator.leave(sid, &identity.user_id).await {
                send_service_error(tx, &e);
                return;
            }
            *joined = None;
        }

        ClientEvent::CloseSession { session_id } => {
            // Moderators may close any session they are authorized for,
            // joined to it or not; only the identity must be established.
            let Some((_, identity)) = joined.as_ref() else {
                send_error(tx, 401, "join a session first");
                return;
            };
            if let Err(e) = state
                .coordinator
                .close_session(session_id, &identity.user_id, identity.role)
                .await
            {
                send_service_error(tx, &e);
            }
        }

        ClientEvent::AdminRemoveParticipant {
            session_id,
            user_id,
        } => {
            let Some((_, identity)) = joined.as_ref() else {
                send_error(tx, 401, "join a session first");
                return;
            };
            if let Err(e) = state
                .coordinator
                .remove_participant(session_id, &user_id, &identity.user_id, identity.role)
                .await
            {
                send_service_error(tx, &e);
            }
        }

        ClientEvent::CheckSessionStatus { session_id } => {
            match state.coordinator.check_status(session_id).await {
                Ok(check) => {
                    // The room hears about transitions via broadcast; the
                    // requester always gets the current status back.
                    let session = check.session();
                    let _ = tx.send(ServerEvent::SessionStatusUpdated {
                        session_id,
                        status: session.status,
                        close_reason: session.close_reason,
                    });
                }
                Err(e) => send_service_error(tx, &e),
            }
        }

        ClientEvent::RaiseHand { session_id, raised } => {
            let Some((sid, identity)) = room_scope(tx, joined, session_id) else {
                return;
            };
            if let Err(e) = state
                .coordinator
                .raise_hand(sid, &identity.user_id, raised)
                .await
            {
                send_service_error(tx, &e);
            }
        }

        ClientEvent::Reaction { session_id, emoji } => {
            let Some((sid, identity)) = room_scope(tx, joined, session_id) else {
                return;
            };
            state
                .coordinator
                .reaction(sid, &identity.user_id, &identity.name, identity.role, emoji)
                .await;
        }

        ClientEvent::Heartbeat { client_time } => {
            let _ = tx.send(ServerEvent::HeartbeatAck {
                client_time,
                server_time: Utc::now().timestamp_millis() as u64,
            });
        }
    }
}

/// Resolves who is joining: the credential through the role authority
/// first, the gateway-verified claim as the fallback.
async fn resolve_identity(
    state: &Arc<ServerState>,
    credential: Option<String>,
    claim: Option<IdentityClaim>,
) -> Option<Identity> {
    if let Some(credential) = credential {
        match state.authority.resolve(&credential).await {
            Ok(Some(identity)) => return Some(identity),
            Ok(None) => tracing::debug!("credential not recognized"),
            Err(e) => tracing::warn!(error = %e, "role authority failed"),
        }
    }

    claim.map(|claim| Identity {
        user_id: claim.user_id,
        role: claim.role,
        name: claim.user_name,
        email: None,
    })
}

/// Checks the event's session against the connection's room membership.
/// Returns the joined pair, or acks an error and yields `None`.
fn room_scope(
    tx: &EventSender,
    joined: &Option<(SessionId, Identity)>,
    session_id: SessionId,
) -> Option<(SessionId, Identity)> {
    match joined {
        Some((sid, identity)) if *sid == session_id => Some((*sid, identity.clone())),
        Some(_) => {
            send_error(tx, 400, "not joined to that session");
            None
        }
        None => {
            send_error(tx, 401, "join a session first");
            None
        }
    }
}

fn send_error(tx: &EventSender, code: u16, message: &str) {
    let _ = tx.send(ServerEvent::Error {
        code,
        message: message.to_string(),
    });
}

fn send_service_error(tx: &EventSender, err: &ServiceError) {
    let _ = tx.send(ServerEvent::Error {
        code: err.status_code(),
        message: err.to_string(),
    });
}

/// Forwards queued [`ServerEvent`]s onto the wire, one writer per
/// connection. After delivering a `force-disconnect` it closes the
/// connection, which unblocks the handler's receive loop.
struct OutboundPump;

impl OutboundPump {
    fn spawn(
        conn: WebSocketConnection,
        mut rx: mpsc::UnboundedReceiver<ServerEvent>,
        codec: seminar_protocol::JsonCodec,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut seq: u64 = 0;
            while let Some(event) = rx.recv().await {
                let disconnect = matches!(event, ServerEvent::ForceDisconnect { .. });

                seq += 1;
                let envelope = Envelope::new(seq, event);
                match codec.encode(&envelope) {
                    Ok(bytes) => {
                        if conn.send(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode outbound event");
                        continue;
                    }
                }

                if disconnect {
                    let _ = conn.close().await;
                    break;
                }
            }
        })
    }
}
