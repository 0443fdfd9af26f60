//! Live-connection event types.
//!
//! Two internally tagged enums cover the two directions of the wire:
//! [`ClientEvent`] (client → server requests) and [`ServerEvent`]
//! (server → client acknowledgements and room broadcasts). Tags are
//! kebab-case, e.g. `{ "type": "join-session", ... }`, matching what the
//! web client emits.
//!
//! Errors are always a [`ServerEvent::Error`] sent to the requester only —
//! failures are never broadcast to a room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CloseReason, Role, SessionId, SessionStatus, UserId};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Identity fields pre-verified by the gateway.
///
/// Supplied as a fallback inside [`ClientEvent::JoinSession`] when the
/// gateway has already resolved the caller and the live layer should not
/// (or cannot) resolve the credential again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    pub user_id: UserId,
    pub user_name: String,
    pub role: Role,
}

/// Requests a client can make over a live connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Authenticate and enter a session's room. `credential` is resolved
    /// through the role authority; `identity` is only honored as a
    /// fallback when resolution fails or no credential is present.
    JoinSession {
        session_id: SessionId,
        credential: Option<String>,
        identity: Option<IdentityClaim>,
    },

    /// Graceful exit from the session's room.
    LeaveSession { session_id: SessionId },

    /// Moderator request to close the session for everyone.
    CloseSession { session_id: SessionId },

    /// Moderator request to eject one participant.
    AdminRemoveParticipant {
        session_id: SessionId,
        user_id: UserId,
    },

    /// Ask the server to re-evaluate the session's time-based status.
    CheckSessionStatus { session_id: SessionId },

    /// Raise or lower the caller's hand.
    RaiseHand { session_id: SessionId, raised: bool },

    /// Ephemeral reaction relayed to the whole room, any role may send.
    Reaction { session_id: SessionId, emoji: String },

    /// Keep-alive. `client_time` is echoed back for RTT measurement.
    Heartbeat { client_time: u64 },
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// One participant's entry in a broadcast list: the persisted presence
/// fields merged with the volatile hand-raised flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub user_id: UserId,
    pub user_name: String,
    pub role: Role,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub hand_raised: bool,
    pub join_time: DateTime<Utc>,
}

/// Events the server sends: per-request acknowledgements and room-wide
/// broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Join acknowledgement to the joiner only.
    SessionJoined {
        session_id: SessionId,
        user_id: UserId,
        status: SessionStatus,
    },

    /// Full refreshed roster, sent to the whole room after any membership
    /// or hand-raise change.
    ParticipantListUpdated {
        session_id: SessionId,
        participants: Vec<ParticipantView>,
        active_count: u32,
    },

    /// Session status after a transition (initiation, time check, closure).
    SessionStatusUpdated {
        session_id: SessionId,
        status: SessionStatus,
        close_reason: Option<CloseReason>,
    },

    /// Lightweight "someone arrived" notice to everyone but the joiner.
    ParticipantJoined {
        session_id: SessionId,
        user_id: UserId,
        user_name: String,
        role: Role,
    },

    /// Someone left or was removed.
    ParticipantLeft {
        session_id: SessionId,
        user_id: UserId,
    },

    /// The session closed; all members are about to be disconnected.
    SessionClosed {
        session_id: SessionId,
        reason: CloseReason,
        closed_by: Option<UserId>,
    },

    /// Relayed reaction.
    UserReaction {
        session_id: SessionId,
        user_id: UserId,
        user_name: String,
        role: Role,
        emoji: String,
    },

    /// The server is about to drop this connection; the client should not
    /// reconnect to the same room automatically.
    ForceDisconnect { reason: String },

    /// Keep-alive echo.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Per-request failure, delivered to the requester only. `code`
    /// follows HTTP conventions (400/401/403/404/409).
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Top-level wire frame: ordering metadata around one event.
///
/// Each side keeps its own `seq` counter; `timestamp` is epoch
/// milliseconds at send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<E> {
    pub seq: u64,
    pub timestamp: i64,
    pub event: E,
}

impl<E> Envelope<E> {
    pub fn new(seq: u64, event: E) -> Self {
        Self {
            seq,
            timestamp: Utc::now().timestamp_millis(),
            event,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
