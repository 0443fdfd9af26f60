//! Wire protocol for Seminar's live discussion coordination.
//!
//! This crate is the shared vocabulary of the stack:
//!
//! - **Types** ([`SessionId`], [`UserId`], [`Role`], [`SessionStatus`], …)
//!   — identity newtypes and lifecycle enums used by every layer.
//! - **Events** ([`ClientEvent`], [`ServerEvent`], [`Envelope`]) — the
//!   messages that travel over a live connection.
//! - **Codec** ([`Codec`], [`JsonCodec`]) — how events become bytes.
//!
//! The protocol layer knows nothing about connections, rooms, or
//! persistence; it only defines shapes.

mod codec;
mod error;
mod events;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use events::{ClientEvent, Envelope, IdentityClaim, ParticipantView, ServerEvent};
pub use types::{CloseReason, Role, SessionId, SessionStatus, SessionType, UserId};
