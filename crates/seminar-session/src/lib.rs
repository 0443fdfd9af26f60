//! Domain services for Seminar's session coordination.
//!
//! Two services own every durable mutation:
//!
//! 1. **[`SessionLifecycle`]** — creates sessions, drives the monotonic
//!    status state machine, authorizes moderation.
//! 2. **[`ParticipantRegistry`]** — idempotent presence records with
//!    exactly-one-active-record-per-`(session, user)` semantics.
//!
//! The live coordinator and the REST gateway both sit on top of these;
//! neither writes to the store directly. Identity comes in through the
//! [`RoleAuthority`] collaborator trait.

mod authority;
mod error;
mod lifecycle;
mod registry;

pub use authority::{Identity, RoleAuthority, StaticAuthority};
pub use error::ServiceError;
pub use lifecycle::{
    DEFAULT_MAX_PARTICIPANTS, SessionDraft, SessionLifecycle, StatusCheck,
};
pub use registry::{ParticipantRegistry, SessionStats};
