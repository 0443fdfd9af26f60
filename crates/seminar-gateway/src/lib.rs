//! REST gateway for Seminar.
//!
//! A thin axum surface over the domain services: every handler
//! authenticates the caller through the [`RoleAuthority`] seam, delegates
//! to [`SessionLifecycle`], [`ParticipantRegistry`], or the
//! [`Coordinator`], and maps the service error taxonomy onto HTTP
//! statuses. No domain rules live here.
//!
//! [`RoleAuthority`]: seminar_session::RoleAuthority
//! [`SessionLifecycle`]: seminar_session::SessionLifecycle
//! [`ParticipantRegistry`]: seminar_session::ParticipantRegistry
//! [`Coordinator`]: seminar_live::Coordinator

pub mod extract;
pub mod response;
pub mod routes;
pub mod state;

pub use response::{ApiError, ErrorResponse};
pub use routes::router;
pub use state::AppState;
