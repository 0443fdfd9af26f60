//! # Seminar
//!
//! Real-time discussion/session coordination for e-learning platforms.
//!
//! Seminar schedules time-boxed group discussions for a course, tracks
//! who is present, enforces the `upcoming → active → closed` lifecycle,
//! and keeps every connected client's view of participants and status
//! consistent under joins, leaves, abrupt disconnects, duplicate
//! connections, and forced moderation.
//!
//! The stack, bottom to top:
//!
//! - `seminar-store` — durable session/participant records behind an
//!   atomic persistence contract
//! - `seminar-session` — the lifecycle and registry services that own
//!   every durable mutation
//! - `seminar-live` — rooms, broadcasts, and the expiry sweep
//! - `seminar-transport` / `seminar-protocol` — WebSocket frames and the
//!   event vocabulary
//! - `seminar-gateway` — the REST surface
//!
//! This crate ties them together behind [`SeminarServer`]:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use seminar::SeminarServer;
//! use seminar_session::{Identity, StaticAuthority};
//! use seminar_protocol::Role;
//! use seminar_store::MemoryStore;
//!
//! # async fn run() -> Result<(), seminar::SeminarError> {
//! let authority = StaticAuthority::new()
//!     .with_token("tok", Identity::new("u1", Role::Instructor, "Grace"));
//!
//! let server = SeminarServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .gateway_bind("0.0.0.0:8081")
//!     .build(Arc::new(MemoryStore::new()), Arc::new(authority))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::SeminarError;
pub use server::{SeminarServer, SeminarServerBuilder};
