//! Persistence layer for Seminar.
//!
//! - **Records** ([`SessionRecord`], [`ParticipantRecord`]) — the durable
//!   data model.
//! - **Contract** ([`Store`]) — atomic CRUD plus the native conditional
//!   upsert the participant-uniqueness invariant depends on.
//! - **Reference implementation** ([`MemoryStore`]) — single-process,
//!   mutex-backed.
//!
//! The service layer owns all domain decisions; this crate only promises
//! that each operation is atomic.

mod error;
mod memory;
mod records;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use records::{ParticipantRecord, SessionRecord};
pub use store::{
    ParticipantMutation, ParticipantUpsert, SessionMutation, Store,
};
