//! Live coordination for Seminar: rooms, presence broadcasts, forced
//! disconnects, and the expiry sweep.
//!
//! # Key types
//!
//! - [`Coordinator`] — orchestrates join/leave/disconnect, moderation,
//!   signaling, and time-driven closure across all rooms in this process
//! - [`RoomRoster`] — the process-local connection/room/hand-raise maps
//! - [`spawn_expiry_sweep`] — the background task that time-expires
//!   sessions with zero connected clients
//! - [`LiveConfig`] — sweep interval and connection timeout tunables
//!
//! State here is process-local by design: running several coordinating
//! instances would need a shared presence/broadcast layer behind the
//! same interfaces.

mod coordinator;
mod roster;
mod sweep;

pub use coordinator::{Coordinator, JoinOutcome, LiveConfig};
pub use roster::{ConnectionInfo, EventSender, RoomRoster};
pub use sweep::spawn_expiry_sweep;
