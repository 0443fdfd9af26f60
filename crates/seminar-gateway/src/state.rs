//! Shared handler state.

use std::sync::Arc;

use seminar_live::Coordinator;
use seminar_session::{ParticipantRegistry, RoleAuthority, SessionLifecycle};

/// Everything a request handler needs, cheaply cloneable per request.
///
/// The lifecycle and registry handles are clones of the coordinator's
/// own, so REST and live mutations go through the same services and the
/// same store.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: SessionLifecycle,
    pub registry: ParticipantRegistry,
    pub coordinator: Arc<Coordinator>,
    pub authority: Arc<dyn RoleAuthority>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>, authority: Arc<dyn RoleAuthority>) -> Self {
        Self {
            lifecycle: coordinator.lifecycle().clone(),
            registry: coordinator.registry().clone(),
            coordinator,
            authority,
        }
    }
}
