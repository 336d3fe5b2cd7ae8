use crate::session::{ServiceStatus, SessionHandler};
use crate::vehicle::CommandExecutor;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Recording sessions and recognition
    pub handler: Arc<SessionHandler>,

    /// Mapping and signal execution
    pub executor: Arc<CommandExecutor>,

    pub status: ServiceStatus,
}

impl AppState {
    pub fn new(handler: Arc<SessionHandler>, executor: Arc<CommandExecutor>, status: ServiceStatus) -> Self {
        Self {
            handler,
            executor,
            status,
        }
    }
}
