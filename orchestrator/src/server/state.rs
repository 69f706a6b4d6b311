//! Server state

use std::sync::Arc;

use crate::monitor::rollback::RollbackMonitor;
use crate::status::StatusReporter;

/// Server state shared across handlers
pub struct ServerState {
    pub reporter: Arc<StatusReporter>,
    pub monitor: Option<Arc<RollbackMonitor>>,
}

impl ServerState {
    pub fn new(reporter: Arc<StatusReporter>, monitor: Option<Arc<RollbackMonitor>>) -> Self {
        Self { reporter, monitor }
    }
}
