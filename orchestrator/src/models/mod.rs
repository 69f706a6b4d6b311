//! Domain models

pub mod deployment;
pub mod health;
pub mod slot;

pub use deployment::{DeploymentRecord, DeploymentState, RecordStatus, HISTORY_LIMIT};
pub use health::{HealthResult, HealthStatus};
pub use slot::Slot;
