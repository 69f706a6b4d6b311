//! Wire models shared between the orchestrator and slot backends.

pub mod models;

pub use models::{DatabaseState, HealthPayload, HEALTHY};
