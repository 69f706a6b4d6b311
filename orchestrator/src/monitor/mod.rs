//! Automated failback monitoring

pub mod error_rate;
pub mod notify;
pub mod rollback;
