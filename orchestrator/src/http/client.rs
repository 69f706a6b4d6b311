//! HTTP client construction

use std::time::Duration;

use reqwest::Client;

use crate::errors::SlotError;
use crate::utils::version_info;

/// Upper bound for any single request. Callers set tighter per-request timeouts.
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared HTTP client used for slot probes
pub fn build_client() -> Result<Client, SlotError> {
    let client = Client::builder()
        .timeout(MAX_REQUEST_TIMEOUT)
        .user_agent(format!("slotctl/{}", version_info().version))
        .build()?;
    Ok(client)
}
