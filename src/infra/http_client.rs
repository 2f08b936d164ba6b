use crate::error::{ConnectorError, Result};
use std::time::Duration;

/// Builds the HTTP client shared by the token exchange and the journal client.
///
/// Every request made through it is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("journal_connector/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConnectorError::Config(format!("failed to build HTTP client: {}", e)))
}
