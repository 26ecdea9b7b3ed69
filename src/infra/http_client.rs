//! HTTP client factory with consistent timeout configuration.
//!
//! Gateway clients are built here rather than through `reqwest::Client`
//! directly so every outbound call carries the same timeouts.

use reqwest::Client;
use std::time::Duration;

use super::error::InfraError;

/// TCP handshake + TLS.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request/response time for payment provider APIs.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn try_build_client() -> Result<Client, InfraError> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .map_err(InfraError::HttpClient)
}
