//! Shared HTTP client construction and response classification.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;

use crate::error::{DepositError, Result};

pub(crate) const USER_AGENT: &str = concat!("depo/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Slowest sustained rate a file transfer may run at before it times out.
pub const MIN_TRANSFER_BYTES_PER_SEC: u64 = 256 * 1024;

/// Build a blocking client with the depo user agent.
///
/// `timeout` bounds connecting and is the whole-request deadline for API
/// calls. File transfers override it with [`transfer_timeout`].
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|e| DepositError::Network {
            context: "building HTTP client".to_string(),
            detail: e.to_string(),
        })
}

/// Deadline for moving `bytes` in one request: the API timeout plus the time
/// the transfer takes at [`MIN_TRANSFER_BYTES_PER_SEC`].
pub fn transfer_timeout(timeout: Duration, bytes: u64) -> Duration {
    timeout.saturating_add(Duration::from_secs(bytes / MIN_TRANSFER_BYTES_PER_SEC))
}

/// Map non-success responses onto the error taxonomy.
///
/// `what` names the resource for `NotFound`; `context` names the step.
pub(crate) fn check_status(response: Response, context: &str, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response
        .text()
        .map(|body| truncate(&body, 300))
        .unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => DepositError::NotFound {
            what: what.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DepositError::AuthRequired {
            detail: format!("{context} rejected with HTTP {}: {detail}", status.as_u16()),
        },
        _ => DepositError::Service {
            context: context.to_string(),
            status: status.as_u16(),
            detail,
        },
    })
}

fn truncate(body: &str, max: usize) -> String {
    let body = body.trim();
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
