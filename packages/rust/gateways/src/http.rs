//! HTTP plumbing shared by the remote gateway clients.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response};

use pitchmatch_shared::{PipelineStep, PitchMatchError, Result};

/// User-Agent string for gateway requests.
const USER_AGENT: &str = concat!("pitchmatch/", env!("CARGO_PKG_VERSION"));

/// Longest error body echoed back into an error message.
const MAX_ERROR_BODY: usize = 300;

/// Build a JSON client with a per-request timeout and default headers.
pub(crate) fn build_client(timeout: Duration, mut headers: HeaderMap) -> Result<Client> {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| PitchMatchError::config(format!("failed to build HTTP client: {e}")))
}

/// Header value from a secret, without echoing the secret on failure.
pub(crate) fn secret_header(value: &str) -> Result<HeaderValue> {
    let mut header = HeaderValue::from_str(value.trim())
        .map_err(|_| PitchMatchError::config("API key contains invalid header characters"))?;
    header.set_sensitive(true);
    Ok(header)
}

/// Map a transport-level failure. Timeouts become deadline errors.
pub(crate) fn transport_error(step: PipelineStep, timeout: Duration, err: reqwest::Error) -> PitchMatchError {
    if err.is_timeout() {
        PitchMatchError::DeadlineExceeded {
            step: Some(step),
            after: timeout,
        }
    } else {
        PitchMatchError::upstream(step, format!("request failed: {err}"))
    }
}

/// Pass successful responses through; turn anything else into an upstream error.
pub(crate) async fn check_status(step: PipelineStep, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    Err(PitchMatchError::upstream(step, format!("HTTP {status}: {body}")))
}
