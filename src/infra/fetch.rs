use crate::infra::{PayloadError, Settings, extract_records};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const BIN_NAME: &str = "stacksignal";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no API token configured (run `stacksignal token set <TOKEN>` or set STACKSIGNAL_TOKEN)")]
    MissingToken,

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} answered {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Fetches the authenticated user's records (`GET <api>/bug`).
pub fn fetch_records(settings: &Settings) -> Result<Vec<Value>, FetchError> {
    let token = settings.token.as_deref().ok_or(FetchError::MissingToken)?;
    let url = settings.records_url.as_str();
    let agent = make_agent(settings.timeout);

    tracing::debug!(%url, "fetching records");
    let mut response = agent
        .get(url)
        .header(
            "User-Agent",
            &format!("{BIN_NAME}/{}", env!("CARGO_PKG_VERSION")),
        )
        .header("Accept", "application/json")
        .header("Authorization", &format!("Bearer {token}"))
        .call()
        .map_err(|error| FetchError::Request {
            url: url.to_string(),
            message: error.to_string(),
        })?;

    let status = response.status();
    let body = response.body_mut().read_json::<Value>();

    if !status.is_success() {
        let message = body
            .ok()
            .as_ref()
            .and_then(|value| value.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
        tracing::warn!(%url, status = status.as_u16(), %message, "records request rejected");
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    let body = body.map_err(|error| FetchError::Decode {
        url: url.to_string(),
        message: error.to_string(),
    })?;
    let records = extract_records(body)?;
    tracing::debug!(records = records.len(), "records fetched");
    Ok(records)
}

fn make_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    config.into()
}
