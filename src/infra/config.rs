use crate::infra::{TokenError, load_token};
use dirs::home_dir;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_ORIGIN: &str = "http://localhost:4000";
const API_PREFIX: &str = "api/v1/";
const RECORDS_PATH: &str = "bug";
const DEFAULT_TIMEOUT_MS: u64 = 8_000;

const ENV_API_URL: &str = "STACKSIGNAL_API_URL";
const ENV_TOKEN: &str = "STACKSIGNAL_TOKEN";
const ENV_STATE_DIR: &str = "STACKSIGNAL_STATE_DIR";
const ENV_CLIENT_ID: &str = "STACKSIGNAL_CLIENT_ID";
const ENV_TIMEOUT_MS: &str = "STACKSIGNAL_TIMEOUT_MS";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Settings {
    pub api_base: Url,
    pub records_url: Url,
    pub token: Option<String>,
    pub state_dir: PathBuf,
    pub client_id: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("home directory not found (set STACKSIGNAL_STATE_DIR)")]
    HomeDirNotFound,

    #[error("invalid STACKSIGNAL_API_URL value {value}: {source}")]
    InvalidApiUrl {
        value: String,
        source: url::ParseError,
    },

    #[error("invalid STACKSIGNAL_TIMEOUT_MS value: {0}")]
    InvalidTimeout(String),

    #[error(transparent)]
    Token(#[from] TokenError),
}

pub fn resolve_settings() -> Result<Settings, ConfigError> {
    resolve_settings_from(|key| std::env::var(key).ok())
}

/// Resolves settings from an arbitrary variable lookup; blank values count as unset.
pub fn resolve_settings_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Settings, ConfigError> {
    let var = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let state_dir = match var(ENV_STATE_DIR) {
        Some(dir) => PathBuf::from(dir),
        None => home_dir()
            .ok_or(ConfigError::HomeDirNotFound)?
            .join(".stacksignal"),
    };

    let origin = var(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_ORIGIN.to_string());
    let api_base = parse_api_base(&origin)?;
    let records_url = api_base
        .join(RECORDS_PATH)
        .map_err(|source| ConfigError::InvalidApiUrl {
            value: origin.clone(),
            source,
        })?;

    let timeout = match var(ENV_TIMEOUT_MS) {
        Some(raw) => {
            let ms = raw
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or(ConfigError::InvalidTimeout(raw))?;
            Duration::from_millis(ms)
        }
        None => Duration::from_millis(DEFAULT_TIMEOUT_MS),
    };

    let token = match var(ENV_TOKEN) {
        Some(token) => Some(token),
        None => load_token(&state_dir)?,
    };

    Ok(Settings {
        api_base,
        records_url,
        token,
        state_dir,
        client_id: var(ENV_CLIENT_ID),
        timeout,
    })
}

fn parse_api_base(origin: &str) -> Result<Url, ConfigError> {
    let invalid = |source| ConfigError::InvalidApiUrl {
        value: origin.to_string(),
        source,
    };
    let mut base = Url::parse(origin).map_err(invalid)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(API_PREFIX).map_err(invalid)
}
