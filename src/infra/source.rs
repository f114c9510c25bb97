use crate::infra::{FetchError, Settings, fetch_records};
use serde_json::Value;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecordSource {
    Api,
    File(PathBuf),
    Stdin,
}

impl RecordSource {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None => Self::Api,
            Some("-") => Self::Stdin,
            Some(path) => Self::File(PathBuf::from(path)),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Api => "api".to_string(),
            Self::File(path) => path.display().to_string(),
            Self::Stdin => "stdin".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("server rejected the request: {message}")]
    Rejected { message: String },

    #[error("expected a JSON array of records or an object with a `data` array, got {0}")]
    NotRecords(&'static str),
}

#[derive(Debug, Error)]
pub enum LoadSourceError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("failed to read stdin: {0}")]
    Stdin(io::Error),

    #[error("invalid json in {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

pub fn load_records(
    source: &RecordSource,
    settings: &Settings,
) -> Result<Vec<Value>, LoadSourceError> {
    match source {
        RecordSource::Api => Ok(fetch_records(settings)?),
        RecordSource::File(path) => {
            let text = fs::read_to_string(path).map_err(|source| LoadSourceError::Read {
                path: path.display().to_string(),
                source,
            })?;
            parse_records(&text, &path.display().to_string())
        }
        RecordSource::Stdin => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .map_err(LoadSourceError::Stdin)?;
            parse_records(&text, "stdin")
        }
    }
}

/// Parses a JSON document (array or API envelope), falling back to one record per line.
pub fn parse_records(text: &str, origin: &str) -> Result<Vec<Value>, LoadSourceError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(extract_records(value)?),
        Err(error) => parse_json_lines(text).ok_or_else(|| LoadSourceError::Parse {
            path: origin.to_string(),
            source: error,
        }),
    }
}

fn parse_json_lines(text: &str) -> Option<Vec<Value>> {
    let lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();
    if lines.len() < 2 {
        return None;
    }
    lines
        .into_iter()
        .map(|line| serde_json::from_str::<Value>(line).ok())
        .collect()
}

/// Unwraps the API envelope (`{ success, statusCode, message, data }`) when present.
pub fn extract_records(value: Value) -> Result<Vec<Value>, PayloadError> {
    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut object) => {
            if object.get("success").and_then(Value::as_bool) == Some(false) {
                let message = object
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("request failed")
                    .to_string();
                return Err(PayloadError::Rejected { message });
            }
            match object.remove("data") {
                Some(Value::Array(records)) => Ok(records),
                Some(Value::Null) | None if object.contains_key("statusCode") => Ok(Vec::new()),
                Some(other) => Err(PayloadError::NotRecords(json_kind(&other))),
                None => Err(PayloadError::NotRecords("object")),
            }
        }
        other => Err(PayloadError::NotRecords(json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
