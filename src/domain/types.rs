use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session key used when a record carries no session identifier.
pub const UNKNOWN_SESSION_ID: &str = "unknown";

/// Submission key used when a record carries no submission identifier.
pub const DEFAULT_SUBMISSION_ID: &str = "default";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogType {
    Error,
    Warn,
    Info,
    Log,
    XhrError,
}

impl LogType {
    pub fn parse(value: &str) -> Self {
        match value {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "info" => Self::Info,
            "xhr-error" => Self::XhrError,
            _ => Self::Log,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Log => "log",
            Self::XhrError => "xhr-error",
        }
    }
}

impl From<String> for LogType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<LogType> for String {
    fn from(value: LogType) -> Self {
        value.label().to_string()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LogPayload {
    pub args: Vec<Value>,
    pub stack: Option<String>,
}

/// One observed client-side event. Immutable once normalized.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub session_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub message: String,
    #[serde(rename = "data")]
    pub payload: LogPayload,
    pub submission_id: String,
    pub submission_message: Option<String>,
}

impl LogEntry {
    /// Arguments as they should be displayed: the payload args, or the message when there are
    /// none.
    pub fn rendered_args(&self) -> Vec<Value> {
        if self.payload.args.is_empty() {
            vec![Value::String(self.message.clone())]
        } else {
            self.payload.args.clone()
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogCounts {
    pub total_logs: usize,
    pub error_count: usize,
    pub warn_count: usize,
    pub info_count: usize,
}

impl LogCounts {
    pub fn from_logs(logs: &[LogEntry]) -> Self {
        let mut counts = Self {
            total_logs: logs.len(),
            ..Self::default()
        };
        for log in logs {
            match log.log_type {
                LogType::Error => counts.error_count += 1,
                LogType::Warn => counts.warn_count += 1,
                LogType::Info => counts.info_count += 1,
                LogType::Log | LogType::XhrError => {}
            }
        }
        counts
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub bug: String,
    pub created_at: i64,
    pub logs: Vec<LogEntry>,
    #[serde(flatten)]
    pub counts: LogCounts,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub bug: String,
    pub created_at: i64,
    pub logs: Vec<LogEntry>,
    pub submissions: Vec<Submission>,
    #[serde(flatten)]
    pub counts: LogCounts,
}

impl Session {
    pub fn submission(&self, id: &str) -> Option<&Submission> {
        self.submissions.iter().find(|submission| submission.id == id)
    }

    pub fn first_submission(&self) -> Option<&Submission> {
        self.submissions.first()
    }
}

pub fn session_label(id: &str) -> String {
    format!("Session {id}")
}

pub fn submission_label(id: &str) -> String {
    format!("Submission {id}")
}
