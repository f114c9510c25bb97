use crate::domain::{
    DEFAULT_SUBMISSION_ID, LogEntry, LogPayload, LogType, UNKNOWN_SESSION_ID,
};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A raw record batch, classified once by looking at its first record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RawBatch<'a> {
    Empty,
    /// Each record is a session container with a `logs` array.
    PreGrouped(&'a [Value]),
    /// Each record is one bug report whose `data` array holds raw console entries.
    SubmissionReports(&'a [Value]),
    /// Each record is one log row.
    FlatRows(&'a [Value]),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BatchShape {
    Empty,
    PreGrouped,
    SubmissionReports,
    FlatRows,
}

impl RawBatch<'_> {
    pub fn shape(&self) -> BatchShape {
        match self {
            Self::Empty => BatchShape::Empty,
            Self::PreGrouped(_) => BatchShape::PreGrouped,
            Self::SubmissionReports(_) => BatchShape::SubmissionReports,
            Self::FlatRows(_) => BatchShape::FlatRows,
        }
    }
}

impl BatchShape {
    pub fn label(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::PreGrouped => "pre-grouped",
            Self::SubmissionReports => "submission-reports",
            Self::FlatRows => "flat-rows",
        }
    }
}

pub fn classify(records: &[Value]) -> RawBatch<'_> {
    let Some(first) = records.first() else {
        return RawBatch::Empty;
    };

    if first.get("logs").is_some_and(Value::is_array) {
        return RawBatch::PreGrouped(records);
    }
    let has_session_key = first
        .as_object()
        .is_some_and(|object| object.contains_key("sessionId"));
    if has_session_key && first.get("data").is_some_and(Value::is_array) {
        return RawBatch::SubmissionReports(records);
    }
    RawBatch::FlatRows(records)
}

/// How a record's description competes with descriptions already seen for the same session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DescriptionRule {
    /// Only the record that opened the session decides.
    FirstRecord,
    /// Every later non-empty description replaces the previous one.
    LatestNonEmpty,
}

/// What one raw record contributes to its session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionFragment {
    pub session_id: String,
    pub created_at: Option<i64>,
    pub description: Option<String>,
    pub description_rule: DescriptionRule,
    pub logs: Vec<LogEntry>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NormalizeReport {
    pub records: usize,
    pub non_object_records: usize,
    pub logs: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ingested {
    pub shape: BatchShape,
    pub fragments: Vec<SessionFragment>,
    pub report: NormalizeReport,
}

pub fn normalize(records: &[Value]) -> Vec<LogEntry> {
    normalize_at(records, now_unix_ms())
}

/// Same as [`normalize`], with `now_ms` standing in for the wall clock.
pub fn normalize_at(records: &[Value], now_ms: i64) -> Vec<LogEntry> {
    ingest_at(records, now_ms)
        .fragments
        .into_iter()
        .flat_map(|fragment| fragment.logs)
        .collect()
}

pub fn ingest_at(records: &[Value], now_ms: i64) -> Ingested {
    let batch = classify(records);
    let fragments = match batch {
        RawBatch::Empty => Vec::new(),
        RawBatch::PreGrouped(records) => records
            .iter()
            .map(|record| expand_session_container(record, now_ms))
            .collect(),
        RawBatch::SubmissionReports(records) => records
            .iter()
            .map(|record| expand_submission_report(record, now_ms))
            .collect(),
        RawBatch::FlatRows(records) => records
            .iter()
            .enumerate()
            .map(|(index, record)| expand_flat_row(record, index, now_ms))
            .collect::<Vec<_>>(),
    };

    let report = NormalizeReport {
        records: records.len(),
        non_object_records: records.iter().filter(|record| !record.is_object()).count(),
        logs: fragments.iter().map(|fragment| fragment.logs.len()).sum(),
    };
    tracing::debug!(
        shape = batch.shape().label(),
        records = report.records,
        logs = report.logs,
        "normalized raw records"
    );
    if report.non_object_records > 0 {
        tracing::warn!(
            count = report.non_object_records,
            "raw records that are not objects were read with default fields"
        );
    }

    Ingested {
        shape: batch.shape(),
        fragments,
        report,
    }
}

fn expand_session_container(record: &Value, now_ms: i64) -> SessionFragment {
    let session_id = id_field(record, "id")
        .or_else(|| id_field(record, "sessionId"))
        .unwrap_or_else(|| UNKNOWN_SESSION_ID.to_string());
    let created_at = timestamp_field(record, "createdAt");
    let fallback_ts = created_at.unwrap_or(now_ms);

    let logs = record
        .get("logs")
        .and_then(Value::as_array)
        .map(|logs| {
            logs.iter()
                .enumerate()
                .map(|(index, log)| {
                    let fallback_id = format!("{session_id}-{index}");
                    decode_log_row(log, &session_id, fallback_id, fallback_ts, false)
                })
                .collect()
        })
        .unwrap_or_default();

    SessionFragment {
        session_id,
        created_at,
        description: non_empty_str(record, "bug"),
        description_rule: DescriptionRule::FirstRecord,
        logs,
    }
}

fn expand_submission_report(record: &Value, now_ms: i64) -> SessionFragment {
    let session_id =
        id_field(record, "sessionId").unwrap_or_else(|| UNKNOWN_SESSION_ID.to_string());
    let created_at = timestamp_field(record, "createdAt");
    let fallback_ts = created_at.unwrap_or(now_ms);
    let report_id = id_field(record, "id").unwrap_or_else(|| session_id.clone());
    let report_message = record
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);
    let report_submission_id = id_field(record, "submissionId");

    let entries = record
        .get("data")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let logs = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let raw_args = entry.get("args").filter(|args| !args.is_null());
            let message = match raw_args {
                Some(Value::Array(args)) => join_args(args),
                _ => report_message.clone().unwrap_or_default(),
            };
            let args = match raw_args {
                Some(args) => args_vec(args),
                None => vec![Value::String(report_message.clone().unwrap_or_default())],
            };

            LogEntry {
                id: format!("{report_id}-{index}"),
                session_id: session_id.clone(),
                timestamp: timestamp_field(entry, "timestamp").unwrap_or(fallback_ts),
                log_type: log_type_field(entry),
                message,
                payload: LogPayload {
                    args,
                    stack: string_field(entry, "stack"),
                },
                submission_id: id_field(entry, "submissionId")
                    .or_else(|| report_submission_id.clone())
                    .unwrap_or_else(|| DEFAULT_SUBMISSION_ID.to_string()),
                submission_message: report_message.clone(),
            }
        })
        .collect();

    SessionFragment {
        session_id,
        created_at,
        description: non_empty_str(record, "message"),
        description_rule: DescriptionRule::LatestNonEmpty,
        logs,
    }
}

fn expand_flat_row(record: &Value, index: usize, now_ms: i64) -> SessionFragment {
    let session_id = id_field(record, "sessionId")
        .or_else(|| record.get("session").and_then(|session| id_field(session, "id")))
        .unwrap_or_else(|| UNKNOWN_SESSION_ID.to_string());
    let created_at = timestamp_field(record, "createdAt");
    let fallback_id = format!("{session_id}-{index}");
    let log = decode_log_row(
        record,
        &session_id,
        fallback_id,
        created_at.unwrap_or(now_ms),
        true,
    );

    SessionFragment {
        session_id,
        created_at,
        description: non_empty_str(record, "message"),
        description_rule: DescriptionRule::FirstRecord,
        logs: vec![log],
    }
}

/// Decodes a record that is already roughly LogEntry-shaped. Legacy rows (`message_as_submission`)
/// use their own `message` when they carry no `submissionMessage`.
fn decode_log_row(
    row: &Value,
    session_id: &str,
    fallback_id: String,
    fallback_ts: i64,
    message_as_submission: bool,
) -> LogEntry {
    let payload_value = row
        .get("data")
        .or_else(|| row.get("payload"))
        .filter(|payload| payload.is_object());
    let payload_args = payload_value
        .and_then(|payload| payload.get("args"))
        .filter(|args| !args.is_null())
        .map(args_vec);

    let message = match row.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => payload_args.as_deref().map(join_args).unwrap_or_default(),
    };
    let args = payload_args.unwrap_or_else(|| vec![Value::String(message.clone())]);
    let stack = payload_value.and_then(|payload| string_field(payload, "stack"));

    let submission_message = non_empty_str(row, "submissionMessage").or_else(|| {
        message_as_submission
            .then(|| row.get("message").and_then(Value::as_str).map(str::to_string))
            .flatten()
    });

    LogEntry {
        id: id_field(row, "id").unwrap_or(fallback_id),
        session_id: session_id.to_string(),
        timestamp: timestamp_field(row, "timestamp").unwrap_or(fallback_ts),
        log_type: log_type_field(row),
        message,
        payload: LogPayload { args, stack },
        submission_id: id_field(row, "submissionId")
            .or_else(|| row.get("submission").and_then(|sub| id_field(sub, "id")))
            .unwrap_or_else(|| DEFAULT_SUBMISSION_ID.to_string()),
        submission_message,
    }
}

/// Flattens console arguments into one line: strings verbatim, everything else as compact JSON.
pub fn join_args(args: &[Value]) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn args_vec(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(args) => args.clone(),
        other => vec![other.clone()],
    }
}

fn log_type_field(value: &Value) -> LogType {
    value
        .get("type")
        .and_then(Value::as_str)
        .map(LogType::parse)
        .unwrap_or(LogType::Log)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

/// Identifiers may arrive as strings or numbers; blank strings count as missing.
fn id_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Accepts epoch milliseconds (integer or float) or an RFC 3339 string.
pub fn timestamp_field(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|ms| ms.is_finite())
                .map(|ms| ms.trunc() as i64)
        }),
        Value::String(text) => parse_rfc3339_to_unix_ms(text).or_else(|| text.trim().parse().ok()),
        _ => None,
    }
}

pub fn parse_rfc3339_to_unix_ms(value: &str) -> Option<i64> {
    let timestamp = OffsetDateTime::parse(value.trim(), &Rfc3339).ok()?;
    let ms: i128 = timestamp.unix_timestamp_nanos() / 1_000_000;
    i64::try_from(ms).ok()
}

pub fn now_unix_ms() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    i64::try_from(now).unwrap_or(i64::MAX)
}
