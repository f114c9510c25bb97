use crate::domain::LogEntry;
use serde_json::{Map, Number, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

pub const MAX_PREVIEW_CHARS: usize = 160;

const ELLIPSIS: char = '…';
const GENERIC_OBJECT_KEYS: usize = 3;
const HTTP_CLIENT_ERROR_NAME: &str = "AxiosError";

pub fn preview(entry: &LogEntry) -> String {
    preview_with_limit(entry, MAX_PREVIEW_CHARS)
}

pub fn preview_with_limit(entry: &LogEntry, max_chars: usize) -> String {
    preview_args(&entry.payload.args, &entry.message, max_chars)
}

/// Single-line summary of console arguments, at most `max_chars` characters long.
pub fn preview_args(args: &[Value], message: &str, max_chars: usize) -> String {
    let text = if args.is_empty() {
        message.to_string()
    } else {
        args.iter()
            .map(format_arg_preview)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    };
    truncate_preview(text, max_chars)
}

pub fn format_arg_preview(arg: &Value) -> String {
    match arg {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => array_marker(items),
        Value::Object(object) => {
            if is_http_client_error(object) {
                format_http_client_error(object)
            } else if object.contains_key("status") || object.contains_key("url") {
                format_network_error(object)
            } else {
                format_generic_object(object)
            }
        }
        Value::Number(number) => js_number(number),
        Value::Bool(flag) => flag.to_string(),
    }
}

fn truncate_preview(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out = text.chars().take(max_chars - 1).collect::<String>();
    out.push(ELLIPSIS);
    out
}

fn array_marker(items: &[Value]) -> String {
    format!("[Array({})]", items.len())
}

// Best-effort: the error's own name, or a stack that mentions it.
fn is_http_client_error(object: &Map<String, Value>) -> bool {
    if object.get("name").and_then(Value::as_str) == Some(HTTP_CLIENT_ERROR_NAME) {
        return true;
    }
    match object.get("stack") {
        None | Some(Value::Null) => false,
        Some(stack) => scalar_text(stack).contains(HTTP_CLIENT_ERROR_NAME),
    }
}

fn format_http_client_error(object: &Map<String, Value>) -> String {
    let code = object
        .get("code")
        .filter(|code| is_truthy(code))
        .map(|code| format!(" [{}]", scalar_text(code)))
        .unwrap_or_default();
    let message = object
        .get("message")
        .filter(|message| !message.is_null())
        .map(scalar_text)
        .unwrap_or_default();

    let request = object
        .get("config")
        .and_then(Value::as_object)
        .map(request_from_config)
        .unwrap_or_default();
    let tail = [request.method, request.url]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    if tail.is_empty() {
        format!("{HTTP_CLIENT_ERROR_NAME}{code}: {message}")
    } else {
        format!("{HTTP_CLIENT_ERROR_NAME}{code}: {message} {tail}")
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct RequestSummary {
    method: Option<String>,
    url: Option<String>,
}

fn request_from_config(config: &Map<String, Value>) -> RequestSummary {
    let method = config
        .get("method")
        .filter(|method| is_truthy(method))
        .map(|method| scalar_text(method).to_uppercase());

    let raw_url = config
        .get("url")
        .filter(|url| is_truthy(url))
        .map(scalar_text);
    let base_url = config
        .get("baseURL")
        .filter(|base| is_truthy(base))
        .map(scalar_text);

    let url = match base_url {
        Some(base) => {
            let relative = raw_url.clone().unwrap_or_default();
            match Url::parse(&base).and_then(|base| base.join(&relative)) {
                Ok(resolved) => Some(resolved.to_string()),
                Err(_) => raw_url.or(Some(base)),
            }
        }
        None => raw_url,
    };

    RequestSummary { method, url }
}

fn format_network_error(object: &Map<String, Value>) -> String {
    let status = object
        .get("status")
        .filter(|status| !status.is_null())
        .map(|status| format!(" {}", scalar_text(status)))
        .unwrap_or_default();
    let url = object
        .get("url")
        .filter(|url| is_truthy(url))
        .map(|url| format!(" {}", scalar_text(url)))
        .unwrap_or_default();
    format!("XHR{status}{url}")
}

fn format_generic_object(object: &Map<String, Value>) -> String {
    let shown = object
        .iter()
        .take(GENERIC_OBJECT_KEYS)
        .map(|(key, value)| match value {
            Value::String(text) => format!("{key}: {text}"),
            Value::Array(items) => format!("{key}: {}", array_marker(items)),
            Value::Object(_) => format!("{key}: {{…}}"),
            other => format!("{key}: {}", type_name(other)),
        })
        .collect::<Vec<_>>()
        .join(", ");
    let more = if object.len() > GENERIC_OBJECT_KEYS {
        ", …"
    } else {
        ""
    };
    format!("{{ {shown}{more} }}")
}

// `null` names itself instead of reading as `object`.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String conversion for values embedded in a summary line.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => js_number(number),
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => scalar_text(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

// Integral floats print without a fractional part, as a browser console would.
fn js_number(number: &Number) -> String {
    if number.is_i64() || number.is_u64() {
        return number.to_string();
    }
    match number.as_f64() {
        Some(value) if value.fract() == 0.0 && value.abs() < 1e21 => format!("{value:.0}"),
        Some(value) => value.to_string(),
        None => number.to_string(),
    }
}

/// Expanded view of one log: full timestamp, every argument, and the stack trace.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogDetail {
    pub timestamp_rfc3339: String,
    pub args: Vec<String>,
    pub stack: Option<String>,
}

pub fn render_log_detail(entry: &LogEntry) -> LogDetail {
    let args = entry
        .rendered_args()
        .iter()
        .map(|arg| match arg {
            Value::String(text) => text.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        })
        .collect();

    LogDetail {
        timestamp_rfc3339: format_unix_ms_rfc3339(entry.timestamp),
        args,
        stack: entry
            .payload
            .stack
            .clone()
            .filter(|stack| !stack.trim().is_empty()),
    }
}

pub fn format_unix_ms_rfc3339(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|timestamp| timestamp.format(&Rfc3339).ok())
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DEFAULT_SUBMISSION_ID, LogPayload, LogType};
    use serde_json::json;

    fn entry(args: Vec<Value>, message: &str) -> LogEntry {
        LogEntry {
            id: "l1".to_string(),
            session_id: "s1".to_string(),
            timestamp: 1_771_451_157_762,
            log_type: LogType::Log,
            message: message.to_string(),
            payload: LogPayload { args, stack: None },
            submission_id: DEFAULT_SUBMISSION_ID.to_string(),
            submission_message: None,
        }
    }

    #[test]
    fn network_error_objects_render_as_xhr() {
        let log = entry(vec![json!({"status": 404, "url": "/x"})], "");
        assert_eq!(preview(&log), "XHR 404 /x");

        assert_eq!(format_arg_preview(&json!({"status": null, "url": ""})), "XHR");
        assert_eq!(format_arg_preview(&json!({"url": "/only"})), "XHR /only");
    }

    #[test]
    fn long_previews_are_truncated_with_ellipsis() {
        let log = entry(vec![json!("a".repeat(200))], "");
        let text = preview(&log);
        assert_eq!(text.chars().count(), MAX_PREVIEW_CHARS);
        assert!(text.ends_with('…'));
        assert!(text.starts_with(&"a".repeat(159)));

        let long_message = entry(Vec::new(), &"m".repeat(500));
        assert_eq!(preview(&long_message).chars().count(), MAX_PREVIEW_CHARS);

        assert_eq!(preview_with_limit(&log, 0), "");
        assert_eq!(preview_with_limit(&log, 1), "…");
    }

    #[test]
    fn generic_objects_show_three_keys() {
        let arg = json!({"a": "x", "b": [1, 2], "c": {}, "d": 1});
        assert_eq!(format_arg_preview(&arg), "{ a: x, b: [Array(2)], c: {…}, … }");

        let small = json!({"n": 1.5, "t": true, "z": null});
        assert_eq!(format_arg_preview(&small), "{ n: number, t: boolean, z: null }");
    }

    #[test]
    fn null_object_values_are_named_null() {
        assert_eq!(format_arg_preview(&json!({"user": null})), "{ user: null }");
        assert_eq!(
            format_arg_preview(&json!({"a": null, "b": {}, "c": null, "d": null})),
            "{ a: null, b: {…}, c: null, … }"
        );
    }

    #[test]
    fn empty_args_fall_back_to_message() {
        assert_eq!(preview(&entry(Vec::new(), "")), "");
        assert_eq!(preview(&entry(Vec::new(), "plain")), "plain");
    }

    #[test]
    fn arguments_are_joined_and_empty_parts_dropped() {
        let log = entry(
            vec![json!("GET failed"), Value::Null, json!([1, 2, 3]), json!(2.0), json!(false)],
            "",
        );
        assert_eq!(preview(&log), "GET failed [Array(3)] 2 false");
    }

    #[test]
    fn http_client_errors_resolve_against_base_url() {
        let arg = json!({
            "name": "AxiosError",
            "code": "ERR_BAD_REQUEST",
            "message": "Request failed with status code 404",
            "status": 404,
            "config": {"method": "get", "url": "/bug", "baseURL": "http://localhost:4000/api/v1/"}
        });
        assert_eq!(
            format_arg_preview(&arg),
            "AxiosError [ERR_BAD_REQUEST]: Request failed with status code 404 GET http://localhost:4000/bug"
        );

        let relative = json!({
            "name": "AxiosError",
            "message": "Network Error",
            "config": {"method": "post", "url": "report-bug", "baseURL": "http://localhost:4000/api/v1/"}
        });
        assert_eq!(
            format_arg_preview(&relative),
            "AxiosError: Network Error POST http://localhost:4000/api/v1/report-bug"
        );
    }

    #[test]
    fn http_client_errors_fall_back_to_raw_urls() {
        let bad_base = json!({
            "stack": "AxiosError: timeout\n    at foo",
            "message": "timeout",
            "config": {"url": "/x", "baseURL": "not a url"}
        });
        assert_eq!(format_arg_preview(&bad_base), "AxiosError: timeout /x");

        let no_config = json!({"name": "AxiosError", "message": "boom"});
        assert_eq!(format_arg_preview(&no_config), "AxiosError: boom");

        let bare = json!({"name": "AxiosError", "message": "m", "config": {"url": "/y"}});
        assert_eq!(format_arg_preview(&bare), "AxiosError: m /y");
    }

    #[test]
    fn detail_view_pretty_prints_structured_args() {
        let mut log = entry(vec![json!("text"), json!({"k": [1]})], "");
        log.payload.stack = Some("Error: x\n  at y".to_string());
        let detail = render_log_detail(&log);
        assert_eq!(detail.timestamp_rfc3339, "2026-02-18T21:45:57.762Z");
        assert_eq!(detail.args[0], "text");
        assert_eq!(detail.args[1], "{\n  \"k\": [\n    1\n  ]\n}");
        assert_eq!(detail.stack.as_deref(), Some("Error: x\n  at y"));
    }
}
