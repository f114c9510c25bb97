use crate::app::{DashboardData, DashboardEvent, DashboardModel, update};
use crate::domain::{
    LogEntry, MAX_PREVIEW_CHARS, Session, now_unix_ms, preview_with_limit, render_log_detail,
};
use crate::infra::{
    LoadSourceError, RecordSource, Settings, TokenError, WatchError, WatchSignal, clear_token,
    load_records, save_token, token_path, watch_source_file,
};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;

const DEFAULT_LIMIT: usize = 20;
const BUG_COLUMN_WIDTH: usize = 80;
const WATCH_POLL: Duration = Duration::from_millis(500);
const WIDGET_SCRIPT_URL: &str =
    "https://cdn.jsdelivr.net/gh/Vedant43/StackSignal---widget/sdk/stacksignal.js";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliInvocation {
    PrintHelp,
    PrintVersion,
    Command(CliCommand),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CliCommand {
    Sessions {
        source: RecordSource,
        offset: usize,
        limit: usize,
        json: bool,
        watch: bool,
    },
    Submissions {
        source: RecordSource,
        session_id: Option<String>,
        json: bool,
    },
    Logs {
        source: RecordSource,
        session_id: Option<String>,
        submission_id: Option<String>,
        offset: usize,
        limit: usize,
        full: bool,
        json: bool,
    },
    Embed {
        client_id: Option<String>,
    },
    TokenSet {
        token: String,
    },
    TokenClear,
}

#[derive(Debug, Error)]
pub enum CliParseError {
    #[error("unknown subcommand: {0}")]
    UnknownSubcommand(String),

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("missing value for flag: {0}")]
    MissingFlagValue(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidFlagValue { flag: String, value: String },

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("missing argument: {0}")]
    MissingArgument(String),
}

pub fn parse_invocation(args: &[String]) -> Result<CliInvocation, CliParseError> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(CliInvocation::PrintHelp);
    }
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        return Ok(CliInvocation::PrintVersion);
    }

    let mut iter = args.iter().skip(1);
    let Some(subcommand) = iter.next() else {
        return Ok(CliInvocation::PrintHelp);
    };

    match subcommand.as_str() {
        "sessions" => {
            let mut source: Option<RecordSource> = None;
            let mut offset = 0usize;
            let mut limit = DEFAULT_LIMIT;
            let mut json = false;
            let mut watch = false;

            let mut args = iter.peekable();
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--limit" | "-l" => {
                        let value = args.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--limit".to_string())
                        })?;
                        limit = parse_usize_flag("--limit", value)?;
                    }
                    "--offset" | "-o" => {
                        let value = args.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--offset".to_string())
                        })?;
                        offset = parse_usize_flag("--offset", value)?;
                    }
                    "--json" => {
                        json = true;
                    }
                    "--watch" | "-w" => {
                        watch = true;
                    }
                    _ => set_source(&mut source, arg)?,
                }
            }

            Ok(CliInvocation::Command(CliCommand::Sessions {
                source: source.unwrap_or(RecordSource::Api),
                offset,
                limit,
                json,
                watch,
            }))
        }
        "submissions" => {
            let mut source: Option<RecordSource> = None;
            let mut session_id: Option<String> = None;
            let mut json = false;

            let mut args = iter.peekable();
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--session" | "-s" => {
                        let value = args.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--session".to_string())
                        })?;
                        session_id = Some(value.to_string());
                    }
                    "--json" => {
                        json = true;
                    }
                    _ => set_source(&mut source, arg)?,
                }
            }

            Ok(CliInvocation::Command(CliCommand::Submissions {
                source: source.unwrap_or(RecordSource::Api),
                session_id,
                json,
            }))
        }
        "logs" => {
            let mut source: Option<RecordSource> = None;
            let mut session_id: Option<String> = None;
            let mut submission_id: Option<String> = None;
            let mut offset = 0usize;
            let mut limit = DEFAULT_LIMIT;
            let mut full = false;
            let mut json = false;

            let mut args = iter.peekable();
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--session" | "-s" => {
                        let value = args.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--session".to_string())
                        })?;
                        session_id = Some(value.to_string());
                    }
                    "--submission" => {
                        let value = args.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--submission".to_string())
                        })?;
                        submission_id = Some(value.to_string());
                    }
                    "--limit" | "-l" => {
                        let value = args.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--limit".to_string())
                        })?;
                        limit = parse_usize_flag("--limit", value)?;
                    }
                    "--offset" | "-o" => {
                        let value = args.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--offset".to_string())
                        })?;
                        offset = parse_usize_flag("--offset", value)?;
                    }
                    "--full" => {
                        full = true;
                    }
                    "--json" => {
                        json = true;
                    }
                    _ => set_source(&mut source, arg)?,
                }
            }

            Ok(CliInvocation::Command(CliCommand::Logs {
                source: source.unwrap_or(RecordSource::Api),
                session_id,
                submission_id,
                offset,
                limit,
                full,
                json,
            }))
        }
        "embed" => {
            let mut client_id: Option<String> = None;

            let mut args = iter.peekable();
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--client-id" | "-c" => {
                        let value = args.next().ok_or_else(|| {
                            CliParseError::MissingFlagValue("--client-id".to_string())
                        })?;
                        client_id = Some(value.to_string());
                    }
                    _ if arg.starts_with('-') => {
                        return Err(CliParseError::UnknownFlag(arg.to_string()));
                    }
                    _ => {
                        return Err(CliParseError::UnexpectedArgument(arg.to_string()));
                    }
                }
            }

            Ok(CliInvocation::Command(CliCommand::Embed { client_id }))
        }
        "token" => {
            let action = iter
                .next()
                .ok_or_else(|| CliParseError::MissingArgument("set|clear".to_string()))?;
            let command = match action.as_str() {
                "set" => {
                    let token = iter
                        .next()
                        .ok_or_else(|| CliParseError::MissingArgument("TOKEN".to_string()))?;
                    CliCommand::TokenSet {
                        token: token.to_string(),
                    }
                }
                "clear" => CliCommand::TokenClear,
                other => return Err(CliParseError::UnknownSubcommand(format!("token {other}"))),
            };
            if let Some(extra) = iter.next() {
                return Err(CliParseError::UnexpectedArgument(extra.to_string()));
            }
            Ok(CliInvocation::Command(command))
        }
        other => Err(CliParseError::UnknownSubcommand(other.to_string())),
    }
}

fn set_source(source: &mut Option<RecordSource>, arg: &str) -> Result<(), CliParseError> {
    if arg.starts_with('-') && arg != "-" {
        return Err(CliParseError::UnknownFlag(arg.to_string()));
    }
    if source.is_some() {
        return Err(CliParseError::UnexpectedArgument(arg.to_string()));
    }
    *source = Some(RecordSource::from_arg(Some(arg)));
    Ok(())
}

#[derive(Debug, Error)]
pub enum CliRunError {
    #[error(transparent)]
    Load(#[from] LoadSourceError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("session not found: {0}\nHint: run `stacksignal sessions` and copy the session id column.")]
    SessionNotFound(String),

    #[error(
        "submission not found: {0}\nHint: run `stacksignal submissions --session <ID>` to list submission ids."
    )]
    SubmissionNotFound(String),

    #[error("no client id given (pass --client-id or set STACKSIGNAL_CLIENT_ID)")]
    MissingClientId,

    #[error("--watch needs a file SOURCE (got {0})")]
    WatchNeedsFile(String),

    #[error("failed to encode json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub fn run(command: CliCommand, settings: &Settings) -> Result<(), CliRunError> {
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let stderr = io::stderr();
    let mut err = io::BufWriter::new(stderr.lock());

    match command {
        CliCommand::Sessions {
            source,
            offset,
            limit,
            json,
            watch,
        } => {
            if !watch {
                let model = load_model(&source, settings)?;
                print_sessions(&mut out, &model, offset, limit, json)?;
                return Ok(());
            }

            let RecordSource::File(path) = &source else {
                return Err(CliRunError::WatchNeedsFile(source.label()));
            };
            let watcher = watch_source_file(path)?;
            let mut model = load_model(&source, settings)?;
            if !print_sessions(&mut out, &model, offset, limit, json)? {
                return Ok(());
            }
            out.flush()?;

            loop {
                match watcher.recv_timeout(WATCH_POLL) {
                    Some(WatchSignal::Changed) => {
                        watcher.drain();
                        model = match load_records(&source, settings) {
                            Ok(records) => {
                                update(model, DashboardEvent::RecordsLoaded(Arc::new(records)))
                            }
                            Err(error) => {
                                update(model, DashboardEvent::FetchFailed(error.to_string()))
                            }
                        };
                        if let Some(notice) = model.notice.as_deref() {
                            if !write_line(&mut err, notice)? {
                                return Ok(());
                            }
                            err.flush()?;
                            continue;
                        }
                        if !write_line(&mut out, "")?
                            || !print_sessions(&mut out, &model, offset, limit, json)?
                        {
                            return Ok(());
                        }
                        out.flush()?;
                    }
                    Some(WatchSignal::Error(error)) => {
                        tracing::warn!(%error, "watcher reported an error");
                    }
                    None => {}
                }
            }
        }
        CliCommand::Submissions {
            source,
            session_id,
            json,
        } => {
            let model = load_model(&source, settings)?;
            let model = select(model, session_id, None)?;
            let Some(session) = model.selected_session() else {
                return Ok(());
            };

            if json {
                let rendered = serde_json::to_string_pretty(&session.submissions)?;
                write_line(&mut out, &rendered)?;
                return Ok(());
            }

            for submission in &session.submissions {
                let line = format!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    submission.id,
                    format_clock(submission.created_at),
                    submission.counts.total_logs,
                    submission.counts.error_count,
                    submission.counts.warn_count,
                    submission.counts.info_count,
                    single_line(&submission.bug, BUG_COLUMN_WIDTH),
                );
                if !write_line(&mut out, &line)? {
                    return Ok(());
                }
            }
            Ok(())
        }
        CliCommand::Logs {
            source,
            session_id,
            submission_id,
            offset,
            limit,
            full,
            json,
        } => {
            let model = load_model(&source, settings)?;
            let model = select(model, session_id, submission_id)?;
            let logs = model
                .visible_logs()
                .into_iter()
                .skip(offset)
                .take(limit)
                .collect::<Vec<_>>();

            if json {
                let rendered = serde_json::to_string_pretty(&logs)?;
                write_line(&mut out, &rendered)?;
                return Ok(());
            }

            let header = model.header();
            let summary = format!(
                "{}\t{} logs\t{} errors\t{} warnings",
                single_line(&header.title, BUG_COLUMN_WIDTH),
                header.total_logs,
                header.counts.error_count,
                header.counts.warn_count,
            );
            if !write_line(&mut err, &summary)? {
                return Ok(());
            }
            err.flush()?;

            for log in logs {
                if !print_log(&mut out, log, full)? {
                    return Ok(());
                }
            }
            Ok(())
        }
        CliCommand::Embed { client_id } => {
            let client_id = client_id
                .or_else(|| settings.client_id.clone())
                .ok_or(CliRunError::MissingClientId)?;
            write_line(&mut out, &embed_snippet(&client_id))?;
            Ok(())
        }
        CliCommand::TokenSet { token } => {
            save_token(&settings.state_dir, &token)?;
            let line = format!("saved:\t{}", token_path(&settings.state_dir).display());
            write_line(&mut out, &line)?;
            Ok(())
        }
        CliCommand::TokenClear => {
            let line = if clear_token(&settings.state_dir)? {
                "cleared"
            } else {
                "no token stored"
            };
            write_line(&mut out, line)?;
            Ok(())
        }
    }
}

fn load_model(source: &RecordSource, settings: &Settings) -> Result<DashboardModel, CliRunError> {
    let records = load_records(source, settings)?;
    tracing::debug!(source = %source.label(), records = records.len(), "records loaded");
    Ok(DashboardModel::new(DashboardData::from_records(Arc::new(
        records,
    ))))
}

fn select(
    model: DashboardModel,
    session_id: Option<String>,
    submission_id: Option<String>,
) -> Result<DashboardModel, CliRunError> {
    let mut model = model;
    if let Some(id) = session_id {
        model = update(model, DashboardEvent::SelectSession(id.clone()));
        if model.selected_session_id.as_deref() != Some(id.as_str()) {
            return Err(CliRunError::SessionNotFound(id));
        }
    }
    if let Some(id) = submission_id {
        model = update(model, DashboardEvent::SelectSubmission(id.clone()));
        if model.selected_submission_id.as_deref() != Some(id.as_str()) {
            return Err(CliRunError::SubmissionNotFound(id));
        }
    }
    Ok(model)
}

fn print_sessions(
    out: &mut impl Write,
    model: &DashboardModel,
    offset: usize,
    limit: usize,
    json: bool,
) -> Result<bool, CliRunError> {
    let page = model
        .sessions()
        .iter()
        .skip(offset)
        .take(limit)
        .collect::<Vec<&Session>>();

    if json {
        let rendered = serde_json::to_string_pretty(&page)?;
        return Ok(write_line(out, &rendered)?);
    }

    let now = now_unix_ms();
    for session in page {
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            session.id,
            format_relative(now, session.created_at),
            session.counts.total_logs,
            session.submissions.len(),
            session.counts.error_count,
            single_line(&session.bug, BUG_COLUMN_WIDTH),
        );
        if !write_line(out, &line)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn print_log(out: &mut impl Write, log: &LogEntry, full: bool) -> io::Result<bool> {
    let line = format!(
        "{}\t{}\t{}",
        format_clock(log.timestamp),
        log.log_type.label(),
        preview_with_limit(log, MAX_PREVIEW_CHARS)
    );
    if !write_line(out, &line)? {
        return Ok(false);
    }
    if !full {
        return Ok(true);
    }

    let detail = render_log_detail(log);
    if !write_line(out, &format!("  time: {}", detail.timestamp_rfc3339))? {
        return Ok(false);
    }
    for (idx, arg) in detail.args.iter().enumerate() {
        if !write_line(out, &format!("  arg[{idx}]:"))? {
            return Ok(false);
        }
        for line in arg.lines() {
            if !write_line(out, &format!("    {line}"))? {
                return Ok(false);
            }
        }
    }
    if let Some(stack) = detail.stack {
        if !write_line(out, "  stack:")? {
            return Ok(false);
        }
        for line in stack.lines() {
            if !write_line(out, &format!("    {line}"))? {
                return Ok(false);
            }
        }
    }
    write_line(out, "")
}

pub fn embed_snippet(client_id: &str) -> String {
    format!(
        "<script src=\"{WIDGET_SCRIPT_URL}\"></script>\n<script>\n  window.StackSignalWidget.init({{\n    clientId: \"{client_id}\"\n  }});\n</script>"
    )
}

/// `12s ago`, `3m ago`, `2h ago`; future timestamps read as `0s ago`.
fn format_relative(now_ms: i64, ts_ms: i64) -> String {
    let seconds = now_ms.saturating_sub(ts_ms).max(0) / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    if hours > 0 {
        return format!("{hours}h ago");
    }
    if minutes > 0 {
        return format!("{minutes}m ago");
    }
    format!("{seconds}s ago")
}

// UTC wall-clock time.
fn format_clock(ms: i64) -> String {
    let format = format_description!("[hour]:[minute]:[second]");
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|timestamp| timestamp.format(format).ok())
        .unwrap_or_else(|| "--:--:--".to_string())
}

fn single_line(text: &str, width: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if unicode_width::UnicodeWidthStr::width(flat.as_str()) <= width {
        return flat;
    }
    let mut out = truncate_end(&flat, width.saturating_sub(1));
    out.push('…');
    out
}

fn truncate_end(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let ch_width = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + ch_width > width {
            break;
        }
        used += ch_width;
        out.push(ch);
    }
    out
}

fn write_line(out: &mut impl Write, line: &str) -> io::Result<bool> {
    match writeln!(out, "{line}") {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(false),
        Err(error) => Err(error),
    }
}

fn parse_usize_flag(flag: &str, value: &str) -> Result<usize, CliParseError> {
    value
        .parse::<usize>()
        .map_err(|_| CliParseError::InvalidFlagValue {
            flag: flag.to_string(),
            value: value.to_string(),
        })
}
