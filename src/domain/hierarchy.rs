use crate::domain::{
    DescriptionRule, LogCounts, LogEntry, Session, SessionFragment, Submission, ingest_at,
    now_unix_ms, session_label, submission_label,
};
use serde_json::Value;
use std::collections::HashMap;

pub fn build_hierarchy(records: &[Value]) -> Vec<Session> {
    build_hierarchy_at(records, now_unix_ms())
}

pub fn build_hierarchy_at(records: &[Value], now_ms: i64) -> Vec<Session> {
    let ingested = ingest_at(records, now_ms);
    assemble_sessions(ingested.fragments, now_ms)
}

struct SessionAccumulator {
    id: String,
    bug: Option<String>,
    created_at: Option<i64>,
    logs: Vec<LogEntry>,
}

/// Folds record fragments into sessions keyed by session id, in order of first appearance.
pub fn assemble_sessions(fragments: Vec<SessionFragment>, now_ms: i64) -> Vec<Session> {
    let mut order: Vec<SessionAccumulator> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for fragment in fragments {
        let position = match positions.get(&fragment.session_id) {
            Some(position) => {
                let acc = &mut order[*position];
                if fragment.description_rule == DescriptionRule::LatestNonEmpty
                    && fragment.description.is_some()
                {
                    acc.bug = fragment.description.clone();
                }
                *position
            }
            None => {
                positions.insert(fragment.session_id.clone(), order.len());
                order.push(SessionAccumulator {
                    id: fragment.session_id.clone(),
                    bug: fragment.description.clone(),
                    created_at: None,
                    logs: Vec::new(),
                });
                order.len() - 1
            }
        };

        let acc = &mut order[position];
        acc.created_at = min_option(acc.created_at, fragment.created_at);
        for log in fragment.logs {
            acc.created_at = min_option(acc.created_at, Some(log.timestamp));
            acc.logs.push(log);
        }
    }

    order
        .into_iter()
        .map(|acc| {
            let submissions = group_by_submission(&acc.logs);
            Session {
                bug: acc.bug.unwrap_or_else(|| session_label(&acc.id)),
                created_at: acc.created_at.unwrap_or(now_ms),
                counts: LogCounts::from_logs(&acc.logs),
                submissions,
                logs: acc.logs,
                id: acc.id,
            }
        })
        .collect()
}

/// Groups one session's logs by submission id. Submissions keep first-appearance order and
/// their logs keep arrival order.
pub fn group_by_submission(logs: &[LogEntry]) -> Vec<Submission> {
    let mut order: Vec<(String, Option<String>, i64, Vec<LogEntry>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for log in logs {
        let position = *positions
            .entry(log.submission_id.as_str())
            .or_insert_with(|| {
                order.push((log.submission_id.clone(), None, log.timestamp, Vec::new()));
                order.len() - 1
            });
        let (_, bug, created_at, members) = &mut order[position];
        if bug.is_none() {
            *bug = log
                .submission_message
                .as_deref()
                .filter(|message| !message.trim().is_empty())
                .map(str::to_string);
        }
        *created_at = (*created_at).min(log.timestamp);
        members.push(log.clone());
    }

    order
        .into_iter()
        .map(|(id, bug, created_at, members)| Submission {
            bug: bug.unwrap_or_else(|| submission_label(&id)),
            created_at,
            counts: LogCounts::from_logs(&members),
            logs: members,
            id,
        })
        .collect()
}

/// Every session's logs in tree order. Sessions without logs have no row here, so a tree
/// rebuilt from this output omits them.
pub fn flattened_logs(sessions: &[Session]) -> Vec<LogEntry> {
    sessions
        .iter()
        .flat_map(|session| session.logs.iter().cloned())
        .collect()
}

fn min_option(current: Option<i64>, candidate: Option<i64>) -> Option<i64> {
    match (current, candidate) {
        (Some(current), Some(candidate)) => Some(current.min(candidate)),
        (current, candidate) => current.or(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DEFAULT_SUBMISSION_ID, LogType, UNKNOWN_SESSION_ID};
    use serde_json::json;
    use std::collections::BTreeSet;

    const NOW: i64 = 9_000_000;

    fn ids(logs: &[LogEntry]) -> BTreeSet<String> {
        logs.iter().map(|log| log.id.clone()).collect()
    }

    #[test]
    fn groups_flat_rows_into_one_session() {
        let records = vec![
            json!({"sessionId": "s1", "type": "error", "message": "boom", "timestamp": 100}),
            json!({"sessionId": "s1", "type": "log", "message": "ok", "timestamp": 50}),
        ];
        let sessions = build_hierarchy_at(&records, NOW);
        assert_eq!(sessions.len(), 1);

        let session = &sessions[0];
        assert_eq!(session.id, "s1");
        assert_eq!(session.created_at, 50);
        assert_eq!(session.counts.total_logs, 2);
        assert_eq!(session.counts.error_count, 1);
        assert_eq!(session.bug, "boom");
        assert_eq!(session.submissions.len(), 1);
        assert_eq!(session.submissions[0].id, DEFAULT_SUBMISSION_ID);
        assert_eq!(session.submissions[0].bug, "boom");
        assert_eq!(session.submissions[0].created_at, 50);
    }

    #[test]
    fn submissions_partition_each_session() {
        let records = vec![
            json!({"id": "1", "sessionId": "a", "submissionId": "x", "type": "warn", "timestamp": 3}),
            json!({"id": "2", "sessionId": "b", "type": "info", "timestamp": 9}),
            json!({"id": "3", "sessionId": "a", "submissionId": "y", "type": "error", "timestamp": 1}),
            json!({"id": "4", "sessionId": "a", "submissionId": "x", "type": "info", "timestamp": 2}),
            json!({"id": "5", "type": "xhr-error", "timestamp": 4}),
        ];
        let sessions = build_hierarchy_at(&records, NOW);
        let session_ids = sessions.iter().map(|s| s.id.as_str()).collect::<Vec<_>>();
        assert_eq!(session_ids, vec!["a", "b", UNKNOWN_SESSION_ID]);

        let total: usize = sessions.iter().map(|s| s.counts.total_logs).sum();
        assert_eq!(total, records.len());

        for session in &sessions {
            let union = session
                .submissions
                .iter()
                .flat_map(|sub| sub.logs.iter().cloned())
                .collect::<Vec<_>>();
            assert_eq!(union.len(), session.logs.len());
            assert_eq!(ids(&union), ids(&session.logs));

            for submission in &session.submissions {
                assert!(submission.logs.iter().all(|log| log.submission_id == submission.id));
                assert!(submission.logs.iter().all(|log| submission.created_at <= log.timestamp));
            }
            assert!(session.logs.iter().all(|log| session.created_at <= log.timestamp));
        }

        let a = &sessions[0];
        let sub_ids = a.submissions.iter().map(|s| s.id.as_str()).collect::<Vec<_>>();
        assert_eq!(sub_ids, vec!["x", "y"]);
        assert_eq!(a.created_at, 1);
        assert_eq!(a.submissions[0].created_at, 2);
        assert_eq!(a.submissions[0].counts.warn_count, 1);
        assert_eq!(a.submissions[0].counts.info_count, 1);
        assert_eq!(a.submissions[0].bug, "Submission x");
        assert_eq!(a.bug, "Session a");

        let unknown = &sessions[2];
        assert_eq!(unknown.counts.total_logs, 1);
        assert_eq!(unknown.counts.error_count, 0);
        assert_eq!(unknown.logs[0].log_type, LogType::XhrError);
    }

    #[test]
    fn running_minimum_uses_every_record() {
        let records = vec![
            json!({"id": "r1", "sessionId": "s", "createdAt": 500, "message": "first", "data": [{"timestamp": 700}]}),
            json!({"id": "r2", "sessionId": "s", "createdAt": 900, "message": "", "data": [{"timestamp": 120}]}),
            json!({"id": "r3", "sessionId": "s", "createdAt": 300, "message": "third", "data": []}),
        ];
        let sessions = build_hierarchy_at(&records, NOW);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].created_at, 120);
        assert_eq!(sessions[0].bug, "third");
        assert_eq!(sessions[0].counts.total_logs, 2);
    }

    #[test]
    fn submission_description_is_first_non_empty_message() {
        let records = vec![
            json!({"id": "r1", "sessionId": "s", "submissionId": "q", "message": "", "data": [{"timestamp": 5}]}),
            json!({"id": "r2", "sessionId": "s", "submissionId": "q", "message": "cart empty", "data": [{"timestamp": 6}]}),
            json!({"id": "r3", "sessionId": "s", "submissionId": "q", "message": "later text", "data": [{"timestamp": 4}]}),
        ];
        let sessions = build_hierarchy_at(&records, NOW);
        let submission = &sessions[0].submissions[0];
        assert_eq!(submission.bug, "cart empty");
        assert_eq!(submission.created_at, 4);
        assert_eq!(sessions[0].bug, "later text");
    }

    #[test]
    fn pre_grouped_sessions_get_submissions_and_counts() {
        let records = vec![
            json!({"id": "s1", "bug": "crash", "logs": [
                {"id": "a", "type": "error", "timestamp": 20, "submissionId": "one", "submissionMessage": "it crashed"},
                {"id": "b", "type": "warn", "timestamp": 10, "submissionId": "two"}
            ]}),
            json!({"id": "s2", "logs": []}),
        ];
        let sessions = build_hierarchy_at(&records, NOW);
        assert_eq!(sessions[0].bug, "crash");
        assert_eq!(sessions[0].created_at, 10);
        assert_eq!(sessions[0].submissions.len(), 2);
        assert_eq!(sessions[0].submissions[0].bug, "it crashed");
        assert_eq!(sessions[0].submissions[1].bug, "Submission two");

        assert_eq!(sessions[1].bug, "Session s2");
        assert_eq!(sessions[1].created_at, NOW);
        assert!(sessions[1].submissions.is_empty());
    }

    #[test]
    fn rebuilding_from_flattened_logs_is_stable() {
        let records = vec![
            json!({"id": "r1", "sessionId": "s1", "message": "bug one", "createdAt": 10, "data": [
                {"type": "error", "args": ["a"], "timestamp": 11},
                {"type": "info", "args": [{"k": 1}], "timestamp": 12, "submissionId": "p"}
            ]}),
            json!({"id": "r2", "sessionId": "s2", "data": [{"type": "warn", "args": ["w"]}]}),
            json!({"id": "r3", "sessionId": "s1", "message": "bug two", "data": [{"args": []}]}),
        ];
        let first = build_hierarchy_at(&records, NOW);
        let flattened = flattened_logs(&first)
            .iter()
            .map(|log| serde_json::to_value(log).expect("serialize"))
            .collect::<Vec<_>>();
        let second = build_hierarchy_at(&flattened, NOW);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.counts, b.counts);
            assert_eq!(ids(&a.logs), ids(&b.logs));
            assert_eq!(a.submissions.len(), b.submissions.len());
            for (sa, sb) in a.submissions.iter().zip(b.submissions.iter()) {
                assert_eq!(sa.id, sb.id);
                assert_eq!(sa.counts, sb.counts);
                assert_eq!(ids(&sa.logs), ids(&sb.logs));
                assert_eq!(sa.created_at, sb.created_at);
            }
        }
    }

    #[test]
    fn pre_grouped_log_message_is_not_a_submission_description() {
        let records = vec![json!({"id": "s1", "bug": "checkout crash", "logs": [
            {"id": "a", "type": "error", "message": "TypeError: x is undefined", "submissionId": "q", "timestamp": 1}
        ]})];
        let sessions = build_hierarchy_at(&records, NOW);
        assert_eq!(sessions[0].bug, "checkout crash");
        assert_eq!(sessions[0].submissions[0].bug, "Submission q");
        assert_eq!(sessions[0].logs[0].submission_message, None);
        assert_eq!(sessions[0].logs[0].message, "TypeError: x is undefined");
    }

    #[test]
    fn flat_row_message_still_describes_its_submission() {
        let records = vec![json!({"sessionId": "s1", "submissionId": "q", "message": "pay button dead", "timestamp": 1})];
        let sessions = build_hierarchy_at(&records, NOW);
        assert_eq!(sessions[0].submissions[0].bug, "pay button dead");
    }

    #[test]
    fn sessions_without_logs_do_not_survive_flattening() {
        let records = vec![
            json!({"id": "s1", "logs": [{"id": "a", "timestamp": 5}]}),
            json!({"id": "s2", "logs": []}),
        ];
        let first = build_hierarchy_at(&records, NOW);
        assert_eq!(first.len(), 2);

        let flattened = flattened_logs(&first)
            .iter()
            .map(|log| serde_json::to_value(log).expect("serialize"))
            .collect::<Vec<_>>();
        let second = build_hierarchy_at(&flattened, NOW);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "s1");
        assert_eq!(second[0].counts, first[0].counts);
    }

    #[test]
    fn empty_input_builds_nothing() {
        assert!(build_hierarchy_at(&[], NOW).is_empty());
    }
}
