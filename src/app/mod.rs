use crate::domain::{LogCounts, LogEntry, Session, Submission, build_hierarchy};
use serde_json::Value;
use std::sync::Arc;

/// Raw records plus the session tree derived from them.
#[derive(Clone, Debug, Default)]
pub struct DashboardData {
    records: Arc<Vec<Value>>,
    sessions: Arc<Vec<Session>>,
}

impl DashboardData {
    pub fn from_records(records: Arc<Vec<Value>>) -> Self {
        let sessions = Arc::new(build_hierarchy(&records));
        Self { records, sessions }
    }

    /// Rebuilds the tree unless `records` is the very allocation it was built from.
    pub fn with_records(&self, records: Arc<Vec<Value>>) -> Self {
        if Arc::ptr_eq(&self.records, &records) {
            return self.clone();
        }
        Self::from_records(records)
    }

    pub fn sessions(&self) -> &Arc<Vec<Session>> {
        &self.sessions
    }
}

#[derive(Clone, Debug)]
pub enum DashboardEvent {
    RecordsLoaded(Arc<Vec<Value>>),
    FetchFailed(String),
    SelectSession(String),
    SelectSubmission(String),
    ToggleExpand(String),
}

#[derive(Clone, Debug, Default)]
pub struct DashboardModel {
    pub data: DashboardData,
    pub selected_session_id: Option<String>,
    pub selected_submission_id: Option<String>,
    pub expanded_log_id: Option<String>,
    pub notice: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DashboardHeader {
    pub title: String,
    pub session_id: Option<String>,
    pub created_at: Option<i64>,
    pub total_logs: usize,
    pub counts: LogCounts,
}

impl DashboardModel {
    pub fn new(data: DashboardData) -> Self {
        let mut model = Self {
            data,
            ..Self::default()
        };
        model.ensure_session_selected();
        model
    }

    pub fn sessions(&self) -> &[Session] {
        self.data.sessions.as_slice()
    }

    pub fn selected_session(&self) -> Option<&Session> {
        let id = self.selected_session_id.as_deref()?;
        self.sessions().iter().find(|session| session.id == id)
    }

    pub fn selected_submission(&self) -> Option<&Submission> {
        let id = self.selected_submission_id.as_deref()?;
        self.selected_session()?.submission(id)
    }

    /// Returns false (and keeps the current selection) when no session has this id.
    pub fn select_session(&mut self, id: &str) -> bool {
        if !self.sessions().iter().any(|session| session.id == id) {
            return false;
        }
        self.selected_session_id = Some(id.to_string());
        self.reconcile_submission();
        true
    }

    /// Returns false when the selected session has no submission with this id.
    pub fn select_submission(&mut self, id: &str) -> bool {
        let exists = self
            .selected_session()
            .is_some_and(|session| session.submission(id).is_some());
        if exists {
            self.selected_submission_id = Some(id.to_string());
        }
        exists
    }

    /// Logs of the selected submission (else the selected session), oldest first.
    pub fn visible_logs(&self) -> Vec<&LogEntry> {
        let logs: &[LogEntry] = match (self.selected_submission(), self.selected_session()) {
            (Some(submission), _) => &submission.logs,
            (None, Some(session)) => &session.logs,
            (None, None) => &[],
        };
        let mut visible = logs.iter().collect::<Vec<_>>();
        visible.sort_by_key(|log| log.timestamp);
        visible
    }

    pub fn header(&self) -> DashboardHeader {
        let session = self.selected_session();
        let submission = self.selected_submission();

        let title = submission
            .map(|submission| submission.bug.clone())
            .or_else(|| session.map(|session| session.bug.clone()))
            .unwrap_or_else(|| "No session selected".to_string());
        let created_at = submission
            .map(|submission| submission.created_at)
            .or_else(|| session.map(|session| session.created_at));
        let counts = submission
            .map(|submission| submission.counts)
            .or_else(|| session.map(|session| session.counts))
            .unwrap_or_default();

        DashboardHeader {
            title,
            session_id: session.map(|session| session.id.clone()),
            created_at,
            total_logs: self.visible_logs().len(),
            counts,
        }
    }

    fn ensure_session_selected(&mut self) {
        if self.selected_session().is_none() {
            self.selected_session_id = self.sessions().first().map(|session| session.id.clone());
        }
        self.reconcile_submission();
    }

    // A submission selection never outlives its session.
    fn reconcile_submission(&mut self) {
        let Some(session) = self.selected_session() else {
            self.selected_submission_id = None;
            return;
        };
        let still_present = self
            .selected_submission_id
            .as_deref()
            .is_some_and(|id| session.submission(id).is_some());
        if !still_present {
            self.selected_submission_id = session
                .first_submission()
                .map(|submission| submission.id.clone());
        }
    }
}

pub fn update(model: DashboardModel, event: DashboardEvent) -> DashboardModel {
    let mut model = model;
    match event {
        DashboardEvent::RecordsLoaded(records) => {
            model.data = model.data.with_records(records);
            model.notice = None;
            model.ensure_session_selected();
            tracing::debug!(
                sessions = model.sessions().len(),
                selected = model.selected_session_id.as_deref().unwrap_or("-"),
                "records loaded"
            );
        }
        DashboardEvent::FetchFailed(error) => {
            tracing::warn!(%error, "failed to fetch records; keeping previous state");
            model.notice = Some(error);
        }
        DashboardEvent::SelectSession(id) => {
            if !model.select_session(&id) {
                model.notice = Some(format!("session not found: {id}"));
            }
        }
        DashboardEvent::SelectSubmission(id) => {
            if !model.select_submission(&id) {
                model.notice = Some(format!("submission not found: {id}"));
            }
        }
        DashboardEvent::ToggleExpand(id) => {
            model.expanded_log_id = if model.expanded_log_id.as_deref() == Some(id.as_str()) {
                None
            } else {
                Some(id)
            };
        }
    }
    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Arc<Vec<Value>> {
        Arc::new(vec![
            json!({"id": "1", "sessionId": "s1", "submissionId": "a", "type": "error", "message": "late", "timestamp": 30}),
            json!({"id": "2", "sessionId": "s1", "submissionId": "b", "type": "warn", "message": "b1", "timestamp": 10}),
            json!({"id": "3", "sessionId": "s1", "submissionId": "a", "type": "info", "message": "early", "timestamp": 20}),
            json!({"id": "4", "sessionId": "s2", "submissionId": "c", "type": "log", "message": "c1", "timestamp": 5}),
            json!({"id": "5", "sessionId": "s2", "submissionId": "b", "type": "log", "message": "b2", "timestamp": 6}),
        ])
    }

    fn loaded() -> DashboardModel {
        update(
            DashboardModel::default(),
            DashboardEvent::RecordsLoaded(records()),
        )
    }

    #[test]
    fn loading_selects_first_session_and_submission() {
        let model = loaded();
        assert_eq!(model.selected_session_id.as_deref(), Some("s1"));
        assert_eq!(model.selected_submission_id.as_deref(), Some("a"));

        let visible = model.visible_logs();
        let ids = visible.iter().map(|log| log.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["3", "1"]);
    }

    #[test]
    fn switching_session_resets_missing_submission() {
        let mut model = loaded();
        assert!(model.select_session("s2"));
        assert_eq!(model.selected_submission_id.as_deref(), Some("c"));
        assert_eq!(model.visible_logs()[0].id, "4");
    }

    #[test]
    fn switching_session_keeps_submission_present_in_both() {
        let mut model = loaded();
        assert!(model.select_submission("b"));
        assert!(model.select_session("s2"));
        assert_eq!(model.selected_submission_id.as_deref(), Some("b"));
        assert_eq!(model.visible_logs()[0].id, "5");
    }

    #[test]
    fn unknown_selections_are_rejected() {
        let model = loaded();
        let model = update(model, DashboardEvent::SelectSession("nope".to_string()));
        assert_eq!(model.selected_session_id.as_deref(), Some("s1"));
        assert_eq!(model.notice.as_deref(), Some("session not found: nope"));

        let model = update(model, DashboardEvent::SelectSubmission("c".to_string()));
        assert_eq!(model.selected_submission_id.as_deref(), Some("a"));
    }

    #[test]
    fn fetch_failure_keeps_previous_tree() {
        let model = loaded();
        let before = Arc::clone(model.data.sessions());
        let model = update(model, DashboardEvent::FetchFailed("timeout".to_string()));
        assert!(Arc::ptr_eq(&before, model.data.sessions()));
        assert_eq!(model.notice.as_deref(), Some("timeout"));
        assert_eq!(model.selected_session_id.as_deref(), Some("s1"));

        let empty = update(
            DashboardModel::default(),
            DashboardEvent::FetchFailed("offline".to_string()),
        );
        assert!(empty.sessions().is_empty());
        assert!(empty.visible_logs().is_empty());
        assert_eq!(empty.header().title, "No session selected");
    }

    #[test]
    fn same_records_reuse_the_tree() {
        let shared = records();
        let model = update(
            DashboardModel::default(),
            DashboardEvent::RecordsLoaded(Arc::clone(&shared)),
        );
        let before = Arc::clone(model.data.sessions());
        let model = update(model, DashboardEvent::RecordsLoaded(Arc::clone(&shared)));
        assert!(Arc::ptr_eq(&before, model.data.sessions()));

        let model = update(model, DashboardEvent::RecordsLoaded(records()));
        assert!(!Arc::ptr_eq(&before, model.data.sessions()));
    }

    #[test]
    fn reload_without_selected_session_falls_back_to_first() {
        let mut model = loaded();
        assert!(model.select_session("s2"));
        let only_s1 = Arc::new(vec![json!({"id": "9", "sessionId": "s1", "timestamp": 1})]);
        let model = update(model, DashboardEvent::RecordsLoaded(only_s1));
        assert_eq!(model.selected_session_id.as_deref(), Some("s1"));
        assert_eq!(model.selected_submission_id.as_deref(), Some("default"));
    }

    #[test]
    fn header_prefers_submission_over_session() {
        let model = loaded();
        let header = model.header();
        assert_eq!(header.title, "late");
        assert_eq!(header.session_id.as_deref(), Some("s1"));
        assert_eq!(header.created_at, Some(20));
        assert_eq!(header.total_logs, 2);
        assert_eq!(header.counts.error_count, 1);
        assert_eq!(header.counts.info_count, 1);
    }

    #[test]
    fn toggle_expand_opens_one_log_at_a_time() {
        let model = loaded();
        let model = update(model, DashboardEvent::ToggleExpand("1".to_string()));
        assert_eq!(model.expanded_log_id.as_deref(), Some("1"));
        let model = update(model, DashboardEvent::ToggleExpand("3".to_string()));
        assert_eq!(model.expanded_log_id.as_deref(), Some("3"));
        let model = update(model, DashboardEvent::ToggleExpand("3".to_string()));
        assert_eq!(model.expanded_log_id, None);
    }
}
