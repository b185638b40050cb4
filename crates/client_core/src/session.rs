use std::collections::HashSet;

use shared::{
    domain::{LogEntry, SessionId, SessionStatus},
    error::ErrorCode,
};

/// Client-side view of one research run.
///
/// Fields are private: only the reducer mutates a session, and everything
/// handed to observers is a clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) topic: String,
    pub(crate) status: SessionStatus,
    pub(crate) log_lines: Vec<LogEntry>,
    pub(crate) sources: Vec<String>,
    /// Membership index over `sources`, which keeps first-seen order.
    pub(crate) known_sources: HashSet<String>,
    pub(crate) report: Option<String>,
    pub(crate) terminal_error: Option<String>,
    pub(crate) error_code: Option<ErrorCode>,
    pub(crate) plan: Vec<String>,
    pub(crate) draft: Option<String>,
    pub(crate) stage: Option<String>,
    pub(crate) node: Option<String>,
}

impl Session {
    pub fn new(topic: impl Into<String>) -> Self {
        Self::with_id(SessionId::new(), topic)
    }

    pub fn with_id(id: SessionId, topic: impl Into<String>) -> Self {
        Self {
            id,
            topic: topic.into(),
            status: SessionStatus::Idle,
            log_lines: Vec::new(),
            sources: Vec::new(),
            known_sources: HashSet::new(),
            report: None,
            terminal_error: None,
            error_code: None,
            plan: Vec::new(),
            draft: None,
            stage: None,
            node: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn log_lines(&self) -> &[LogEntry] {
        &self.log_lines
    }

    /// Discovered source URLs in first-seen order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    pub fn terminal_error(&self) -> Option<&str> {
        self.terminal_error.as_deref()
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }

    pub fn plan(&self) -> &[String] {
        &self.plan
    }

    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    /// Latest status line reported by the server, e.g. "Finished planner".
    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }
}
