//! Session state transitions.
//!
//! Every mutation of a [`Session`] goes through one of the functions here.
//! Once a session is terminal each of them is a no-op returning
//! [`Outcome::Ignored`].

use shared::domain::{LogEntry, LogKind, SessionStatus};

use crate::{
    decoder::{Progress, SessionEvent},
    session::Session,
};

/// What a transition did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// State changed and the session is still live.
    Applied,
    /// State changed and the session just became terminal.
    Terminal,
    /// Nothing changed.
    Ignored,
}

impl Outcome {
    pub fn changed(self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

pub fn apply(session: &mut Session, event: &SessionEvent) -> Outcome {
    if session.is_terminal() {
        return Outcome::Ignored;
    }

    match event {
        SessionEvent::Progress(progress) => {
            apply_progress(session, progress);
            Outcome::Applied
        }
        SessionEvent::Completed { report } => {
            session.report = Some(report.clone());
            session.status = SessionStatus::Completed;
            Outcome::Terminal
        }
        SessionEvent::Failed { message, code } => {
            session.terminal_error = Some(message.clone());
            session.error_code = *code;
            session.status = SessionStatus::Failed;
            Outcome::Terminal
        }
    }
}

fn apply_progress(session: &mut Session, progress: &Progress) {
    advance(session, SessionStatus::Running);

    session.log_lines.extend(progress.log_lines.iter().map(|message| LogEntry {
        origin_node: progress.node_label.clone(),
        message: message.clone(),
        received_at: progress.received_at,
        kind: progress.level.unwrap_or_else(|| LogKind::sniff(message)),
    }));

    for source in &progress.discovered_sources {
        let source = source.trim();
        if source.is_empty() || session.known_sources.contains(source) {
            continue;
        }
        session.known_sources.insert(source.to_string());
        session.sources.push(source.to_string());
    }

    if let Some(plan) = &progress.plan {
        session.plan.clone_from(plan);
    }
    if progress.draft.is_some() {
        session.draft.clone_from(&progress.draft);
    }
    if progress.status.is_some() {
        session.stage.clone_from(&progress.status);
    }
    if progress.node_label.is_some() {
        session.node.clone_from(&progress.node_label);
    }
}

/// `idle -> connecting`, done by the controller right before it opens a
/// transport.
pub fn begin_connecting(session: &mut Session) -> Outcome {
    if advance(session, SessionStatus::Connecting) {
        Outcome::Applied
    } else {
        Outcome::Ignored
    }
}

/// The start request went out on an open connection.
pub fn mark_opened(session: &mut Session) -> Outcome {
    if advance(session, SessionStatus::Running) {
        Outcome::Applied
    } else {
        Outcome::Ignored
    }
}

/// The connection ended cleanly. Before a terminal frame this means the
/// backend broke its contract, which the session records as a failure.
pub fn transport_closed(session: &mut Session, reason: Option<&str>) -> Outcome {
    let message = match reason {
        Some(reason) if !reason.is_empty() => {
            format!("connection closed before research finished: {reason}")
        }
        _ => "connection closed before research finished".to_string(),
    };
    fail(session, message)
}

pub fn transport_failed(session: &mut Session, reason: &str) -> Outcome {
    fail(session, format!("connection failed: {reason}"))
}

/// Client-chosen end of a live session. Idle sessions have nothing to cancel.
pub fn cancel(session: &mut Session) -> Outcome {
    if session.status == SessionStatus::Idle || session.is_terminal() {
        return Outcome::Ignored;
    }
    session.status = SessionStatus::Cancelled;
    Outcome::Terminal
}

fn fail(session: &mut Session, message: String) -> Outcome {
    if session.is_terminal() {
        return Outcome::Ignored;
    }
    session.terminal_error = Some(message);
    session.status = SessionStatus::Failed;
    Outcome::Terminal
}

fn advance(session: &mut Session, next: SessionStatus) -> bool {
    if session.status.can_advance_to(next) {
        session.status = next;
        true
    } else {
        false
    }
}

#[cfg(test)]
#[path = "tests/reducer_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/reducer_property_tests.rs"]
mod property_tests;
