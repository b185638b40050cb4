use super::*;
use serde_json::json;

#[test]
fn update_frame_tolerates_missing_and_null_lists() {
    let frame: ServerFrame = serde_json::from_value(json!({
        "type": "update",
        "node": "planner",
        "logs": null,
        "plan": null,
        "draft": null
    }))
    .expect("update frame");

    let ServerFrame::Update(update) = frame else {
        panic!("expected update frame");
    };
    assert!(update.logs.is_empty());
    assert!(update.sources.is_empty());
    assert_eq!(update.node.as_deref(), Some("planner"));
    assert_eq!(update.plan, None);
}

#[test]
fn update_frame_omits_empty_fields_on_the_wire() {
    let frame = ServerFrame::Update(UpdateFrame {
        logs: vec!["Planning...".to_string()],
        ..UpdateFrame::default()
    });
    let value = serde_json::to_value(&frame).expect("serialize");
    assert_eq!(value, json!({ "type": "update", "logs": ["Planning..."] }));
}

#[test]
fn agent_error_becomes_coded_error_frame() {
    let frame = ServerFrame::from(AgentError::rate_limited("rate limited"));
    assert!(frame.is_terminal());
    assert_eq!(
        serde_json::to_value(&frame).expect("serialize"),
        json!({ "type": "error", "message": "rate limited", "code": "rate_limited" })
    );
}

#[test]
fn complete_frame_is_terminal() {
    let frame: ServerFrame =
        serde_json::from_str(r##"{"type":"complete","report":"# Report"}"##).expect("frame");
    assert!(frame.is_terminal());
    assert_eq!(
        frame,
        ServerFrame::Complete(CompleteFrame {
            report: "# Report".to_string()
        })
    );
}

#[test]
fn status_only_moves_forward() {
    use crate::domain::SessionStatus::*;

    assert!(Idle.can_advance_to(Connecting));
    assert!(Connecting.can_advance_to(Running));
    assert!(Running.can_advance_to(Completed));
    assert!(Connecting.can_advance_to(Cancelled));
    assert!(!Running.can_advance_to(Connecting));
    assert!(!Completed.can_advance_to(Failed));
    assert!(!Cancelled.can_advance_to(Running));
}

#[test]
fn sniffed_severity_flags_error_wording() {
    assert_eq!(LogKind::sniff("Search failed for query 2"), LogKind::Error);
    assert_eq!(LogKind::sniff("ERROR: quota"), LogKind::Error);
    assert_eq!(LogKind::sniff("\u{274c} tool crashed"), LogKind::Error);
    assert_eq!(LogKind::sniff("--- Planning Research ---"), LogKind::Info);
}

#[test]
fn error_frame_ignores_unknown_codes() {
    let frame: ServerFrame = serde_json::from_value(json!({
        "type": "error",
        "message": "quota exhausted",
        "code": "quota"
    }))
    .expect("error frame");
    assert_eq!(frame, ServerFrame::error("quota exhausted"));
}

#[test]
fn update_frame_ignores_unknown_level() {
    let frame: ServerFrame = serde_json::from_value(json!({
        "type": "update",
        "logs": ["Retrying search"],
        "level": "warning"
    }))
    .expect("update frame");
    let ServerFrame::Update(update) = frame else {
        panic!("expected update frame");
    };
    assert_eq!(update.level, None);
    assert_eq!(update.logs, ["Retrying search"]);

    let frame: ServerFrame =
        serde_json::from_value(json!({ "type": "update", "level": "error" })).expect("frame");
    assert!(matches!(frame, ServerFrame::Update(UpdateFrame { level: Some(LogKind::Error), .. })));
}

#[test]
fn error_codes_display_as_wire_names() {
    assert_eq!(ErrorCode::RateLimited.to_string(), "rate_limited");
    assert_eq!(
        AgentError::validation("Topic is too long").to_string(),
        "Topic is too long"
    );
}
