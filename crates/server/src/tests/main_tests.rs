use std::time::Duration;

use super::*;
use agent::{ResearchAgent, StageUpdate};
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use futures::{SinkExt, StreamExt};
use shared::{
    error::{AgentError, ErrorCode},
    protocol::{CompleteFrame, ErrorFrame, ServerFrame},
};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tower::ServiceExt;

struct RateLimitedAgent;

#[async_trait]
impl ResearchAgent for RateLimitedAgent {
    async fn run(&self, _topic: &str, updates: mpsc::Sender<StageUpdate>) -> anyhow::Result<String> {
        let _ = updates
            .send(StageUpdate {
                node: "planner".to_string(),
                logs: vec!["--- Planning Research ---".to_string()],
                ..StageUpdate::default()
            })
            .await;
        Err(AgentError::rate_limited("rate limited").into())
    }
}

fn scripted_state() -> Arc<AppState> {
    let agent = ScriptedAgent::new(
        Arc::new(ReportMemory::default()),
        "https://search.test/",
        Duration::ZERO,
        3,
    )
    .expect("agent");
    Arc::new(AppState {
        agent: Arc::new(agent),
    })
}

async fn spawn_server(state: Arc<AppState>) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = build_router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("ws://{addr}/ws")
}

async fn research_frames(endpoint: &str, start: &str) -> Vec<ServerFrame> {
    let (mut stream, _) = connect_async(endpoint).await.expect("connect");
    stream
        .send(Message::Text(start.to_string()))
        .await
        .expect("send start");

    let mut frames = Vec::new();
    while let Some(message) = tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("frame in time")
    {
        match message.expect("message") {
            Message::Text(text) => {
                let frame: ServerFrame = serde_json::from_str(&text).expect("server frame");
                let terminal = frame.is_terminal();
                frames.push(frame);
                if terminal {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    frames
}

#[tokio::test]
async fn healthz_and_root_report_ok() {
    let app = build_router(scripted_state());

    let response = app
        .clone()
        .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["message"], "Reasoning Agent Server is running");
}

#[tokio::test]
async fn research_session_streams_stages_then_report() {
    let endpoint = spawn_server(scripted_state()).await;
    let frames = research_frames(&endpoint, r#"{"topic":"quantum computing"}"#).await;

    let Some(ServerFrame::Update(first)) = frames.first() else {
        panic!("expected update first, got {frames:?}");
    };
    assert_eq!(first.node.as_deref(), Some("check_memory"));
    assert_eq!(first.status.as_deref(), Some("Finished check_memory"));

    let Some(ServerFrame::Complete(CompleteFrame { report })) = frames.last() else {
        panic!("expected complete last, got {frames:?}");
    };
    assert!(report.starts_with("# quantum computing"));
    assert_eq!(
        frames.iter().filter(|frame| frame.is_terminal()).count(),
        1
    );

    let again = research_frames(&endpoint, r#"{"topic":"Quantum Computing"}"#).await;
    assert_eq!(again.len(), 2, "memory hit should skip the pipeline");
    assert_eq!(again.last(), frames.last());
}

#[tokio::test]
async fn missing_topic_is_rejected_with_validation_error() {
    let endpoint = spawn_server(scripted_state()).await;
    for start in [r#"{"topic":"   "}"#, r#"{"subject":"x"}"#, "not json"] {
        let frames = research_frames(&endpoint, start).await;
        assert_eq!(
            frames,
            [ServerFrame::Error(ErrorFrame {
                message: "No topic provided".to_string(),
                code: Some(ErrorCode::Validation),
            })]
        );
    }
}

#[tokio::test]
async fn agent_failure_becomes_coded_error_frame() {
    let endpoint = spawn_server(Arc::new(AppState {
        agent: Arc::new(RateLimitedAgent),
    }))
    .await;
    let frames = research_frames(&endpoint, r#"{"topic":"x"}"#).await;

    assert_eq!(frames.len(), 2);
    assert!(matches!(&frames[0], ServerFrame::Update(update) if update.node.as_deref() == Some("planner")));
    assert_eq!(
        frames[1],
        ServerFrame::Error(ErrorFrame {
            message: "rate limited".to_string(),
            code: Some(ErrorCode::RateLimited),
        })
    );
}

#[tokio::test]
async fn scripted_agent_rejects_overlong_topic_with_code() {
    let endpoint = spawn_server(scripted_state()).await;
    let start = serde_json::json!({ "topic": "q".repeat(agent::MAX_TOPIC_CHARS + 1) }).to_string();
    let frames = research_frames(&endpoint, &start).await;

    assert_eq!(
        frames,
        [ServerFrame::Error(ErrorFrame {
            message: format!("Topic is longer than {} characters", agent::MAX_TOPIC_CHARS),
            code: Some(ErrorCode::Validation),
        })]
    );
}
