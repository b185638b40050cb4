use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use shared::{
    error::AgentError,
    protocol::{CompleteFrame, ServerFrame, StartRequest},
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::app_state::AppState;

const STAGE_BUFFER: usize = 64;

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| research_connection(state, socket))
}

async fn research_connection(state: Arc<AppState>, mut socket: WebSocket) {
    let Some(topic) = read_topic(&mut socket).await else {
        return;
    };
    let (mut sender, mut receiver) = socket.split();

    if topic.is_empty() {
        let frame = ServerFrame::from(AgentError::validation("No topic provided"));
        let _ = send_frame(&mut sender, &frame).await;
        let _ = sender.close().await;
        return;
    }
    info!(%topic, "research session started");

    let (updates_tx, mut updates_rx) = mpsc::channel(STAGE_BUFFER);
    let agent = Arc::clone(&state.agent);
    let agent_topic = topic.clone();
    let mut run = tokio::spawn(async move { agent.run(&agent_topic, updates_tx).await });

    let outcome = loop {
        tokio::select! {
            Some(update) = updates_rx.recv() => {
                if send_frame(&mut sender, &ServerFrame::from(update)).await.is_err() {
                    info!(%topic, "client went away; stopping research");
                    run.abort();
                    return;
                }
            }
            result = &mut run => break result,
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    info!(%topic, "client went away; stopping research");
                    run.abort();
                    return;
                }
                Some(Ok(_)) => {}
            },
        }
    };

    while let Ok(update) = updates_rx.try_recv() {
        if send_frame(&mut sender, &ServerFrame::from(update)).await.is_err() {
            return;
        }
    }

    let terminal = match outcome {
        Ok(Ok(report)) => {
            info!(%topic, "research session complete");
            ServerFrame::Complete(CompleteFrame { report })
        }
        Ok(Err(err)) => {
            warn!(%topic, error = %err, "research session failed");
            error_frame(err)
        }
        Err(err) => {
            error!(%topic, error = %err, "research task aborted");
            ServerFrame::from(AgentError::internal("research task aborted"))
        }
    };
    let _ = send_frame(&mut sender, &terminal).await;
    let _ = sender.close().await;
}

/// Waits for the start request. A request that is not JSON or has no topic
/// yields an empty topic, which is answered with a validation error.
async fn read_topic(socket: &mut WebSocket) -> Option<String> {
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(raw) => {
                let topic = serde_json::from_str::<StartRequest>(&raw)
                    .map(|request| request.topic.trim().to_string())
                    .unwrap_or_default();
                return Some(topic);
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

fn error_frame(err: anyhow::Error) -> ServerFrame {
    match err.downcast::<AgentError>() {
        Ok(coded) => ServerFrame::from(coded),
        Err(err) => ServerFrame::from(AgentError::internal(err.to_string())),
    }
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(frame) {
        Ok(v) => v,
        Err(err) => {
            error!(error = %err, "failed to serialize research frame");
            return Ok(());
        }
    };
    sender.send(Message::Text(text)).await
}
