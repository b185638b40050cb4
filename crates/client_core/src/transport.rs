//! Streaming transport for one research run.
//!
//! A transport is split in two halves created by [`channel`]:
//! the [`TransportHandle`] the controller keeps (send, close) and the
//! [`TransportLink`] the I/O task drives (report open, deliver frames, finish).
//! Lifecycle and inbound frames travel as [`TransportSignal`]s over one ordered
//! channel, so the consumer sees them serialized in arrival order.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::TransportError;

const CLIENT_CLOSE_REASON: &str = "closed by client";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    Opened,
    Frame(String),
    Closed(Option<String>),
    Failed(String),
}

pub type SignalReceiver = mpsc::UnboundedReceiver<TransportSignal>;

pub trait Transport: Send + Sync {
    /// Starts connecting without waiting for the connection. Establishment
    /// errors arrive later as [`TransportSignal::Failed`].
    fn open(&self, endpoint: &Url) -> (TransportHandle, SignalReceiver);
}

#[derive(Debug, Default)]
struct HandleState {
    opened: AtomicBool,
    close_requested: AtomicBool,
    shutdown: Notify,
}

#[derive(Debug, Clone)]
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<String>,
    state: Arc<HandleState>,
}

impl TransportHandle {
    pub fn send(&self, payload: String) -> Result<(), TransportError> {
        if self.state.close_requested.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if !self.state.opened.load(Ordering::Acquire) {
            return Err(TransportError::NotOpen);
        }
        self.outbound
            .send(payload)
            .map_err(|_| TransportError::Closed)
    }

    /// Requests shutdown. Returns `true` only for the call that initiated it;
    /// later calls are no-ops.
    pub fn close(&self) -> bool {
        if self.state.close_requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.state.shutdown.notify_one();
        true
    }

    pub fn is_open(&self) -> bool {
        self.state.opened.load(Ordering::Acquire) && !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.state.close_requested.load(Ordering::Acquire)
    }
}

/// I/O side of a transport. Emits exactly one `Closed` or `Failed` signal:
/// either through [`TransportLink::close`] / [`TransportLink::fail`] or, if the
/// task drops the link without finishing, from `Drop`.
#[derive(Debug)]
pub struct TransportLink {
    outbound: mpsc::UnboundedReceiver<String>,
    signals: mpsc::UnboundedSender<TransportSignal>,
    state: Arc<HandleState>,
    finished: bool,
}

impl TransportLink {
    pub fn opened(&self) {
        self.state.opened.store(true, Ordering::Release);
        let _ = self.signals.send(TransportSignal::Opened);
    }

    pub fn deliver(&self, frame: String) {
        let _ = self.signals.send(TransportSignal::Frame(frame));
    }

    /// Next payload queued through [`TransportHandle::send`]. `None` once every
    /// handle is gone.
    pub async fn next_outbound(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            state: Arc::clone(&self.state),
        }
    }

    pub fn close(mut self, reason: Option<String>) {
        self.finish(TransportSignal::Closed(reason));
    }

    pub fn fail(mut self, reason: impl Into<String>) {
        self.finish(TransportSignal::Failed(reason.into()));
    }

    fn finish(&mut self, signal: TransportSignal) {
        if self.finished {
            return;
        }
        self.finished = true;
        let _ = self.signals.send(signal);
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        self.finish(TransportSignal::Failed("transport task ended unexpectedly".into()));
    }
}

/// Resolves once [`TransportHandle::close`] has been called.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: Arc<HandleState>,
}

impl ShutdownSignal {
    pub async fn requested(&self) {
        if self.state.close_requested.load(Ordering::Acquire) {
            return;
        }
        self.state.shutdown.notified().await;
    }
}

/// Creates the connected halves of one transport.
pub fn channel() -> (TransportHandle, TransportLink, SignalReceiver) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (signals_tx, signals_rx) = mpsc::unbounded_channel();
    let state = Arc::new(HandleState::default());
    let handle = TransportHandle {
        outbound: outbound_tx,
        state: Arc::clone(&state),
    };
    let link = TransportLink {
        outbound: outbound_rx,
        signals: signals_tx,
        state,
        finished: false,
    };
    (handle, link, signals_rx)
}

/// WebSocket transport carrying JSON text frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

impl Transport for WebSocketTransport {
    fn open(&self, endpoint: &Url) -> (TransportHandle, SignalReceiver) {
        let (handle, link, signals) = channel();
        tokio::spawn(run_websocket(endpoint.clone(), link));
        (handle, signals)
    }
}

async fn run_websocket(endpoint: Url, mut link: TransportLink) {
    let shutdown = link.shutdown_signal();
    let connected = tokio::select! {
        biased;
        () = shutdown.requested() => {
            link.close(Some(CLIENT_CLOSE_REASON.to_string()));
            return;
        }
        result = connect_async(endpoint.as_str()) => result,
    };
    let stream = match connected {
        Ok((stream, _)) => stream,
        Err(err) => {
            warn!(%endpoint, error = %err, "research transport failed to connect");
            link.fail(err.to_string());
            return;
        }
    };
    info!(%endpoint, "research transport connected");

    let (mut writer, mut reader) = stream.split();
    link.opened();

    loop {
        tokio::select! {
            biased;
            () = shutdown.requested() => {
                let _ = writer.send(Message::Close(None)).await;
                link.close(Some(CLIENT_CLOSE_REASON.to_string()));
                return;
            }
            outbound = link.next_outbound() => {
                let Some(payload) = outbound else {
                    let _ = writer.send(Message::Close(None)).await;
                    link.close(Some(CLIENT_CLOSE_REASON.to_string()));
                    return;
                };
                if let Err(err) = writer.send(Message::Text(payload)).await {
                    link.fail(format!("websocket send failed: {err}"));
                    return;
                }
            }
            inbound = reader.next() => match inbound {
                Some(Ok(Message::Text(text))) => link.deliver(text),
                Some(Ok(Message::Binary(bytes))) => {
                    link.deliver(String::from_utf8_lossy(&bytes).into_owned());
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|frame| frame.reason.into_owned())
                        .filter(|reason| !reason.is_empty());
                    debug!(%endpoint, ?reason, "research transport closed by server");
                    link.close(reason);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(%endpoint, error = %err, "research transport receive failed");
                    link.fail(format!("websocket receive failed: {err}"));
                    return;
                }
                None => {
                    link.close(None);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
