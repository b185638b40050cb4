//! Entry point for the presentation layer: start and cancel research runs and
//! observe their state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use shared::{domain::SessionId, protocol::StartRequest};
use tokio::{runtime::Handle, sync::broadcast, task::JoinHandle};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamExt,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::ClientSettings,
    decoder,
    error::StartError,
    identity::{AnonymousIdentity, IdentityProvider},
    reducer::{self, Outcome},
    session::Session,
    transport::{SignalReceiver, Transport, TransportHandle, TransportSignal, WebSocketTransport},
};

const UPDATE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
struct ControllerState {
    session: Option<Session>,
    active: Option<ActiveRun>,
}

struct ActiveRun {
    session_id: SessionId,
    handle: TransportHandle,
    driver: JoinHandle<()>,
}

pub struct SessionController {
    endpoint: Url,
    require_identity: bool,
    transport: Arc<dyn Transport>,
    identity: Arc<dyn IdentityProvider>,
    inner: Arc<Mutex<ControllerState>>,
    updates: broadcast::Sender<Session>,
    runtime: Handle,
}

/// Result of a successful [`SessionController::start`].
pub struct StartedSession {
    pub snapshot: Session,
    pub updates: SessionSubscription,
}

impl SessionController {
    pub fn new(settings: &ClientSettings) -> anyhow::Result<Self> {
        Self::new_with_dependencies(
            settings,
            Arc::new(WebSocketTransport),
            Arc::new(AnonymousIdentity),
        )
    }

    /// Binds the controller to the runtime it is created on.
    pub fn new_with_dependencies(
        settings: &ClientSettings,
        transport: Arc<dyn Transport>,
        identity: Arc<dyn IdentityProvider>,
    ) -> anyhow::Result<Self> {
        let runtime = Handle::try_current()
            .context("no tokio runtime to bind the session controller to")?;
        Self::new_on_runtime(settings, transport, identity, runtime)
    }

    /// For presentation layers that live outside the runtime: every task the
    /// controller starts is spawned onto `runtime`, so its methods can be
    /// called from any thread.
    pub fn new_on_runtime(
        settings: &ClientSettings,
        transport: Arc<dyn Transport>,
        identity: Arc<dyn IdentityProvider>,
        runtime: Handle,
    ) -> anyhow::Result<Self> {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Ok(Self {
            endpoint: settings.endpoint_url()?,
            require_identity: settings.require_identity,
            transport,
            identity,
            inner: Arc::new(Mutex::new(ControllerState::default())),
            updates,
            runtime,
        })
    }

    /// Starts a research run on `topic`, cancelling any run still in flight.
    pub fn start(&self, topic: &str) -> Result<StartedSession, StartError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(StartError::EmptyTopic);
        }
        let identity = self.identity.active_identity();
        if self.require_identity && identity.is_none() {
            return Err(StartError::MissingIdentity);
        }

        let mut state = lock(&self.inner);
        cancel_active(&mut state, &self.updates);

        let mut session = Session::new(topic);
        reducer::begin_connecting(&mut session);
        let session_id = session.id();
        info!(
            %session_id,
            topic,
            user_id = identity.as_ref().map(|identity| identity.user_id.as_str()),
            endpoint = %self.endpoint,
            "starting research session"
        );

        let subscription = SessionSubscription {
            session_id,
            stream: BroadcastStream::new(self.updates.subscribe()),
            inner: Arc::clone(&self.inner),
            done: false,
        };

        // Transports spawn their I/O task onto the ambient runtime.
        let _runtime = self.runtime.enter();
        let (handle, signals) = self.transport.open(&self.endpoint);
        let driver = self.runtime.spawn(drive_session(
            Arc::clone(&self.inner),
            self.updates.clone(),
            session_id,
            topic.to_string(),
            handle.clone(),
            signals,
        ));

        state.session = Some(session.clone());
        state.active = Some(ActiveRun {
            session_id,
            handle,
            driver,
        });
        let _ = self.updates.send(session.clone());

        Ok(StartedSession {
            snapshot: session,
            updates: subscription,
        })
    }

    /// Abandons the current run. A no-op when nothing is running.
    pub fn cancel(&self) {
        let mut state = lock(&self.inner);
        cancel_active(&mut state, &self.updates);
    }

    /// Cancels any run and signs the current identity out.
    pub fn sign_out(&self) {
        self.cancel();
        self.identity.sign_out();
    }

    pub fn snapshot(&self) -> Option<Session> {
        lock(&self.inner).session.clone()
    }

    /// Every snapshot published by this controller, across sessions.
    pub fn subscribe(&self) -> broadcast::Receiver<Session> {
        self.updates.subscribe()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let mut state = lock(&self.inner);
        if let Some(active) = state.active.take() {
            active.handle.close();
            active.driver.abort();
        }
    }
}

fn lock(inner: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn cancel_active(state: &mut ControllerState, updates: &broadcast::Sender<Session>) {
    if let Some(active) = state.active.take() {
        if active.handle.close() {
            debug!(session_id = %active.session_id, "closed research transport");
        }
        active.driver.abort();
    }
    if let Some(session) = state.session.as_mut() {
        if reducer::cancel(session).changed() {
            info!(session_id = %session.id(), "research session cancelled");
            let _ = updates.send(session.clone());
        }
    }
}

/// Applies every signal of one transport to its session, one at a time, under
/// the controller lock. Stops once the session is terminal, the transport has
/// ended, or a newer session has replaced this one.
async fn drive_session(
    inner: Arc<Mutex<ControllerState>>,
    updates: broadcast::Sender<Session>,
    session_id: SessionId,
    topic: String,
    handle: TransportHandle,
    mut signals: SignalReceiver,
) {
    while let Some(signal) = signals.recv().await {
        let mut state = lock(&inner);
        let Some(session) = state
            .session
            .as_mut()
            .filter(|session| session.id() == session_id)
        else {
            break;
        };

        let transport_ended = matches!(
            signal,
            TransportSignal::Closed(_) | TransportSignal::Failed(_)
        );
        let outcome = match signal {
            TransportSignal::Opened => send_start_request(session, &handle, &topic),
            TransportSignal::Frame(raw) => match decoder::decode(&raw) {
                Ok(event) => {
                    debug!(%session_id, kind = event.kind(), "research event received");
                    reducer::apply(session, &event)
                }
                Err(err) => {
                    warn!(%session_id, error = %err, "discarding undecodable research frame");
                    Outcome::Ignored
                }
            },
            TransportSignal::Closed(reason) => {
                reducer::transport_closed(session, reason.as_deref())
            }
            TransportSignal::Failed(reason) => {
                warn!(%session_id, %reason, "research transport failed");
                reducer::transport_failed(session, &reason)
            }
        };

        if outcome.changed() {
            let _ = updates.send(session.clone());
        }
        if outcome == Outcome::Terminal {
            info!(%session_id, status = %session.status(), "research session finished");
        }
        if outcome == Outcome::Terminal || transport_ended {
            handle.close();
            if state
                .active
                .as_ref()
                .is_some_and(|active| active.session_id == session_id)
            {
                state.active = None;
            }
            break;
        }
    }
}

fn send_start_request(session: &mut Session, handle: &TransportHandle, topic: &str) -> Outcome {
    let request = StartRequest {
        topic: topic.to_string(),
    };
    let sent = serde_json::to_string(&request)
        .map_err(|err| err.to_string())
        .and_then(|payload| handle.send(payload).map_err(|err| err.to_string()));
    match sent {
        Ok(()) => reducer::mark_opened(session),
        Err(err) => reducer::transport_failed(session, &format!("start request not sent: {err}")),
    }
}

/// Snapshots of one session, ending after its terminal snapshot or when a
/// newer session replaces it.
pub struct SessionSubscription {
    session_id: SessionId,
    stream: BroadcastStream<Session>,
    inner: Arc<Mutex<ControllerState>>,
    done: bool,
}

impl SessionSubscription {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub async fn next(&mut self) -> Option<Session> {
        if self.done {
            return None;
        }
        while let Some(item) = self.stream.next().await {
            let snapshot = match item {
                Ok(snapshot) => snapshot,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(session_id = %self.session_id, skipped, "session subscriber lagged");
                    match lock(&self.inner).session.clone() {
                        Some(current) => current,
                        None => continue,
                    }
                }
            };
            if snapshot.id() != self.session_id {
                self.done = true;
                return None;
            }
            if snapshot.is_terminal() {
                self.done = true;
            }
            return Some(snapshot);
        }
        self.done = true;
        None
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
