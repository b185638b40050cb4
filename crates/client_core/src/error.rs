use thiserror::Error;

/// Why an inbound frame could not become a session event. Always recoverable:
/// the controller logs the frame and keeps the session alive.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not a JSON object: {0}")]
    InvalidPayload(String),
    #[error("frame has no string `type` discriminator")]
    MissingDiscriminator,
    #[error("unrecognized event type `{0}`")]
    Unrecognized(String),
    #[error("malformed `{kind}` event: {source}")]
    Malformed {
        kind: &'static str,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not open yet")]
    NotOpen,
    #[error("transport is closed")]
    Closed,
}

/// Rejections raised synchronously by `SessionController::start`; no session
/// exists when one of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("research topic must not be empty")]
    EmptyTopic,
    #[error("an active identity is required to start research")]
    MissingIdentity,
}
