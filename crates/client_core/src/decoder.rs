//! Inbound frame decoding.
//!
//! The discriminator is read explicitly before the body is parsed so that an
//! unknown `type` and a known `type` with a broken body surface as different
//! errors.

use chrono::{DateTime, Utc};
use serde_json::Value;
use shared::{
    domain::LogKind,
    error::ErrorCode,
    protocol::{
        CompleteFrame, ErrorFrame, UpdateFrame, FRAME_TYPE_COMPLETE, FRAME_TYPE_ERROR,
        FRAME_TYPE_UPDATE,
    },
};

use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Progress(Progress),
    Completed { report: String },
    Failed { message: String, code: Option<ErrorCode> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub log_lines: Vec<String>,
    pub discovered_sources: Vec<String>,
    pub node_label: Option<String>,
    pub status: Option<String>,
    pub plan: Option<Vec<String>>,
    pub draft: Option<String>,
    pub level: Option<LogKind>,
    pub received_at: DateTime<Utc>,
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress(_) => FRAME_TYPE_UPDATE,
            Self::Completed { .. } => FRAME_TYPE_COMPLETE,
            Self::Failed { .. } => FRAME_TYPE_ERROR,
        }
    }
}

pub fn decode(raw: &str) -> Result<SessionEvent, DecodeError> {
    decode_at(raw, Utc::now())
}

/// Decodes one frame, stamping progress with `received_at`.
pub fn decode_at(raw: &str, received_at: DateTime<Utc>) -> Result<SessionEvent, DecodeError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| DecodeError::InvalidPayload(err.to_string()))?;
    let Value::Object(_) = &value else {
        return Err(DecodeError::InvalidPayload(format!(
            "expected an object, got `{value}`"
        )));
    };
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingDiscriminator)?;

    match kind {
        FRAME_TYPE_UPDATE => {
            let frame: UpdateFrame = parse_body(FRAME_TYPE_UPDATE, value)?;
            Ok(SessionEvent::Progress(Progress {
                log_lines: frame.logs,
                discovered_sources: frame.sources,
                node_label: frame.node,
                status: frame.status,
                plan: frame.plan,
                draft: frame.draft,
                level: frame.level,
                received_at,
            }))
        }
        FRAME_TYPE_COMPLETE => {
            let frame: CompleteFrame = parse_body(FRAME_TYPE_COMPLETE, value)?;
            Ok(SessionEvent::Completed {
                report: frame.report,
            })
        }
        FRAME_TYPE_ERROR => {
            let frame: ErrorFrame = parse_body(FRAME_TYPE_ERROR, value)?;
            Ok(SessionEvent::Failed {
                message: frame.message,
                code: frame.code,
            })
        }
        other => Err(DecodeError::Unrecognized(other.to_string())),
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(
    kind: &'static str,
    value: Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::Malformed { kind, source })
}

#[cfg(test)]
#[path = "tests/decoder_tests.rs"]
mod tests;
