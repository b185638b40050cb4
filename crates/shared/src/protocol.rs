use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

use crate::{
    domain::LogKind,
    error::{AgentError, ErrorCode},
};

pub const FRAME_TYPE_UPDATE: &str = "update";
pub const FRAME_TYPE_COMPLETE: &str = "complete";
pub const FRAME_TYPE_ERROR: &str = "error";

/// The single client -> server message of a research run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateFrame {
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub logs: Vec<String>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub level: Option<LogKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteFrame {
    pub report: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub message: String,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub code: Option<ErrorCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Update(UpdateFrame),
    Complete(CompleteFrame),
    Error(ErrorFrame),
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorFrame {
            message: message.into(),
            code: None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Update(_))
    }
}

impl From<AgentError> for ServerFrame {
    fn from(value: AgentError) -> Self {
        Self::Error(ErrorFrame {
            message: value.message,
            code: Some(value.code),
        })
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Optional enum extensions: a value this build does not know reads as
/// absent instead of failing the whole frame.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
