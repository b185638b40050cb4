use std::{collections::HashMap, fs, path::Path};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    pub endpoint: String,
    pub require_identity: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000/ws".into(),
            require_identity: false,
        }
    }
}

impl ClientSettings {
    pub fn endpoint_url(&self) -> anyhow::Result<Url> {
        normalize_endpoint(&self.endpoint)
    }
}

/// Defaults, then `client.toml` in the working directory, then environment.
pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(DEFAULT_CONFIG_FILE))
}

pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file_overrides(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("RESEARCH_ENDPOINT") {
        settings.endpoint = v;
    }
    if let Ok(v) = std::env::var("APP__ENDPOINT") {
        settings.endpoint = v;
    }

    if let Ok(v) = std::env::var("APP__REQUIRE_IDENTITY") {
        if let Some(parsed) = parse_flag(&v) {
            settings.require_identity = parsed;
        }
    }

    settings
}

fn apply_file_overrides(settings: &mut ClientSettings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("endpoint").and_then(toml::Value::as_str) {
        settings.endpoint = v.to_string();
    }
    match file_cfg.get("require_identity") {
        Some(toml::Value::Boolean(v)) => settings.require_identity = *v,
        Some(toml::Value::String(v)) => {
            if let Some(parsed) = parse_flag(v) {
                settings.require_identity = parsed;
            }
        }
        _ => {}
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Accepts `ws(s)://` endpoints as-is and rewrites `http(s)://` to the
/// matching websocket scheme.
pub fn normalize_endpoint(raw: &str) -> anyhow::Result<Url> {
    let raw = raw.trim();
    let rewritten = if let Some(rest) = raw.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = raw.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        raw.to_string()
    };

    let url = Url::parse(&rewritten).with_context(|| format!("invalid endpoint '{raw}'"))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(anyhow!(
            "endpoint must use ws://, wss://, http:// or https://, got '{other}://'"
        )),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
