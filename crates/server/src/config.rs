use std::{collections::HashMap, fs, path::Path, time::Duration};

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub stage_delay_ms: u64,
    pub max_critique_rounds: u32,
    pub search_base_url: String,
    pub max_concurrent_runs: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8000".into(),
            stage_delay_ms: 0,
            max_critique_rounds: 3,
            search_base_url: "https://duckduckgo.com/".into(),
            max_concurrent_runs: 8,
        }
    }
}

impl Settings {
    pub fn stage_delay(&self) -> Duration {
        Duration::from_millis(self.stage_delay_ms)
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new("server.toml"))
}

pub fn load_settings_from(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file_overrides(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Ok(v) = std::env::var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Ok(v) = std::env::var("APP__STAGE_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.stage_delay_ms = parsed;
        }
    }

    if let Ok(v) = std::env::var("APP__MAX_CRITIQUE_ROUNDS") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.max_critique_rounds = parsed;
        }
    }

    if let Ok(v) = std::env::var("APP__SEARCH_BASE_URL") {
        settings.search_base_url = v;
    }

    if let Ok(v) = std::env::var("APP__MAX_CONCURRENT_RUNS") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.max_concurrent_runs = parsed;
        }
    }

    settings
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("bind_addr").and_then(toml::Value::as_str) {
        settings.server_bind = v.to_string();
    }
    if let Some(v) = file_cfg
        .get("stage_delay_ms")
        .and_then(toml::Value::as_integer)
        .and_then(|v| u64::try_from(v).ok())
    {
        settings.stage_delay_ms = v;
    }
    if let Some(v) = file_cfg
        .get("max_critique_rounds")
        .and_then(toml::Value::as_integer)
        .and_then(|v| u32::try_from(v).ok())
    {
        settings.max_critique_rounds = v;
    }
    if let Some(v) = file_cfg.get("search_base_url").and_then(toml::Value::as_str) {
        settings.search_base_url = v.to_string();
    }
    if let Some(v) = file_cfg
        .get("max_concurrent_runs")
        .and_then(toml::Value::as_integer)
        .and_then(|v| usize::try_from(v).ok())
    {
        settings.max_concurrent_runs = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
