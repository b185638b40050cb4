use std::{
    env,
    time::{SystemTime, UNIX_EPOCH},
};

use super::*;

#[test]
fn rewrites_http_endpoints_to_websocket_schemes() {
    assert_eq!(
        normalize_endpoint("http://localhost:8000/ws")
            .expect("url")
            .as_str(),
        "ws://localhost:8000/ws"
    );
    assert_eq!(
        normalize_endpoint(" https://agent.example.com/ws ")
            .expect("url")
            .as_str(),
        "wss://agent.example.com/ws"
    );
    assert_eq!(
        normalize_endpoint("wss://agent.example.com/ws")
            .expect("url")
            .as_str(),
        "wss://agent.example.com/ws"
    );
}

#[test]
fn rejects_non_websocket_endpoints() {
    assert!(normalize_endpoint("ftp://agent.example.com").is_err());
    assert!(normalize_endpoint("not a url").is_err());
}

#[test]
fn file_overrides_replace_defaults() {
    let mut settings = ClientSettings::default();
    apply_file_overrides(
        &mut settings,
        "endpoint = \"http://10.0.0.2:8000/ws\"\nrequire_identity = true\n",
    );
    assert_eq!(settings.endpoint, "http://10.0.0.2:8000/ws");
    assert!(settings.require_identity);

    apply_file_overrides(&mut settings, "require_identity = \"off\"\n");
    assert!(!settings.require_identity);
}

#[test]
fn unreadable_file_keeps_defaults() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let missing = env::temp_dir().join(format!("research_client_missing_{suffix}.toml"));

    let mut settings = ClientSettings::default();
    apply_file_overrides(&mut settings, "this is [not toml");
    assert_eq!(settings, ClientSettings::default());

    let loaded = load_settings_from(&missing);
    if env::var("RESEARCH_ENDPOINT").is_err() && env::var("APP__ENDPOINT").is_err() {
        assert_eq!(loaded.endpoint, ClientSettings::default().endpoint);
    }
}
