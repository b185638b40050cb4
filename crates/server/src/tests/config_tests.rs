use super::{apply_file_overrides, load_settings_from, Settings};

use std::{
    env, fs,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file_overrides(
        &mut settings,
        r#"
bind_addr = "0.0.0.0:9000"
stage_delay_ms = 250
max_critique_rounds = 1
search_base_url = "https://search.internal/"
max_concurrent_runs = 2
"#,
    );

    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.stage_delay(), Duration::from_millis(250));
    assert_eq!(settings.max_critique_rounds, 1);
    assert_eq!(settings.search_base_url, "https://search.internal/");
    assert_eq!(settings.max_concurrent_runs, 2);
}

#[test]
fn invalid_values_are_ignored() {
    let mut settings = Settings::default();
    apply_file_overrides(&mut settings, "stage_delay_ms = -5\nmax_critique_rounds = \"two\"\n");
    assert_eq!(settings, Settings::default());

    apply_file_overrides(&mut settings, "not [valid toml");
    assert_eq!(settings, Settings::default());
}

#[test]
fn loads_settings_file_from_disk() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = env::temp_dir().join(format!("research_server_config_test_{suffix}"));
    fs::create_dir_all(&temp_root).expect("temp root");
    let path = temp_root.join("server.toml");
    fs::write(&path, "max_critique_rounds = 5\n").expect("write config");

    let settings = load_settings_from(&path);
    if env::var("APP__MAX_CRITIQUE_ROUNDS").is_err() {
        assert_eq!(settings.max_critique_rounds, 5);
    }

    fs::remove_dir_all(temp_root).expect("cleanup");
}
