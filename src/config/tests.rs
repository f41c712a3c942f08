use super::load_config;
use super::settings::Settings;
use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.hub.host, "127.0.0.1");
    assert_eq!(settings.hub.port, 9191);
    assert!(settings.hub.topic_registration_required);
    assert_eq!(settings.hub.default_lease_seconds, 86_400);
    assert_eq!(settings.broker.queue_capacity, 1024);
    assert_eq!(settings.broker.persistence_path, None);
    assert_eq!(settings.logging.level, "info");
}

#[test]
fn test_hub_config_and_options_follow_settings() {
    let mut settings = Settings::default();
    settings.hub.public_url = Some("https://hub.example.com".to_string());
    settings.hub.bootstrap_timeout_ms = 250;

    let config = settings.hub_config();
    assert_eq!(config.public_url.as_deref(), Some("https://hub.example.com"));
    assert_eq!(config.base_path, "/websub");

    let options = settings.hub_options();
    assert_eq!(options.bootstrap_timeout, Duration::from_millis(250));
    assert_eq!(options.default_lease_seconds, 86_400);
}

#[test]
#[serial]
fn load_config_from_environment_overrides_defaults() {
    temp_env::with_vars(
        [
            ("WEBSUB_HUB__PORT", Some("9300")),
            ("WEBSUB_HUB__TOPIC_REGISTRATION_REQUIRED", Some("false")),
            ("WEBSUB_BROKER__QUEUE_CAPACITY", Some("16")),
            ("WEBSUB_LOGGING__LEVEL", Some("debug")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.hub.port, 9300);
            assert!(!cfg.hub.topic_registration_required);
            assert_eq!(cfg.broker.queue_capacity, 16);
            assert_eq!(cfg.logging.level, "debug");
            // untouched values keep their defaults
            assert_eq!(cfg.hub.base_path, "/websub");
        },
    );
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    // Create a temporary directory and set it as current dir so load_config
    // will pick up config/default.toml from there.
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [hub]
        host = "0.0.0.0"
        port = 9000
        public_url = "https://hub.example.com"

        [broker]
        persistence_path = "/tmp/websub-retained"
        replay_on_subscribe = true
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();

    // restore cwd before asserting so a failure does not leak into other tests
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.hub.host, "0.0.0.0");
    assert_eq!(cfg.hub.port, 9000);
    assert_eq!(cfg.hub.public_url.as_deref(), Some("https://hub.example.com"));
    assert_eq!(
        cfg.broker.persistence_path.as_deref(),
        Some("/tmp/websub-retained")
    );
    assert!(cfg.broker.replay_on_subscribe);
    assert_eq!(cfg.broker.max_messages_per_topic, 1000);
}
