use serial_test::serial;

use super::load_config;
use super::settings::Settings;
use crate::client::endpoint::AckMode;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.broker.uri, "ws://127.0.0.1:8080");
    assert_eq!(settings.broker.request_timeout_secs, 20);
    assert_eq!(settings.broker.ack_mode, AckMode::AutoAcknowledge);
    assert_eq!(settings.producer.queue_ttl_secs, 3600);
    assert_eq!(settings.producer.topic_ttl_secs, 1800);
    assert_eq!(settings.log.level, "info");
}

#[test]
fn test_endpoint_is_built_from_broker_settings() {
    let settings = Settings::default();
    let endpoint = settings.endpoint();
    assert_eq!(endpoint.uri, "ws://127.0.0.1:8080");
    assert_eq!(endpoint.request_timeout.as_secs(), 20);
    assert_eq!(endpoint.ack_mode, AckMode::AutoAcknowledge);
}

#[test]
#[serial]
fn test_environment_overrides_broker_uri() {
    temp_env::with_var("BROKER_URI", Some("ws://10.0.0.5:9000"), || {
        let settings = load_config().expect("config should load");
        assert_eq!(settings.broker.uri, "ws://10.0.0.5:9000");
        // Untouched values still come from defaults.
        assert_eq!(settings.producer.queue_ttl_secs, 3600);
    });
}

#[test]
#[serial]
fn test_missing_sources_fall_back_to_defaults() {
    temp_env::with_var_unset("BROKER_URI", || {
        let settings = load_config().expect("config should load");
        assert_eq!(settings.broker.uri, Settings::default().broker.uri);
    });
}
