use hermes_rs::config::settings::load_settings;
use hermes_rs::models::settings::Settings;
use std::io::Write;
use std::time::Duration;

#[test]
fn defaults_validate() {
    let settings = Settings::default();
    assert!(settings.validate().is_ok());
    assert!(settings.breaker.enabled);
    assert_eq!(settings.breaker.failure_threshold, 5);
    assert_eq!(settings.breaker.volume_threshold, 10);
    assert_eq!(settings.websocket_breaker.message_queue_size, 1000);
    assert_eq!(settings.wsc.message_buffer_size, 256);
    assert_eq!(settings.wsc.websocket_origins, vec!["*".to_string()]);
}

#[test]
fn parses_full_configuration() {
    let json = r#"{
        "version": 1,
        "breaker": {
            "enabled": true,
            "failure_threshold": 3,
            "success_threshold": 2,
            "volume_threshold": 5,
            "timeout": 30,
            "prevention_paths": ["/api/"],
            "exclude_paths": ["/api/health"]
        },
        "websocket_breaker": {
            "max_retries": 2,
            "retry_backoff_factor": 2.0,
            "health_check_interval": 10,
            "message_queue_size": 500
        },
        "wsc": {
            "enabled": true,
            "node_ip": "10.1.2.3",
            "node_port": 7000,
            "heartbeat_interval": 15,
            "client_timeout": 60,
            "message_buffer_size": 128,
            "websocket_origins": ["https://app.example.com"],
            "sse_heartbeat": 10,
            "sse_timeout": 90,
            "sse_message_buffer": 50,
            "builtin_api": {
                "enable_broadcast": false,
                "auth_required": true,
                "admin_only": true
            }
        }
    }"#;

    let settings: Settings = serde_json::from_str(json).expect("valid config");
    assert!(settings.validate().is_ok());

    assert_eq!(settings.breaker.failure_threshold, 3);
    assert_eq!(settings.breaker.timeout, Duration::from_secs(30));
    assert_eq!(settings.breaker.prevention_paths, vec!["/api/".to_string()]);

    assert_eq!(settings.websocket_breaker.max_retries, 2);
    assert_eq!(settings.websocket_breaker.health_check_interval, Duration::from_secs(10));

    assert_eq!(settings.wsc.node_ip, "10.1.2.3");
    assert_eq!(settings.wsc.heartbeat_interval, Duration::from_secs(15));
    assert_eq!(settings.wsc.sse_message_buffer, 50);
    assert!(!settings.wsc.builtin_api.enable_broadcast);
    assert!(settings.wsc.builtin_api.enable_send);
    assert!(settings.wsc.builtin_api.auth_required);
}

#[test]
fn partial_configuration_fills_defaults() {
    let settings: Settings =
        serde_json::from_str(r#"{"version": 1, "breaker": {"failure_threshold": 7}}"#)
            .expect("valid config");
    assert_eq!(settings.breaker.failure_threshold, 7);
    assert_eq!(settings.breaker.success_threshold, 3);
    assert_eq!(settings.wsc.client_timeout, Duration::from_secs(90));
    assert!(settings.wsc.builtin_api.enable_stats);
}

#[test]
fn rejects_bad_thresholds_and_paths() {
    let mut settings = Settings::default();
    settings.breaker.failure_threshold = 0;
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.breaker.prevention_paths = vec!["api/".to_string()];
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.wsc.heartbeat_interval = Duration::from_secs(60);
    settings.wsc.client_timeout = Duration::from_secs(30);
    assert!(settings.validate().is_err());

    let mut settings = Settings::default();
    settings.websocket_breaker.retry_backoff_factor = 0.0;
    assert!(settings.validate().is_err());

    // A disabled hub skips hub validation.
    let mut settings = Settings::default();
    settings.wsc.enabled = false;
    settings.wsc.websocket_origins = vec![];
    assert!(settings.validate().is_ok());
}

// Environment-variable based, so the load scenarios run in one test.
#[test]
fn load_settings_round_trip_and_missing_file() {
    let mut file = tempfile::Builder::new()
        .prefix("hermes-config")
        .suffix(".json")
        .tempfile_in(".")
        .expect("temp config in working directory");
    write!(
        file,
        r#"{{"version": 1, "breaker": {{"prevention_paths": ["/api/"]}}}}"#
    )
    .expect("write config");

    std::env::set_var("HERMES_CONFIG_PATH", file.path());
    let settings = load_settings().expect("config should load");
    assert_eq!(settings.version, 1);
    assert_eq!(settings.breaker.prevention_paths, vec!["/api/".to_string()]);

    std::env::set_var("HERMES_CONFIG_PATH", "./does-not-exist.json");
    assert!(load_settings().is_err());

    std::env::remove_var("HERMES_CONFIG_PATH");
}
