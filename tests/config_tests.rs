// Configuration loading tests.

use std::time::Duration;

use omnivox::Config;

#[test]
fn test_defaults_match_the_wire_contract() {
    let config = Config::default();

    assert_eq!(config.server.url, "ws://localhost:8000/ws");
    assert_eq!(config.server.reconnect_delay_secs, 5);
    assert_eq!(config.capture.sample_rate, 48_000);
    assert_eq!(config.capture.block_size, 4096);
    assert_eq!(config.capture.transport_sample_rate, 16_000);
    assert_eq!(config.capture.frame_period_ms, 500);
    assert_eq!(config.capture.jpeg_quality, 80);
    assert!(config.capture.video);
    assert_eq!(config.playback.sample_rate, 24_000);
}

#[test]
fn test_partial_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("omnivox.toml");
    std::fs::write(
        &path,
        r#"
[server]
url = "ws://chat.example.net:9000/ws"

[capture]
video = false
frame_period_ms = 1000
"#,
    )
    .unwrap();

    let config = Config::load(path.to_str().unwrap()).unwrap();

    assert_eq!(config.server.url, "ws://chat.example.net:9000/ws");
    assert!(!config.capture.video);
    assert_eq!(config.capture.frame_period_ms, 1000);
    // Untouched sections keep their defaults
    assert_eq!(config.capture.sample_rate, 48_000);
    assert_eq!(config.playback.sample_rate, 24_000);
}

#[test]
fn test_session_config_flattening() {
    let mut config = Config::default();
    config.server.reconnect_delay_secs = 2;
    config.capture.frame_period_ms = 250;

    let session = config.session_config();

    assert_eq!(session.server_url, config.server.url);
    assert_eq!(session.reconnect_delay, Duration::from_secs(2));
    assert_eq!(session.frame_period, Duration::from_millis(250));
    assert_eq!(session.native_sample_rate, 48_000);
    assert_eq!(session.transport_sample_rate, 16_000);
    assert_eq!(session.playback_sample_rate, 24_000);
    assert!(session.session_id.starts_with("chat-"));
}
