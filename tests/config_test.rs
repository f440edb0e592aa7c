//! Integration tests for configuration loading

use booking_sync::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[source]
base_url = "https://bookings.test/api/v2"
api_key = "cal_live_123"
timeout_ms = 5000
max_pages = 3
start_time_param = ""

[newsletter]
subscribe_url = "https://news.test/api/v1/free"
fallback_url = "https://news.test/subscribe"
timeout_ms = 4000

[sync]
interval_secs = 60
pacing_ms = 250
automation_cutoff = "2025-08-01T00:00:00Z"

[storage]
processed_file = "/var/lib/booking-sync/processed.json"
activity_log_file = "/var/log/booking-sync/activity.log"

[server]
port = 9091
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.source_base_url(), "https://bookings.test/api/v2");
    assert_eq!(config.source_api_key(), Some("cal_live_123"));
    assert_eq!(config.source_timeout_ms(), 5000);
    assert_eq!(config.source_max_pages(), 3);
    assert_eq!(config.source_start_time_param(), "");
    assert_eq!(config.fallback_url(), Some("https://news.test/subscribe"));
    assert_eq!(config.newsletter_timeout_ms(), 4000);
    assert_eq!(config.interval_secs(), 60);
    assert_eq!(config.pacing_ms(), 250);
    assert_eq!(config.automation_cutoff().to_rfc3339(), "2025-08-01T00:00:00+00:00");
    assert_eq!(config.processed_file(), "/var/lib/booking-sync/processed.json");
    assert_eq!(config.server_port(), 9091);
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_config_file_is_error() {
    assert!(Config::from_file("/nonexistent/config.toml").is_err());
}

#[test]
fn test_missing_newsletter_section_is_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[source]\nbase_url = \"http://x\"\n").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}
