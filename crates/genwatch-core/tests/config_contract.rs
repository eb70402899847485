use std::time::{SystemTime, UNIX_EPOCH};

use genwatch_core::GenwatchConfig;
use genwatch_core::models::CoreErrorKind;

fn temp_config_path(test_name: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("genwatch-{test_name}-{nanos}.json"))
}

#[test]
fn defaults_match_documented_values() {
    let config = GenwatchConfig::default();
    assert_eq!(config.polling.base_interval_ms, 10_000);
    assert_eq!(config.polling.intervals.single_ms, 5_000);
    assert_eq!(config.polling.intervals.few_ms, 8_000);
    assert_eq!(config.polling.intervals.many_ms, 10_000);
    assert_eq!(config.polling.max_duration_ms, 600_000);
    assert_eq!(config.polling.max_retries, 3);
    assert_eq!(config.polling.retry_delay_base_ms, 1_000);
    assert_eq!(config.progress.total_duration_ms, 120_000);
    assert_eq!(config.progress.target_progress, 99.99);
    assert_eq!(config.progress.max_jitter, 0.25);
    assert_eq!(config.progress.min_tick_delay_ms, 500);
    assert_eq!(config.progress.max_tick_delay_ms, 1_500);
    config.validate().unwrap();
}

#[test]
fn partial_json_keeps_defaults_for_missing_fields() {
    let config = GenwatchConfig::from_json_str(
        r#"{ "polling": { "intervals": { "few_ms": 7000 }, "max_retries": 5 } }"#,
    )
    .unwrap();
    assert_eq!(config.polling.intervals.single_ms, 5_000);
    assert_eq!(config.polling.intervals.few_ms, 7_000);
    assert_eq!(config.polling.max_retries, 5);
    assert_eq!(config.progress.total_duration_ms, 120_000);
}

#[test]
fn malformed_json_is_a_parse_failure() {
    let error = GenwatchConfig::from_json_str("{ polling: ").unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::ParseFailure);
}

#[test]
fn invalid_values_are_rejected() {
    for raw in [
        r#"{ "polling": { "intervals": { "single_ms": 0 } } }"#,
        r#"{ "polling": { "max_duration_ms": 0 } }"#,
        r#"{ "progress": { "target_progress": 100.0 } }"#,
        r#"{ "progress": { "max_jitter": -1.0 } }"#,
        r#"{ "progress": { "min_tick_delay_ms": 2000, "max_tick_delay_ms": 1000 } }"#,
        r#"{ "progress": { "total_duration_ms": 0 } }"#,
    ] {
        let error = GenwatchConfig::from_json_str(raw).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput, "{raw}");
    }
}

#[test]
fn loads_from_file() {
    let path = temp_config_path("loads_from_file");
    std::fs::write(&path, r#"{ "progress": { "total_duration_ms": 60000 } }"#).unwrap();

    let config = GenwatchConfig::load_from_path(&path).unwrap();
    assert_eq!(config.progress.total_duration_ms, 60_000);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn missing_file_is_a_storage_failure() {
    let path = temp_config_path("missing_file");
    let error = GenwatchConfig::load_from_path(&path).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::StorageFailure);
}

#[test]
fn time_scaling_divides_durations() {
    let scaled = GenwatchConfig::default().time_scaled(10.0).unwrap();
    assert_eq!(scaled.polling.intervals.single_ms, 500);
    assert_eq!(scaled.polling.max_duration_ms, 60_000);
    assert_eq!(scaled.progress.total_duration_ms, 12_000);
    assert_eq!(scaled.progress.min_tick_delay_ms, 50);
    assert_eq!(scaled.progress.target_progress, 99.99);
    scaled.validate().unwrap();

    let error = GenwatchConfig::default().time_scaled(0.0).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidInput);
}
