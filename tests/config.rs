//! Tests for engine configuration.

use ironsift::{CacheBackend, EngineConfig, ExtractError, OutputFormat, OutputMode, RecordLayout};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_defaults() {
    let config = EngineConfig::default();
    assert_eq!(config.retry.max_attempts, 7);
    assert_eq!(config.checkpoint_every, 5_000);
    assert_eq!(config.cancel_max_letters, 30);
    assert_eq!(config.workers, None);
    assert!(config.worker_count() >= 1);
    assert_eq!(config.output_format, OutputFormat::Csv);
    assert_eq!(config.output_mode, OutputMode::Append);
    assert_eq!(config.layout, RecordLayout::us_application());
    assert!(config.require_content_length);
    assert!(!config.force_reprocess);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_json_falls_back_to_defaults() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("engine.json");
    fs::write(
        &path,
        r#"{
            "workers": 4,
            "retry": { "max_attempts": 3 },
            "cache": { "kind": "append_log", "path": "/var/lib/sift/done.log" },
            "output_format": "jsonl"
        }"#,
    )?;

    let config = EngineConfig::from_json_file(&path)?;
    assert_eq!(config.worker_count(), 4);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.initial_delay_ms, 500);
    assert_eq!(config.cache, CacheBackend::AppendLog(PathBuf::from("/var/lib/sift/done.log")));
    assert_eq!(config.output_format, OutputFormat::Jsonl);
    assert_eq!(config.checkpoint_every, 5_000);
    Ok(())
}

#[test]
fn test_invalid_json_file_is_rejected() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("engine.json");
    fs::write(&path, r#"{ "checkpoint_every": 0 }"#)?;
    assert!(EngineConfig::from_json_file(&path).is_err());
    assert!(EngineConfig::from_json_file(tmp.path().join("missing.json")).is_err());
    Ok(())
}

#[test]
fn test_validate_rejects_bad_values() {
    let bad = [
        EngineConfig {
            workers: Some(0),
            ..EngineConfig::default()
        },
        EngineConfig {
            checkpoint_every: 0,
            ..EngineConfig::default()
        },
        EngineConfig {
            output_prefix: "out/extraction".into(),
            ..EngineConfig::default()
        },
        EngineConfig {
            output_prefix: String::new(),
            ..EngineConfig::default()
        },
        EngineConfig {
            layout: RecordLayout::simple("rec ord", "id", "txt"),
            ..EngineConfig::default()
        },
    ];
    for config in bad {
        assert!(
            matches!(config.validate(), Err(ExtractError::InvalidInput(_))),
            "{config:?}"
        );
    }
}

#[test]
fn test_cache_backend_serde_shape() -> anyhow::Result<()> {
    let backend = CacheBackend::MarkerDir(PathBuf::from("done"));
    let json = serde_json::to_string(&backend)?;
    assert_eq!(json, r#"{"kind":"marker_dir","path":"done"}"#);
    let back: CacheBackend = serde_json::from_str(&json)?;
    assert_eq!(back, backend);
    Ok(())
}

#[test]
fn test_grant_layout_shares_identifier_paths() {
    let grant = RecordLayout::us_grant();
    let app = RecordLayout::us_application();
    assert_eq!(grant.record_tag, "us-patent-grant");
    assert_eq!(grant.own_id_path, app.own_id_path);
    assert_eq!(grant.id_tag, "doc-number");
}
