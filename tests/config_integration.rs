use lamco_selection_sync::{Config, SyncMode};
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_load_full_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[sync]
mode = "b-to-a"

[selections]
a = "SECONDARY"
b = "CLIPBOARD"

[transfer]
chunk_size = 65536
max_size = 1048576

[logging]
level = "debug"
log_dir = "/tmp/lamco-selection-sync"
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.sync_mode().unwrap(), SyncMode::BToA);
    assert_eq!(config.selections.a, "SECONDARY");
    assert_eq!(config.transfer.chunk_size, 65536);
    assert_eq!(config.transfer.max_size, 1048576);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.log_dir.is_some());
}

#[test]
fn test_empty_config_file_is_all_defaults() {
    let file = NamedTempFile::new().unwrap();

    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.sync_mode().unwrap(), SyncMode::Bidirectional);
    assert_eq!(config.selections.a, "PRIMARY");
    assert_eq!(config.selections.b, "CLIPBOARD");
}

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    let error = Config::load(dir.path().join("nope.toml")).unwrap_err();
    assert!(format!("{:#}", error).contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[sync]\nmode = \"sideways\"").unwrap();
    assert!(Config::load(file.path()).is_err());

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[selections]\na = \"CLIPBOARD\"").unwrap();
    assert!(Config::load(file.path()).is_err());

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[transfer\nchunk_size = 10").unwrap();
    let error = Config::load(file.path()).unwrap_err();
    assert!(format!("{:#}", error).contains("Failed to parse config file"));
}
