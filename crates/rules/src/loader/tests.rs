//! Tests for the configuration loader module.

use std::fs;
use std::sync::Mutex;

use notify::event::{CreateKind, DataChange, ModifyKind};
use notify::{Event, EventKind};
use tempfile::TempDir;
use tokio::sync::mpsc;

use super::watcher::handle_fs_event;
use super::*;
use crate::error::RuleError;

const VALID_CONFIG: &str = r#"
address: "127.0.0.1:5678"
rules:
  - tags: [db]
    levels: [error]
    ding:
      enable: true
      senders: [{token: abc}]
"#;

const DUPLICATE_CONFIG: &str = r#"
rules:
  - {tags: [db], levels: [error]}
  - {tags: [DB], levels: [ERROR]}
"#;

fn temp_config(contents: &str) -> (TempDir, ConfigLoader) {
    let dir = TempDir::new().expect("create tempdir");
    let path = dir.path().join("cfg.yml");
    fs::write(&path, contents).unwrap();
    let loader = ConfigLoader::new(path);
    (dir, loader)
}

fn modify_event(path: &std::path::Path) -> Event {
    Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path.to_path_buf())
}

#[test]
fn load_config_from_file() {
    let (_dir, loader) = temp_config(VALID_CONFIG);
    let config = loader.load().unwrap();
    assert_eq!(config.rules.len(), 1);
    assert_eq!(config.rules[0].ding.senders[0].token, "abc");
}

#[test]
fn load_validated_builds_registry() {
    let (_dir, loader) = temp_config(VALID_CONFIG);
    let (_config, registry) = loader.load_validated().unwrap();
    assert!(registry.get("DB@ERROR").is_some());
}

#[test]
fn load_validated_rejects_duplicates() {
    let (_dir, loader) = temp_config(DUPLICATE_CONFIG);
    assert!(matches!(
        loader.load_validated(),
        Err(RuleError::DuplicateName { .. })
    ));
}

#[test]
fn missing_file_is_an_error() {
    let loader = ConfigLoader::new("/nonexistent/dir/cfg.yml");
    let err = loader.load().unwrap_err();
    assert!(err.to_string().contains("IO error"), "got: {err}");
}

#[test]
fn unparseable_file_is_an_error() {
    let (_dir, loader) = temp_config("rules: {not: [a list");
    assert!(matches!(loader.load(), Err(RuleError::Config(_))));
}

#[test]
fn env_override_applies_on_load() {
    std::env::set_var("LOGPUSH_DATA_CENTER", "loader-test-dc");
    let (_dir, loader) = temp_config(VALID_CONFIG);
    let config = loader.load().unwrap();
    std::env::remove_var("LOGPUSH_DATA_CENTER");
    assert_eq!(config.data_center.as_deref(), Some("loader-test-dc"));
}

#[test]
fn fs_event_forwards_changed_config() {
    let (_dir, loader) = temp_config(VALID_CONFIG);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let last = Mutex::new(Some(VALID_CONFIG.to_string()));

    let updated = VALID_CONFIG.replace("abc", "def");
    fs::write(loader.path(), &updated).unwrap();
    handle_fs_event(&modify_event(loader.path()), loader.path(), &last, &tx);

    let config = rx.try_recv().expect("config forwarded");
    assert_eq!(config.rules[0].ding.senders[0].token, "def");
}

#[test]
fn fs_event_skips_unchanged_contents() {
    let (_dir, loader) = temp_config(VALID_CONFIG);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let last = Mutex::new(Some(VALID_CONFIG.to_string()));

    handle_fs_event(&modify_event(loader.path()), loader.path(), &last, &tx);
    assert!(rx.try_recv().is_err());
}

#[test]
fn fs_event_skips_other_files() {
    let (dir, loader) = temp_config(VALID_CONFIG);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let last = Mutex::new(None);

    let other = dir.path().join("other.yml");
    fs::write(&other, VALID_CONFIG).unwrap();
    let event = Event::new(EventKind::Create(CreateKind::File)).add_path(other);
    handle_fs_event(&event, loader.path(), &last, &tx);
    assert!(rx.try_recv().is_err());
}

#[test]
fn fs_event_keeps_previous_on_parse_error() {
    let (_dir, loader) = temp_config(VALID_CONFIG);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let last = Mutex::new(Some(VALID_CONFIG.to_string()));

    fs::write(loader.path(), "rules: {broken").unwrap();
    handle_fs_event(&modify_event(loader.path()), loader.path(), &last, &tx);
    assert!(rx.try_recv().is_err());
}
