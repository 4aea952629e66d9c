// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::path::Path;
use tablero_app::{SettingKey, SettingValue};
use tablero_db::{Store, validate_db_path};
use tablero_testkit::temp_db_path;

fn memory_store() -> Result<Store> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    Ok(store)
}

#[test]
fn validate_db_path_rejects_uri_forms() {
    assert!(validate_db_path("").is_err());
    assert!(validate_db_path("file:test.db").is_err());
    assert!(validate_db_path("https://example.com/db.sqlite").is_err());
    assert!(validate_db_path("db.sqlite?mode=ro").is_err());
    assert!(validate_db_path(":memory:").is_ok());
    assert!(validate_db_path("/tmp/tablero.db").is_ok());
}

#[test]
fn open_accepts_memory_path() -> Result<()> {
    let path = Path::new(":memory:");
    validate_db_path(&path.to_string_lossy())?;
    let store = Store::open(path)?;
    store.bootstrap()?;
    store.put_access_token("tok")?;
    assert_eq!(store.get_access_token()?, Some("tok".to_owned()));
    assert!(!path.exists());
    Ok(())
}

#[test]
fn bootstrap_is_idempotent() -> Result<()> {
    let store = memory_store()?;
    store.put_access_token("tok-1")?;
    store.bootstrap()?;
    assert_eq!(store.get_access_token()?, Some("tok-1".to_owned()));
    Ok(())
}

#[test]
fn bootstrap_rejects_schema_missing_required_column() -> Result<()> {
    let store = memory_store()?;
    store.raw_connection().execute_batch(
        "
            DROP TABLE search_history;
            CREATE TABLE search_history (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              query TEXT NOT NULL
            );
            ",
    )?;

    let error = store
        .bootstrap()
        .expect_err("bootstrap should reject a table without created_at");
    assert!(error.to_string().contains("created_at"));
    Ok(())
}

#[test]
fn bootstrap_rejects_foreign_database() -> Result<()> {
    let store = Store::open_memory()?;
    store
        .raw_connection()
        .execute_batch("CREATE TABLE projects (id INTEGER PRIMARY KEY);")?;

    let error = store
        .bootstrap()
        .expect_err("bootstrap should reject an unrelated schema");
    assert!(error.to_string().contains("missing required table `settings`"));
    Ok(())
}

#[test]
fn access_token_round_trip_and_clear() -> Result<()> {
    let store = memory_store()?;
    assert_eq!(store.get_access_token()?, None);

    store.put_access_token("eyJhbGciOi.first")?;
    store.put_access_token("eyJhbGciOi.second")?;
    assert_eq!(
        store.get_access_token()?,
        Some("eyJhbGciOi.second".to_owned())
    );

    assert!(store.put_access_token("   ").is_err());

    store.clear_access_token()?;
    assert_eq!(store.get_access_token()?, None);
    Ok(())
}

#[test]
fn saved_search_blank_removes_value() -> Result<()> {
    let store = memory_store()?;
    store.put_saved_search(Some("  cor=ana  "))?;
    assert_eq!(store.get_saved_search()?, Some("cor=ana".to_owned()));

    store.put_saved_search(Some("   "))?;
    assert_eq!(store.get_saved_search()?, None);

    store.put_saved_search(Some("cod=21"))?;
    store.put_saved_search(None)?;
    assert_eq!(store.get_saved_search()?, None);
    Ok(())
}

#[test]
fn clear_session_keeps_ui_settings_and_history() -> Result<()> {
    let store = memory_store()?;
    store.put_access_token("tok")?;
    store.put_saved_search(Some("des=fuga"))?;
    store.put_sidebar_collapsed(false)?;
    store.append_search_history("des=fuga")?;

    store.clear_session()?;

    assert_eq!(store.get_access_token()?, None);
    assert_eq!(store.get_saved_search()?, None);
    assert!(!store.get_sidebar_collapsed()?);
    assert_eq!(store.load_search_history()?.len(), 1);
    Ok(())
}

#[test]
fn sidebar_defaults_to_collapsed() -> Result<()> {
    let store = memory_store()?;
    assert!(store.get_sidebar_collapsed()?);

    store.put_sidebar_collapsed(false)?;
    assert!(!store.get_sidebar_collapsed()?);
    assert_eq!(
        store.get_setting(SettingKey::SidebarCollapsed)?,
        Some(SettingValue::Bool(false))
    );
    Ok(())
}

#[test]
fn corrupt_bool_setting_reports_recovery_hint() -> Result<()> {
    let store = memory_store()?;
    store.raw_connection().execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, 'maybe', '2026-01-01T00:00:00Z')",
        [SettingKey::SidebarCollapsed.as_str()],
    )?;

    let error = store
        .get_sidebar_collapsed()
        .expect_err("unparseable bool should fail");
    assert!(error.to_string().contains("tablero --logout"));
    Ok(())
}

#[test]
fn put_setting_rejects_mismatched_kind() -> Result<()> {
    let store = memory_store()?;
    let error = store
        .put_setting(SettingKey::AccessToken, SettingValue::Bool(true))
        .expect_err("token is text");
    assert!(error.to_string().contains("expected Text"));
    Ok(())
}

#[test]
fn search_history_skips_blank_and_consecutive_duplicates() -> Result<()> {
    let store = memory_store()?;
    store.append_search_history("cor=ana")?;
    store.append_search_history("  cor=ana ")?;
    store.append_search_history("")?;
    store.append_search_history("cod=21")?;
    store.append_search_history("cor=ana")?;

    let queries: Vec<String> = store
        .load_search_history()?
        .into_iter()
        .map(|entry| entry.query)
        .collect();
    assert_eq!(queries, vec!["cor=ana", "cod=21", "cor=ana"]);
    Ok(())
}

#[test]
fn search_history_keeps_newest_hundred() -> Result<()> {
    let store = memory_store()?;
    for index in 0..105 {
        store.append_search_history(&format!("id={index}"))?;
    }

    let history = store.load_search_history()?;
    assert_eq!(history.len(), 100);
    assert_eq!(history[0].query, "id=5");
    assert_eq!(history[99].query, "id=104");
    assert!(
        history.windows(2).all(|pair| pair[0].id < pair[1].id),
        "history is oldest first"
    );
    Ok(())
}

#[test]
fn file_store_survives_reopen() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    {
        let store = Store::open(&path)?;
        store.bootstrap()?;
        store.put_access_token("persisted")?;
        store.put_saved_search(Some("cor=luis"))?;
        store.append_search_history("cor=luis")?;
    }

    let store = Store::open(&path)?;
    store.bootstrap()?;
    assert_eq!(store.get_access_token()?, Some("persisted".to_owned()));
    assert_eq!(store.get_saved_search()?, Some("cor=luis".to_owned()));
    assert_eq!(store.load_search_history()?.len(), 1);
    Ok(())
}

#[cfg(unix)]
#[test]
fn file_store_is_owner_only() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, path) = temp_db_path()?;
    let store = Store::open(&path)?;
    store.bootstrap()?;
    store.put_access_token("secret")?;

    let mode = std::fs::metadata(&path)?.permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    let wal = path.with_file_name("tablero.db-wal");
    assert!(wal.exists(), "store runs in WAL mode");
    let wal_mode = std::fs::metadata(&wal)?.permissions().mode();
    assert_eq!(wal_mode & 0o077, 0, "WAL file must not be group/world readable");
    Ok(())
}
