// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tablero_app::{SearchHistoryEntry, SearchHistoryId, SettingKey, SettingValue};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const APP_NAME: &str = "tablero";
pub const DB_PATH_ENV: &str = "TABLERO_DB_PATH";

const SEARCH_HISTORY_MAX: i64 = 100;
const MEMORY_PATH: &str = ":memory:";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    ("settings", &["key", "value", "updated_at"]),
    ("search_history", &["id", "query", "created_at"]),
];

/// Local key-value state: the session token, the last search, UI toggles
/// and recent searches.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        if printable == MEMORY_PATH {
            return Self::open_memory();
        }

        // SQLite gives the -wal and -shm files the main file's mode, so the
        // main file must be private before WAL is switched on.
        set_private_permissions(path)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        tracing::debug!(path = %path.display(), "opened store");
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")
        }
    }

    pub fn get_setting(&self, key: SettingKey) -> Result<Option<SettingValue>> {
        let raw = self.get_setting_raw(key.as_str())?;
        raw.map(|value| {
            SettingValue::parse_for_key(key, &value).ok_or_else(|| {
                anyhow!(
                    "setting `{}` has invalid value `{}`; run `tablero --check`, then clear it with `tablero --logout`",
                    key.as_str(),
                    value
                )
            })
        })
        .transpose()
    }

    pub fn put_setting(&self, key: SettingKey, value: SettingValue) -> Result<()> {
        let raw = value.to_storage(key).ok_or_else(|| {
            anyhow!(
                "setting `{}` expected {:?} value",
                key.as_str(),
                key.expected_value_kind()
            )
        })?;
        self.put_setting_raw(key.as_str(), &raw)
    }

    pub fn clear_setting(&self, key: SettingKey) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?", params![key.as_str()])
            .with_context(|| format!("delete setting {}", key.as_str()))?;
        Ok(())
    }

    pub fn get_access_token(&self) -> Result<Option<String>> {
        self.get_text(SettingKey::AccessToken)
    }

    pub fn put_access_token(&self, token: &str) -> Result<()> {
        if token.trim().is_empty() {
            bail!("access token is empty -- log in again with --user <name>");
        }
        self.put_setting(SettingKey::AccessToken, SettingValue::Text(token.to_owned()))
    }

    pub fn clear_access_token(&self) -> Result<()> {
        self.clear_setting(SettingKey::AccessToken)
    }

    pub fn get_saved_search(&self) -> Result<Option<String>> {
        self.get_text(SettingKey::SearchValue)
    }

    /// Stores the search shown on the next launch; blank or `None` removes it.
    pub fn put_saved_search(&self, search: Option<&str>) -> Result<()> {
        match search.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => {
                self.put_setting(SettingKey::SearchValue, SettingValue::Text(value.to_owned()))
            }
            None => self.clear_setting(SettingKey::SearchValue),
        }
    }

    pub fn get_sidebar_collapsed(&self) -> Result<bool> {
        match self.get_setting(SettingKey::SidebarCollapsed)? {
            Some(SettingValue::Bool(value)) => Ok(value),
            Some(SettingValue::Text(_)) => bail!(
                "setting `{}` must be on/off",
                SettingKey::SidebarCollapsed.as_str()
            ),
            None => Ok(true),
        }
    }

    pub fn put_sidebar_collapsed(&self, collapsed: bool) -> Result<()> {
        self.put_setting(SettingKey::SidebarCollapsed, SettingValue::Bool(collapsed))
    }

    /// Logging out forgets the token and the last search together.
    pub fn clear_session(&self) -> Result<()> {
        self.clear_access_token()?;
        self.put_saved_search(None)?;
        tracing::info!("cleared stored session");
        Ok(())
    }

    pub fn append_search_history(&self, query: &str) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(());
        }

        let last_query: Option<String> = self
            .conn
            .query_row(
                "SELECT query FROM search_history ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("load last search")?;
        if last_query.as_deref() == Some(query) {
            return Ok(());
        }

        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT INTO search_history (query, created_at) VALUES (?, ?)",
                params![query, now],
            )
            .context("insert search history")?;

        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM search_history", [], |row| row.get(0))
            .context("count search history")?;

        if count > SEARCH_HISTORY_MAX {
            let excess = count - SEARCH_HISTORY_MAX;
            self.conn
                .execute(
                    "
                    DELETE FROM search_history
                    WHERE id IN (
                      SELECT id FROM search_history
                      ORDER BY id ASC
                      LIMIT ?
                    )
                    ",
                    params![excess],
                )
                .context("trim search history")?;
        }

        Ok(())
    }

    pub fn load_search_history(&self) -> Result<Vec<SearchHistoryEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, query, created_at FROM search_history ORDER BY id ASC")
            .context("prepare search history query")?;

        let rows = stmt
            .query_map([], |row| {
                let created_at_raw: String = row.get(2)?;
                Ok(SearchHistoryEntry {
                    id: SearchHistoryId::new(row.get(0)?),
                    query: row.get(1)?,
                    created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
                })
            })
            .context("query search history")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect search history")
    }

    fn get_text(&self, key: SettingKey) -> Result<Option<String>> {
        match self.get_setting(key)? {
            Some(SettingValue::Text(value)) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(trimmed.to_owned()))
                }
            }
            Some(SettingValue::Bool(_)) => bail!("setting `{}` must be text", key.as_str()),
            None => Ok(None),
        }
    }

    fn get_setting_raw(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("read setting {key}"))
    }

    fn put_setting_raw(&self, key: &str, value: &str) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO settings (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                  value = excluded.value,
                  updated_at = excluded.updated_at
                ",
                params![key, value, now],
            )
            .with_context(|| format!("upsert setting {key}"))?;
        Ok(())
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os(DB_PATH_ENV) {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set {DB_PATH_ENV} to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("tablero.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == MEMORY_PATH {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; point {DB_PATH_ENV} at a tablero database or remove the file"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; remove the database file and log in again",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    let names = rows
        .collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))?;
    Ok(names)
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

fn parse_datetime(raw: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).with_context(|| format!("invalid timestamp {raw:?}"))
}

fn to_sql_error(error: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            error.to_string(),
        )),
    )
}

/// The database holds a bearer token; keep it owner-only. Creates the file
/// when it does not exist yet.
fn set_private_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("create database file {}", path.display()))?;
        let mut permissions = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("set permissions on {}", path.display()))?;
    }
    Ok(())
}
