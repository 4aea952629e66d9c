// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tablero_app::{
    DEFAULT_REFRESH_INTERVAL, DEFAULT_SEARCH_DEBOUNCE, DEFAULT_VERIFY_INTERVAL, FieldSchema,
};
use tablero_tui::DashboardOptions;

const CONFIG_VERSION: i64 = 1;
const CONFIG_PATH_ENV: &str = "TABLERO_CONFIG_PATH";
const DEFAULT_TIMEOUT: &str = "10s";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub search: Search,
    #[serde(default)]
    pub polling: Polling,
    #[serde(default)]
    pub export: Export,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            storage: Storage::default(),
            search: Search::default(),
            polling: Polling::default(),
            export: Export::default(),
            logging: Logging::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: Some(tablero_api::DEFAULT_BASE_URL.to_owned()),
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Search {
    pub field_schema: Option<String>,
    pub debounce: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Polling {
    pub refresh_interval: Option<String>,
    pub verify_interval: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Export {
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            file: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(tablero_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version. Add `version = 1` at the top and keep values under [api], [storage], [search], [polling], [export], and [logging]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1. Regenerate it with `tablero --print-example-config`",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(base_url) = &self.api.base_url
            && base_url.trim().is_empty()
        {
            bail!(
                "api.base_url in {} is empty; set it to the server address, for example {}",
                path.display(),
                tablero_api::DEFAULT_BASE_URL
            );
        }

        if let Some(db_path) = &self.storage.db_path {
            tablero_db::validate_db_path(db_path)?;
        }

        if let Some(schema) = &self.search.field_schema
            && FieldSchema::parse(schema).is_none()
        {
            bail!(
                "search.field_schema in {} must be \"current\" or \"legacy\", got {schema:?}",
                path.display()
            );
        }

        let durations = [
            ("api.timeout", &self.api.timeout),
            ("search.debounce", &self.search.debounce),
            ("polling.refresh_interval", &self.polling.refresh_interval),
            ("polling.verify_interval", &self.polling.verify_interval),
        ];
        for (name, raw) in durations {
            if let Some(raw) = raw {
                let parsed = parse_duration(raw)
                    .with_context(|| format!("{name} in {}", path.display()))?;
                if parsed <= Duration::ZERO {
                    bail!(
                        "{name} in {} must be positive, got {raw}",
                        path.display()
                    );
                }
            }
        }

        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.api
            .base_url
            .as_deref()
            .unwrap_or(tablero_api::DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => tablero_db::default_db_path(),
        }
    }

    pub fn field_schema(&self) -> FieldSchema {
        self.search
            .field_schema
            .as_deref()
            .and_then(FieldSchema::parse)
            .unwrap_or_default()
    }

    pub fn dashboard_options(&self) -> Result<DashboardOptions> {
        Ok(DashboardOptions {
            refresh_interval: duration_or(
                self.polling.refresh_interval.as_deref(),
                DEFAULT_REFRESH_INTERVAL,
            )?,
            verify_interval: duration_or(
                self.polling.verify_interval.as_deref(),
                DEFAULT_VERIFY_INTERVAL,
            )?,
            search_debounce: duration_or(self.search.debounce.as_deref(), DEFAULT_SEARCH_DEBOUNCE)?,
        })
    }

    pub fn export_dir(&self) -> Result<PathBuf> {
        match &self.export.dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => env::current_dir().context("resolve current directory for exports"),
        }
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(file) = &self.logging.file {
            return Ok(PathBuf::from(file));
        }
        let data_root = dirs::data_local_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [logging].file to a writable log path")
        })?;
        let app_dir = data_root.join(tablero_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create data directory {}", app_dir.display()))?;
        Ok(app_dir.join("tablero.log"))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# tablero config\n# Place this file at: {}\n\nversion = 1\n\n[api]\nbase_url = \"{}\"\ntimeout = \"{}\"\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/tablero/tablero.db)\n# db_path = \"/absolute/path/to/tablero.db\"\n\n[search]\n# \"current\" searches by email (cor); \"legacy\" by name (nom)\nfield_schema = \"current\"\ndebounce = \"400ms\"\n\n[polling]\nrefresh_interval = \"3s\"\nverify_interval = \"30s\"\n\n[export]\n# Optional. Default is the current directory\n# dir = \"/absolute/export/dir\"\n\n[logging]\nlevel = \"{}\"\n# file = \"/absolute/path/tablero.log\"\n",
            path.display(),
            tablero_api::DEFAULT_BASE_URL,
            DEFAULT_TIMEOUT,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn duration_or(raw: Option<&str>, default: Duration) -> Result<Duration> {
    raw.map_or(Ok(default), parse_duration)
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 400ms or 3s)")
}
