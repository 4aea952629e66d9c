// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::ids::*;

/// Column the server attaches to every report that is never shown.
pub const HIDDEN_COLUMN: &str = "usuario_id";

/// A report record as delivered by the search endpoint. The server owns the
/// shape; the dashboard only relies on a handful of well-known keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report(Map<String, Value>);

impl Report {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<ReportId> {
        match self.0.get("id")? {
            Value::Number(number) => number.as_i64().map(ReportId::new),
            Value::String(text) => text.trim().parse::<i64>().ok().map(ReportId::new),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_owned(), value);
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Displayed columns in server order.
    pub fn columns(&self) -> Vec<String> {
        self.0
            .keys()
            .filter(|key| key.as_str() != HIDDEN_COLUMN)
            .cloned()
            .collect()
    }

    pub fn display_value(&self, key: &str) -> String {
        match self.0.get(key) {
            None | Some(Value::Null) => "-".to_owned(),
            Some(Value::String(text)) => text.clone(),
            Some(Value::Bool(flag)) => flag.to_string(),
            Some(Value::Number(number)) => number.to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// Column order for a table of reports: keys of the first record.
pub fn report_columns(reports: &[Report]) -> Vec<String> {
    reports.first().map(Report::columns).unwrap_or_default()
}

/// Turns a server key into a column heading: `fechaCreacion` and
/// `fecha_creacion` both become `Fecha Creacion`.
pub fn format_header(key: &str) -> String {
    if key == "id" {
        return "ID".to_owned();
    }

    let chars: Vec<char> = key.chars().collect();
    let mut spaced = String::with_capacity(key.len() + 4);
    for (index, ch) in chars.iter().enumerate() {
        if index > 0 && ch.is_ascii_uppercase() {
            let prev = chars[index - 1];
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() {
                spaced.push(' ');
            }
        }
        if *ch == '_' {
            spaced.push(' ');
        } else {
            spaced.extend(ch.to_lowercase());
        }
    }

    let mut out = String::with_capacity(spaced.len());
    let mut at_boundary = true;
    for ch in spaced.chars() {
        let word = ch.is_ascii_alphanumeric();
        if word && at_boundary {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
        at_boundary = !word;
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldCode {
    Cor,
    Nom,
    Cod,
    Id,
    Des,
}

impl FieldCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cor => "cor",
            Self::Nom => "nom",
            Self::Cod => "cod",
            Self::Id => "id",
            Self::Des => "des",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Cor => "email",
            Self::Nom => "name",
            Self::Cod => "code",
            Self::Id => "report id",
            Self::Des => "description",
        }
    }
}

/// Recognized search fields. Older API revisions matched on name (`nom`)
/// where the current one matches on email (`cor`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldSchema {
    #[default]
    Current,
    Legacy,
}

impl FieldSchema {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Legacy => "legacy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "current" => Some(Self::Current),
            "legacy" => Some(Self::Legacy),
            _ => None,
        }
    }

    /// Fields in declaration order; output buckets follow this order.
    pub const fn fields(self) -> [FieldCode; 4] {
        match self {
            Self::Current => [FieldCode::Cor, FieldCode::Cod, FieldCode::Id, FieldCode::Des],
            Self::Legacy => [FieldCode::Nom, FieldCode::Cod, FieldCode::Id, FieldCode::Des],
        }
    }

    pub fn field(self, name: &str) -> Option<FieldCode> {
        self.fields()
            .into_iter()
            .find(|field| field.as_str() == name)
    }

    pub fn allowed_list(self) -> String {
        self.fields()
            .iter()
            .map(|field| field.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Section {
    Reports,
    Session,
}

impl Section {
    pub const ALL: [Self; 2] = [Self::Reports, Self::Session];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Reports => "reports",
            Self::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingKey {
    AccessToken,
    SearchValue,
    SidebarCollapsed,
}

impl SettingKey {
    pub const ALL: [Self; 3] = [Self::AccessToken, Self::SearchValue, Self::SidebarCollapsed];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "session.access_token",
            Self::SearchValue => "search.value",
            Self::SidebarCollapsed => "ui.sidebar_collapsed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "session.access_token" => Some(Self::AccessToken),
            "search.value" => Some(Self::SearchValue),
            "ui.sidebar_collapsed" => Some(Self::SidebarCollapsed),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::AccessToken => "access token",
            Self::SearchValue => "saved search",
            Self::SidebarCollapsed => "sidebar collapsed",
        }
    }

    pub const fn expected_value_kind(self) -> SettingValueKind {
        match self {
            Self::AccessToken | Self::SearchValue => SettingValueKind::Text,
            Self::SidebarCollapsed => SettingValueKind::Bool,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingValueKind {
    Bool,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingValue {
    Bool(bool),
    Text(String),
}

impl SettingValue {
    pub fn parse_for_key(key: SettingKey, raw: &str) -> Option<Self> {
        match key.expected_value_kind() {
            SettingValueKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Some(Self::Bool(true)),
                "0" | "false" | "off" | "no" => Some(Self::Bool(false)),
                _ => None,
            },
            SettingValueKind::Text => Some(Self::Text(raw.to_owned())),
        }
    }

    pub fn to_storage(&self, key: SettingKey) -> Option<String> {
        match (key.expected_value_kind(), self) {
            (SettingValueKind::Bool, Self::Bool(value)) => {
                Some(if *value { "true" } else { "false" }.to_owned())
            }
            (SettingValueKind::Text, Self::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMode {
    Nav,
    Search,
    Menu,
    Prompt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub id: SearchHistoryId,
    pub query: String,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        FieldCode, FieldSchema, Report, SettingKey, SettingValue, format_header, report_columns,
    };
    use crate::ReportId;

    fn report(value: serde_json::Value) -> Report {
        Report::from_value(value).expect("object report")
    }

    #[test]
    fn headers_split_camel_case_and_underscores() {
        assert_eq!(format_header("id"), "ID");
        assert_eq!(format_header("fecha_creacion"), "Fecha Creacion");
        assert_eq!(format_header("fechaCreacion"), "Fecha Creacion");
        assert_eq!(format_header("codigo_udg2Value"), "Codigo Udg2 Value");
        assert_eq!(format_header("ESTADO"), "Estado");
    }

    #[test]
    fn columns_skip_owner_and_keep_server_order() {
        let reports = vec![report(json!({
            "id": 3,
            "usuario_id": 9,
            "estado": "Activo",
            "descripcion": "fuga",
        }))];
        assert_eq!(report_columns(&reports), vec!["id", "estado", "descripcion"]);
        assert!(report_columns(&[]).is_empty());
    }

    #[test]
    fn display_values_render_nulls_and_objects() {
        let row = report(json!({
            "id": "12",
            "nota": null,
            "meta": {"a": 1},
            "ok": true,
        }));
        assert_eq!(row.id(), Some(ReportId::new(12)));
        assert_eq!(row.display_value("nota"), "-");
        assert_eq!(row.display_value("missing"), "-");
        assert_eq!(row.display_value("meta"), r#"{"a":1}"#);
        assert_eq!(row.display_value("ok"), "true");
    }

    #[test]
    fn legacy_schema_swaps_email_for_name() {
        assert_eq!(FieldSchema::Current.field("cor"), Some(FieldCode::Cor));
        assert_eq!(FieldSchema::Current.field("nom"), None);
        assert_eq!(FieldSchema::Legacy.field("nom"), Some(FieldCode::Nom));
        assert_eq!(FieldSchema::Legacy.allowed_list(), "nom, cod, id, des");
        assert_eq!(FieldSchema::parse("legacy"), Some(FieldSchema::Legacy));
        assert_eq!(FieldSchema::parse("v1"), None);
    }

    #[test]
    fn bool_setting_parses_loose_forms() {
        let parsed = SettingValue::parse_for_key(SettingKey::SidebarCollapsed, " On ")
            .expect("parse on bool setting");
        assert_eq!(parsed, SettingValue::Bool(true));
        assert_eq!(
            parsed.to_storage(SettingKey::SidebarCollapsed),
            Some("true".to_owned())
        );
        assert!(SettingValue::parse_for_key(SettingKey::SidebarCollapsed, "maybe").is_none());
    }

    #[test]
    fn mismatched_setting_value_type_rejected() {
        let flag = SettingValue::Bool(true);
        assert!(flag.to_storage(SettingKey::AccessToken).is_none());
    }
}
