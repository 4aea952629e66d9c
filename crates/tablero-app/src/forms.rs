// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

pub const ADMIN_REASON_PREFIX: &str = "(admin)";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelForm {
    pub reason: String,
}

impl CancelForm {
    pub fn validate(&self) -> Result<()> {
        if self.reason.trim().is_empty() {
            bail!("cancellation reason is required -- enter a reason and retry");
        }
        Ok(())
    }

    /// Reason as stored on the report, tagged so users can tell an admin
    /// cancelled it.
    pub fn admin_reason(&self) -> Result<String> {
        self.validate()?;
        Ok(format!("{ADMIN_REASON_PREFIX} {}", self.reason.trim()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            bail!("username is required -- pass --user <name> and retry");
        }
        if self.password.is_empty() {
            bail!("password is required -- set TABLERO_PASSWORD or type it at the prompt");
        }
        Ok(())
    }
}

/// Intake form attached to a completed report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportForm {
    #[serde(default, deserialize_with = "scalar_text")]
    pub nombres: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub apellido_paterno: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub apellido_materno: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub codigo_udg: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub fecha_nacimiento: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub descripcion_detallada: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub fecha_creacion: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub hora_creacion: Option<String>,
}

/// Accepts strings, numbers and booleans; codes and dates are not always
/// sent as strings.
fn scalar_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

impl ReportForm {
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        let show = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or("-")
                .to_owned()
        };
        vec![
            ("first names", show(&self.nombres)),
            ("paternal surname", show(&self.apellido_paterno)),
            ("maternal surname", show(&self.apellido_materno)),
            ("student code", show(&self.codigo_udg)),
            ("birth date", show(&self.fecha_nacimiento)),
            ("details", show(&self.descripcion_detallada)),
            ("created on", show(&self.fecha_creacion)),
            ("created at", show(&self.hora_creacion)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelForm, LoginForm, ReportForm};

    #[test]
    fn cancel_reason_is_required() {
        let form = CancelForm {
            reason: "   ".to_owned(),
        };
        let err = form.admin_reason().expect_err("blank reason should fail");
        assert!(err.to_string().contains("reason is required"));
    }

    #[test]
    fn cancel_reason_is_tagged() {
        let form = CancelForm {
            reason: "  duplicado ".to_owned(),
        };
        assert_eq!(form.admin_reason().expect("valid reason"), "(admin) duplicado");
    }

    #[test]
    fn login_requires_both_fields() {
        let missing_user = LoginForm {
            username: " ".to_owned(),
            password: "secret".to_owned(),
        };
        assert!(missing_user.validate().is_err());

        let missing_password = LoginForm {
            username: "admin".to_owned(),
            password: String::new(),
        };
        let err = missing_password.validate().expect_err("password required");
        assert!(err.to_string().contains("TABLERO_PASSWORD"));
    }

    #[test]
    fn report_form_rows_fill_blanks() {
        let form: ReportForm = serde_json::from_str(
            r#"{"nombres": "Ana", "codigo_udg": "", "fecha_nacimiento": null, "hora_creacion": "10:30", "extra": 1}"#,
        )
        .expect("decode form");
        let rows = form.rows();
        assert_eq!(rows[0], ("first names", "Ana".to_owned()));
        assert_eq!(rows[3], ("student code", "-".to_owned()));
        assert_eq!(rows[7], ("created at", "10:30".to_owned()));
        assert_eq!(rows.len(), 8);

        let numeric: ReportForm =
            serde_json::from_str(r#"{"codigo_udg": 218000123}"#).expect("decode numeric code");
        assert_eq!(numeric.codigo_udg.as_deref(), Some("218000123"));
    }
}
