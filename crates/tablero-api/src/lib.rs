// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tablero_app::{Report, ReportForm, ReportId, encode_component};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const ADMIN_ROLE: &str = "admin";
pub const STATUS_CANCELLED: &str = "Cancelado";
pub const STATUS_PENDING: &str = "Pendiente";

/// Failures callers branch on. Everything else travels as plain `anyhow`
/// context; these are recovered with `downcast_ref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The token is missing, expired or rejected (401/403).
    Unauthorized { status: u16 },
    /// Credentials were rejected at login.
    BadCredentials,
    /// The account is valid but not an administrator.
    AccessDenied { role: String },
    Status { status: u16, message: String },
    Connection { base_url: String, detail: String },
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized { status } => write!(
                f,
                "session expired or rejected (HTTP {status}) -- log in again with --user <name>"
            ),
            Self::BadCredentials => f.write_str("incorrect username or password"),
            Self::AccessDenied { role } => {
                if role.is_empty() {
                    f.write_str("access denied: account is not an administrator")
                } else {
                    write!(f, "access denied: account role is {role:?}, not admin")
                }
            }
            Self::Status { status, message } => {
                if message.is_empty() {
                    write!(f, "server returned HTTP {status}")
                } else {
                    write!(f, "server error ({status}): {message}")
                }
            }
            Self::Connection { base_url, detail } => write!(
                f,
                "cannot reach {base_url} -- check the network or whether the API is running ({detail})"
            ),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn is_unauthorized(error: &anyhow::Error) -> bool {
        matches!(
            error.downcast_ref::<ApiError>(),
            Some(ApiError::Unauthorized { .. })
        )
    }

    pub fn is_connection(error: &anyhow::Error) -> bool {
        matches!(
            error.downcast_ref::<ApiError>(),
            Some(ApiError::Connection { .. })
        )
    }
}

/// The `/me` payload. Only the role is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    #[serde(default)]
    pub rol: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.rol == ADMIN_ROLE
    }

    /// A name to show in the header: username, then name, then email.
    pub fn display_name(&self) -> Option<&str> {
        ["username", "nombre", "correo", "email"]
            .iter()
            .find_map(|key| self.extra.get(*key).and_then(Value::as_str))
            .filter(|name| !name.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub profile: Profile,
}

#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    timeout: Duration,
    token: Option<String>,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("api.base_url must not be empty");
        }
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("api.base_url {base_url:?} is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "api.base_url {base_url:?} must use http or https, got {}",
                parsed.scheme()
            );
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            token: None,
            http,
        })
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.set_token(token);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_owned());
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Exchanges credentials for a token, then confirms the account is an
    /// administrator. The client keeps the token only when both succeed.
    pub fn login(&mut self, username: &str, password: &str) -> Result<Session> {
        let response = self
            .http
            .post(self.url("/token"))
            .form(&[("username", username), ("password", password)])
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            return Err(ApiError::BadCredentials.into());
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        let parsed: TokenResponse = response.json().context("decode token response")?;
        if parsed.access_token.trim().is_empty() {
            bail!("server returned an empty access token");
        }

        self.token = Some(parsed.access_token.clone());
        let profile = match self.me() {
            Ok(profile) => profile,
            Err(error) => {
                self.token = None;
                return Err(error.context("verify account role"));
            }
        };
        if !profile.is_admin() {
            self.token = None;
            return Err(ApiError::AccessDenied { role: profile.rol }.into());
        }

        tracing::info!(username, "logged in");
        Ok(Session {
            token: parsed.access_token,
            profile,
        })
    }

    pub fn me(&self) -> Result<Profile> {
        let response = self.send(self.http.get(self.url("/me")))?;
        response.json().context("decode profile")
    }

    /// `Ok(false)` when the server no longer accepts the token.
    pub fn verify_session(&self) -> Result<bool> {
        match self.me() {
            Ok(_) => Ok(true),
            Err(error) if ApiError::is_unauthorized(&error) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Runs a search; `query` is a normalized query string, empty for all.
    pub fn search(&self, query: &str) -> Result<Vec<Report>> {
        let mut url = self.url("/search-advanced");
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        let response = self.send(self.http.get(&url))?;
        let body: Value = response.json().context("decode search results")?;
        let reports = reports_from_value(body)?;
        tracing::debug!(%url, count = reports.len(), "search finished");
        Ok(reports)
    }

    pub fn update_status(&self, id: ReportId, estado: &str) -> Result<()> {
        let body = StatusUpdate {
            id: id.get(),
            estado,
        };
        self.send(
            self.http
                .put(self.url(&format!("/tasks/{id}/estado")))
                .json(&body),
        )
        .with_context(|| format!("set report {id} status to {estado}"))?;
        Ok(())
    }

    pub fn update_cancel_reason(&self, id: ReportId, reason: &str) -> Result<()> {
        let path = format!("/tasks/{id}/{}", encode_component(reason));
        self.send(self.http.put(self.url(&path)))
            .with_context(|| format!("store cancellation reason for report {id}"))?;
        Ok(())
    }

    /// Marks the report cancelled and records why. `reason` is stored as
    /// given; callers tag it with the admin prefix.
    pub fn cancel_report(&self, id: ReportId, reason: &str) -> Result<()> {
        if reason.trim().is_empty() {
            bail!("cancellation reason is required -- enter a reason and retry");
        }
        self.update_status(id, STATUS_CANCELLED)?;
        self.update_cancel_reason(id, reason)?;
        tracing::info!(%id, "cancelled report");
        Ok(())
    }

    pub fn mark_pending(&self, id: ReportId) -> Result<()> {
        self.update_status(id, STATUS_PENDING)?;
        tracing::info!(%id, "marked report pending");
        Ok(())
    }

    pub fn delete_report(&self, id: ReportId) -> Result<()> {
        self.send(self.http.delete(self.url(&format!("/tasks/{id}"))))
            .with_context(|| format!("delete report {id}"))?;
        tracing::info!(%id, "deleted report");
        Ok(())
    }

    pub fn report_form(&self, id: ReportId) -> Result<ReportForm> {
        let response = self
            .send(self.http.get(self.url(&format!("/tasks/{id}/formulario"))))
            .with_context(|| format!("load form for report {id}"))?;
        response.json().context("decode report form")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let Some(token) = self.token.as_deref() else {
            return Err(ApiError::Unauthorized { status: 401 }.into());
        };
        let response = request
            .bearer_auth(token)
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(status = status.as_u16(), "token rejected");
            return Err(ApiError::Unauthorized {
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }
        Ok(response)
    }
}

/// The endpoint answers with a list; a lone object is treated as one row.
pub fn reports_from_value(body: Value) -> Result<Vec<Report>> {
    match body {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                Report::from_value(item)
                    .ok_or_else(|| anyhow!("search result {index} is not an object"))
            })
            .collect(),
        Value::Object(fields) => Ok(vec![Report::new(fields)]),
        Value::Null => Ok(Vec::new()),
        other => bail!("unexpected search response: {other}"),
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    ApiError::Connection {
        base_url: base_url.to_owned(),
        detail: error.to_string(),
    }
    .into()
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    let message = if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(detail) = parsed.detail
    {
        match detail {
            Value::String(text) => text,
            other => other.to_string(),
        }
    } else if body.len() < 100 && !body.contains('{') {
        body.trim().to_owned()
    } else {
        String::new()
    };

    ApiError::Status {
        status: status.as_u16(),
        message,
    }
    .into()
}

#[derive(Debug, Serialize)]
struct StatusUpdate<'a> {
    id: i64,
    estado: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    detail: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::{ApiError, Client, Profile, clean_error_response, reports_from_value};
    use reqwest::StatusCode;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn client_rejects_bad_base_urls() {
        assert!(Client::new("", Duration::from_secs(1)).is_err());
        assert!(Client::new("localhost:8000", Duration::from_secs(1)).is_err());
        assert!(Client::new("ftp://host", Duration::from_secs(1)).is_err());

        let client =
            Client::new("http://localhost:8000/", Duration::from_secs(1)).expect("valid url");
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert!(client.token().is_none());
    }

    #[test]
    fn requests_without_token_are_unauthorized() {
        let client = Client::new("http://127.0.0.1:1", Duration::from_millis(50))
            .expect("client should initialize");
        let error = client.search("").expect_err("no token");
        assert!(ApiError::is_unauthorized(&error));
    }

    #[test]
    fn error_detail_is_surfaced() {
        let error = clean_error_response(
            StatusCode::NOT_FOUND,
            r#"{"detail": "Reporte no encontrado"}"#,
        );
        assert_eq!(error.to_string(), "server error (404): Reporte no encontrado");

        let plain = clean_error_response(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(plain.to_string(), "server error (502): upstream down");

        let opaque = clean_error_response(StatusCode::INTERNAL_SERVER_ERROR, "{not json");
        assert_eq!(opaque.to_string(), "server returned HTTP 500");
    }

    #[test]
    fn search_body_shapes() {
        let rows = reports_from_value(json!([{"id": 1}, {"id": 2}])).expect("list");
        assert_eq!(rows.len(), 2);
        let single = reports_from_value(json!({"id": 3})).expect("object");
        assert_eq!(single.len(), 1);
        assert!(reports_from_value(json!(null)).expect("null").is_empty());
        assert!(reports_from_value(json!([1])).is_err());
        assert!(reports_from_value(json!("nope")).is_err());
    }

    #[test]
    fn profile_reads_role_and_name() {
        let profile: Profile =
            serde_json::from_value(json!({"rol": "admin", "username": "ana"})).expect("profile");
        assert!(profile.is_admin());
        assert_eq!(profile.display_name(), Some("ana"));

        let user: Profile = serde_json::from_value(json!({"rol": "alumno"})).expect("profile");
        assert!(!user.is_admin());
        assert_eq!(user.display_name(), None);
    }
}
