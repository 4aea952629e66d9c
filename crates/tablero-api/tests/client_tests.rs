// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use std::io::Read;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tablero_api::{ApiError, Client};
use tablero_app::ReportId;
use tiny_http::{Header, Response, Server};

#[derive(Debug)]
struct Seen {
    method: String,
    url: String,
    auth: Option<String>,
    content_type: Option<String>,
    body: String,
}

/// Answers each request with the next canned `(status, body)` and hands back
/// what the client sent.
fn mock_server(replies: Vec<(u16, &'static str)>) -> Result<(String, JoinHandle<Vec<Seen>>)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for (status, body) in replies {
            let mut request = server.recv().expect("request expected");
            let header = |name: &str| {
                request
                    .headers()
                    .iter()
                    .find(|header| header.field.as_str().as_str().eq_ignore_ascii_case(name))
                    .map(|header| header.value.as_str().to_owned())
            };
            let auth = header("Authorization");
            let content_type = header("Content-Type");
            let mut sent = String::new();
            request
                .as_reader()
                .read_to_string(&mut sent)
                .expect("read request body");
            seen.push(Seen {
                method: request.method().as_str().to_owned(),
                url: request.url().to_owned(),
                auth,
                content_type,
                body: sent,
            });

            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(
                    Header::from_bytes("Content-Type", "application/json")
                        .expect("valid content type header"),
                );
            request.respond(response).expect("response should succeed");
        }
        seen
    });

    Ok((addr, handle))
}

#[test]
fn unreachable_server_error_is_actionable() {
    let client = Client::new("http://127.0.0.1:1", Duration::from_millis(50))
        .expect("client should initialize")
        .with_token("t0k");

    let error = client
        .search("")
        .expect_err("search should fail for unreachable endpoint");
    assert!(ApiError::is_connection(&error));
    assert!(error.to_string().contains("whether the API is running"));
}

#[test]
fn login_stores_token_after_admin_check() -> Result<()> {
    let (addr, handle) = mock_server(vec![
        (200, r#"{"access_token":"abc123","token_type":"bearer"}"#),
        (200, r#"{"rol":"admin","username":"root"}"#),
    ])?;

    let mut client = Client::new(&addr, Duration::from_secs(2))?;
    let session = client.login("root", "p@ss word")?;
    assert_eq!(session.token, "abc123");
    assert_eq!(session.profile.display_name(), Some("root"));
    assert_eq!(client.token(), Some("abc123"));

    let seen = handle.join().expect("server thread should join");
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].url, "/token");
    assert_eq!(
        seen[0].content_type.as_deref(),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(seen[0].body, "username=root&password=p%40ss+word");
    assert_eq!(seen[1].url, "/me");
    assert_eq!(seen[1].auth.as_deref(), Some("Bearer abc123"));
    Ok(())
}

#[test]
fn login_rejects_non_admin_and_drops_token() -> Result<()> {
    let (addr, handle) = mock_server(vec![
        (200, r#"{"access_token":"abc123"}"#),
        (200, r#"{"rol":"alumno"}"#),
    ])?;

    let mut client = Client::new(&addr, Duration::from_secs(2))?;
    let error = client.login("ana", "secret").expect_err("non-admin");
    assert_eq!(
        error.downcast_ref::<ApiError>(),
        Some(&ApiError::AccessDenied {
            role: "alumno".to_owned()
        })
    );
    assert!(client.token().is_none());

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn login_reports_bad_credentials() -> Result<()> {
    let (addr, handle) = mock_server(vec![(401, r#"{"detail":"Incorrect username"}"#)])?;

    let mut client = Client::new(&addr, Duration::from_secs(2))?;
    let error = client.login("ana", "wrong").expect_err("bad credentials");
    assert_eq!(error.to_string(), "incorrect username or password");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn search_sends_query_and_bearer() -> Result<()> {
    let (addr, handle) = mock_server(vec![
        (200, r#"[{"id":2,"usuario_id":5,"estado":"Activo"},{"id":1,"estado":"Cancelado"}]"#),
        (200, "[]"),
    ])?;

    let client = Client::new(&addr, Duration::from_secs(2))?.with_token("tok");
    let reports = client.search("cor=a%40b.com&cod=X1")?;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].id(), Some(ReportId::new(2)));
    assert_eq!(reports[0].columns(), vec!["id", "estado"]);

    assert!(client.search("")?.is_empty());

    let seen = handle.join().expect("server thread should join");
    assert_eq!(seen[0].url, "/search-advanced?cor=a%40b.com&cod=X1");
    assert_eq!(seen[0].auth.as_deref(), Some("Bearer tok"));
    assert_eq!(seen[1].url, "/search-advanced");
    Ok(())
}

#[test]
fn expired_token_is_unauthorized() -> Result<()> {
    let (addr, handle) = mock_server(vec![
        (401, r#"{"detail":"Could not validate credentials"}"#),
        (403, r#"{"detail":"Forbidden"}"#),
    ])?;

    let client = Client::new(&addr, Duration::from_secs(2))?.with_token("old");
    let error = client.search("").expect_err("expired");
    assert!(ApiError::is_unauthorized(&error));
    assert!(!client.verify_session()?);

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn cancel_sets_status_then_reason() -> Result<()> {
    let (addr, handle) = mock_server(vec![(200, "{}"), (200, "{}")])?;

    let client = Client::new(&addr, Duration::from_secs(2))?.with_token("tok");
    client.cancel_report(ReportId::new(7), "(admin) duplicado / spam")?;

    let seen = handle.join().expect("server thread should join");
    assert_eq!(seen[0].method, "PUT");
    assert_eq!(seen[0].url, "/tasks/7/estado");
    let body: serde_json::Value = serde_json::from_str(&seen[0].body)?;
    assert_eq!(body, serde_json::json!({"id": 7, "estado": "Cancelado"}));
    assert_eq!(seen[1].method, "PUT");
    assert_eq!(seen[1].url, "/tasks/7/(admin)%20duplicado%20%2F%20spam");
    Ok(())
}

#[test]
fn cancel_requires_reason_before_any_request() {
    let client = Client::new("http://127.0.0.1:1", Duration::from_millis(50))
        .expect("client should initialize")
        .with_token("tok");
    let error = client
        .cancel_report(ReportId::new(1), "  ")
        .expect_err("blank reason");
    assert!(error.to_string().contains("reason is required"));
}

#[test]
fn pending_delete_and_form_hit_task_routes() -> Result<()> {
    let (addr, handle) = mock_server(vec![
        (200, "{}"),
        (200, "{}"),
        (
            200,
            r#"{"nombres":"Ana","apellido_paterno":"Ruiz","codigo_udg":"218000123","hora_creacion":"09:15"}"#,
        ),
    ])?;

    let client = Client::new(&addr, Duration::from_secs(2))?.with_token("tok");
    client.mark_pending(ReportId::new(3))?;
    client.delete_report(ReportId::new(4))?;
    let form = client.report_form(ReportId::new(5))?;
    assert_eq!(form.nombres.as_deref(), Some("Ana"));
    assert_eq!(form.hora_creacion.as_deref(), Some("09:15"));

    let seen = handle.join().expect("server thread should join");
    assert_eq!((seen[0].method.as_str(), seen[0].url.as_str()), ("PUT", "/tasks/3/estado"));
    assert!(seen[0].body.contains("\"Pendiente\""));
    assert_eq!((seen[1].method.as_str(), seen[1].url.as_str()), ("DELETE", "/tasks/4"));
    assert_eq!(
        (seen[2].method.as_str(), seen[2].url.as_str()),
        ("GET", "/tasks/5/formulario")
    );
    Ok(())
}

#[test]
fn server_errors_keep_detail() -> Result<()> {
    let (addr, handle) = mock_server(vec![(404, r#"{"detail":"Reporte no encontrado"}"#)])?;

    let client = Client::new(&addr, Duration::from_secs(2))?.with_token("tok");
    let error = client.delete_report(ReportId::new(99)).expect_err("missing");
    let message = format!("{error:#}");
    assert!(message.contains("delete report 99"));
    assert!(message.contains("Reporte no encontrado"));

    handle.join().expect("server thread should join");
    Ok(())
}
