// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use percent_encoding::percent_decode_str;
use serde_json::json;
use std::path::PathBuf;
use tablero_api::{ApiError, Client, STATUS_CANCELLED, STATUS_PENDING};
use tablero_app::{COMBINED_KEY, QueryParser, Report, ReportForm, ReportId};
use tablero_db::Store;
use tablero_testkit::ReportFaker;
use tablero_tui::{AppRuntime, FailureKind};
use time::OffsetDateTime;

use crate::export;

/// Dashboard runtime backed by the report API, with session state kept in
/// the local store.
pub struct ApiRuntime<'a> {
    client: Client,
    store: &'a Store,
    parser: QueryParser,
    export_dir: PathBuf,
    label: String,
}

impl<'a> ApiRuntime<'a> {
    pub fn new(
        client: Client,
        store: &'a Store,
        parser: QueryParser,
        export_dir: PathBuf,
        label: String,
    ) -> Self {
        Self {
            client,
            store,
            parser,
            export_dir,
            label,
        }
    }
}

impl AppRuntime for ApiRuntime<'_> {
    fn query_parser(&self) -> QueryParser {
        self.parser
    }

    fn search_reports(&mut self, query: &str) -> Result<Vec<Report>> {
        self.client.search(query)
    }

    fn verify_session(&mut self) -> Result<bool> {
        self.client.verify_session()
    }

    fn mark_pending(&mut self, id: ReportId) -> Result<()> {
        self.client.mark_pending(id)
    }

    fn cancel_report(&mut self, id: ReportId, reason: &str) -> Result<()> {
        self.client.cancel_report(id, reason)
    }

    fn delete_report(&mut self, id: ReportId) -> Result<()> {
        self.client.delete_report(id)
    }

    fn report_form(&mut self, id: ReportId) -> Result<ReportForm> {
        self.client.report_form(id)
    }

    fn export_reports(&mut self, reports: &[Report]) -> Result<PathBuf> {
        export::export_reports(reports, &self.export_dir, OffsetDateTime::now_utc())
    }

    fn load_saved_search(&mut self) -> Result<Option<String>> {
        self.store.get_saved_search()
    }

    fn save_search(&mut self, search: Option<&str>) -> Result<()> {
        self.store.put_saved_search(search)
    }

    fn load_search_history(&mut self) -> Result<Vec<String>> {
        history_queries(self.store)
    }

    fn append_search_history(&mut self, query: &str) -> Result<()> {
        self.store.append_search_history(query)
    }

    fn load_sidebar_collapsed(&mut self) -> Result<bool> {
        self.store.get_sidebar_collapsed()
    }

    fn save_sidebar_collapsed(&mut self, collapsed: bool) -> Result<()> {
        self.store.put_sidebar_collapsed(collapsed)
    }

    fn logout(&mut self) -> Result<()> {
        self.client.clear_token();
        self.store.clear_session()
    }

    fn session_label(&self) -> String {
        format!("{} at {}", self.label, self.client.base_url())
    }

    fn failure_kind(&self, error: &anyhow::Error) -> FailureKind {
        if ApiError::is_unauthorized(error) {
            FailureKind::SessionExpired
        } else if ApiError::is_connection(error) {
            FailureKind::Unreachable
        } else {
            FailureKind::Other
        }
    }
}

/// Offline runtime over generated reports. Actions edit the in-memory list
/// the same way the server would.
pub struct DemoRuntime<'a> {
    store: &'a Store,
    faker: ReportFaker,
    reports: Vec<Report>,
    parser: QueryParser,
    export_dir: PathBuf,
}

impl<'a> DemoRuntime<'a> {
    pub fn new(store: &'a Store, seed: u64, parser: QueryParser, export_dir: PathBuf) -> Self {
        let mut faker = ReportFaker::new(seed);
        let count = 24 + faker.int_n(16);
        let reports = faker.reports(count);
        Self {
            store,
            faker,
            reports,
            parser,
            export_dir,
        }
    }

    fn report_mut(&mut self, id: ReportId) -> Result<&mut Report> {
        match self.reports.iter_mut().find(|report| report.id() == Some(id)) {
            Some(report) => Ok(report),
            None => bail!("report {id} not found"),
        }
    }
}

impl AppRuntime for DemoRuntime<'_> {
    fn query_parser(&self) -> QueryParser {
        self.parser
    }

    fn search_reports(&mut self, query: &str) -> Result<Vec<Report>> {
        Ok(self
            .reports
            .iter()
            .filter(|report| demo_matches(report, query))
            .cloned()
            .collect())
    }

    fn verify_session(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn mark_pending(&mut self, id: ReportId) -> Result<()> {
        set_status(self.report_mut(id)?, STATUS_PENDING);
        Ok(())
    }

    fn cancel_report(&mut self, id: ReportId, reason: &str) -> Result<()> {
        let report = self.report_mut(id)?;
        set_status(report, STATUS_CANCELLED);
        report.set("motivo", json!(reason));
        Ok(())
    }

    fn delete_report(&mut self, id: ReportId) -> Result<()> {
        let before = self.reports.len();
        self.reports.retain(|report| report.id() != Some(id));
        if self.reports.len() == before {
            bail!("report {id} not found");
        }
        Ok(())
    }

    fn report_form(&mut self, _id: ReportId) -> Result<ReportForm> {
        Ok(self.faker.report_form())
    }

    fn export_reports(&mut self, reports: &[Report]) -> Result<PathBuf> {
        export::export_reports(reports, &self.export_dir, OffsetDateTime::now_utc())
    }

    fn load_saved_search(&mut self) -> Result<Option<String>> {
        self.store.get_saved_search()
    }

    fn save_search(&mut self, search: Option<&str>) -> Result<()> {
        self.store.put_saved_search(search)
    }

    fn load_search_history(&mut self) -> Result<Vec<String>> {
        history_queries(self.store)
    }

    fn append_search_history(&mut self, query: &str) -> Result<()> {
        self.store.append_search_history(query)
    }

    fn load_sidebar_collapsed(&mut self) -> Result<bool> {
        self.store.get_sidebar_collapsed()
    }

    fn save_sidebar_collapsed(&mut self, collapsed: bool) -> Result<()> {
        self.store.put_sidebar_collapsed(collapsed)
    }

    fn logout(&mut self) -> Result<()> {
        self.store.clear_session()
    }

    fn session_label(&self) -> String {
        format!("demo (seed {})", self.faker.seed())
    }
}

fn history_queries(store: &Store) -> Result<Vec<String>> {
    Ok(store
        .load_search_history()?
        .into_iter()
        .map(|entry| entry.query)
        .collect())
}

fn set_status(report: &mut Report, status: &str) {
    let key = if report.get("status").is_some() && report.get("estado").is_none() {
        "status"
    } else {
        "estado"
    };
    report.set(key, json!(status));
}

/// Local stand-in for the server's matching: a report is kept when any
/// single condition matches or every condition of a combined group does.
fn demo_matches(report: &Report, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    query.split('&').any(|pair| {
        let Some((field, raw)) = pair.split_once('=') else {
            return false;
        };
        let value = percent_decode_str(raw).decode_utf8_lossy();
        if field == COMBINED_KEY {
            value.split(':').all(|group| {
                group.split_once('=').is_some_and(|(field, values)| {
                    values
                        .split(',')
                        .all(|value| field_matches(report, field, value))
                })
            })
        } else {
            field_matches(report, field, &value)
        }
    })
}

fn field_matches(report: &Report, field: &str, needle: &str) -> bool {
    if field == "id" {
        return report
            .id()
            .is_some_and(|id| id.get().to_string() == needle.trim());
    }
    let key = match field {
        "cor" | "nom" => "correo",
        "cod" => "codigo",
        "des" => "descripcion",
        _ => return false,
    };
    let needle = needle.trim().to_lowercase();
    report
        .text(key)
        .is_some_and(|text| text.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::{DemoRuntime, demo_matches};
    use anyhow::Result;
    use serde_json::json;
    use tablero_app::{QueryParser, Report, classify, parse_query};
    use tablero_db::Store;
    use tablero_tui::AppRuntime;

    fn report(value: serde_json::Value) -> Report {
        Report::from_value(value).expect("object report")
    }

    #[test]
    fn demo_filter_follows_parsed_queries() -> Result<()> {
        let ana = report(json!({
            "id": 3,
            "correo": "ana.ruiz@alumnos.udg.mx",
            "codigo": "218000123",
            "descripcion": "Fuga de agua en laboratorio",
        }));

        assert!(demo_matches(&ana, ""));
        assert!(demo_matches(&ana, &parse_query("fuga")?));
        assert!(demo_matches(&ana, &parse_query("id=3")?));
        assert!(!demo_matches(&ana, &parse_query("id=4")?));
        assert!(demo_matches(&ana, &parse_query("cor=ana & cod=218")?));
        assert!(!demo_matches(&ana, &parse_query("cor=ana & cod=999")?));
        assert!(demo_matches(&ana, &parse_query("id=9 | des=laboratorio")?));
        Ok(())
    }

    #[test]
    fn demo_actions_edit_rows() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let temp = tempfile::tempdir()?;
        let mut runtime =
            DemoRuntime::new(&store, 7, QueryParser::default(), temp.path().to_path_buf());

        let rows = runtime.search_reports("")?;
        assert!(rows.len() >= 24);
        let id = rows[0].id().expect("demo rows have ids");

        runtime.mark_pending(id)?;
        let rows = runtime.search_reports(&format!("id={id}"))?;
        assert!(classify(&rows[0]).pending);

        runtime.cancel_report(id, "(admin) duplicado")?;
        let rows = runtime.search_reports(&format!("id={id}"))?;
        assert!(classify(&rows[0]).cancelled);
        assert_eq!(rows[0].text("motivo"), Some("(admin) duplicado"));

        runtime.delete_report(id)?;
        assert!(runtime.search_reports(&format!("id={id}"))?.is_empty());
        let error = runtime
            .delete_report(id)
            .expect_err("second delete should fail");
        assert!(error.to_string().contains("not found"));
        Ok(())
    }

    #[test]
    fn demo_session_state_lives_in_store() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let temp = tempfile::tempdir()?;
        let mut runtime =
            DemoRuntime::new(&store, 1, QueryParser::default(), temp.path().to_path_buf());

        runtime.save_search(Some("cod=21"))?;
        runtime.append_search_history("cod=21")?;
        assert_eq!(runtime.load_saved_search()?, Some("cod=21".to_owned()));
        assert_eq!(runtime.load_search_history()?, vec!["cod=21".to_owned()]);

        runtime.logout()?;
        assert_eq!(runtime.load_saved_search()?, None);
        Ok(())
    }
}
