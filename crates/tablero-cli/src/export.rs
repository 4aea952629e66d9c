// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use rust_xlsxwriter::{Format, FormatBorder, Workbook, Worksheet, XlsxError};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tablero_app::Report;
use time::OffsetDateTime;
use time::macros::format_description;

pub const SHEET_NAME: &str = "Reportes";
const MIN_COLUMN_WIDTH: usize = 8;
const MAX_COLUMN_WIDTH: usize = 60;

/// Every key of every record, in the order first seen. Unlike the table
/// view this keeps the owner column.
pub fn export_columns(reports: &[Report]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for report in reports {
        for key in report.keys() {
            if !columns.iter().any(|column| column == key) {
                columns.push(key.to_owned());
            }
        }
    }
    columns
}

pub fn export_file_name(now: OffsetDateTime) -> Result<String> {
    let stamp = now
        .format(format_description!(
            "[year]-[month]-[day]_[hour]-[minute]-[second]"
        ))
        .context("format export timestamp")?;
    Ok(format!("reportes_{stamp}.xlsx"))
}

pub fn export_reports(reports: &[Report], dir: &Path, now: OffsetDateTime) -> Result<PathBuf> {
    if reports.is_empty() {
        bail!("no data available to export; load reports first");
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("create export directory {}", dir.display()))?;
    let path = dir.join(export_file_name(now)?);
    let columns = export_columns(reports);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    write_sheet(worksheet, &columns, reports).context("write export sheet")?;
    workbook
        .save(&path)
        .with_context(|| format!("save export {}", path.display()))?;

    tracing::info!(path = %path.display(), rows = reports.len(), "reports exported");
    Ok(path)
}

fn write_sheet(
    worksheet: &mut Worksheet,
    columns: &[String],
    reports: &[Report],
) -> Result<(), XlsxError> {
    worksheet.set_name(SHEET_NAME)?;

    let header_format = Format::new().set_bold().set_border(FormatBorder::Thin);
    for (col, column) in columns.iter().enumerate() {
        let col = col as u16;
        worksheet.write_string_with_format(0, col, column, &header_format)?;

        let widest = reports
            .iter()
            .filter_map(|report| report.get(column))
            .map(|value| cell_text(value).chars().count())
            .chain([column.chars().count()])
            .max()
            .unwrap_or(MIN_COLUMN_WIDTH);
        let width = widest.clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH) + 2;
        worksheet.set_column_width(col, width as f64)?;
    }

    for (index, report) in reports.iter().enumerate() {
        let row = (index + 1) as u32;
        for (col, column) in columns.iter().enumerate() {
            let col = col as u16;
            match report.get(column) {
                None | Some(Value::Null) => {}
                Some(Value::Bool(flag)) => {
                    worksheet.write_boolean(row, col, *flag)?;
                }
                Some(Value::Number(number)) => match number.as_f64() {
                    Some(number) => {
                        worksheet.write_number(row, col, number)?;
                    }
                    None => {
                        worksheet.write_string(row, col, number.to_string())?;
                    }
                },
                Some(value) => {
                    worksheet.write_string(row, col, cell_text(value))?;
                }
            }
        }
    }
    Ok(())
}

/// Strings as-is, nested values as compact JSON.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{cell_text, export_columns, export_file_name, export_reports};
    use anyhow::Result;
    use serde_json::json;
    use tablero_app::Report;
    use tablero_testkit::ReportFaker;
    use time::macros::datetime;

    fn report(value: serde_json::Value) -> Report {
        Report::from_value(value).expect("object report")
    }

    #[test]
    fn columns_are_union_in_first_seen_order() {
        let reports = vec![
            report(json!({"id": 1, "usuario_id": 4, "estado": "Activo"})),
            report(json!({"id": 2, "motivo": "(admin) spam", "estado": "Cancelado"})),
        ];
        assert_eq!(
            export_columns(&reports),
            vec!["id", "usuario_id", "estado", "motivo"]
        );
    }

    #[test]
    fn file_name_uses_utc_stamp() -> Result<()> {
        let name = export_file_name(datetime!(2026-03-04 05:06:07 UTC))?;
        assert_eq!(name, "reportes_2026-03-04_05-06-07.xlsx");
        Ok(())
    }

    #[test]
    fn nested_values_become_compact_json() {
        assert_eq!(cell_text(&json!({"a": [1, 2]})), r#"{"a":[1,2]}"#);
        assert_eq!(cell_text(&json!("texto")), "texto");
        assert_eq!(cell_text(&json!(null)), "");
    }

    #[test]
    fn empty_export_is_refused() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let error = export_reports(&[], temp.path(), datetime!(2026-01-01 0:00 UTC))
            .expect_err("empty export should fail");
        assert!(error.to_string().contains("load reports first"));
        assert_eq!(std::fs::read_dir(temp.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn export_writes_xlsx_workbook() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut reports = ReportFaker::new(11).reports(12);
        reports.push(report(json!({"id": 99, "extra": {"k": true}, "cancelado": true})));

        let path = export_reports(
            &reports,
            &temp.path().join("exports"),
            datetime!(2026-02-19 12:34:56 UTC),
        )?;
        assert!(path.ends_with("reportes_2026-02-19_12-34-56.xlsx"));

        let bytes = std::fs::read(&path)?;
        assert!(bytes.starts_with(b"PK"), "xlsx is a zip container");
        Ok(())
    }
}
