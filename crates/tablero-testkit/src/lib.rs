// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use tablero_app::{Report, ReportForm};
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, Time};

const REFERENCE_YEAR: i32 = 2026;

const STATUSES: [&str; 8] = [
    "Activo",
    "Activo",
    "En proceso",
    "Pendiente de revisión",
    "Completado",
    "Finalizado",
    "Cancelado",
    "Inactivo",
];

const LEVELS: [&str; 6] = ["1", "2", "3", "Bajo", "Medio", "Alto"];

const FIRST_NAMES: [&str; 16] = [
    "Ana", "Luis", "Sofía", "Diego", "Valeria", "Jorge", "Camila", "Mateo", "Lucía", "Andrés",
    "Paula", "Emilio", "Regina", "Tomás", "Ximena", "Iván",
];
const LAST_NAMES: [&str; 18] = [
    "García", "Hernández", "López", "Martínez", "González", "Pérez", "Rodríguez", "Sánchez",
    "Ramírez", "Torres", "Flores", "Rivera", "Gómez", "Díaz", "Cruz", "Morales", "Reyes",
    "Ortiz",
];

const PLACES: [&str; 10] = [
    "laboratorio",
    "biblioteca",
    "auditorio",
    "baño del edificio A",
    "estacionamiento",
    "cafetería",
    "aula 204",
    "centro de cómputo",
    "pasillo norte",
    "gimnasio",
];

const PROBLEMS: [&str; 10] = [
    "fuga de agua",
    "luminaria fundida",
    "proyector sin señal",
    "puerta atascada",
    "red inalámbrica caída",
    "aire acondicionado ruidoso",
    "vidrio roto",
    "contacto eléctrico dañado",
    "mancha de humedad",
    "silla rota",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Seeded generator for report records shaped like the search endpoint's
/// output. Status text, status key (`estado` or `status`) and the boolean
/// cancellation flag all vary so callers see every row shape.
#[derive(Debug, Clone)]
pub struct ReportFaker {
    rng: DeterministicRng,
    seed: u64,
    next_id: i64,
}

impl ReportFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
            next_id: 1,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn report(&mut self) -> Report {
        let status = self.pick(&STATUSES).to_owned();
        self.report_with_status(&status)
    }

    pub fn report_with_status(&mut self, status: &str) -> Report {
        let id = self.next_id;
        self.next_id += 1;

        let first = self.pick(&FIRST_NAMES);
        let last = self.pick(&LAST_NAMES);
        let created = self.created_at();
        let status_key = if self.rng.int_n(4) == 0 {
            "status"
        } else {
            "estado"
        };

        let mut fields = Map::new();
        fields.insert("id".to_owned(), json!(id));
        fields.insert("usuario_id".to_owned(), json!(100 + self.rng.int_n(50)));
        fields.insert("correo".to_owned(), json!(email(first, last)));
        fields.insert("codigo".to_owned(), json!(self.student_code()));
        fields.insert("descripcion".to_owned(), json!(self.description()));
        fields.insert(status_key.to_owned(), json!(status));
        fields.insert("nivel".to_owned(), json!(self.pick(&LEVELS)));
        fields.insert("fecha_creacion".to_owned(), json!(format_day(created)));
        if status.to_lowercase().contains("cancelado") {
            fields.insert(
                "motivo".to_owned(),
                json!(format!("(admin) {}", self.pick(&PROBLEMS))),
            );
        } else {
            fields.insert("motivo".to_owned(), Value::Null);
        }
        if self.rng.int_n(6) == 0 {
            fields.insert("cancelado".to_owned(), json!(status == "Cancelado"));
        }
        Report::new(fields)
    }

    pub fn reports(&mut self, count: usize) -> Vec<Report> {
        (0..count).map(|_| self.report()).collect()
    }

    pub fn report_form(&mut self) -> ReportForm {
        let created = self.created_at();
        let birth_year = 1995 + self.rng.int_n(12) as i32;
        let birth = Date::from_calendar_date(
            birth_year,
            Month::try_from(1 + self.rng.int_n(12) as u8).unwrap_or(Month::January),
            1 + self.rng.int_n(28) as u8,
        )
        .ok();
        ReportForm {
            nombres: Some(self.pick(&FIRST_NAMES).to_owned()),
            apellido_paterno: Some(self.pick(&LAST_NAMES).to_owned()),
            apellido_materno: Some(self.pick(&LAST_NAMES).to_owned()),
            codigo_udg: Some(self.student_code()),
            fecha_nacimiento: birth.map(|date| date.to_string()),
            descripcion_detallada: Some(self.description()),
            fecha_creacion: Some(format_day(created)),
            hora_creacion: created
                .format(format_description!("[hour]:[minute]"))
                .ok(),
        }
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn student_code(&mut self) -> String {
        format!("2{:08}", self.rng.next_u64() % 100_000_000)
    }

    fn description(&mut self) -> String {
        let problem = self.pick(&PROBLEMS);
        let place = self.pick(&PLACES);
        if self.rng.bool() {
            format!("{problem} en {place}")
        } else {
            let mut text = format!("{place}: {problem}");
            if let Some(first) = text.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            text
        }
    }

    fn created_at(&mut self) -> OffsetDateTime {
        let days = self.rng.int_n(120) as i64;
        let minutes = self.rng.int_n(24 * 60) as i64;
        reference_now() - Duration::days(days) + Duration::minutes(minutes)
    }
}

fn email(first: &str, last: &str) -> String {
    let clean = |name: &str| {
        name.chars()
            .map(|ch| match ch {
                'á' => 'a',
                'é' => 'e',
                'í' => 'i',
                'ó' => 'o',
                'ú' => 'u',
                other => other,
            })
            .collect::<String>()
            .to_lowercase()
    };
    format!("{}.{}@alumnos.udg.mx", clean(first), clean(last))
}

fn format_day(value: OffsetDateTime) -> String {
    value.date().to_string()
}

fn reference_now() -> OffsetDateTime {
    let date = Date::from_calendar_date(REFERENCE_YEAR, Month::February, 19)
        .unwrap_or(Date::MIN);
    date.with_time(Time::MIDNIGHT).assume_utc()
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("tablero.db");
    Ok((dir, db_path))
}

#[cfg(test)]
mod tests {
    use super::ReportFaker;
    use std::collections::BTreeSet;
    use tablero_app::{Lifecycle, classify};

    #[test]
    fn new_deterministic_seed() {
        let mut left = ReportFaker::new(42);
        let mut right = ReportFaker::new(42);
        assert_eq!(left.reports(5), right.reports(5));
    }

    #[test]
    fn ids_are_sequential() {
        let mut faker = ReportFaker::new(3);
        let ids: Vec<i64> = faker
            .reports(4)
            .iter()
            .filter_map(|report| report.id().map(|id| id.get()))
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn reports_cover_every_lifecycle() {
        let mut faker = ReportFaker::new(7);
        let seen: BTreeSet<&str> = faker
            .reports(80)
            .iter()
            .map(|report| classify(report).lifecycle().label())
            .collect();
        for lifecycle in [
            Lifecycle::Active,
            Lifecycle::Pending,
            Lifecycle::Completed,
            Lifecycle::Cancelled,
        ] {
            assert!(seen.contains(lifecycle.label()), "missing {lifecycle:?}");
        }
    }

    #[test]
    fn report_carries_hidden_owner_column() {
        let mut faker = ReportFaker::new(1);
        let report = faker.report_with_status("Activo");
        assert!(report.get("usuario_id").is_some());
        assert!(!report.columns().iter().any(|column| column == "usuario_id"));
        assert!(report.text("correo").is_some_and(|email| email.contains('@')));
    }

    #[test]
    fn report_form_is_filled() {
        let mut faker = ReportFaker::new(9);
        let form = faker.report_form();
        assert!(form.nombres.is_some());
        assert!(form.codigo_udg.as_deref().is_some_and(|code| code.len() == 9));
        assert!(form.hora_creacion.as_deref().is_some_and(|time| time.len() == 5));
    }

    #[test]
    fn int_n() {
        let mut faker = ReportFaker::new(42);
        for _ in 0..100 {
            assert!(faker.int_n(5) < 5);
        }
    }
}
