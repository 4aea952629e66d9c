// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::Value;

use crate::Report;

const STATUS_KEYS: [&str; 2] = ["status", "estado"];
const CANCELLED_FLAGS: [&str; 2] = ["cancelled", "cancelado"];

const CANCELLED_WORDS: [&str; 4] = ["cancelado", "cancelled", "inactive", "inactivo"];
const COMPLETED_WORDS: [&str; 3] = ["completado", "completed", "finalizado"];
const PENDING_WORDS: [&str; 2] = ["pendiente", "pending"];

pub const FORM_DISABLED_REASON: &str = "not available for cancelled or pending reports";
pub const CANCEL_DISABLED_COMPLETED: &str = "not available for completed reports";
pub const CANCEL_DISABLED_CANCELLED: &str = "not available for cancelled reports";

/// Lifecycle flags derived from a report's free-text status. The flags are
/// independent: a status reading "pendiente, completado" sets both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowState {
    pub cancelled: bool,
    pub completed: bool,
    pub pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Pending,
    Completed,
    Cancelled,
}

impl Lifecycle {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What the form entry does for a row that allows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    MarkPending,
    ViewDetail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPermissions {
    pub form: Option<FormAction>,
    pub cancel_allowed: bool,
    pub delete_allowed: bool,
    completed: bool,
}

impl RowPermissions {
    pub const fn form_allowed(&self) -> bool {
        self.form.is_some()
    }

    pub const fn form_disabled_reason(&self) -> Option<&'static str> {
        if self.form.is_some() {
            None
        } else {
            Some(FORM_DISABLED_REASON)
        }
    }

    pub const fn cancel_disabled_reason(&self) -> Option<&'static str> {
        if self.cancel_allowed {
            None
        } else if self.completed {
            Some(CANCEL_DISABLED_COMPLETED)
        } else {
            Some(CANCEL_DISABLED_CANCELLED)
        }
    }
}

impl RowState {
    pub fn permissions(self) -> RowPermissions {
        let form = if self.cancelled || self.pending {
            None
        } else if self.completed {
            Some(FormAction::ViewDetail)
        } else {
            Some(FormAction::MarkPending)
        };
        RowPermissions {
            form,
            cancel_allowed: !(self.cancelled || self.completed),
            delete_allowed: true,
            completed: self.completed,
        }
    }

    /// Display label only; permissions read the raw flags.
    pub fn lifecycle(self) -> Lifecycle {
        if self.cancelled {
            Lifecycle::Cancelled
        } else if self.completed {
            Lifecycle::Completed
        } else if self.pending {
            Lifecycle::Pending
        } else {
            Lifecycle::Active
        }
    }
}

pub fn classify(report: &Report) -> RowState {
    let statuses: Vec<String> = STATUS_KEYS
        .iter()
        .filter_map(|key| report.text(key))
        .map(str::to_lowercase)
        .collect();
    let mentions = |words: &[&str]| {
        statuses
            .iter()
            .any(|status| words.iter().any(|word| status.contains(word)))
    };
    let flagged = CANCELLED_FLAGS
        .iter()
        .any(|key| matches!(report.get(key), Some(Value::Bool(true))));

    RowState {
        cancelled: flagged || mentions(&CANCELLED_WORDS),
        completed: mentions(&COMPLETED_WORDS),
        pending: mentions(&PENDING_WORDS),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Active,
    Pending,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelTone {
    Low,
    Medium,
    High,
}

pub fn is_status_column(column: &str) -> bool {
    let column = column.to_lowercase();
    column.contains("status") || column.contains("estado")
}

pub fn is_level_column(column: &str) -> bool {
    let column = column.to_lowercase();
    column.contains("nivel") || column.contains("level") || column.contains("priority")
}

/// Cell tone for a status column; first match wins, so "inactivo" reads as
/// active here even though the row classifies as cancelled.
pub fn status_tone(value: &str) -> Option<StatusTone> {
    let value = value.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|word| value.contains(word));
    if has(&["activo", "active"]) {
        Some(StatusTone::Active)
    } else if has(&["pending", "pendiente", "proceso"]) {
        Some(StatusTone::Pending)
    } else if has(&["completed", "completado", "finalizado"]) {
        Some(StatusTone::Completed)
    } else if has(&["cancelled", "cancelado"]) {
        Some(StatusTone::Cancelled)
    } else {
        None
    }
}

pub fn level_tone(value: &str) -> Option<LevelTone> {
    let value = value.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|word| value.contains(word));
    if has(&["1", "bajo", "low"]) {
        Some(LevelTone::Low)
    } else if has(&["2", "medio", "medium"]) {
        Some(LevelTone::Medium)
    } else if has(&["3", "alto", "high"]) {
        Some(LevelTone::High)
    } else {
        None
    }
}
