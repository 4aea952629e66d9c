// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};
use ratatui::{
    Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState},
};
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tablero_app::{
    AppCommand, AppMode, AppState, CancelForm,
    DEFAULT_REFRESH_INTERVAL, DEFAULT_SEARCH_DEBOUNCE, DEFAULT_VERIFY_INTERVAL, FormAction,
    LevelTone, Lifecycle, PollTick, PollTimer, QueryParser, Report, ReportForm, ReportId,
    RowPermissions, Section, SidebarState, StatusTone, classify, format_header, is_level_column,
    is_status_column, level_tone, report_columns, status_tone,
};

pub const NO_REPORTS_MESSAGE: &str = "no reports have been generated yet";
pub const NO_MATCHES_MESSAGE: &str = "the search returned no results; try other terms";
pub const CONNECTION_MESSAGE: &str =
    "connection error: cannot reach the server; check the network or whether the API is running";
pub const NOTHING_TO_EXPORT: &str = "no data available to export; load reports first";

const EVENT_POLL: Duration = Duration::from_millis(120);
const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);
const PAGE_ROWS: isize = 10;

/// How a runtime error should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Token rejected; the dashboard signs out.
    SessionExpired,
    Unreachable,
    Other,
}

/// Why the dashboard loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Quit,
    LoggedOut,
    Expired,
}

pub trait AppRuntime {
    fn query_parser(&self) -> QueryParser;
    fn search_reports(&mut self, query: &str) -> Result<Vec<Report>>;
    fn verify_session(&mut self) -> Result<bool>;
    fn mark_pending(&mut self, id: ReportId) -> Result<()>;
    fn cancel_report(&mut self, id: ReportId, reason: &str) -> Result<()>;
    fn delete_report(&mut self, id: ReportId) -> Result<()>;
    fn report_form(&mut self, id: ReportId) -> Result<ReportForm>;
    fn export_reports(&mut self, reports: &[Report]) -> Result<PathBuf>;
    fn load_saved_search(&mut self) -> Result<Option<String>>;
    fn save_search(&mut self, search: Option<&str>) -> Result<()>;
    fn load_search_history(&mut self) -> Result<Vec<String>>;
    fn append_search_history(&mut self, query: &str) -> Result<()>;
    fn load_sidebar_collapsed(&mut self) -> Result<bool>;
    fn save_sidebar_collapsed(&mut self, collapsed: bool) -> Result<()>;
    fn logout(&mut self) -> Result<()>;
    fn session_label(&self) -> String;

    fn failure_kind(&self, _error: &anyhow::Error) -> FailureKind {
        FailureKind::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardOptions {
    pub refresh_interval: Duration,
    pub verify_interval: Duration,
    pub search_debounce: Duration,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            verify_interval: DEFAULT_VERIFY_INTERVAL,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuItem {
    Form,
    Cancel,
    Delete,
}

impl MenuItem {
    const ALL: [Self; 3] = [Self::Form, Self::Cancel, Self::Delete];

    fn label(self, permissions: &RowPermissions) -> &'static str {
        match (self, permissions.form) {
            (Self::Form, Some(FormAction::ViewDetail)) => "view form",
            (Self::Form, Some(FormAction::MarkPending)) => "mark pending",
            (Self::Form, None) => "form",
            (Self::Cancel, _) => "cancel",
            (Self::Delete, _) => "delete",
        }
    }

    fn shortcut(self) -> char {
        match self {
            Self::Form => 'f',
            Self::Cancel => 'c',
            Self::Delete => 'd',
        }
    }

    fn disabled_reason(self, permissions: &RowPermissions) -> Option<&'static str> {
        match self {
            Self::Form => permissions.form_disabled_reason(),
            Self::Cancel => permissions.cancel_disabled_reason(),
            Self::Delete if permissions.delete_allowed => None,
            Self::Delete => Some("not available for this report"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActionMenu {
    id: ReportId,
    permissions: RowPermissions,
    cursor: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Prompt {
    CancelReason { id: ReportId, input: String },
    ConfirmDelete { id: ReportId },
    ConfirmLogout,
}

#[derive(Debug, Clone)]
struct DetailView {
    id: ReportId,
    form: ReportForm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableCommand {
    MoveRow(isize),
    JumpFirstRow,
    JumpLastRow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
}

#[derive(Debug)]
struct ViewData {
    options: DashboardOptions,
    session_label: String,
    reports: Vec<Report>,
    columns: Vec<String>,
    selected_row: usize,
    notice: Option<String>,
    menu: Option<ActionMenu>,
    prompt: Option<Prompt>,
    detail: Option<DetailView>,
    help_visible: bool,
    sidebar_cursor: usize,
    history: Vec<String>,
    history_cursor: Option<usize>,
    search_due: Option<Instant>,
    poll_timer: PollTimer,
    status_token: u64,
    outcome: Option<SessionOutcome>,
}

impl ViewData {
    fn new(options: DashboardOptions, now: Instant) -> Self {
        Self {
            options,
            session_label: String::new(),
            reports: Vec::new(),
            columns: Vec::new(),
            selected_row: 0,
            notice: None,
            menu: None,
            prompt: None,
            detail: None,
            help_visible: false,
            sidebar_cursor: 0,
            history: Vec::new(),
            history_cursor: None,
            search_due: None,
            poll_timer: PollTimer::new(options.refresh_interval, options.verify_interval, now),
            status_token: 0,
            outcome: None,
        }
    }

    fn selected_report(&self) -> Option<&Report> {
        self.reports.get(self.selected_row)
    }

    /// Replaces the rows, keeping the cursor on the same report when it
    /// survived the reload.
    fn set_reports(&mut self, reports: Vec<Report>, notice: Option<String>) {
        let selected_id = self.selected_report().and_then(Report::id);
        self.columns = report_columns(&reports);
        self.reports = reports;
        self.notice = notice;
        let position = selected_id.and_then(|id| {
            self.reports
                .iter()
                .position(|report| report.id() == Some(id))
        });
        self.selected_row = position
            .unwrap_or(self.selected_row)
            .min(self.reports.len().saturating_sub(1));
    }
}

pub fn run_app<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    options: DashboardOptions,
) -> Result<SessionOutcome> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let result = match Terminal::new(backend).context("create terminal") {
        Ok(mut terminal) => event_loop(&mut terminal, state, runtime, options),
        Err(error) => Err(error),
    };

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn event_loop<B: Backend, R: AppRuntime>(
    terminal: &mut Terminal<B>,
    state: &mut AppState,
    runtime: &mut R,
    options: DashboardOptions,
) -> Result<SessionOutcome> {
    let mut view_data = ViewData::new(options, Instant::now());
    let (internal_tx, internal_rx) = mpsc::channel();

    start_session(state, runtime, &mut view_data, &internal_tx);

    loop {
        process_internal_events(state, &mut view_data, &internal_rx);
        if let Some(outcome) = view_data.outcome {
            return Ok(outcome);
        }

        terminal
            .draw(|frame| render(frame, state, &view_data))
            .context("draw frame")?;

        if event::poll(EVENT_POLL).context("poll event")?
            && let Event::Key(key) = event::read().context("read event")?
            && handle_key_event(state, runtime, &mut view_data, &internal_tx, key)
        {
            return Ok(SessionOutcome::Quit);
        }

        run_timers(state, runtime, &mut view_data, &internal_tx, Instant::now());
    }
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn start_session<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    view_data.session_label = runtime.session_label();

    match runtime.load_sidebar_collapsed() {
        Ok(false) if state.sidebar == SidebarState::Collapsed => {
            state.dispatch(AppCommand::ToggleSidebar);
        }
        Ok(_) => {}
        Err(error) => tracing::warn!(error = %format!("{error:#}"), "load sidebar state"),
    }

    match runtime.load_search_history() {
        Ok(history) => view_data.history = history,
        Err(error) => tracing::warn!(error = %format!("{error:#}"), "load search history"),
    }

    match runtime.load_saved_search() {
        Ok(Some(search)) => {
            state.dispatch(AppCommand::SearchEdited(search));
        }
        Ok(None) => {}
        Err(error) => emit_status(
            state,
            view_data,
            internal_tx,
            format!("saved search unavailable: {error:#}"),
        ),
    }

    load_reports(state, runtime, view_data, internal_tx);
}

/// Fetches rows for the current search text. Syntax errors never reach the
/// server.
fn load_reports<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let query = match runtime.query_parser().parse(state.search_text.trim()) {
        Ok(query) => query,
        Err(error) => {
            let message = format!("search syntax error: {error}");
            view_data.set_reports(Vec::new(), Some(message.clone()));
            emit_status(state, view_data, internal_tx, message);
            return;
        }
    };

    match runtime.search_reports(&query) {
        Ok(reports) => {
            tracing::debug!(query = %query, rows = reports.len(), "reports loaded");
            let notice = if !reports.is_empty() {
                None
            } else if state.poll.has_search {
                Some(NO_MATCHES_MESSAGE.to_owned())
            } else {
                Some(NO_REPORTS_MESSAGE.to_owned())
            };
            view_data.set_reports(reports, notice);
        }
        Err(error) => match runtime.failure_kind(&error) {
            FailureKind::SessionExpired => {
                end_session(state, runtime, view_data, SessionOutcome::Expired);
            }
            FailureKind::Unreachable => {
                tracing::warn!(error = %format!("{error:#}"), "report search unreachable");
                view_data.set_reports(Vec::new(), Some(CONNECTION_MESSAGE.to_owned()));
            }
            FailureKind::Other => {
                tracing::warn!(error = %format!("{error:#}"), "report search failed");
                view_data.set_reports(Vec::new(), Some(format!("load failed: {error:#}")));
            }
        },
    }
}

fn report_failure<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    context: &str,
    error: anyhow::Error,
) {
    tracing::warn!(error = %format!("{error:#}"), "{context} failed");
    match runtime.failure_kind(&error) {
        FailureKind::SessionExpired => {
            end_session(state, runtime, view_data, SessionOutcome::Expired);
        }
        FailureKind::Unreachable => emit_status(state, view_data, internal_tx, CONNECTION_MESSAGE),
        FailureKind::Other => emit_status(
            state,
            view_data,
            internal_tx,
            format!("{context} failed: {error:#}"),
        ),
    }
}

fn end_session<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    outcome: SessionOutcome,
) {
    if let Err(error) = runtime.logout() {
        tracing::warn!(error = %format!("{error:#}"), "clear session");
    }
    tracing::info!(?outcome, "session ended");
    state.dispatch(AppCommand::SessionEnded);
    view_data.menu = None;
    view_data.prompt = None;
    view_data.detail = None;
    view_data.search_due = None;
    view_data.outcome = Some(outcome);
}

fn run_timers<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    now: Instant,
) {
    if view_data.search_due.is_some_and(|due| now >= due) {
        commit_search(state, runtime, view_data, internal_tx, false);
    }
    if view_data.outcome.is_some() {
        return;
    }

    match view_data.poll_timer.tick(now, state.poll) {
        PollTick::Idle => {}
        PollTick::Refresh => load_reports(state, runtime, view_data, internal_tx),
        PollTick::VerifyThenRefresh => match runtime.verify_session() {
            Ok(true) => load_reports(state, runtime, view_data, internal_tx),
            Ok(false) => end_session(state, runtime, view_data, SessionOutcome::Expired),
            Err(error) => report_failure(
                state,
                runtime,
                view_data,
                internal_tx,
                "verify session",
                error,
            ),
        },
    }
}

/// Persists the search text and reloads. `remember` also files it in the
/// recall history; debounced searches skip that.
fn commit_search<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    remember: bool,
) {
    view_data.search_due = None;
    view_data.history_cursor = None;

    let search = state.search_text.trim().to_owned();
    if search.is_empty() {
        show_all(state, runtime, view_data, internal_tx);
        return;
    }

    if let Err(error) = runtime.save_search(Some(&search)) {
        tracing::warn!(error = %format!("{error:#}"), "save search");
    }
    if remember {
        match runtime.append_search_history(&search) {
            Ok(()) if view_data.history.last() != Some(&search) => {
                view_data.history.push(search);
            }
            Ok(()) => {}
            Err(error) => tracing::warn!(error = %format!("{error:#}"), "record search history"),
        }
    }
    load_reports(state, runtime, view_data, internal_tx);
}

fn show_all<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    view_data.search_due = None;
    state.dispatch(AppCommand::SearchCleared);
    if let Err(error) = runtime.save_search(None) {
        tracing::warn!(error = %format!("{error:#}"), "clear saved search");
    }
    load_reports(state, runtime, view_data, internal_tx);
}

fn edit_search(state: &mut AppState, view_data: &mut ViewData, text: String) {
    state.dispatch(AppCommand::SearchEdited(text));
    view_data.search_due = Some(Instant::now() + view_data.options.search_debounce);
}

fn recall_history(state: &mut AppState, view_data: &mut ViewData, older: bool) {
    if view_data.history.is_empty() {
        return;
    }
    let last = view_data.history.len() - 1;
    view_data.history_cursor = match (view_data.history_cursor, older) {
        (None, true) => Some(last),
        (None, false) => None,
        (Some(index), true) => Some(index.saturating_sub(1)),
        (Some(index), false) if index < last => Some(index + 1),
        (Some(_), false) => None,
    };
    let text = view_data
        .history_cursor
        .and_then(|index| view_data.history.get(index))
        .cloned()
        .unwrap_or_default();
    edit_search(state, view_data, text);
}

/// Wraps a server mutation: polling holds still while it runs and the
/// table reloads with the current search afterwards.
fn run_action<R, F>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    context: &str,
    done: String,
    action: F,
) where
    R: AppRuntime,
    F: FnOnce(&mut R) -> Result<()>,
{
    state.dispatch(AppCommand::ActionStarted);
    match action(runtime) {
        Ok(()) => {
            tracing::info!("{done}");
            load_reports(state, runtime, view_data, internal_tx);
            if view_data.outcome.is_none() {
                emit_status(state, view_data, internal_tx, done);
            }
        }
        Err(error) => report_failure(state, runtime, view_data, internal_tx, context, error),
    }
    if view_data.outcome.is_none() {
        state.dispatch(AppCommand::ActionFinished);
    }
}

fn export_table<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if view_data.reports.is_empty() {
        emit_status(state, view_data, internal_tx, NOTHING_TO_EXPORT);
        return;
    }
    match runtime.export_reports(&view_data.reports) {
        Ok(path) => {
            let message = format!(
                "exported {} reports to {}",
                view_data.reports.len(),
                path.display()
            );
            emit_status(state, view_data, internal_tx, message);
        }
        Err(error) => report_failure(state, runtime, view_data, internal_tx, "export", error),
    }
}

fn toggle_sidebar<R: AppRuntime>(state: &mut AppState, runtime: &mut R, view_data: &mut ViewData) {
    state.dispatch(AppCommand::ToggleSidebar);
    if state.sidebar == SidebarState::Expanded {
        view_data.sidebar_cursor = Section::ALL
            .iter()
            .position(|section| *section == state.section)
            .unwrap_or(0);
    }
    persist_sidebar(state, runtime);
}

fn persist_sidebar<R: AppRuntime>(state: &AppState, runtime: &mut R) {
    let collapsed = state.sidebar == SidebarState::Collapsed;
    if let Err(error) = runtime.save_sidebar_collapsed(collapsed) {
        tracing::warn!(error = %format!("{error:#}"), "save sidebar state");
    }
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.help_visible {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
            view_data.help_visible = false;
            emit_status(state, view_data, internal_tx, "help hidden");
        }
        return false;
    }

    if view_data.detail.is_some() {
        if matches!(
            key.code,
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')
        ) {
            view_data.detail = None;
        }
        return false;
    }

    match state.mode {
        AppMode::Prompt => handle_prompt_key(state, runtime, view_data, internal_tx, key),
        AppMode::Menu => handle_menu_key(state, runtime, view_data, internal_tx, key),
        AppMode::Search => handle_search_key(state, runtime, view_data, internal_tx, key),
        AppMode::Nav => handle_nav_key(state, runtime, view_data, internal_tx, key),
    }
    false
}

fn handle_search_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => {
            state.dispatch(AppCommand::ExitSearch);
        }
        KeyCode::Enter => {
            state.dispatch(AppCommand::ExitSearch);
            commit_search(state, runtime, view_data, internal_tx, true);
        }
        KeyCode::Up => recall_history(state, view_data, true),
        KeyCode::Down => recall_history(state, view_data, false),
        KeyCode::Backspace => {
            let mut text = state.search_text.clone();
            if text.pop().is_some() {
                edit_search(state, view_data, text);
            }
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            edit_search(state, view_data, String::new());
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let mut text = state.search_text.clone();
            text.push(ch);
            edit_search(state, view_data, text);
        }
        _ => {}
    }
}

fn handle_nav_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    if state.sidebar == SidebarState::Expanded && handle_sidebar_key(state, runtime, view_data, key)
    {
        return;
    }

    match key.code {
        KeyCode::Char('?') => view_data.help_visible = true,
        KeyCode::Char('b') => toggle_sidebar(state, runtime, view_data),
        KeyCode::Char('L') => {
            view_data.prompt = Some(Prompt::ConfirmLogout);
            state.dispatch(AppCommand::PromptOpened);
        }
        _ if state.section == Section::Reports => {
            handle_table_key(state, runtime, view_data, internal_tx, key);
        }
        _ => {}
    }
}

/// Returns true when the sidebar consumed the key.
fn handle_sidebar_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    key: KeyEvent,
) -> bool {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            view_data.sidebar_cursor = (view_data.sidebar_cursor + 1).min(Section::ALL.len() - 1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.sidebar_cursor = view_data.sidebar_cursor.saturating_sub(1);
        }
        KeyCode::Enter => {
            let section = Section::ALL[view_data.sidebar_cursor.min(Section::ALL.len() - 1)];
            state.dispatch(AppCommand::SelectSection(section));
            persist_sidebar(state, runtime);
        }
        KeyCode::Esc => {
            state.dispatch(AppCommand::CloseSidebar);
            persist_sidebar(state, runtime);
        }
        _ => return false,
    }
    true
}

fn handle_table_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    if let Some(command) = table_command_for_key(key) {
        apply_table_command(view_data, command);
        return;
    }

    match key.code {
        KeyCode::Char('/') => {
            state.dispatch(AppCommand::EnterSearch);
        }
        KeyCode::Enter => open_menu(state, view_data, internal_tx),
        KeyCode::Char('r') => {
            load_reports(state, runtime, view_data, internal_tx);
            if view_data.outcome.is_none() {
                emit_status(state, view_data, internal_tx, "refreshed");
            }
        }
        KeyCode::Char('A') => show_all(state, runtime, view_data, internal_tx),
        KeyCode::Char('x') => export_table(state, runtime, view_data, internal_tx),
        _ => {}
    }
}

fn table_command_for_key(key: KeyEvent) -> Option<TableCommand> {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => Some(TableCommand::MoveRow(1)),
        KeyCode::Char('k') | KeyCode::Up => Some(TableCommand::MoveRow(-1)),
        KeyCode::PageDown => Some(TableCommand::MoveRow(PAGE_ROWS)),
        KeyCode::PageUp => Some(TableCommand::MoveRow(-PAGE_ROWS)),
        KeyCode::Char('g') | KeyCode::Home => Some(TableCommand::JumpFirstRow),
        KeyCode::Char('G') | KeyCode::End => Some(TableCommand::JumpLastRow),
        _ => None,
    }
}

fn apply_table_command(view_data: &mut ViewData, command: TableCommand) {
    let last = view_data.reports.len().saturating_sub(1);
    view_data.selected_row = match command {
        TableCommand::MoveRow(delta) => view_data
            .selected_row
            .saturating_add_signed(delta)
            .min(last),
        TableCommand::JumpFirstRow => 0,
        TableCommand::JumpLastRow => last,
    };
}

fn open_menu(state: &mut AppState, view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    let Some(report) = view_data.selected_report() else {
        emit_status(state, view_data, internal_tx, "no report selected");
        return;
    };
    let Some(id) = report.id() else {
        emit_status(state, view_data, internal_tx, "selected report has no id");
        return;
    };
    view_data.menu = Some(ActionMenu {
        id,
        permissions: classify(report).permissions(),
        cursor: 0,
    });
    state.dispatch(AppCommand::MenuOpened);
}

fn close_menu(state: &mut AppState, view_data: &mut ViewData) {
    view_data.menu = None;
    state.dispatch(AppCommand::MenuClosed);
}

fn handle_menu_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(menu) = view_data.menu.as_mut() else {
        state.dispatch(AppCommand::MenuClosed);
        return;
    };

    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => close_menu(state, view_data),
        KeyCode::Char('j') | KeyCode::Down => {
            menu.cursor = (menu.cursor + 1).min(MenuItem::ALL.len() - 1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            menu.cursor = menu.cursor.saturating_sub(1);
        }
        KeyCode::Enter => {
            let item = MenuItem::ALL[menu.cursor.min(MenuItem::ALL.len() - 1)];
            activate_menu_item(state, runtime, view_data, internal_tx, item);
        }
        KeyCode::Char(ch) => {
            if let Some(item) = MenuItem::ALL.into_iter().find(|item| item.shortcut() == ch) {
                activate_menu_item(state, runtime, view_data, internal_tx, item);
            }
        }
        _ => {}
    }
}

fn activate_menu_item<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    item: MenuItem,
) {
    let Some(menu) = view_data.menu else {
        return;
    };
    if let Some(reason) = item.disabled_reason(&menu.permissions) {
        let message = format!("{}: {reason}", item.label(&menu.permissions));
        emit_status(state, view_data, internal_tx, message);
        return;
    }

    close_menu(state, view_data);
    let id = menu.id;
    match item {
        MenuItem::Form => match menu.permissions.form {
            Some(FormAction::MarkPending) => run_action(
                state,
                runtime,
                view_data,
                internal_tx,
                "mark pending",
                format!("report {id} marked pending"),
                |runtime| runtime.mark_pending(id),
            ),
            Some(FormAction::ViewDetail) => match runtime.report_form(id) {
                Ok(form) => view_data.detail = Some(DetailView { id, form }),
                Err(error) => {
                    report_failure(state, runtime, view_data, internal_tx, "load form", error);
                }
            },
            None => {}
        },
        MenuItem::Cancel => {
            view_data.prompt = Some(Prompt::CancelReason {
                id,
                input: String::new(),
            });
            state.dispatch(AppCommand::PromptOpened);
        }
        MenuItem::Delete => {
            view_data.prompt = Some(Prompt::ConfirmDelete { id });
            state.dispatch(AppCommand::PromptOpened);
        }
    }
}

fn close_prompt(state: &mut AppState, view_data: &mut ViewData) {
    view_data.prompt = None;
    state.dispatch(AppCommand::PromptClosed);
}

fn handle_prompt_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(prompt) = view_data.prompt.as_mut() else {
        state.dispatch(AppCommand::PromptClosed);
        return;
    };

    match prompt {
        Prompt::CancelReason { id, input } => match key.code {
            KeyCode::Esc => {
                close_prompt(state, view_data);
                emit_status(state, view_data, internal_tx, "cancellation aborted");
            }
            KeyCode::Backspace => {
                input.pop();
            }
            KeyCode::Enter => {
                let id = *id;
                let form = CancelForm {
                    reason: input.clone(),
                };
                match form.admin_reason() {
                    Ok(reason) => {
                        close_prompt(state, view_data);
                        run_action(
                            state,
                            runtime,
                            view_data,
                            internal_tx,
                            "cancel",
                            format!("report {id} cancelled"),
                            |runtime| runtime.cancel_report(id, &reason),
                        );
                    }
                    Err(error) => emit_status(state, view_data, internal_tx, error.to_string()),
                }
            }
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                input.push(ch);
            }
            _ => {}
        },
        Prompt::ConfirmDelete { id } => {
            let id = *id;
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    close_prompt(state, view_data);
                    run_action(
                        state,
                        runtime,
                        view_data,
                        internal_tx,
                        "delete",
                        format!("report {id} deleted"),
                        |runtime| runtime.delete_report(id),
                    );
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    close_prompt(state, view_data);
                    emit_status(state, view_data, internal_tx, "delete aborted");
                }
                _ => {}
            }
        }
        Prompt::ConfirmLogout => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                close_prompt(state, view_data);
                end_session(state, runtime, view_data, SessionOutcome::LoggedOut);
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                close_prompt(state, view_data);
            }
            _ => {}
        },
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(frame.area());

    let search_style = if state.mode == AppMode::Search {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::White)
    };
    let search = Paragraph::new(search_bar_text(state))
        .style(search_style)
        .block(Block::default().title("tablero").borders(Borders::ALL));
    frame.render_widget(search, layout[0]);

    let body = if state.sidebar == SidebarState::Expanded {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(22), Constraint::Min(1)])
            .split(layout[1]);
        render_sidebar(frame, columns[0], state, view_data);
        columns[1]
    } else {
        layout[1]
    };

    match state.section {
        Section::Reports => render_table(frame, body, state, view_data),
        Section::Session => {
            let session = Paragraph::new(session_text(view_data)).block(
                Block::default()
                    .title(Section::Session.label())
                    .borders(Borders::ALL),
            );
            frame.render_widget(session, body);
        }
    }

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status, layout[2]);

    if let Some(menu) = &view_data.menu {
        let area = centered_rect(50, 30, frame.area());
        frame.render_widget(Clear, area);
        let widget = Paragraph::new(menu_lines(menu)).block(
            Block::default()
                .title(format!("report {}", menu.id))
                .borders(Borders::ALL),
        );
        frame.render_widget(widget, area);
    }

    if let Some(prompt) = &view_data.prompt {
        let area = centered_rect(60, 20, frame.area());
        frame.render_widget(Clear, area);
        let widget = Paragraph::new(prompt_text(prompt)).block(
            Block::default()
                .title("confirm")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(widget, area);
    }

    if let Some(detail) = &view_data.detail {
        let area = centered_rect(70, 60, frame.area());
        frame.render_widget(Clear, area);
        let widget = Paragraph::new(detail_text(detail)).block(
            Block::default()
                .title(format!("report {} form", detail.id))
                .borders(Borders::ALL),
        );
        frame.render_widget(widget, area);
    }

    if view_data.help_visible {
        let area = centered_rect(80, 72, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_sidebar(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    let lines = Section::ALL
        .iter()
        .enumerate()
        .map(|(index, section)| {
            let marker = if index == view_data.sidebar_cursor {
                ">"
            } else {
                " "
            };
            let style = if *section == state.section {
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::styled(format!("{marker} {}", section.label()), style)
        })
        .collect::<Vec<_>>();
    let sidebar = Paragraph::new(lines).block(Block::default().title("menu").borders(Borders::ALL));
    frame.render_widget(sidebar, area);
}

fn render_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    let title = table_title(state, view_data);
    if view_data.reports.is_empty() {
        let empty = Paragraph::new(view_data.notice.clone().unwrap_or_default())
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(empty, area);
        return;
    }

    let widths = vec![Constraint::Min(6); view_data.columns.len().max(1)];
    let header_cells = view_data.columns.iter().map(|column| {
        Cell::from(format_header(column)).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells);

    let rows = view_data.reports.iter().map(|report| {
        let row_style = row_style(classify(report).lifecycle());
        let cells = view_data
            .columns
            .iter()
            .map(|column| {
                let text = report.display_value(column);
                let style = cell_style(column, &text).map_or(row_style, |tone| row_style.patch(tone));
                Cell::from(text).style(style)
            })
            .collect::<Vec<_>>();
        Row::new(cells)
    });

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .row_highlight_style(Style::default().bg(Color::DarkGray))
        .block(Block::default().title(title).borders(Borders::ALL));
    let mut table_state = TableState::default().with_selected(Some(view_data.selected_row));
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn table_title(state: &AppState, view_data: &ViewData) -> String {
    let polling = if state.poll.should_refresh() {
        "live"
    } else {
        "paused"
    };
    format!("reports ({}) {polling}", view_data.reports.len())
}

fn row_style(lifecycle: Lifecycle) -> Style {
    match lifecycle {
        Lifecycle::Active => Style::default(),
        Lifecycle::Pending => Style::default().add_modifier(Modifier::ITALIC),
        Lifecycle::Completed => Style::default().add_modifier(Modifier::DIM),
        Lifecycle::Cancelled => Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT),
    }
}

fn cell_style(column: &str, value: &str) -> Option<Style> {
    let color = if is_status_column(column) {
        match status_tone(value)? {
            StatusTone::Active => Color::Green,
            StatusTone::Pending => Color::Yellow,
            StatusTone::Completed => Color::Blue,
            StatusTone::Cancelled => Color::Red,
        }
    } else if is_level_column(column) {
        match level_tone(value)? {
            LevelTone::Low => Color::Green,
            LevelTone::Medium => Color::Yellow,
            LevelTone::High => Color::Red,
        }
    } else {
        return None;
    };
    Some(Style::default().fg(color).add_modifier(Modifier::BOLD))
}

fn search_bar_text(state: &AppState) -> String {
    match (state.mode, state.search_text.is_empty()) {
        (AppMode::Search, _) => format!("/ {}_", state.search_text),
        (_, true) => "all reports | / to search (field=value, & and, | or)".to_owned(),
        (_, false) => format!("search: {}", state.search_text),
    }
}

fn session_text(view_data: &ViewData) -> String {
    format!(
        "signed in as {}\n\nL log out | b menu",
        view_data.session_label
    )
}

fn menu_lines(menu: &ActionMenu) -> Vec<Line<'static>> {
    MenuItem::ALL
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let marker = if index == menu.cursor { ">" } else { " " };
            let label = item.label(&menu.permissions);
            match item.disabled_reason(&menu.permissions) {
                Some(reason) => Line::styled(
                    format!("{marker} {} {label} ({reason})", item.shortcut()),
                    Style::default().fg(Color::DarkGray),
                ),
                None => Line::from(format!("{marker} {} {label}", item.shortcut())),
            }
        })
        .collect()
}

fn prompt_text(prompt: &Prompt) -> String {
    match prompt {
        Prompt::CancelReason { id, input } => {
            format!("cancellation reason for report {id}:\n> {input}_\n\nenter confirm | esc abort")
        }
        Prompt::ConfirmDelete { id } => format!("delete report {id}? y/n"),
        Prompt::ConfirmLogout => "log out? y/n".to_owned(),
    }
}

fn detail_text(detail: &DetailView) -> String {
    detail
        .form
        .rows()
        .into_iter()
        .map(|(label, value)| format!("{label}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    let (mode, hints) = match state.mode {
        AppMode::Nav if state.section == Section::Session => ("NAV", "L logout | b menu | ? help | ctrl+q"),
        AppMode::Nav => (
            "NAV",
            "/ search | enter actions | j/k g/G | r refresh | A all | x export | b menu | ? help | ctrl+q",
        ),
        AppMode::Search => ("SEARCH", "enter search | esc done | up/down history | ctrl+u clear"),
        AppMode::Menu => ("MENU", "j/k move | enter or f/c/d choose | esc close"),
        AppMode::Prompt => ("PROMPT", "enter confirm | esc abort"),
    };
    let hints = if view_data.detail.is_some() {
        "esc close"
    } else {
        hints
    };
    match &state.status_line {
        Some(status) => format!("{mode} | {status} | {hints}"),
        None => format!("{mode} | {hints}"),
    }
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit | ? help\n\
nav: j/k move | g/G first/last | pgup/pgdn page | enter actions\n\
nav: / search | r refresh | A show all | x export xlsx | b menu | L log out\n\
search: field=value joined by & (and) or | (or); plain text searches descriptions\n\
search: enter search now | esc leave | up/down history | ctrl+u clear\n\
actions: f form | c cancel with reason | d delete | esc close\n\
menu: j/k section | enter open | esc close"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
