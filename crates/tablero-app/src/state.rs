// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::{Duration, Instant};

use crate::{AppMode, Section};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_VERIFY_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebarState {
    Expanded,
    Collapsed,
}

/// Whether background reloads may replace the table. A typed search or an
/// open menu holds the current rows still.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollState {
    pub auto_update: bool,
    pub has_search: bool,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            auto_update: true,
            has_search: false,
        }
    }
}

impl PollState {
    pub const fn should_refresh(self) -> bool {
        self.auto_update && !self.has_search
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub section: Section,
    pub sidebar: SidebarState,
    pub poll: PollState,
    pub search_text: String,
    pub status_line: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mode: AppMode::Nav,
            section: Section::Reports,
            sidebar: SidebarState::Collapsed,
            poll: PollState::default(),
            search_text: String::new(),
            status_line: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    EnterSearch,
    ExitSearch,
    SearchEdited(String),
    SearchCleared,
    MenuOpened,
    MenuClosed,
    PromptOpened,
    PromptClosed,
    ActionStarted,
    ActionFinished,
    ToggleSidebar,
    CloseSidebar,
    SelectSection(Section),
    SessionEnded,
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    SectionChanged(Section),
    SidebarChanged(SidebarState),
    PollingChanged(PollState),
    SearchChanged(String),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::EnterSearch => self.set_mode(AppMode::Search),
            AppCommand::ExitSearch => self.set_mode(AppMode::Nav),
            AppCommand::SearchEdited(text) => {
                let has_search = !text.trim().is_empty();
                self.search_text = text;
                let mut events = vec![AppEvent::SearchChanged(self.search_text.clone())];
                events.extend(self.set_poll(PollState {
                    auto_update: !has_search,
                    has_search,
                }));
                events
            }
            AppCommand::SearchCleared => {
                self.search_text.clear();
                let mut events = vec![AppEvent::SearchChanged(String::new())];
                events.extend(self.set_poll(PollState::default()));
                events.push(self.set_status("showing all reports"));
                events
            }
            AppCommand::MenuOpened => {
                let mut events = self.set_mode(AppMode::Menu);
                events.extend(self.pause());
                events
            }
            AppCommand::PromptOpened => {
                let mut events = self.set_mode(AppMode::Prompt);
                events.extend(self.pause());
                events
            }
            AppCommand::MenuClosed | AppCommand::PromptClosed => {
                let mut events = self.set_mode(AppMode::Nav);
                events.extend(self.resume());
                events
            }
            AppCommand::ActionStarted => self.pause(),
            AppCommand::ActionFinished => self.resume(),
            AppCommand::ToggleSidebar => {
                self.sidebar = match self.sidebar {
                    SidebarState::Expanded => SidebarState::Collapsed,
                    SidebarState::Collapsed => SidebarState::Expanded,
                };
                vec![AppEvent::SidebarChanged(self.sidebar)]
            }
            AppCommand::CloseSidebar => self.collapse_sidebar(),
            AppCommand::SelectSection(section) => {
                self.section = section;
                let mut events = vec![AppEvent::SectionChanged(section)];
                events.extend(self.collapse_sidebar());
                events
            }
            AppCommand::SessionEnded => {
                self.search_text.clear();
                self.mode = AppMode::Nav;
                let mut events = vec![
                    AppEvent::ModeChanged(self.mode),
                    AppEvent::SearchChanged(String::new()),
                ];
                events.extend(self.set_poll(PollState {
                    auto_update: false,
                    has_search: false,
                }));
                events.push(self.set_status("session ended"));
                events
            }
            AppCommand::SetStatus(message) => vec![self.set_status(&message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn set_mode(&mut self, mode: AppMode) -> Vec<AppEvent> {
        if self.mode == mode {
            return Vec::new();
        }
        self.mode = mode;
        vec![AppEvent::ModeChanged(mode)]
    }

    fn pause(&mut self) -> Vec<AppEvent> {
        self.set_poll(PollState {
            auto_update: false,
            ..self.poll
        })
    }

    /// Background reloads come back only when no search is typed.
    fn resume(&mut self) -> Vec<AppEvent> {
        self.set_poll(PollState {
            auto_update: !self.poll.has_search,
            ..self.poll
        })
    }

    fn set_poll(&mut self, poll: PollState) -> Vec<AppEvent> {
        if self.poll == poll {
            return Vec::new();
        }
        self.poll = poll;
        vec![AppEvent::PollingChanged(poll)]
    }

    fn collapse_sidebar(&mut self) -> Vec<AppEvent> {
        if self.sidebar == SidebarState::Collapsed {
            return Vec::new();
        }
        self.sidebar = SidebarState::Collapsed;
        vec![AppEvent::SidebarChanged(self.sidebar)]
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTick {
    Idle,
    Refresh,
    VerifyThenRefresh,
}

/// Two clocks: a short one for reloading rows and a long one for checking
/// that the session token still works. Both keep ticking while polling is
/// paused; paused ticks are dropped rather than queued.
#[derive(Debug, Clone, Copy)]
pub struct PollTimer {
    refresh_every: Duration,
    verify_every: Duration,
    last_refresh: Instant,
    last_verify: Instant,
}

impl PollTimer {
    pub fn new(refresh_every: Duration, verify_every: Duration, now: Instant) -> Self {
        Self {
            refresh_every,
            verify_every,
            last_refresh: now,
            last_verify: now,
        }
    }

    pub fn tick(&mut self, now: Instant, poll: PollState) -> PollTick {
        let verify_due = now.duration_since(self.last_verify) >= self.verify_every;
        let refresh_due = now.duration_since(self.last_refresh) >= self.refresh_every;
        if verify_due {
            self.last_verify = now;
        }
        if refresh_due || verify_due {
            self.last_refresh = now;
        }
        if !poll.should_refresh() {
            return PollTick::Idle;
        }
        if verify_due {
            PollTick::VerifyThenRefresh
        } else if refresh_due {
            PollTick::Refresh
        } else {
            PollTick::Idle
        }
    }

    /// Time until the next tick could fire, for sizing the event poll.
    pub fn until_next(&self, now: Instant) -> Duration {
        let refresh = (self.last_refresh + self.refresh_every).saturating_duration_since(now);
        let verify = (self.last_verify + self.verify_every).saturating_duration_since(now);
        refresh.min(verify)
    }
}
