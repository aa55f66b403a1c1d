// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{PreferenceKey, ProfileKey};

/// Navigation state of the host UI. Engine state (view, caches, tokens) lives
/// elsewhere; this only tracks what the keyboard cursor points at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    pub tabs: Vec<ProfileKey>,
    pub active_tab: usize,
    pub selected_col: usize,
    pub column_count: usize,
    pub selected_group: usize,
    pub group_count: usize,
    pub status_line: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    NextTab,
    PrevTab,
    NextColumn,
    PrevColumn,
    NextGroup,
    PrevGroup,
    SortSelected,
    GroupBySelected,
    PopGrouping,
    ToggleMode,
    OpenSelectedGroup,
    CloseGroup,
    TogglePreference(PreferenceKey),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    TabChanged(ProfileKey),
    ColumnSelected(usize),
    GroupSelected(usize),
    SortRequested(usize),
    GroupByRequested(usize),
    GroupingPopped,
    ModeToggled,
    GroupOpened(usize),
    GroupClosed,
    PreferenceToggled(PreferenceKey),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn with_tabs(tabs: Vec<ProfileKey>) -> Self {
        Self {
            tabs,
            ..Self::default()
        }
    }

    pub fn active_profile(&self) -> Option<&ProfileKey> {
        self.tabs.get(self.active_tab)
    }

    /// Points the tab cursor at `profile` without emitting events. Used when
    /// the engine re-derives the active profile on its own.
    pub fn sync_active(&mut self, profile: &ProfileKey) {
        if let Some(index) = self.tabs.iter().position(|tab| tab == profile) {
            self.active_tab = index;
        }
    }

    pub fn set_column_count(&mut self, count: usize) {
        self.column_count = count;
        self.selected_col = self.selected_col.min(count.saturating_sub(1));
    }

    pub fn set_group_count(&mut self, count: usize) {
        self.group_count = count;
        self.selected_group = self.selected_group.min(count.saturating_sub(1));
    }

    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::NextTab => self.rotate_tab(1),
            AppCommand::PrevTab => self.rotate_tab(-1),
            AppCommand::NextColumn => self.move_column(1),
            AppCommand::PrevColumn => self.move_column(-1),
            AppCommand::NextGroup => self.move_group(1),
            AppCommand::PrevGroup => self.move_group(-1),
            AppCommand::SortSelected if self.column_count > 0 => {
                vec![AppEvent::SortRequested(self.selected_col)]
            }
            AppCommand::GroupBySelected if self.column_count > 0 => {
                vec![
                    AppEvent::GroupByRequested(self.selected_col),
                    self.set_status("grouped"),
                ]
            }
            AppCommand::SortSelected | AppCommand::GroupBySelected => {
                vec![self.set_status("no columns")]
            }
            AppCommand::PopGrouping => {
                self.selected_group = 0;
                vec![AppEvent::GroupingPopped, self.set_status("ungrouped")]
            }
            AppCommand::ToggleMode => {
                self.selected_group = 0;
                vec![AppEvent::ModeToggled]
            }
            AppCommand::OpenSelectedGroup if self.group_count > 0 => {
                let index = self.selected_group;
                self.selected_group = 0;
                vec![AppEvent::GroupOpened(index)]
            }
            AppCommand::OpenSelectedGroup => Vec::new(),
            AppCommand::CloseGroup => {
                self.selected_group = 0;
                vec![AppEvent::GroupClosed]
            }
            AppCommand::TogglePreference(key) => {
                vec![
                    AppEvent::PreferenceToggled(key),
                    self.set_status(key.as_str()),
                ]
            }
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn rotate_tab(&mut self, delta: isize) -> Vec<AppEvent> {
        if self.tabs.is_empty() {
            return Vec::new();
        }
        let len = self.tabs.len() as isize;
        let next = (self.active_tab as isize + delta).rem_euclid(len) as usize;
        self.active_tab = next;
        self.selected_group = 0;
        vec![AppEvent::TabChanged(self.tabs[next].clone())]
    }

    fn move_column(&mut self, delta: isize) -> Vec<AppEvent> {
        if self.column_count == 0 {
            return Vec::new();
        }
        let last = self.column_count as isize - 1;
        self.selected_col = (self.selected_col as isize + delta).clamp(0, last) as usize;
        vec![AppEvent::ColumnSelected(self.selected_col)]
    }

    fn move_group(&mut self, delta: isize) -> Vec<AppEvent> {
        if self.group_count == 0 {
            return Vec::new();
        }
        let last = self.group_count as isize - 1;
        self.selected_group = (self.selected_group as isize + delta).clamp(0, last) as usize;
        vec![AppEvent::GroupSelected(self.selected_group)]
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}
