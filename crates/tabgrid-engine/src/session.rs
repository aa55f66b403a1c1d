// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use tabgrid_app::{ProfileKey, SwitchToken, ViewMode};

use crate::enrichment::DepthTable;
use crate::profile::ProfileCache;
use crate::token::TokenAuthority;
use crate::view::ViewState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Current,
    /// A superseded token taken back for a structural change within the
    /// active profile.
    Adopted,
    Stale,
}

/// Owner of everything a render pass reads or commits besides the view it
/// was handed: the token authority, the tab list, the active profile and the
/// profile cache.
#[derive(Debug, Default)]
pub struct SessionContext {
    pub authority: TokenAuthority,
    pub active: Option<ProfileKey>,
    pub last_good: Option<ProfileKey>,
    pub tabs: Vec<ProfileKey>,
    pub cache: ProfileCache,
    /// Last committed view.
    pub view: Option<ViewState>,
    /// View handed to the newest pass that has not committed yet.
    pub pending: Option<ViewState>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether a pass for `view` under `token` may proceed. An old
    /// token is adopted only for an accordion pass with grouping levels on
    /// the active profile.
    pub fn admit(&mut self, view: &ViewState, token: &SwitchToken) -> Admission {
        if self.authority.is_current(token) {
            return Admission::Current;
        }
        let structural = self.active.as_ref() == Some(&view.profile)
            && view.mode == ViewMode::Accordion
            && !view.grouping.is_empty();
        if structural {
            tracing::debug!(%token, profile = %view.profile, "adopting token for grouping change");
            self.authority.adopt(*token);
            Admission::Adopted
        } else {
            Admission::Stale
        }
    }

    pub fn open_tab(&mut self, profile: &ProfileKey) {
        if !self.tabs.contains(profile) {
            self.tabs.push(profile.clone());
        }
    }

    /// Removes the tab and its cache entry, then re-derives the active
    /// profile.
    pub fn close_tab(&mut self, profile: &ProfileKey) -> Option<ProfileKey> {
        self.tabs.retain(|tab| tab != profile);
        self.cache.remove(profile);
        if self.last_good.as_ref() == Some(profile) {
            self.last_good = None;
        }
        if self.view.as_ref().is_some_and(|view| &view.profile == profile) {
            self.view = None;
        }
        if self.pending.as_ref().is_some_and(|view| &view.profile == profile) {
            self.pending = None;
        }
        self.resolve_active_profile()
    }

    /// The view user edits apply to: the newest pending view for the active
    /// profile, then its committed view, then its cached one.
    pub fn active_view(&self) -> Option<&ViewState> {
        let active = self.active.as_ref()?;
        let is_active = |view: &&ViewState| &view.profile == active;
        self.pending
            .as_ref()
            .filter(is_active)
            .or_else(|| self.view.as_ref().filter(is_active))
            .or_else(|| self.cache.get(active).map(|entry| &entry.view))
    }

    /// Records `view` as the newest pass in flight.
    pub fn stage(&mut self, view: &ViewState) {
        self.pending = Some(view.clone());
    }

    pub fn set_active(&mut self, profile: &ProfileKey) {
        self.active = Some(profile.clone());
    }

    /// Snapshots the active view into the cache before navigating away.
    pub fn stash_active(&mut self) {
        if let Some(view) = &self.view {
            self.cache.put(view.clone());
        }
    }

    pub fn commit_view(&mut self, view: ViewState) {
        if self.pending.as_ref().is_some_and(|pending| pending.profile == view.profile) {
            self.pending = None;
        }
        self.active = Some(view.profile.clone());
        self.last_good = Some(view.profile.clone());
        self.cache.put(view.clone());
        self.view = Some(view);
    }

    /// The active profile if its tab is still open, else the last profile
    /// that committed, else the first open tab.
    pub fn resolve_active_profile(&mut self) -> Option<ProfileKey> {
        let is_open = |profile: &ProfileKey| self.tabs.contains(profile);
        let resolved = self
            .active
            .clone()
            .filter(|profile| is_open(profile))
            .or_else(|| self.last_good.clone().filter(|profile| is_open(profile)))
            .or_else(|| self.tabs.first().cloned());
        if resolved != self.active {
            tracing::debug!(from = ?self.active, to = ?resolved, "re-derived active profile");
        }
        self.active = resolved.clone();
        resolved
    }

    /// Records depths for `profile` on both the live view and its cache entry.
    pub fn merge_depths(&mut self, profile: &ProfileKey, depths: &DepthTable) -> usize {
        let mut changed = 0;
        if let Some(view) = self.view.as_mut().filter(|view| &view.profile == profile) {
            changed = view.merge_depths(depths);
        }
        if let Some(view) = self.pending.as_mut().filter(|view| &view.profile == profile) {
            view.merge_depths(depths);
        }
        if let Some(entry) = self.cache.get_mut(profile) {
            entry.view.merge_depths(depths);
        }
        changed
    }
}
