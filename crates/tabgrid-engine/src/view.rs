// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::time::Instant;
use tabgrid_app::{
    ColumnKey, ColumnSpec, GroupKey, HiddenGroup, ProfileKey, ProfilePayload, Row, SortSpec,
    SwitchToken, ViewMode, cycle_sort,
};

use crate::enrichment::DepthTable;
use crate::filter::FilterState;
use crate::grouping::group_rows;
use crate::render::{RenderTarget, TargetHandle};
use crate::sort::SortCache;

/// Everything needed to render one profile. Replaced wholesale on rebuild;
/// UI edits operate on a clone that the next pass commits.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub profile: ProfileKey,
    pub columns: Vec<ColumnSpec>,
    pub rows: Rc<[Row]>,
    pub filtered: Vec<usize>,
    pub sorted: Vec<usize>,
    pub sort: Option<SortSpec>,
    pub grouping: Vec<ColumnKey>,
    pub group_keys: Vec<GroupKey>,
    pub mode: ViewMode,
    pub group_sorts: HashMap<String, SortSpec>,
    pub open_paths: BTreeSet<String>,
    pub filters: FilterState,
    pub sort_cache: SortCache,
    pub depths: DepthTable,
    pub target: TargetHandle,
    pub committed: Option<SwitchToken>,
    pub loaded_at: Instant,
}

impl ViewState {
    pub fn from_payload(profile: ProfileKey, payload: &ProfilePayload) -> Self {
        let mut columns = payload.columns.clone();
        if !columns.iter().any(|spec| spec.key == ColumnKey::B2bDepth) {
            columns.push(ColumnSpec::b2b_depth());
        }
        let all = (0..payload.rows.len()).collect::<Vec<_>>();
        Self {
            target: RenderTarget::handle(profile.clone()),
            profile,
            columns,
            rows: payload.rows.clone().into(),
            filtered: all.clone(),
            sorted: all,
            sort: None,
            grouping: Vec::new(),
            group_keys: Vec::new(),
            mode: ViewMode::Table,
            group_sorts: HashMap::new(),
            open_paths: BTreeSet::new(),
            filters: FilterState::default(),
            sort_cache: SortCache::new(),
            depths: DepthTable::new(),
            committed: None,
            loaded_at: Instant::now(),
        }
    }

    /// Fresh data from `payload` carrying over the view configuration of
    /// `cached`. Fails when the configuration names columns the new payload
    /// does not have.
    pub fn rebuild_from_cached(cached: &Self, payload: &ProfilePayload) -> Result<Self> {
        if let Some(sort) = &cached.sort
            && !payload.has_column(&sort.column)
        {
            bail!("cached sort column {} is missing from the payload", sort.column);
        }
        if let Some(column) = cached
            .grouping
            .iter()
            .find(|column| !payload.has_column(column))
        {
            bail!("cached grouping column {column} is missing from the payload");
        }

        let mut view = Self::from_payload(cached.profile.clone(), payload);
        view.sort = cached.sort.clone();
        view.grouping = cached.grouping.clone();
        view.group_keys = cached.group_keys.clone();
        view.mode = cached.mode;
        view.group_sorts = cached.group_sorts.clone();
        view.open_paths = cached.open_paths.clone();
        view.filters = cached.filters.clone();
        Ok(view)
    }

    /// Same data and configuration behind a new, uncommitted target.
    pub fn rebuilt(&self) -> Self {
        let mut view = self.clone();
        view.target = RenderTarget::handle(self.profile.clone());
        view.committed = None;
        view
    }

    /// Records newly computed depths. Cached depth-column orders are dropped
    /// since their values changed.
    pub fn merge_depths(&mut self, depths: &DepthTable) -> usize {
        let mut changed = 0;
        for (id, depth) in depths {
            if self.depths.insert(*id, *depth) != Some(*depth) {
                changed += 1;
            }
        }
        if changed > 0 {
            self.sort_cache.invalidate_column(&ColumnKey::B2bDepth);
        }
        changed
    }

    pub fn clear_depths(&mut self) {
        self.depths.clear();
        self.sort_cache.clear();
    }

    pub fn column_at(&self, index: usize) -> Option<&ColumnKey> {
        self.columns.get(index).map(|spec| &spec.key)
    }

    pub fn cycle_sort(&mut self, column: &ColumnKey) {
        self.sort = cycle_sort(self.sort.as_ref(), column);
    }

    pub fn push_grouping(&mut self, column: ColumnKey) {
        if !self.grouping.contains(&column) {
            self.grouping.push(column);
        }
        self.mode = ViewMode::Accordion;
    }

    /// Drops the innermost grouping level. The mode is left alone; a pass
    /// over an accordion with no levels renders as a table.
    pub fn pop_grouping(&mut self) -> Option<ColumnKey> {
        let popped = self.grouping.pop();
        self.group_keys.truncate(self.grouping.len());
        popped
    }

    pub fn set_mode(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            ViewMode::Table => ViewMode::Accordion,
            ViewMode::Accordion => ViewMode::Table,
        };
    }

    pub fn open_group(&mut self, key: GroupKey) {
        if self.group_keys.len() < self.grouping.len() {
            self.group_keys.push(key);
        }
    }

    pub fn close_group(&mut self) -> Option<GroupKey> {
        self.group_keys.pop()
    }

    /// Adds or removes `path` from the set of groups kept open regardless of
    /// the selected key stack.
    pub fn toggle_open_path(&mut self, path: String) {
        if !self.open_paths.remove(&path) {
            self.open_paths.insert(path);
        }
    }

    pub fn set_search(&mut self, search: Option<String>) {
        self.filters.search = search.filter(|needle| !needle.trim().is_empty());
    }

    pub fn hide_group(&mut self, column: ColumnKey, value: GroupKey) {
        self.filters.hidden_groups.insert(HiddenGroup { column, value });
    }

    pub fn show_all_groups(&mut self) {
        self.filters.hidden_groups.clear();
    }

    pub fn set_group_sort(&mut self, path: String, sort: Option<SortSpec>) {
        match sort {
            Some(sort) => {
                self.group_sorts.insert(path, sort);
            }
            None => {
                self.group_sorts.remove(&path);
            }
        }
    }

    /// Keys of the groups at the first unselected level under the current key
    /// stack, in display order. Empty when every level is selected.
    pub fn selectable_groups(&self) -> Vec<GroupKey> {
        let Some(column) = self.grouping.get(self.group_keys.len()) else {
            return Vec::new();
        };
        let mut current = self.sorted.clone();
        for (level, key) in self.grouping.iter().zip(&self.group_keys) {
            match group_rows(&self.rows, &current, level, &self.depths)
                .into_iter()
                .find(|group| &group.key == key)
            {
                Some(group) => current = group.indices,
                None => return Vec::new(),
            }
        }
        group_rows(&self.rows, &current, column, &self.depths)
            .into_iter()
            .map(|group| group.key)
            .collect()
    }
}
