// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;
use tabgrid_app::{HiddenGroup, Row};

use crate::sort::column_value;
use crate::view::ViewState;

/// Field consulted by the hidden-tier preference.
pub const TIER_FIELD: &str = "tier";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub search: Option<String>,
    pub hidden_groups: BTreeSet<HiddenGroup>,
    pub hidden_tier: Option<String>,
}

impl FilterState {
    pub fn is_active(&self) -> bool {
        self.search.is_some() || !self.hidden_groups.is_empty() || self.hidden_tier.is_some()
    }
}

/// Produces the visible row set of a view. Hidden rows are dropped from both
/// the grid and enrichment context; search misses only leave the grid.
pub trait RowFilter {
    fn filter_rows(&self, view: &ViewState) -> Vec<usize>;
    fn is_row_hidden(&self, row: &Row, view: &ViewState) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardFilter;

impl StandardFilter {
    fn matches_search(row: &Row, needle: &str) -> bool {
        row.cells
            .values()
            .any(|value| value.display().to_lowercase().contains(needle))
    }
}

impl RowFilter for StandardFilter {
    fn filter_rows(&self, view: &ViewState) -> Vec<usize> {
        let needle = view
            .filters
            .search
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .map(str::to_lowercase);

        view.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !self.is_row_hidden(row, view))
            .filter(|(_, row)| {
                needle
                    .as_deref()
                    .is_none_or(|needle| Self::matches_search(row, needle))
            })
            .map(|(index, _)| index)
            .collect()
    }

    fn is_row_hidden(&self, row: &Row, view: &ViewState) -> bool {
        if let Some(tier) = &view.filters.hidden_tier
            && row.cell(TIER_FIELD).display().eq_ignore_ascii_case(tier)
        {
            return true;
        }
        view.filters.hidden_groups.iter().any(|hidden| {
            column_value(row, &hidden.column, &view.depths).group_key() == hidden.value
        })
    }
}
