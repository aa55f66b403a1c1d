// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use tabgrid_app::{CellValue, ColumnKey, Row, SortDirection, SortSpec};

use crate::enrichment::DepthTable;

/// Value a row shows in `column`. Depth cells come from the enrichment table,
/// everything else from the payload.
pub fn column_value<'a>(row: &'a Row, column: &ColumnKey, depths: &DepthTable) -> Cow<'a, CellValue> {
    match column {
        ColumnKey::Field(name) => Cow::Borrowed(row.cell(name)),
        ColumnKey::B2bDepth => Cow::Owned(
            depths
                .get(&row.id)
                .map(|depth| CellValue::Integer(i64::from(*depth)))
                .unwrap_or(CellValue::Null),
        ),
    }
}

fn compare_rows(left: &Row, right: &Row, sort: &SortSpec, depths: &DepthTable) -> Ordering {
    let left_value = column_value(left, &sort.column, depths);
    let right_value = column_value(right, &sort.column, depths);
    match (left_value.is_null(), right_value.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match sort.direction {
            SortDirection::Asc => left_value.cmp_value(&right_value),
            SortDirection::Desc => left_value.cmp_value(&right_value).reverse(),
        },
    }
}

/// Stable sort of `indices` into `rows`. Empty cells sort last in both
/// directions; ties keep their input order.
pub fn stable_sort(rows: &[Row], indices: &[usize], sort: &SortSpec, depths: &DepthTable) -> Vec<usize> {
    let mut sorted = indices.to_vec();
    sorted.sort_by(|left, right| compare_rows(&rows[*left], &rows[*right], sort, depths));
    sorted
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SortCacheKey {
    column: ColumnKey,
    direction: SortDirection,
    len: usize,
}

/// Memoized full-dataset sort orders. Filtered views are derived by walking
/// the cached order and keeping members, so a filter change never re-sorts.
///
/// Keys carry the dataset length but not its content: owners must call
/// [`SortCache::clear`] whenever the dataset is replaced.
#[derive(Debug, Clone, Default)]
pub struct SortCache {
    entries: HashMap<SortCacheKey, Rc<[usize]>>,
    misses: u64,
}

impl SortCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filtered indices in display order. `None` keeps original dataset order
    /// and never touches the cache.
    pub fn sorted_view(
        &mut self,
        rows: &[Row],
        filtered: &[usize],
        sort: Option<&SortSpec>,
        depths: &DepthTable,
    ) -> Vec<usize> {
        let Some(sort) = sort else {
            let mut original = filtered.to_vec();
            original.sort_unstable();
            return original;
        };

        let order = self.full_order(rows, sort, depths);
        let mut member = vec![false; rows.len()];
        for index in filtered {
            if let Some(slot) = member.get_mut(*index) {
                *slot = true;
            }
        }
        order.iter().copied().filter(|index| member[*index]).collect()
    }

    fn full_order(&mut self, rows: &[Row], sort: &SortSpec, depths: &DepthTable) -> Rc<[usize]> {
        let key = SortCacheKey {
            column: sort.column.clone(),
            direction: sort.direction,
            len: rows.len(),
        };
        if let Some(order) = self.entries.get(&key) {
            return Rc::clone(order);
        }

        self.misses += 1;
        let all = (0..rows.len()).collect::<Vec<_>>();
        let order: Rc<[usize]> = stable_sort(rows, &all, sort, depths).into();
        self.entries.insert(key, Rc::clone(&order));
        order
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops every cached order for `column`, in both directions.
    pub fn invalidate_column(&mut self, column: &ColumnKey) {
        self.entries.retain(|key, _| &key.column != column);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of full sorts computed since creation.
    pub fn misses(&self) -> u64 {
        self.misses
    }
}
