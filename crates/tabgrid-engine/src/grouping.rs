// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Recursive accordion renderer. Each level partitions its rows by one
//! grouping column; open groups either recurse into the next column or, at
//! the last level, carry their rows.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tabgrid_app::{ColumnKey, ColumnSpec, GroupKey, Row, SortSpec};

use crate::enrichment::DepthTable;
use crate::render::{GroupLevel, GroupNode, render_rows};
use crate::sort::{column_value, stable_sort};

pub const PATH_SEPARATOR: &str = " → ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowGroup {
    pub key: GroupKey,
    pub indices: Vec<usize>,
}

/// Partitions `indices` by the display value of `column`. Groups are ordered
/// by value with the empty group last; rows keep their input order.
pub fn group_rows(
    rows: &[Row],
    indices: &[usize],
    column: &ColumnKey,
    depths: &DepthTable,
) -> Vec<RowGroup> {
    let mut groups: Vec<(RowGroup, usize)> = Vec::new();
    let mut by_key: HashMap<GroupKey, usize> = HashMap::new();
    for index in indices {
        let Some(row) = rows.get(*index) else {
            continue;
        };
        let key = column_value(row, column, depths).group_key();
        match by_key.get(&key) {
            Some(slot) => groups[*slot].0.indices.push(*index),
            None => {
                by_key.insert(key.clone(), groups.len());
                groups.push((
                    RowGroup {
                        key,
                        indices: vec![*index],
                    },
                    *index,
                ));
            }
        }
    }

    groups.sort_by(|(_, left), (_, right)| {
        let left = column_value(&rows[*left], column, depths);
        let right = column_value(&rows[*right], column, depths);
        match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => left.cmp_value(&right),
        }
    });
    groups.into_iter().map(|(group, _)| group).collect()
}

pub fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}{PATH_SEPARATOR}{key}")
    }
}

/// Truncates `group_keys` to the longest prefix that still names a group at
/// every depth of `grouping` over `indices`. Returns how many keys were
/// dropped.
pub fn prune_group_keys(
    rows: &[Row],
    indices: &[usize],
    grouping: &[ColumnKey],
    group_keys: &mut Vec<GroupKey>,
    depths: &DepthTable,
) -> usize {
    let before = group_keys.len();
    group_keys.truncate(grouping.len());

    let mut current = indices.to_vec();
    let mut valid = 0;
    for (column, key) in grouping.iter().zip(group_keys.iter()) {
        let found = group_rows(rows, &current, column, depths)
            .into_iter()
            .find(|group| &group.key == key);
        match found {
            Some(group) => {
                current = group.indices;
                valid += 1;
            }
            None => break,
        }
    }
    group_keys.truncate(valid);
    before - group_keys.len()
}

/// Inputs shared by every level of one accordion render.
#[derive(Debug, Clone, Copy)]
pub struct GroupRequest<'a> {
    pub rows: &'a [Row],
    pub grouping: &'a [ColumnKey],
    pub group_keys: &'a [GroupKey],
    pub open_paths: &'a BTreeSet<String>,
    pub group_sorts: &'a HashMap<String, SortSpec>,
    pub columns: &'a [ColumnSpec],
    pub depths: &'a DepthTable,
}

impl GroupRequest<'_> {
    fn is_selected(&self, depth: usize, path: &str) -> bool {
        depth < self.group_keys.len()
            && self.group_keys[..=depth].join(PATH_SEPARATOR) == path
    }

    fn is_open(&self, depth: usize, path: &str) -> bool {
        self.is_selected(depth, path) || self.open_paths.contains(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRender {
    pub level: GroupLevel,
    /// Paths of every group rendered open, in display order.
    pub opened: Vec<String>,
    pub leaf_rows: usize,
}

/// Renders grouping level `depth` over `indices`. `None` when `depth` is past
/// the grouping stack.
pub fn render_level(
    request: &GroupRequest<'_>,
    indices: &[usize],
    depth: usize,
    prefix: &str,
) -> Option<GroupRender> {
    let column = request.grouping.get(depth)?;
    let last = depth + 1 == request.grouping.len();

    let mut opened = Vec::new();
    let mut leaf_rows = 0;
    let mut nodes = Vec::new();
    for group in group_rows(request.rows, indices, column, request.depths) {
        let path = join_path(prefix, &group.key);
        let open = request.is_open(depth, &path);
        let mut node = GroupNode {
            key: group.key,
            path: path.clone(),
            count: group.indices.len(),
            open,
            children: None,
            rows: Vec::new(),
        };

        if open {
            opened.push(path.clone());
            if last {
                let ordered = match request.group_sorts.get(&path) {
                    Some(sort) => stable_sort(request.rows, &group.indices, sort, request.depths),
                    None => group.indices,
                };
                node.rows = render_rows(request.rows, &ordered, request.columns, request.depths);
                leaf_rows += node.rows.len();
            } else if let Some(child) = render_level(request, &group.indices, depth + 1, &path) {
                opened.extend(child.opened);
                leaf_rows += child.leaf_rows;
                node.children = Some(child.level);
            }
        }
        nodes.push(node);
    }

    Some(GroupRender {
        level: GroupLevel {
            column: column.clone(),
            depth,
            groups: nodes,
        },
        opened,
        leaf_rows,
    })
}
