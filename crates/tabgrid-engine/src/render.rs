// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;
use tabgrid_app::{
    ColumnKey, ColumnSpec, GroupKey, ProfileKey, Row, RowId, SortDirection, SwitchToken,
};

use crate::enrichment::{DEFAULT_DEPTH, DepthTable};
use crate::view::ViewState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedCell {
    Text(String),
    /// `None` until enrichment patches the row.
    Depth(Option<u32>),
}

impl RenderedCell {
    pub fn display(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Depth(Some(depth)) => depth.to_string(),
            Self::Depth(None) => "…".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRow {
    pub id: RowId,
    pub cells: Vec<RenderedCell>,
}

impl RenderedRow {
    pub fn depth(&self) -> Option<u32> {
        self.cells.iter().find_map(|cell| match cell {
            RenderedCell::Depth(depth) => *depth,
            RenderedCell::Text(_) => None,
        })
    }

    /// Fills depth cells from `depths`. Rows the table does not mention get
    /// [`DEFAULT_DEPTH`] unless they already carry a value.
    fn apply_depths(&mut self, depths: &DepthTable) -> bool {
        let mut changed = false;
        for cell in &mut self.cells {
            let RenderedCell::Depth(current) = cell else {
                continue;
            };
            let next = match (depths.get(&self.id), *current) {
                (Some(depth), _) => Some(*depth),
                (None, Some(existing)) => Some(existing),
                (None, None) => Some(DEFAULT_DEPTH),
            };
            if *current != next {
                *current = next;
                changed = true;
            }
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCell {
    pub label: String,
    pub column: ColumnKey,
    pub sort: Option<SortDirection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableView {
    pub header: Vec<HeaderCell>,
    pub rows: Vec<RenderedRow>,
    /// Row count once every progressive batch has landed.
    pub expected_rows: usize,
}

impl TableView {
    pub fn is_complete(&self) -> bool {
        self.rows.len() >= self.expected_rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupNode {
    pub key: GroupKey,
    pub path: String,
    pub count: usize,
    pub open: bool,
    pub children: Option<GroupLevel>,
    pub rows: Vec<RenderedRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLevel {
    pub column: ColumnKey,
    pub depth: usize,
    pub groups: Vec<GroupNode>,
}

impl GroupLevel {
    fn visit_rows<'a>(&'a self, out: &mut Vec<&'a RenderedRow>) {
        for group in &self.groups {
            out.extend(group.rows.iter());
            if let Some(children) = &group.children {
                children.visit_rows(out);
            }
        }
    }

    fn patch_rows(&mut self, depths: &DepthTable) -> usize {
        let mut patched = 0;
        for group in &mut self.groups {
            patched += group
                .rows
                .iter_mut()
                .map(|row| usize::from(row.apply_depths(depths)))
                .sum::<usize>();
            if let Some(children) = &mut group.children {
                patched += children.patch_rows(depths);
            }
        }
        patched
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccordionView {
    pub header: Vec<HeaderCell>,
    pub root: GroupLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RenderBody {
    #[default]
    Empty,
    Table(TableView),
    Accordion(AccordionView),
}

/// The mutable surface one profile renders into. The host draws whatever
/// body is committed; background tasks append and patch in place.
#[derive(Debug)]
pub struct RenderTarget {
    pub profile: ProfileKey,
    pub body: RenderBody,
    pub committed: Option<SwitchToken>,
    /// Bumped on every commit so tasks from an earlier pass can tell the body
    /// was replaced under them.
    pub revision: u64,
    pub built_at: Instant,
    enrichment: Option<Rc<DepthTable>>,
}

pub type TargetHandle = Rc<RefCell<RenderTarget>>;

impl RenderTarget {
    pub fn new(profile: ProfileKey) -> Self {
        Self {
            profile,
            body: RenderBody::Empty,
            committed: None,
            revision: 0,
            built_at: Instant::now(),
            enrichment: None,
        }
    }

    pub fn handle(profile: ProfileKey) -> TargetHandle {
        Rc::new(RefCell::new(Self::new(profile)))
    }

    /// Replaces the body wholesale and returns the new revision.
    pub fn commit(&mut self, body: RenderBody, token: SwitchToken) -> u64 {
        self.body = body;
        self.committed = Some(token);
        self.revision += 1;
        self.built_at = Instant::now();
        self.enrichment = None;
        self.revision
    }

    pub fn is_committed_under(&self, token: &SwitchToken) -> bool {
        self.committed.as_ref() == Some(token)
    }

    /// Appends a progressive batch to a table body. Depths already delivered
    /// to this target are applied on arrival.
    pub fn append_rows(&mut self, mut rows: Vec<RenderedRow>) -> usize {
        if let Some(depths) = &self.enrichment {
            for row in &mut rows {
                row.apply_depths(depths);
            }
        }
        match &mut self.body {
            RenderBody::Table(table) => {
                let appended = rows.len();
                table.rows.extend(rows);
                appended
            }
            RenderBody::Empty | RenderBody::Accordion(_) => 0,
        }
    }

    /// Patches depth cells by row identity and remembers the table for later
    /// batches. Returns the number of rows whose cells changed.
    pub fn patch_depths(&mut self, depths: Rc<DepthTable>) -> usize {
        let patched = match &mut self.body {
            RenderBody::Empty => 0,
            RenderBody::Table(table) => table
                .rows
                .iter_mut()
                .map(|row| usize::from(row.apply_depths(&depths)))
                .sum(),
            RenderBody::Accordion(accordion) => accordion.root.patch_rows(&depths),
        };
        self.enrichment = Some(depths);
        patched
    }

    pub fn rows(&self) -> Vec<&RenderedRow> {
        match &self.body {
            RenderBody::Empty => Vec::new(),
            RenderBody::Table(table) => table.rows.iter().collect(),
            RenderBody::Accordion(accordion) => {
                let mut out = Vec::new();
                accordion.root.visit_rows(&mut out);
                out
            }
        }
    }

    pub fn row(&self, id: RowId) -> Option<&RenderedRow> {
        self.rows().into_iter().find(|row| row.id == id)
    }

    pub fn header(&self) -> &[HeaderCell] {
        match &self.body {
            RenderBody::Empty => &[],
            RenderBody::Table(table) => &table.header,
            RenderBody::Accordion(accordion) => &accordion.header,
        }
    }
}

/// Where committed targets are shown.
pub trait HostSurface {
    fn mount(&mut self, target: TargetHandle);
    fn highlight_tab(&mut self, profile: &ProfileKey);
}

pub fn build_header(view: &ViewState) -> Vec<HeaderCell> {
    view.columns
        .iter()
        .map(|spec| HeaderCell {
            label: spec.label.clone(),
            column: spec.key.clone(),
            sort: view
                .sort
                .as_ref()
                .filter(|sort| sort.column == spec.key)
                .map(|sort| sort.direction),
        })
        .collect()
}

pub fn render_rows(
    rows: &[Row],
    indices: &[usize],
    columns: &[ColumnSpec],
    depths: &DepthTable,
) -> Vec<RenderedRow> {
    indices
        .iter()
        .filter_map(|index| rows.get(*index))
        .map(|row| RenderedRow {
            id: row.id,
            cells: columns
                .iter()
                .map(|spec| match &spec.key {
                    ColumnKey::Field(name) => RenderedCell::Text(row.cell(name).display()),
                    ColumnKey::B2bDepth => RenderedCell::Depth(depths.get(&row.id).copied()),
                })
                .collect(),
        })
        .collect()
}
