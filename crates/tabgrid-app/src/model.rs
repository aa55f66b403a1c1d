// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use time::Date;

use crate::ids::*;

/// Group key shown for rows whose grouping cell is empty.
pub const EMPTY_GROUP_KEY: &str = "(none)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Text,
    Integer,
    Decimal,
    Money,
    Date,
}

impl CellKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Money => "money",
            Self::Date => "date",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "integer" => Some(Self::Integer),
            "decimal" => Some(Self::Decimal),
            "money" => Some(Self::Money),
            "date" => Some(Self::Date),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Money(i64),
    Date(Date),
}

impl CellValue {
    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(value) => value.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Decimal(value) => format!("{value:.1}"),
            Self::Money(cents) => format_money(*cents),
            Self::Date(value) => value.to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(value) => value.is_empty(),
            _ => false,
        }
    }

    pub fn cmp_value(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Integer(left), Self::Integer(right)) => left.cmp(right),
            (Self::Decimal(left), Self::Decimal(right)) => left.total_cmp(right),
            (Self::Integer(left), Self::Decimal(right)) => (*left as f64).total_cmp(right),
            (Self::Decimal(left), Self::Integer(right)) => left.total_cmp(&(*right as f64)),
            (Self::Money(left), Self::Money(right)) => left.cmp(right),
            (Self::Date(left), Self::Date(right)) => left.cmp(right),
            (Self::Text(left), Self::Text(right)) => {
                left.to_ascii_lowercase().cmp(&right.to_ascii_lowercase())
            }
            _ => self
                .display()
                .to_ascii_lowercase()
                .cmp(&other.display().to_ascii_lowercase()),
        }
    }

    /// Key under which this value is grouped in accordion view.
    pub fn group_key(&self) -> GroupKey {
        if self.is_null() {
            EMPTY_GROUP_KEY.to_owned()
        } else {
            self.display()
        }
    }
}

pub type GroupKey = String;

/// A column the grid can show, sort or group by. The B2B depth column is not
/// part of the payload; its values come from background enrichment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKey {
    Field(String),
    B2bDepth,
}

impl ColumnKey {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub const fn requires_enrichment(&self) -> bool {
        matches!(self, Self::B2bDepth)
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::B2bDepth => f.write_str("b2b_depth"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub key: ColumnKey,
    pub label: String,
    pub kind: CellKind,
}

impl ColumnSpec {
    pub fn field(name: &str, label: &str, kind: CellKind) -> Self {
        Self {
            key: ColumnKey::field(name),
            label: label.to_owned(),
            kind,
        }
    }

    pub fn b2b_depth() -> Self {
        Self {
            key: ColumnKey::B2bDepth,
            label: "B2B".to_owned(),
            kind: CellKind::Integer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub cells: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            cells: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: &str, value: CellValue) -> Self {
        self.cells.insert(field.to_owned(), value);
        self
    }

    pub fn cell(&self, field: &str) -> &CellValue {
        self.cells.get(field).unwrap_or(&CellValue::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn arrow(self) -> &'static str {
        match self {
            Self::Asc => "↑",
            Self::Desc => "↓",
        }
    }
}

/// An explicit sort. Original dataset order is expressed as the absence of a
/// `SortSpec`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: ColumnKey,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(column: ColumnKey) -> Self {
        Self {
            column,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: ColumnKey) -> Self {
        Self {
            column,
            direction: SortDirection::Desc,
        }
    }
}

/// Cycles a column through ascending, descending and back to original order.
pub fn cycle_sort(current: Option<&SortSpec>, column: &ColumnKey) -> Option<SortSpec> {
    match current {
        Some(sort) if &sort.column == column => match sort.direction {
            SortDirection::Asc => Some(SortSpec::desc(column.clone())),
            SortDirection::Desc => None,
        },
        _ => Some(SortSpec::asc(column.clone())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Table,
    Accordion,
}

impl ViewMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Accordion => "accordion",
        }
    }
}

/// Rows whose `column` displays as `value` are hidden from the grid and from
/// enrichment context.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HiddenGroup {
    pub column: ColumnKey,
    pub value: GroupKey,
}

/// Named preferences persisted by the host's preference store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreferenceKey {
    IncludeSideBySide,
    AutoEnrich,
    HiddenTier,
}

impl PreferenceKey {
    pub const ALL: [Self; 3] = [Self::IncludeSideBySide, Self::AutoEnrich, Self::HiddenTier];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IncludeSideBySide => "b2b.include_side_by_side",
            Self::AutoEnrich => "b2b.auto_run",
            Self::HiddenTier => "filter.hide_tier",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "b2b.include_side_by_side" => Some(Self::IncludeSideBySide),
            "b2b.auto_run" => Some(Self::AutoEnrich),
            "filter.hide_tier" => Some(Self::HiddenTier),
            _ => None,
        }
    }
}

/// Source data for one profile tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePayload {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Row>,
}

impl ProfilePayload {
    pub fn has_column(&self, column: &ColumnKey) -> bool {
        match column {
            ColumnKey::B2bDepth => true,
            ColumnKey::Field(_) => self.columns.iter().any(|spec| &spec.key == column),
        }
    }
}

pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let absolute = cents.unsigned_abs();
    let dollars = absolute / 100;
    let cents_component = absolute % 100;
    format!("{sign}${dollars}.{cents_component:02}")
}
