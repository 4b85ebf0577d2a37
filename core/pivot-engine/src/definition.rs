//! FILENAME: core/pivot-engine/src/definition.rs
//! Pivot Table Definition - The serializable configuration.
//!
//! This module contains the types needed to DESCRIBE a pivot table:
//! which dimensions sit on each axis, which measures fill the cells,
//! which headers the user collapsed, and the group-by combinations the
//! aggregator must fetch. These structures are:
//! - Serializable (the UI store sends them as JSON)
//! - Immutable snapshots of user intent

use serde::{Deserialize, Serialize};
use workflow_engine::{Literal, MeasureSpec};

// ============================================================================
// CONFIGURATION
// ============================================================================

fn default_true() -> bool {
    true
}

/// Display switches for a pivot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotConfig {
    /// Show subtotal rows/columns for every expanded header.
    #[serde(default)]
    pub show_summary: bool,

    /// Aggregate each combination; `false` fetches raw rows instead.
    #[serde(default = "default_true")]
    pub default_aggregated: bool,
}

impl Default for PivotConfig {
    fn default() -> Self {
        PivotConfig {
            show_summary: false,
            default_aggregated: true,
        }
    }
}

/// What the user placed on the pivot shelves.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotDefinition {
    /// Dimension fids on the row axis, outermost first.
    #[serde(default)]
    pub rows: Vec<String>,

    /// Dimension fids on the column axis, outermost first.
    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub measures: Vec<MeasureSpec>,

    #[serde(default)]
    pub config: PivotConfig,
}

impl PivotDefinition {
    pub fn new(rows: &[&str], columns: &[&str], measures: Vec<MeasureSpec>) -> Self {
        PivotDefinition {
            rows: rows.iter().map(|s| s.to_string()).collect(),
            columns: columns.iter().map(|s| s.to_string()).collect(),
            measures,
            config: PivotConfig::default(),
        }
    }

    /// The combination holding the most detailed aggregates.
    pub fn full_combination(&self) -> GroupByCombination {
        GroupByCombination::new(self.rows.clone(), self.columns.clone())
    }

    /// Key under which a measure's value appears in result rows.
    /// Raw queries return the measure under its own fid.
    pub fn measure_output_key<'a>(&self, measure: &'a MeasureSpec) -> &'a str {
        if self.config.default_aggregated {
            &measure.as_field_key
        } else {
            &measure.field
        }
    }
}

// ============================================================================
// HEADER PATHS & COLLAPSE STATE
// ============================================================================

/// One step from the root of an axis tree down to a header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    /// Dimension fid.
    pub key: String,
    pub value: Literal,
}

impl PathSegment {
    pub fn new(key: impl Into<String>, value: impl Into<Literal>) -> Self {
        PathSegment {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Snapshot of the collapsed headers: header id -> path, in the order the
/// user collapsed them. Built once, never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollapsedHeaders {
    entries: Vec<(String, Vec<PathSegment>)>,
}

impl CollapsedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[PathSegment])> {
        self.entries.iter().map(|(id, path)| (id.as_str(), path.as_slice()))
    }

    pub fn contains_path(&self, path: &[PathSegment]) -> bool {
        self.entries.iter().any(|(_, p)| p.as_slice() == path)
    }

    /// True when the dimension `fid` ends at least one collapsed path.
    pub fn is_dimension_collapsed(&self, fid: &str) -> bool {
        self.entries
            .iter()
            .any(|(_, path)| path.last().is_some_and(|segment| segment.key == fid))
    }
}

/// Later entries with an id already present are ignored.
impl FromIterator<(String, Vec<PathSegment>)> for CollapsedHeaders {
    fn from_iter<I: IntoIterator<Item = (String, Vec<PathSegment>)>>(iter: I) -> Self {
        let mut entries: Vec<(String, Vec<PathSegment>)> = Vec::new();
        for (id, path) in iter {
            if !entries.iter().any(|(existing, _)| *existing == id) {
                entries.push((id, path));
            }
        }
        CollapsedHeaders { entries }
    }
}

// ============================================================================
// GROUP-BY COMBINATIONS
// ============================================================================

/// A (row dims, column dims) pair to aggregate by. Two combinations are the
/// same request exactly when both lists are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GroupByCombination {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
}

impl GroupByCombination {
    pub fn new(rows: Vec<String>, columns: Vec<String>) -> Self {
        GroupByCombination { rows, columns }
    }

    /// The combination addressed by a (row path, column path) pair of headers.
    pub fn from_paths(row_path: &[PathSegment], column_path: &[PathSegment]) -> Self {
        GroupByCombination {
            rows: row_path.iter().map(|s| s.key.clone()).collect(),
            columns: column_path.iter().map(|s| s.key.clone()).collect(),
        }
    }

    /// Group-by list sent to the executor: column fids, then row fids.
    pub fn group_by(&self) -> Vec<String> {
        self.columns.iter().chain(self.rows.iter()).cloned().collect()
    }
}
