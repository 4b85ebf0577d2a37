//! FILENAME: core/pivot-engine/src/tree.rs
//! Pivot Tree Builder - turns fetched aggregates into a renderable table.
//!
//! Algorithm:
//! 1. Build one header tree per axis from the dimension values of the base
//!    rows (the full combination)
//! 2. Mark collapsed headers as leaves; with summaries on, append a summary
//!    leaf under every expanded header
//! 3. Flatten each tree into its leaves, in display order
//! 4. Fill the matrix: every (row leaf, column leaf) pair is looked up in
//!    the aggregate of the combination its paths address

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::Serialize;
use workflow_engine::Literal;

use crate::cache::{value_path, DimensionValue, ValuePath};
use crate::definition::{CollapsedHeaders, GroupByCombination, PathSegment, PivotDefinition};
use crate::executor::{AggregateResults, Row};

// ============================================================================
// AXIS TREE STRUCTURES
// ============================================================================

/// A header in an axis tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NestNode {
    /// Dimension fid of this level; empty for the root and summary leaves.
    pub key: String,

    pub value: Literal,

    /// Segments from the root down to this header.
    pub path: Vec<PathSegment>,

    /// 0 for the root.
    pub depth: usize,

    pub children: Vec<NestNode>,

    /// Collapsed by the user: a leaf showing the aggregate of its subtree.
    pub is_collapsed: bool,

    /// Summary leaf: shows the aggregate of its parent.
    pub is_summary: bool,
}

impl NestNode {
    fn root() -> Self {
        NestNode {
            key: String::new(),
            value: Literal::Null,
            path: Vec::new(),
            depth: 0,
            children: Vec::new(),
            is_collapsed: false,
            is_summary: false,
        }
    }

    fn summary_of(parent: &NestNode) -> Self {
        NestNode {
            key: String::new(),
            value: Literal::Null,
            path: parent.path.clone(),
            depth: parent.depth + 1,
            children: Vec::new(),
            is_collapsed: false,
            is_summary: true,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Leaves of the subtree, depth-first in child order.
    pub fn leaves(&self) -> Vec<&NestNode> {
        let mut leaves = Vec::new();
        collect_leaves(self, &mut leaves);
        leaves
    }
}

fn collect_leaves<'n>(node: &'n NestNode, leaves: &mut Vec<&'n NestNode>) {
    if node.is_leaf() {
        leaves.push(node);
        return;
    }
    for child in &node.children {
        collect_leaves(child, leaves);
    }
}

// ============================================================================
// PIVOT TABLE
// ============================================================================

/// Measure values of one cell, in the definition's measure order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCell {
    pub values: Vec<Option<Literal>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotTable {
    pub row_tree: NestNode,
    pub column_tree: NestNode,
    pub row_leaves: Vec<Vec<PathSegment>>,
    pub column_leaves: Vec<Vec<PathSegment>>,
    /// `matrix[row_leaf][column_leaf]`; `None` where no aggregate matched.
    pub matrix: Vec<Vec<Option<MetricCell>>>,
}

impl PivotTable {
    pub fn cell(&self, row: usize, column: usize) -> Option<&MetricCell> {
        self.matrix.get(row)?.get(column)?.as_ref()
    }
}

/// Builds header trees and the metric matrix from a batch of aggregates.
///
/// # Arguments
/// * `definition` - Axis dimensions, measures and the summary switch.
/// * `collapsed` - Snapshot of the collapsed headers.
/// * `results` - Rows per combination, as returned by the aggregator.
pub fn build_pivot_table(
    definition: &PivotDefinition,
    collapsed: &CollapsedHeaders,
    results: &AggregateResults,
) -> PivotTable {
    let base_rows = results.get(&definition.full_combination()).unwrap_or(&[]);
    let show_summary = definition.config.show_summary;

    let row_tree = build_axis_tree(&definition.rows, base_rows, collapsed, show_summary);
    let column_tree = build_axis_tree(&definition.columns, base_rows, collapsed, show_summary);

    let row_leaves: Vec<Vec<PathSegment>> = row_tree.leaves().into_iter().map(|n| n.path.clone()).collect();
    let column_leaves: Vec<Vec<PathSegment>> =
        column_tree.leaves().into_iter().map(|n| n.path.clone()).collect();

    let matrix = build_matrix(definition, results, &row_leaves, &column_leaves);

    PivotTable {
        row_tree,
        column_tree,
        row_leaves,
        column_leaves,
        matrix,
    }
}

// ============================================================================
// TREE CONSTRUCTION
// ============================================================================

fn build_axis_tree(
    dims: &[String],
    base_rows: &[Row],
    collapsed: &CollapsedHeaders,
    show_summary: bool,
) -> NestNode {
    let paths: Vec<ValuePath> = base_rows.iter().map(|row| value_path(row, dims)).collect();
    let members: Vec<&ValuePath> = paths.iter().collect();

    let mut root = NestNode::root();
    root.children = build_children(dims, &root, &members, collapsed, show_summary);
    if show_summary && !root.children.is_empty() {
        let summary = NestNode::summary_of(&root);
        root.children.push(summary);
    }
    root
}

/// Children of `parent`: the distinct values at the next level among
/// `members`, sorted ascending.
fn build_children(
    dims: &[String],
    parent: &NestNode,
    members: &[&ValuePath],
    collapsed: &CollapsedHeaders,
    show_summary: bool,
) -> Vec<NestNode> {
    let level = parent.depth;
    let Some(key) = dims.get(level) else {
        return Vec::new();
    };

    let mut groups: BTreeMap<&DimensionValue, Vec<&ValuePath>> = BTreeMap::new();
    for &path in members {
        groups.entry(&path[level]).or_default().push(path);
    }

    groups
        .into_iter()
        .map(|(value, group)| {
            let value = value.to_literal();
            let mut path = parent.path.clone();
            path.push(PathSegment {
                key: key.clone(),
                value: value.clone(),
            });

            let mut node = NestNode {
                key: key.clone(),
                value,
                path,
                depth: level + 1,
                children: Vec::new(),
                is_collapsed: false,
                is_summary: false,
            };

            if collapsed.contains_path(&node.path) {
                node.is_collapsed = true;
            } else {
                node.children = build_children(dims, &node, &group, collapsed, show_summary);
                if show_summary && !node.children.is_empty() {
                    let summary = NestNode::summary_of(&node);
                    node.children.push(summary);
                }
            }
            node
        })
        .collect()
}

// ============================================================================
// MATRIX
// ============================================================================

/// Rows of one combination keyed by their (row dims, column dims) values.
/// The first row wins when several share a key (raw queries).
type RowIndex<'r> = FxHashMap<ValuePath, &'r Row>;

fn index_rows<'r>(rows: &'r [Row], combination: &GroupByCombination) -> RowIndex<'r> {
    let fids: Vec<String> = combination
        .rows
        .iter()
        .chain(combination.columns.iter())
        .cloned()
        .collect();

    let mut index = RowIndex::default();
    for row in rows {
        index.entry(value_path(row, &fids)).or_insert(row);
    }
    index
}

fn build_matrix(
    definition: &PivotDefinition,
    results: &AggregateResults,
    row_leaves: &[Vec<PathSegment>],
    column_leaves: &[Vec<PathSegment>],
) -> Vec<Vec<Option<MetricCell>>> {
    let mut indexes: FxHashMap<GroupByCombination, Option<RowIndex<'_>>> = FxHashMap::default();

    row_leaves
        .iter()
        .map(|row_path| {
            column_leaves
                .iter()
                .map(|column_path| {
                    let combination = GroupByCombination::from_paths(row_path, column_path);
                    let index = indexes
                        .entry(combination)
                        .or_insert_with_key(|c| results.get(c).map(|rows| index_rows(rows, c)));

                    let key: ValuePath = row_path
                        .iter()
                        .chain(column_path.iter())
                        .map(|segment| DimensionValue::from(&segment.value))
                        .collect();

                    let row = index.as_ref()?.get(&key)?;
                    Some(MetricCell {
                        values: definition
                            .measures
                            .iter()
                            .map(|m| row.get(definition.measure_output_key(m)).cloned())
                            .collect(),
                    })
                })
                .collect()
        })
        .collect()
}
