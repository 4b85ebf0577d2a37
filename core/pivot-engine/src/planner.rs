//! FILENAME: core/pivot-engine/src/planner.rs
//! PURPOSE: Decides which group-by combinations a pivot view needs.
//! CONTEXT: A collapsed header shows the aggregate of everything beneath it,
//! and a summary row shows the aggregate of its parent. Both need a coarser
//! grouping than the base rows. Rather than re-aggregating client side, the
//! aggregator fetches one extra query per coarser combination; this module
//! lists them.

use rustc_hash::FxHashSet;

use crate::definition::{CollapsedHeaders, GroupByCombination};

/// Lists the group-by combinations for the current collapse state.
///
/// # Arguments
/// * `row_dims` - Dimension fids on the row axis, outermost first.
/// * `column_dims` - Dimension fids on the column axis, outermost first.
/// * `collapsed` - Snapshot of the collapsed headers.
/// * `show_summary` - When true, every strict prefix of each axis is needed
///   (summary rows exist for every expanded level) and `collapsed` is ignored.
///
/// # Returns
/// The cross join of row prefixes and column prefixes, columns in the outer
/// loop. Duplicates are dropped, and the full `(row_dims, column_dims)`
/// combination comes exactly once, last.
pub fn plan_group_by_combinations(
    row_dims: &[String],
    column_dims: &[String],
    collapsed: &CollapsedHeaders,
    show_summary: bool,
) -> Vec<GroupByCombination> {
    let row_prefixes = axis_prefixes(row_dims, collapsed, show_summary);
    let column_prefixes = axis_prefixes(column_dims, collapsed, show_summary);
    let full = GroupByCombination::new(row_dims.to_vec(), column_dims.to_vec());

    let mut seen: FxHashSet<GroupByCombination> = FxHashSet::default();
    seen.insert(full.clone());

    let mut combinations = Vec::with_capacity(row_prefixes.len() * column_prefixes.len());
    for columns in &column_prefixes {
        for rows in &row_prefixes {
            let combination = GroupByCombination::new(rows.to_vec(), columns.to_vec());
            if seen.insert(combination.clone()) {
                combinations.push(combination);
            }
        }
    }
    combinations.push(full);

    log::debug!(
        "planned {} group-by combinations (rows={:?}, columns={:?}, summary={})",
        combinations.len(),
        row_dims,
        column_dims,
        show_summary
    );
    combinations
}

/// Prefixes of one axis, always ending with the full axis.
fn axis_prefixes<'d>(
    dims: &'d [String],
    collapsed: &CollapsedHeaders,
    show_summary: bool,
) -> Vec<&'d [String]> {
    let mut prefixes: Vec<&[String]> = if show_summary {
        (0..dims.len()).map(|len| &dims[..len]).collect()
    } else {
        dims.iter()
            .enumerate()
            .filter(|(_, fid)| collapsed.is_dimension_collapsed(fid))
            .map(|(i, _)| &dims[..=i])
            .collect()
    };
    prefixes.push(dims);
    prefixes
}
