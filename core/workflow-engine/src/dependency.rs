//! FILENAME: core/workflow-engine/src/dependency.rs
//! PURPOSE: Decides which computed fields the transform step must evaluate,
//! and in what order.
//! CONTEXT: A view only needs the computed fields it uses, plus whatever
//! computed fields those read, transitively. `prune_computed_fields` finds
//! that set by reachability; `order_for_execution` then sorts it so every
//! field comes after the computed fields it references.
//!
//! TERMINOLOGY:
//! - Precedents: computed fields that a computed field references.
//!   If profit = sales - cost and sales is computed, sales is a precedent of profit.
//! - Dependents: the reverse relation.

use std::collections::VecDeque;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::CyclePolicy;
use crate::error::{WorkflowError, WorkflowResult};
use crate::expression::walk_expression;
use crate::workflow::ComputedField;

/// Returns the computed fields reachable from `needed_keys`.
///
/// The result starts with the fields named directly in `needed_keys` (in
/// input order), followed by fields discovered round by round while walking
/// the expressions of the previous round. Fields that nothing needed
/// references are left out.
///
/// Each round removes what it discovered from the remaining pool, so the
/// loop ends after at most `computed.len()` rounds. A reference cycle is
/// simply walked once.
pub fn prune_computed_fields(
    computed: &[ComputedField],
    needed_keys: &FxHashSet<String>,
) -> Vec<ComputedField> {
    let (mut result, mut rest): (Vec<&ComputedField>, Vec<&ComputedField>) =
        computed.iter().partition(|f| needed_keys.contains(&f.key));

    let mut frontier_start = 0;
    while frontier_start < result.len() && !rest.is_empty() {
        let mut referenced: FxHashSet<&str> = FxHashSet::default();
        for field in result[frontier_start..].iter().copied() {
            walk_expression(&field.expression, &mut |fid| {
                referenced.insert(fid);
            });
        }

        let (discovered, remaining): (Vec<&ComputedField>, Vec<&ComputedField>) = rest
            .into_iter()
            .partition(|f| referenced.contains(f.key.as_str()));

        frontier_start = result.len();
        result.extend(discovered);
        rest = remaining;
    }

    result.into_iter().cloned().collect()
}

/// Orders pruned computed fields so that each one follows its precedents.
///
/// This is a stable Kahn sort: among fields whose precedents are all placed,
/// the one earliest in `fields` goes first, so an already valid order is
/// returned unchanged.
///
/// # Returns
/// - `Ok(Vec<ComputedField>)` - the fields in execution order.
/// - `Err(WorkflowError::CyclicComputedField)` - a cycle exists and
///   `policy` is `CyclePolicy::Reject`. With `KeepDiscoveryOrder` the fields
///   on or behind the cycle are appended in their input order.
pub fn order_for_execution(
    fields: Vec<ComputedField>,
    policy: CyclePolicy,
) -> WorkflowResult<Vec<ComputedField>> {
    let position: FxHashMap<&str, usize> = fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.key.as_str(), i))
        .collect();

    // precedents[i]: indices of fields that field i reads (within the set)
    let mut precedents: Vec<FxHashSet<usize>> = vec![FxHashSet::default(); fields.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); fields.len()];
    for (i, field) in fields.iter().enumerate() {
        walk_expression(&field.expression, &mut |fid| {
            if let Some(&j) = position.get(fid) {
                if precedents[i].insert(j) {
                    dependents[j].push(i);
                }
            }
        });
    }

    let mut in_degree: Vec<usize> = precedents.iter().map(|p| p.len()).collect();
    let mut ready: VecDeque<usize> = (0..fields.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order: Vec<usize> = Vec::with_capacity(fields.len());

    while let Some(i) = pop_smallest(&mut ready) {
        order.push(i);
        for &dep in &dependents[i] {
            in_degree[dep] -= 1;
            if in_degree[dep] == 0 {
                ready.push_back(dep);
            }
        }
    }

    if order.len() != fields.len() {
        let stuck: Vec<usize> = (0..fields.len()).filter(|&i| in_degree[i] > 0).collect();
        match policy {
            CyclePolicy::Reject => {
                let cycle = find_cycle_path(&fields, &precedents, &stuck);
                return Err(WorkflowError::CyclicComputedField { cycle });
            }
            CyclePolicy::KeepDiscoveryOrder => {
                log::warn!(
                    "computed fields in a reference cycle kept in discovery order: {:?}",
                    stuck.iter().map(|&i| fields[i].key.as_str()).collect::<Vec<_>>()
                );
                order.extend(stuck);
            }
        }
    }

    let mut slots: Vec<Option<ComputedField>> = fields.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Pops the lowest input index so ties keep the discovery order.
fn pop_smallest(ready: &mut VecDeque<usize>) -> Option<usize> {
    let (pos, _) = ready.iter().enumerate().min_by_key(|&(_, &i)| i)?;
    ready.remove(pos)
}

/// Follows precedents inside the stuck set until a field repeats, and
/// returns the keys along the loop (first key repeated at the end).
fn find_cycle_path(
    fields: &[ComputedField],
    precedents: &[FxHashSet<usize>],
    stuck: &[usize],
) -> Vec<String> {
    let Some(&start) = stuck.first() else {
        return Vec::new();
    };
    let stuck_set: FxHashSet<usize> = stuck.iter().copied().collect();

    let mut path = vec![start];
    let mut current = start;
    for _ in 0..stuck.len() {
        let next = precedents[current]
            .iter()
            .copied()
            .filter(|p| stuck_set.contains(p))
            .min();
        let Some(next) = next else {
            break;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|&i| fields[i].key.clone()).collect();
            cycle.push(fields[next].key.clone());
            return cycle;
        }
        path.push(next);
        current = next;
    }

    // Fallback: just report the fields involved
    stuck.iter().map(|&i| fields[i].key.clone()).collect()
}
