//! FILENAME: core/workflow-engine/src/merge.rs
//! PURPOSE: Grafts extra transforms and filters onto an already compiled plan.
//! CONTEXT: Downstream consumers (drill-down, pivot subtotals, brushing)
//! need the same workflow plus a few requirements of their own. Rather than
//! recompiling, they merge into the existing plan. Only the first step of
//! the matching kind is touched; the other steps keep their order.

use rustc_hash::FxHashSet;

use crate::workflow::{ComputedField, StepKind, VisFilter, WorkflowPlan, WorkflowStep};

impl WorkflowPlan {
    /// Adds computed fields to the plan.
    ///
    /// Extra fields are appended to the first transform step, skipping keys it
    /// already has. Without a transform step, a new one is placed first.
    pub fn with_transforms(mut self, extra: &[ComputedField]) -> Self {
        let extra = dedupe_by_key(extra);
        if extra.is_empty() {
            return self;
        }

        match self.first_of_kind(StepKind::Transform) {
            Some(index) => {
                if let WorkflowStep::Transform { transform } = &mut self.workflow[index] {
                    let existing: FxHashSet<String> = transform.iter().map(|t| t.key.clone()).collect();
                    transform.extend(extra.into_iter().filter(|t| !existing.contains(&t.key)));
                }
            }
            None => self.workflow.insert(0, WorkflowStep::Transform { transform: extra }),
        }
        self
    }

    /// Adds filters to the plan.
    ///
    /// Filters are conjunctive, so placement does not change the result; the
    /// extras go ahead of the first filter step's entries so the outer filters
    /// read first. Without a filter step, a new one is placed first.
    pub fn with_filters(mut self, extra: &[VisFilter]) -> Self {
        if extra.is_empty() {
            return self;
        }

        match self.first_of_kind(StepKind::Filter) {
            Some(index) => {
                if let WorkflowStep::Filter { filters } = &mut self.workflow[index] {
                    let mut merged = extra.to_vec();
                    merged.append(filters);
                    *filters = merged;
                }
            }
            None => self.workflow.insert(
                0,
                WorkflowStep::Filter {
                    filters: extra.to_vec(),
                },
            ),
        }
        self
    }

    fn first_of_kind(&self, kind: StepKind) -> Option<usize> {
        self.workflow.iter().position(|step| step.kind() == kind)
    }
}

/// First occurrence of each key wins.
fn dedupe_by_key(fields: &[ComputedField]) -> Vec<ComputedField> {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    fields
        .iter()
        .filter(|f| seen.insert(f.key.as_str()))
        .cloned()
        .collect()
}

/// Returns `plan` with `transform` merged in. See [`WorkflowPlan::with_transforms`].
pub fn add_transform_for_query(plan: &WorkflowPlan, transform: &[ComputedField]) -> WorkflowPlan {
    plan.clone().with_transforms(transform)
}

/// Returns `plan` with `filters` merged in. See [`WorkflowPlan::with_filters`].
pub fn add_filter_for_query(plan: &WorkflowPlan, filters: &[VisFilter]) -> WorkflowPlan {
    plan.clone().with_filters(filters)
}
