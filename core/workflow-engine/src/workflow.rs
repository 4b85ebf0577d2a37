//! FILENAME: core/workflow-engine/src/workflow.rs
//! Workflow IR - the compiled, ordered query plan handed to the executor.
//!
//! The serialized shape matches what query executors consume:
//! `{"workflow":[{"type":"filter","filters":[...]}, ...], "limit": 10}`.

use serde::{Deserialize, Serialize};
use crate::expression::Expression;
use crate::field::Literal;

// ============================================================================
// FILTERS
// ============================================================================

/// A normalized filter rule. Range endpoints are already numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum VisFilterRule {
    #[serde(rename = "one of")]
    OneOf(Vec<Literal>),
    #[serde(rename = "range")]
    Range(f64, f64),
    /// Endpoints in epoch milliseconds.
    #[serde(rename = "temporal range")]
    TemporalRange(i64, i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisFilter {
    pub fid: String,
    pub rule: VisFilterRule,
}

// ============================================================================
// TRANSFORMS
// ============================================================================

/// A computed field as it enters the transform step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedField {
    pub key: String,
    pub expression: Expression,
}

impl ComputedField {
    pub fn new(key: impl Into<String>, expression: Expression) -> Self {
        ComputedField { key: key.into(), expression }
    }
}

// ============================================================================
// VIEW QUERIES
// ============================================================================

/// Output column name for a measure under an aggregation.
/// Same (field, agg) always gives the same key; no aggregation keeps the fid.
pub fn mea_agg_key(fid: &str, agg: Option<&str>) -> String {
    match agg {
        Some(agg) if !agg.is_empty() => format!("{}_{}", fid, agg),
        _ => fid.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureSpec {
    pub field: String,
    pub agg: String,
    pub as_field_key: String,
}

impl MeasureSpec {
    pub fn new(field: impl Into<String>, agg: impl Into<String>) -> Self {
        let field = field.into();
        let agg = agg.into();
        let as_field_key = mea_agg_key(&field, Some(&agg));
        MeasureSpec { field, agg, as_field_key }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ViewQuery {
    #[serde(rename_all = "camelCase")]
    Aggregate {
        group_by: Vec<String>,
        measures: Vec<MeasureSpec>,
    },
    Raw { fields: Vec<String> },
}

impl ViewQuery {
    /// Builds an aggregate query, dropping measures whose output key
    /// already appeared.
    pub fn aggregate(group_by: Vec<String>, measures: Vec<MeasureSpec>) -> Self {
        let mut unique: Vec<MeasureSpec> = Vec::with_capacity(measures.len());
        for measure in measures {
            if !unique.iter().any(|m| m.as_field_key == measure.as_field_key) {
                unique.push(measure);
            }
        }
        ViewQuery::Aggregate { group_by, measures: unique }
    }

    /// Builds a raw query over the given fields, de-duplicated in first-seen order.
    pub fn raw<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for field in fields {
            let field = field.into();
            if !unique.contains(&field) {
                unique.push(field);
            }
        }
        ViewQuery::Raw { fields: unique }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, ViewQuery::Aggregate { .. })
    }
}

// ============================================================================
// STEPS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Sort mode requested by the view. `None` never produces a sort step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    None,
    Ascending,
    Descending,
}

impl Default for SortMode {
    fn default() -> Self {
        SortMode::None
    }
}

impl SortMode {
    pub fn direction(self) -> Option<SortDirection> {
        match self {
            SortMode::None => None,
            SortMode::Ascending => Some(SortDirection::Ascending),
            SortMode::Descending => Some(SortDirection::Descending),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Filter,
    Transform,
    View,
    Sort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkflowStep {
    Filter { filters: Vec<VisFilter> },
    Transform { transform: Vec<ComputedField> },
    View { query: Vec<ViewQuery> },
    Sort { by: Vec<String>, sort: SortDirection },
}

impl WorkflowStep {
    pub fn kind(&self) -> StepKind {
        match self {
            WorkflowStep::Filter { .. } => StepKind::Filter,
            WorkflowStep::Transform { .. } => StepKind::Transform,
            WorkflowStep::View { .. } => StepKind::View,
            WorkflowStep::Sort { .. } => StepKind::Sort,
        }
    }

    /// True when the step carries nothing for the executor to do.
    pub fn is_empty(&self) -> bool {
        match self {
            WorkflowStep::Filter { filters } => filters.is_empty(),
            WorkflowStep::Transform { transform } => transform.is_empty(),
            WorkflowStep::View { query } => query.is_empty(),
            WorkflowStep::Sort { by, .. } => by.is_empty(),
        }
    }
}

// ============================================================================
// PLAN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub workflow: Vec<WorkflowStep>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl WorkflowPlan {
    /// Builds a plan from optional steps, dropping absent and empty ones.
    pub fn from_steps<I>(steps: I, limit: Option<usize>) -> Self
    where
        I: IntoIterator<Item = Option<WorkflowStep>>,
    {
        WorkflowPlan {
            workflow: steps
                .into_iter()
                .flatten()
                .filter(|step| !step.is_empty())
                .collect(),
            limit,
        }
    }

    pub fn kinds(&self) -> Vec<StepKind> {
        self.workflow.iter().map(WorkflowStep::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.workflow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflow.is_empty()
    }

    /// The view queries of the first view step, if any.
    pub fn view_queries(&self) -> Option<&[ViewQuery]> {
        self.workflow.iter().find_map(|step| match step {
            WorkflowStep::View { query } => Some(query.as_slice()),
            _ => None,
        })
    }
}
