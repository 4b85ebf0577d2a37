//! FILENAME: core/workflow-engine/src/error.rs

use thiserror::Error;

/// Errors that abort compilation of a view into a workflow.
/// A partially compiled workflow is never returned: filters must stay
/// consistent with each other, so one bad rule fails the whole compile.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Invalid filter rule on field '{fid}': {reason}")]
    InvalidFilterRule { fid: String, reason: String },

    #[error("Field '{referenced_by}' references unknown field '{fid}'")]
    UnresolvableFieldReference { fid: String, referenced_by: String },

    #[error("Circular reference between computed fields: {}", .cycle.join(" -> "))]
    CyclicComputedField { cycle: Vec<String> },
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
