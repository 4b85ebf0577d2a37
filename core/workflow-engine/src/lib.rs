//! FILENAME: core/workflow-engine/src/lib.rs
//! PURPOSE: Data-query workflow compiler for chart views.
//! CONTEXT: Turns the fields on the shelves (dimensions, measures, filters,
//! computed fields, folds, sort/limit) into an ordered workflow that an
//! external query executor runs: filter -> transform -> filter -> view -> sort.
//!
//! Layers:
//! - `field` / `expression`: the input model (what the user placed)
//! - `dependency` / `filter`: the building blocks of compilation
//! - `compiler`: the orchestrator producing a `WorkflowPlan`
//! - `merge`: grafting extra steps onto a compiled plan

pub mod compiler;
pub mod config;
pub mod dependency;
pub mod error;
pub mod expression;
pub mod field;
pub mod filter;
pub mod merge;
pub mod workflow;

// Re-export commonly used types at the crate root
pub use compiler::{compile_workflow, ViewDescription, WorkflowCompiler};
pub use config::{CyclePolicy, WorkflowConfig, MEA_KEY_ID, MEA_VAL_ID};
pub use dependency::{order_for_execution, prune_computed_fields};
pub use error::{WorkflowError, WorkflowResult};
pub use expression::{
    field_references, process_expression, walk_expression, Expression, ExpressionParam,
    PaintDictEntry, PaintMap,
};
pub use field::{AnalyticType, Field, FilterField, FilterRule, Literal};
pub use filter::compile_filter;
pub use merge::{add_filter_for_query, add_transform_for_query};
pub use workflow::{
    mea_agg_key, ComputedField, MeasureSpec, SortDirection, SortMode, StepKind, ViewQuery,
    VisFilter, VisFilterRule, WorkflowPlan, WorkflowStep,
};
