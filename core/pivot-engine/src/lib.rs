//! FILENAME: core/pivot-engine/src/lib.rs
//! Pivot Table subsystem.
//!
//! This crate turns the rows produced by compiled workflows into a
//! collapsible pivot table. It depends on `workflow-engine` only for shared
//! types (Literal, MeasureSpec, ViewQuery).
//!
//! Layers:
//! - `definition`: Serializable configuration (what the pivot table IS)
//! - `planner`: Which group-by combinations the collapse state needs
//! - `cache`: Hashable dimension values and the aggregate memo
//! - `executor`: Concurrent fetching through a `QueryExecutor` (HOW we fetch)
//! - `tree`: Header trees and metric matrix (WHAT we display)

pub mod cache;
pub mod definition;
pub mod executor;
pub mod planner;
pub mod tree;

pub use cache::{value_path, AggregateCache, CacheSignature, DimensionValue, OrderedFloat, ValuePath};
pub use definition::*;
pub use executor::{
    build_view_query, AggregateResults, AggregationRequest, BatchOutcome, ExecutionError,
    GenerationCounter, PivotAggregator, QueryExecutor, Row,
};
pub use planner::plan_group_by_combinations;
pub use tree::{build_pivot_table, MetricCell, NestNode, PivotTable};
