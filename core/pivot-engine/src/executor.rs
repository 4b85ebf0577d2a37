//! FILENAME: core/pivot-engine/src/executor.rs
//! PURPOSE: Fetches the aggregates a pivot view needs from an external
//! query executor.
//! CONTEXT: One query per planned group-by combination, all in flight at
//! once. A failing combination shows up as empty cells rather than failing
//! the table. The user can keep collapsing headers while a batch runs, so
//! every batch carries a generation ticket; a batch that finishes after a
//! newer one was started is thrown away.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::task::JoinSet;
use workflow_engine::{Literal, MeasureSpec, ViewQuery};

use crate::cache::{AggregateCache, CacheSignature};
use crate::definition::{CollapsedHeaders, GroupByCombination, PivotDefinition};
use crate::planner::plan_group_by_combinations;

/// One result row: output column -> value.
pub type Row = BTreeMap<String, Literal>;

// ============================================================================
// EXECUTOR SEAM
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Query execution failed: {0}")]
    Failed(String),

    #[error("Query task aborted: {0}")]
    TaskAborted(String),
}

/// Runs a single view query against the dataset.
/// Implementations live outside this crate (in-memory worker, remote
/// database, ...).
pub trait QueryExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        query: ViewQuery,
    ) -> impl Future<Output = Result<Vec<Row>, ExecutionError>> + Send;
}

/// Builds the query for one combination.
/// Aggregated queries group by the column fids followed by the row fids;
/// raw queries select those fids plus every measure field.
pub fn build_view_query(
    combination: &GroupByCombination,
    measures: &[MeasureSpec],
    aggregated: bool,
) -> ViewQuery {
    let group_by = combination.group_by();
    if aggregated {
        ViewQuery::aggregate(group_by, measures.to_vec())
    } else {
        ViewQuery::raw(group_by.into_iter().chain(measures.iter().map(|m| m.field.clone())))
    }
}

// ============================================================================
// GENERATIONS
// ============================================================================

/// Shared batch counter. Starting a batch takes a ticket with `advance`;
/// the batch is current only while no later ticket has been taken.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.current() == ticket
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

/// Inputs of one aggregation batch.
#[derive(Debug, Clone, Copy)]
pub struct AggregationRequest<'a> {
    pub definition: &'a PivotDefinition,
    pub collapsed: &'a CollapsedHeaders,
    /// Bumped by the host whenever the underlying rows change.
    pub dataset_version: u64,
}

/// Rows for every planned combination of a batch.
#[derive(Debug, Clone, Default)]
pub struct AggregateResults {
    combinations: Vec<GroupByCombination>,
    entries: FxHashMap<GroupByCombination, Arc<Vec<Row>>>,
    failed: Vec<GroupByCombination>,
}

impl AggregateResults {
    pub fn insert(&mut self, combination: GroupByCombination, rows: Arc<Vec<Row>>) {
        if self.entries.insert(combination.clone(), rows).is_none() {
            self.combinations.push(combination);
        }
    }

    /// Records a combination whose fetch failed. It reads as empty.
    pub fn insert_failed(&mut self, combination: GroupByCombination) {
        self.insert(combination.clone(), Arc::new(Vec::new()));
        self.failed.push(combination);
    }

    pub fn get(&self, combination: &GroupByCombination) -> Option<&[Row]> {
        self.entries.get(combination).map(|rows| rows.as_slice())
    }

    /// Combinations in planning order.
    pub fn combinations(&self) -> &[GroupByCombination] {
        &self.combinations
    }

    pub fn failed(&self) -> &[GroupByCombination] {
        &self.failed
    }

    pub fn len(&self) -> usize {
        self.combinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// A newer batch started meanwhile; nothing was kept.
    Stale,
    Ready(AggregateResults),
}

impl BatchOutcome {
    pub fn is_stale(&self) -> bool {
        matches!(self, BatchOutcome::Stale)
    }

    pub fn into_results(self) -> Option<AggregateResults> {
        match self {
            BatchOutcome::Stale => None,
            BatchOutcome::Ready(results) => Some(results),
        }
    }
}

/// Plans, fetches and memoizes pivot aggregates.
pub struct PivotAggregator<E: QueryExecutor> {
    executor: Arc<E>,
    cache: AggregateCache,
    generation: GenerationCounter,
}

impl<E: QueryExecutor> PivotAggregator<E> {
    pub fn new(executor: E) -> Self {
        Self::with_shared(Arc::new(executor))
    }

    pub fn with_shared(executor: Arc<E>) -> Self {
        PivotAggregator {
            executor,
            cache: AggregateCache::new(),
            generation: GenerationCounter::new(),
        }
    }

    /// Uses a counter shared with the host instead of a private one.
    pub fn with_generation(mut self, generation: GenerationCounter) -> Self {
        self.generation = generation;
        self
    }

    /// Handle to the counter issuing batch tickets.
    pub fn generation(&self) -> GenerationCounter {
        self.generation.clone()
    }

    pub fn cache(&self) -> &AggregateCache {
        &self.cache
    }

    /// Fetches every combination the request needs.
    ///
    /// Combinations already memoized under the same signature are not
    /// fetched again. The others run concurrently; a failed one (error or
    /// panicked task) is logged and reads as empty.
    ///
    /// # Arguments
    /// * `request` - The pivot definition, collapse snapshot and dataset version.
    /// * `ticket` - The generation ticket taken when the batch was started.
    ///
    /// # Returns
    /// `BatchOutcome::Stale` if `ticket` is no longer current once the
    /// fetches finish (the cache is left as it was), otherwise the rows
    /// for every planned combination.
    pub async fn fetch(&mut self, request: &AggregationRequest<'_>, ticket: u64) -> BatchOutcome {
        let definition = request.definition;
        let combinations = plan_group_by_combinations(
            &definition.rows,
            &definition.columns,
            request.collapsed,
            definition.config.show_summary,
        );

        let signature = CacheSignature::of(definition, request.dataset_version);
        let cache_valid = self.cache.is_valid_for(&signature);
        let missing: Vec<&GroupByCombination> = combinations
            .iter()
            .filter(|c| !cache_valid || !self.cache.contains(c))
            .collect();

        let fetched = self.run_batch(&missing, definition).await;

        if !self.generation.is_current(ticket) {
            log::info!(
                "discarding stale pivot batch (ticket {}, current {})",
                ticket,
                self.generation.current()
            );
            return BatchOutcome::Stale;
        }

        self.cache.validate(signature);
        let mut results = AggregateResults::default();
        for combination in combinations {
            if let Some(rows) = fetched.get(&combination) {
                self.cache.insert(combination.clone(), Arc::clone(rows));
            }
            match self.cache.get(&combination) {
                Some(rows) => results.insert(combination, rows),
                None => results.insert_failed(combination),
            }
        }

        log::debug!(
            "pivot batch ready: {} combinations, {} fetched, {} failed",
            results.len(),
            fetched.len(),
            results.failed().len()
        );
        BatchOutcome::Ready(results)
    }

    async fn run_batch(
        &self,
        combinations: &[&GroupByCombination],
        definition: &PivotDefinition,
    ) -> FxHashMap<GroupByCombination, Arc<Vec<Row>>> {
        let mut tasks = JoinSet::new();
        for &combination in combinations {
            let query = build_view_query(
                combination,
                &definition.measures,
                definition.config.default_aggregated,
            );
            let executor = Arc::clone(&self.executor);
            let combination = combination.clone();
            tasks.spawn(async move {
                let result = executor.execute(query).await;
                (combination, result)
            });
        }

        let mut fetched = FxHashMap::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((combination, Ok(rows))) => {
                    fetched.insert(combination, Arc::new(rows));
                }
                Ok((combination, Err(err))) => {
                    log::warn!(
                        "aggregate for group-by {:?} failed, cells stay empty: {}",
                        combination.group_by(),
                        err
                    );
                }
                Err(join_err) => {
                    let err = ExecutionError::TaskAborted(join_err.to_string());
                    log::warn!("aggregate task did not complete, cells stay empty: {}", err);
                }
            }
        }
        fetched
    }
}
