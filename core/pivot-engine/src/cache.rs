//! FILENAME: core/pivot-engine/src/cache.rs
//! Pivot Cache - hashable dimension values and the aggregate memo.
//!
//! Result rows carry plain literals, which cannot key a hash map (f64 has
//! no Eq). `DimensionValue` is the hashable, totally ordered form used for
//! tree grouping and cell lookup. `AggregateCache` keeps the rows fetched
//! per group-by combination so that collapsing one more header only
//! fetches the combinations not seen yet.

use std::cmp::Ordering;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use workflow_engine::{Literal, MeasureSpec};

use crate::definition::{GroupByCombination, PivotDefinition};
use crate::executor::Row;

// ============================================================================
// DIMENSION VALUES
// ============================================================================

/// Wrapper around f64 that implements Eq and Hash for use as HashMap keys.
/// NaN values are treated as equal to each other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        if self.0.is_nan() && other.0.is_nan() {
            true
        } else {
            self.0 == other.0
        }
    }
}

impl Eq for OrderedFloat {}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        if self.0.is_nan() {
            // All NaN values hash to the same thing
            u64::MAX.hash(state);
        } else if self.0 == 0.0 {
            // -0.0 == 0.0, so they must hash alike
            0u64.hash(state);
        } else {
            self.0.to_bits().hash(state);
        }
    }
}

/// A dimension value as it appears in a header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimensionValue {
    Null,
    Number(OrderedFloat),
    Text(String),
    Boolean(bool),
}

impl From<&Literal> for DimensionValue {
    fn from(value: &Literal) -> Self {
        match value {
            Literal::Null => DimensionValue::Null,
            Literal::Number(n) => DimensionValue::Number(OrderedFloat(*n)),
            Literal::Text(s) => DimensionValue::Text(s.clone()),
            Literal::Bool(b) => DimensionValue::Boolean(*b),
        }
    }
}

impl DimensionValue {
    pub fn to_literal(&self) -> Literal {
        match self {
            DimensionValue::Null => Literal::Null,
            DimensionValue::Number(n) => Literal::Number(n.0),
            DimensionValue::Text(s) => Literal::Text(s.clone()),
            DimensionValue::Boolean(b) => Literal::Bool(*b),
        }
    }
}

/// Header order: nulls first, then numbers, text, booleans.
impl Ord for DimensionValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (DimensionValue::Null, DimensionValue::Null) => Ordering::Equal,
            (DimensionValue::Null, _) => Ordering::Less,
            (_, DimensionValue::Null) => Ordering::Greater,

            // NaN sorts after every other number, consistent with OrderedFloat's Eq
            (DimensionValue::Number(a), DimensionValue::Number(b)) => a
                .0
                .partial_cmp(&b.0)
                .unwrap_or_else(|| a.0.is_nan().cmp(&b.0.is_nan())),
            (DimensionValue::Number(_), _) => Ordering::Less,
            (_, DimensionValue::Number(_)) => Ordering::Greater,

            (DimensionValue::Text(a), DimensionValue::Text(b)) => a.cmp(b),
            (DimensionValue::Text(_), _) => Ordering::Less,
            (_, DimensionValue::Text(_)) => Ordering::Greater,

            (DimensionValue::Boolean(a), DimensionValue::Boolean(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for DimensionValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dimension values of one row along a list of fids. Most pivots nest only
/// a few levels deep, so the path usually stays inline.
pub type ValuePath = SmallVec<[DimensionValue; 4]>;

/// Reads `fids` out of `row`. A missing column reads as null.
pub fn value_path(row: &Row, fids: &[String]) -> ValuePath {
    fids.iter()
        .map(|fid| row.get(fid).map(DimensionValue::from).unwrap_or(DimensionValue::Null))
        .collect()
}

// ============================================================================
// AGGREGATE CACHE
// ============================================================================

/// Everything a memoized aggregate depends on besides its combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSignature {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    pub measures: Vec<MeasureSpec>,
    pub aggregated: bool,
    pub dataset_version: u64,
}

impl CacheSignature {
    pub fn of(definition: &PivotDefinition, dataset_version: u64) -> Self {
        CacheSignature {
            rows: definition.rows.clone(),
            columns: definition.columns.clone(),
            measures: definition.measures.clone(),
            aggregated: definition.config.default_aggregated,
            dataset_version,
        }
    }
}

/// Rows fetched per group-by combination.
/// Only successful fetches are stored; a failed combination is retried on
/// the next batch.
#[derive(Debug, Default)]
pub struct AggregateCache {
    signature: Option<CacheSignature>,
    entries: FxHashMap<GroupByCombination, Arc<Vec<Row>>>,
}

impl AggregateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the cache valid for `signature`, dropping every entry if it
    /// was filled under a different one.
    ///
    /// # Returns
    /// `true` if the existing entries were kept.
    pub fn validate(&mut self, signature: CacheSignature) -> bool {
        if self.is_valid_for(&signature) {
            return true;
        }
        if !self.entries.is_empty() {
            log::debug!("aggregate cache invalidated ({} entries dropped)", self.entries.len());
        }
        self.entries.clear();
        self.signature = Some(signature);
        false
    }

    pub fn is_valid_for(&self, signature: &CacheSignature) -> bool {
        self.signature.as_ref() == Some(signature)
    }

    pub fn get(&self, combination: &GroupByCombination) -> Option<Arc<Vec<Row>>> {
        self.entries.get(combination).cloned()
    }

    pub fn contains(&self, combination: &GroupByCombination) -> bool {
        self.entries.contains_key(combination)
    }

    pub fn insert(&mut self, combination: GroupByCombination, rows: Arc<Vec<Row>>) {
        self.entries.insert(combination, rows);
    }

    /// Drops all entries and the signature.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.signature = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
