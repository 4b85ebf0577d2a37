//! FILENAME: core/workflow-engine/src/field.rs
//! Field model shared by the workflow compiler and the pivot engine.
//!
//! These structures are immutable snapshots of what the user placed on the
//! shelves. The compiler only reads them.

use serde::{Deserialize, Serialize};
use crate::expression::Expression;

// ============================================================================
// LITERALS
// ============================================================================

/// A scalar value as it appears in filter rules and result rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Literal {
    pub fn text(s: impl Into<String>) -> Self {
        Literal::Text(s.into())
    }

    /// Numeric view of the literal. Text is parsed after trimming,
    /// booleans map to 0/1, null and unparsable text yield `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Null => None,
            Literal::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Literal::Number(n) => Some(*n),
            Literal::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Number(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

// ============================================================================
// FIELDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticType {
    Dimension,
    Measure,
}

/// A field on a shelf, or in the dataset's field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Unique key of the field within the dataset.
    pub fid: String,

    /// Display name (defaults to the fid).
    #[serde(default)]
    pub name: String,

    pub analytic_type: AnalyticType,

    /// Aggregation applied when the view is aggregated ("sum", "mean", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agg_name: Option<String>,

    /// True for fields derived from an expression over other fields.
    #[serde(default)]
    pub computed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expression>,
}

impl Field {
    pub fn new(fid: impl Into<String>, analytic_type: AnalyticType) -> Self {
        let fid = fid.into();
        Field {
            name: fid.clone(),
            fid,
            analytic_type,
            agg_name: None,
            computed: false,
            expression: None,
        }
    }

    pub fn dimension(fid: impl Into<String>) -> Self {
        Field::new(fid, AnalyticType::Dimension)
    }

    pub fn measure(fid: impl Into<String>, agg_name: impl Into<String>) -> Self {
        Field::new(fid, AnalyticType::Measure).with_agg(agg_name)
    }

    /// A computed field backed by `expression`.
    pub fn computed(
        fid: impl Into<String>,
        analytic_type: AnalyticType,
        expression: Expression,
    ) -> Self {
        let mut field = Field::new(fid, analytic_type);
        field.computed = true;
        field.expression = Some(expression);
        field
    }

    pub fn with_agg(mut self, agg_name: impl Into<String>) -> Self {
        self.agg_name = Some(agg_name.into());
        self
    }

    pub fn without_agg(mut self) -> Self {
        self.agg_name = None;
        self
    }

    pub fn is_dimension(&self) -> bool {
        self.analytic_type == AnalyticType::Dimension
    }

    pub fn is_measure(&self) -> bool {
        self.analytic_type == AnalyticType::Measure
    }
}

// ============================================================================
// FILTER FIELDS
// ============================================================================

/// A filter rule as entered in the UI. Range endpoints are still raw
/// literals; the filter compiler normalizes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FilterRule {
    #[serde(rename = "one of")]
    OneOf(Vec<Literal>),
    #[serde(rename = "range")]
    Range([Literal; 2]),
    #[serde(rename = "temporal range")]
    TemporalRange([Literal; 2]),
}

/// A field placed on the filter shelf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterField {
    #[serde(flatten)]
    pub field: Field,

    /// The rule is absent until the user finishes editing the filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<FilterRule>,
}

impl FilterField {
    pub fn new(field: Field, rule: FilterRule) -> Self {
        FilterField { field, rule: Some(rule) }
    }

    pub fn without_rule(field: Field) -> Self {
        FilterField { field, rule: None }
    }

    pub fn fid(&self) -> &str {
        &self.field.fid
    }

    /// Computed filters apply after the transform step.
    pub fn is_computed(&self) -> bool {
        self.field.computed
    }
}
