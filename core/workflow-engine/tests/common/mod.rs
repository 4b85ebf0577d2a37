//! FILENAME: tests/common/mod.rs
//! Fixtures for workflow-engine integration tests.

#![allow(dead_code)]

use workflow_engine::{
    AnalyticType, Expression, ExpressionParam, Field, FilterField, FilterRule, Literal,
    ViewDescription,
};

/// A small sales dataset schema: two dimensions, two raw measures and a
/// chain of computed fields (Margin -> Profit -> Sales, Cost).
pub struct SalesFixture;

impl SalesFixture {
    pub fn profit_expression() -> Expression {
        Expression::new(
            "-",
            "Profit",
            vec![ExpressionParam::field("Sales"), ExpressionParam::field("Cost")],
        )
    }

    pub fn margin_expression() -> Expression {
        Expression::new(
            "/",
            "Margin",
            vec![ExpressionParam::field("Profit"), ExpressionParam::field("Sales")],
        )
    }

    pub fn unused_expression() -> Expression {
        Expression::new("*", "Unused", vec![ExpressionParam::field("Cost")])
    }

    pub fn all_fields() -> Vec<Field> {
        vec![
            Field::dimension("Region"),
            Field::dimension("Category"),
            Field::measure("Sales", "sum"),
            Field::measure("Cost", "sum"),
            Field::computed("Margin", AnalyticType::Measure, Self::margin_expression()),
            Field::computed("Profit", AnalyticType::Measure, Self::profit_expression()),
            Field::computed("Unused", AnalyticType::Measure, Self::unused_expression()),
        ]
    }

    pub fn field(fid: &str) -> Field {
        Self::all_fields()
            .into_iter()
            .find(|f| f.fid == fid)
            .unwrap_or_else(|| panic!("unknown fixture field {}", fid))
    }

    /// Rows: Region, Category. Measure: sum(Sales). Aggregated, nothing else.
    pub fn base_view() -> ViewDescription {
        ViewDescription {
            all_fields: Self::all_fields(),
            dimensions: vec![Self::field("Region"), Self::field("Category")],
            measures: vec![Self::field("Sales")],
            default_aggregated: true,
            ..Default::default()
        }
    }

    pub fn region_filter(values: &[&str]) -> FilterField {
        FilterField::new(
            Self::field("Region"),
            FilterRule::OneOf(values.iter().map(|v| Literal::text(*v)).collect()),
        )
    }
}
