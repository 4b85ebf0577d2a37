//! FILENAME: core/workflow-engine/src/expression.rs
//! PURPOSE: Computed-field expression trees and the walker that extracts
//! the field references they depend on.
//! CONTEXT: The compiler never evaluates expressions. It only needs to know
//! which fields an expression reads (to prune and order the transform step)
//! and to normalize paint maps before they are shipped to the executor.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::field::Literal;

// ============================================================================
// EXPRESSION TREE
// ============================================================================

/// An operator applied to a list of parameters, producing the field `as_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub op: String,
    pub params: Vec<ExpressionParam>,
    #[serde(rename = "as")]
    pub as_key: String,
}

/// A single expression parameter.
/// Every consumer matches this exhaustively, so a new kind of parameter
/// cannot be silently skipped by the dependency walker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ExpressionParam {
    /// Reference to another field by fid.
    Field(String),
    /// A nested sub-expression.
    Expression(Box<Expression>),
    Value(Literal),
    Constant(Literal),
    Format(String),
    Offset(i64),
    /// Painted region map used by the `paint` operator.
    Map(PaintMap),
}

impl Expression {
    pub fn new(op: impl Into<String>, as_key: impl Into<String>, params: Vec<ExpressionParam>) -> Self {
        Expression {
            op: op.into(),
            params,
            as_key: as_key.into(),
        }
    }
}

impl ExpressionParam {
    pub fn field(fid: impl Into<String>) -> Self {
        ExpressionParam::Field(fid.into())
    }

    pub fn nested(expression: Expression) -> Self {
        ExpressionParam::Expression(Box::new(expression))
    }
}

// ============================================================================
// PAINT MAPS
// ============================================================================

/// Color index that always stands for "unpainted".
pub const PAINT_EMPTY_COLOR: u32 = 255;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaintDictEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A grid of painted color indices over the (x, y) domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaintMap {
    pub x: String,
    pub y: String,
    pub domain_x: [f64; 2],
    pub domain_y: [f64; 2],
    /// Encoded color-index grid, opaque here.
    pub map: String,
    pub dict: BTreeMap<u32, PaintDictEntry>,
    /// Color indices that actually occur in `map`.
    #[serde(default)]
    pub used_color: Vec<u32>,
    pub mapwidth: u32,
}

impl PaintMap {
    /// Reduces the dictionary to the used colors, keeping only their names.
    /// Index 255 always maps to an empty name; an unknown index does too.
    fn compact(&self) -> PaintMap {
        let dict = self
            .used_color
            .iter()
            .map(|&index| {
                let name = if index == PAINT_EMPTY_COLOR {
                    String::new()
                } else {
                    self.dict
                        .get(&index)
                        .map(|entry| entry.name.clone())
                        .unwrap_or_default()
                };
                (index, PaintDictEntry { name, color: None })
            })
            .collect();

        PaintMap {
            x: self.x.clone(),
            y: self.y.clone(),
            domain_x: self.domain_x,
            domain_y: self.domain_y,
            map: self.map.clone(),
            dict,
            used_color: Vec::new(),
            mapwidth: self.mapwidth,
        }
    }
}

/// Prepares an expression for the transform step.
/// `paint` expressions get their maps compacted; everything else is
/// returned unchanged.
pub fn process_expression(expression: &Expression) -> Expression {
    if expression.op != "paint" {
        return expression.clone();
    }

    let params = expression
        .params
        .iter()
        .map(|param| match param {
            ExpressionParam::Map(map) => ExpressionParam::Map(map.compact()),
            other => other.clone(),
        })
        .collect();

    Expression {
        op: expression.op.clone(),
        params,
        as_key: expression.as_key.clone(),
    }
}

// ============================================================================
// WALKER
// ============================================================================

/// Visits every field reference in `expression`, depth-first in parameter order.
/// Nested expressions are descended into at the position they occur.
pub fn walk_expression<'e, F>(expression: &'e Expression, visit: &mut F)
where
    F: FnMut(&'e str),
{
    for param in &expression.params {
        match param {
            ExpressionParam::Field(fid) => visit(fid),
            ExpressionParam::Expression(inner) => walk_expression(inner, visit),
            ExpressionParam::Value(_)
            | ExpressionParam::Constant(_)
            | ExpressionParam::Format(_)
            | ExpressionParam::Offset(_)
            | ExpressionParam::Map(_) => {}
        }
    }
}

/// Collects the field references of an expression in traversal order.
/// Duplicates are kept.
pub fn field_references(expression: &Expression) -> Vec<String> {
    let mut refs = Vec::new();
    walk_expression(expression, &mut |fid| refs.push(fid.to_string()));
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(left: &str, right: &str, as_key: &str) -> Expression {
        Expression::new(
            "-",
            as_key,
            vec![ExpressionParam::field(left), ExpressionParam::field(right)],
        )
    }

    #[test]
    fn test_walk_flat_expression() {
        let expr = sub("sales", "cost", "profit");
        assert_eq!(field_references(&expr), vec!["sales", "cost"]);
    }

    #[test]
    fn test_walk_nested_in_parameter_order() {
        // (a - b) * c, with a literal in between
        let expr = Expression::new(
            "*",
            "out",
            vec![
                ExpressionParam::nested(sub("a", "b", "tmp")),
                ExpressionParam::Value(Literal::Number(2.0)),
                ExpressionParam::field("c"),
            ],
        );
        assert_eq!(field_references(&expr), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_walk_keeps_duplicates() {
        let expr = Expression::new(
            "+",
            "double",
            vec![ExpressionParam::field("x"), ExpressionParam::field("x")],
        );
        let mut count = 0;
        walk_expression(&expr, &mut |_| count += 1);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_walk_ignores_opaque_params() {
        let expr = Expression::new(
            "dateTimeDrill",
            "month",
            vec![
                ExpressionParam::field("order_date"),
                ExpressionParam::Format("%m".to_string()),
                ExpressionParam::Offset(-480),
                ExpressionParam::Constant(Literal::text("month")),
            ],
        );
        assert_eq!(field_references(&expr), vec!["order_date"]);
    }

    fn paint_map() -> PaintMap {
        let mut dict = BTreeMap::new();
        dict.insert(1, PaintDictEntry { name: "hot".to_string(), color: Some("#f00".to_string()) });
        dict.insert(2, PaintDictEntry { name: "cold".to_string(), color: Some("#00f".to_string()) });
        dict.insert(3, PaintDictEntry { name: "unused".to_string(), color: Some("#0f0".to_string()) });
        PaintMap {
            x: "lon".to_string(),
            y: "lat".to_string(),
            domain_x: [0.0, 10.0],
            domain_y: [0.0, 5.0],
            map: "AAEC".to_string(),
            dict,
            used_color: vec![1, 2, 255],
            mapwidth: 128,
        }
    }

    #[test]
    fn test_process_paint_compacts_dictionary() {
        let expr = Expression::new(
            "paint",
            "painted",
            vec![ExpressionParam::field("lon"), ExpressionParam::Map(paint_map())],
        );
        let processed = process_expression(&expr);

        let ExpressionParam::Map(map) = &processed.params[1] else {
            panic!("Expected map param");
        };
        assert_eq!(map.dict.len(), 3);
        assert_eq!(map.dict[&1].name, "hot");
        assert_eq!(map.dict[&1].color, None);
        assert_eq!(map.dict[&255].name, "");
        assert!(!map.dict.contains_key(&3));
        assert_eq!(processed.params[0], ExpressionParam::field("lon"));
    }

    #[test]
    fn test_process_non_paint_is_identity() {
        let expr = sub("a", "b", "c");
        assert_eq!(process_expression(&expr), expr);
    }

    #[test]
    fn test_expression_wire_shape() {
        let json = r#"{"op":"+","as":"total","params":[{"type":"field","value":"a"},{"type":"expression","value":{"op":"-","as":"t","params":[{"type":"field","value":"b"}]}}]}"#;
        let expr: Expression = serde_json::from_str(json).unwrap();
        assert_eq!(expr.as_key, "total");
        assert_eq!(field_references(&expr), vec!["a", "b"]);
    }
}
