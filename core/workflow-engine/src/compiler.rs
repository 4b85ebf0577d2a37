//! FILENAME: core/workflow-engine/src/compiler.rs
//! Workflow Compiler - turns a view description into a WorkflowPlan.
//!
//! Algorithm:
//! 1. Expand folds (synthetic measure key/value pair -> the folded fields)
//! 2. Collect the view keys (dimensions, measures, filters)
//! 3. Filter step over raw fields
//! 4. Transform step with the computed fields the view actually needs
//! 5. Filter step over computed fields
//! 6. View step (aggregate or raw)
//! 7. Sort step when a sort and a limit are both set

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::config::WorkflowConfig;
use crate::dependency::{order_for_execution, prune_computed_fields};
use crate::error::{WorkflowError, WorkflowResult};
use crate::expression::{process_expression, walk_expression};
use crate::field::{Field, FilterField};
use crate::filter::compile_filter;
use crate::workflow::{
    mea_agg_key, ComputedField, MeasureSpec, SortMode, ViewQuery, VisFilter, WorkflowPlan,
    WorkflowStep,
};

// ============================================================================
// VIEW DESCRIPTION
// ============================================================================

/// Everything the compiler reads from the UI state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDescription {
    #[serde(default)]
    pub filters: Vec<FilterField>,

    /// All fields of the dataset, including computed ones.
    #[serde(default)]
    pub all_fields: Vec<Field>,

    #[serde(default)]
    pub dimensions: Vec<Field>,

    #[serde(default)]
    pub measures: Vec<Field>,

    #[serde(default)]
    pub default_aggregated: bool,

    #[serde(default)]
    pub sort: SortMode,

    /// Fids folded into the synthetic measure key/value pair.
    #[serde(default)]
    pub folds: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

// ============================================================================
// COMPILER
// ============================================================================

pub struct WorkflowCompiler<'a> {
    view: &'a ViewDescription,
    config: &'a WorkflowConfig,

    /// Dimensions after fold expansion.
    dimensions: Vec<Field>,

    /// Measures after fold expansion.
    measures: Vec<Field>,

    /// Field keys the view uses; drives computed-field pruning.
    view_keys: FxHashSet<String>,
}

impl<'a> WorkflowCompiler<'a> {
    pub fn new(view: &'a ViewDescription, config: &'a WorkflowConfig) -> Self {
        WorkflowCompiler {
            view,
            config,
            dimensions: Vec::new(),
            measures: Vec::new(),
            view_keys: FxHashSet::default(),
        }
    }

    /// Runs every compile stage and returns the plan.
    pub fn compile(mut self) -> WorkflowResult<WorkflowPlan> {
        self.expand_folds()?;
        self.collect_view_keys();

        let filter_step = self.filter_step(false)?;
        let transform_step = self.transform_step()?;
        let computed_filter_step = self.filter_step(true)?;
        let aggregated = self.is_aggregated();
        let view_step = self.view_step(aggregated);
        let sort_step = self.sort_step(aggregated);

        let plan = WorkflowPlan::from_steps(
            [filter_step, transform_step, computed_filter_step, Some(view_step), sort_step],
            self.view.limit,
        );

        log::debug!(
            "compiled workflow: steps={:?} aggregated={} limit={:?}",
            plan.kinds(),
            aggregated,
            plan.limit
        );
        Ok(plan)
    }

    /// Replaces the synthetic fold pair with the folded fields.
    /// The pair is dropped from both lists even when only one half is present.
    fn expand_folds(&mut self) -> WorkflowResult<()> {
        let view = self.view;
        let key_fid = self.config.fold_key_fid.as_str();
        let value_fid = self.config.fold_value_fid.as_str();

        let has_fold_key = view.dimensions.iter().any(|f| f.fid == key_fid);
        let fold_value = view.measures.iter().find(|f| f.fid == value_fid);

        self.dimensions = view.dimensions.iter().filter(|f| f.fid != key_fid).cloned().collect();
        self.measures = view.measures.iter().filter(|f| f.fid != value_fid).cloned().collect();

        let Some(fold_value) = fold_value.filter(|_| has_fold_key) else {
            return Ok(());
        };

        for fold in &view.folds {
            let field = view
                .all_fields
                .iter()
                .find(|f| &f.fid == fold)
                .ok_or_else(|| WorkflowError::UnresolvableFieldReference {
                    fid: fold.clone(),
                    referenced_by: value_fid.to_string(),
                })?;

            let mut folded = field.clone();
            folded.agg_name = fold_value.agg_name.clone();
            if folded.is_dimension() {
                self.dimensions.push(folded);
            } else {
                self.measures.push(folded);
            }
        }

        Ok(())
    }

    fn collect_view_keys(&mut self) {
        let keys = self
            .dimensions
            .iter()
            .chain(self.measures.iter())
            .map(|f| f.fid.clone())
            .chain(self.view.filters.iter().map(|f| f.fid().to_string()));
        self.view_keys.extend(keys);
    }

    /// Filter step over raw (`computed == false`) or computed filters.
    fn filter_step(&mut self, computed: bool) -> WorkflowResult<Option<WorkflowStep>> {
        let view = self.view;
        let filters = view
            .filters
            .iter()
            .filter(|f| f.is_computed() == computed)
            .map(|f| compile_filter(f, &mut self.view_keys))
            .collect::<WorkflowResult<Vec<VisFilter>>>()?;

        if filters.is_empty() {
            return Ok(None);
        }
        Ok(Some(WorkflowStep::Filter { filters }))
    }

    /// Transform step: the computed fields the view needs, in execution order.
    fn transform_step(&self) -> WorkflowResult<Option<WorkflowStep>> {
        let computed: Vec<ComputedField> = self
            .view
            .all_fields
            .iter()
            .filter(|f| f.computed)
            .filter_map(|f| {
                f.expression
                    .as_ref()
                    .map(|expr| ComputedField::new(f.fid.clone(), process_expression(expr)))
            })
            .collect();

        let pruned = prune_computed_fields(&computed, &self.view_keys);
        if pruned.is_empty() {
            return Ok(None);
        }

        self.check_references(&pruned)?;
        let transform = order_for_execution(pruned, self.config.cycle_policy)?;
        Ok(Some(WorkflowStep::Transform { transform }))
    }

    /// Every field an expression reads must exist in the dataset.
    fn check_references(&self, fields: &[ComputedField]) -> WorkflowResult<()> {
        let known: FxHashSet<&str> = self.view.all_fields.iter().map(|f| f.fid.as_str()).collect();

        for field in fields {
            let mut missing: Option<&str> = None;
            walk_expression(&field.expression, &mut |fid| {
                if missing.is_none() && !known.contains(fid) {
                    missing = Some(fid);
                }
            });
            if let Some(fid) = missing {
                return Err(WorkflowError::UnresolvableFieldReference {
                    fid: fid.to_string(),
                    referenced_by: field.key.clone(),
                });
            }
        }
        Ok(())
    }

    /// Aggregation applies when enabled and either some measure names an
    /// aggregation, or there are only dimensions on the shelves.
    fn is_aggregated(&self) -> bool {
        let any_aggregated = self.measures.iter().any(|f| f.agg_name.is_some());
        let dimensions_only = self.measures.is_empty() && !self.dimensions.is_empty();
        self.view.default_aggregated && (any_aggregated || dimensions_only)
    }

    fn measure_agg<'f>(&'f self, field: &'f Field) -> &'f str {
        field
            .agg_name
            .as_deref()
            .unwrap_or(self.config.default_aggregation.as_str())
    }

    fn view_step(&self, aggregated: bool) -> WorkflowStep {
        let query = if aggregated {
            ViewQuery::aggregate(
                self.dimensions.iter().map(|f| f.fid.clone()).collect(),
                self.measures
                    .iter()
                    .map(|f| MeasureSpec::new(f.fid.clone(), self.measure_agg(f)))
                    .collect(),
            )
        } else {
            ViewQuery::raw(
                self.dimensions
                    .iter()
                    .chain(self.measures.iter())
                    .map(|f| f.fid.clone()),
            )
        };
        WorkflowStep::View { query: vec![query] }
    }

    fn sort_step(&self, aggregated: bool) -> Option<WorkflowStep> {
        let direction = self.view.sort.direction()?;
        if !self.view.limit.is_some_and(|limit| limit > 0) {
            return None;
        }

        let mut by: Vec<String> = Vec::with_capacity(self.measures.len());
        for field in &self.measures {
            let key = if aggregated {
                mea_agg_key(&field.fid, Some(self.measure_agg(field)))
            } else {
                field.fid.clone()
            };
            if !by.contains(&key) {
                by.push(key);
            }
        }

        if by.is_empty() {
            return None;
        }
        Some(WorkflowStep::Sort { by, sort: direction })
    }
}

/// Compiles a view description into an ordered workflow.
/// This is the main entry point of the crate.
pub fn compile_workflow(
    view: &ViewDescription,
    config: &WorkflowConfig,
) -> WorkflowResult<WorkflowPlan> {
    WorkflowCompiler::new(view, config).compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MEA_KEY_ID, MEA_VAL_ID};
    use crate::expression::{Expression, ExpressionParam};
    use crate::field::{AnalyticType, FilterRule, Literal};
    use crate::workflow::{SortDirection, StepKind, VisFilterRule};

    fn sales_view() -> ViewDescription {
        ViewDescription {
            all_fields: vec![
                Field::dimension("Region"),
                Field::dimension("Category"),
                Field::measure("Sales", "sum"),
                Field::measure("Cost", "sum"),
            ],
            dimensions: vec![Field::dimension("Region"), Field::dimension("Category")],
            measures: vec![Field::measure("Sales", "sum")],
            default_aggregated: true,
            ..Default::default()
        }
    }

    fn compile(view: &ViewDescription) -> WorkflowResult<WorkflowPlan> {
        compile_workflow(view, &WorkflowConfig::default())
    }

    #[test]
    fn test_basic_aggregate_view() {
        let plan = compile(&sales_view()).unwrap();
        assert_eq!(plan.kinds(), vec![StepKind::View]);
        assert_eq!(
            plan.view_queries().unwrap(),
            &[ViewQuery::Aggregate {
                group_by: vec!["Region".to_string(), "Category".to_string()],
                measures: vec![MeasureSpec::new("Sales", "sum")],
            }]
        );
    }

    #[test]
    fn test_aggregation_disabled_gives_raw() {
        let mut view = sales_view();
        view.default_aggregated = false;
        let plan = compile(&view).unwrap();
        assert_eq!(
            plan.view_queries().unwrap(),
            &[ViewQuery::raw(["Region", "Category", "Sales"])]
        );
    }

    #[test]
    fn test_measures_without_aggregation_give_raw() {
        let mut view = sales_view();
        view.measures = vec![Field::measure("Sales", "sum").without_agg()];
        let plan = compile(&view).unwrap();
        assert!(!plan.view_queries().unwrap()[0].is_aggregate());
    }

    #[test]
    fn test_dimensions_only_aggregates() {
        let mut view = sales_view();
        view.measures.clear();
        let plan = compile(&view).unwrap();
        assert_eq!(
            plan.view_queries().unwrap(),
            &[ViewQuery::Aggregate {
                group_by: vec!["Region".to_string(), "Category".to_string()],
                measures: vec![],
            }]
        );
    }

    #[test]
    fn test_raw_and_computed_filters_stay_separate() {
        let mut view = sales_view();
        let profit = Expression::new(
            "-",
            "Profit",
            vec![ExpressionParam::field("Sales"), ExpressionParam::field("Cost")],
        );
        view.all_fields.push(Field::computed("Profit", AnalyticType::Measure, profit.clone()));
        let mut profit_field = Field::computed("Profit", AnalyticType::Measure, profit);
        profit_field.agg_name = Some("sum".to_string());
        view.filters = vec![
            FilterField::new(profit_field, FilterRule::Range([Literal::Number(0.0), Literal::Number(100.0)])),
            FilterField::new(
                Field::dimension("Region"),
                FilterRule::OneOf(vec![Literal::text("East")]),
            ),
        ];

        let plan = compile(&view).unwrap();
        assert_eq!(
            plan.kinds(),
            vec![StepKind::Filter, StepKind::Transform, StepKind::Filter, StepKind::View]
        );
        let WorkflowStep::Filter { filters } = &plan.workflow[2] else {
            panic!("Expected filter step");
        };
        assert_eq!(filters[0].rule, VisFilterRule::Range(0.0, 100.0));
    }

    #[test]
    fn test_sort_needs_limit() {
        let mut view = sales_view();
        view.sort = SortMode::Descending;
        assert_eq!(compile(&view).unwrap().kinds(), vec![StepKind::View]);

        view.limit = Some(10);
        let plan = compile(&view).unwrap();
        assert_eq!(plan.kinds(), vec![StepKind::View, StepKind::Sort]);
        assert_eq!(
            plan.workflow[1],
            WorkflowStep::Sort { by: vec!["Sales_sum".to_string()], sort: SortDirection::Descending }
        );
        assert_eq!(plan.limit, Some(10));
    }

    #[test]
    fn test_sort_raw_uses_fids() {
        let mut view = sales_view();
        view.default_aggregated = false;
        view.sort = SortMode::Ascending;
        view.limit = Some(5);
        let plan = compile(&view).unwrap();
        assert_eq!(
            plan.workflow[1],
            WorkflowStep::Sort { by: vec!["Sales".to_string()], sort: SortDirection::Ascending }
        );
    }

    #[test]
    fn test_sort_without_measures_is_dropped() {
        let mut view = sales_view();
        view.measures.clear();
        view.sort = SortMode::Ascending;
        view.limit = Some(5);
        assert_eq!(compile(&view).unwrap().kinds(), vec![StepKind::View]);
    }

    #[test]
    fn test_fold_expansion() {
        let mut view = sales_view();
        view.dimensions = vec![Field::dimension("Region"), Field::dimension(MEA_KEY_ID)];
        view.measures = vec![Field::measure(MEA_VAL_ID, "mean")];
        view.folds = vec!["Sales".to_string(), "Cost".to_string()];

        let plan = compile(&view).unwrap();
        assert_eq!(
            plan.view_queries().unwrap(),
            &[ViewQuery::Aggregate {
                group_by: vec!["Region".to_string()],
                measures: vec![MeasureSpec::new("Sales", "mean"), MeasureSpec::new("Cost", "mean")],
            }]
        );
    }

    #[test]
    fn test_half_fold_pair_is_dropped() {
        let mut view = sales_view();
        view.dimensions.push(Field::dimension(MEA_KEY_ID));
        view.folds = vec!["Cost".to_string()];
        let plan = compile(&view).unwrap();
        let ViewQuery::Aggregate { group_by, measures } = &plan.view_queries().unwrap()[0] else {
            panic!("Expected aggregate");
        };
        assert_eq!(group_by, &vec!["Region".to_string(), "Category".to_string()]);
        assert_eq!(measures.len(), 1);
    }

    #[test]
    fn test_unknown_fold_field() {
        let mut view = sales_view();
        view.dimensions.push(Field::dimension(MEA_KEY_ID));
        view.measures.push(Field::measure(MEA_VAL_ID, "sum"));
        view.folds = vec!["Missing".to_string()];
        assert!(matches!(
            compile(&view),
            Err(WorkflowError::UnresolvableFieldReference { ref fid, .. }) if fid == "Missing"
        ));
    }

    #[test]
    fn test_unresolvable_expression_reference() {
        let mut view = sales_view();
        let expr = Expression::new("-", "Margin", vec![ExpressionParam::field("Revenue")]);
        view.all_fields.push(Field::computed("Margin", AnalyticType::Measure, expr.clone()));
        view.measures.push(Field::computed("Margin", AnalyticType::Measure, expr).with_agg("sum"));
        assert_eq!(
            compile(&view),
            Err(WorkflowError::UnresolvableFieldReference {
                fid: "Revenue".to_string(),
                referenced_by: "Margin".to_string(),
            })
        );
    }

    #[test]
    fn test_invalid_filter_fails_whole_compile() {
        let mut view = sales_view();
        view.filters = vec![FilterField::without_rule(Field::dimension("Region"))];
        assert!(matches!(compile(&view), Err(WorkflowError::InvalidFilterRule { .. })));
    }
}
