//! FILENAME: core/workflow-engine/src/config.rs
//! Compiler configuration.
//!
//! Every field has a serde default so a host can deserialize a partial
//! config (or `{}`) and get the same behaviour as `WorkflowConfig::default()`.

use serde::{Deserialize, Serialize};

/// Field id of the synthetic "measure name" dimension produced by a fold.
pub const MEA_KEY_ID: &str = "gw_mea_key_fid";

/// Field id of the synthetic "measure value" measure produced by a fold.
pub const MEA_VAL_ID: &str = "gw_mea_val_fid";

/// What to do when computed fields reference each other in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CyclePolicy {
    /// Fail the compile with `WorkflowError::CyclicComputedField`.
    Reject,
    /// Keep the pruner's discovery order for the fields on the cycle and log a warning.
    KeepDiscoveryOrder,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        CyclePolicy::Reject
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    #[serde(default = "default_fold_key_fid")]
    pub fold_key_fid: String,

    #[serde(default = "default_fold_value_fid")]
    pub fold_value_fid: String,

    /// Aggregation applied to a measure that has no `aggName` when the view
    /// is aggregated anyway.
    #[serde(default = "default_aggregation")]
    pub default_aggregation: String,

    #[serde(default)]
    pub cycle_policy: CyclePolicy,
}

fn default_fold_key_fid() -> String {
    MEA_KEY_ID.to_string()
}

fn default_fold_value_fid() -> String {
    MEA_VAL_ID.to_string()
}

fn default_aggregation() -> String {
    "sum".to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        WorkflowConfig {
            fold_key_fid: default_fold_key_fid(),
            fold_value_fid: default_fold_value_fid(),
            default_aggregation: default_aggregation(),
            cycle_policy: CyclePolicy::default(),
        }
    }
}
