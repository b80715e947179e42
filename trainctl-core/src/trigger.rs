//! Lifecycle triggers a training loop host can notify the engine about.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named point in the training loop's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    OnTrainBegin,
    OnTrainEnd,
    OnEpochBegin,
    OnEpochEnd,
    OnStepEnd,
    OnStepEndWithBatchData,
    OnPredict,
    OnPredictionStep,
    OnLog,
    OnEvaluate,
}

impl Trigger {
    /// Every trigger, in lifecycle order.
    pub const ALL: [Trigger; 10] = [
        Trigger::OnTrainBegin,
        Trigger::OnTrainEnd,
        Trigger::OnEpochBegin,
        Trigger::OnEpochEnd,
        Trigger::OnStepEnd,
        Trigger::OnStepEndWithBatchData,
        Trigger::OnPredict,
        Trigger::OnPredictionStep,
        Trigger::OnLog,
        Trigger::OnEvaluate,
    ];

    /// Return the trigger name as it appears in policy documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::OnTrainBegin => "on_train_begin",
            Trigger::OnTrainEnd => "on_train_end",
            Trigger::OnEpochBegin => "on_epoch_begin",
            Trigger::OnEpochEnd => "on_epoch_end",
            Trigger::OnStepEnd => "on_step_end",
            Trigger::OnStepEndWithBatchData => "on_step_end_with_batch_data",
            Trigger::OnPredict => "on_predict",
            Trigger::OnPredictionStep => "on_prediction_step",
            Trigger::OnLog => "on_log",
            Trigger::OnEvaluate => "on_evaluate",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Trigger::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown trigger: '{}'", s))
    }
}
