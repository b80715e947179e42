//! Host-facing lifecycle hooks.
//!
//! A training loop calls one hook per lifecycle event. Every hook has a no-op
//! default so implementors only override the events they care about.

use crate::engine::PolicyEngine;
use crate::state::{ControlState, LoopConfig, TrainerState};
use crate::trigger::Trigger;
use crate::value::MetricMap;

/// Lifecycle callbacks invoked by a training loop.
pub trait TrainerCallback: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn on_train_begin(&mut self, _config: &LoopConfig, _state: &TrainerState, _control: &mut ControlState) {}

    fn on_train_end(&mut self, _config: &LoopConfig, _state: &TrainerState, _control: &mut ControlState) {}

    fn on_epoch_begin(&mut self, _config: &LoopConfig, _state: &TrainerState, _control: &mut ControlState) {}

    fn on_epoch_end(&mut self, _config: &LoopConfig, _state: &TrainerState, _control: &mut ControlState) {}

    fn on_step_end(&mut self, _config: &LoopConfig, _state: &TrainerState, _control: &mut ControlState) {}

    /// Step end with per-batch values supplied by the host.
    fn on_step_end_with_batch_data(
        &mut self,
        _config: &LoopConfig,
        _state: &TrainerState,
        _control: &mut ControlState,
        _batch: &MetricMap,
    ) {
    }

    fn on_predict(&mut self, _config: &LoopConfig, _state: &TrainerState, _control: &mut ControlState) {}

    fn on_prediction_step(
        &mut self,
        _config: &LoopConfig,
        _state: &TrainerState,
        _control: &mut ControlState,
    ) {
    }

    fn on_log(&mut self, _config: &LoopConfig, _state: &TrainerState, _control: &mut ControlState) {}

    /// Evaluation finished; `metrics` holds the evaluation results.
    fn on_evaluate(
        &mut self,
        _config: &LoopConfig,
        _state: &TrainerState,
        _control: &mut ControlState,
        _metrics: &MetricMap,
    ) {
    }
}

impl TrainerCallback for PolicyEngine {
    fn name(&self) -> &str {
        "policy-engine"
    }

    fn on_train_begin(&mut self, config: &LoopConfig, state: &TrainerState, control: &mut ControlState) {
        self.dispatch(Trigger::OnTrainBegin, state, control, config, None);
    }

    fn on_train_end(&mut self, config: &LoopConfig, state: &TrainerState, control: &mut ControlState) {
        self.dispatch(Trigger::OnTrainEnd, state, control, config, None);
    }

    fn on_epoch_begin(&mut self, config: &LoopConfig, state: &TrainerState, control: &mut ControlState) {
        self.dispatch(Trigger::OnEpochBegin, state, control, config, None);
    }

    fn on_epoch_end(&mut self, config: &LoopConfig, state: &TrainerState, control: &mut ControlState) {
        self.dispatch(Trigger::OnEpochEnd, state, control, config, None);
    }

    fn on_step_end(&mut self, config: &LoopConfig, state: &TrainerState, control: &mut ControlState) {
        self.dispatch(Trigger::OnStepEnd, state, control, config, None);
    }

    fn on_step_end_with_batch_data(
        &mut self,
        config: &LoopConfig,
        state: &TrainerState,
        control: &mut ControlState,
        batch: &MetricMap,
    ) {
        self.dispatch(Trigger::OnStepEndWithBatchData, state, control, config, Some(batch));
    }

    fn on_predict(&mut self, config: &LoopConfig, state: &TrainerState, control: &mut ControlState) {
        self.dispatch(Trigger::OnPredict, state, control, config, None);
    }

    fn on_prediction_step(
        &mut self,
        config: &LoopConfig,
        state: &TrainerState,
        control: &mut ControlState,
    ) {
        self.dispatch(Trigger::OnPredictionStep, state, control, config, None);
    }

    fn on_log(&mut self, config: &LoopConfig, state: &TrainerState, control: &mut ControlState) {
        self.dispatch(Trigger::OnLog, state, control, config, None);
    }

    fn on_evaluate(
        &mut self,
        config: &LoopConfig,
        state: &TrainerState,
        control: &mut ControlState,
        metrics: &MetricMap,
    ) {
        self.dispatch(Trigger::OnEvaluate, state, control, config, Some(metrics));
    }
}
