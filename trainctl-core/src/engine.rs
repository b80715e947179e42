//! The policy engine: trigger dispatch across all controllers.
//!
//! Controllers run in document order and share one [`ControlState`], so a
//! later controller sees and may overwrite an earlier controller's writes.

use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::error::PolicyError;
use crate::evaluation::{Evaluation, EvaluationOptions, evaluate_controller};
use crate::metrics::{MetricContext, MetricRegistry};
use crate::policy::{Controller, LoadedPolicy, PolicyDocument, load_policy};
use crate::state::{ControlState, LoopConfig, TrainerState};
use crate::trigger::Trigger;
use crate::value::MetricMap;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// What happened to each subscribed controller during one dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub trigger: Trigger,
    pub outcomes: Vec<ControllerOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerOutcome {
    pub controller: String,
    #[serde(flatten)]
    pub evaluation: Evaluation,
}

impl DispatchReport {
    /// Names of the controllers whose control operation was applied.
    pub fn fired(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.evaluation.fired())
            .map(|o| o.controller.as_str())
    }
}

/// Owns the loaded controllers and the diagnostics sink.
#[derive(Debug)]
pub struct PolicyEngine {
    document: PolicyDocument,
    controllers: Vec<Controller>,
    diagnostics: Diagnostics,
    options: EvaluationOptions,
}

impl PolicyEngine {
    pub fn new(policy: LoadedPolicy, config: &EngineConfig) -> Self {
        let (document, controllers) = policy.into_parts();
        Self {
            document,
            controllers,
            diagnostics: Diagnostics::new(&config.diagnostics),
            options: EvaluationOptions {
                log_fired_metrics: config.log_fired_metrics,
            },
        }
    }

    /// Load a policy file and build an engine around it.
    pub fn from_file(
        path: &Path,
        loop_config: &LoopConfig,
        registry: &MetricRegistry,
        config: &EngineConfig,
    ) -> Result<Self, PolicyError> {
        let policy = load_policy(path, loop_config, registry)?;
        Ok(Self::new(policy, config))
    }

    pub fn document(&self) -> &PolicyDocument {
        &self.document
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Dispatch `trigger` to every subscribed controller, in document order.
    pub fn dispatch(
        &mut self,
        trigger: Trigger,
        state: &TrainerState,
        control: &mut ControlState,
        config: &LoopConfig,
        extra: Option<&MetricMap>,
    ) -> DispatchReport {
        self.diagnostics.record_dispatch();
        let ctx = MetricContext {
            trigger,
            state,
            config,
            extra,
        };

        let mut outcomes = Vec::new();
        for controller in &mut self.controllers {
            let evaluation = evaluate_controller(
                controller,
                &ctx,
                control,
                &mut self.diagnostics,
                self.options,
            );
            if evaluation == Evaluation::NotSubscribed {
                continue;
            }
            outcomes.push(ControllerOutcome {
                controller: controller.name().to_string(),
                evaluation,
            });
        }

        debug!(
            trigger = trigger.as_str(),
            controllers = outcomes.len(),
            step = state.global_step,
            "Dispatched trigger"
        );
        DispatchReport { trigger, outcomes }
    }
}

/// A [`PolicyEngine`] behind a mutex, for hosts that invoke hooks from
/// more than one thread.
#[derive(Debug, Clone)]
pub struct SharedPolicyEngine {
    inner: Arc<Mutex<PolicyEngine>>,
}

impl SharedPolicyEngine {
    pub fn new(engine: PolicyEngine) -> Self {
        info!(
            controllers = engine.controllers().len(),
            "Sharing policy engine"
        );
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Lock the engine, recovering from a poisoned lock.
    pub fn lock(&self) -> MutexGuard<'_, PolicyEngine> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn dispatch(
        &self,
        trigger: Trigger,
        state: &TrainerState,
        control: &mut ControlState,
        config: &LoopConfig,
        extra: Option<&MetricMap>,
    ) -> DispatchReport {
        self.lock().dispatch(trigger, state, control, config, extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::load_policy_str;
    use crate::state::LogEntry;

    const TWO_CONTROLLERS: &str = r#"
controllers:
  - name: a
    triggers: [on_step_end]
    rules: ["True"]
    control-operation:
      should_save: true
  - name: b
    triggers: [on_step_end]
    rules: ["True"]
    control-operation:
      should_save: false
  - name: c
    controller-metrics:
      - name: loss
        handler-class: Loss
    triggers: [on_log]
    rules: ["loss < 0.001"]
    control-operation:
      should_training_stop: true
"#;

    fn engine() -> PolicyEngine {
        let loaded = load_policy_str(
            TWO_CONTROLLERS,
            &LoopConfig::default(),
            &MetricRegistry::with_builtins(),
        )
        .unwrap();
        PolicyEngine::new(loaded, &EngineConfig::default())
    }

    #[test]
    fn test_later_controller_wins() {
        let mut engine = engine();
        let mut control = ControlState::default();
        let report = engine.dispatch(
            Trigger::OnStepEnd,
            &TrainerState::default(),
            &mut control,
            &LoopConfig::default(),
            None,
        );
        assert!(!control.should_save);
        assert_eq!(report.fired().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(report.outcomes.len(), 2);
    }

    #[test]
    fn test_dispatch_only_reaches_subscribers() {
        let mut engine = engine();
        let mut state = TrainerState::default();
        state.record_log(LogEntry::new(1).with_value("loss", 0.0001));
        let mut control = ControlState::default();
        let report = engine.dispatch(
            Trigger::OnLog,
            &state,
            &mut control,
            &LoopConfig::default(),
            None,
        );
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].controller, "c");
        assert!(control.should_training_stop);
        assert!(!control.should_save);
        assert_eq!(engine.diagnostics().dispatches(), 1);
    }

    #[test]
    fn test_shared_engine_dispatches() {
        let shared = SharedPolicyEngine::new(engine());
        let clone = shared.clone();
        let handle = std::thread::spawn(move || {
            let mut control = ControlState::default();
            clone.dispatch(
                Trigger::OnStepEnd,
                &TrainerState::default(),
                &mut control,
                &LoopConfig::default(),
                None,
            );
            control
        });
        let control = handle.join().unwrap();
        assert!(!control.should_save);
        assert_eq!(shared.lock().diagnostics().total_fired(), 2);
    }
}
