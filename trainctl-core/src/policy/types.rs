//! Policy document type definitions.
//!
//! A policy document is a list of controllers. Each controller binds metric
//! handlers, subscribes to lifecycle triggers, and declares the rules and the
//! control operation applied when one of the rules fires.

use crate::control::{ControlOperation, LogLevel};
use crate::metrics::HandlerArgs;
use crate::trigger::Trigger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A complete policy document parsed from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub controllers: Vec<ControllerDefinition>,
}

impl PolicyDocument {
    /// Find a controller definition by name.
    pub fn controller(&self, name: &str) -> Option<&ControllerDefinition> {
        self.controllers.iter().find(|c| c.name == name)
    }
}

/// A named bundle of metrics, triggers, rules and one control operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ControllerDefinition {
    pub name: String,
    #[serde(default)]
    pub controller_metrics: Vec<MetricSpec>,
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub control_operation: ControlOperation,
    /// Message logged whenever the control operation applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<String>,
    /// Level of the `log-format` message; `INFO` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
}

impl ControllerDefinition {
    /// The subscribed triggers as a set.
    pub fn trigger_set(&self) -> BTreeSet<Trigger> {
        self.triggers.iter().copied().collect()
    }

    pub fn subscribes(&self, trigger: Trigger) -> bool {
        self.triggers.contains(&trigger)
    }
}

/// Which metric handler class to instantiate, under which name, with which arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetricSpec {
    pub name: String,
    pub handler_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HandlerArgs>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ControlFlag;

    #[test]
    fn test_parse_kebab_case_fields() {
        let yaml = r#"
controllers:
  - name: loss-watch
    controller-metrics:
      - name: history
        handler-class: HistoryBasedMetric
        arguments:
          window-size: 4
    triggers: [on_log, on_evaluate, on_log]
    rules:
      - "mean(history.loss) < 0.1"
    control-operation:
      should_save: true
"#;
        let doc: PolicyDocument = serde_yaml::from_str(yaml).unwrap();
        let c = &doc.controllers[0];
        assert_eq!(c.name, "loss-watch");
        assert_eq!(c.controller_metrics[0].handler_class, "HistoryBasedMetric");
        assert_eq!(
            c.controller_metrics[0].arguments.as_ref().unwrap()["window-size"],
            serde_json::json!(4)
        );
        assert_eq!(c.trigger_set().len(), 2);
        assert!(c.subscribes(Trigger::OnEvaluate));
        assert!(!c.subscribes(Trigger::OnStepEnd));
        assert_eq!(c.control_operation.get(ControlFlag::ShouldSave), Some(true));
        assert!(doc.controller("loss-watch").is_some());
        assert!(c.log_format.is_none());
    }

    #[test]
    fn test_parse_log_action() {
        let yaml = r#"
controllers:
  - name: announce
    triggers: [on_log]
    rules: ["True"]
    control-operation:
      should_log: true
    log-format: "{event_name} fired with {metrics}"
    log-level: WARNING
"#;
        let doc: PolicyDocument = serde_yaml::from_str(yaml).unwrap();
        let c = &doc.controllers[0];
        assert_eq!(c.log_format.as_deref(), Some("{event_name} fired with {metrics}"));
        assert_eq!(c.log_level, Some(LogLevel::Warning));
    }

    #[test]
    fn test_unknown_trigger_is_a_parse_error() {
        let yaml = r#"
controllers:
  - name: c
    triggers: [on_step_begin]
"#;
        assert!(serde_yaml::from_str::<PolicyDocument>(yaml).is_err());
    }
}
