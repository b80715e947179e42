//! Policy document loading: parse, validate, instantiate handlers.
//!
//! Loading is all-or-nothing. Any missing file, parse error, structural
//! problem, unknown handler class or incompatible handler aborts the load.

use super::controller::Controller;
use super::types::{ControllerDefinition, PolicyDocument};
use crate::error::PolicyError;
use crate::metrics::{HandlerArgs, MetricHandler, MetricRegistry};
use crate::state::LoopConfig;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// A loaded policy: the parsed document and its bound controllers, in document order.
#[derive(Debug)]
pub struct LoadedPolicy {
    document: PolicyDocument,
    controllers: Vec<Controller>,
}

impl LoadedPolicy {
    pub fn document(&self) -> &PolicyDocument {
        &self.document
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    pub fn into_parts(self) -> (PolicyDocument, Vec<Controller>) {
        (self.document, self.controllers)
    }

    /// The instantiated handlers of a controller.
    pub fn handlers(&self, controller: &str) -> Option<&[Box<dyn MetricHandler>]> {
        self.controllers
            .iter()
            .find(|c| c.name() == controller)
            .map(|c| c.handlers())
    }
}

/// Parse a policy document from a YAML (or JSON) string.
pub fn parse_policy(yaml: &str) -> Result<PolicyDocument, PolicyError> {
    serde_yaml::from_str::<PolicyDocument>(yaml).map_err(|e| PolicyError::Parse {
        message: e.to_string(),
    })
}

/// Validate a parsed document for structural correctness.
///
/// Checks:
/// - Every controller has a non-empty name
/// - No duplicate controller names
/// - Every controller subscribes to at least one trigger
pub fn validate_policy(document: &PolicyDocument) -> Result<(), PolicyError> {
    let mut seen = HashSet::new();
    for controller in &document.controllers {
        if controller.name.trim().is_empty() {
            return Err(PolicyError::InvalidPolicy {
                controller: controller.name.clone(),
                reason: "controller name must not be empty".into(),
            });
        }
        if !seen.insert(controller.name.as_str()) {
            return Err(PolicyError::InvalidPolicy {
                controller: controller.name.clone(),
                reason: "duplicate controller name".into(),
            });
        }
        if controller.triggers.is_empty() {
            return Err(PolicyError::InvalidPolicy {
                controller: controller.name.clone(),
                reason: "at least one trigger is required".into(),
            });
        }
    }
    Ok(())
}

/// Load a policy document from a file.
pub fn load_policy(
    path: &Path,
    config: &LoopConfig,
    registry: &MetricRegistry,
) -> Result<LoadedPolicy, PolicyError> {
    if !path.exists() {
        return Err(PolicyError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let loaded = load_policy_str(&content, config, registry)?;
    info!(
        path = %path.display(),
        controllers = loaded.controllers.len(),
        "Loaded training control policy"
    );
    Ok(loaded)
}

/// Load a policy document from an in-memory string.
pub fn load_policy_str(
    yaml: &str,
    config: &LoopConfig,
    registry: &MetricRegistry,
) -> Result<LoadedPolicy, PolicyError> {
    let document = parse_policy(yaml)?;
    validate_policy(&document)?;

    let mut controllers = Vec::with_capacity(document.controllers.len());
    for definition in &document.controllers {
        let handlers = instantiate_handlers(definition, config, registry)?;
        let controller = Controller::new(definition.clone(), handlers);
        report_load_warnings(&controller);
        controllers.push(controller);
    }

    Ok(LoadedPolicy {
        document,
        controllers,
    })
}

/// Build and validate every handler a controller references, in declaration order.
fn instantiate_handlers(
    definition: &ControllerDefinition,
    config: &LoopConfig,
    registry: &MetricRegistry,
) -> Result<Vec<Box<dyn MetricHandler>>, PolicyError> {
    let empty = HandlerArgs::new();
    let mut handlers = Vec::with_capacity(definition.controller_metrics.len());

    for metric in &definition.controller_metrics {
        let factory = registry
            .get(&metric.handler_class)
            .ok_or_else(|| PolicyError::UnknownHandler {
                controller: definition.name.clone(),
                metric: metric.name.clone(),
                handler_class: metric.handler_class.clone(),
            })?;

        let incompatible = |reason: String| PolicyError::ConfigIncompatible {
            controller: definition.name.clone(),
            metric: metric.name.clone(),
            handler_class: metric.handler_class.clone(),
            reason,
        };

        let handler = factory(&metric.name, metric.arguments.as_ref().unwrap_or(&empty))
            .map_err(|e| incompatible(e.to_string()))?;
        if !handler.validate(config) {
            return Err(incompatible(
                "the training arguments do not support computing this metric".into(),
            ));
        }
        handlers.push(handler);
    }

    Ok(handlers)
}

/// Non-fatal findings: they load, but are probably not what the author meant.
fn report_load_warnings(controller: &Controller) {
    let name = controller.name();
    for (index, rule) in controller.rules().iter().enumerate() {
        if let Some(err) = rule.compile_error() {
            warn!(
                controller = name,
                rule_index = index,
                rule = rule.source(),
                error = %err,
                "Rule does not compile and will never fire"
            );
        }
    }
    for handler in controller.handlers() {
        if !controller.definition().triggers.iter().any(|t| handler.handles(*t)) {
            warn!(
                controller = name,
                metric = handler.name(),
                handler_class = handler.handler_class(),
                "Metric handler declares none of the controller's triggers"
            );
        }
    }
    let definition = controller.definition();
    if definition.log_level.is_some() && definition.log_format.is_none() {
        warn!(controller = name, "log-level is set without a log-format; nothing will be logged");
    }
    if definition.control_operation.is_empty() {
        warn!(controller = name, "Controller has an empty control-operation");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::IntervalStrategy;
    use crate::trigger::Trigger;

    const POLICY: &str = r#"
controllers:
  - name: stop-on-loss-plateau
    controller-metrics:
      - name: loss
        handler-class: Loss
    triggers: [on_log]
    rules:
      - "loss < 0.001"
    control-operation:
      should_training_stop: true
  - name: save-on-eval
    controller-metrics:
      - name: eval
        handler-class: EvalMetrics
    triggers: [on_evaluate]
    rules:
      - "eval_loss < 0.2"
    control-operation:
      should_save: true
"#;

    fn eval_config() -> LoopConfig {
        LoopConfig {
            eval_strategy: IntervalStrategy::Steps,
            ..Default::default()
        }
    }

    #[test]
    fn test_load_binds_handlers_in_order() {
        let registry = MetricRegistry::with_builtins();
        let loaded = load_policy_str(POLICY, &eval_config(), &registry).unwrap();
        assert_eq!(loaded.controllers().len(), 2);
        assert_eq!(loaded.controllers()[0].name(), "stop-on-loss-plateau");
        let handlers = loaded.handlers("save-on-eval").unwrap();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].handler_class(), "EvalMetrics");
        assert!(loaded.handlers("missing").is_none());
        assert!(loaded.controllers()[1].subscribes(Trigger::OnEvaluate));
    }

    #[test]
    fn test_incompatible_handler_fails_whole_load() {
        let registry = MetricRegistry::with_builtins();
        // EvalMetrics needs evaluation enabled; the default config disables it.
        let err = load_policy_str(POLICY, &LoopConfig::default(), &registry).unwrap_err();
        match err {
            PolicyError::ConfigIncompatible {
                controller,
                metric,
                handler_class,
                ..
            } => {
                assert_eq!(controller, "save-on-eval");
                assert_eq!(metric, "eval");
                assert_eq!(handler_class, "EvalMetrics");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_handler_class() {
        let yaml = r#"
controllers:
  - name: c
    controller-metrics:
      - name: m
        handler-class: Perplexity
    triggers: [on_log]
"#;
        let err = load_policy_str(yaml, &LoopConfig::default(), &MetricRegistry::with_builtins())
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownHandler { ref handler_class, .. } if handler_class == "Perplexity"));
    }

    #[test]
    fn test_bad_arguments_are_incompatible() {
        let yaml = r#"
controllers:
  - name: c
    controller-metrics:
      - name: h
        handler-class: HistoryBasedMetric
        arguments:
          window-size: 0
    triggers: [on_log]
"#;
        let err = load_policy_str(yaml, &LoopConfig::default(), &MetricRegistry::with_builtins())
            .unwrap_err();
        assert!(matches!(err, PolicyError::ConfigIncompatible { .. }));
    }

    #[test]
    fn test_oversized_window_fails_load() {
        let yaml = r#"
controllers:
  - name: c
    controller-metrics:
      - name: h
        handler-class: HistoryBasedMetric
        arguments:
          window-size: 100000000000000
    triggers: [on_log]
"#;
        let err = load_policy_str(yaml, &LoopConfig::default(), &MetricRegistry::with_builtins())
            .unwrap_err();
        assert!(matches!(err, PolicyError::ConfigIncompatible { ref metric, .. } if metric == "h"));
    }

    #[test]
    fn test_deeply_nested_rule_does_not_fail_load() {
        let deep = format!("{}loss{} < 1", "(".repeat(5000), ")".repeat(5000));
        let yaml = format!(
            "controllers:\n  - name: c\n    triggers: [on_log]\n    rules: [\"{}\", \"True\"]\n    control-operation:\n      should_log: true\n",
            deep
        );
        let loaded = load_policy_str(&yaml, &LoopConfig::default(), &MetricRegistry::with_builtins())
            .unwrap();
        let rules = loaded.controllers()[0].rules();
        assert!(rules[0].compile_error().is_some());
        assert!(rules[1].compile_error().is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = r#"
controllers:
  - name: c
    triggers: [on_log]
  - name: c
    triggers: [on_step_end]
"#;
        let err = load_policy_str(yaml, &LoopConfig::default(), &MetricRegistry::with_builtins())
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPolicy { ref reason, .. } if reason.contains("duplicate")));
    }

    #[test]
    fn test_empty_triggers_rejected() {
        let yaml = r#"
controllers:
  - name: c
    triggers: []
"#;
        let err = load_policy_str(yaml, &LoopConfig::default(), &MetricRegistry::with_builtins())
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPolicy { .. }));
    }

    #[test]
    fn test_unknown_control_flag_rejected_at_load() {
        let yaml = r#"
controllers:
  - name: c
    triggers: [on_log]
    control-operation:
      should_reboot: true
"#;
        let err = load_policy_str(yaml, &LoopConfig::default(), &MetricRegistry::with_builtins())
            .unwrap_err();
        assert!(matches!(err, PolicyError::Parse { .. }));
    }

    #[test]
    fn test_malformed_rule_does_not_fail_load() {
        let yaml = r#"
controllers:
  - name: c
    triggers: [on_log]
    rules: ["loss <", "loss < 1"]
    control-operation:
      should_log: true
"#;
        let loaded = load_policy_str(yaml, &LoopConfig::default(), &MetricRegistry::with_builtins())
            .unwrap();
        let rules = loaded.controllers()[0].rules();
        assert!(rules[0].compile_error().is_some());
        assert!(rules[1].compile_error().is_none());
    }

    #[test]
    fn test_missing_file() {
        let err = load_policy(
            Path::new("/definitely/not/here.yaml"),
            &LoopConfig::default(),
            &MetricRegistry::with_builtins(),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::ConfigNotFound { .. }));
    }
}
