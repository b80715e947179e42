//! Metric handlers: pluggable computations that turn loop state into named
//! values for rule evaluation.
//!
//! Handlers are created once per policy load from a `handler-class` identifier
//! through the [`MetricRegistry`], validated against the loop configuration,
//! and then invoked on every dispatch their controller subscribes to. A handler
//! instance belongs to exactly one controller and may keep private state (for
//! example a [`BoundedWindow`] of recent losses) across invocations.

pub mod builtins;
pub mod registry;
pub mod window;

pub use builtins::{EvalMetrics, HistoryBasedMetric, Loss, PerProcessState, TrainingState};
pub use registry::{HandlerFactory, MetricRegistry};
pub use window::BoundedWindow;

use crate::error::MetricError;
use crate::state::{LoopConfig, TrainerState};
use crate::trigger::Trigger;
use crate::value::MetricMap;
use serde::de::DeserializeOwned;

/// Free-form `arguments` mapping from a policy document metric entry.
pub type HandlerArgs = serde_json::Map<String, serde_json::Value>;

/// Everything a handler may read while computing.
#[derive(Debug, Clone, Copy)]
pub struct MetricContext<'a> {
    pub trigger: Trigger,
    pub state: &'a TrainerState,
    pub config: &'a LoopConfig,
    /// Host-supplied metrics, e.g. evaluation results on `on_evaluate`.
    pub extra: Option<&'a MetricMap>,
}

/// Trait that all metric handlers implement.
pub trait MetricHandler: Send {
    /// The metric name given in the policy document.
    fn name(&self) -> &str;

    /// The registered class identifier this handler was built from.
    fn handler_class(&self) -> &str;

    /// Triggers this handler is meant for. Only used for load-time warnings;
    /// a handler returns `None` when it has nothing to offer.
    fn events(&self) -> &[Trigger];

    /// Whether `trigger` is one of the handler's declared events.
    fn handles(&self, trigger: Trigger) -> bool {
        self.events().contains(&trigger)
    }

    /// Check the loop configuration supports computing this metric.
    fn validate(&self, config: &LoopConfig) -> bool;

    /// Compute the metric values for the current invocation, or `None` when
    /// nothing is applicable yet.
    fn compute(&mut self, ctx: &MetricContext<'_>) -> Option<MetricMap>;
}

/// Deserialize a handler's typed arguments from the raw `arguments` mapping.
pub fn parse_args<T: DeserializeOwned>(handler: &str, args: &HandlerArgs) -> Result<T, MetricError> {
    serde_json::from_value(serde_json::Value::Object(args.clone())).map_err(|e| {
        MetricError::InvalidArguments {
            handler: handler.to_string(),
            reason: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Args {
        #[serde(default)]
        size: usize,
    }

    #[test]
    fn test_parse_args_typed() {
        let mut args = HandlerArgs::new();
        args.insert("size".into(), serde_json::json!(4));
        let parsed: Args = parse_args("Demo", &args).unwrap();
        assert_eq!(parsed.size, 4);
    }

    #[test]
    fn test_parse_args_reports_handler() {
        let mut args = HandlerArgs::new();
        args.insert("colour".into(), serde_json::json!("red"));
        let err = parse_args::<Args>("Demo", &args).unwrap_err();
        assert!(err.to_string().contains("Demo"));
    }
}
