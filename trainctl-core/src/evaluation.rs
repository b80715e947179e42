//! Per-controller rule evaluation.
//!
//! Computes a controller's metrics, evaluates its rules in order against them
//! and applies the control operation of the first rule that holds. Rule errors
//! are routed to [`Diagnostics`] and never escape.

use crate::control::{apply_control, emit_control_log, render_log_message};
use crate::diagnostics::Diagnostics;
use crate::metrics::MetricContext;
use crate::policy::Controller;
use crate::state::ControlState;
use crate::value::format_metrics;
use serde::Serialize;
use tracing::{debug, warn};

/// Outcome of evaluating one controller for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Evaluation {
    /// The controller does not subscribe to the dispatched trigger.
    NotSubscribed,
    /// No rule held (or every rule failed).
    NoMatch,
    /// Rule `rule_index` held and the control operation was applied.
    Fired { rule_index: usize },
}

impl Evaluation {
    pub fn fired(&self) -> bool {
        matches!(self, Evaluation::Fired { .. })
    }
}

/// Options that shape evaluation logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationOptions {
    /// Include the metric snapshot in the log line emitted when a rule fires.
    pub log_fired_metrics: bool,
}

/// Evaluate a single controller against the current dispatch.
pub fn evaluate_controller(
    controller: &mut Controller,
    ctx: &MetricContext<'_>,
    control: &mut ControlState,
    diagnostics: &mut Diagnostics,
    options: EvaluationOptions,
) -> Evaluation {
    if !controller.subscribes(ctx.trigger) {
        return Evaluation::NotSubscribed;
    }

    let metrics = controller.compute_metrics(ctx);

    for (index, rule) in controller.rules().iter().enumerate() {
        diagnostics.record_evaluation();
        match rule.matches(&metrics) {
            Ok(true) => {
                if options.log_fired_metrics {
                    warn!(
                        controller = controller.name(),
                        rule = rule.source(),
                        trigger = ctx.trigger.as_str(),
                        metrics = %format_metrics(&metrics),
                        "Rule fired"
                    );
                } else {
                    warn!(
                        controller = controller.name(),
                        rule = rule.source(),
                        trigger = ctx.trigger.as_str(),
                        "Rule fired"
                    );
                }
                let definition = controller.definition();
                apply_control(&definition.control_operation, control);
                if let Some(format) = &definition.log_format {
                    let message = render_log_message(format, ctx.trigger, &metrics, ctx.state);
                    emit_control_log(
                        controller.name(),
                        definition.log_level.unwrap_or_default(),
                        &message,
                    );
                }
                diagnostics.record_fire(controller.name());
                return Evaluation::Fired { rule_index: index };
            }
            Ok(false) => {
                debug!(controller = controller.name(), rule = rule.source(), "Rule did not hold");
            }
            Err(err) => {
                diagnostics.record_failure(controller.name(), index, rule.source(), ctx.trigger, &err);
            }
        }
    }

    Evaluation::NoMatch
}
