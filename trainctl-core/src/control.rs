//! Control operations: the flag writes a controller performs when it fires,
//! plus the optional log message it emits.

use crate::state::{ControlFlag, ControlState, TrainerState};
use crate::trigger::Trigger;
use crate::value::{MetricMap, format_metrics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// The `control-operation` mapping of a controller.
///
/// Keys are restricted to [`ControlFlag`], so an unrecognized flag name fails
/// deserialization and therefore policy loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlOperation(BTreeMap<ControlFlag, bool>);

impl ControlOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, flag: ControlFlag, value: bool) -> Self {
        self.0.insert(flag, value);
        self
    }

    pub fn get(&self, flag: ControlFlag) -> Option<bool> {
        self.0.get(&flag).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Declared flags in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (ControlFlag, bool)> + '_ {
        self.0.iter().map(|(flag, value)| (*flag, *value))
    }
}

impl FromIterator<(ControlFlag, bool)> for ControlOperation {
    fn from_iter<I: IntoIterator<Item = (ControlFlag, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Write every declared flag onto `control`, in enumeration order.
pub fn apply_control(operation: &ControlOperation, control: &mut ControlState) {
    for (flag, value) in operation.iter() {
        debug!(flag = flag.as_str(), value, "Applying control flag");
        control.set(flag, value);
    }
}

/// Severity of a controller's `log-format` message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    #[serde(alias = "error")]
    Error,
    #[serde(alias = "warning", alias = "WARN", alias = "warn")]
    Warning,
    #[default]
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "debug")]
    Debug,
}

/// Fill the `{event_name}`, `{metrics}` and `{state}` placeholders of a
/// `log-format` string. Any other text passes through unchanged.
pub fn render_log_message(
    format: &str,
    trigger: Trigger,
    metrics: &MetricMap,
    state: &TrainerState,
) -> String {
    let mut message = format.replace("{event_name}", trigger.as_str());
    if message.contains("{metrics}") {
        message = message.replace("{metrics}", &format_metrics(metrics));
    }
    if message.contains("{state}") {
        let state = format!(
            "epoch={} global_step={} max_steps={}",
            state.epoch, state.global_step, state.max_steps
        );
        message = message.replace("{state}", &state);
    }
    message
}

/// Emit a rendered controller message at `level`.
pub fn emit_control_log(controller: &str, level: LogLevel, message: &str) {
    match level {
        LogLevel::Error => error!(controller, "{}", message),
        LogLevel::Warning => warn!(controller, "{}", message),
        LogLevel::Info => info!(controller, "{}", message),
        LogLevel::Debug => debug!(controller, "{}", message),
    }
}
