//! Built-in metric handler classes.

use super::window::BoundedWindow;
use super::{parse_args, HandlerArgs, MetricContext, MetricHandler};
use crate::error::MetricError;
use crate::state::{IntervalStrategy, LoopConfig};
use crate::trigger::Trigger;
use crate::value::{MetricMap, MetricValue};
use serde::Deserialize;

const LOSS_KEY: &str = "loss";

/// Largest `window-size` a [`HistoryBasedMetric`] accepts.
pub const MAX_WINDOW_SIZE: usize = 100_000;

fn single(name: &str, value: MetricValue) -> MetricMap {
    let mut map = MetricMap::new();
    map.insert(name.to_string(), value);
    map
}

fn reject_arguments(handler: &str, args: &HandlerArgs) -> Result<(), MetricError> {
    if let Some(key) = args.keys().next() {
        return Err(MetricError::InvalidArguments {
            handler: handler.to_string(),
            reason: format!("unexpected argument '{}'", key),
        });
    }
    Ok(())
}

// =============================================================================
// Loss
// =============================================================================

/// Exposes the most recently logged training loss as `{<name>: loss}`.
#[derive(Debug, Clone)]
pub struct Loss {
    name: String,
}

impl Loss {
    pub const CLASS: &'static str = "Loss";
    const EVENTS: [Trigger; 1] = [Trigger::OnLog];

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn create(name: &str, args: &HandlerArgs) -> Result<Box<dyn MetricHandler>, MetricError> {
        reject_arguments(Self::CLASS, args)?;
        Ok(Box::new(Self::new(name)))
    }
}

impl MetricHandler for Loss {
    fn name(&self) -> &str {
        &self.name
    }

    fn handler_class(&self) -> &str {
        Self::CLASS
    }

    fn events(&self) -> &[Trigger] {
        &Self::EVENTS
    }

    fn validate(&self, config: &LoopConfig) -> bool {
        config.logging_strategy != IntervalStrategy::No
    }

    fn compute(&mut self, ctx: &MetricContext<'_>) -> Option<MetricMap> {
        let loss = ctx.state.last_logged(LOSS_KEY)?;
        Some(single(&self.name, MetricValue::Number(loss)))
    }
}

// =============================================================================
// EvalMetrics
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct EvalMetricsArgs {
    #[serde(default, alias = "metric_names")]
    metric_names: Option<Vec<String>>,
}

/// Exposes the host's evaluation metrics (e.g. `eval_loss`) as flat keys.
///
/// With `metric-names` set, only those keys are exposed.
#[derive(Debug, Clone)]
pub struct EvalMetrics {
    name: String,
    metric_names: Option<Vec<String>>,
}

impl EvalMetrics {
    pub const CLASS: &'static str = "EvalMetrics";
    const EVENTS: [Trigger; 1] = [Trigger::OnEvaluate];

    pub fn create(name: &str, args: &HandlerArgs) -> Result<Box<dyn MetricHandler>, MetricError> {
        let args: EvalMetricsArgs = parse_args(Self::CLASS, args)?;
        Ok(Box::new(Self {
            name: name.to_string(),
            metric_names: args.metric_names,
        }))
    }
}

impl MetricHandler for EvalMetrics {
    fn name(&self) -> &str {
        &self.name
    }

    fn handler_class(&self) -> &str {
        Self::CLASS
    }

    fn events(&self) -> &[Trigger] {
        &Self::EVENTS
    }

    fn validate(&self, config: &LoopConfig) -> bool {
        config.eval_strategy != IntervalStrategy::No
    }

    fn compute(&mut self, ctx: &MetricContext<'_>) -> Option<MetricMap> {
        let extra = ctx.extra?;
        let metrics: MetricMap = match &self.metric_names {
            Some(names) => extra
                .iter()
                .filter(|(k, _)| names.contains(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => extra.clone(),
        };
        if metrics.is_empty() {
            None
        } else {
            Some(metrics)
        }
    }
}

// =============================================================================
// HistoryBasedMetric
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct HistoryArgs {
    #[serde(default = "default_window_size", alias = "window_size")]
    window_size: usize,
}

fn default_window_size() -> usize {
    1
}

/// Keeps a window of the last `window-size` logged losses.
///
/// Exposes `{<name>: {"loss": [...], "epoch": [...], "steps": [...]}}` once
/// the window is full, oldest first. Each log-history row is absorbed once.
#[derive(Debug, Clone)]
pub struct HistoryBasedMetric {
    name: String,
    loss: BoundedWindow<f64>,
    epoch: BoundedWindow<f64>,
    steps: BoundedWindow<u64>,
    consumed: usize,
}

impl HistoryBasedMetric {
    pub const CLASS: &'static str = "HistoryBasedMetric";
    const EVENTS: [Trigger; 2] = [Trigger::OnLog, Trigger::OnEvaluate];

    pub fn new(name: &str, window_size: usize) -> Self {
        Self {
            name: name.to_string(),
            loss: BoundedWindow::new(window_size),
            epoch: BoundedWindow::new(window_size),
            steps: BoundedWindow::new(window_size),
            consumed: 0,
        }
    }

    pub fn create(name: &str, args: &HandlerArgs) -> Result<Box<dyn MetricHandler>, MetricError> {
        let args: HistoryArgs = parse_args(Self::CLASS, args)?;
        if args.window_size == 0 {
            return Err(MetricError::InvalidArguments {
                handler: Self::CLASS.to_string(),
                reason: "window-size must be at least 1".into(),
            });
        }
        if args.window_size > MAX_WINDOW_SIZE {
            return Err(MetricError::InvalidArguments {
                handler: Self::CLASS.to_string(),
                reason: format!(
                    "window-size {} exceeds the maximum of {}",
                    args.window_size, MAX_WINDOW_SIZE
                ),
            });
        }
        Ok(Box::new(Self::new(name, args.window_size)))
    }

    pub fn window_size(&self) -> usize {
        self.loss.capacity()
    }
}

impl MetricHandler for HistoryBasedMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn handler_class(&self) -> &str {
        Self::CLASS
    }

    fn events(&self) -> &[Trigger] {
        &Self::EVENTS
    }

    fn validate(&self, config: &LoopConfig) -> bool {
        config.logging_strategy != IntervalStrategy::No
    }

    fn compute(&mut self, ctx: &MetricContext<'_>) -> Option<MetricMap> {
        let history = &ctx.state.log_history;
        // A shorter history means the host restarted its log; start over.
        if history.len() < self.consumed {
            self.consumed = 0;
        }
        for entry in &history[self.consumed..] {
            if let Some(loss) = entry.get(LOSS_KEY) {
                self.loss.push(loss);
                self.epoch.push(entry.epoch.unwrap_or(ctx.state.epoch));
                self.steps.push(entry.step);
            }
        }
        self.consumed = history.len();

        if !self.loss.is_full() {
            return None;
        }

        let mut window = MetricMap::new();
        window.insert("loss".into(), MetricValue::numbers(self.loss.iter().copied()));
        window.insert("epoch".into(), MetricValue::numbers(self.epoch.iter().copied()));
        window.insert(
            "steps".into(),
            MetricValue::numbers(self.steps.iter().map(|s| *s as f64)),
        );
        Some(single(&self.name, MetricValue::Map(window)))
    }
}

// =============================================================================
// TrainingState
// =============================================================================

/// Exposes trainer progress as `{<name>: {"epoch", "global_step", ...}}`.
#[derive(Debug, Clone)]
pub struct TrainingState {
    name: String,
}

impl TrainingState {
    pub const CLASS: &'static str = "TrainingState";

    pub fn create(name: &str, args: &HandlerArgs) -> Result<Box<dyn MetricHandler>, MetricError> {
        reject_arguments(Self::CLASS, args)?;
        Ok(Box::new(Self {
            name: name.to_string(),
        }))
    }
}

impl MetricHandler for TrainingState {
    fn name(&self) -> &str {
        &self.name
    }

    fn handler_class(&self) -> &str {
        Self::CLASS
    }

    fn events(&self) -> &[Trigger] {
        &Trigger::ALL
    }

    fn validate(&self, _config: &LoopConfig) -> bool {
        true
    }

    fn compute(&mut self, ctx: &MetricContext<'_>) -> Option<MetricMap> {
        let state = ctx.state;
        let mut fields = MetricMap::new();
        fields.insert("epoch".into(), state.epoch.into());
        fields.insert("global_step".into(), state.global_step.into());
        fields.insert("max_steps".into(), state.max_steps.into());
        fields.insert("num_train_epochs".into(), state.num_train_epochs.into());
        if let Some(best) = state.best_metric {
            fields.insert("best_metric".into(), best.into());
        }
        Some(single(&self.name, MetricValue::Map(fields)))
    }
}

// =============================================================================
// PerProcessState
// =============================================================================

/// Exposes the distributed process role, for rules that should only fire on
/// the main process.
#[derive(Debug, Clone)]
pub struct PerProcessState {
    name: String,
}

impl PerProcessState {
    pub const CLASS: &'static str = "PerProcessState";

    pub fn create(name: &str, args: &HandlerArgs) -> Result<Box<dyn MetricHandler>, MetricError> {
        reject_arguments(Self::CLASS, args)?;
        Ok(Box::new(Self {
            name: name.to_string(),
        }))
    }
}

impl MetricHandler for PerProcessState {
    fn name(&self) -> &str {
        &self.name
    }

    fn handler_class(&self) -> &str {
        Self::CLASS
    }

    fn events(&self) -> &[Trigger] {
        &Trigger::ALL
    }

    fn validate(&self, _config: &LoopConfig) -> bool {
        true
    }

    fn compute(&mut self, ctx: &MetricContext<'_>) -> Option<MetricMap> {
        let mut fields = MetricMap::new();
        fields.insert(
            "is_local_process_zero".into(),
            ctx.state.is_local_process_zero.into(),
        );
        fields.insert(
            "is_world_process_zero".into(),
            ctx.state.is_world_process_zero.into(),
        );
        Some(single(&self.name, MetricValue::Map(fields)))
    }
}
