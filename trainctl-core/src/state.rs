//! Host-owned training loop state: loop configuration, trainer state and the
//! control flags the engine writes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// How often the host performs a periodic action (logging, evaluation, saving).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalStrategy {
    No,
    #[default]
    Steps,
    Epoch,
}

/// Training arguments of the host loop. Handlers validate against this once at load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub logging_strategy: IntervalStrategy,
    pub logging_steps: u64,
    pub eval_strategy: IntervalStrategy,
    pub eval_steps: Option<u64>,
    pub save_strategy: IntervalStrategy,
    pub save_steps: u64,
    pub num_train_epochs: f64,
    /// Overrides `num_train_epochs` when set.
    pub max_steps: Option<u64>,
    pub per_device_train_batch_size: usize,
    pub learning_rate: f64,
    pub output_dir: PathBuf,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            logging_strategy: IntervalStrategy::Steps,
            logging_steps: 500,
            eval_strategy: IntervalStrategy::No,
            eval_steps: None,
            save_strategy: IntervalStrategy::Steps,
            save_steps: 500,
            num_train_epochs: 3.0,
            max_steps: None,
            per_device_train_batch_size: 8,
            learning_rate: 5e-5,
            output_dir: PathBuf::from("output"),
        }
    }
}

/// One row of the host's log history, e.g. `{"loss": 0.42, "learning_rate": 1e-4}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub step: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<f64>,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl LogEntry {
    pub fn new(step: u64) -> Self {
        Self {
            step,
            ..Default::default()
        }
    }

    pub fn with_epoch(mut self, epoch: f64) -> Self {
        self.epoch = Some(epoch);
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Progress of the running training loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerState {
    pub epoch: f64,
    pub global_step: u64,
    pub max_steps: u64,
    pub num_train_epochs: f64,
    pub log_history: Vec<LogEntry>,
    pub best_metric: Option<f64>,
    pub best_model_checkpoint: Option<String>,
    pub is_local_process_zero: bool,
    pub is_world_process_zero: bool,
}

impl Default for TrainerState {
    fn default() -> Self {
        Self {
            epoch: 0.0,
            global_step: 0,
            max_steps: 0,
            num_train_epochs: 0.0,
            log_history: Vec::new(),
            best_metric: None,
            best_model_checkpoint: None,
            is_local_process_zero: true,
            is_world_process_zero: true,
        }
    }
}

impl TrainerState {
    /// Append a log row, as the host does when it logs.
    pub fn record_log(&mut self, entry: LogEntry) {
        self.log_history.push(entry);
    }

    /// The most recent logged value of `name`, scanning back through history.
    pub fn last_logged(&self, name: &str) -> Option<f64> {
        self.log_history.iter().rev().find_map(|e| e.get(name))
    }
}

/// The fixed set of control flags a controller may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlFlag {
    ShouldTrainingStop,
    ShouldEpochStop,
    ShouldSave,
    ShouldEvaluate,
    ShouldLog,
}

impl ControlFlag {
    pub const ALL: [ControlFlag; 5] = [
        ControlFlag::ShouldTrainingStop,
        ControlFlag::ShouldEpochStop,
        ControlFlag::ShouldSave,
        ControlFlag::ShouldEvaluate,
        ControlFlag::ShouldLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlFlag::ShouldTrainingStop => "should_training_stop",
            ControlFlag::ShouldEpochStop => "should_epoch_stop",
            ControlFlag::ShouldSave => "should_save",
            ControlFlag::ShouldEvaluate => "should_evaluate",
            ControlFlag::ShouldLog => "should_log",
        }
    }
}

impl fmt::Display for ControlFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control flags steering the host loop's next actions.
///
/// Owned by the host. The engine only writes flags, it never reads them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    pub should_training_stop: bool,
    pub should_epoch_stop: bool,
    pub should_save: bool,
    pub should_evaluate: bool,
    pub should_log: bool,
}

impl ControlState {
    pub fn set(&mut self, flag: ControlFlag, value: bool) {
        match flag {
            ControlFlag::ShouldTrainingStop => self.should_training_stop = value,
            ControlFlag::ShouldEpochStop => self.should_epoch_stop = value,
            ControlFlag::ShouldSave => self.should_save = value,
            ControlFlag::ShouldEvaluate => self.should_evaluate = value,
            ControlFlag::ShouldLog => self.should_log = value,
        }
    }

    pub fn get(&self, flag: ControlFlag) -> bool {
        match flag {
            ControlFlag::ShouldTrainingStop => self.should_training_stop,
            ControlFlag::ShouldEpochStop => self.should_epoch_stop,
            ControlFlag::ShouldSave => self.should_save,
            ControlFlag::ShouldEvaluate => self.should_evaluate,
            ControlFlag::ShouldLog => self.should_log,
        }
    }

    /// Names of the flags currently set to `true`.
    pub fn raised(&self) -> Vec<&'static str> {
        ControlFlag::ALL
            .iter()
            .filter(|f| self.get(**f))
            .map(|f| f.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_flattens_values() {
        let entry: LogEntry =
            serde_json::from_str(r#"{"step": 10, "epoch": 0.5, "loss": 0.25, "grad_norm": 1.5}"#)
                .unwrap();
        assert_eq!(entry.step, 10);
        assert_eq!(entry.epoch, Some(0.5));
        assert_eq!(entry.get("loss"), Some(0.25));
        assert_eq!(entry.get("grad_norm"), Some(1.5));
    }

    #[test]
    fn test_last_logged_skips_rows_without_value() {
        let mut state = TrainerState::default();
        state.record_log(LogEntry::new(1).with_value("loss", 0.9));
        state.record_log(LogEntry::new(2).with_value("eval_loss", 0.7));
        assert_eq!(state.last_logged("loss"), Some(0.9));
        assert_eq!(state.last_logged("eval_loss"), Some(0.7));
        assert_eq!(state.last_logged("accuracy"), None);
    }

    #[test]
    fn test_control_state_set_and_raised() {
        let mut control = ControlState::default();
        control.set(ControlFlag::ShouldSave, true);
        control.set(ControlFlag::ShouldLog, true);
        assert!(control.should_save);
        assert_eq!(control.raised(), vec!["should_save", "should_log"]);
        control.set(ControlFlag::ShouldSave, false);
        assert!(!control.get(ControlFlag::ShouldSave));
    }

    #[test]
    fn test_loop_config_partial_yaml_uses_defaults() {
        let config: LoopConfig = serde_yaml::from_str("logging_strategy: epoch\n").unwrap();
        assert_eq!(config.logging_strategy, IntervalStrategy::Epoch);
        assert_eq!(config.eval_strategy, IntervalStrategy::No);
        assert_eq!(config.logging_steps, 500);
    }
}
