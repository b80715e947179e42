//! Observability sink for rule evaluation.
//!
//! A rule that fails to evaluate never interrupts a dispatch. The failure is
//! counted here, kept in a bounded list of recent failures, and logged.

use crate::error::RuleError;
use crate::metrics::BoundedWindow;
use crate::trigger::Trigger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// One swallowed rule error.
#[derive(Debug, Clone, Serialize)]
pub struct RuleFailure {
    pub controller: String,
    pub rule_index: usize,
    pub rule: String,
    pub trigger: Trigger,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Settings for the diagnostics sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// How many recent failures to keep.
    pub max_recent: usize,
    /// Emit a `warn!` for every swallowed rule error.
    pub log_failures: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_recent: 64,
            log_failures: true,
        }
    }
}

/// Counters and recent failures accumulated over the life of an engine.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    log_failures: bool,
    recent: BoundedWindow<RuleFailure>,
    failure_counts: BTreeMap<(String, usize), u64>,
    fire_counts: BTreeMap<String, u64>,
    dispatches: u64,
    rules_evaluated: u64,
    total_failures: u64,
}

/// Serializable snapshot of [`Diagnostics`].
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsSummary {
    pub dispatches: u64,
    pub rules_evaluated: u64,
    pub total_failures: u64,
    pub total_fired: u64,
    pub fired: BTreeMap<String, u64>,
    pub recent_failures: Vec<RuleFailure>,
}

impl Diagnostics {
    pub fn new(config: &DiagnosticsConfig) -> Self {
        Self {
            log_failures: config.log_failures,
            recent: BoundedWindow::new(config.max_recent),
            failure_counts: BTreeMap::new(),
            fire_counts: BTreeMap::new(),
            dispatches: 0,
            rules_evaluated: 0,
            total_failures: 0,
        }
    }

    pub fn record_dispatch(&mut self) {
        self.dispatches += 1;
    }

    pub fn record_evaluation(&mut self) {
        self.rules_evaluated += 1;
    }

    pub fn record_fire(&mut self, controller: &str) {
        *self.fire_counts.entry(controller.to_string()).or_default() += 1;
    }

    pub fn record_failure(
        &mut self,
        controller: &str,
        rule_index: usize,
        rule: &str,
        trigger: Trigger,
        error: &RuleError,
    ) {
        if self.log_failures {
            warn!(
                controller,
                rule_index,
                rule,
                trigger = trigger.as_str(),
                error = %error,
                "Rule evaluation failed; skipping rule"
            );
        }
        *self
            .failure_counts
            .entry((controller.to_string(), rule_index))
            .or_default() += 1;
        self.total_failures += 1;
        self.recent.push(RuleFailure {
            controller: controller.to_string(),
            rule_index,
            rule: rule.to_string(),
            trigger,
            error: error.to_string(),
            at: Utc::now(),
        });
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    pub fn rules_evaluated(&self) -> u64 {
        self.rules_evaluated
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    /// Failures recorded for one rule of one controller.
    pub fn failures_for(&self, controller: &str, rule_index: usize) -> u64 {
        self.failure_counts
            .get(&(controller.to_string(), rule_index))
            .copied()
            .unwrap_or(0)
    }

    /// Times a controller's control operation was applied.
    pub fn fire_count(&self, controller: &str) -> u64 {
        self.fire_counts.get(controller).copied().unwrap_or(0)
    }

    pub fn total_fired(&self) -> u64 {
        self.fire_counts.values().sum()
    }

    /// Most recent failures, oldest first.
    pub fn recent_failures(&self) -> impl Iterator<Item = &RuleFailure> {
        self.recent.iter()
    }

    pub fn summary(&self) -> DiagnosticsSummary {
        DiagnosticsSummary {
            dispatches: self.dispatches,
            rules_evaluated: self.rules_evaluated,
            total_failures: self.total_failures,
            total_fired: self.total_fired(),
            fired: self.fire_counts.clone(),
            recent_failures: self.recent.iter().cloned().collect(),
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(&DiagnosticsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbound() -> RuleError {
        RuleError::UnboundVariable {
            name: "acc".into(),
        }
    }

    #[test]
    fn test_failure_counts_per_rule() {
        let mut diag = Diagnostics::default();
        diag.record_failure("c", 0, "acc > 1", Trigger::OnLog, &unbound());
        diag.record_failure("c", 0, "acc > 1", Trigger::OnLog, &unbound());
        diag.record_failure("c", 1, "x", Trigger::OnLog, &unbound());
        assert_eq!(diag.failures_for("c", 0), 2);
        assert_eq!(diag.failures_for("c", 1), 1);
        assert_eq!(diag.failures_for("other", 0), 0);
        assert_eq!(diag.total_failures(), 3);
    }

    #[test]
    fn test_recent_failures_are_bounded() {
        let mut diag = Diagnostics::new(&DiagnosticsConfig {
            max_recent: 2,
            log_failures: false,
        });
        for i in 0..5 {
            diag.record_failure("c", i, "r", Trigger::OnStepEnd, &unbound());
        }
        let kept: Vec<usize> = diag.recent_failures().map(|f| f.rule_index).collect();
        assert_eq!(kept, vec![3, 4]);
        assert_eq!(diag.total_failures(), 5);
    }

    #[test]
    fn test_huge_max_recent_from_config() {
        let mut diag = Diagnostics::new(&DiagnosticsConfig {
            max_recent: usize::MAX,
            log_failures: false,
        });
        diag.record_failure("c", 0, "r", Trigger::OnLog, &unbound());
        assert_eq!(diag.recent_failures().count(), 1);
    }

    #[test]
    fn test_summary_counts_fires() {
        let mut diag = Diagnostics::default();
        diag.record_dispatch();
        diag.record_evaluation();
        diag.record_fire("a");
        diag.record_fire("a");
        diag.record_fire("b");
        let summary = diag.summary();
        assert_eq!(summary.dispatches, 1);
        assert_eq!(summary.total_fired, 3);
        assert_eq!(summary.fired["a"], 2);
        assert_eq!(diag.fire_count("b"), 1);
    }
}
