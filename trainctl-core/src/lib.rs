//! # trainctl core
//!
//! Policy-driven control of a training loop.
//! A YAML policy document declares controllers: which metrics to compute,
//! on which lifecycle triggers, which rules to check, and which control
//! flags to raise when a rule holds. The host loop notifies the engine on
//! each lifecycle event and reads the control flags back.

pub mod callback;
pub mod config;
pub mod control;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod metrics;
pub mod policy;
pub mod rules;
pub mod state;
pub mod trigger;
pub mod value;

// Re-export commonly used types at the crate root.
pub use callback::TrainerCallback;
pub use config::{EngineConfig, load_config, load_config_file, load_loop_config};
pub use control::{ControlOperation, LogLevel, apply_control};
pub use diagnostics::{Diagnostics, DiagnosticsConfig, DiagnosticsSummary, RuleFailure};
pub use engine::{ControllerOutcome, DispatchReport, PolicyEngine, SharedPolicyEngine};
pub use error::{MetricError, PolicyError, Result, RuleError, TrainctlError};
pub use evaluation::{Evaluation, EvaluationOptions, evaluate_controller};
pub use metrics::{MetricContext, MetricHandler, MetricRegistry};
pub use policy::{Controller, LoadedPolicy, PolicyDocument, load_policy, load_policy_str};
pub use rules::CompiledRule;
pub use state::{ControlFlag, ControlState, IntervalStrategy, LogEntry, LoopConfig, TrainerState};
pub use trigger::Trigger;
pub use value::{MetricMap, MetricValue};
