//! Error types for the trainctl engine.
//!
//! Uses `thiserror` for public API error types. Load-time failures are fatal and
//! carry the offending controller and metric names; rule failures are recovered
//! per rule and only ever reach the diagnostics sink.

use std::path::PathBuf;

/// Top-level error type for the trainctl core library.
#[derive(Debug, thiserror::Error)]
pub enum TrainctlError {
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Metric handler error: {0}")]
    Metric(#[from] MetricError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from loading a policy document. All of them abort initialization.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Policy document not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("Failed to read policy document {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse policy document: {message}")]
    Parse { message: String },

    #[error("Invalid controller '{controller}': {reason}")]
    InvalidPolicy { controller: String, reason: String },

    #[error(
        "Controller '{controller}' metric '{metric}' references unknown handler class '{handler_class}'"
    )]
    UnknownHandler {
        controller: String,
        metric: String,
        handler_class: String,
    },

    #[error(
        "Controller '{controller}' metric '{metric}' ({handler_class}) is incompatible with the loop configuration: {reason}"
    )]
    ConfigIncompatible {
        controller: String,
        metric: String,
        handler_class: String,
        reason: String,
    },
}

/// Errors from metric handler registration and construction.
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    #[error("Invalid arguments for handler '{handler}': {reason}")]
    InvalidArguments { handler: String, reason: String },

    #[error("Handler class already registered: {handler_class}")]
    AlreadyRegistered { handler_class: String },
}

/// Errors from compiling or evaluating a rule expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("Syntax error at position {position}: {message}")]
    Parse { message: String, position: usize },

    #[error("Name '{name}' is not defined")]
    UnboundVariable { name: String },

    #[error("Unsupported operand types for {op}: {left} and {right}")]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("Key '{key}' not found")]
    MissingKey { key: String },

    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("Function {name}() expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid argument for {name}(): {reason}")]
    InvalidArgument { name: String, reason: String },
}

/// Convenience result type for trainctl operations.
pub type Result<T> = std::result::Result<T, TrainctlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_handler_names_controller_and_metric() {
        let err = PolicyError::UnknownHandler {
            controller: "stop-on-loss".into(),
            metric: "loss".into(),
            handler_class: "Lossy".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("stop-on-loss"));
        assert!(msg.contains("'loss'"));
        assert!(msg.contains("Lossy"));
    }

    #[test]
    fn test_config_not_found_display() {
        let err = PolicyError::ConfigNotFound {
            path: PathBuf::from("/tmp/missing.yaml"),
        };
        assert_eq!(
            err.to_string(),
            "Policy document not found: /tmp/missing.yaml"
        );
    }

    #[test]
    fn test_policy_error_converts_to_top_level() {
        let err: TrainctlError = PolicyError::Parse {
            message: "bad yaml".into(),
        }
        .into();
        assert!(matches!(err, TrainctlError::Policy(_)));
        assert!(err.to_string().starts_with("Policy error:"));
    }

    #[test]
    fn test_rule_error_display() {
        let err = RuleError::Arity {
            name: "len".into(),
            expected: 1,
            got: 2,
        };
        assert_eq!(err.to_string(), "Function len() expects 1 argument(s), got 2");
    }
}
