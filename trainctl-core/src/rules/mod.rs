//! Sandboxed rule expression language.
//!
//! Rules are small boolean expressions over the metric mapping a controller
//! computed for the current trigger, e.g. `loss < 0.001` or
//! `mean(history.loss) > 1.5 * history.loss[0]`. Supported syntax:
//!
//! - literals: numbers (`1`, `0.5`, `1e-4`), strings (`'x'`, `"x"`), `True`/`False`, lists `[a, b]`
//! - arithmetic: `+ - * / %` and unary `-`
//! - comparisons: `< <= > >= == !=`, `in`, `not in`, chained as `a < b < c`
//! - boolean: `and`/`&&`, `or`/`||`, `not`/`!`
//! - access: `m['key']`, `m.key`, `list[i]` (negative indices count from the end)
//! - functions: `len`, `sum`, `mean`, `min`, `max`, `abs`
//!
//! Names resolve only against the metric mapping; nothing else is reachable.

pub mod eval;
pub mod lexer;
pub mod parser;

pub use eval::evaluate;
pub use parser::{parse, Expr};

use crate::error::RuleError;
use crate::value::{MetricMap, MetricValue};

/// A rule as written in the policy document plus its compiled form.
///
/// Compilation failures are kept rather than rejected: a malformed rule fails
/// on every evaluation and never aborts policy loading.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    source: String,
    compiled: Result<Expr, RuleError>,
}

impl CompiledRule {
    pub fn compile(source: &str) -> Self {
        Self {
            source: source.to_string(),
            compiled: parse(source),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The compile error, if the rule text is malformed.
    pub fn compile_error(&self) -> Option<&RuleError> {
        self.compiled.as_ref().err()
    }

    /// Evaluate against `metrics`, returning the raw value.
    pub fn evaluate(&self, metrics: &MetricMap) -> Result<MetricValue, RuleError> {
        match &self.compiled {
            Ok(expr) => evaluate(expr, metrics),
            Err(err) => Err(err.clone()),
        }
    }

    /// Evaluate against `metrics` and reduce the result to its truthiness.
    pub fn matches(&self, metrics: &MetricMap) -> Result<bool, RuleError> {
        self.evaluate(metrics).map(|v| v.is_truthy())
    }
}
