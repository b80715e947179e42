//! Dynamic metric values exchanged between metric handlers and rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Mapping from metric name to value. Ordered so snapshots log deterministically.
pub type MetricMap = BTreeMap<String, MetricValue>;

/// A value produced by a metric handler or computed by a rule expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<MetricValue>),
    Map(MetricMap),
}

impl MetricValue {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            MetricValue::Bool(_) => "bool",
            MetricValue::Number(_) => "number",
            MetricValue::Str(_) => "str",
            MetricValue::List(_) => "list",
            MetricValue::Map(_) => "map",
        }
    }

    /// Python-style truthiness: zero, NaN and empty containers are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            MetricValue::Bool(b) => *b,
            MetricValue::Number(n) => *n != 0.0 && !n.is_nan(),
            MetricValue::Str(s) => !s.is_empty(),
            MetricValue::List(items) => !items.is_empty(),
            MetricValue::Map(map) => !map.is_empty(),
        }
    }

    /// Numeric view; booleans count as 0/1 like in arithmetic.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Convert a list of numbers into a `List` value.
    pub fn numbers<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        MetricValue::List(values.into_iter().map(MetricValue::Number).collect())
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::Number(v as f64)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Str(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Str(v)
    }
}

impl From<MetricMap> for MetricValue {
    fn from(v: MetricMap) -> Self {
        MetricValue::Map(v)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Str(s) => write!(f, "'{}'", s),
            MetricValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            MetricValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{}': {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Render a metric snapshot for log lines.
pub fn format_metrics(metrics: &MetricMap) -> String {
    MetricValue::Map(metrics.clone()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json_maps_onto_variants() {
        let map: MetricMap = serde_json::from_str(
            r#"{"eval_loss": 0.3, "done": false, "tag": "x", "window": [1, 2], "nested": {"a": 1}}"#,
        )
        .unwrap();
        assert_eq!(map["eval_loss"], MetricValue::Number(0.3));
        assert_eq!(map["done"], MetricValue::Bool(false));
        assert_eq!(map["tag"], MetricValue::Str("x".into()));
        assert_eq!(map["window"], MetricValue::numbers([1.0, 2.0]));
        assert!(matches!(map["nested"], MetricValue::Map(_)));
    }

    #[test]
    fn test_truthiness() {
        assert!(!MetricValue::Number(0.0).is_truthy());
        assert!(!MetricValue::Number(f64::NAN).is_truthy());
        assert!(MetricValue::Number(-1.0).is_truthy());
        assert!(!MetricValue::Str(String::new()).is_truthy());
        assert!(!MetricValue::List(vec![]).is_truthy());
        assert!(MetricValue::Bool(true).is_truthy());
    }

    #[test]
    fn test_display_snapshot() {
        let mut map = MetricMap::new();
        map.insert("loss".into(), 0.5.into());
        map.insert("ok".into(), true.into());
        assert_eq!(format_metrics(&map), "{'loss': 0.5, 'ok': True}");
    }
}
