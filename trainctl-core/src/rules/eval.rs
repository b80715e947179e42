//! Tree-walking evaluator for parsed rule expressions.
//!
//! The only names an expression can resolve are the keys of the metric mapping
//! passed in, plus the fixed function table below.

use super::parser::{BinaryOp, CompareOp, Expr};
use crate::error::RuleError;
use crate::value::{MetricMap, MetricValue};
use std::cmp::Ordering;

pub fn evaluate(expr: &Expr, env: &MetricMap) -> Result<MetricValue, RuleError> {
    match expr {
        Expr::Number(n) => Ok(MetricValue::Number(*n)),
        Expr::Str(s) => Ok(MetricValue::Str(s.clone())),
        Expr::Bool(b) => Ok(MetricValue::Bool(*b)),
        Expr::List(items) => items
            .iter()
            .map(|item| evaluate(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(MetricValue::List),
        Expr::Var(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| RuleError::UnboundVariable { name: name.clone() }),
        Expr::Neg(inner) => match evaluate(inner, env)? {
            MetricValue::Number(n) => Ok(MetricValue::Number(-n)),
            other => Err(RuleError::TypeMismatch {
                op: "unary -".into(),
                left: other.type_name(),
                right: "none",
            }),
        },
        Expr::Not(inner) => Ok(MetricValue::Bool(!evaluate(inner, env)?.is_truthy())),
        Expr::And(left, right) => {
            if !evaluate(left, env)?.is_truthy() {
                return Ok(MetricValue::Bool(false));
            }
            Ok(MetricValue::Bool(evaluate(right, env)?.is_truthy()))
        }
        Expr::Or(left, right) => {
            if evaluate(left, env)?.is_truthy() {
                return Ok(MetricValue::Bool(true));
            }
            Ok(MetricValue::Bool(evaluate(right, env)?.is_truthy()))
        }
        Expr::Binary(op, left, right) => {
            let l = evaluate(left, env)?;
            let r = evaluate(right, env)?;
            binary(*op, l, r)
        }
        Expr::Compare(first, chain) => {
            let mut left = evaluate(first, env)?;
            for (op, right_expr) in chain {
                let right = evaluate(right_expr, env)?;
                if !compare(*op, &left, &right)? {
                    return Ok(MetricValue::Bool(false));
                }
                left = right;
            }
            Ok(MetricValue::Bool(true))
        }
        Expr::Index(target, index) => {
            let target = evaluate(target, env)?;
            let index = evaluate(index, env)?;
            subscript(target, index)
        }
        Expr::Member(target, name) => match evaluate(target, env)? {
            MetricValue::Map(mut map) => map
                .remove(name)
                .ok_or_else(|| RuleError::MissingKey { key: name.clone() }),
            other => Err(RuleError::TypeMismatch {
                op: format!(".{}", name),
                left: other.type_name(),
                right: "none",
            }),
        },
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|a| evaluate(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, args)
        }
    }
}

fn mismatch(op: &str, left: &MetricValue, right: &MetricValue) -> RuleError {
    RuleError::TypeMismatch {
        op: op.to_string(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

fn binary(op: BinaryOp, left: MetricValue, right: MetricValue) -> Result<MetricValue, RuleError> {
    match (op, left, right) {
        (BinaryOp::Add, MetricValue::Str(a), MetricValue::Str(b)) => Ok(MetricValue::Str(a + &b)),
        (BinaryOp::Add, MetricValue::List(mut a), MetricValue::List(b)) => {
            a.extend(b);
            Ok(MetricValue::List(a))
        }
        (op, l, r) => {
            let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                return Err(mismatch(op.symbol(), &l, &r));
            };
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err(RuleError::DivisionByZero);
                    }
                    a / b
                }
                BinaryOp::Rem => {
                    if b == 0.0 {
                        return Err(RuleError::DivisionByZero);
                    }
                    // Sign follows the divisor, as in Python.
                    a - b * (a / b).floor()
                }
            };
            Ok(MetricValue::Number(value))
        }
    }
}

fn ordering(op: CompareOp, left: &MetricValue, right: &MetricValue) -> Result<Option<Ordering>, RuleError> {
    match (left, right) {
        (MetricValue::Str(a), MetricValue::Str(b)) => Ok(Some(a.cmp(b))),
        _ => match (left.as_f64(), right.as_f64()) {
            // NaN compares unordered, so every ordering test is false.
            (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
            _ => Err(mismatch(op.symbol(), left, right)),
        },
    }
}

fn values_equal(left: &MetricValue, right: &MetricValue) -> bool {
    match (left, right) {
        (MetricValue::List(a), MetricValue::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (MetricValue::Map(a), MetricValue::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        (MetricValue::Str(a), MetricValue::Str(b)) => a == b,
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn contains(op: CompareOp, needle: &MetricValue, haystack: &MetricValue) -> Result<bool, RuleError> {
    match (needle, haystack) {
        (_, MetricValue::List(items)) => Ok(items.iter().any(|item| values_equal(needle, item))),
        (MetricValue::Str(key), MetricValue::Map(map)) => Ok(map.contains_key(key)),
        (MetricValue::Str(sub), MetricValue::Str(s)) => Ok(s.contains(sub.as_str())),
        _ => Err(mismatch(op.symbol(), needle, haystack)),
    }
}

fn compare(op: CompareOp, left: &MetricValue, right: &MetricValue) -> Result<bool, RuleError> {
    let result = match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::In => contains(op, left, right)?,
        CompareOp::NotIn => !contains(op, left, right)?,
        CompareOp::Lt => ordering(op, left, right)? == Some(Ordering::Less),
        CompareOp::Le => matches!(
            ordering(op, left, right)?,
            Some(Ordering::Less | Ordering::Equal)
        ),
        CompareOp::Gt => ordering(op, left, right)? == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            ordering(op, left, right)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
    };
    Ok(result)
}

fn subscript(target: MetricValue, index: MetricValue) -> Result<MetricValue, RuleError> {
    match (target, index) {
        (MetricValue::List(mut items), MetricValue::Number(n)) => {
            let len = items.len();
            let resolved = resolve_index(n, len)?;
            Ok(items.swap_remove(resolved))
        }
        (MetricValue::Str(s), MetricValue::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            let resolved = resolve_index(n, chars.len())?;
            Ok(MetricValue::Str(chars[resolved].to_string()))
        }
        (MetricValue::Map(mut map), MetricValue::Str(key)) => map
            .remove(&key)
            .ok_or(RuleError::MissingKey { key }),
        (target, index) => Err(mismatch("[]", &target, &index)),
    }
}

/// Map a possibly negative integral index onto `0..len`.
fn resolve_index(n: f64, len: usize) -> Result<usize, RuleError> {
    if n.fract() != 0.0 || !n.is_finite() {
        return Err(RuleError::TypeMismatch {
            op: "[]".into(),
            left: "list",
            right: "non-integer number",
        });
    }
    let index = n as i64;
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(RuleError::IndexOutOfRange { index, len });
    }
    Ok(resolved as usize)
}

fn expect_arity(name: &str, args: &[MetricValue], expected: usize) -> Result<(), RuleError> {
    if args.len() != expected {
        return Err(RuleError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

/// Numbers of a single list argument, or of the arguments themselves (`max(a, b)`).
fn numeric_args(name: &str, args: Vec<MetricValue>) -> Result<Vec<f64>, RuleError> {
    let values = match args.as_slice() {
        [MetricValue::List(items)] => items.clone(),
        _ => args,
    };
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| RuleError::InvalidArgument {
                name: name.to_string(),
                reason: format!("expected numbers, got {}", v.type_name()),
            })
        })
        .collect()
}

fn call(name: &str, args: Vec<MetricValue>) -> Result<MetricValue, RuleError> {
    match name {
        "len" => {
            expect_arity(name, &args, 1)?;
            let len = match &args[0] {
                MetricValue::List(items) => items.len(),
                MetricValue::Map(map) => map.len(),
                MetricValue::Str(s) => s.chars().count(),
                other => {
                    return Err(RuleError::InvalidArgument {
                        name: name.into(),
                        reason: format!("{} has no length", other.type_name()),
                    });
                }
            };
            Ok(MetricValue::Number(len as f64))
        }
        "abs" => {
            expect_arity(name, &args, 1)?;
            let n = args[0].as_f64().ok_or_else(|| RuleError::InvalidArgument {
                name: name.into(),
                reason: format!("expected number, got {}", args[0].type_name()),
            })?;
            Ok(MetricValue::Number(n.abs()))
        }
        "sum" => {
            let values = numeric_args(name, args)?;
            Ok(MetricValue::Number(values.iter().sum()))
        }
        "mean" | "min" | "max" => {
            let values = numeric_args(name, args)?;
            if values.is_empty() {
                return Err(RuleError::InvalidArgument {
                    name: name.into(),
                    reason: "empty sequence".into(),
                });
            }
            let result = match name {
                "mean" => values.iter().sum::<f64>() / values.len() as f64,
                "min" => values.iter().copied().fold(f64::INFINITY, f64::min),
                _ => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            Ok(MetricValue::Number(result))
        }
        _ => Err(RuleError::UnknownFunction {
            name: name.to_string(),
        }),
    }
}
