//! Function library for the constraint expression language
//!
//! Core XPath-1.0 functions plus the YANG extension set. Dispatch is over
//! the closed [`Function`] enum, so an unknown name never reaches this
//! module. Compiled regexes for `re-match` are cached process-wide.

use super::ast::{Expr, Function};
use super::error::EvaluationError;
use super::evaluator::{EvalContext, Evaluator};
use super::value::{number_from_str, NodeRef, Value};
use confguard_core::{QName, Scalar};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;

static REGEX_CACHE: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Compile a pattern anchored to the full string, through the cache
///
/// # Errors
///
/// Returns [`EvaluationError::InvalidRegex`] when the pattern does not
/// compile.
pub fn compile_anchored(pattern: &str) -> Result<Regex, EvaluationError> {
    let mut cache = REGEX_CACHE.lock();
    if let Some(regex) = cache.get(pattern) {
        return Ok(regex.clone());
    }
    let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
        EvaluationError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        }
    })?;
    cache.insert(pattern.to_string(), regex.clone());
    Ok(regex)
}

pub(super) fn invoke(
    evaluator: &Evaluator<'_>,
    ctx: EvalContext,
    function: Function,
    args: &[Expr],
) -> Result<Value, EvaluationError> {
    match function {
        Function::True => Ok(Value::Boolean(true)),
        Function::False => Ok(Value::Boolean(false)),
        Function::Current => Ok(Value::NodeSet(vec![NodeRef::Tree(ctx.current)])),

        Function::Boolean => {
            let arg = required(evaluator, ctx, function, args, 0)?;
            Ok(Value::Boolean(arg.boolean()))
        }
        Function::Not => {
            let arg = required(evaluator, ctx, function, args, 0)?;
            Ok(Value::Boolean(!arg.boolean()))
        }
        Function::Number => {
            let n = match args.first() {
                Some(expr) => evaluator.to_number(&evaluator.evaluate(expr, ctx)?),
                None => number_from_str(&evaluator.node_string(&NodeRef::Tree(ctx.node))),
            };
            Ok(Value::Number(n))
        }
        Function::Floor => {
            let arg = required(evaluator, ctx, function, args, 0)?;
            Ok(Value::Number(evaluator.to_number(&arg).floor()))
        }
        Function::Ceiling => {
            let arg = required(evaluator, ctx, function, args, 0)?;
            Ok(Value::Number(evaluator.to_number(&arg).ceil()))
        }
        Function::Round => {
            // Halves round toward positive infinity: round(-2.5) is -2.
            let arg = required(evaluator, ctx, function, args, 0)?;
            Ok(Value::Number((evaluator.to_number(&arg) + 0.5).floor()))
        }

        Function::Concat => {
            if args.len() < 2 {
                return Err(missing(evaluator, function));
            }
            let mut out = String::new();
            for arg in args {
                out.push_str(&evaluator.to_string(&evaluator.evaluate(arg, ctx)?));
            }
            Ok(Value::String(out))
        }
        Function::Contains => {
            let haystack = required(evaluator, ctx, function, args, 0)?;
            let needle = required(evaluator, ctx, function, args, 1)?;
            Ok(Value::Boolean(
                evaluator
                    .to_string(&haystack)
                    .contains(&evaluator.to_string(&needle)),
            ))
        }
        Function::StringLength => {
            let text = match args.first() {
                Some(expr) => evaluator.to_string(&evaluator.evaluate(expr, ctx)?),
                None => evaluator.node_string(&NodeRef::Tree(ctx.node)),
            };
            Ok(Value::Number(text.chars().count() as f64))
        }
        Function::SubstringBefore => {
            let text = evaluator.to_string(&required(evaluator, ctx, function, args, 0)?);
            let marker = evaluator.to_string(&required(evaluator, ctx, function, args, 1)?);
            let before = text
                .split_once(&marker)
                .map(|(before, _)| before.to_string())
                .unwrap_or_default();
            Ok(Value::String(before))
        }
        Function::String => {
            let text = match args.first() {
                Some(expr) => evaluator.to_string(&evaluator.evaluate(expr, ctx)?),
                None => evaluator.node_string(&NodeRef::Tree(ctx.node)),
            };
            Ok(Value::String(text))
        }

        Function::NamespaceUri | Function::LocalName => {
            let qname = match args.first() {
                Some(expr) => match evaluator.evaluate(expr, ctx)? {
                    Value::NodeSet(nodes) => {
                        nodes.first().and_then(|n| evaluator.node_qname(n))
                    }
                    _ => None,
                },
                None => evaluator.node_qname(&NodeRef::Tree(ctx.node)),
            };
            let text = match qname {
                Some(qname) if function == Function::LocalName => qname.name,
                Some(qname) => qname.module,
                None => String::new(),
            };
            Ok(Value::String(text))
        }

        Function::Count => {
            let arg = required(evaluator, ctx, function, args, 0)?;
            let Value::NodeSet(nodes) = arg else {
                return Err(EvaluationError::InvalidArgument {
                    function: function.name(),
                    message: format!("expected a node-set, got a {}", arg.kind()),
                });
            };
            Ok(Value::Number(nodes.len() as f64))
        }

        Function::DerivedFrom | Function::DerivedFromOrSelf => {
            let nodes = node_set_arg(evaluator, ctx, function, args, 0)?;
            let base_text =
                evaluator.to_string(&required(evaluator, ctx, function, args, 1)?);
            let or_self = function == Function::DerivedFromOrSelf;
            let matched = nodes.iter().any(|node| {
                let base = resolve_identity_name(evaluator, node, &base_text);
                base.is_some_and(|base| evaluator.node_derived_from(node, &base, or_self))
            });
            Ok(Value::Boolean(matched))
        }

        Function::EnumValue => {
            let nodes = node_set_arg(evaluator, ctx, function, args, 0)?;
            // An empty selection or a non-enumeration leaf yields NaN, the
            // way number() treats non-numeric text.
            let n = match nodes.first() {
                Some(node) => match evaluator.node_enum_ordinal(node) {
                    Some(ordinal) => ordinal as f64,
                    None => number_from_str(&evaluator.node_string(node)),
                },
                None => f64::NAN,
            };
            Ok(Value::Number(n))
        }

        Function::ReMatch => {
            let subject = required(evaluator, ctx, function, args, 0)?;
            let pattern =
                evaluator.to_string(&required(evaluator, ctx, function, args, 1)?);
            let regex = compile_anchored(&pattern)?;
            // Over a node-set every selected value must match; an empty
            // selection matches vacuously.
            let matched = match &subject {
                Value::NodeSet(nodes) => nodes
                    .iter()
                    .all(|node| regex.is_match(&evaluator.node_string(node))),
                other => regex.is_match(&evaluator.to_string(other)),
            };
            Ok(Value::Boolean(matched))
        }

        Function::BitIsSet => {
            let nodes = node_set_arg(evaluator, ctx, function, args, 0)?;
            let flag = evaluator.to_string(&required(evaluator, ctx, function, args, 1)?);
            let set = nodes.iter().any(|node| {
                matches!(evaluator.node_scalar(node),
                    Some(Scalar::Bits(bits)) if bits.iter().any(|b| *b == flag))
            });
            Ok(Value::Boolean(set))
        }
    }
}

fn missing(evaluator: &Evaluator<'_>, function: Function) -> EvaluationError {
    EvaluationError::MissingArgument {
        function: function.name(),
        node: evaluator.owner(),
    }
}

fn required(
    evaluator: &Evaluator<'_>,
    ctx: EvalContext,
    function: Function,
    args: &[Expr],
    index: usize,
) -> Result<Value, EvaluationError> {
    let expr = args.get(index).ok_or_else(|| missing(evaluator, function))?;
    evaluator.evaluate(expr, ctx)
}

fn node_set_arg(
    evaluator: &Evaluator<'_>,
    ctx: EvalContext,
    function: Function,
    args: &[Expr],
    index: usize,
) -> Result<Vec<NodeRef>, EvaluationError> {
    match required(evaluator, ctx, function, args, index)? {
        Value::NodeSet(nodes) => Ok(nodes),
        other => Err(EvaluationError::InvalidArgument {
            function: function.name(),
            message: format!("expected a node-set, got a {}", other.kind()),
        }),
    }
}

/// Resolve a `module:name` identity literal; an unqualified name takes the
/// module of the node being tested
fn resolve_identity_name(
    evaluator: &Evaluator<'_>,
    node: &NodeRef,
    text: &str,
) -> Option<QName> {
    match text.split_once(':') {
        Some((module, name)) => Some(QName::new(module, name)),
        None => evaluator
            .node_qname(node)
            .map(|qname| QName::new(qname.module, text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_anchored_full_match_only() {
        let regex = compile_anchored(r"eth0\.\d+").expect("valid pattern");
        assert!(regex.is_match("eth0.1"));
        assert!(!regex.is_match("xeth0.1"));
        assert!(!regex.is_match("eth0.1x"));
    }

    #[test]
    fn test_compile_anchored_rejects_bad_pattern() {
        assert!(matches!(
            compile_anchored("("),
            Err(EvaluationError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_cache_returns_same_pattern() {
        let a = compile_anchored("a+").expect("valid");
        let b = compile_anchored("a+").expect("valid");
        assert_eq!(a.as_str(), b.as_str());
    }
}
