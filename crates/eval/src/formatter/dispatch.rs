//! Formatter selection and invocation.
//!
//! For one call site the dispatcher ranks every descriptor whose accepted
//! type fits the value, then tries them in order. A candidate whose
//! parameters cannot all be bound is skipped, not reported: the next one
//! gets a chance. The per-template registry is tried first, then the global
//! defaults, and if nothing matches the value passes through unformatted.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use super::defaults;
use super::types::{Bindings, TypeSpec};
use super::{FormatterDescriptor, FormatterRegistry, Param};
use crate::error::RenderError;
use crate::value::Value;

/// One evaluated call-site argument.
#[derive(Debug, Clone, PartialEq)]
pub struct CallArgument {
    pub name: Option<String>,
    pub value: Value,
}

impl CallArgument {
    pub fn positional(value: Value) -> Self {
        CallArgument { name: None, value }
    }

    pub fn named(name: &str, value: Value) -> Self {
        CallArgument {
            name: Some(name.to_owned()),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Formatted(Value),
    /// The descriptor could not bind the call; try the next one.
    Skip,
}

/// Lower is better. Value-returning formatters beat `Void` ones, and a
/// formatter whose mandatory parameters account for every argument beats
/// one that would leave arguments to defaults or a rest parameter.
pub fn score(descriptor: &FormatterDescriptor, arg_count: usize) -> i64 {
    let void_penalty = i64::from(descriptor.output_type == TypeSpec::Void);
    let slack = arg_count as i64 - descriptor.mandatory_count() as i64;
    1 + void_penalty + slack
}

/// Candidates for a value of type `target`, best first. Ties keep
/// registration order.
pub fn candidates<'r>(
    registry: &'r FormatterRegistry,
    target: &TypeSpec,
    arg_count: usize,
) -> Vec<&'r Arc<FormatterDescriptor>> {
    let mut ranked: Vec<_> = registry.accepting(target).collect();
    ranked.sort_by_key(|d| score(d, arg_count));
    ranked
}

/// Build the callable's argument list, one value per declared parameter.
/// `None` when a mandatory parameter has no usable argument.
pub fn compose(
    descriptor: &FormatterDescriptor,
    source: &Value,
    target: &TypeSpec,
    args: &[CallArgument],
) -> Option<Vec<Value>> {
    let params = descriptor.params();
    let mut bindings = Bindings::new();
    descriptor.accepted_type.bind(target, &mut bindings);

    let mut used = vec![false; args.len()];
    let mut assigned: Vec<Option<usize>> = vec![None; params.len()];

    // Names first, so a named argument is never stolen by position.
    for (pi, param) in params.iter().enumerate().filter(|(_, p)| takes_argument(p)) {
        let hit = args
            .iter()
            .enumerate()
            .position(|(ai, a)| !used[ai] && a.name.as_deref() == Some(param.name.as_str()));
        if let Some(ai) = hit {
            used[ai] = true;
            assigned[pi] = Some(ai);
        }
    }
    for (pi, param) in params.iter().enumerate().filter(|(_, p)| takes_argument(p)) {
        if assigned[pi].is_some() {
            continue;
        }
        let at_index = (param.index < args.len() && !used[param.index]).then_some(param.index);
        let hit = at_index.or_else(|| (0..args.len()).find(|&ai| !used[ai] && args[ai].name.is_none()));
        if let Some(ai) = hit {
            used[ai] = true;
            assigned[pi] = Some(ai);
        }
    }

    let mut values = Vec::with_capacity(params.len());
    for (pi, param) in params.iter().enumerate() {
        if param.is_source_object {
            values.push(source.clone());
        } else if param.is_rest {
            values.push(collect_rest(param, args, &used, &bindings)?);
        } else {
            match assigned[pi] {
                Some(ai) => {
                    let ty = param.ty.substitute(&bindings);
                    values.push(ty.coerce(args[ai].value.clone())?);
                }
                None if param.is_optional => values.push(Value::Null),
                None => return None,
            }
        }
    }
    Some(values)
}

fn takes_argument(param: &Param) -> bool {
    !param.is_source_object && !param.is_rest
}

fn collect_rest(
    param: &Param,
    args: &[CallArgument],
    used: &[bool],
    bindings: &Bindings,
) -> Option<Value> {
    let element = match param.ty.substitute(bindings) {
        TypeSpec::List(element) => *element,
        _ => TypeSpec::Any,
    };
    let mut items = Vec::new();
    for (arg, _) in args.iter().zip(used).filter(|(_, used)| !**used) {
        if element == TypeSpec::KeyValue {
            let mut pair = BTreeMap::new();
            pair.insert("name".to_owned(), Value::from(arg.name.clone()));
            pair.insert("value".to_owned(), arg.value.clone());
            items.push(Value::Map(pair));
        } else {
            items.push(element.coerce(arg.value.clone())?);
        }
    }
    Some(Value::List(items))
}

/// Try one descriptor. Binding failures skip; formatter failures propagate.
pub async fn execute(
    descriptor: &FormatterDescriptor,
    source: &Value,
    target: &TypeSpec,
    args: &[CallArgument],
) -> Result<Dispatch, RenderError> {
    let Some(values) = compose(descriptor, source, target, args) else {
        return Ok(Dispatch::Skip);
    };
    let result = descriptor
        .invoke(values)
        .await
        .map_err(RenderError::Formatter)?;
    if descriptor.output_type == TypeSpec::Void {
        // Side-effect formatters leave the value as it was.
        return Ok(Dispatch::Formatted(source.clone()));
    }
    Ok(Dispatch::Formatted(result))
}

/// Format `source` with the best matching formatter from `local`, falling
/// back to the global defaults and finally to `source` itself.
pub async fn format(
    local: &FormatterRegistry,
    source: Value,
    args: Vec<CallArgument>,
) -> Result<Value, RenderError> {
    let source = source.settle().await;
    let target = TypeSpec::of(&source);
    for (tier, registry) in [("template", local), ("global", defaults::global())] {
        for descriptor in candidates(registry, &target, args.len()) {
            match execute(descriptor, &source, &target, &args).await? {
                Dispatch::Formatted(value) => {
                    trace!(formatter = %descriptor.name, tier, target = %target, "formatter selected");
                    return Ok(value);
                }
                Dispatch::Skip => {
                    trace!(formatter = %descriptor.name, tier, "formatter skipped, arguments do not bind");
                }
            }
        }
    }
    trace!(target = %target, args = args.len(), "no formatter matched");
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;

    fn echo(args: Vec<Value>) -> Result<Value, BoxError> {
        Ok(Value::List(args))
    }

    fn desc(name: &str, accepted: TypeSpec) -> FormatterDescriptor {
        FormatterDescriptor::new(name, accepted, TypeSpec::Any, echo)
    }

    #[test]
    fn score_prefers_exact_arity_and_non_void() {
        let exact = desc("exact", TypeSpec::Any)
            .param(Param::source("v"))
            .param(Param::new("a", TypeSpec::Any));
        let loose = desc("loose", TypeSpec::Any)
            .param(Param::source("v"))
            .param(Param::rest("rest", TypeSpec::Any));
        let void = FormatterDescriptor::new("void", TypeSpec::Any, TypeSpec::Void, echo)
            .param(Param::new("a", TypeSpec::Any));
        assert_eq!(score(&exact, 1), 1);
        assert_eq!(score(&loose, 1), 2);
        assert_eq!(score(&void, 1), 2);
    }

    #[test]
    fn candidates_are_stable_on_ties() {
        let registry = FormatterRegistry::new()
            .with(desc("first", TypeSpec::Any))
            .with(desc("second", TypeSpec::String))
            .with(desc("int-only", TypeSpec::Int));
        let names: Vec<&str> = candidates(&registry, &TypeSpec::String, 0)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn candidates_outlive_the_target_type() {
        let registry = FormatterRegistry::new().with(desc("list", TypeSpec::list(TypeSpec::Any)));
        let ranked = {
            let target = TypeSpec::list(TypeSpec::Int);
            candidates(&registry, &target, 0)
        };
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, "list");
    }

    #[test]
    fn named_arguments_bind_before_positions() {
        let d = desc("f", TypeSpec::Any)
            .param(Param::new("a", TypeSpec::String))
            .param(Param::new("b", TypeSpec::String));
        let args = vec![
            CallArgument::named("b", Value::from("B")),
            CallArgument::positional(Value::from("A")),
        ];
        let values = compose(&d, &Value::Null, &TypeSpec::Null, &args).unwrap();
        // index 0 is taken by `b`, so `a` falls through to the next positional
        assert_eq!(values, vec![Value::from("A"), Value::from("B")]);
    }

    #[test]
    fn missing_mandatory_parameter_skips() {
        let d = desc("f", TypeSpec::Any).param(Param::new("a", TypeSpec::Int));
        assert!(compose(&d, &Value::Null, &TypeSpec::Null, &[]).is_none());
        let optional = desc("g", TypeSpec::Any).param(Param::new("a", TypeSpec::Int).optional());
        assert_eq!(
            compose(&optional, &Value::Null, &TypeSpec::Null, &[]),
            Some(vec![Value::Null])
        );
    }

    #[test]
    fn uncoercible_argument_skips() {
        let d = desc("f", TypeSpec::Any).param(Param::new("a", TypeSpec::Int));
        let args = vec![CallArgument::positional(Value::from("seven"))];
        assert!(compose(&d, &Value::Null, &TypeSpec::Null, &args).is_none());
    }

    #[test]
    fn rest_collects_key_value_pairs() {
        let d = desc("f", TypeSpec::Any)
            .param(Param::new("first", TypeSpec::Int))
            .param(Param::rest("rest", TypeSpec::KeyValue));
        let args = vec![
            CallArgument::positional(Value::Int(1)),
            CallArgument::named("x", Value::from("X")),
            CallArgument::positional(Value::Int(3)),
        ];
        let values = compose(&d, &Value::Null, &TypeSpec::Null, &args).unwrap();
        assert_eq!(values[0], Value::Int(1));
        let Value::List(rest) = &values[1] else {
            panic!("rest should be a list");
        };
        assert_eq!(rest.len(), 2);
        let Value::Map(pair) = &rest[0] else {
            panic!("rest item should be a map");
        };
        assert_eq!(pair["name"], Value::from("x"));
        assert_eq!(pair["value"], Value::from("X"));
        let Value::Map(pair) = &rest[1] else {
            panic!("rest item should be a map");
        };
        assert_eq!(pair["name"], Value::Null);
    }

    #[test]
    fn generic_parameters_take_the_bound_type() {
        let d = desc("f", TypeSpec::list(TypeSpec::generic("T")))
            .param(Param::source("v"))
            .param(Param::new("item", TypeSpec::generic("T")));
        let target = TypeSpec::list(TypeSpec::Int);
        let source = Value::List(vec![Value::Int(1)]);
        let bad = vec![CallArgument::positional(Value::from("two"))];
        assert!(compose(&d, &source, &target, &bad).is_none());
        let ok = vec![CallArgument::positional(Value::Int(2))];
        assert_eq!(
            compose(&d, &source, &target, &ok).unwrap()[1],
            Value::Int(2)
        );
    }

    #[tokio::test]
    async fn falls_back_to_source_when_nothing_matches() {
        let registry = FormatterRegistry::new().with(desc("ints", TypeSpec::Int));
        let out = format(&registry, Value::Bool(true), vec![]).await.unwrap();
        assert_eq!(out, Value::Bool(true));
    }

    #[tokio::test]
    async fn formatter_errors_propagate() {
        let failing = FormatterDescriptor::new("boom", TypeSpec::Any, TypeSpec::Any, |_| {
            Err("boom".into())
        });
        let registry = FormatterRegistry::new().with(failing);
        let err = format(&registry, Value::Int(1), vec![]).await.unwrap_err();
        assert!(matches!(err, RenderError::Formatter(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
