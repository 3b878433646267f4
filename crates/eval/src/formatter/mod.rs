//! Formatter registry.
//!
//! A formatter is a callable plus a descriptor of what it accepts: the type
//! of the value being formatted and the shape of its parameters. Call sites
//! like `{{price("F2")}}` are matched against descriptors by
//! [`dispatch`]; nothing here inspects the callable itself.
//!
//! Registries are built before compiling a template and then frozen behind
//! an `Arc` in `RenderOptions`, so a render can never observe a registry
//! being extended.

pub mod defaults;
pub mod dispatch;
pub mod types;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::value::Value;

pub use dispatch::{CallArgument, Dispatch};
pub use types::TypeSpec;

// ──────────────────────────────────────────────
// Parameters
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeSpec,
    pub is_optional: bool,
    /// Collects every argument no other parameter bound.
    pub is_rest: bool,
    /// Receives the value being formatted rather than a call argument.
    pub is_source_object: bool,
    /// Position among the argument-taking parameters.
    pub index: usize,
}

impl Param {
    pub fn new(name: &str, ty: TypeSpec) -> Self {
        Param {
            name: name.to_owned(),
            ty,
            is_optional: false,
            is_rest: false,
            is_source_object: false,
            index: 0,
        }
    }

    pub fn source(name: &str) -> Self {
        Param {
            is_source_object: true,
            ..Param::new(name, TypeSpec::Any)
        }
    }

    /// A trailing parameter collecting leftover arguments. Use
    /// `TypeSpec::KeyValue` as the element type to receive `{name, value}`
    /// maps instead of bare values.
    pub fn rest(name: &str, element: TypeSpec) -> Self {
        Param {
            is_rest: true,
            is_optional: true,
            ..Param::new(name, TypeSpec::list(element))
        }
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    fn is_argument(&self) -> bool {
        !self.is_source_object && !self.is_rest
    }
}

// ──────────────────────────────────────────────
// Callables
// ──────────────────────────────────────────────

/// A formatter whose work must be awaited.
#[async_trait]
pub trait AsyncFormatter: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> Result<Value, BoxError>;
}

pub type FormatterFn = dyn Fn(Vec<Value>) -> Result<Value, BoxError> + Send + Sync;

#[derive(Clone)]
enum Invoker {
    Sync(Arc<FormatterFn>),
    Async(Arc<dyn AsyncFormatter>),
}

/// One registered formatter. The callable receives one value per declared
/// parameter, in declaration order.
#[derive(Clone)]
pub struct FormatterDescriptor {
    pub name: String,
    pub accepted_type: TypeSpec,
    pub output_type: TypeSpec,
    params: Vec<Param>,
    invoker: Invoker,
}

impl FormatterDescriptor {
    pub fn new<F>(name: &str, accepted_type: TypeSpec, output_type: TypeSpec, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        FormatterDescriptor {
            name: name.to_owned(),
            accepted_type,
            output_type,
            params: Vec::new(),
            invoker: Invoker::Sync(Arc::new(f)),
        }
    }

    pub fn new_async<A>(name: &str, accepted_type: TypeSpec, output_type: TypeSpec, f: A) -> Self
    where
        A: AsyncFormatter + 'static,
    {
        FormatterDescriptor {
            name: name.to_owned(),
            accepted_type,
            output_type,
            params: Vec::new(),
            invoker: Invoker::Async(Arc::new(f)),
        }
    }

    /// Append a parameter; its positional index is assigned here.
    pub fn param(mut self, mut param: Param) -> Self {
        param.index = self.params.iter().filter(|p| p.is_argument()).count();
        if param.is_source_object {
            param.ty = self.accepted_type.clone();
        }
        self.params.push(param);
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Parameters that must be bound from call arguments.
    pub fn mandatory_count(&self) -> usize {
        self.params
            .iter()
            .filter(|p| p.is_argument() && !p.is_optional)
            .count()
    }

    pub(crate) async fn invoke(&self, args: Vec<Value>) -> Result<Value, BoxError> {
        match &self.invoker {
            Invoker::Sync(f) => f(args),
            Invoker::Async(f) => f.call(args).await,
        }
    }
}

impl fmt::Debug for FormatterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatterDescriptor")
            .field("name", &self.name)
            .field("accepted_type", &self.accepted_type)
            .field("output_type", &self.output_type)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// ──────────────────────────────────────────────
// Registry
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct FormatterRegistry {
    entries: Vec<Arc<FormatterDescriptor>>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: FormatterDescriptor) -> &mut Self {
        self.entries.push(Arc::new(descriptor));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, descriptor: FormatterDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Descriptors able to accept a value of `target`, in registration order.
    pub fn accepting<'a>(
        &'a self,
        target: &TypeSpec,
    ) -> impl Iterator<Item = &'a Arc<FormatterDescriptor>> + 'a {
        let target = target.clone();
        self.entries
            .iter()
            .filter(move |d| d.accepted_type.accepts(&target))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: Vec<Value>) -> Result<Value, BoxError> {
        Ok(Value::Null)
    }

    #[test]
    fn parameter_indexes_skip_source_and_rest() {
        let d = FormatterDescriptor::new("f", TypeSpec::String, TypeSpec::String, noop)
            .param(Param::source("value"))
            .param(Param::new("a", TypeSpec::Int))
            .param(Param::new("b", TypeSpec::String).optional())
            .param(Param::rest("more", TypeSpec::Any));
        let idx: Vec<usize> = d.params().iter().map(|p| p.index).collect();
        assert_eq!(idx, vec![0, 0, 1, 2]);
        assert_eq!(d.params()[0].ty, TypeSpec::String);
        assert_eq!(d.mandatory_count(), 1);
    }

    #[test]
    fn registry_filters_by_accepted_type() {
        let registry = FormatterRegistry::new()
            .with(FormatterDescriptor::new("s", TypeSpec::String, TypeSpec::String, noop))
            .with(FormatterDescriptor::new("n", TypeSpec::Number, TypeSpec::String, noop))
            .with(FormatterDescriptor::new("any", TypeSpec::Any, TypeSpec::String, noop));
        let names: Vec<&str> = registry
            .accepting(&TypeSpec::Int)
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["n", "any"]);
        assert_eq!(registry.len(), 3);
    }
}
