//! Type descriptions used to match formatters against values and arguments.

use std::collections::BTreeMap;
use std::fmt;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpec {
    Any,
    /// Output type of a formatter that returns nothing meaningful.
    Void,
    Null,
    Bool,
    Int,
    Float,
    /// `Int` or `Float`.
    Number,
    String,
    DateTime,
    List(Box<TypeSpec>),
    Map,
    /// Element type of a rest parameter that collects `{name, value}` pairs.
    KeyValue,
    /// A host object by its `Object::type_name`.
    Object(String),
    /// An open type parameter, bound from the matched value's type.
    Generic(String),
}

pub type Bindings = BTreeMap<String, TypeSpec>;

impl TypeSpec {
    pub fn list(element: TypeSpec) -> TypeSpec {
        TypeSpec::List(Box::new(element))
    }

    pub fn generic(name: &str) -> TypeSpec {
        TypeSpec::Generic(name.to_owned())
    }

    /// Runtime type of a (settled) value. Lists report a common element type,
    /// or `Any` when empty or mixed.
    pub fn of(value: &Value) -> TypeSpec {
        match value {
            Value::Null => TypeSpec::Null,
            Value::Bool(_) => TypeSpec::Bool,
            Value::Int(_) => TypeSpec::Int,
            Value::Float(_) => TypeSpec::Float,
            Value::Str(_) => TypeSpec::String,
            Value::DateTime(_) => TypeSpec::DateTime,
            Value::List(items) => {
                let mut element: Option<TypeSpec> = None;
                for item in items {
                    let t = TypeSpec::of(item);
                    match &element {
                        None => element = Some(t),
                        Some(e) if *e == t => {}
                        Some(_) => {
                            element = Some(TypeSpec::Any);
                            break;
                        }
                    }
                }
                TypeSpec::list(element.unwrap_or(TypeSpec::Any))
            }
            Value::Map(_) => TypeSpec::Map,
            Value::Object(o) => TypeSpec::Object(o.type_name().to_owned()),
            Value::Lazy(_) => TypeSpec::Any,
        }
    }

    /// Direct assignability. Open generics never match here; see
    /// [`TypeSpec::accepts`] for the generic fallback.
    pub fn is_assignable_from(&self, other: &TypeSpec) -> bool {
        match (self, other) {
            (TypeSpec::Any, _) => true,
            (TypeSpec::Number, TypeSpec::Int | TypeSpec::Float | TypeSpec::Number) => true,
            (TypeSpec::Float, TypeSpec::Int) => true,
            (TypeSpec::List(a), TypeSpec::List(b)) => a.is_assignable_from(b),
            (TypeSpec::Generic(_), _) => false,
            (a, b) => a == b,
        }
    }

    /// Whether a formatter accepting `self` can take a value of type `target`.
    pub fn accepts(&self, target: &TypeSpec) -> bool {
        if let TypeSpec::Generic(_) = self {
            return true;
        }
        if self.is_assignable_from(target) {
            return true;
        }
        self.is_open()
            && self.constructor() == target.constructor()
            && self.generic_arguments().len() == target.generic_arguments().len()
    }

    pub fn is_open(&self) -> bool {
        match self {
            TypeSpec::Generic(_) => true,
            TypeSpec::List(e) => e.is_open(),
            _ => false,
        }
    }

    fn constructor(&self) -> &'static str {
        match self {
            TypeSpec::List(_) => "list",
            TypeSpec::Map => "map",
            _ => "scalar",
        }
    }

    /// Lists synthesize a one-element argument list from their element type.
    pub fn generic_arguments(&self) -> Vec<&TypeSpec> {
        match self {
            TypeSpec::List(e) => vec![e.as_ref()],
            _ => Vec::new(),
        }
    }

    /// Bind type parameters in `self` from the concrete `target`.
    pub fn bind(&self, target: &TypeSpec, bindings: &mut Bindings) {
        match (self, target) {
            (TypeSpec::Generic(name), t) => {
                bindings.entry(name.clone()).or_insert_with(|| t.clone());
            }
            (TypeSpec::List(a), TypeSpec::List(b)) => a.bind(b, bindings),
            _ => {}
        }
    }

    pub fn substitute(&self, bindings: &Bindings) -> TypeSpec {
        match self {
            TypeSpec::Generic(name) => bindings.get(name).cloned().unwrap_or(TypeSpec::Any),
            TypeSpec::List(e) => TypeSpec::list(e.substitute(bindings)),
            other => other.clone(),
        }
    }

    /// Convert an argument value to this parameter type. `None` means the
    /// argument cannot be bound.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (TypeSpec::Any | TypeSpec::Generic(_), v) => Some(v),
            (TypeSpec::Void | TypeSpec::Null | TypeSpec::KeyValue, _) => None,
            (
                TypeSpec::String | TypeSpec::List(_) | TypeSpec::Map | TypeSpec::Object(_),
                Value::Null,
            ) => Some(Value::Null),
            (_, Value::Null) => None,
            (TypeSpec::String, Value::Str(s)) => Some(Value::Str(s)),
            (TypeSpec::String, v @ (Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::DateTime(_))) => {
                Some(Value::Str(v.to_string()))
            }
            (TypeSpec::Bool, Value::Bool(b)) => Some(Value::Bool(b)),
            (TypeSpec::Bool, Value::Str(s)) => s.trim().parse::<bool>().ok().map(Value::Bool),
            (TypeSpec::Int, Value::Int(i)) => Some(Value::Int(i)),
            (TypeSpec::Int, Value::Str(s)) => s.trim().parse::<i64>().ok().map(Value::Int),
            (TypeSpec::Float, Value::Float(f)) => Some(Value::Float(f)),
            (TypeSpec::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (TypeSpec::Float, Value::Str(s)) => s.trim().parse::<f64>().ok().map(Value::Float),
            (TypeSpec::Number, v @ (Value::Int(_) | Value::Float(_))) => Some(v),
            (TypeSpec::Number, Value::Str(s)) => {
                let s = s.trim();
                s.parse::<i64>()
                    .map(Value::Int)
                    .or_else(|_| s.parse::<f64>().map(Value::Float))
                    .ok()
            }
            (TypeSpec::DateTime, Value::DateTime(dt)) => Some(Value::DateTime(dt)),
            (TypeSpec::DateTime, Value::Str(s)) => OffsetDateTime::parse(s.trim(), &Rfc3339)
                .ok()
                .map(Value::DateTime),
            (TypeSpec::List(element), Value::List(items)) => items
                .into_iter()
                .map(|item| element.coerce(item))
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            (TypeSpec::Map, v @ Value::Map(_)) => Some(v),
            (TypeSpec::Object(name), Value::Object(o)) if o.type_name() == name.as_str() => {
                Some(Value::Object(o))
            }
            _ => None,
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Any => f.write_str("any"),
            TypeSpec::Void => f.write_str("void"),
            TypeSpec::Null => f.write_str("null"),
            TypeSpec::Bool => f.write_str("bool"),
            TypeSpec::Int => f.write_str("int"),
            TypeSpec::Float => f.write_str("float"),
            TypeSpec::Number => f.write_str("number"),
            TypeSpec::String => f.write_str("string"),
            TypeSpec::DateTime => f.write_str("datetime"),
            TypeSpec::List(e) => write!(f, "list<{}>", e),
            TypeSpec::Map => f.write_str("map"),
            TypeSpec::KeyValue => f.write_str("key-value"),
            TypeSpec::Object(n) => f.write_str(n),
            TypeSpec::Generic(n) => f.write_str(n),
        }
    }
}
