//! Runtime values rendered by templates.
//!
//! Data handed to a render is dynamically shaped: maps and lists from JSON,
//! host objects exposing properties through [`Object`], and lazily computed
//! values that are awaited the first time something reads them.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::OnceCell;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ──────────────────────────────────────────────
// Host objects
// ──────────────────────────────────────────────

/// Structural property lookup for host types that are not plain maps.
pub trait Object: fmt::Debug + Send + Sync {
    /// Name used for formatter matching (`TypeSpec::Object`) and messages.
    fn type_name(&self) -> &str;

    /// Look up a property. `None` renders as null; it is never an error.
    fn get(&self, key: &str) -> Option<Value>;

    /// Elements, when the object can be iterated with `{{#each}}`.
    fn elements(&self) -> Option<Vec<Value>> {
        None
    }

    /// Text written when the object itself is printed.
    fn render(&self) -> String {
        self.type_name().to_string()
    }

    fn as_any(&self) -> &dyn Any;
}

// ──────────────────────────────────────────────
// Lazy values
// ──────────────────────────────────────────────

struct LazyInner {
    cell: OnceCell<Value>,
    pending: Mutex<Option<BoxFuture<'static, Value>>>,
}

/// A value produced by a future, awaited at most once and then cached.
#[derive(Clone)]
pub struct LazyValue {
    inner: Arc<LazyInner>,
}

impl LazyValue {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Value> + Send + 'static,
    {
        LazyValue {
            inner: Arc::new(LazyInner {
                cell: OnceCell::new(),
                pending: Mutex::new(Some(Box::pin(future))),
            }),
        }
    }

    /// Await the underlying future (first call only) and return the result.
    pub async fn get(&self) -> &Value {
        self.inner
            .cell
            .get_or_init(|| async {
                let pending = self.inner.pending.lock().ok().and_then(|mut p| p.take());
                match pending {
                    Some(future) => future.await,
                    // The first attempt was dropped mid-await.
                    None => Value::Null,
                }
            })
            .await
    }

    /// The cached result, if the future has completed.
    pub fn peek(&self) -> Option<&Value> {
        self.inner.cell.get()
    }

    pub fn ptr_eq(&self, other: &LazyValue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peek() {
            Some(v) => write!(f, "Lazy({:?})", v),
            None => f.write_str("Lazy(<pending>)"),
        }
    }
}

// ──────────────────────────────────────────────
// Value
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    DateTime(OffsetDateTime),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Object(Arc<dyn Object>),
    Lazy(LazyValue),
}

impl Value {
    pub fn lazy<F>(future: F) -> Value
    where
        F: Future<Output = Value> + Send + 'static,
    {
        Value::Lazy(LazyValue::new(future))
    }

    pub fn object<O: Object + 'static>(object: O) -> Value {
        Value::Object(Arc::new(object))
    }

    /// Unwrap (possibly nested) lazy values. Every other variant is returned
    /// as a clone.
    pub async fn settle(&self) -> Value {
        let mut current = self.clone();
        loop {
            match current {
                Value::Lazy(lazy) => current = lazy.get().await.clone(),
                other => return other,
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(o) => o.type_name(),
            Value::Lazy(_) => "lazy",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::DateTime(dt) => serde_json::Value::String(format_datetime(dt)),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Object(o) => serde_json::Value::String(o.render()),
            Value::Lazy(lazy) => lazy
                .peek()
                .map(Value::to_json)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Default existence test: null, `false`, zero, `""` and empty sequences or
/// maps are false; everything else is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Str(s) => !s.is_empty(),
        Value::DateTime(_) => true,
        Value::List(items) => !items.is_empty(),
        Value::Map(map) => !map.is_empty(),
        Value::Object(o) => o.elements().map_or(true, |e| !e.is_empty()),
        Value::Lazy(lazy) => lazy.peek().map_or(true, is_truthy),
    }
}

pub(crate) fn format_datetime(dt: &OffsetDateTime) -> String {
    dt.format(&Rfc3339).unwrap_or_else(|_| dt.to_string())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::DateTime(dt) => f.write_str(&format_datetime(dt)),
            Value::List(_) | Value::Map(_) => write!(f, "{}", self.to_json()),
            Value::Object(o) => f.write_str(&o.render()),
            Value::Lazy(lazy) => match lazy.peek() {
                Some(v) => write!(f, "{}", v),
                None => Ok(()),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Lazy(a), Value::Lazy(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

// ──────────────────────────────────────────────
// Conversions
// ──────────────────────────────────────────────

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        i64::try_from(i).map(Value::Int).unwrap_or(Value::Float(i as f64))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(dt: OffsetDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn falsy_values() {
        for v in [
            Value::Null,
            Value::Bool(false),
            Value::Int(0),
            Value::Float(0.0),
            Value::Str(String::new()),
            Value::List(vec![]),
            Value::Map(BTreeMap::new()),
        ] {
            assert!(!is_truthy(&v), "{:?} should be falsy", v);
        }
    }

    #[test]
    fn truthy_values() {
        for v in [
            Value::Bool(true),
            Value::Int(-1),
            Value::Float(0.5),
            Value::from("false"),
            Value::List(vec![Value::Null]),
            Value::DateTime(OffsetDateTime::UNIX_EPOCH),
        ] {
            assert!(is_truthy(&v), "{:?} should be truthy", v);
        }
    }

    #[test]
    fn json_conversion_keeps_shape() {
        let v = Value::from(json!({"a": [1, 2.5, "x", null, true]}));
        match &v {
            Value::Map(m) => match &m["a"] {
                Value::List(items) => {
                    assert_eq!(items[0], Value::Int(1));
                    assert_eq!(items[1], Value::Float(2.5));
                    assert_eq!(items[2], Value::from("x"));
                    assert_eq!(items[3], Value::Null);
                    assert_eq!(items[4], Value::Bool(true));
                }
                other => panic!("expected list, got {:?}", other),
            },
            other => panic!("expected map, got {:?}", other),
        }
        assert_eq!(v.to_json(), json!({"a": [1, 2.5, "x", null, true]}));
    }

    #[test]
    fn display_formats() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::from(json!([1, "a"])).to_string(), r#"[1,"a"]"#);
        assert_eq!(
            Value::DateTime(time::macros::datetime!(2024-01-01 0:00 UTC)).to_string(),
            "2024-01-01T00:00:00Z"
        );
    }

    #[tokio::test]
    async fn lazy_value_is_awaited_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let v = Value::lazy(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Value::Int(7)
        });
        assert_eq!(v.settle().await, Value::Int(7));
        assert_eq!(v.settle().await, Value::Int(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(is_truthy(&v));
    }

    #[tokio::test]
    async fn nested_lazy_values_settle_fully() {
        let v = Value::lazy(async { Value::lazy(async { Value::from("deep") }) });
        assert_eq!(v.settle().await, Value::from("deep"));
    }
}
