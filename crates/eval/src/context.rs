//! Per-render resolution chain.
//!
//! Every resolved path segment produces a new immutable [`Context`] linked
//! to the one it was resolved from. Children are shared behind `Arc`, so a
//! context can flow into every descendant node without copying its value.

use std::sync::Arc;

use whisker_core::{Path, Segment};

use crate::value::{BoxFuture, Value};

/// Where a collection item sits in its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemPosition {
    pub index: usize,
    pub is_last: bool,
}

#[derive(Debug, Clone)]
pub struct Context {
    value: Value,
    key: String,
    parent: Option<Arc<Context>>,
    position: Option<ItemPosition>,
}

impl Context {
    pub fn root(value: Value) -> Arc<Context> {
        Arc::new(Context {
            value,
            key: String::new(),
            parent: None,
            position: None,
        })
    }

    pub fn child(parent: &Arc<Context>, key: &str, value: Value) -> Arc<Context> {
        Arc::new(Context {
            value,
            key: key.to_owned(),
            parent: Some(Arc::clone(parent)),
            position: None,
        })
    }

    /// Context of one `{{#each}}` element; it answers the `$index` family.
    pub fn item(collection: &Arc<Context>, value: Value, index: usize, is_last: bool) -> Arc<Context> {
        Arc::new(Context {
            value,
            key: index.to_string(),
            parent: Some(Arc::clone(collection)),
            position: Some(ItemPosition { index, is_last }),
        })
    }

    /// Same place in the chain, different value. Used for formatter results
    /// so the context they were computed from stays untouched.
    pub fn with_value(self: &Arc<Self>, value: Value) -> Arc<Context> {
        Arc::new(Context {
            value,
            ..Context::clone(self)
        })
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parent(&self) -> Option<&Arc<Context>> {
        self.parent.as_ref()
    }

    pub fn position(&self) -> Option<ItemPosition> {
        self.position
    }

    pub fn root_of(self: &Arc<Self>) -> Arc<Context> {
        let mut current = Arc::clone(self);
        while let Some(parent) = current.parent.clone() {
            current = parent;
        }
        current
    }

    /// Resolve `path` from here. Never fails: a missing key yields a context
    /// holding `Value::Null`.
    pub async fn resolve(self: &Arc<Self>, path: &Path) -> Arc<Context> {
        resolve_from(Arc::clone(self), path.segments()).await
    }

    fn synthetic(&self, key: &str) -> Option<Value> {
        let ItemPosition { index, is_last } = self.position?;
        let value = match key {
            "$index" => Value::from(index),
            "$first" => Value::Bool(index == 0),
            "$last" => Value::Bool(is_last),
            "$middle" => Value::Bool(index != 0 && !is_last),
            "$odd" => Value::Bool(index % 2 == 1),
            "$even" => Value::Bool(index % 2 == 0),
            _ => return None,
        };
        Some(value)
    }

    async fn lookup(&self, key: &str) -> Value {
        if let Some(value) = self.synthetic(key) {
            return value;
        }
        let settled;
        let current = match &self.value {
            Value::Lazy(_) => {
                settled = self.value.settle().await;
                &settled
            }
            other => other,
        };
        match current {
            Value::Map(map) => map.get(key).cloned(),
            Value::Object(object) => object.get(key),
            Value::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
            _ => None,
        }
        .unwrap_or(Value::Null)
    }
}

fn resolve_from(ctx: Arc<Context>, segments: &[Segment]) -> BoxFuture<'_, Arc<Context>> {
    Box::pin(async move {
        let Some((first, rest)) = segments.split_first() else {
            return ctx;
        };
        match first {
            Segment::Root => {
                let skip = rest.iter().take_while(|s| **s == Segment::Parent).count();
                resolve_from(ctx.root_of(), &rest[skip..]).await
            }
            Segment::Parent => {
                let Some(parent) = ctx.parent.clone() else {
                    return resolve_from(ctx, rest).await;
                };
                let found = resolve_from(parent, rest).await;
                if found.value.settle().await.is_null() {
                    resolve_from(ctx, rest).await
                } else {
                    found
                }
            }
            Segment::This => resolve_from(ctx, rest).await,
            Segment::Name(key) => {
                let value = ctx.lookup(key).await;
                let child = Context::child(&ctx, key, value);
                resolve_from(child, rest).await
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> Path {
        Path::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn dotted_lookup_walks_maps() {
        let root = Context::root(Value::from(json!({"a": {"b": {"c": 3}}})));
        let ctx = root.resolve(&path("a.b.c")).await;
        assert_eq!(ctx.value(), &Value::Int(3));
        assert_eq!(ctx.key(), "c");
        assert_eq!(ctx.parent().map(|p| p.key()), Some("b"));
    }

    #[tokio::test]
    async fn missing_keys_are_null() {
        let root = Context::root(Value::from(json!({"a": 1})));
        assert!(root.resolve(&path("x.y.z")).await.value().is_null());
        assert!(root.resolve(&path("a.b")).await.value().is_null());
    }

    #[tokio::test]
    async fn parent_navigation() {
        let root = Context::root(Value::from(json!({"name": "root", "a": {"name": "a"}})));
        let a = root.resolve(&path("a")).await;
        assert_eq!(a.resolve(&path("../name")).await.value(), &Value::from("root"));
        // falls back to the current context when the parent has nothing
        let b = Context::child(&a, "b", Value::from(json!({"only": 1})));
        assert_eq!(b.resolve(&path("../only")).await.value(), &Value::Int(1));
    }

    #[tokio::test]
    async fn parent_at_root_does_not_fail() {
        let root = Context::root(Value::from(json!({"x": 1})));
        assert_eq!(root.resolve(&path("../../x")).await.value(), &Value::Int(1));
    }

    #[tokio::test]
    async fn root_jump() {
        let root = Context::root(Value::from(json!({"title": "T", "a": {"b": {}}})));
        let deep = root.resolve(&path("a.b")).await;
        assert_eq!(deep.resolve(&path("~title")).await.value(), &Value::from("T"));
    }

    #[tokio::test]
    async fn collection_metadata_on_items() {
        let root = Context::root(Value::List(vec![]));
        let first = Context::item(&root, Value::from("x"), 0, false);
        let last = Context::item(&root, Value::from("y"), 3, true);
        assert_eq!(first.resolve(&path("$first")).await.value(), &Value::Bool(true));
        assert_eq!(first.resolve(&path("$even")).await.value(), &Value::Bool(true));
        assert_eq!(last.resolve(&path("$index")).await.value(), &Value::Int(3));
        assert_eq!(last.resolve(&path("$last")).await.value(), &Value::Bool(true));
        assert_eq!(last.resolve(&path("$middle")).await.value(), &Value::Bool(false));
        assert_eq!(last.resolve(&path("$odd")).await.value(), &Value::Bool(true));
        assert!(root.resolve(&path("$index")).await.value().is_null());
    }

    #[tokio::test]
    async fn lazy_values_are_settled_before_descent() {
        let root = Context::root(Value::lazy(async { Value::from(json!({"k": "v"})) }));
        assert_eq!(root.resolve(&path("k")).await.value(), &Value::from("v"));
    }

    #[tokio::test]
    async fn list_elements_by_index() {
        let root = Context::root(Value::from(json!({"items": ["a", "b"]})));
        assert_eq!(root.resolve(&path("items.1")).await.value(), &Value::from("b"));
    }

    #[tokio::test]
    async fn with_value_keeps_the_original() {
        let root = Context::root(Value::Int(1));
        let formatted = root.with_value(Value::Int(2));
        assert_eq!(root.value(), &Value::Int(1));
        assert_eq!(formatted.value(), &Value::Int(2));
    }
}
