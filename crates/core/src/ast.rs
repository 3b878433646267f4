//! Document tree produced by the builder and walked by the renderer.
//!
//! Nodes are immutable once built and carry no per-render state, so one
//! compiled tree can be rendered by many callers at once.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::path::Path;

// ──────────────────────────────────────────────
// Formatter arguments
// ──────────────────────────────────────────────

/// A literal argument as written in a formatter call.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Quoted text (escapes resolved) or an unquoted word that is not a number.
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Literal(Literal),
    /// `$path$`: resolved against the render context when the call runs.
    Reference(Path),
}

/// One argument of a formatter call, optionally named with `[Name]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatterArg {
    pub name: Option<String>,
    pub value: ArgValue,
}

// ──────────────────────────────────────────────
// Nodes
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum NodeKind {
    Content(String),
    /// `{{path}}` (escaped) or `{{{path}}}` / `{{&path}}` (unescaped).
    PathPrint { path: Path, escape: bool },
    Scope(Path),
    InvertedScope(Path),
    Collection(Path),
    /// One step of a formatter chain. `arguments == None` is a plain path hop
    /// on the previous result.
    FormatterCall {
        path: Path,
        arguments: Option<Vec<FormatterArg>>,
    },
    /// Prints the result of the enclosing chain.
    PrintFormatterResult { escape: bool },
    PartialDeclare { name: String, body: Arc<Node> },
    PartialInvoke(String),
    /// Container evaluated with the enclosing context; used for the document
    /// root and partial bodies.
    IsolatedScope,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: NodeKind, children: Vec<Node>) -> Self {
        Node { kind, children }
    }

    /// Total node count of this subtree, partial bodies excluded.
    pub fn count(&self) -> usize {
        let mut pending = vec![self];
        let mut total = 0;
        while let Some(node) = pending.pop() {
            total += 1;
            pending.extend(&node.children);
        }
        total
    }
}

// ──────────────────────────────────────────────
// Partial table
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum PartialSlot {
    /// Registered while the declaration body is still being built.
    Building,
    Ready(Arc<Node>),
}

/// `name -> body` for every `{{#declare}}` in a template.
#[derive(Debug, Clone, Default)]
pub struct PartialTable {
    slots: BTreeMap<String, PartialSlot>,
}

impl PartialTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, name: &str) {
        self.slots.insert(name.to_owned(), PartialSlot::Building);
    }

    pub fn complete(&mut self, name: &str, body: Arc<Node>) {
        self.slots.insert(name.to_owned(), PartialSlot::Ready(body));
    }

    pub fn get(&self, name: &str) -> Option<&PartialSlot> {
        self.slots.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A fully built template: the root tree plus its partial table.
#[derive(Debug, Clone)]
pub struct Document {
    pub root: Node,
    pub partials: PartialTable,
}
