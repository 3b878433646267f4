//! Document builder: token queue -> node tree.
//!
//! The queue is consumed front to back with an explicit stack of open
//! frames, so nesting depth never grows the native stack. A close token
//! finishes the innermost frame and attaches it to its parent. Partial
//! bodies are sliced into their own queue and built as independent subtrees,
//! registered in the partial table in two phases so a partial may include
//! itself.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::ast::{Document, Node, NodeKind, PartialTable};
use crate::error::{CompileError, LineIndex, ParseError};
use crate::lexer::{lex_with_depth, Token, TokenKind, DEFAULT_MAX_DEPTH};
use crate::path::Path;

/// Tokenize and build in one step.
pub fn parse(source: &str) -> Result<Document, CompileError> {
    parse_with_depth(source, DEFAULT_MAX_DEPTH)
}

/// [`parse`] with an explicit nesting limit; deeper templates are a
/// compile error.
pub fn parse_with_depth(source: &str, max_depth: usize) -> Result<Document, CompileError> {
    let tokens = lex_with_depth(source, max_depth)?;
    build(tokens, source)
}

/// Build a document from a token stream produced for `source`.
pub fn build(tokens: Vec<Token>, source: &str) -> Result<Document, CompileError> {
    let mut builder = Builder {
        lines: LineIndex::new(source),
        partials: PartialTable::new(),
        errors: Vec::new(),
    };
    let mut queue: VecDeque<Token> = tokens.into();
    let mut children = builder.block(&mut queue);
    while let Some(stray) = queue.pop_front() {
        builder.error(&stray, "closing tag has no matching open");
        children.extend(builder.block(&mut queue));
    }
    if !builder.errors.is_empty() {
        return Err(CompileError::new(builder.errors));
    }
    let root = Node::with_children(NodeKind::IsolatedScope, children);
    tracing::debug!(
        nodes = root.count(),
        partials = builder.partials.len(),
        "built template document"
    );
    Ok(Document {
        root,
        partials: builder.partials,
    })
}

/// A scope or collection whose close has not been seen yet.
struct Frame {
    kind: NodeKind,
    children: Vec<Node>,
    /// Formatter steps feeding this collection, wrapped around it on close.
    steps: Vec<Token>,
}

enum Chain {
    Done(Node),
    Open(Frame),
}

fn attach(open: &mut [Frame], base: &mut Vec<Node>, node: Node) {
    match open.last_mut() {
        Some(frame) => frame.children.push(node),
        None => base.push(node),
    }
}

struct Builder<'a> {
    lines: LineIndex<'a>,
    partials: PartialTable,
    errors: Vec<ParseError>,
}

impl Builder<'_> {
    fn error(&mut self, token: &Token, message: impl Into<String>) {
        let location = self.lines.locate(token.offset);
        self.errors
            .push(ParseError::new(location, token.value.clone(), message));
    }

    fn path_of(&mut self, token: &Token) -> Path {
        match &token.path {
            Some(p) => p.clone(),
            None => {
                self.error(token, "token carries no path");
                Path::this()
            }
        }
    }

    /// Build sibling nodes until a close with no open frame, or the end of
    /// the queue. That close token is consumed.
    fn block(&mut self, queue: &mut VecDeque<Token>) -> Vec<Node> {
        let mut base = Vec::new();
        let mut open: Vec<Frame> = Vec::new();
        while let Some(token) = queue.pop_front() {
            let node = match token.kind {
                TokenKind::Content => Node::new(NodeKind::Content(token.value)),
                TokenKind::EscapedValue | TokenKind::UnescapedValue => {
                    let path = self.path_of(&token);
                    Node::new(NodeKind::PathPrint {
                        path,
                        escape: token.kind == TokenKind::EscapedValue,
                    })
                }
                TokenKind::ScopeOpen | TokenKind::InvertedScopeOpen | TokenKind::CollectionOpen => {
                    let path = self.path_of(&token);
                    let kind = match token.kind {
                        TokenKind::ScopeOpen => NodeKind::Scope(path),
                        TokenKind::InvertedScopeOpen => NodeKind::InvertedScope(path),
                        _ => NodeKind::Collection(path),
                    };
                    open.push(Frame {
                        kind,
                        children: Vec::new(),
                        steps: Vec::new(),
                    });
                    continue;
                }
                TokenKind::ScopeClose | TokenKind::CollectionClose => match open.pop() {
                    Some(frame) => self.finish(frame),
                    None => return base,
                },
                TokenKind::FormatterCall => {
                    queue.push_front(token);
                    match self.chain(queue) {
                        Chain::Done(node) => node,
                        Chain::Open(frame) => {
                            open.push(frame);
                            continue;
                        }
                    }
                }
                TokenKind::PrintFormattedResult | TokenKind::PrintUnescapedResult => {
                    self.error(&token, "formatted result printed without a formatter call");
                    continue;
                }
                TokenKind::PartialOpen => self.declare(token, queue),
                TokenKind::PartialClose => {
                    self.error(&token, "'{{/declare}}' has no matching declaration");
                    continue;
                }
                TokenKind::RenderPartial => Node::new(NodeKind::PartialInvoke(token.value)),
            };
            attach(&mut open, &mut base, node);
        }
        // unclosed frames were already reported by the tokenizer
        while let Some(frame) = open.pop() {
            let node = self.finish(frame);
            attach(&mut open, &mut base, node);
        }
        base
    }

    fn finish(&mut self, frame: Frame) -> Node {
        let node = Node::with_children(frame.kind, frame.children);
        self.wrap(node, frame.steps)
    }

    /// Nest `node` inside the chain steps so each step is the single child
    /// of the previous one.
    fn wrap(&mut self, mut node: Node, steps: Vec<Token>) -> Node {
        for step in steps.into_iter().rev() {
            let path = self.path_of(&step);
            node = Node::with_children(
                NodeKind::FormatterCall {
                    path,
                    arguments: step.arguments,
                },
                vec![node],
            );
        }
        node
    }

    /// Consecutive `FormatterCall` tokens form one chain. The chain ends in
    /// either a print of the result or a collection over it; a collection
    /// stays open until its close token.
    fn chain(&mut self, queue: &mut VecDeque<Token>) -> Chain {
        let mut steps = Vec::new();
        while queue
            .front()
            .is_some_and(|t| t.kind == TokenKind::FormatterCall)
        {
            if let Some(t) = queue.pop_front() {
                steps.push(t);
            }
        }

        let print = match queue.pop_front() {
            Some(t) if t.kind == TokenKind::PrintFormattedResult => {
                Node::new(NodeKind::PrintFormatterResult { escape: true })
            }
            Some(t) if t.kind == TokenKind::PrintUnescapedResult => {
                Node::new(NodeKind::PrintFormatterResult { escape: false })
            }
            Some(t) if t.kind == TokenKind::CollectionOpen => {
                let path = self.path_of(&t);
                return Chain::Open(Frame {
                    kind: NodeKind::Collection(path),
                    children: Vec::new(),
                    steps,
                });
            }
            other => {
                if let Some(step) = steps.last() {
                    self.error(step, "formatter chain is not terminated");
                }
                if let Some(t) = other {
                    queue.push_front(t);
                }
                Node::new(NodeKind::PrintFormatterResult { escape: true })
            }
        };
        Chain::Done(self.wrap(print, steps))
    }

    fn declare(&mut self, open: Token, queue: &mut VecDeque<Token>) -> Node {
        let name = open.value.clone();
        self.partials.begin(&name);

        let mut body_tokens = VecDeque::new();
        let mut depth = 0usize;
        let mut closed = false;
        while let Some(t) = queue.pop_front() {
            match t.kind {
                TokenKind::PartialOpen => depth += 1,
                TokenKind::PartialClose if depth == 0 => {
                    closed = true;
                    break;
                }
                TokenKind::PartialClose => depth -= 1,
                _ => {}
            }
            body_tokens.push_back(t);
        }
        if !closed {
            self.error(&open, format!("partial '{}' is never closed", name));
        }

        let children = self.block(&mut body_tokens);
        if let Some(stray) = body_tokens.front().cloned() {
            self.error(&stray, format!("unbalanced closing tag inside partial '{}'", name));
        }
        let body = Arc::new(Node::with_children(NodeKind::IsolatedScope, children));
        self.partials.complete(&name, Arc::clone(&body));
        Node::new(NodeKind::PartialDeclare { name, body })
    }
}
