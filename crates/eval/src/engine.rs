//! Explicit-stack tree walker.
//!
//! The engine never recurses on template structure. Each evaluated node
//! pushes its continuations, `(child, context)` pairs, onto a work stack in
//! reverse so the first child is popped next. Before every evaluation the
//! stop conditions are checked (abort, cancellation, deadline, quota); once
//! one holds, remaining evaluations are dropped while the stack drains.
//! Partial exits are still honored during the drain, so the partial stack
//! always unwinds.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use whisker_core::{ArgValue, Document, FormatterArg, Literal, Node, NodeKind, PartialSlot};

use crate::cancel::CancellationToken;
use crate::context::Context;
use crate::error::RenderError;
use crate::formatter::{dispatch, CallArgument};
use crate::options::RenderOptions;
use crate::partial::PartialStack;
use crate::sink::OutputSink;
use crate::value::Value;

enum Work<'d> {
    Eval(&'d Node, Arc<Context>),
    /// Pops the partial frame pushed by the matching include.
    ExitPartial,
}

/// How a render loop ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    /// The caller's token was cancelled; output so far is kept.
    Cancelled,
    /// The output quota was used up with work remaining.
    Truncated,
}

pub(crate) struct Engine<'d> {
    document: &'d Document,
    options: &'d RenderOptions,
    sink: OutputSink,
    partials: PartialStack,
    cancel: CancellationToken,
    deadline: Option<(Instant, Duration)>,
    aborted: bool,
    timed_out: bool,
    abandoned: bool,
}

impl<'d> Engine<'d> {
    pub(crate) fn new(
        document: &'d Document,
        options: &'d RenderOptions,
        cancel: CancellationToken,
    ) -> Self {
        Engine {
            document,
            options,
            sink: OutputSink::new(options.encoding, options.max_size),
            partials: PartialStack::new(options.partial_stack_size, options.overflow),
            cancel,
            deadline: options.timeout.map(|t| (Instant::now() + t, t)),
            aborted: false,
            timed_out: false,
            abandoned: false,
        }
    }

    pub(crate) fn into_sink(self) -> OutputSink {
        self.sink
    }

    pub(crate) async fn run(&mut self, data: Value) -> Result<Outcome, RenderError> {
        let document = self.document;
        let mut stack = vec![Work::Eval(&document.root, Context::root(data))];
        let mut evaluated = 0usize;

        while let Some(work) = stack.pop() {
            match work {
                Work::ExitPartial => self.partials.exit(),
                Work::Eval(node, ctx) => {
                    if self.should_stop() {
                        self.abandoned = true;
                        continue;
                    }
                    evaluated += 1;
                    self.eval(node, ctx, &mut stack).await?;
                }
            }
        }
        // A slow last node can overrun the deadline with nothing left to check it.
        self.check_deadline();

        debug!(
            nodes = evaluated,
            bytes = self.sink.bytes_written(),
            abandoned = self.abandoned,
            "render loop finished"
        );
        if self.timed_out {
            let limit = self.deadline.map(|(_, t)| t).unwrap_or_default();
            return Err(RenderError::Timeout(limit));
        }
        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        if self.sink.truncated() {
            return Ok(Outcome::Truncated);
        }
        Ok(Outcome::Completed)
    }

    fn check_deadline(&mut self) {
        if self.timed_out {
            return;
        }
        if let Some((at, _)) = self.deadline {
            if Instant::now() >= at {
                self.timed_out = true;
                self.aborted = true;
                self.cancel.cancel();
            }
        }
    }

    fn should_stop(&mut self) -> bool {
        self.check_deadline();
        // a quota filled exactly stops only once something tries to write past it
        self.aborted || self.cancel.is_cancelled() || self.sink.reached_limit()
    }

    async fn eval(
        &mut self,
        node: &'d Node,
        ctx: Arc<Context>,
        stack: &mut Vec<Work<'d>>,
    ) -> Result<(), RenderError> {
        match &node.kind {
            NodeKind::Content(text) => {
                self.sink.write(text);
                push_children(stack, node, ctx);
            }
            NodeKind::IsolatedScope => push_children(stack, node, ctx),
            NodeKind::PathPrint { path, escape } => {
                let resolved = ctx.resolve(path).await;
                let value = resolved.value().settle().await;
                self.print(&value, *escape);
                push_children(stack, node, resolved);
            }
            NodeKind::Scope(path) | NodeKind::InvertedScope(path) => {
                let resolved = ctx.resolve(path).await;
                let value = resolved.value().settle().await;
                let wanted = matches!(node.kind, NodeKind::Scope(_));
                if (self.options.truthiness)(&value) == wanted {
                    push_children(stack, node, resolved);
                }
            }
            NodeKind::Collection(path) => {
                let resolved = ctx.resolve(path).await;
                let value = resolved.value().settle().await;
                if !(self.options.truthiness)(&value) {
                    return Ok(());
                }
                let items = match value {
                    Value::List(items) => items,
                    Value::Object(ref object) => match object.elements() {
                        Some(items) => items,
                        None => return Err(not_enumerable(path.as_str(), &value)),
                    },
                    other => return Err(not_enumerable(path.as_str(), &other)),
                };

                let mut frames = Vec::with_capacity(items.len());
                let mut iter = items.into_iter().enumerate().peekable();
                while let Some((index, item)) = iter.next() {
                    let is_last = iter.peek().is_none();
                    frames.push(Context::item(&resolved, item, index, is_last));
                }
                for frame in frames.into_iter().rev() {
                    push_children(stack, node, frame);
                }
            }
            NodeKind::FormatterCall { path, arguments } => {
                let resolved = ctx.resolve(path).await;
                let next = match arguments {
                    None => resolved,
                    Some(args) => {
                        let args = evaluate_arguments(args, &ctx).await;
                        let value = dispatch::format(
                            &self.options.formatters,
                            resolved.value().clone(),
                            args,
                        )
                        .await?;
                        resolved.with_value(value)
                    }
                };
                push_children(stack, node, next);
            }
            NodeKind::PrintFormatterResult { escape } => {
                let value = ctx.value().settle().await;
                self.print(&value, *escape);
            }
            NodeKind::PartialDeclare { .. } => {}
            NodeKind::PartialInvoke(name) => {
                let document = self.document;
                let body = match document.partials.get(name) {
                    Some(PartialSlot::Ready(body)) => body,
                    Some(PartialSlot::Building) => {
                        return Err(RenderError::PartialNotReady(name.clone()))
                    }
                    None => return Err(RenderError::UnknownPartial(name.clone())),
                };
                if self.partials.enter(name)? {
                    stack.push(Work::ExitPartial);
                    stack.push(Work::Eval(body.as_ref(), ctx));
                }
            }
        }
        Ok(())
    }

    fn print(&mut self, value: &Value, escape: bool) {
        let text = match value {
            Value::Null if self.options.null_placeholder.is_empty() => return,
            Value::Null => self.options.null_placeholder.clone(),
            other => other.to_string(),
        };
        if escape && self.options.escape_html {
            self.sink.write(&escape_html(&text));
        } else {
            self.sink.write(&text);
        }
    }
}

fn push_children<'d>(stack: &mut Vec<Work<'d>>, node: &'d Node, ctx: Arc<Context>) {
    for child in node.children.iter().rev() {
        stack.push(Work::Eval(child, Arc::clone(&ctx)));
    }
}

fn not_enumerable(path: &str, value: &Value) -> RenderError {
    RenderError::NotEnumerable {
        path: path.to_owned(),
        type_name: value.type_name().to_owned(),
    }
}

async fn evaluate_arguments(args: &[FormatterArg], ctx: &Arc<Context>) -> Vec<CallArgument> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        let value = match &arg.value {
            ArgValue::Literal(literal) => literal_value(literal),
            ArgValue::Reference(path) => ctx.resolve(path).await.value().settle().await,
        };
        out.push(CallArgument {
            name: arg.name.clone(),
            value,
        });
    }
    out
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Text(s) => Value::Str(s.clone()),
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(template: &str, data: serde_json::Value) -> String {
        let document = whisker_core::parse(template).unwrap();
        let options = RenderOptions::default();
        let mut engine = Engine::new(&document, &options, CancellationToken::new());
        engine.run(Value::from(data)).await.unwrap();
        String::from_utf8(engine.into_sink().into_bytes()).unwrap()
    }

    #[test]
    fn escapes_the_html_specials() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }

    #[tokio::test]
    async fn renders_in_document_order() {
        let out = run(
            "{{#each xs}}[{{.}}{{#$last}}!{{/$last}}]{{/each}}",
            json!({"xs": [1, 2, 3]}),
        )
        .await;
        assert_eq!(out, "[1][2][3!]");
    }

    #[tokio::test]
    async fn deep_nesting_does_not_recurse() {
        let depth = 1000;
        let template = format!("{}x{}", "{{#.}}".repeat(depth), "{{/.}}".repeat(depth));
        let out = run(&template, json!({"a": true})).await;
        assert_eq!(out, "x");
    }

    #[tokio::test]
    async fn partial_frames_unwind_after_quota_stop() {
        let document = whisker_core::parse("{{#declare P}}abc{{/declare}}{{#include P}}{{#include P}}").unwrap();
        let options = RenderOptions::default().with_max_size(2);
        let mut engine = Engine::new(&document, &options, CancellationToken::new());
        let outcome = engine.run(Value::Null).await.unwrap();
        assert_eq!(outcome, Outcome::Truncated);
        assert_eq!(engine.partials.depth(), 0);
    }
}
