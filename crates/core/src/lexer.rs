//! Template tokenizer.
//!
//! A single regex pass finds `{{...}}` / `{{{...}}}` markers; everything in
//! between is literal content. Each marker is classified by its prefix and
//! checked against a stack of open scopes. Syntax errors are collected rather
//! than returned one at a time, and their locations are only computed when an
//! error is actually recorded.

use std::sync::LazyLock;

use regex::Regex;

use crate::ast::{ArgValue, FormatterArg, Literal};
use crate::error::{CompileError, LineIndex, ParseError};
use crate::path::Path;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{\{(.+?)\}\}\}|\{\{(.+?)\}\}").expect("marker pattern is valid")
});

/// A path immediately followed by an opening parenthesis.
static FORMATTER_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w.~/$?\-]*\s*\(").expect("formatter pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Content,
    EscapedValue,
    UnescapedValue,
    ScopeOpen,
    InvertedScopeOpen,
    ScopeClose,
    CollectionOpen,
    CollectionClose,
    FormatterCall,
    PrintFormattedResult,
    PrintUnescapedResult,
    PartialOpen,
    PartialClose,
    RenderPartial,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Literal text for `Content`, the raw path or partial name otherwise.
    pub value: String,
    /// Parsed path for tokens that address data.
    pub path: Option<Path>,
    /// Arguments of a `FormatterCall`; `None` for a plain path hop.
    pub arguments: Option<Vec<FormatterArg>>,
    /// Byte offset of the originating marker.
    pub offset: usize,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>, offset: usize) -> Self {
        Token {
            kind,
            value: value.into(),
            path: None,
            arguments: None,
            offset,
        }
    }

    fn with_path(mut self, path: Path) -> Self {
        self.path = Some(path);
        self
    }
}

/// Token stream plus every syntax error found while producing it.
#[derive(Debug, Clone, Default)]
pub struct Tokenized {
    pub tokens: Vec<Token>,
    pub errors: Vec<ParseError>,
}

/// Deepest scope nesting accepted by [`lex`] and [`tokenize`].
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Tokenize and raise all collected errors together.
pub fn lex(text: &str) -> Result<Vec<Token>, CompileError> {
    lex_with_depth(text, DEFAULT_MAX_DEPTH)
}

/// [`lex`] with an explicit limit on how deeply scopes, collections and
/// partial declarations may nest.
pub fn lex_with_depth(text: &str, max_depth: usize) -> Result<Vec<Token>, CompileError> {
    let Tokenized { tokens, errors } = tokenize_with_depth(text, max_depth);
    if errors.is_empty() {
        tracing::debug!(tokens = tokens.len(), "tokenized template");
        Ok(tokens)
    } else {
        tracing::debug!(errors = errors.len(), "template has syntax errors");
        Err(CompileError::new(errors))
    }
}

pub fn tokenize(text: &str) -> Tokenized {
    tokenize_with_depth(text, DEFAULT_MAX_DEPTH)
}

pub fn tokenize_with_depth(text: &str, max_depth: usize) -> Tokenized {
    let mut tokenizer = Tokenizer::new(text, max_depth);
    let mut last = 0usize;
    for caps in MARKER.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            tokenizer.push(Token::new(
                TokenKind::Content,
                &text[last..whole.start()],
                last,
            ));
        }
        last = whole.end();
        if let Some(inner) = caps.get(1) {
            tokenizer.triple(whole.start(), whole.as_str(), inner.as_str());
        } else if let Some(inner) = caps.get(2) {
            tokenizer.marker(whole.start(), whole.as_str(), inner.as_str());
        }
    }
    if last < text.len() {
        tokenizer.push(Token::new(TokenKind::Content, &text[last..], last));
    }
    tokenizer.finish()
}

// ──────────────────────────────────────────────
// Tokenizer state
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Section,
    Collection,
    Partial,
}

#[derive(Debug)]
struct OpenScope {
    kind: ScopeKind,
    name: String,
    marker: String,
    offset: usize,
}

impl OpenScope {
    fn closing_name(&self) -> &str {
        match self.kind {
            ScopeKind::Section => &self.name,
            ScopeKind::Collection => "each",
            ScopeKind::Partial => "declare",
        }
    }
}

struct Tokenizer<'a> {
    lines: LineIndex<'a>,
    tokens: Vec<Token>,
    errors: Vec<ParseError>,
    scopes: Vec<OpenScope>,
    max_depth: usize,
    declared: Vec<String>,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str, max_depth: usize) -> Self {
        Tokenizer {
            lines: LineIndex::new(text),
            tokens: Vec::new(),
            errors: Vec::new(),
            scopes: Vec::new(),
            max_depth,
            declared: Vec::new(),
        }
    }

    fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    fn error(&mut self, offset: usize, marker: &str, message: impl Into<String>) {
        let location = self.lines.locate(offset);
        self.errors.push(ParseError::new(location, marker, message));
    }

    fn finish(mut self) -> Tokenized {
        let open = std::mem::take(&mut self.scopes);
        for scope in open {
            let message = format!(
                "'{}' is never closed (expected '{{{{/{}}}}}')",
                scope.marker,
                scope.closing_name()
            );
            self.error(scope.offset, &scope.marker, message);
        }
        Tokenized {
            tokens: self.tokens,
            errors: self.errors,
        }
    }

    /// Open a scope. Crossing the depth limit is reported once, at the
    /// marker that crosses it.
    fn enter(&mut self, scope: OpenScope) {
        if self.scopes.len() == self.max_depth {
            let message = format!("scopes nest deeper than {} levels", self.max_depth);
            self.error(scope.offset, &scope.marker, message);
        }
        self.scopes.push(scope);
    }

    fn triple(&mut self, offset: usize, marker: &str, inner: &str) {
        self.print(offset, marker, inner.trim(), false);
    }

    fn marker(&mut self, offset: usize, marker: &str, inner: &str) {
        let payload = inner.trim();
        if payload.starts_with('!') {
            return;
        }
        if let Some(rest) = payload.strip_prefix('#') {
            self.open(offset, marker, rest.trim());
        } else if let Some(rest) = payload.strip_prefix('^') {
            self.section(offset, marker, rest.trim(), TokenKind::InvertedScopeOpen);
        } else if let Some(rest) = payload.strip_prefix('/') {
            self.close(offset, marker, rest.trim());
        } else if let Some(rest) = payload.strip_prefix('&') {
            self.print(offset, marker, rest.trim(), false);
        } else {
            self.print(offset, marker, payload, true);
        }
    }

    /// A printing marker: either a plain path or a formatter chain whose
    /// result is printed.
    fn print(&mut self, offset: usize, marker: &str, raw: &str, escape: bool) {
        if FORMATTER_CALL.is_match(raw) {
            if self.formatter_chain(offset, marker, raw) {
                let kind = if escape {
                    TokenKind::PrintFormattedResult
                } else {
                    TokenKind::PrintUnescapedResult
                };
                self.push(Token::new(kind, "", offset));
            }
        } else {
            let kind = if escape {
                TokenKind::EscapedValue
            } else {
                TokenKind::UnescapedValue
            };
            self.value(offset, marker, raw, kind);
        }
    }

    fn value(&mut self, offset: usize, marker: &str, raw: &str, kind: TokenKind) {
        match Path::parse(raw) {
            Ok(path) => self.push(Token::new(kind, raw, offset).with_path(path)),
            Err(msg) => self.error(offset, marker, msg),
        }
    }

    fn open(&mut self, offset: usize, marker: &str, rest: &str) {
        if let Some(name) = keyword(rest, "declare") {
            if name.is_empty() {
                self.error(offset, marker, "partial declaration requires a name");
            } else {
                self.declared.push(name.to_owned());
                self.push(Token::new(TokenKind::PartialOpen, name, offset));
            }
            self.enter(OpenScope {
                kind: ScopeKind::Partial,
                name: name.to_owned(),
                marker: marker.to_owned(),
                offset,
            });
        } else if let Some(name) = keyword(rest, "include") {
            if name.is_empty() {
                self.error(offset, marker, "include requires a partial name");
            } else if !self.declared.iter().any(|d| d == name) {
                self.error(
                    offset,
                    marker,
                    format!("partial '{}' is included before it is declared", name),
                );
            } else {
                self.push(Token::new(TokenKind::RenderPartial, name, offset));
            }
        } else if let Some(expr) = keyword(rest, "each") {
            self.enter(OpenScope {
                kind: ScopeKind::Collection,
                name: expr.to_owned(),
                marker: marker.to_owned(),
                offset,
            });
            if expr.is_empty() {
                self.error(offset, marker, "'each' requires a path");
            } else if FORMATTER_CALL.is_match(expr) {
                if self.formatter_chain(offset, marker, expr) {
                    self.push(
                        Token::new(TokenKind::CollectionOpen, ".", offset).with_path(Path::this()),
                    );
                }
            } else {
                self.value(offset, marker, expr, TokenKind::CollectionOpen);
            }
        } else {
            self.section(offset, marker, rest, TokenKind::ScopeOpen);
        }
    }

    fn section(&mut self, offset: usize, marker: &str, raw: &str, kind: TokenKind) {
        self.enter(OpenScope {
            kind: ScopeKind::Section,
            name: raw.to_owned(),
            marker: marker.to_owned(),
            offset,
        });
        if raw.is_empty() {
            self.error(offset, marker, "scope requires a path");
        } else {
            self.value(offset, marker, raw, kind);
        }
    }

    fn close(&mut self, offset: usize, marker: &str, name: &str) {
        let (kind, token_kind) = match name {
            "declare" => (ScopeKind::Partial, TokenKind::PartialClose),
            "each" => (ScopeKind::Collection, TokenKind::CollectionClose),
            _ => (ScopeKind::Section, TokenKind::ScopeClose),
        };
        let Some(top) = self.scopes.pop() else {
            self.error(
                offset,
                marker,
                format!("'{}' closes a scope that was never opened", marker),
            );
            return;
        };
        let matches = top.kind == kind && (kind != ScopeKind::Section || top.name == name);
        if matches {
            self.push(Token::new(token_kind, name, offset));
        } else {
            self.error(
                offset,
                marker,
                format!(
                    "expected '{{{{/{}}}}}' to close '{}' but found '{}'",
                    top.closing_name(),
                    top.marker,
                    marker
                ),
            );
        }
    }

    /// Emit one `FormatterCall` token per chained step. Returns false (after
    /// recording an error) when the expression is malformed.
    fn formatter_chain(&mut self, offset: usize, marker: &str, expr: &str) -> bool {
        let steps = match split_chain(expr) {
            Ok(steps) => steps,
            Err(msg) => {
                self.error(offset, marker, msg);
                return false;
            }
        };
        let mut tokens = Vec::with_capacity(steps.len());
        for (raw_path, raw_args) in steps {
            let raw_path = if raw_path.is_empty() { "." } else { raw_path };
            let path = match Path::parse(raw_path) {
                Ok(p) => p,
                Err(msg) => {
                    self.error(offset, marker, msg);
                    return false;
                }
            };
            let arguments = match raw_args.map(split_arguments).transpose() {
                Ok(args) => args,
                Err(msg) => {
                    self.error(offset, marker, msg);
                    return false;
                }
            };
            let mut token = Token::new(TokenKind::FormatterCall, raw_path, offset).with_path(path);
            token.arguments = arguments;
            tokens.push(token);
        }
        self.tokens.extend(tokens);
        true
    }
}

/// `keyword("each items", "each") == Some("items")`; the keyword must be the
/// whole payload or be followed by whitespace.
fn keyword<'s>(rest: &'s str, kw: &str) -> Option<&'s str> {
    let after = rest.strip_prefix(kw)?;
    if after.is_empty() {
        Some("")
    } else if after.starts_with(char::is_whitespace) {
        Some(after.trim())
    } else {
        None
    }
}

// ──────────────────────────────────────────────
// Formatter expressions
// ──────────────────────────────────────────────

/// Split `a.b(x)(y).c(z).d` into `[("a.b", Some("x")), ("", Some("y")),
/// ("c", Some("z")), ("d", None)]`.
fn split_chain(expr: &str) -> Result<Vec<(&str, Option<&str>)>, String> {
    let mut steps = Vec::new();
    let mut rest = expr.trim();
    let mut first = true;
    while !rest.is_empty() {
        if !first {
            if let Some(after) = rest.strip_prefix('.') {
                rest = after;
            } else if !rest.starts_with('(') {
                return Err(format!("unexpected '{}' after formatter call", rest));
            }
        }
        first = false;
        let Some(open) = rest.find('(') else {
            steps.push((rest.trim(), None));
            break;
        };
        let close = matching_paren(rest, open)?;
        steps.push((rest[..open].trim(), Some(&rest[open + 1..close])));
        rest = rest[close + 1..].trim_start();
    }
    Ok(steps)
}

fn matching_paren(s: &str, open: usize) -> Result<usize, String> {
    let body = &s[open..];
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    // start of the argument being scanned, relative to `body`
    let mut piece = 0usize;
    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' if at_value_start(&body[piece..i]) => quote = Some(c),
            '(' => {
                depth += 1;
                piece = i + 1;
            }
            ',' => piece = i + 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(open + i);
                }
            }
            _ => {}
        }
    }
    if quote.is_some() {
        Err("unterminated string literal in formatter arguments".to_string())
    } else {
        Err("unbalanced parentheses in formatter call".to_string())
    }
}

/// True while only whitespace and an optional `[Name]` prefix have been read.
fn at_value_start(buf: &str) -> bool {
    let t = buf.trim();
    t.is_empty() || (t.starts_with('[') && t.ends_with(']') && t[1..t.len() - 1].find(']').is_none())
}

/// Split a formatter argument list on top-level commas, honouring quoted
/// literals with backslash escapes.
pub fn split_arguments(text: &str) -> Result<Vec<FormatterArg>, String> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut pieces = Vec::new();
    let mut buf = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        if let Some(q) = quote {
            buf.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            ',' => pieces.push(std::mem::take(&mut buf)),
            '"' | '\'' if at_value_start(&buf) => {
                quote = Some(c);
                buf.push(c);
            }
            _ => buf.push(c),
        }
    }
    if quote.is_some() {
        return Err("unterminated string literal in formatter arguments".to_string());
    }
    pieces.push(buf);
    pieces.iter().map(|p| parse_argument(p)).collect()
}

fn parse_argument(piece: &str) -> Result<FormatterArg, String> {
    let mut piece = piece.trim();
    let mut name = None;
    if let Some(after) = piece.strip_prefix('[') {
        let end = after
            .find(']')
            .ok_or_else(|| format!("unterminated argument name in '{}'", piece))?;
        let n = after[..end].trim();
        if n.is_empty() {
            return Err("argument name must not be empty".to_string());
        }
        name = Some(n.to_owned());
        piece = after[end + 1..].trim();
    }
    if piece.is_empty() {
        return Err("formatter argument is empty".to_string());
    }

    let first = piece.chars().next().unwrap_or_default();
    let value = if first == '"' || first == '\'' {
        let inner = &piece[1..];
        let end = closing_quote(inner, first)
            .ok_or_else(|| format!("unterminated string literal '{}'", piece))?;
        if !inner[end + 1..].trim().is_empty() {
            return Err(format!("unexpected text after quoted argument '{}'", piece));
        }
        ArgValue::Literal(Literal::Text(unescape(&inner[..end])))
    } else if piece.len() >= 2 && piece.starts_with('$') && piece.ends_with('$') {
        ArgValue::Reference(Path::parse(&piece[1..piece.len() - 1])?)
    } else {
        ArgValue::Literal(bare_literal(piece))
    };
    Ok(FormatterArg { name, value })
}

fn closing_quote(s: &str, q: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == q {
            return Some(i);
        }
    }
    None
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn bare_literal(s: &str) -> Literal {
    match s {
        "true" => Literal::Bool(true),
        "false" => Literal::Bool(false),
        "null" => Literal::Null,
        _ => {
            if let Ok(i) = s.parse::<i64>() {
                Literal::Int(i)
            } else if let Ok(f) = s.parse::<f64>() {
                Literal::Float(f)
            } else {
                Literal::Text(s.to_owned())
            }
        }
    }
}
