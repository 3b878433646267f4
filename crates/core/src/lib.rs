//! whisker-core: template tokenizer and document builder.
//!
//! Turns Mustache-style template text into an immutable [`Document`] tree
//! that `whisker-eval` renders.
//!
//! # Public API
//!
//! - [`lex()`] / [`tokenize()`] -- template text to token stream
//! - [`build()`] -- token stream to [`Document`]
//! - [`parse()`] -- both steps at once; [`parse_with_depth()`] bounds nesting
//! - [`CompileError`] -- every syntax error of one compile, with locations

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod path;

// ── Convenience re-exports ───────────────────────────────────────────

pub use ast::{ArgValue, Document, FormatterArg, Literal, Node, NodeKind, PartialSlot, PartialTable};
pub use error::{CompileError, LineIndex, Location, ParseError};
pub use lexer::{
    lex, lex_with_depth, tokenize, tokenize_with_depth, Token, TokenKind, Tokenized,
    DEFAULT_MAX_DEPTH,
};
pub use parser::{build, parse, parse_with_depth};
pub use path::{Path, Segment};
