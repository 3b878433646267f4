use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a token inside the template text.
///
/// `line` and `character` are 1-based; `character` counts chars, not bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub character: u32,
    pub offset: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.character)
    }
}

/// Precomputed newline offsets for a template, used to turn byte offsets of
/// regex matches into line/character locations on demand.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    newlines: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let newlines = text
            .char_indices()
            .filter(|(_, c)| *c == '\n')
            .map(|(i, _)| i)
            .collect();
        LineIndex { text, newlines }
    }

    pub fn locate(&self, offset: usize) -> Location {
        let offset = offset.min(self.text.len());
        let preceding = self.newlines.partition_point(|&nl| nl < offset);
        let line_start = if preceding == 0 {
            0
        } else {
            self.newlines[preceding - 1] + 1
        };
        let character = self
            .text
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        Location {
            line: preceding as u32 + 1,
            character: character as u32 + 1,
            offset,
        }
    }
}

/// A single syntax error found while tokenizing or building a template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParseError {
    pub location: Location,
    /// The raw marker text the error was reported against.
    pub token: String,
    pub message: String,
}

impl ParseError {
    pub fn new(location: Location, token: impl Into<String>, message: impl Into<String>) -> Self {
        ParseError {
            location,
            token: token.into(),
            message: message.into(),
        }
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "line":      self.location.line,
            "character": self.location.character,
            "token":     self.token,
            "message":   self.message,
        })
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: {} (near '{}')",
            self.location, self.message, self.token
        )
    }
}

/// Every syntax error of one compile, raised together.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub struct CompileError {
    pub errors: Vec<ParseError>,
}

impl CompileError {
    pub fn new(errors: Vec<ParseError>) -> Self {
        CompileError { errors }
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::Value::Array(self.errors.iter().map(ParseError::to_json_value).collect())
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template has {} syntax error(s)", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  {}", err)?;
        }
        Ok(())
    }
}
