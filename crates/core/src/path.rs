//! Path expressions: `a.b`, `.`, `../a`, `~root.x`, `$index`.
//!
//! Paths are validated once during tokenization and stored pre-split so the
//! renderer never re-parses them.

use std::fmt;

/// One navigation step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `~`: jump to the render root.
    Root,
    /// `..`: move to the parent context.
    Parent,
    /// `.`: the current value.
    This,
    /// A key looked up on the current value.
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    raw: String,
    segments: Vec<Segment>,
}

impl Path {
    /// Validate and split a raw path. The error is a human-readable reason.
    pub fn parse(raw: &str) -> Result<Path, String> {
        let raw = raw.trim();
        validate(raw)?;
        Ok(Path {
            raw: raw.to_owned(),
            segments: split(raw),
        })
    }

    /// The path that refers to the current value.
    pub fn this() -> Path {
        Path {
            raw: ".".to_owned(),
            segments: vec![Segment::This],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_this(&self) -> bool {
        self.segments.iter().all(|s| *s == Segment::This)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '/' | '_' | '$' | '?' | '-')
}

fn validate(raw: &str) -> Result<(), String> {
    if raw.is_empty() {
        return Err("path is empty".to_string());
    }
    let body = raw.strip_prefix('~').unwrap_or(raw);
    if let Some(c) = body.chars().find(|c| !is_path_char(*c)) {
        return Err(format!("invalid character '{}' in path '{}'", c, raw));
    }
    if body.contains("...") {
        return Err(format!("'...' is not a valid path segment in '{}'", raw));
    }

    // `..` may only appear as leading whole segments, each followed by `/`
    // (or ending the path).
    let mut rest = body;
    loop {
        if let Some(after) = rest.strip_prefix("../") {
            rest = after;
        } else if rest == ".." {
            rest = "";
            break;
        } else {
            break;
        }
    }
    if rest.contains('/') {
        return Err(format!(
            "'/' is only valid after a '..' segment in '{}'",
            raw
        ));
    }
    if rest.contains("..") {
        return Err(format!(
            "'..' must be a whole leading segment in '{}'",
            raw
        ));
    }
    Ok(())
}

fn split(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = raw;
    if let Some(after) = rest.strip_prefix('~') {
        segments.push(Segment::Root);
        rest = after;
    }
    loop {
        if let Some(after) = rest.strip_prefix("../") {
            segments.push(Segment::Parent);
            rest = after;
        } else if rest == ".." {
            segments.push(Segment::Parent);
            rest = "";
            break;
        } else {
            break;
        }
    }
    for part in rest.split('.') {
        if !part.is_empty() {
            segments.push(Segment::Name(part.to_owned()));
        }
    }
    if segments.is_empty() {
        segments.push(Segment::This);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(p: &Path) -> Vec<String> {
        p.segments()
            .iter()
            .map(|s| match s {
                Segment::Root => "~".to_string(),
                Segment::Parent => "..".to_string(),
                Segment::This => ".".to_string(),
                Segment::Name(n) => n.clone(),
            })
            .collect()
    }

    #[test]
    fn dotted_path_splits_on_dots() {
        let p = Path::parse("a.b.c").unwrap();
        assert_eq!(names(&p), vec!["a", "b", "c"]);
    }

    #[test]
    fn dot_is_this() {
        let p = Path::parse(".").unwrap();
        assert!(p.is_this());
        assert_eq!(names(&p), vec!["."]);
    }

    #[test]
    fn parent_and_root_segments() {
        let p = Path::parse("../../x.y").unwrap();
        assert_eq!(names(&p), vec!["..", "..", "x", "y"]);
        let p = Path::parse("~data.name").unwrap();
        assert_eq!(names(&p), vec!["~", "data", "name"]);
        let p = Path::parse("..").unwrap();
        assert_eq!(names(&p), vec![".."]);
    }

    #[test]
    fn collection_metadata_is_a_plain_name() {
        let p = Path::parse("$index").unwrap();
        assert_eq!(names(&p), vec!["$index"]);
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(Path::parse("").is_err());
        assert!(Path::parse("a...b").is_err());
        assert!(Path::parse("a/b").is_err());
        assert!(Path::parse("/a").is_err());
        assert!(Path::parse("a..b").is_err());
        assert!(Path::parse("a/../b").is_err());
        assert!(Path::parse("a b").is_err());
        assert!(Path::parse("a~b").is_err());
    }
}
