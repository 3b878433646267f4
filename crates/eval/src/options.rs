//! Render configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::formatter::FormatterRegistry;
use crate::sink::Encoding;
use crate::value::{is_truthy, Value};

/// What happens when partial includes nest deeper than the stack size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowBehavior {
    /// Abort the render with `RenderError::StackOverflow`.
    #[default]
    Fail,
    /// Skip the include and keep rendering.
    Silent,
}

pub type Truthiness = fn(&Value) -> bool;

/// Immutable options shared by every render of a compiled template.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub encoding: Encoding,
    /// Maximum encoded output size in bytes; 0 is unlimited.
    pub max_size: usize,
    /// Written in place of null values.
    pub null_placeholder: String,
    /// HTML-escape `{{value}}` output. Triple-brace and `&` output is never
    /// escaped.
    pub escape_html: bool,
    pub partial_stack_size: usize,
    pub overflow: OverflowBehavior,
    /// Deepest scope nesting `compile` accepts.
    pub max_depth: usize,
    pub timeout: Option<Duration>,
    /// Per-template formatters, consulted before the global defaults.
    pub formatters: Arc<FormatterRegistry>,
    pub truthiness: Truthiness,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            encoding: Encoding::Utf8,
            max_size: 0,
            null_placeholder: String::new(),
            escape_html: true,
            partial_stack_size: 255,
            overflow: OverflowBehavior::Fail,
            max_depth: whisker_core::DEFAULT_MAX_DEPTH,
            timeout: None,
            formatters: Arc::new(FormatterRegistry::new()),
            truthiness: is_truthy,
        }
    }
}

impl RenderOptions {
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_null_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.null_placeholder = placeholder.into();
        self
    }

    pub fn with_escape_html(mut self, escape: bool) -> Self {
        self.escape_html = escape;
        self
    }

    pub fn with_partial_stack_size(mut self, size: usize) -> Self {
        self.partial_stack_size = size;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowBehavior) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Install the formatter set. The registry is frozen from here on: it is
    /// only reachable through a shared pointer.
    pub fn with_formatters(mut self, formatters: FormatterRegistry) -> Self {
        self.formatters = Arc::new(formatters);
        self
    }

    pub fn with_truthiness(mut self, truthiness: Truthiness) -> Self {
        self.truthiness = truthiness;
        self
    }
}

/// File-loadable mirror of the scalar render options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub encoding: Encoding,
    pub max_size: usize,
    pub null: String,
    pub escape_html: bool,
    pub partial_stack_size: usize,
    pub overflow: OverflowBehavior,
    pub max_depth: usize,
    pub timeout_ms: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let defaults = RenderOptions::default();
        RenderConfig {
            encoding: defaults.encoding,
            max_size: defaults.max_size,
            null: defaults.null_placeholder,
            escape_html: defaults.escape_html,
            partial_stack_size: defaults.partial_stack_size,
            overflow: defaults.overflow,
            max_depth: defaults.max_depth,
            timeout_ms: None,
        }
    }
}

impl RenderConfig {
    pub fn into_options(self) -> RenderOptions {
        let mut options = RenderOptions::default()
            .with_encoding(self.encoding)
            .with_max_size(self.max_size)
            .with_null_placeholder(self.null)
            .with_escape_html(self.escape_html)
            .with_partial_stack_size(self.partial_stack_size)
            .with_overflow(self.overflow)
            .with_max_depth(self.max_depth);
        if let Some(ms) = self.timeout_ms {
            options = options.with_timeout(Duration::from_millis(ms));
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let o = RenderOptions::default();
        assert_eq!(o.max_size, 0);
        assert!(o.escape_html);
        assert_eq!(o.partial_stack_size, 255);
        assert_eq!(o.overflow, OverflowBehavior::Fail);
        assert!(o.timeout.is_none());
        assert!(o.formatters.is_empty());
    }

    #[test]
    fn config_loads_from_toml_with_defaults() {
        let config: RenderConfig = toml::from_str(
            r#"
            max_size = 64
            encoding = "utf-16le"
            overflow = "silent"
            timeout_ms = 250
            max_depth = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.max_size, 64);
        assert_eq!(config.encoding, Encoding::Utf16Le);
        assert!(config.escape_html);
        let options = config.into_options();
        assert_eq!(options.overflow, OverflowBehavior::Silent);
        assert_eq!(options.timeout, Some(Duration::from_millis(250)));
        assert_eq!(options.partial_stack_size, 255);
        assert_eq!(options.max_depth, 16);
    }
}
