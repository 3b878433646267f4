//! Render settings: a TOML file, then command-line overrides on top.

use std::path::Path;

use whisker_eval::{Encoding, OverflowBehavior, RenderConfig};

/// Settings given as flags. `None` leaves the file (or default) value alone.
#[derive(Debug, Clone, Default)]
pub(crate) struct Overrides {
    pub max_size: Option<usize>,
    pub encoding: Option<Encoding>,
    pub no_escape: bool,
    pub null: Option<String>,
    pub partial_stack_size: Option<usize>,
    pub overflow: Option<OverflowBehavior>,
    pub timeout_ms: Option<u64>,
}

pub(crate) fn load(path: Option<&Path>) -> Result<RenderConfig, String> {
    let Some(path) = path else {
        return Ok(RenderConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading config '{}': {}", path.display(), e))?;
    toml::from_str(&text).map_err(|e| format!("error parsing config '{}': {}", path.display(), e))
}

pub(crate) fn apply(mut config: RenderConfig, overrides: Overrides) -> RenderConfig {
    if let Some(max_size) = overrides.max_size {
        config.max_size = max_size;
    }
    if let Some(encoding) = overrides.encoding {
        config.encoding = encoding;
    }
    if overrides.no_escape {
        config.escape_html = false;
    }
    if let Some(null) = overrides.null {
        config.null = null;
    }
    if let Some(size) = overrides.partial_stack_size {
        config.partial_stack_size = size;
    }
    if let Some(overflow) = overrides.overflow {
        config.overflow = overflow;
    }
    if overrides.timeout_ms.is_some() {
        config.timeout_ms = overrides.timeout_ms;
    }
    config
}
