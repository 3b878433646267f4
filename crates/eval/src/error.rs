use std::time::Duration;

use whisker_core::CompileError;

/// Error type user formatters return; it reaches the caller unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while rendering a compiled template.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// `{{#each}}` over a value that is not a sequence.
    #[error("'{path}' is used like an array but resolves to {type_name}")]
    NotEnumerable { path: String, type_name: String },

    /// Partial nesting reached the configured stack size.
    #[error("partial stack overflow: {} nested includes reached the limit of {limit}", stack.len())]
    StackOverflow { limit: usize, stack: Vec<String> },

    /// The configured render timeout elapsed; partial output was discarded.
    #[error("render timed out after {0:?}")]
    Timeout(Duration),

    #[error("partial '{0}' is not declared")]
    UnknownPartial(String),

    /// The partial's body was still being built when it was invoked.
    #[error("partial '{0}' is used before its declaration is complete")]
    PartialNotReady(String),

    /// A registered formatter failed.
    #[error(transparent)]
    Formatter(BoxError),
}

/// Either stage of compile-then-render.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
