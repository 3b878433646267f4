//! whisker-eval -- renders compiled templates against dynamic data.
//!
//! A template is compiled once with [`compile`] and rendered any number of
//! times, concurrently if needed. Rendering walks the document tree with
//! an explicit work stack, resolves paths against a parent-linked
//! [`Context`] chain, dispatches formatter calls through a typed
//! [`FormatterRegistry`], and writes into a byte-quota [`OutputSink`].
//!
//! ```ignore
//! let template = whisker_eval::compile("Hello {{name}}!", RenderOptions::default())?;
//! let text = template.render_to_string(json!({"name": "world"})).await?;
//! ```

pub mod cancel;
pub mod context;
pub mod engine;
pub mod error;
pub mod formatter;
pub mod options;
pub mod partial;
pub mod sink;
pub mod template;
pub mod value;

pub use cancel::CancellationToken;
pub use context::{Context, ItemPosition};
pub use error::{BoxError, Error, RenderError};
pub use formatter::{
    AsyncFormatter, CallArgument, FormatterDescriptor, FormatterRegistry, Param, TypeSpec,
};
pub use options::{OverflowBehavior, RenderConfig, RenderOptions, Truthiness};
pub use sink::{Encoding, OutputSink};
pub use template::{compile, RenderOutput, Template};
pub use value::{is_truthy, LazyValue, Object, Value};

/// Compile `text` and render it once.
pub async fn render_once(
    text: &str,
    data: impl Into<Value>,
    options: RenderOptions,
) -> Result<String, Error> {
    let template = compile(text, options)?;
    Ok(template.render_to_string(data).await?)
}
