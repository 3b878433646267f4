//! Compiled templates and the render entry points.

use std::sync::Arc;

use tracing::debug;
use whisker_core::{CompileError, Document};

use crate::cancel::CancellationToken;
use crate::engine::{Engine, Outcome};
use crate::error::RenderError;
use crate::options::RenderOptions;
use crate::sink::Encoding;
use crate::value::Value;

/// Compile template text. Every syntax error in `text` is reported at once,
/// including scopes nested deeper than `options.max_depth`.
pub fn compile(text: &str, options: RenderOptions) -> Result<Template, CompileError> {
    let document = whisker_core::parse_with_depth(text, options.max_depth)?;
    debug!(
        bytes = text.len(),
        partials = document.partials.len(),
        formatters = options.formatters.len(),
        "compiled template"
    );
    Ok(Template {
        document: Arc::new(document),
        options: Arc::new(options),
    })
}

/// A compiled template. Cheap to clone and safe to render from many tasks
/// at once; each render owns its own context chain, sink and partial stack.
#[derive(Debug, Clone)]
pub struct Template {
    document: Arc<Document>,
    options: Arc<RenderOptions>,
}

/// Encoded output of one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub bytes: Vec<u8>,
    pub encoding: Encoding,
    /// Output was cut at the size quota.
    pub truncated: bool,
    /// The caller cancelled the render; `bytes` holds what was written.
    pub cancelled: bool,
}

impl RenderOutput {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the bytes with the encoding they were written in.
    pub fn into_string(self) -> String {
        self.encoding.decode(&self.bytes)
    }
}

impl Template {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub async fn render(&self, data: impl Into<Value>) -> Result<RenderOutput, RenderError> {
        self.render_with_cancellation(data, &CancellationToken::new())
            .await
    }

    /// Render, stopping at the next checkpoint once `token` is cancelled.
    ///
    /// A configured timeout is tracked on a child of `token`: when it fires,
    /// the output written so far is discarded and `RenderError::Timeout` is
    /// returned. Caller cancellation keeps the partial output.
    pub async fn render_with_cancellation(
        &self,
        data: impl Into<Value>,
        token: &CancellationToken,
    ) -> Result<RenderOutput, RenderError> {
        let mut engine = Engine::new(&self.document, &self.options, token.child_token());
        let outcome = engine.run(data.into()).await?;
        let sink = engine.into_sink();
        let output = RenderOutput {
            encoding: sink.encoding(),
            truncated: sink.truncated(),
            cancelled: outcome == Outcome::Cancelled,
            bytes: sink.into_bytes(),
        };
        debug!(
            bytes = output.bytes.len(),
            encoding = %output.encoding,
            truncated = output.truncated,
            cancelled = output.cancelled,
            "render finished"
        );
        Ok(output)
    }

    pub async fn render_to_string(&self, data: impl Into<Value>) -> Result<String, RenderError> {
        Ok(self.render(data).await?.into_string())
    }
}
