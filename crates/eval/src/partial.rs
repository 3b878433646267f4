//! Partial recursion control.
//!
//! Every `{{#include}}` pushes a `"{name}_{depth}"` frame; the engine pops it
//! once the partial's subtree is finished or abandoned.

use crate::error::RenderError;
use crate::options::OverflowBehavior;

#[derive(Debug)]
pub struct PartialStack {
    frames: Vec<String>,
    limit: usize,
    behavior: OverflowBehavior,
}

impl PartialStack {
    pub fn new(limit: usize, behavior: OverflowBehavior) -> Self {
        PartialStack {
            frames: Vec::new(),
            limit,
            behavior,
        }
    }

    /// Push a frame for `name`. Returns `Ok(true)` when the partial should be
    /// rendered; `Ok(false)` when the silent policy refused to descend (no
    /// frame is left pushed in that case).
    pub fn enter(&mut self, name: &str) -> Result<bool, RenderError> {
        let depth = self.frames.len();
        self.frames.push(format!("{}_{}", name, depth));
        if self.frames.len() < self.limit {
            return Ok(true);
        }
        let stack = self.frames.clone();
        self.frames.pop();
        match self.behavior {
            OverflowBehavior::Fail => Err(RenderError::StackOverflow {
                limit: self.limit,
                stack,
            }),
            OverflowBehavior::Silent => {
                tracing::warn!(
                    partial = name,
                    limit = self.limit,
                    "partial stack limit reached, include skipped"
                );
                Ok(false)
            }
        }
    }

    pub fn exit(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }
}
