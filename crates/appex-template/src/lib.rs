//! Mustache-style templating for exception messages.
//!
//! The engine is deliberately logic-less: interpolation, raw interpolation
//! and named helper calls. The [`TemplateEngine`] trait is the seam callers
//! plug alternative engines into.

pub mod helpers;
pub mod json;
pub mod parse;
pub mod render;
pub mod value;

use appex_error::Result;

pub use helpers::{Helper, HelperCtx, HelperRef, Helpers, builtin_helpers, helper};
pub use parse::{Pos, Span, Template, parse};
pub use value::{Map, Value, float_to_i64};

/// Renders a template source against a context and a helper set.
///
/// Implementations must return syntax problems as `Err` and must not let
/// helper failures escape.
pub trait TemplateEngine {
    fn render(&self, source: &str, context: &Value, helpers: &Helpers) -> Result<String>;
}

/// The built-in engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct MustacheEngine;

impl TemplateEngine for MustacheEngine {
    fn render(&self, source: &str, context: &Value, helpers: &Helpers) -> Result<String> {
        let template = parse::parse(source)?;
        render::render(&template, source, context, helpers)
    }
}
