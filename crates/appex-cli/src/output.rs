//! Output rendering.

use anyhow::Result;
use appex_core::Exception;

use crate::options::{OutputKind, OutputOptions};

const PRETTY_INDENT: usize = 2;

/// Render `exception` the way `opts` asks for.
pub fn render_output(exception: &Exception, opts: &OutputOptions) -> Result<String> {
    let text = match opts.output {
        OutputKind::Json => {
            let indent = if opts.pretty { PRETTY_INDENT } else { 0 };
            exception.to_json_string(indent)?
        }
        OutputKind::Message => exception.compiled_message()?.to_string(),
        OutputKind::Display => exception
            .compiled_display_message()?
            .map(str::to_string)
            .unwrap_or_default(),
    };
    Ok(text)
}
