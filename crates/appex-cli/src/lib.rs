//! appex command-line interface.
//!
pub mod options;
pub mod output;

use std::rc::Rc;

use anyhow::{Context, Result, bail};
use appex_core::{ConfigInput, Exception, ExceptionClass, Map, PropName, PropValue, Value};

pub use options::{ClassOptions, FieldOptions, OutputKind, OutputOptions};
pub use output::render_output;

/// Options for running appex.
#[derive(Debug, Clone, Default)]
pub struct AppexOptions {
    pub config: Option<String>,
    pub class: ClassOptions,
    pub fields: FieldOptions,
    pub output: OutputOptions,
}

/// Main entry point: build one exception and render it.
pub fn run_main(opts: &AppexOptions) -> Result<String> {
    let input = build_input(opts)?;
    let class = build_class(&opts.class);
    let exception = class.create(input);
    tracing::debug!(id = %exception.id(), class = exception.constructor_name(), "exception built");
    render_output(&exception, &opts.output)
}

/// The class chain `ApplicationException -> parents... -> class`.
pub fn build_class(opts: &ClassOptions) -> Rc<ExceptionClass> {
    let mut class = ExceptionClass::base();
    for parent in &opts.parents {
        class = class.subclass(parent.as_str()).build();
    }
    if opts.class != class.name() {
        class = class.subclass(opts.class.as_str()).build();
    }
    class
}

/// Config file first, flags on top.
pub fn build_input(opts: &AppexOptions) -> Result<ConfigInput> {
    let mut input = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
            let json: serde_json::Value =
                serde_json::from_str(&text).with_context(|| format!("config {path} is not valid JSON"))?;
            ConfigInput::from_json(&json).with_context(|| format!("config {path} is not an exception config"))?
        }
        None => ConfigInput::new(),
    };

    let fields = &opts.fields;
    if let Some(message) = &fields.message {
        input = input.message(message.as_str());
    }
    if let Some(display) = &fields.display_message {
        input = input.display_message(display.as_str());
    }
    if let Some(code) = &fields.code {
        input = input.code(code.as_str());
    }
    if let Some(num_code) = fields.num_code {
        input = input.num_code(num_code);
    }
    if let Some(prefix) = &fields.id_prefix {
        input = input.id_prefix(prefix.as_str());
    }
    if let Some(body) = &fields.id_body {
        input = input.id_body(body.as_str());
    }
    if fields.use_class_name_as_code {
        input = input.use_class_name_as_code(true);
    }
    if fields.use_message_as_display_message {
        input = input.use_message_as_display_message(true);
    }
    if let Some(format) = fields.timestamp_format {
        input = input.timestamp_format_in_json(format);
    }
    if !fields.details.is_empty() {
        let mut details: Map = input
            .get(PropName::Details)
            .and_then(PropValue::as_details)
            .cloned()
            .unwrap_or_default();
        for entry in &fields.details {
            let (key, value) = parse_detail(entry)?;
            details.insert(key, value);
        }
        input = input.details(details);
    }
    for cause in &fields.causes {
        input = input.caused_by(cause.as_str());
    }
    Ok(input)
}

/// `key=value`, value read as JSON when possible.
pub fn parse_detail(entry: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = entry.split_once('=') else {
        bail!("detail '{entry}' must look like key=value");
    };
    if key.is_empty() {
        bail!("detail '{entry}' has an empty key");
    }
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(raw));
    Ok((key.to_string(), value))
}

/// The exception itself, for callers that want more than the rendered text.
pub fn build_exception(opts: &AppexOptions) -> Result<Exception> {
    let input = build_input(opts)?;
    Ok(build_class(&opts.class).create(input))
}
