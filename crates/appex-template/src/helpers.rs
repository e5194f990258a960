//! Named template helpers.
//!
//! A helper receives its evaluated arguments and a fixed-shape
//! [`HelperCtx`], and returns text. Errors returned by a helper never leave
//! the renderer: they are logged and the helper's output becomes empty.

use std::collections::BTreeMap;
use std::rc::Rc;

use appex_error::{Error, Result};

use crate::json;
use crate::parse::Span;
use crate::value::Value;

/// Invocation details handed to every helper call.
#[derive(Debug, Clone, Copy)]
pub struct HelperCtx<'a> {
    /// Name the helper was invoked under.
    pub name: &'a str,
    /// Location of the invoking mustache.
    pub span: Span,
    /// Full source of the template being rendered.
    pub template: &'a str,
}

pub trait Helper {
    fn call(&self, args: &[Value], ctx: &HelperCtx<'_>) -> Result<String>;
}

impl<F> Helper for F
where
    F: Fn(&[Value], &HelperCtx<'_>) -> Result<String>,
{
    fn call(&self, args: &[Value], ctx: &HelperCtx<'_>) -> Result<String> {
        self(args, ctx)
    }
}

pub type HelperRef = Rc<dyn Helper>;

/// Helper name to implementation.
pub type Helpers = BTreeMap<String, HelperRef>;

/// Wrap a closure as a shareable helper.
pub fn helper<F>(f: F) -> HelperRef
where
    F: Fn(&[Value], &HelperCtx<'_>) -> Result<String> + 'static,
{
    Rc::new(f)
}

/// The helpers every exception starts with: `json`, `pad-start`, `pad-end`.
pub fn builtin_helpers() -> Helpers {
    let mut helpers = Helpers::new();
    helpers.insert("json".to_string(), helper(json_helper));
    helpers.insert(
        "pad-start".to_string(),
        helper(|args: &[Value], ctx: &HelperCtx<'_>| pad_helper(args, ctx, PadSide::Start)),
    );
    helpers.insert(
        "pad-end".to_string(),
        helper(|args: &[Value], ctx: &HelperCtx<'_>| pad_helper(args, ctx, PadSide::End)),
    );
    helpers
}

/// `{{{json value}}}` / `{{{json value indent}}}`
///
/// Cyclic edges are dropped with a warning naming the key and the template
/// location.
fn json_helper(args: &[Value], ctx: &HelperCtx<'_>) -> Result<String> {
    let value = args.first().cloned().unwrap_or_default();
    let indent = args
        .get(1)
        .and_then(Value::as_i64)
        .map(|n| n.clamp(0, 10) as usize)
        .unwrap_or(0);

    let converted = json::to_json_with(&value, &mut |key| {
        tracing::warn!(
            helper = ctx.name,
            key,
            location = %ctx.span,
            "template helper tried to stringify a cyclic object, omitting the cyclic reference"
        );
    });
    json::stringify(&converted, indent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PadSide {
    Start,
    End,
}

/// `{{pad-end width value}}` / `{{pad-end width fill value}}`
fn pad_helper(args: &[Value], ctx: &HelperCtx<'_>, side: PadSide) -> Result<String> {
    let (width, fill, value) = match args {
        [width, value] => (width, " ".to_string(), value),
        [width, fill, value] => (width, fill.to_template_text(), value),
        _ => {
            return Err(Error::invalid_argument(format!(
                "'{}' expects 2 or 3 arguments, got {}",
                ctx.name,
                args.len()
            )));
        }
    };
    let width = width
        .as_i64()
        .filter(|w| *w >= 0)
        .ok_or_else(|| Error::invalid_argument(format!("'{}' width must be a non-negative integer", ctx.name)))?
        as usize;

    Ok(pad(&value.to_template_text(), width, &fill, side))
}

fn pad(text: &str, width: usize, fill: &str, side: PadSide) -> String {
    let len = text.chars().count();
    if len >= width || fill.is_empty() {
        return text.to_string();
    }
    let padding: String = fill.chars().cycle().take(width - len).collect();
    match side {
        PadSide::Start => format!("{padding}{text}"),
        PadSide::End => format!("{text}{padding}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appex_error::ErrorKind;
    use serde_json::json;

    fn ctx(name: &str) -> HelperCtx<'_> {
        HelperCtx {
            name,
            span: Span::default(),
            template: "",
        }
    }

    fn call(name: &str, args: &[Value]) -> Result<String> {
        builtin_helpers()[name].call(args, &ctx(name))
    }

    #[test]
    fn pad_end_and_start_with_default_fill() {
        assert_eq!(call("pad-end", &[Value::Int(6), "abc".into()]).unwrap(), "abc   ");
        assert_eq!(call("pad-start", &[Value::Int(6), "abc".into()]).unwrap(), "   abc");
    }

    #[test]
    fn pad_with_multi_char_fill_is_truncated() {
        assert_eq!(
            call("pad-start", &[Value::Int(7), "xy".into(), "abc".into()]).unwrap(),
            "xyxyabc"
        );
        assert_eq!(
            call("pad-end", &[Value::Int(6), ".".into(), "abc".into()]).unwrap(),
            "abc..."
        );
    }

    #[test]
    fn pad_never_truncates_long_input() {
        assert_eq!(call("pad-end", &[Value::Int(2), "abcdef".into()]).unwrap(), "abcdef");
    }

    #[test]
    fn pad_rejects_bad_arguments() {
        let err = call("pad-end", &["wide".into(), "abc".into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = call("pad-start", &[Value::Int(3)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn json_helper_compact_and_indented() {
        let value = Value::from(json!({"a": 1, "b": "x"}));
        assert_eq!(call("json", &[value.clone()]).unwrap(), r#"{"a":1,"b":"x"}"#);
        assert_eq!(
            call("json", &[value, Value::Int(2)]).unwrap(),
            "{\n  \"a\": 1,\n  \"b\": \"x\"\n}"
        );
    }

    #[test]
    fn json_helper_drops_cycles() {
        let value = Value::from(json!({"a": 1}));
        value.insert("loop", value.clone());
        assert_eq!(call("json", &[value]).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn json_helper_without_arguments_renders_null() {
        assert_eq!(call("json", &[]).unwrap(), "null");
    }

    #[test]
    fn closures_are_helpers() {
        let shout = helper(|args: &[Value], _: &HelperCtx<'_>| {
            Ok(args.iter().map(|a| a.to_template_text().to_uppercase()).collect::<Vec<_>>().join(" "))
        });
        assert_eq!(shout.call(&["hi".into(), "there".into()], &ctx("shout")).unwrap(), "HI THERE");
    }
}
