use appex_error::{Error, Result};

use crate::helpers::{HelperCtx, Helpers};
use crate::parse::{Expr, Mustache, Node, PathExpr, Template};
use crate::value::Value;

/// Render a parsed template against `context`.
///
/// `source` is the text `template` was parsed from; helpers see it through
/// [`HelperCtx::template`].
pub fn render(template: &Template, source: &str, context: &Value, helpers: &Helpers) -> Result<String> {
    let mut out = String::new();
    for node in &template.nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Mustache(m) => {
                let text = render_mustache(m, source, context, helpers)?;
                if m.escaped {
                    escape_html_into(&text, &mut out);
                } else {
                    out.push_str(&text);
                }
            }
        }
    }
    Ok(out)
}

fn render_mustache(m: &Mustache, source: &str, context: &Value, helpers: &Helpers) -> Result<String> {
    if let Some(helper) = m.head.helper_name().and_then(|name| helpers.get(name)) {
        let args: Vec<Value> = m.params.iter().map(|p| eval(p, context)).collect();
        let ctx = HelperCtx {
            name: &m.head.original,
            span: m.span,
            template: source,
        };
        return Ok(match helper.call(&args, &ctx) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    helper = %m.head.original,
                    location = %m.span,
                    error = %err,
                    "template helper failed, rendering empty output"
                );
                String::new()
            }
        });
    }

    if !m.params.is_empty() {
        return Err(Error::missing_helper(m.head.original.clone())
            .with_operation("template::render")
            .with_context("line", m.span.start.line.to_string())
            .with_context("column", m.span.start.column.to_string()));
    }

    Ok(lookup(&m.head, context).to_template_text())
}

fn eval(expr: &Expr, context: &Value) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Path(p) => lookup(p, context),
    }
}

/// Resolve a dotted path; any missing step yields `Null`.
pub fn lookup(path: &PathExpr, context: &Value) -> Value {
    let mut current = context.clone();
    for segment in &path.segments {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current
}

/// HTML-escape `text` the way mustache `{{ }}` interpolation does.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_html_into(text, &mut out);
    out
}

fn escape_html_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            c => out.push(c),
        }
    }
}
