//! Causes and their structured reports.

use std::error::Error as StdError;
use std::fmt;

use appex_error::{Error, Result};
use appex_template::{Value, json};
use serde_json::json;

use crate::exception::Exception;

/// Format tag carried by every cause report.
pub const CAUSE_REPORT_VERSION: &str = "appex-cause/v0.1";

/// A previously caught value that contributed to an exception.
pub enum Cause {
    Exception(Box<Exception>),
    Error {
        type_name: String,
        error: Box<dyn StdError + 'static>,
    },
    Value(Value),
}

impl Cause {
    /// Record a standard error, keeping its type name for reports.
    pub fn error<E>(error: E) -> Self
    where
        E: StdError + 'static,
    {
        Cause::Error {
            type_name: short_type_name(std::any::type_name::<E>()),
            error: Box::new(error),
        }
    }

    /// Type name a report uses for `constructor_name`.
    pub fn type_name(&self) -> Option<String> {
        match self {
            Cause::Exception(e) => Some(e.constructor_name().to_string()),
            Cause::Error { type_name, .. } => Some(type_name.clone()),
            Cause::Value(value) => match value {
                Value::Null => None,
                Value::Bool(_) => Some("Boolean".to_string()),
                Value::Int(_) | Value::Float(_) => Some("Number".to_string()),
                Value::String(_) => Some("String".to_string()),
                Value::List(_) => Some("Array".to_string()),
                Value::Map(_) => Some("Object".to_string()),
            },
        }
    }

    pub fn is_error_like(&self) -> bool {
        !matches!(self, Cause::Value(_))
    }

    /// The message a wrapper adopts: the error text, or a string `message`
    /// entry of a map value.
    pub fn message(&self) -> Option<String> {
        match self {
            Cause::Exception(e) => Some(e.raw_message().to_string()),
            Cause::Error { error, .. } => Some(error.to_string()),
            Cause::Value(value) => value.get("message").and_then(|m| m.as_str().map(str::to_string)),
        }
    }

    pub fn as_std_error(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Cause::Exception(e) => Some(&**e),
            Cause::Error { error, .. } => Some(&**error),
            Cause::Value(_) => None,
        }
    }
}

fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Exception(e) => f.debug_tuple("Exception").field(&e.id()).finish(),
            Cause::Error { type_name, error } => f
                .debug_struct("Error")
                .field("type_name", type_name)
                .field("error", &error.to_string())
                .finish(),
            Cause::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

impl From<Exception> for Cause {
    fn from(e: Exception) -> Self {
        Cause::Exception(Box::new(e))
    }
}

impl From<Value> for Cause {
    fn from(value: Value) -> Self {
        Cause::Value(value)
    }
}

impl From<serde_json::Value> for Cause {
    fn from(value: serde_json::Value) -> Self {
        Cause::Value(value.into())
    }
}

impl From<&str> for Cause {
    fn from(s: &str) -> Self {
        Cause::Value(s.into())
    }
}

impl From<String> for Cause {
    fn from(s: String) -> Self {
        Cause::Value(s.into())
    }
}

impl From<Error> for Cause {
    fn from(e: Error) -> Self {
        Cause::error(e)
    }
}

impl From<std::io::Error> for Cause {
    fn from(e: std::io::Error) -> Self {
        Cause::error(e)
    }
}

/// Turns one cause into a structured JSON report.
pub trait CauseReporter {
    fn report(&self, cause: &Cause) -> Result<serde_json::Value>;
}

/// Default reporter describing any caught value.
#[derive(Debug, Default, Clone, Copy)]
pub struct CaughtObjectReporter;

impl CauseReporter for CaughtObjectReporter {
    fn report(&self, cause: &Cause) -> Result<serde_json::Value> {
        let mut report = serde_json::Map::new();
        if let Some(name) = cause.type_name() {
            report.insert("constructor_name".into(), name.into());
        }
        report.insert("typeof".into(), type_of(cause).into());
        report.insert("instanceof_error".into(), cause.is_error_like().into());

        match cause {
            Cause::Exception(e) => {
                let exported = e
                    .to_json_value()
                    .map_err(|err| err.with_operation("cause::report").with_context("cause", e.id()))?;
                let message = e.compiled_message().map_err(|err| err.with_operation("cause::report"))?;
                report.insert("as_string".into(), format!("{}: {}", e.constructor_name(), message).into());
                report.insert("message".into(), message.into());
                report.insert("stack".into(), e.stack().into());
                report.insert("as_json".into(), exported);
            }
            Cause::Error { error, .. } => {
                let text = error.to_string();
                report.insert("as_string".into(), text.clone().into());
                report.insert("message".into(), text.into());
                let chain: Vec<serde_json::Value> = std::iter::successors(error.source(), |&e| e.source())
                    .map(|e| e.to_string().into())
                    .collect();
                if !chain.is_empty() {
                    report.insert("sources".into(), chain.into());
                }
                report.insert("as_json".into(), json!({}));
            }
            Cause::Value(value) => {
                report.insert("as_string".into(), value.to_template_text().into());
                report.insert("as_json".into(), json::to_json(value));
            }
        }
        report.insert("v".into(), CAUSE_REPORT_VERSION.into());
        Ok(serde_json::Value::Object(report))
    }
}

fn type_of(cause: &Cause) -> &'static str {
    match cause {
        Cause::Exception(_) | Cause::Error { .. } => "object",
        Cause::Value(value) => match value {
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Null | Value::List(_) | Value::Map(_) => "object",
        },
    }
}
