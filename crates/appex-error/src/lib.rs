//! # appex-error
//!
//! Error type shared by the appex crates.
//!
//! ## Design
//!
//! - **ErrorKind**: what went wrong (e.g. `TemplateSyntax`, `MissingHelper`)
//! - **Operation**: where it went wrong (e.g. `template::parse`)
//! - **Context**: key/value pairs that help locate the cause
//! - **Source**: the wrapped lower-level error, if any
//!
//! ## Usage
//!
//! ```rust
//! use appex_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::TemplateSyntax, "unclosed mustache")
//!         .with_operation("template::parse")
//!         .with_context("line", "1")
//!         .with_context("column", "4"))
//! }
//! ```
//!
//! Only programmer errors surface through this type. Conditions the
//! exception machinery degrades gracefully on (bad helper arguments, cyclic
//! details, failed cause reports) are logged and never returned.

mod error;
mod kind;

pub use error::Error;
pub use kind::ErrorKind;

/// Result type alias using appex Error
pub type Result<T> = std::result::Result<T, Error>;
