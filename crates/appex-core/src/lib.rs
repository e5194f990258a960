//! Structured application exceptions.
//!
//! An exception's fields are resolved from four layers: call-site input,
//! defaults declared by its class, defaults declared by the class's
//! ancestors, and built-in defaults. Messages are mustache templates
//! rendered lazily against the exception's own fields.
//!
//! ```
//! use appex_core::{ConfigInput, ExceptionClass};
//!
//! let base = ExceptionClass::base();
//! let e = base.create(
//!     ConfigInput::new()
//!         .message("id={{self.id}} code={{self.code}}")
//!         .id_prefix("X_")
//!         .id_body("42")
//!         .code("NOT_FOUND"),
//! );
//! assert_eq!(e.compiled_message().unwrap(), "id=X_42 code=NOT_FOUND");
//! ```

pub mod assemble;
pub mod cause;
pub mod class;
pub mod defaults;
pub mod exception;
pub mod export;
pub mod id;
pub mod input;
pub mod prop;
pub mod resolve;

pub use appex_error::{Error, ErrorKind, Result};
pub use appex_template::{
    Helper, HelperCtx, HelperRef, Helpers, Map, MustacheEngine, TemplateEngine, Value, builtin_helpers, helper,
};

pub use assemble::{Assembled, ResolvedConfig, assemble};
pub use cause::{CaughtObjectReporter, Cause, CauseReporter};
pub use class::{ExceptionClass, ExceptionClassBuilder};
pub use defaults::{DefaultsAggregator, DefaultsCtx, DefaultsSpec, Producer};
pub use exception::{Exception, Options, PartialOptions};
pub use export::{ExceptionJson, FORMAT_VERSION};
pub use input::ConfigInput;
pub use prop::{Layer, MergeDetailsFn, PropName, PropValue, Strategy, TimestampFormat, merge_fn, shallow_merge};
pub use resolve::{Source, Sources, resolve, resolve_prop};
