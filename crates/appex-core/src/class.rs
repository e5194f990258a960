//! Exception classes.
//!
//! A class is a named node in an explicit parent chain. Each class may
//! declare defaults; constructing an exception of a class layers its own
//! defaults over those of its ancestors (nearest first) and the built-ins.

use std::fmt;
use std::rc::Rc;

use appex_template::{MustacheEngine, TemplateEngine};
use chrono::{DateTime, Utc};

use crate::assemble::{ResolvedConfig, assemble};
use crate::cause::{CaughtObjectReporter, Cause, CauseReporter};
use crate::defaults::DefaultsSpec;
use crate::exception::{Exception, join_lines, join_prefixed_lines};
use crate::input::ConfigInput;

pub struct ExceptionClass {
    name: String,
    parent: Option<Rc<ExceptionClass>>,
    defaults: Option<DefaultsSpec>,
    engine: Rc<dyn TemplateEngine>,
    reporter: Rc<dyn CauseReporter>,
}

impl ExceptionClass {
    /// Name of the library base class.
    pub const BASE_NAME: &'static str = "ApplicationException";

    /// The library base class, with no declared defaults.
    pub fn base() -> Rc<Self> {
        Self::builder(Self::BASE_NAME).build()
    }

    /// A root class with no parent.
    pub fn builder(name: impl Into<String>) -> ExceptionClassBuilder {
        ExceptionClassBuilder::new(name.into(), None)
    }

    /// A class whose ancestor chain starts at `self`.
    pub fn subclass(self: &Rc<Self>, name: impl Into<String>) -> ExceptionClassBuilder {
        ExceptionClassBuilder::new(name.into(), Some(Rc::clone(self)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Rc<ExceptionClass>> {
        self.parent.as_ref()
    }

    pub fn defaults(&self) -> Option<&DefaultsSpec> {
        self.defaults.as_ref()
    }

    pub fn engine(&self) -> &dyn TemplateEngine {
        self.engine.as_ref()
    }

    pub fn reporter(&self) -> &dyn CauseReporter {
        self.reporter.as_ref()
    }

    /// Parent, grandparent, and so on up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &ExceptionClass> {
        std::iter::successors(self.parent.as_deref(), |class| class.parent.as_deref())
    }

    pub fn is_same_or_descendant_of(&self, other: &ExceptionClass) -> bool {
        std::ptr::eq(self, other) || self.ancestors().any(|a| std::ptr::eq(a, other))
    }

    /// Resolve the configuration `input` would produce, without
    /// constructing an exception.
    pub fn normalize(&self, input: ConfigInput) -> ResolvedConfig {
        self.normalize_at(input, Utc::now())
    }

    pub fn normalize_at(&self, input: ConfigInput, now: DateTime<Utc>) -> ResolvedConfig {
        assemble(self, input, now).config
    }

    pub fn create(self: &Rc<Self>, input: ConfigInput) -> Exception {
        self.create_at(input, Utc::now())
    }

    /// Construct with an explicit "now", used for the default timestamp.
    pub fn create_at(self: &Rc<Self>, input: ConfigInput, now: DateTime<Utc>) -> Exception {
        let assembled = assemble(self, input, now);
        Exception::from_assembled(Rc::clone(self), assembled)
    }

    pub fn new_exception(self: &Rc<Self>, message: impl Into<String>) -> Exception {
        self.create(ConfigInput::new().message(message))
    }

    /// Message made of `lines` joined by newlines.
    pub fn lines<I, S>(self: &Rc<Self>, lines: I) -> Exception
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.new_exception(join_lines(lines))
    }

    /// Message with every line written as `"{prefix}: {line}"`.
    pub fn prefixed_lines<I, S>(self: &Rc<Self>, prefix: &str, lines: I) -> Exception
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.new_exception(join_prefixed_lines(prefix, lines))
    }

    pub fn plines<I, S>(self: &Rc<Self>, prefix: &str, lines: I) -> Exception
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.prefixed_lines(prefix, lines)
    }

    /// Return a caught exception unchanged, or wrap any other caught value
    /// in a new exception of this class that adopts its message and records
    /// it as the cause.
    pub fn wrap(self: &Rc<Self>, caught: impl Into<Cause>) -> Exception {
        let caught = caught.into();
        if let Cause::Exception(exception) = caught {
            return *exception;
        }
        let mut input = ConfigInput::new().is_wrapper(true);
        if let Some(message) = caught.message() {
            input = input.message(message);
        }
        tracing::debug!(class = self.name(), cause = ?caught, "wrapping caught value");
        self.create(input.caused_by(caught))
    }
}

impl fmt::Debug for ExceptionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionClass")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// Registers a new class. Engine and reporter default to the parent's.
pub struct ExceptionClassBuilder {
    name: String,
    parent: Option<Rc<ExceptionClass>>,
    defaults: Option<DefaultsSpec>,
    engine: Option<Rc<dyn TemplateEngine>>,
    reporter: Option<Rc<dyn CauseReporter>>,
}

impl ExceptionClassBuilder {
    fn new(name: String, parent: Option<Rc<ExceptionClass>>) -> Self {
        Self {
            name,
            parent,
            defaults: None,
            engine: None,
            reporter: None,
        }
    }

    pub fn defaults(mut self, defaults: DefaultsSpec) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn template_engine(mut self, engine: Rc<dyn TemplateEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn cause_reporter(mut self, reporter: Rc<dyn CauseReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> Rc<ExceptionClass> {
        let engine = self
            .engine
            .or_else(|| self.parent.as_ref().map(|p| Rc::clone(&p.engine)))
            .unwrap_or_else(|| Rc::new(MustacheEngine));
        let reporter = self
            .reporter
            .or_else(|| self.parent.as_ref().map(|p| Rc::clone(&p.reporter)))
            .unwrap_or_else(|| Rc::new(CaughtObjectReporter));
        tracing::trace!(
            class = %self.name,
            parent = self.parent.as_ref().map(|p| p.name()),
            "registered exception class"
        );
        Rc::new(ExceptionClass {
            name: self.name,
            parent: self.parent,
            defaults: self.defaults,
            engine,
            reporter,
        })
    }
}
