//! The exception entity.
//!
//! An [`Exception`] owns the options resolved at construction, a bag of its
//! own fields that builders mutate, and a compiled-message cache. Messages
//! are rendered on first access against a snapshot of the fields and then
//! frozen: later mutation does not re-render until [`Exception::invalidate`]
//! is called.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use appex_error::{Error, Result};
use appex_template::{Helpers, Map, Value};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::assemble::{Assembled, ResolvedConfig};
use crate::cause::Cause;
use crate::class::ExceptionClass;
use crate::export::{ExceptionJson, FORMAT_VERSION};
use crate::prop::{MergeDetailsFn, TimestampFormat};

/// Construction-time options that are not exposed as own fields.
#[derive(Clone)]
pub struct Options {
    pub id_prefix: String,
    pub use_class_name_as_code: bool,
    pub use_message_as_display_message: bool,
    pub timestamp_format: TimestampFormat,
    pub apply_super_defaults: bool,
    pub merge_details: MergeDetailsFn,
    pub helpers: Helpers,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("id_prefix", &self.id_prefix)
            .field("use_class_name_as_code", &self.use_class_name_as_code)
            .field("use_message_as_display_message", &self.use_message_as_display_message)
            .field("timestamp_format", &self.timestamp_format)
            .field("apply_super_defaults", &self.apply_super_defaults)
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Options {
    /// Overwrite every field that `partial` sets.
    pub fn merge(&mut self, partial: PartialOptions) {
        let PartialOptions {
            id_prefix,
            use_class_name_as_code,
            use_message_as_display_message,
            timestamp_format,
            apply_super_defaults,
            merge_details,
            helpers,
        } = partial;
        if let Some(id_prefix) = id_prefix {
            self.id_prefix = id_prefix;
        }
        if let Some(yes) = use_class_name_as_code {
            self.use_class_name_as_code = yes;
        }
        if let Some(yes) = use_message_as_display_message {
            self.use_message_as_display_message = yes;
        }
        if let Some(format) = timestamp_format {
            self.timestamp_format = format;
        }
        if let Some(yes) = apply_super_defaults {
            self.apply_super_defaults = yes;
        }
        if let Some(merge) = merge_details {
            self.merge_details = merge;
        }
        if let Some(helpers) = helpers {
            self.helpers = helpers;
        }
    }
}

/// A subset of [`Options`]; unset fields leave the current value alone.
#[derive(Clone, Default)]
pub struct PartialOptions {
    pub id_prefix: Option<String>,
    pub use_class_name_as_code: Option<bool>,
    pub use_message_as_display_message: Option<bool>,
    pub timestamp_format: Option<TimestampFormat>,
    pub apply_super_defaults: Option<bool>,
    pub merge_details: Option<MergeDetailsFn>,
    pub helpers: Option<Helpers>,
}

#[derive(Debug)]
struct OwnFields {
    id_body: String,
    timestamp: DateTime<Utc>,
    display_message: Option<String>,
    code: Option<String>,
    num_code: Option<i64>,
    details: Option<Map>,
    causes: Option<Vec<Cause>>,
    is_wrapper: Option<bool>,
}

#[derive(Debug, Default)]
struct Compiled {
    message: OnceCell<String>,
    display_message: OnceCell<Option<String>>,
}

pub struct Exception {
    class: Rc<ExceptionClass>,
    raw_message: String,
    options: Options,
    own: OwnFields,
    compiled: Compiled,
    stack: String,
}

impl Exception {
    /// Build an exception from an already-assembled configuration.
    pub fn from_assembled(class: Rc<ExceptionClass>, assembled: Assembled) -> Self {
        let Assembled {
            config,
            causes,
            is_wrapper,
        } = assembled;
        let ResolvedConfig {
            message,
            id_body,
            id_prefix,
            timestamp,
            display_message,
            code,
            num_code,
            use_class_name_as_code,
            use_message_as_display_message,
            timestamp_format,
            apply_super_defaults,
            merge_details,
            details,
            helpers,
        } = config;

        let stack = stack_trace(class.name(), &message);
        Self {
            class,
            raw_message: message,
            options: Options {
                id_prefix,
                use_class_name_as_code,
                use_message_as_display_message,
                timestamp_format,
                apply_super_defaults,
                merge_details,
                helpers,
            },
            own: OwnFields {
                id_body,
                timestamp,
                display_message,
                code,
                num_code,
                details,
                causes,
                is_wrapper,
            },
            compiled: Compiled::default(),
            stack,
        }
    }

    // ------------------------------------------------------------------
    // Getters
    // ------------------------------------------------------------------

    pub fn class(&self) -> &Rc<ExceptionClass> {
        &self.class
    }

    /// Name of the class this exception was constructed from.
    pub fn constructor_name(&self) -> &str {
        self.class.name()
    }

    /// Whether this exception was built from `class` or one of its
    /// descendants.
    pub fn is_instance_of(&self, class: &ExceptionClass) -> bool {
        self.class.is_same_or_descendant_of(class)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn id_body(&self) -> &str {
        &self.own.id_body
    }

    /// Public id: prefix followed by body.
    pub fn id(&self) -> String {
        format!("{}{}", self.options.id_prefix, self.own.id_body)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.own.timestamp
    }

    pub fn timestamp_iso(&self) -> String {
        self.own.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.own.timestamp.timestamp_millis()
    }

    /// Timestamp rendered the way `timestampFormatInJson` asks for.
    pub fn timestamp_for_json(&self) -> String {
        match self.options.timestamp_format {
            TimestampFormat::Iso => self.timestamp_iso(),
            TimestampFormat::Milliseconds => self.timestamp_millis().to_string(),
        }
    }

    /// Explicit code, or the class name when `useClassNameAsCode` is set.
    pub fn code(&self) -> Option<&str> {
        match &self.own.code {
            Some(code) => Some(code),
            None if self.options.use_class_name_as_code => Some(self.class.name()),
            None => None,
        }
    }

    pub fn num_code(&self) -> Option<i64> {
        self.own.num_code
    }

    pub fn details(&self) -> Option<&Map> {
        self.own.details.as_ref()
    }

    pub fn causes(&self) -> Option<&[Cause]> {
        self.own.causes.as_deref()
    }

    pub fn is_wrapper(&self) -> bool {
        self.own.is_wrapper.unwrap_or(false)
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn raw_message(&self) -> &str {
        &self.raw_message
    }

    /// Explicit display message, or the raw message when
    /// `useMessageAsDisplayMessage` is set.
    pub fn raw_display_message(&self) -> Option<&str> {
        match &self.own.display_message {
            Some(message) => Some(message),
            None if self.options.use_message_as_display_message => Some(&self.raw_message),
            None => None,
        }
    }

    /// The rendered message, computed on first call and cached.
    pub fn compiled_message(&self) -> Result<&str> {
        if let Some(message) = self.compiled.message.get() {
            return Ok(message);
        }
        let rendered = self
            .render(&self.raw_message)
            .map_err(|e| e.with_operation("exception::compiled_message"))?;
        Ok(self.compiled.message.get_or_init(|| rendered))
    }

    /// The rendered display message, if there is a raw one. Cached like
    /// [`Exception::compiled_message`].
    pub fn compiled_display_message(&self) -> Result<Option<&str>> {
        if let Some(message) = self.compiled.display_message.get() {
            return Ok(message.as_deref());
        }
        let rendered = match self.raw_display_message() {
            Some(raw) => Some(
                self.render(raw)
                    .map_err(|e| e.with_operation("exception::compiled_display_message"))?,
            ),
            None => None,
        };
        Ok(self.compiled.display_message.get_or_init(|| rendered).as_deref())
    }

    fn render(&self, source: &str) -> Result<String> {
        let context = self.template_context();
        self.class
            .engine()
            .render(source, &context, &self.options.helpers)
    }

    /// Everything a template can see: `id`, `timestamp`, `code` and
    /// `numCode` at the top level, details spread over them, and a reserved
    /// `self` object.
    pub fn template_context(&self) -> Value {
        let root = Value::empty_map();
        root.insert("id", self.id());
        root.insert("timestamp", self.timestamp_iso());
        if let Some(code) = self.code() {
            root.insert("code", code);
        }
        if let Some(num_code) = self.own.num_code {
            root.insert("numCode", num_code);
        }
        if let Some(details) = &self.own.details {
            for (key, value) in details {
                root.insert(key.clone(), value.clone());
            }
        }

        let this = Value::empty_map();
        this.insert("id", self.id());
        this.insert("timestamp", self.timestamp_iso());
        if let Some(code) = self.code() {
            this.insert("code", code);
        }
        if let Some(num_code) = self.own.num_code {
            this.insert("numCode", num_code);
        }
        if let Some(details) = &self.own.details {
            this.insert("details", details.clone());
        }
        this.insert("message", self.raw_message.as_str());
        if let Some(display) = self.raw_display_message() {
            this.insert("displayMessage", display);
        }
        this.insert("constructor_name", self.class.name());
        this.insert("_options", self.options_snapshot());
        this.insert("_own", self.own_snapshot());
        this.insert("_compiled", self.compiled_snapshot());

        root.insert("self", this);
        root
    }

    fn options_snapshot(&self) -> Value {
        let options = Value::empty_map();
        options.insert("idPrefix", self.options.id_prefix.as_str());
        options.insert("useClassNameAsCode", self.options.use_class_name_as_code);
        options.insert("useMessageAsDisplayMessage", self.options.use_message_as_display_message);
        options.insert("timestampFormatInJson", self.options.timestamp_format.as_str());
        options.insert("applySuperDefaults", self.options.apply_super_defaults);
        options.insert(
            "handlebarsHelpers",
            Value::list(self.options.helpers.keys().map(|k| Value::from(k.as_str())).collect()),
        );
        options
    }

    fn own_snapshot(&self) -> Value {
        let own = Value::empty_map();
        own.insert("idBody", self.own.id_body.as_str());
        own.insert("timestamp", self.timestamp_iso());
        own.insert("displayMessage", self.own.display_message.clone());
        own.insert("code", self.own.code.clone());
        own.insert("numCode", self.own.num_code);
        own.insert("details", self.own.details.clone());
        own.insert("causes", self.own.causes.as_ref().map(|c| c.len() as i64));
        own.insert("isWrapper", self.own.is_wrapper);
        own
    }

    fn compiled_snapshot(&self) -> Value {
        let compiled = Value::empty_map();
        compiled.insert("message", self.compiled.message.get().cloned());
        compiled.insert(
            "displayMessage",
            self.compiled.display_message.get().cloned().flatten(),
        );
        compiled
    }

    /// Drop cached compiled messages so the next access re-renders.
    pub fn invalidate(&mut self) -> &mut Self {
        self.compiled = Compiled::default();
        self
    }

    // ------------------------------------------------------------------
    // Setters
    // ------------------------------------------------------------------

    pub fn set_id_body(&mut self, id_body: impl Into<String>) -> &mut Self {
        self.own.id_body = id_body.into();
        self
    }

    pub fn set_timestamp(&mut self, timestamp: DateTime<Utc>) -> &mut Self {
        self.own.timestamp = timestamp;
        self
    }

    pub fn set_code(&mut self, code: impl Into<String>) -> &mut Self {
        self.own.code = Some(code.into());
        self
    }

    pub fn set_num_code(&mut self, num_code: i64) -> &mut Self {
        self.own.num_code = Some(num_code);
        self
    }

    pub fn set_display_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.own.display_message = Some(message.into());
        self
    }

    /// Replace the details wholesale.
    pub fn set_details(&mut self, details: Map) -> &mut Self {
        self.own.details = Some(details);
        self
    }

    /// Merge `details` into the current details with the resolved
    /// `mergeDetails` function.
    pub fn add_details(&mut self, details: Map) -> &mut Self {
        let merged = match &self.own.details {
            Some(current) => (self.options.merge_details)(current, &details),
            None => (self.options.merge_details)(&Map::new(), &details),
        };
        self.set_details(merged)
    }

    pub fn set_causes(&mut self, causes: Vec<Cause>) -> &mut Self {
        self.own.causes = Some(causes);
        self
    }

    pub fn add_cause(&mut self, cause: impl Into<Cause>) -> &mut Self {
        self.own.causes.get_or_insert_with(Vec::new).push(cause.into());
        self
    }

    pub fn set_options(&mut self, options: Options) -> &mut Self {
        self.options = options;
        self
    }

    pub fn add_options(&mut self, partial: PartialOptions) -> &mut Self {
        self.options.merge(partial);
        self
    }

    pub fn set_is_wrapper(&mut self, yes: bool) -> &mut Self {
        self.own.is_wrapper = Some(yes);
        self
    }

    // ------------------------------------------------------------------
    // By-value builders
    // ------------------------------------------------------------------

    pub fn with_id(mut self, id_body: impl Into<String>) -> Self {
        self.set_id_body(id_body);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.set_timestamp(timestamp);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.set_code(code);
        self
    }

    pub fn with_num_code(mut self, num_code: i64) -> Self {
        self.set_num_code(num_code);
        self
    }

    pub fn with_display_message(mut self, message: impl Into<String>) -> Self {
        self.set_display_message(message);
        self
    }

    /// Display message made of `lines` joined by newlines.
    pub fn with_display_message_lines<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_display_message(join_lines(lines))
    }

    /// Display message with every line prefixed by `"{prefix}: "`.
    pub fn with_display_message_prefixed_lines<I, S>(self, prefix: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_display_message(join_prefixed_lines(prefix, lines))
    }

    pub fn with_display_message_plines<I, S>(self, prefix: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_display_message_prefixed_lines(prefix, lines)
    }

    /// Merge details given as any map-shaped value. Other values are
    /// ignored with a warning.
    pub fn with_details(mut self, details: impl Into<Value>) -> Self {
        let details = details.into();
        match details.to_map() {
            Some(map) => {
                self.add_details(map);
            }
            None => tracing::warn!(
                class = self.class.name(),
                found = details.type_name(),
                "ignoring details that are not a map"
            ),
        }
        self
    }

    pub fn caused_by(mut self, cause: impl Into<Cause>) -> Self {
        self.add_cause(cause);
        self
    }

    pub fn with_is_wrapper(mut self, yes: bool) -> Self {
        self.set_is_wrapper(yes);
        self
    }

    pub fn with_options(mut self, partial: PartialOptions) -> Self {
        self.add_options(partial);
        self
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Canonical serialization. Absent fields are omitted; a cause whose
    /// report fails is logged and left out.
    pub fn to_json(&self) -> Result<ExceptionJson> {
        Ok(ExceptionJson {
            constructor_name: self.class.name().to_string(),
            message: self.compiled_message()?.to_string(),
            display_message: self.compiled_display_message()?.map(str::to_string),
            code: self.code().map(str::to_string),
            num_code: self.own.num_code,
            details: self
                .own
                .details
                .as_ref()
                .map(|d| appex_template::json::to_json(&Value::map(d.clone()))),
            stack: self.stack.clone(),
            id: self.id(),
            causes: self.own.causes.as_ref().map(|causes| self.cause_reports(causes)),
            timestamp: self.timestamp_for_json(),
            raw_message: self.raw_message.clone(),
            raw_display_message: self.raw_display_message().map(str::to_string),
            is_wrapper: self.is_wrapper().then_some(true),
            v: FORMAT_VERSION.to_string(),
        })
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self.to_json()?).map_err(|e| {
            Error::serialization_failed("failed to serialize exception")
                .with_operation("exception::to_json")
                .set_source(e)
        })
    }

    /// JSON text, compact when `indent` is 0.
    pub fn to_json_string(&self, indent: usize) -> Result<String> {
        appex_template::json::stringify(&self.to_json_value()?, indent)
    }

    fn cause_reports(&self, causes: &[Cause]) -> Vec<serde_json::Value> {
        let reporter = self.class.reporter();
        causes
            .iter()
            .enumerate()
            .filter_map(|(index, cause)| match reporter.report(cause) {
                Ok(report) => Some(report),
                Err(err) => {
                    tracing::warn!(
                        id = %self.id(),
                        index,
                        error = %err,
                        "failed to build cause report, omitting it"
                    );
                    None
                }
            })
            .collect()
    }
}

/// `"{name}: {message}"`, followed by the backtrace when one was captured.
fn stack_trace(name: &str, message: &str) -> String {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => format!("{name}: {message}\n{backtrace}"),
        _ => format!("{name}: {message}"),
    }
}

pub(crate) fn join_lines<I, S>(lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|line| line.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn join_prefixed_lines<I, S>(prefix: &str, lines: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    join_lines(lines.into_iter().map(|line| format!("{prefix}: {}", line.as_ref())))
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.compiled_message() {
            Ok(message) => f.write_str(message),
            Err(_) => f.write_str(&self.raw_message),
        }
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.class.name(), self.id())?;
        writeln!(f, "    Message: {}", self.raw_message)?;
        if let Some(display) = self.raw_display_message() {
            writeln!(f, "    Display: {display}")?;
        }
        if let Some(code) = self.code() {
            writeln!(f, "    Code: {code}")?;
        }
        if let Some(num_code) = self.own.num_code {
            writeln!(f, "    NumCode: {num_code}")?;
        }
        if let Some(details) = &self.own.details {
            writeln!(f, "    Details: {details:?}")?;
        }
        if let Some(causes) = &self.own.causes {
            writeln!(f, "    Causes:")?;
            for cause in causes {
                writeln!(f, "        {cause:?}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.causes()?.iter().find_map(Cause::as_std_error)
    }
}
