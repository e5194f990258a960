//! Declared defaults and their materialization into layers.
//!
//! A [`DefaultsSpec`] is a set of producers, one per property. Producers run
//! once per construction against a [`DefaultsCtx`] and may read sibling
//! producers of the same spec; each producer's result is memoized for the
//! construction. [`DefaultsAggregator`] materializes the instance, ancestor
//! and built-in layers lazily and hands them to the resolver.

use std::cell::{OnceCell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use appex_template::{Helpers, Value, builtin_helpers};
use chrono::{DateTime, Utc};

use crate::class::ExceptionClass;
use crate::id::{DEFAULT_ID_PREFIX, generate_id_body};
use crate::input::ConfigInput;
use crate::prop::{Layer, MergeDetailsFn, PropName, PropValue, TimestampFormat, merge_fn, shallow_merge};
use crate::resolve::{Sources, resolve_prop};

/// Message used when no layer supplies one.
pub const FALLBACK_MESSAGE: &str = "Something went wrong";

/// Produces a property value for one construction, or nothing.
pub type Producer = Rc<dyn Fn(&DefaultsCtx<'_>) -> Option<PropValue>>;

/// Default values declared for one exception class.
#[derive(Clone, Default)]
pub struct DefaultsSpec {
    producers: BTreeMap<PropName, Producer>,
}

impl DefaultsSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// The library's built-in defaults.
    pub fn builtin() -> Self {
        DefaultsSpec::new()
            .message(FALLBACK_MESSAGE)
            .produce(PropName::IdBody, |_| Some(PropValue::Str(generate_id_body())))
            .id_prefix(DEFAULT_ID_PREFIX)
            .produce(PropName::Timestamp, |ctx| Some(PropValue::Timestamp(ctx.now())))
            .use_class_name_as_code(false)
            .use_message_as_display_message(false)
            .timestamp_format_in_json(TimestampFormat::Iso)
            .apply_super_defaults(true)
            .merge_details(shallow_merge)
            .produce(PropName::HandlebarsHelpers, |_| Some(PropValue::Helpers(builtin_helpers())))
    }

    /// Declare a constant default.
    pub fn value(self, name: PropName, value: impl Into<PropValue>) -> Self {
        let value = value.into();
        self.produce(name, move |_| Some(value.clone()))
    }

    /// Declare a computed default.
    pub fn produce<F>(mut self, name: PropName, producer: F) -> Self
    where
        F: Fn(&DefaultsCtx<'_>) -> Option<PropValue> + 'static,
    {
        self.producers.insert(name, Rc::new(producer));
        self
    }

    pub fn message(self, message: impl Into<String>) -> Self {
        self.value(PropName::Message, message.into())
    }

    pub fn display_message(self, message: impl Into<String>) -> Self {
        self.value(PropName::DisplayMessage, message.into())
    }

    pub fn code(self, code: impl Into<String>) -> Self {
        self.value(PropName::Code, code.into())
    }

    pub fn num_code(self, num_code: i64) -> Self {
        self.value(PropName::NumCode, num_code)
    }

    pub fn id_prefix(self, prefix: impl Into<String>) -> Self {
        self.value(PropName::IdPrefix, prefix.into())
    }

    pub fn use_class_name_as_code(self, yes: bool) -> Self {
        self.value(PropName::UseClassNameAsCode, yes)
    }

    pub fn use_message_as_display_message(self, yes: bool) -> Self {
        self.value(PropName::UseMessageAsDisplayMessage, yes)
    }

    pub fn timestamp_format_in_json(self, format: TimestampFormat) -> Self {
        self.value(PropName::TimestampFormatInJson, format)
    }

    pub fn apply_super_defaults(self, yes: bool) -> Self {
        self.value(PropName::ApplySuperDefaults, yes)
    }

    pub fn merge_details<F>(self, merge: F) -> Self
    where
        F: Fn(&appex_template::Map, &appex_template::Map) -> appex_template::Map + 'static,
    {
        let merge: MergeDetailsFn = merge_fn(merge);
        self.value(PropName::MergeDetails, merge)
    }

    /// Constant details. Non-map values are kept and ignored at resolution.
    pub fn details(self, details: impl Into<Value>) -> Self {
        self.value(PropName::Details, PropValue::from(details.into()))
    }

    pub fn handlebars_helpers(self, helpers: Helpers) -> Self {
        self.value(PropName::HandlebarsHelpers, helpers)
    }

    pub fn declares(&self, name: PropName) -> bool {
        self.producers.contains_key(&name)
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// Run every producer for one construction.
    pub fn materialize(&self, class: &ExceptionClass, input: &ConfigInput, now: DateTime<Utc>) -> Layer {
        LayerEval::new(self, class, input, now).materialize()
    }
}

impl fmt::Debug for DefaultsSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.producers.keys()).finish()
    }
}

/// What a producer can see while it runs.
pub struct DefaultsCtx<'a> {
    eval: &'a LayerEval<'a>,
}

impl DefaultsCtx<'_> {
    /// Construction time, shared by every producer of the construction.
    pub fn now(&self) -> DateTime<Utc> {
        self.eval.now
    }

    /// The call-site input being resolved.
    pub fn input(&self) -> &ConfigInput {
        self.eval.input
    }

    /// The class being constructed, which may be a descendant of the class
    /// that declared the producer.
    pub fn class(&self) -> &ExceptionClass {
        self.eval.class
    }

    pub fn class_name(&self) -> &str {
        self.eval.class.name()
    }

    /// Value of a sibling producer in the same spec, computed at most once.
    pub fn get(&self, name: PropName) -> Option<PropValue> {
        self.eval.get(name)
    }
}

struct LayerEval<'a> {
    spec: &'a DefaultsSpec,
    class: &'a ExceptionClass,
    input: &'a ConfigInput,
    now: DateTime<Utc>,
    cache: RefCell<BTreeMap<PropName, Option<PropValue>>>,
    active: RefCell<Vec<PropName>>,
}

impl<'a> LayerEval<'a> {
    fn new(spec: &'a DefaultsSpec, class: &'a ExceptionClass, input: &'a ConfigInput, now: DateTime<Utc>) -> Self {
        Self {
            spec,
            class,
            input,
            now,
            cache: RefCell::new(BTreeMap::new()),
            active: RefCell::new(Vec::new()),
        }
    }

    fn get(&self, name: PropName) -> Option<PropValue> {
        if let Some(cached) = self.cache.borrow().get(&name) {
            return cached.clone();
        }
        let producer = self.spec.producers.get(&name)?;
        if self.active.borrow().contains(&name) {
            tracing::warn!(
                prop = %name,
                class = self.class.name(),
                "default producer depends on itself, treating the value as absent"
            );
            return None;
        }

        self.active.borrow_mut().push(name);
        let value = producer(&DefaultsCtx { eval: self });
        self.active.borrow_mut().pop();

        self.cache.borrow_mut().insert(name, value.clone());
        value
    }

    fn materialize(&self) -> Layer {
        let mut layer = Layer::new();
        for name in self.spec.producers.keys() {
            if let Some(value) = self.get(*name) {
                layer.set(*name, value);
            }
        }
        layer
    }
}

/// Lazily materialized defaults layers for one construction.
pub struct DefaultsAggregator<'a> {
    class: &'a ExceptionClass,
    input: &'a ConfigInput,
    now: DateTime<Utc>,
    instance: OnceCell<Option<Layer>>,
    ancestors: OnceCell<Vec<Layer>>,
    builtin: OnceCell<Layer>,
}

impl<'a> DefaultsAggregator<'a> {
    pub fn new(class: &'a ExceptionClass, input: &'a ConfigInput, now: DateTime<Utc>) -> Self {
        Self {
            class,
            input,
            now,
            instance: OnceCell::new(),
            ancestors: OnceCell::new(),
            builtin: OnceCell::new(),
        }
    }

    /// Defaults declared by the constructed class itself.
    pub fn instance(&self) -> Option<&Layer> {
        self.instance
            .get_or_init(|| {
                self.class
                    .defaults()
                    .map(|spec| spec.materialize(self.class, self.input, self.now))
            })
            .as_ref()
    }

    pub fn builtin(&self) -> &Layer {
        self.builtin
            .get_or_init(|| DefaultsSpec::builtin().materialize(self.class, self.input, self.now))
    }

    /// Resolved without the ancestor layers, which depend on it.
    pub fn apply_super_defaults(&self) -> bool {
        let sources = Sources {
            call_site: &self.input.layer,
            instance: self.instance(),
            ancestors: &[],
            builtin: self.builtin(),
        };
        resolve_prop(PropName::ApplySuperDefaults, &sources)
            .and_then(|(v, _)| v.as_bool())
            .unwrap_or(true)
    }

    /// Defaults of every ancestor that declares some, nearest first. Empty
    /// when `applySuperDefaults` resolves to false.
    pub fn ancestors(&self) -> &[Layer] {
        self.ancestors.get_or_init(|| {
            if !self.apply_super_defaults() {
                tracing::debug!(class = self.class.name(), "skipping ancestor defaults");
                return Vec::new();
            }
            self.class
                .ancestors()
                .filter_map(|ancestor| ancestor.defaults())
                .map(|spec| spec.materialize(self.class, self.input, self.now))
                .collect()
        })
    }

    pub fn sources(&self) -> Sources<'_> {
        Sources {
            call_site: &self.input.layer,
            instance: self.instance(),
            ancestors: self.ancestors(),
            builtin: self.builtin(),
        }
    }
}
