//! Configuration properties and the dynamically-typed values layers hold.
//!
//! Every source of configuration (call-site input, declared defaults,
//! built-in defaults) is a [`Layer`]: a bag of [`PropValue`]s keyed by
//! [`PropName`]. Values are checked against [`PropName::is_valid`] only when
//! they are resolved, so a layer can hold a wrongly-typed value; resolution
//! treats it as absent.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use appex_template::{Helpers, Map, Value};
use chrono::{DateTime, Utc};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Function used to combine two `details` maps, earlier first.
pub type MergeDetailsFn = Rc<dyn Fn(&Map, &Map) -> Map>;

/// Shallow union, keys of `b` win.
pub fn shallow_merge(a: &Map, b: &Map) -> Map {
    let mut out = a.clone();
    out.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}

/// Wrap a closure as a `mergeDetails` function.
pub fn merge_fn<F>(f: F) -> MergeDetailsFn
where
    F: Fn(&Map, &Map) -> Map + 'static,
{
    Rc::new(f)
}

/// Names of the resolvable configuration properties.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum PropName {
    Message,
    IdBody,
    IdPrefix,
    Timestamp,
    DisplayMessage,
    Code,
    NumCode,
    UseClassNameAsCode,
    UseMessageAsDisplayMessage,
    TimestampFormatInJson,
    ApplySuperDefaults,
    MergeDetails,
    Details,
    HandlebarsHelpers,
}

/// How a property's effective value is computed from the layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The first layer holding a valid value wins.
    FirstMatch,
    /// Valid values of every layer are combined.
    AdditiveMerge,
}

impl PropName {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    pub fn strategy(self) -> Strategy {
        match self {
            PropName::Details | PropName::HandlebarsHelpers => Strategy::AdditiveMerge,
            _ => Strategy::FirstMatch,
        }
    }

    /// Runtime type check applied before a layer's value is accepted.
    pub fn is_valid(self, value: &PropValue) -> bool {
        match self {
            PropName::Message
            | PropName::IdBody
            | PropName::IdPrefix
            | PropName::DisplayMessage
            | PropName::Code => matches!(value, PropValue::Str(_)),
            PropName::Timestamp => matches!(value, PropValue::Timestamp(_)),
            PropName::NumCode => value.as_i64().is_some(),
            PropName::UseClassNameAsCode
            | PropName::UseMessageAsDisplayMessage
            | PropName::ApplySuperDefaults => matches!(value, PropValue::Bool(_)),
            PropName::TimestampFormatInJson => value.as_timestamp_format().is_some(),
            PropName::MergeDetails => matches!(value, PropValue::MergeDetails(_)),
            PropName::Details => matches!(value, PropValue::Details(_)),
            PropName::HandlebarsHelpers => matches!(value, PropValue::Helpers(_)),
        }
    }
}

/// Serialization format of the timestamp in exported JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum TimestampFormat {
    #[default]
    Iso,
    Milliseconds,
}

impl TimestampFormat {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }
}

/// A value held by a configuration layer.
#[derive(Clone)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(DateTime<Utc>),
    Details(Map),
    Helpers(Helpers),
    MergeDetails(MergeDetailsFn),
    /// Any other dynamic value. Never valid for a property.
    Other(Value),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropValue::Int(n) => Some(*n),
            PropValue::Float(f) => appex_template::float_to_i64(*f),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            PropValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_timestamp_format(&self) -> Option<TimestampFormat> {
        self.as_str().and_then(|s| s.parse().ok())
    }

    pub fn as_details(&self) -> Option<&Map> {
        match self {
            PropValue::Details(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_helpers(&self) -> Option<&Helpers> {
        match self {
            PropValue::Helpers(helpers) => Some(helpers),
            _ => None,
        }
    }

    pub fn as_merge_fn(&self) -> Option<&MergeDetailsFn> {
        match self {
            PropValue::MergeDetails(f) => Some(f),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropValue::Bool(_) => "boolean",
            PropValue::Int(_) | PropValue::Float(_) => "number",
            PropValue::Str(_) => "string",
            PropValue::Timestamp(_) => "timestamp",
            PropValue::Details(_) => "details",
            PropValue::Helpers(_) => "helpers",
            PropValue::MergeDetails(_) => "function",
            PropValue::Other(v) => v.type_name(),
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Bool(b) => write!(f, "Bool({b})"),
            PropValue::Int(n) => write!(f, "Int({n})"),
            PropValue::Float(x) => write!(f, "Float({x})"),
            PropValue::Str(s) => write!(f, "Str({s:?})"),
            PropValue::Timestamp(ts) => write!(f, "Timestamp({})", ts.to_rfc3339()),
            PropValue::Details(map) => f.debug_tuple("Details").field(map).finish(),
            PropValue::Helpers(helpers) => f
                .debug_tuple("Helpers")
                .field(&helpers.keys().collect::<Vec<_>>())
                .finish(),
            PropValue::MergeDetails(_) => write!(f, "MergeDetails(<fn>)"),
            PropValue::Other(v) => f.debug_tuple("Other").field(v).finish(),
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Str(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::Str(s)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

impl From<i64> for PropValue {
    fn from(n: i64) -> Self {
        PropValue::Int(n)
    }
}

impl From<i32> for PropValue {
    fn from(n: i32) -> Self {
        PropValue::Int(n as i64)
    }
}

impl From<f64> for PropValue {
    fn from(f: f64) -> Self {
        PropValue::Float(f)
    }
}

impl From<DateTime<Utc>> for PropValue {
    fn from(ts: DateTime<Utc>) -> Self {
        PropValue::Timestamp(ts)
    }
}

impl From<TimestampFormat> for PropValue {
    fn from(format: TimestampFormat) -> Self {
        PropValue::Str(format.as_str().to_string())
    }
}

impl From<Map> for PropValue {
    fn from(map: Map) -> Self {
        PropValue::Details(map)
    }
}

impl From<Helpers> for PropValue {
    fn from(helpers: Helpers) -> Self {
        PropValue::Helpers(helpers)
    }
}

impl From<MergeDetailsFn> for PropValue {
    fn from(f: MergeDetailsFn) -> Self {
        PropValue::MergeDetails(f)
    }
}

impl From<Value> for PropValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => PropValue::Bool(b),
            Value::Int(n) => PropValue::Int(n),
            Value::Float(f) => PropValue::Float(f),
            Value::String(s) => PropValue::Str(s),
            Value::Map(map) => PropValue::Details(map.borrow().clone()),
            other => PropValue::Other(other),
        }
    }
}

impl From<serde_json::Value> for PropValue {
    fn from(value: serde_json::Value) -> Self {
        PropValue::from(Value::from(value))
    }
}

/// One source of configuration values.
#[derive(Clone, Default)]
pub struct Layer {
    values: BTreeMap<PropName, PropValue>,
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: PropName) -> Option<&PropValue> {
        self.values.get(&name)
    }

    /// The value for `name` only if it passes the property's validity check.
    pub fn get_valid(&self, name: PropName) -> Option<&PropValue> {
        self.get(name).filter(|v| name.is_valid(v))
    }

    pub fn set(&mut self, name: PropName, value: impl Into<PropValue>) -> Option<PropValue> {
        self.values.insert(name, value.into())
    }

    pub fn remove(&mut self, name: PropName) -> Option<PropValue> {
        self.values.remove(&name)
    }

    pub fn contains(&self, name: PropName) -> bool {
        self.values.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PropName, &PropValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}
