use std::fmt;

use appex_error::{Error, Result};
use appex_template::{HelperRef, Helpers, Map, Value};
use chrono::{DateTime, TimeZone, Utc};

use crate::cause::Cause;
use crate::prop::{Layer, MergeDetailsFn, PropName, PropValue, TimestampFormat};

/// Call-site configuration for one exception construction.
///
/// Any subset of the properties may be set. Values go through
/// [`PropName::is_valid`] only at resolution time, so [`ConfigInput::set`]
/// accepts anything.
#[derive(Default)]
pub struct ConfigInput {
    pub(crate) layer: Layer,
    pub(crate) causes: Option<Vec<Cause>>,
    pub(crate) is_wrapper: Option<bool>,
}

impl ConfigInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    pub fn get(&self, name: PropName) -> Option<&PropValue> {
        self.layer.get(name)
    }

    pub fn causes(&self) -> Option<&[Cause]> {
        self.causes.as_deref()
    }

    pub fn is_wrapper_flag(&self) -> Option<bool> {
        self.is_wrapper
    }

    /// Store any value for `name`, valid or not.
    pub fn set(mut self, name: PropName, value: impl Into<PropValue>) -> Self {
        self.layer.set(name, value);
        self
    }

    pub fn insert(&mut self, name: PropName, value: impl Into<PropValue>) -> &mut Self {
        self.layer.set(name, value);
        self
    }

    pub fn message(self, message: impl Into<String>) -> Self {
        self.set(PropName::Message, message.into())
    }

    pub fn id_body(self, body: impl Into<String>) -> Self {
        self.set(PropName::IdBody, body.into())
    }

    pub fn id_prefix(self, prefix: impl Into<String>) -> Self {
        self.set(PropName::IdPrefix, prefix.into())
    }

    pub fn timestamp(self, timestamp: DateTime<Utc>) -> Self {
        self.set(PropName::Timestamp, timestamp)
    }

    pub fn display_message(self, message: impl Into<String>) -> Self {
        self.set(PropName::DisplayMessage, message.into())
    }

    pub fn code(self, code: impl Into<String>) -> Self {
        self.set(PropName::Code, code.into())
    }

    pub fn num_code(self, num_code: i64) -> Self {
        self.set(PropName::NumCode, num_code)
    }

    pub fn use_class_name_as_code(self, yes: bool) -> Self {
        self.set(PropName::UseClassNameAsCode, yes)
    }

    pub fn use_message_as_display_message(self, yes: bool) -> Self {
        self.set(PropName::UseMessageAsDisplayMessage, yes)
    }

    pub fn timestamp_format_in_json(self, format: TimestampFormat) -> Self {
        self.set(PropName::TimestampFormatInJson, format)
    }

    pub fn apply_super_defaults(self, yes: bool) -> Self {
        self.set(PropName::ApplySuperDefaults, yes)
    }

    pub fn merge_details(self, merge: MergeDetailsFn) -> Self {
        self.set(PropName::MergeDetails, merge)
    }

    /// Details payload. A value that is not a map is stored as-is and later
    /// ignored by resolution.
    pub fn details(self, details: impl Into<Value>) -> Self {
        self.set(PropName::Details, PropValue::from(details.into()))
    }

    pub fn handlebars_helpers(self, helpers: Helpers) -> Self {
        self.set(PropName::HandlebarsHelpers, helpers)
    }

    /// Add one helper, keeping helpers set earlier on this input.
    pub fn helper(mut self, name: impl Into<String>, helper: HelperRef) -> Self {
        let mut helpers = self
            .layer
            .get(PropName::HandlebarsHelpers)
            .and_then(PropValue::as_helpers)
            .cloned()
            .unwrap_or_default();
        helpers.insert(name.into(), helper);
        self.layer.set(PropName::HandlebarsHelpers, helpers);
        self
    }

    pub fn causes_from<I, C>(mut self, causes: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Cause>,
    {
        self.causes = Some(causes.into_iter().map(Into::into).collect());
        self
    }

    pub fn caused_by(mut self, cause: impl Into<Cause>) -> Self {
        self.causes.get_or_insert_with(Vec::new).push(cause.into());
        self
    }

    pub fn is_wrapper(mut self, yes: bool) -> Self {
        self.is_wrapper = Some(yes);
        self
    }

    /// Parse a JSON object whose keys are camelCase property names.
    ///
    /// `timestamp` accepts an RFC 3339 string or epoch milliseconds; anything
    /// else is stored as-is and skipped at resolution. `causes` takes an
    /// array of arbitrary values. Function-valued properties and unknown keys
    /// are skipped with a warning.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let object = json.as_object().ok_or_else(|| {
            Error::invalid_config(format!("exception config must be a JSON object, got {json}"))
                .with_operation("config::from_json")
        })?;

        let mut input = ConfigInput::new();
        for (key, value) in object {
            match key.as_str() {
                "causes" => {
                    let Some(items) = value.as_array() else {
                        tracing::warn!(key = %key, "ignoring non-array causes");
                        continue;
                    };
                    input.causes = Some(items.iter().cloned().map(|v| Cause::Value(Value::from(v))).collect());
                }
                "isWrapper" => match value.as_bool() {
                    Some(flag) => input.is_wrapper = Some(flag),
                    None => tracing::warn!(key = %key, "ignoring non-boolean isWrapper"),
                },
                other => {
                    let Ok(name) = other.parse::<PropName>() else {
                        tracing::warn!(key = %key, "ignoring unknown config key");
                        continue;
                    };
                    match name {
                        PropName::MergeDetails | PropName::HandlebarsHelpers => {
                            tracing::warn!(key = %key, "function-valued config key cannot be read from JSON");
                        }
                        PropName::Timestamp => {
                            input.layer.set(name, parse_timestamp(value));
                        }
                        _ => {
                            input.layer.set(name, PropValue::from(value.clone()));
                        }
                    }
                }
            }
        }
        Ok(input)
    }
}

/// Unparsable timestamps are kept as plain values, which resolution skips.
fn parse_timestamp(value: &serde_json::Value) -> PropValue {
    let parsed = match value {
        serde_json::Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| e.to_string()),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| "epoch milliseconds out of range".to_string()),
        _ => return PropValue::from(value.clone()),
    };
    match parsed {
        Ok(ts) => PropValue::Timestamp(ts),
        Err(reason) => {
            tracing::warn!(key = "timestamp", value = %value, %reason, "ignoring unparsable timestamp");
            PropValue::from(value.clone())
        }
    }
}

impl From<Map> for ConfigInput {
    fn from(details: Map) -> Self {
        ConfigInput::new().details(details)
    }
}

impl fmt::Debug for ConfigInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigInput")
            .field("layer", &self.layer)
            .field("causes", &self.causes.as_ref().map(Vec::len))
            .field("is_wrapper", &self.is_wrapper)
            .finish()
    }
}
