//! Builds the effective configuration of one exception.

use std::fmt;

use appex_template::{Helpers, Map};
use chrono::{DateTime, Utc};

use crate::cause::Cause;
use crate::class::ExceptionClass;
use crate::defaults::{DefaultsAggregator, FALLBACK_MESSAGE};
use crate::id::{DEFAULT_ID_PREFIX, generate_id_body};
use crate::input::ConfigInput;
use crate::prop::{Layer, MergeDetailsFn, PropName, PropValue, TimestampFormat, merge_fn, shallow_merge};
use crate::resolve::{Sources, resolve_prop};

/// Every property of an exception after resolution.
#[derive(Clone)]
pub struct ResolvedConfig {
    pub message: String,
    pub id_body: String,
    pub id_prefix: String,
    pub timestamp: DateTime<Utc>,
    pub display_message: Option<String>,
    pub code: Option<String>,
    pub num_code: Option<i64>,
    pub use_class_name_as_code: bool,
    pub use_message_as_display_message: bool,
    pub timestamp_format: TimestampFormat,
    pub apply_super_defaults: bool,
    pub merge_details: MergeDetailsFn,
    /// Absent when no layer declares details.
    pub details: Option<Map>,
    pub helpers: Helpers,
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("message", &self.message)
            .field("id_body", &self.id_body)
            .field("id_prefix", &self.id_prefix)
            .field("timestamp", &self.timestamp.to_rfc3339())
            .field("display_message", &self.display_message)
            .field("code", &self.code)
            .field("num_code", &self.num_code)
            .field("use_class_name_as_code", &self.use_class_name_as_code)
            .field("use_message_as_display_message", &self.use_message_as_display_message)
            .field("timestamp_format", &self.timestamp_format)
            .field("apply_super_defaults", &self.apply_super_defaults)
            .field("details", &self.details)
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolved configuration plus the fields that bypass resolution.
#[derive(Debug)]
pub struct Assembled {
    pub config: ResolvedConfig,
    pub causes: Option<Vec<Cause>>,
    pub is_wrapper: Option<bool>,
}

/// Resolve every property of `class` for `input` at time `now`.
#[tracing::instrument(skip_all, fields(class = class.name()))]
pub fn assemble(class: &ExceptionClass, input: ConfigInput, now: DateTime<Utc>) -> Assembled {
    let config = {
        let aggregator = DefaultsAggregator::new(class, &input, now);
        let apply_super_defaults = aggregator.apply_super_defaults();
        resolve_all(&aggregator.sources(), apply_super_defaults, now)
    };
    tracing::debug!(
        id_prefix = %config.id_prefix,
        has_details = config.details.is_some(),
        helpers = config.helpers.len(),
        "assembled exception config"
    );
    Assembled {
        config,
        causes: input.causes,
        is_wrapper: input.is_wrapper,
    }
}

fn resolve_all(sources: &Sources<'_>, apply_super_defaults: bool, now: DateTime<Utc>) -> ResolvedConfig {
    // mergeDetails first: details are merged with it.
    let merge_details = resolve_prop(PropName::MergeDetails, sources)
        .and_then(|(v, _)| v.as_merge_fn().cloned())
        .unwrap_or_else(|| merge_fn(shallow_merge));
    let details = merge_layers(sources, &merge_details);
    let helpers = union_helpers(sources);

    ResolvedConfig {
        message: string(sources, PropName::Message).unwrap_or_else(|| FALLBACK_MESSAGE.to_string()),
        id_body: string(sources, PropName::IdBody).unwrap_or_else(generate_id_body),
        id_prefix: string(sources, PropName::IdPrefix).unwrap_or_else(|| DEFAULT_ID_PREFIX.to_string()),
        timestamp: resolve_prop(PropName::Timestamp, sources)
            .and_then(|(v, _)| v.as_timestamp())
            .unwrap_or(now),
        display_message: string(sources, PropName::DisplayMessage),
        code: string(sources, PropName::Code),
        num_code: resolve_prop(PropName::NumCode, sources).and_then(|(v, _)| v.as_i64()),
        use_class_name_as_code: flag(sources, PropName::UseClassNameAsCode),
        use_message_as_display_message: flag(sources, PropName::UseMessageAsDisplayMessage),
        timestamp_format: resolve_prop(PropName::TimestampFormatInJson, sources)
            .and_then(|(v, _)| v.as_timestamp_format())
            .unwrap_or_default(),
        apply_super_defaults,
        merge_details,
        details,
        helpers,
    }
}

fn string(sources: &Sources<'_>, name: PropName) -> Option<String> {
    resolve_prop(name, sources).and_then(|(v, _)| v.as_str().map(str::to_string))
}

fn flag(sources: &Sources<'_>, name: PropName) -> bool {
    resolve_prop(name, sources)
        .and_then(|(v, _)| v.as_bool())
        .unwrap_or(false)
}

fn valid_details(layer: &Layer) -> Option<&Map> {
    layer.get_valid(PropName::Details).and_then(PropValue::as_details)
}

/// `merge(merge(merge(builtin, ancestors), instance), call_site)`, with the
/// ancestor layers folded root first so nearer ancestors win.
fn merge_layers(sources: &Sources<'_>, merge: &MergeDetailsFn) -> Option<Map> {
    let builtin = valid_details(sources.builtin);
    let ancestors: Vec<&Map> = sources.ancestors.iter().filter_map(valid_details).collect();
    let instance = sources.instance.and_then(valid_details);
    let call_site = valid_details(sources.call_site);

    if builtin.is_none() && ancestors.is_empty() && instance.is_none() && call_site.is_none() {
        return None;
    }

    let folded = ancestors
        .iter()
        .rev()
        .fold(Map::new(), |acc, layer| shallow_merge(&acc, layer));
    let empty = Map::new();
    let merged = merge(builtin.unwrap_or(&empty), &folded);
    let merged = merge(&merged, instance.unwrap_or(&empty));
    Some(merge(&merged, call_site.unwrap_or(&empty)))
}

fn union_helpers(sources: &Sources<'_>) -> Helpers {
    let pick = |layer: &Layer| {
        layer
            .get_valid(PropName::HandlebarsHelpers)
            .and_then(PropValue::as_helpers)
            .cloned()
    };
    let mut helpers = pick(sources.builtin).unwrap_or_default();
    for layer in sources.ancestors.iter().rev() {
        helpers.extend(pick(layer).unwrap_or_default());
    }
    if let Some(instance) = sources.instance {
        helpers.extend(pick(instance).unwrap_or_default());
    }
    helpers.extend(pick(sources.call_site).unwrap_or_default());
    helpers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::DefaultsSpec;
    use appex_template::{HelperCtx, Value, helper};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
    }

    fn map(v: serde_json::Value) -> Map {
        Value::from(v).to_map().unwrap()
    }

    #[test]
    fn empty_input_gets_builtin_fallbacks() {
        let class = ExceptionClass::base();
        let config = assemble(&class, ConfigInput::new(), now()).config;
        assert_eq!(config.message, "Something went wrong");
        assert_eq!(config.id_prefix, "AE_");
        assert_eq!(config.id_body.len(), 26);
        assert_eq!(config.timestamp, now());
        assert!(!config.use_class_name_as_code);
        assert!(!config.use_message_as_display_message);
        assert!(config.apply_super_defaults);
        assert_eq!(config.timestamp_format, TimestampFormat::Iso);
        assert!(config.details.is_none());
        assert!(config.code.is_none());
        assert_eq!(config.helpers.keys().collect::<Vec<_>>(), vec!["json", "pad-end", "pad-start"]);
    }

    #[test]
    fn details_merge_across_all_layers() {
        let root = ExceptionClass::builder("Root")
            .defaults(DefaultsSpec::new().details(json!({"a": 2, "b": 2})))
            .build();
        let leaf = root
            .subclass("Leaf")
            .defaults(DefaultsSpec::new().details(json!({"b": 3, "c": 3})))
            .build();
        let input = ConfigInput::new().details(json!({"c": 4, "d": 4}));
        let config = assemble(&leaf, input, now()).config;
        assert_eq!(config.details, Some(map(json!({"a": 2, "b": 3, "c": 4, "d": 4}))));
    }

    #[test]
    fn call_site_merge_function_is_used_for_details() {
        let class = ExceptionClass::builder("Tagged")
            .defaults(DefaultsSpec::new().details(json!({"tags": "base"})))
            .build();
        let concat = merge_fn(|a: &Map, b: &Map| {
            let mut out = shallow_merge(a, b);
            if let (Some(x), Some(y)) = (a.get("tags"), b.get("tags")) {
                out.insert("tags".into(), format!("{},{}", x.to_template_text(), y.to_template_text()).into());
            }
            out
        });
        let input = ConfigInput::new()
            .merge_details(concat)
            .details(json!({"tags": "call"}));
        let config = assemble(&class, input, now()).config;
        assert_eq!(config.details, Some(map(json!({"tags": "base,call"}))));
    }

    #[test]
    fn invalid_details_are_ignored() {
        let class = ExceptionClass::base();
        let input = ConfigInput::new().details(json!(["not", "a", "map"]));
        assert!(assemble(&class, input, now()).config.details.is_none());
    }

    #[test]
    fn helpers_union_with_call_site_last() {
        let named = |text: &'static str| helper(move |_: &[Value], _: &HelperCtx<'_>| Ok(text.to_string()));
        let mut declared = Helpers::new();
        declared.insert("who".into(), named("class"));
        declared.insert("json".into(), named("shadowed json"));
        let class = ExceptionClass::builder("Helpful")
            .defaults(DefaultsSpec::new().handlebars_helpers(declared))
            .build();
        let input = ConfigInput::new().helper("who", named("call"));
        let config = assemble(&class, input, now()).config;

        let ctx = HelperCtx {
            name: "who",
            span: Default::default(),
            template: "",
        };
        assert_eq!(config.helpers["who"].call(&[], &ctx).unwrap(), "call");
        assert_eq!(config.helpers["json"].call(&[], &ctx).unwrap(), "shadowed json");
        assert!(config.helpers.contains_key("pad-start"));
    }

    #[test]
    fn direct_fields_bypass_resolution() {
        let class = ExceptionClass::base();
        let input = ConfigInput::new().caused_by("upstream").is_wrapper(true);
        let assembled = assemble(&class, input, now());
        assert_eq!(assembled.causes.map(|c| c.len()), Some(1));
        assert_eq!(assembled.is_wrapper, Some(true));
    }
}
