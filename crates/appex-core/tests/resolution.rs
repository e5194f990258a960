use std::rc::Rc;

use appex_core::{
    ConfigInput, DefaultsSpec, ExceptionClass, Map, MergeDetailsFn, PropName, PropValue, TimestampFormat, Value, merge_fn,
};
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
}

fn map(v: serde_json::Value) -> Map {
    Value::from(v).to_map().unwrap()
}

/// Root declares `root`, leaf declares `leaf` for the given property.
fn chain(prop: PropName, root: &str, leaf: &str) -> (Rc<ExceptionClass>, Rc<ExceptionClass>) {
    let root_class = ExceptionClass::base()
        .subclass("RootException")
        .defaults(DefaultsSpec::new().value(prop, root))
        .build();
    let leaf_class = root_class
        .subclass("LeafException")
        .defaults(DefaultsSpec::new().value(prop, leaf))
        .build();
    (root_class, leaf_class)
}

#[test]
fn message_precedence_across_all_four_layers() {
    let (root, leaf) = chain(PropName::Message, "v3", "v2");
    let silent_leaf = root.subclass("SilentLeaf").build();

    let resolve = |class: &Rc<ExceptionClass>, input: ConfigInput| class.normalize_at(input, now()).message;

    assert_eq!(resolve(&leaf, ConfigInput::new().message("v1")), "v1");
    assert_eq!(resolve(&leaf, ConfigInput::new()), "v2");
    assert_eq!(resolve(&silent_leaf, ConfigInput::new()), "v3");
    assert_eq!(resolve(&ExceptionClass::base(), ConfigInput::new()), "Something went wrong");
}

#[test]
fn id_prefix_precedence_across_all_four_layers() {
    let (root, leaf) = chain(PropName::IdPrefix, "ROOT_", "LEAF_");
    let silent_leaf = root.subclass("SilentLeaf").build();

    assert_eq!(
        leaf.create_at(ConfigInput::new().id_prefix("CALL_").id_body("1"), now()).id(),
        "CALL_1"
    );
    assert_eq!(leaf.create_at(ConfigInput::new().id_body("1"), now()).id(), "LEAF_1");
    assert_eq!(silent_leaf.create_at(ConfigInput::new().id_body("1"), now()).id(), "ROOT_1");
    assert_eq!(
        ExceptionClass::base().create_at(ConfigInput::new().id_body("1"), now()).id(),
        "AE_1"
    );
}

fn chain_of(
    prop: PropName,
    root: impl Into<PropValue>,
    leaf: impl Into<PropValue>,
) -> (Rc<ExceptionClass>, Rc<ExceptionClass>) {
    let root_class = ExceptionClass::base()
        .subclass("RootException")
        .defaults(DefaultsSpec::new().value(prop, root))
        .build();
    let leaf_class = root_class
        .subclass("LeafException")
        .defaults(DefaultsSpec::new().value(prop, leaf))
        .build();
    (root_class, leaf_class)
}

/// A merge function that stamps `by` with `tag`, so the chosen one is visible.
fn tagged_merge(tag: &'static str) -> MergeDetailsFn {
    merge_fn(move |a: &Map, b: &Map| {
        let mut out = appex_core::shallow_merge(a, b);
        out.insert("by".into(), Value::from(tag));
        out
    })
}

#[test]
fn use_message_as_display_message_precedence_across_all_four_layers() {
    let (root, leaf) = chain_of(PropName::UseMessageAsDisplayMessage, true, false);
    let silent_leaf = root.subclass("SilentLeaf").build();
    let resolve =
        |class: &Rc<ExceptionClass>, input: ConfigInput| class.normalize_at(input, now()).use_message_as_display_message;

    assert!(resolve(&leaf, ConfigInput::new().use_message_as_display_message(true)));
    assert!(!resolve(&leaf, ConfigInput::new()));
    assert!(resolve(&silent_leaf, ConfigInput::new()));
    assert!(!resolve(&ExceptionClass::base(), ConfigInput::new()));

    let e = silent_leaf.create_at(ConfigInput::new().message("shown"), now());
    assert_eq!(e.raw_display_message(), Some("shown"));
}

#[test]
fn timestamp_format_precedence_across_all_four_layers() {
    let (root, leaf) = chain_of(
        PropName::TimestampFormatInJson,
        TimestampFormat::Milliseconds,
        TimestampFormat::Iso,
    );
    let silent_leaf = root.subclass("SilentLeaf").build();
    let resolve = |class: &Rc<ExceptionClass>, input: ConfigInput| class.normalize_at(input, now()).timestamp_format;

    assert_eq!(
        resolve(&leaf, ConfigInput::new().timestamp_format_in_json(TimestampFormat::Milliseconds)),
        TimestampFormat::Milliseconds
    );
    assert_eq!(resolve(&leaf, ConfigInput::new()), TimestampFormat::Iso);
    assert_eq!(resolve(&silent_leaf, ConfigInput::new()), TimestampFormat::Milliseconds);
    assert_eq!(resolve(&ExceptionClass::base(), ConfigInput::new()), TimestampFormat::Iso);

    let e = silent_leaf.create_at(ConfigInput::new(), now());
    assert_eq!(e.timestamp_for_json(), "1672531200000");
}

#[test]
fn merge_details_precedence_across_all_four_layers() {
    let (root, leaf) = chain_of(PropName::MergeDetails, tagged_merge("root"), tagged_merge("leaf"));
    let silent_leaf = root.subclass("SilentLeaf").build();
    let picked = |class: &Rc<ExceptionClass>, input: ConfigInput| {
        let config = class.normalize_at(input, now());
        (config.merge_details)(&Map::new(), &Map::new()).get("by").cloned()
    };

    assert_eq!(
        picked(&leaf, ConfigInput::new().merge_details(tagged_merge("call"))),
        Some(Value::from("call"))
    );
    assert_eq!(picked(&leaf, ConfigInput::new()), Some(Value::from("leaf")));
    assert_eq!(picked(&silent_leaf, ConfigInput::new()), Some(Value::from("root")));
    assert_eq!(picked(&ExceptionClass::base(), ConfigInput::new()), None);
}

#[test]
fn class_declared_merge_details_drives_the_details_merge() {
    // Earlier values win instead of being overwritten.
    let keep_first = merge_fn(|a: &Map, b: &Map| {
        let mut out = b.clone();
        out.extend(a.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    });
    let root = ExceptionClass::base()
        .subclass("Root")
        .defaults(DefaultsSpec::new().merge_details(move |a: &Map, b: &Map| keep_first(a, b)).details(json!({"a": 1})))
        .build();
    let mid = root
        .subclass("Mid")
        .defaults(DefaultsSpec::new().details(json!({"a": 2, "b": 2})))
        .build();
    let leaf = mid
        .subclass("Leaf")
        .defaults(DefaultsSpec::new().details(json!({"b": 3, "c": 3})))
        .build();

    let input = || ConfigInput::new().details(json!({"c": 4, "d": 4}));
    let config = leaf.normalize_at(input(), now());
    assert_eq!(config.details, Some(map(json!({"a": 2, "b": 2, "c": 3, "d": 4}))));

    // Overriding the merge function lower in the chain restores overwrite order.
    let overriding = mid
        .subclass("Overriding")
        .defaults(
            DefaultsSpec::new()
                .merge_details(appex_core::shallow_merge)
                .details(json!({"b": 3, "c": 3})),
        )
        .build();
    let config = overriding.normalize_at(input(), now());
    assert_eq!(config.details, Some(map(json!({"a": 2, "b": 3, "c": 4, "d": 4}))));

    let e = leaf.create_at(input(), now()).with_details(json!({"d": 5, "e": 5}));
    assert_eq!(e.details().cloned(), Some(map(json!({"a": 2, "b": 2, "c": 3, "d": 4, "e": 5}))));
}

#[test]
fn code_without_builtin_default_becomes_absent() {
    let (root, leaf) = chain(PropName::Code, "ROOT", "LEAF");
    assert_eq!(leaf.normalize_at(ConfigInput::new().code("CALL"), now()).code.as_deref(), Some("CALL"));
    assert_eq!(leaf.normalize_at(ConfigInput::new(), now()).code.as_deref(), Some("LEAF"));
    assert_eq!(root.subclass("Bare").build().normalize_at(ConfigInput::new(), now()).code.as_deref(), Some("ROOT"));
    assert_eq!(ExceptionClass::base().normalize_at(ConfigInput::new(), now()).code, None);
}

#[test]
fn wrongly_typed_call_site_values_fall_through() {
    let (_, leaf) = chain(PropName::Code, "ROOT", "LEAF");
    let input = ConfigInput::new()
        .set(PropName::Code, 404)
        .set(PropName::Message, json!({"not": "a string"}))
        .set(PropName::UseClassNameAsCode, "yes")
        .set(PropName::NumCode, "500")
        .set(PropName::Timestamp, "2020-01-01");
    let config = leaf.normalize_at(input, now());

    assert_eq!(config.code.as_deref(), Some("LEAF"));
    assert_eq!(config.message, "Something went wrong");
    assert!(!config.use_class_name_as_code);
    assert_eq!(config.num_code, None);
    assert_eq!(config.timestamp, now());
}

#[test]
fn wrongly_typed_declared_defaults_fall_through() {
    let root = ExceptionClass::builder("Root")
        .defaults(DefaultsSpec::new().num_code(500))
        .build();
    let leaf = root
        .subclass("Leaf")
        .defaults(DefaultsSpec::new().value(PropName::NumCode, "not a number"))
        .build();
    assert_eq!(leaf.normalize_at(ConfigInput::new(), now()).num_code, Some(500));
}

#[test]
fn details_are_merged_additively() {
    // builtin {a:1} is modelled by the root-most class: the library declares
    // no builtin details.
    let builtin_like = ExceptionClass::builder("WithBuiltin")
        .defaults(DefaultsSpec::new().details(json!({"a": 1})))
        .build();
    let ancestor = builtin_like
        .subclass("Ancestor")
        .defaults(DefaultsSpec::new().details(json!({"a": 2, "b": 2})))
        .build();
    let instance = ancestor
        .subclass("Instance")
        .defaults(DefaultsSpec::new().details(json!({"b": 3, "c": 3})))
        .build();

    let config = instance.normalize_at(ConfigInput::new().details(json!({"c": 4, "d": 4})), now());
    assert_eq!(config.details, Some(map(json!({"a": 2, "b": 3, "c": 4, "d": 4}))));
}

#[test]
fn details_absent_when_no_layer_declares_them() {
    let class = ExceptionClass::base().subclass("Plain").build();
    assert_eq!(class.normalize_at(ConfigInput::new(), now()).details, None);
}

#[test]
fn subclass_default_layering() {
    let base = ExceptionClass::builder("BaseException")
        .defaults(DefaultsSpec::new().details(json!({"src": "base"})))
        .build();
    let mid = base
        .subclass("MidException")
        .defaults(DefaultsSpec::new().details(json!({"scope": "mid"})))
        .build();
    let leaf = mid.subclass("LeafException").build();

    let e = leaf.create_at(ConfigInput::new(), now());
    assert_eq!(e.details().cloned(), Some(map(json!({"src": "base", "scope": "mid"}))));
}

#[test]
fn apply_super_defaults_false_skips_the_ancestor_chain() {
    let base = ExceptionClass::builder("BaseException")
        .defaults(
            DefaultsSpec::new()
                .details(json!({"src": "base"}))
                .code("BASE")
                // Ignored: the flag is never read from ancestor layers.
                .apply_super_defaults(false),
        )
        .build();
    let isolated = base
        .subclass("Isolated")
        .defaults(DefaultsSpec::new().apply_super_defaults(false).message("own"))
        .build();
    let inheriting = base.subclass("Inheriting").build();

    let config = isolated.normalize_at(ConfigInput::new(), now());
    assert_eq!(config.code, None);
    assert_eq!(config.details, None);
    assert_eq!(config.message, "own");
    assert!(!config.apply_super_defaults);

    let config = inheriting.normalize_at(ConfigInput::new(), now());
    assert_eq!(config.code.as_deref(), Some("BASE"));
    assert!(config.apply_super_defaults);
}

#[test]
fn code_falls_back_to_the_class_name() {
    let class = ExceptionClass::base()
        .subclass("NotFoundException")
        .defaults(DefaultsSpec::new().use_class_name_as_code(true))
        .build();

    assert_eq!(class.create_at(ConfigInput::new(), now()).code(), Some("NotFoundException"));
    assert_eq!(
        class.create_at(ConfigInput::new().code("EXPLICIT"), now()).code(),
        Some("EXPLICIT")
    );
    let off = ConfigInput::new().use_class_name_as_code(false);
    assert_eq!(class.create_at(off, now()).code(), None);
}

#[test]
fn class_name_code_uses_the_constructing_class() {
    let parent = ExceptionClass::base()
        .subclass("HttpException")
        .defaults(DefaultsSpec::new().use_class_name_as_code(true))
        .build();
    let child = parent.subclass("BadGateway").build();
    assert_eq!(child.create_at(ConfigInput::new(), now()).code(), Some("BadGateway"));
}

#[test]
fn timestamp_defaults_to_now_and_can_be_overridden() {
    let class = ExceptionClass::base();
    assert_eq!(class.create_at(ConfigInput::new(), now()).timestamp(), now());

    let earlier = Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap();
    assert_eq!(class.create_at(ConfigInput::new().timestamp(earlier), now()).timestamp(), earlier);
}

#[test]
fn producers_run_once_per_construction() {
    use std::cell::Cell;

    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let class = ExceptionClass::base()
        .subclass("Counted")
        .defaults(DefaultsSpec::new().produce(PropName::Code, move |ctx| {
            counter.set(counter.get() + 1);
            Some(format!("AT_{}", ctx.now().timestamp()).into())
        }))
        .build();

    let e = class.create_at(ConfigInput::new(), now());
    assert_eq!(e.code(), Some("AT_1672531200"));
    assert_eq!(calls.get(), 1);

    class.create_at(ConfigInput::new(), now());
    assert_eq!(calls.get(), 2);
}

#[test]
fn ids_are_random_crockford_by_default() {
    let class = ExceptionClass::base();
    let a = class.create(ConfigInput::new());
    let b = class.create(ConfigInput::new());
    assert_ne!(a.id_body(), b.id_body());
    assert!(appex_core::id::is_crockford_id_body(a.id_body()));
    assert!(a.id().starts_with("AE_"));
}
