//! Dynamic values used for exception details and template contexts.
//!
//! Lists and maps are reference-counted and interior-mutable so the same
//! object can be reachable from several places, including from itself.
//! Everything that walks a `Value` recursively must therefore be cycle-aware;
//! see [`crate::json`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Ordered string-keyed map of values.
pub type Map = BTreeMap<String, Value>;

/// A shared, mutable list.
pub type SharedList = Rc<RefCell<Vec<Value>>>;

/// A shared, mutable map.
pub type SharedMap = Rc<RefCell<Map>>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(SharedList),
    Map(SharedMap),
}

impl Value {
    /// Wrap `map` into a new shared map value.
    pub fn map(map: Map) -> Self {
        Value::Map(Rc::new(RefCell::new(map)))
    }

    /// A new, empty shared map value.
    pub fn empty_map() -> Self {
        Value::map(Map::new())
    }

    /// Wrap `items` into a new shared list value.
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Insert `value` under `key` if this is a map. Returns whether it was.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        match self {
            Value::Map(map) => {
                map.borrow_mut().insert(key.into(), value.into());
                true
            }
            _ => false,
        }
    }

    /// Append `value` if this is a list. Returns whether it was.
    pub fn push(&self, value: impl Into<Value>) -> bool {
        match self {
            Value::List(list) => {
                list.borrow_mut().push(value.into());
                true
            }
            _ => false,
        }
    }

    /// Member lookup: map key, or list index when `key` parses as one.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.borrow().get(key).cloned(),
            Value::List(list) => {
                let index: usize = key.parse().ok()?;
                list.borrow().get(index).cloned()
            }
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view; floats qualify only when they are whole and inside the
    /// `i64` range.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) => float_to_i64(*f),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Snapshot of the entries if this is a map.
    pub fn to_map(&self) -> Option<Map> {
        match self {
            Value::Map(map) => Some(map.borrow().clone()),
            _ => None,
        }
    }

    /// Short runtime type name, used in diagnostics and cause reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Whether both values are the same shared list or map.
    pub fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Text used when a value is interpolated into a template.
    ///
    /// Null renders empty, lists join their elements with `,`, maps render
    /// as `[object Object]`.
    pub fn to_template_text(&self) -> String {
        let mut out = String::new();
        self.write_template_text(&mut out, &mut Vec::new());
        out
    }

    fn write_template_text(&self, out: &mut String, stack: &mut Vec<*const ()>) {
        match self {
            Value::Null => {}
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::String(s) => out.push_str(s),
            Value::Map(_) => out.push_str("[object Object]"),
            Value::List(list) => {
                let ptr = Rc::as_ptr(list) as *const ();
                if stack.contains(&ptr) {
                    return;
                }
                stack.push(ptr);
                for (i, item) in list.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_template_text(out, stack);
                }
                stack.pop();
            }
        }
    }
}

/// `f` as an integer, or `None` when it has a fraction or would saturate.
pub fn float_to_i64(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; every whole float below it fits.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then_some(f as i64)
}

/// Format a float the way it reads in JSON-ish text: integral values drop
/// the trailing `.0`.
pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        let text = if f > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_tracking(other, &mut Vec::new())
    }
}

type PtrPair = (*const (), *const ());

impl Value {
    /// Structural equality. `seen` holds the container pairs currently being
    /// compared; meeting one again means both sides loop back the same way.
    fn eq_tracking(&self, other: &Value, seen: &mut Vec<PtrPair>) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                let pair = (Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ());
                if Rc::ptr_eq(a, b) || seen.contains(&pair) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return false;
                }
                seen.push(pair);
                let equal = a.iter().zip(b.iter()).all(|(x, y)| x.eq_tracking(y, seen));
                seen.pop();
                equal
            }
            (Value::Map(a), Value::Map(b)) => {
                let pair = (Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ());
                if Rc::ptr_eq(a, b) || seen.contains(&pair) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return false;
                }
                seen.push(pair);
                let equal = a
                    .iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && va.eq_tracking(vb, seen));
                seen.pop();
                equal
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = crate::json::to_json_with(self, &mut |_| {});
        write!(f, "{}", json)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::list(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::map(map)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_from_json_preserving_integers() {
        let value = Value::from(json!({"a": 1, "b": 1.5, "c": [true, null, "x"]}));
        assert_eq!(value.get("a"), Some(Value::Int(1)));
        assert_eq!(value.get("b"), Some(Value::Float(1.5)));
        let list = value.get("c").unwrap();
        assert_eq!(list.get("0"), Some(Value::Bool(true)));
        assert_eq!(list.get("2").and_then(|v| v.as_str().map(String::from)), Some("x".into()));
        assert_eq!(list.get("9"), None);
    }

    #[test]
    fn shared_maps_alias() {
        let a = Value::empty_map();
        let b = a.clone();
        b.insert("k", "v");
        assert_eq!(a.get("k"), Some(Value::from("v")));
        assert!(a.same_object(&b));
        assert!(!a.same_object(&Value::empty_map()));
    }

    #[test]
    fn template_text_follows_interpolation_rules() {
        assert_eq!(Value::Null.to_template_text(), "");
        assert_eq!(Value::Float(3.0).to_template_text(), "3");
        assert_eq!(Value::Float(0.25).to_template_text(), "0.25");
        assert_eq!(Value::from(json!([1, "a", null])).to_template_text(), "1,a,");
        assert_eq!(Value::from(json!({"a": 1})).to_template_text(), "[object Object]");
    }

    #[test]
    fn self_referencing_list_renders_without_recursing_forever() {
        let list = Value::list(vec![Value::Int(1)]);
        list.push(list.clone());
        assert_eq!(list.to_template_text(), "1,");
    }

    #[test]
    fn out_of_range_floats_are_not_integers() {
        assert_eq!(Value::Float(42.0).as_i64(), Some(42));
        assert_eq!(Value::Float(-9.223372036854776e18).as_i64(), Some(i64::MIN));
        assert_eq!(Value::Float(1e300).as_i64(), None);
        assert_eq!(Value::Float(9.223372036854776e18).as_i64(), None);
        assert_eq!(Value::Float(f64::INFINITY).as_i64(), None);
        assert_eq!(Value::Float(f64::NAN).as_i64(), None);
        assert_eq!(Value::Float(1.5).as_i64(), None);
    }

    #[test]
    fn distinct_cycles_compare_without_recursing_forever() {
        let a = Value::empty_map();
        a.insert("loop", a.clone());
        let b = Value::empty_map();
        b.insert("loop", b.clone());
        assert_eq!(a, b);

        let c = Value::empty_map();
        c.insert("loop", c.clone());
        c.insert("extra", 1);
        assert_ne!(a, c);

        let l = Value::list(vec![Value::Int(1)]);
        l.push(l.clone());
        let m = Value::list(vec![Value::Int(1)]);
        m.push(m.clone());
        assert_eq!(l, m);
    }

    #[test]
    fn equality_is_structural_across_number_kinds() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_eq!(Value::from(json!({"x": [1]})), Value::from(json!({"x": [1]})));
        assert_ne!(Value::from("1"), Value::Int(1));
    }
}
