//! Cycle-safe conversion of [`Value`] into JSON.
//!
//! A shared list or map that is reached again while it is still being
//! serialized is a cyclic edge. The edge is dropped (map entry omitted, list
//! slot written as `null`) and reported through a callback; serialization
//! always completes.

use std::rc::Rc;

use appex_error::{Error, Result};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::value::Value;

/// Convert `value` to JSON, calling `on_cycle` with the key of every dropped
/// cyclic edge.
pub fn to_json_with(value: &Value, on_cycle: &mut dyn FnMut(&str)) -> serde_json::Value {
    let mut walker = Walker {
        ancestors: Vec::new(),
        on_cycle,
    };
    walker.convert(value)
}

/// Convert `value` to JSON, logging every dropped cyclic edge.
pub fn to_json(value: &Value) -> serde_json::Value {
    to_json_with(value, &mut |key| {
        tracing::warn!(key, "cyclic reference omitted while converting to JSON");
    })
}

/// Render already-converted JSON as text. `indent == 0` renders compactly.
pub fn stringify(json: &serde_json::Value, indent: usize) -> Result<String> {
    if indent == 0 {
        return serde_json::to_string(json)
            .map_err(|e| Error::serialization_failed(e.to_string()).set_source(e));
    }

    let pad = " ".repeat(indent);
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(pad.as_bytes()));
    json.serialize(&mut ser)
        .map_err(|e| Error::serialization_failed(e.to_string()).set_source(e))?;
    String::from_utf8(buf).map_err(|e| Error::serialization_failed(e.to_string()).set_source(e))
}

struct Walker<'a> {
    ancestors: Vec<*const ()>,
    on_cycle: &'a mut dyn FnMut(&str),
}

impl Walker<'_> {
    fn convert(&mut self, value: &Value) -> serde_json::Value {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(list) => {
                self.ancestors.push(Rc::as_ptr(list) as *const ());
                let items = list
                    .borrow()
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        if self.is_ancestor(item) {
                            (self.on_cycle)(&i.to_string());
                            serde_json::Value::Null
                        } else {
                            self.convert(item)
                        }
                    })
                    .collect();
                self.ancestors.pop();
                serde_json::Value::Array(items)
            }
            Value::Map(map) => {
                self.ancestors.push(Rc::as_ptr(map) as *const ());
                let mut out = serde_json::Map::new();
                for (key, item) in map.borrow().iter() {
                    if self.is_ancestor(item) {
                        (self.on_cycle)(key);
                        continue;
                    }
                    out.insert(key.clone(), self.convert(item));
                }
                self.ancestors.pop();
                serde_json::Value::Object(out)
            }
        }
    }

    fn is_ancestor(&self, value: &Value) -> bool {
        let ptr = match value {
            Value::List(list) => Rc::as_ptr(list) as *const (),
            Value::Map(map) => Rc::as_ptr(map) as *const (),
            _ => return false,
        };
        self.ancestors.contains(&ptr)
    }
}
