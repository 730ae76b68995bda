//! Cycle-safe serialization of arbitrary object graphs
//!
//! [`GraphValue`] models host values that may share structure or contain
//! cycles: arrays and objects are reference-counted cells, so the same
//! container can be reachable from several places, including from itself.
//!
//! [`decycle`] turns such a graph into a plain JSON tree. The first time a
//! container is reached it is emitted in full and its path is remembered;
//! every later encounter is replaced by `{"$ref": "<first path>"}`. Paths
//! start at `$` and append `[index]` or `[key]` per step. Containers nested
//! deeper than [`MAX_DEPTH`] are replaced by [`MAX_DEPTH_MARKER`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Deepest container level emitted by [`decycle`]; the root is level 0
pub const MAX_DEPTH: usize = 128;

/// Stands in for a container below [`MAX_DEPTH`]
pub const MAX_DEPTH_MARKER: &str = "[MaxDepth]";

pub type ArrayRef = Rc<RefCell<Vec<GraphValue>>>;
pub type ObjectRef = Rc<RefCell<Vec<(String, GraphValue)>>>;

/// A value in a possibly cyclic object graph.
///
/// Cloning a container clones the reference, not the contents.
#[derive(Clone)]
pub enum GraphValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Never traversed
    Leaf(Leaf),
    Array(ArrayRef),
    /// Own properties in enumeration order
    Object(ObjectRef),
}

/// Values serialized as-is, without looking inside.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    Date(DateTime<Utc>),
    RegExp { source: String, flags: String },
    BoxedBool(bool),
    BoxedNumber(f64),
    BoxedString(String),
}

impl Leaf {
    fn to_json(&self) -> Value {
        match self {
            Leaf::Date(date) => Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
            // Regular expressions have no enumerable own properties
            Leaf::RegExp { .. } => Value::Object(Map::new()),
            Leaf::BoxedBool(b) => Value::Bool(*b),
            Leaf::BoxedNumber(n) => number(*n),
            Leaf::BoxedString(s) => Value::String(s.clone()),
        }
    }
}

impl GraphValue {
    /// A new, empty array container
    pub fn array() -> Self {
        GraphValue::Array(Rc::new(RefCell::new(Vec::new())))
    }

    /// A new, empty object container
    pub fn object() -> Self {
        GraphValue::Object(Rc::new(RefCell::new(Vec::new())))
    }

    /// Set a property on an object, replacing an existing key in place.
    ///
    /// Returns false when `self` is not an object.
    pub fn set(&self, key: impl Into<String>, value: GraphValue) -> bool {
        let GraphValue::Object(fields) = self else {
            return false;
        };
        let key = key.into();
        let mut fields = fields.borrow_mut();
        match fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => fields.push((key, value)),
        }
        true
    }

    /// Append to an array. Returns false when `self` is not an array.
    pub fn push(&self, value: GraphValue) -> bool {
        let GraphValue::Array(items) = self else {
            return false;
        };
        items.borrow_mut().push(value);
        true
    }

    /// Look up an own property of an object
    pub fn get(&self, key: &str) -> Option<GraphValue> {
        let GraphValue::Object(fields) = self else {
            return None;
        };
        let fields = fields.borrow();
        fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    pub fn as_str(&self) -> Option<String> {
        match self {
            GraphValue::String(s) | GraphValue::Leaf(Leaf::BoxedString(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

// Dropping a long chain recursively would exhaust the stack, so uniquely
// owned children are moved onto a heap worklist and released one by one.
impl Drop for GraphValue {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        take_children(self, &mut pending);
        while let Some(mut value) = pending.pop() {
            take_children(&mut value, &mut pending);
        }
    }
}

fn take_children(value: &mut GraphValue, out: &mut Vec<GraphValue>) {
    match value {
        GraphValue::Array(items) if Rc::strong_count(items) == 1 => {
            out.append(&mut *items.borrow_mut());
        }
        GraphValue::Object(fields) if Rc::strong_count(fields) == 1 => {
            out.extend(fields.borrow_mut().drain(..).map(|(_, item)| item));
        }
        _ => {}
    }
}

// Containers may be cyclic, so Debug never descends into them.
impl fmt::Debug for GraphValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphValue::Null => write!(f, "Null"),
            GraphValue::Bool(b) => write!(f, "Bool({})", b),
            GraphValue::Number(n) => write!(f, "Number({})", n),
            GraphValue::String(s) => write!(f, "String({:?})", s),
            GraphValue::Leaf(leaf) => write!(f, "Leaf({:?})", leaf),
            GraphValue::Array(items) => write!(f, "Array(len={})", items.borrow().len()),
            GraphValue::Object(fields) => write!(f, "Object(len={})", fields.borrow().len()),
        }
    }
}

impl From<bool> for GraphValue {
    fn from(b: bool) -> Self {
        GraphValue::Bool(b)
    }
}

impl From<i32> for GraphValue {
    fn from(n: i32) -> Self {
        GraphValue::Number(f64::from(n))
    }
}

impl From<i64> for GraphValue {
    fn from(n: i64) -> Self {
        GraphValue::Number(n as f64)
    }
}

impl From<f64> for GraphValue {
    fn from(n: f64) -> Self {
        GraphValue::Number(n)
    }
}

impl From<&str> for GraphValue {
    fn from(s: &str) -> Self {
        GraphValue::String(s.to_string())
    }
}

impl From<String> for GraphValue {
    fn from(s: String) -> Self {
        GraphValue::String(s)
    }
}

impl From<Leaf> for GraphValue {
    fn from(leaf: Leaf) -> Self {
        GraphValue::Leaf(leaf)
    }
}

/// Build an acyclic graph from a JSON tree.
impl From<&Value> for GraphValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => GraphValue::Null,
            Value::Bool(b) => GraphValue::Bool(*b),
            Value::Number(n) => GraphValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => GraphValue::String(s.clone()),
            Value::Array(items) => {
                let array = GraphValue::array();
                for item in items {
                    array.push(GraphValue::from(item));
                }
                array
            }
            Value::Object(fields) => {
                let object = GraphValue::object();
                for (key, item) in fields {
                    object.set(key.clone(), GraphValue::from(item));
                }
                object
            }
        }
    }
}

/// Integral values serialize without a fraction; non-finite numbers have
/// no JSON form and serialize as null.
fn number(n: f64) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn ref_marker(path: &str) -> Value {
    let mut marker = Map::new();
    marker.insert("$ref".to_string(), Value::String(path.to_string()));
    Value::Object(marker)
}

/// Convert a graph into a JSON tree, replacing repeated containers with `$ref` markers.
///
/// Terminates on any finite graph: each container is expanded at most once.
/// The returned tree is at most [`MAX_DEPTH`] containers deep.
pub fn decycle(value: &GraphValue) -> Value {
    let mut seen: HashMap<*const (), String> = HashMap::new();
    derez(value, "$", 0, &mut seen)
}

fn derez(
    value: &GraphValue,
    path: &str,
    depth: usize,
    seen: &mut HashMap<*const (), String>,
) -> Value {
    if depth > MAX_DEPTH && matches!(value, GraphValue::Array(_) | GraphValue::Object(_)) {
        return Value::String(MAX_DEPTH_MARKER.to_string());
    }
    match value {
        GraphValue::Null => Value::Null,
        GraphValue::Bool(b) => Value::Bool(*b),
        GraphValue::Number(n) => number(*n),
        GraphValue::String(s) => Value::String(s.clone()),
        GraphValue::Leaf(leaf) => leaf.to_json(),
        GraphValue::Array(items) => {
            let id = Rc::as_ptr(items) as *const ();
            if let Some(first) = seen.get(&id) {
                return ref_marker(first);
            }
            seen.insert(id, path.to_string());

            let items = items.borrow();
            let out = items
                .iter()
                .enumerate()
                .map(|(i, item)| derez(item, &format!("{}[{}]", path, i), depth + 1, seen))
                .collect();
            Value::Array(out)
        }
        GraphValue::Object(fields) => {
            let id = Rc::as_ptr(fields) as *const ();
            if let Some(first) = seen.get(&id) {
                return ref_marker(first);
            }
            seen.insert(id, path.to_string());

            let fields = fields.borrow();
            let mut out = Map::new();
            for (key, item) in fields.iter() {
                let child = derez(item, &format!("{}[{}]", path, key), depth + 1, seen);
                out.insert(key.clone(), child);
            }
            Value::Object(out)
        }
    }
}
