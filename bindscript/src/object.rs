//! Objects and function values.
//!
//! Objects keep insertion order (`Object.keys`, `for...in` and JSON output
//! follow it) with a hash index for lookups.

use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::ast::ArrowFunction;
use crate::error::ScriptResult;
use crate::interpreter::NativeCall;
use crate::scope::ScopeId;
use crate::value::Value;

/// Property key produced by member access.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// Named key.
    Name(String),
    /// Integer index (arrays and strings).
    Index(usize),
}

impl PropertyKey {
    /// Key as an object property name.
    pub fn to_name(&self) -> String {
        match self {
            PropertyKey::Name(name) => name.clone(),
            PropertyKey::Index(i) => i.to_string(),
        }
    }

    /// Key as an array index, if it is one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PropertyKey::Index(i) => Some(*i),
            PropertyKey::Name(name) => {
                if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
                    return None;
                }
                name.parse().ok()
            }
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::Name(s.into())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::Name(s)
    }
}

impl From<usize> for PropertyKey {
    fn from(i: usize) -> Self {
        PropertyKey::Index(i)
    }
}

/// A plain script object.
#[derive(Clone, Debug, Default)]
pub struct ScriptObject {
    /// Properties in insertion order.
    entries: Vec<(String, Value)>,
    /// Name to position in `entries`.
    index: HashMap<String, usize>,
}

impl ScriptObject {
    /// Create a new empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a property; missing properties read as undefined.
    pub fn get(&self, key: &str) -> Value {
        self.get_own(key).cloned().unwrap_or_default()
    }

    /// Get a property if present.
    pub fn get_own(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    /// Set a property, keeping the position of an existing key.
    pub fn set<K: Into<String>>(&mut self, key: K, value: Value) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// Check for an own property.
    pub fn has(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Delete a property. Returns whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        let Some(position) = self.index.remove(key) else {
            return false;
        };
        self.entries.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        true
    }

    /// Property names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Iterate over properties in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the object has no properties.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ScriptObject {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut obj = ScriptObject::new();
        for (key, value) in iter {
            obj.set(key, value);
        }
        obj
    }
}

/// Host function signature. Receives the call site and the arguments.
pub type NativeFn = dyn Fn(&mut NativeCall<'_>, &[Value]) -> ScriptResult<Value>;

/// Callable value.
#[derive(Clone, Debug)]
pub enum Function {
    /// Script function with its captured environment.
    Closure(Closure),
    /// Host function.
    Native(NativeFunction),
}

impl Function {
    /// Create a native function.
    pub fn native<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut NativeCall<'_>, &[Value]) -> ScriptResult<Value> + 'static,
    {
        Function::Native(NativeFunction {
            name: name.into(),
            func: Rc::new(func),
        })
    }

    /// Get function name.
    pub fn name(&self) -> &str {
        match self {
            Function::Closure(closure) => closure.function.name.as_deref().unwrap_or(""),
            Function::Native(native) => &native.name,
        }
    }
}

/// Closure created from an arrow or function expression.
#[derive(Clone, Debug)]
pub struct Closure {
    /// Parameters and body.
    pub function: Rc<ArrowFunction>,
    /// Scope chain at creation time, outermost first.
    pub captured: Rc<[ScopeId]>,
}

/// Native function.
#[derive(Clone)]
pub struct NativeFunction {
    /// Function name.
    pub name: String,
    /// Function pointer.
    pub func: Rc<NativeFn>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_survives_delete() {
        let mut obj: ScriptObject = [("a", Value::from(1)), ("b", Value::from(2)), ("c", Value::from(3))]
            .into_iter()
            .collect();
        assert!(obj.delete("a"));
        obj.set("a", Value::from(4));
        obj.set("b", Value::from(5));
        assert_eq!(obj.keys(), vec!["b", "c", "a"]);
        assert_eq!(obj.get("b").to_number(), 5.0);
        assert!(obj.get("missing").is_undefined());
        assert!(!obj.delete("missing"));
    }

    #[test]
    fn test_index_keys() {
        assert_eq!(PropertyKey::from("3").as_index(), Some(3));
        assert_eq!(PropertyKey::from("03").as_index(), None);
        assert_eq!(PropertyKey::from("x").as_index(), None);
        assert_eq!(PropertyKey::Index(7).to_name(), "7");
    }
}
