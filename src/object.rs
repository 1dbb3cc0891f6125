//! Schema-less records.
//!
//! An [`Object`] is an insertion-ordered bag of fields tagged with the name of
//! the kind it was constructed as. Concrete kinds (see [`Kind`]) are typed views
//! over an `Object` that register a constructor with the
//! [`Registry`](crate::registry::Registry) so stored data decodes back into the
//! right kind.

use std::fmt;

use crate::codec;
use crate::error::DecodeError;

/// A field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
    List(Vec<Value>),
    Record(Object),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Object> {
        match self {
            Value::Record(obj) => Some(obj),
            _ => None,
        }
    }

    /// Guess a scalar from user text: booleans, integers, reals, else text.
    pub fn guess(text: &str) -> Value {
        match text {
            "true" | "True" => return Value::Bool(true),
            "false" | "False" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(i) = text.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            if f.is_finite() {
                return Value::Real(f);
            }
        }
        Value::Text(text.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => f.write_str(s),
            other => {
                let text = codec::encode_value(other).map_err(|_| fmt::Error)?;
                f.write_str(&text)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Record(obj)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Insertion-ordered record.
///
/// Equality compares kind and fields; the provenance path is not part of it.
#[derive(Debug, Clone)]
pub struct Object {
    kind: String,
    fields: Vec<(String, Value)>,
    origin: Option<String>,
}

impl Object {
    /// Kind name of the base record.
    pub const KIND: &'static str = "opbot.object.Object";

    pub fn new() -> Self {
        Self::with_kind(Self::KIND)
    }

    pub fn with_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Vec::new(),
            origin: None,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Store path this record was last saved to or loaded from.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub(crate) fn set_origin(&mut self, path: impl Into<String>) {
        self.origin = Some(path.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Text field shortcut.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Set a field. Existing keys keep their position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy every field of `other` into this record.
    pub fn update(&mut self, other: &Object) {
        for (k, v) in other.items() {
            self.set(k, v.clone());
        }
    }

    /// Apply `key=value` pairs, guessing scalar types. Returns the number of
    /// fields set; pairs without `=` are ignored.
    pub fn edit<'a, I>(&mut self, pairs: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut count = 0;
        for pair in pairs {
            if let Some((key, value)) = pair.split_once('=') {
                if key.is_empty() {
                    continue;
                }
                self.set(key, Value::guess(value));
                count += 1;
            }
        }
        count
    }

    /// `key=value` pairs joined by spaces. `keys` restricts output to a
    /// comma-separated key list, `skip` drops keys.
    pub fn printable(&self, keys: Option<&str>, skip: Option<&str>) -> String {
        let wanted: Option<Vec<&str>> = keys.map(|k| k.split(',').filter(|s| !s.is_empty()).collect());
        let skipped: Vec<&str> = skip
            .map(|s| s.split(',').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let mut parts = Vec::new();
        match wanted {
            Some(wanted) => {
                for key in wanted {
                    if skipped.contains(&key) {
                        continue;
                    }
                    if let Some(value) = self.get(key) {
                        parts.push(format!("{}={}", key, value));
                    }
                }
            }
            None => {
                for (key, value) in self.items() {
                    if !skipped.contains(&key) {
                        parts.push(format!("{}={}", key, value));
                    }
                }
            }
        }
        parts.join(" ")
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.fields == other.fields
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = codec::encode(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// A concrete record kind with declared fields.
///
/// Implementors are registered with `Registry::add_kind::<T>()`; the template
/// is the zero-argument constructor used when stored data of this kind is
/// decoded.
pub trait Kind: Sized {
    /// Module-qualified kind name, e.g. `opbot.todo.Todo`.
    const KIND: &'static str;

    /// Fresh record of this kind carrying its declared fields.
    fn template() -> Object;

    fn from_object(obj: &Object) -> Result<Self, DecodeError>;

    fn into_object(self) -> Object;
}

/// Fetch a text field or report which one is missing.
pub fn require_text(obj: &Object, field: &str) -> Result<String, DecodeError> {
    obj.text(field)
        .map(str::to_string)
        .ok_or_else(|| DecodeError::Field {
            field: field.to_string(),
            reason: "expected text".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_object_is_empty() {
        let obj = Object::new();
        assert!(obj.is_empty());
        assert_eq!(obj.len(), 0);
        assert_eq!(obj.kind(), "opbot.object.Object");
        assert!(obj.origin().is_none());
    }

    #[test]
    fn test_set_and_contains() {
        let mut obj = Object::new();
        obj.set("key", "value");
        assert!(obj.contains("key"));
        assert_eq!(obj.text("key"), Some("value"));
    }

    #[test]
    fn test_set_keeps_position() {
        let mut obj = Object::new();
        obj.set("a", 1);
        obj.set("b", 2);
        obj.set("a", 3);
        assert_eq!(obj.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(obj.get("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_remove() {
        let mut obj = Object::new();
        obj.set("key", "value");
        assert_eq!(obj.remove("key"), Some(Value::from("value")));
        assert!(!obj.contains("key"));
        assert!(obj.remove("key").is_none());
    }

    #[test]
    fn test_items_and_values() {
        let mut obj = Object::new();
        obj.set("key", "value");
        assert_eq!(obj.items().collect::<Vec<_>>(), vec![("key", &Value::from("value"))]);
        assert_eq!(obj.values().collect::<Vec<_>>(), vec![&Value::from("value")]);
    }

    #[test]
    fn test_update() {
        let mut src = Object::new();
        src.set("key", "value");
        let mut dst = Object::new();
        dst.set("other", true);
        dst.update(&src);
        assert_eq!(dst.keys().collect::<Vec<_>>(), vec!["other", "key"]);
        assert_eq!(dst.text("key"), Some("value"));
    }

    #[test]
    fn test_edit_guesses_types() {
        let mut obj = Object::new();
        let n = obj.edit(["name=bot", "count=3", "ratio=0.5", "on=true", "junk"]);
        assert_eq!(n, 4);
        assert_eq!(obj.get("name"), Some(&Value::Text("bot".into())));
        assert_eq!(obj.get("count"), Some(&Value::Int(3)));
        assert_eq!(obj.get("ratio"), Some(&Value::Real(0.5)));
        assert_eq!(obj.get("on"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_printable_empty() {
        assert_eq!(Object::new().printable(None, None), "");
    }

    #[test]
    fn test_printable_selected_keys() {
        let mut obj = Object::new();
        obj.edit(["debug=true", "workdir=/tmp", "verbose=false"]);
        assert_eq!(obj.printable(Some("debug,verbose"), None), "debug=true verbose=false");
        assert_eq!(obj.printable(None, Some("workdir")), "debug=true verbose=false");
    }

    #[test]
    fn test_display_empty() {
        assert_eq!(Object::new().to_string(), "{}");
    }

    #[test]
    fn test_equality_ignores_origin() {
        let mut a = Object::new();
        a.set("k", 1);
        let mut b = a.clone();
        b.set_origin("opbot.object.Object/2026-01-01/00:00:00.000000000");
        assert_eq!(a, b);

        let c = Object::with_kind("opbot.todo.Todo");
        assert_ne!(Object::new(), c);
    }

    #[test]
    fn test_require_text() {
        let mut obj = Object::new();
        obj.set("txt", "hi");
        obj.set("n", 1);
        assert_eq!(require_text(&obj, "txt").unwrap(), "hi");
        assert!(require_text(&obj, "n").is_err());
    }
}
