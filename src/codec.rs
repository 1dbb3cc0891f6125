//! JSON encoding of records.
//!
//! The document root is encoded as a plain object of its fields; the root's
//! kind lives in the store path. Nested records carry their kind under
//! [`KIND_TAG`] so decoding can rebuild the registered kind. Output uses
//! `", "` and `": "` separators: `{"test": "bla"}`.
//!
//! A field whose own name is the tag, optionally behind leading `~`s, is
//! written with one more `~` and read back with one less, so records may
//! use any field name.

use std::borrow::Cow;
use std::io;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::ser::Formatter;
use serde_json::Value as Json;

use crate::error::DecodeError;
use crate::object::{Object, Value};
use crate::registry::Registry;

/// Reserved field carrying the kind of a nested record.
pub const KIND_TAG: &str = "__kind__";

const ESCAPE: char = '~';

fn is_tag_like(key: &str) -> bool {
    key.trim_start_matches(ESCAPE) == KIND_TAG
}

fn escape_key(key: &str) -> Cow<'_, str> {
    if is_tag_like(key) {
        Cow::Owned(format!("{}{}", ESCAPE, key))
    } else {
        Cow::Borrowed(key)
    }
}

/// Field name for a document key, `None` for the tag itself.
fn unescape_key(key: String) -> Option<String> {
    if key == KIND_TAG {
        None
    } else if is_tag_like(&key) {
        Some(key[ESCAPE.len_utf8()..].to_string())
    } else {
        Some(key)
    }
}

/// Compact output with a space after every separator.
struct Spaced;

impl Formatter for Spaced {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Real(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Record(obj) => Tagged(obj).serialize(serializer),
        }
    }
}

/// Root form: fields only.
impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.items() {
            map.serialize_entry(&escape_key(key), value)?;
        }
        map.end()
    }
}

/// Nested form: kind tag first, then fields.
struct Tagged<'a>(&'a Object);

impl Serialize for Tagged<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len() + 1))?;
        map.serialize_entry(KIND_TAG, self.0.kind())?;
        for (key, value) in self.0.items() {
            map.serialize_entry(&escape_key(key), value)?;
        }
        map.end()
    }
}

fn to_text<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, Spaced);
    value.serialize(&mut ser)?;
    // serde_json only ever writes UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Encode a record as a root document.
pub fn encode(obj: &Object) -> Result<String, serde_json::Error> {
    to_text(obj)
}

pub fn encode_value(value: &Value) -> Result<String, serde_json::Error> {
    to_text(value)
}

/// Decode a root document into a fresh record of `kind`.
///
/// Fields come back in document order. Template fields of `kind` that the
/// document lacks follow them with their template values.
pub fn decode(registry: &Registry, kind: &str, text: &str) -> Result<Object, DecodeError> {
    match serde_json::from_str::<Json>(text)? {
        Json::Object(map) => build(registry, kind, map),
        _ => Err(DecodeError::NotAnObject),
    }
}

fn build(
    registry: &Registry,
    kind: &str,
    map: serde_json::Map<String, Json>,
) -> Result<Object, DecodeError> {
    let template = registry.construct(kind)?;
    let mut obj = Object::with_kind(template.kind());
    for (key, value) in map {
        let Some(key) = unescape_key(key) else {
            continue;
        };
        let value = convert(registry, value)?;
        obj.set(key, value);
    }
    for (key, value) in template.items() {
        if !obj.contains(key) {
            obj.set(key, value.clone());
        }
    }
    Ok(obj)
}

fn convert(registry: &Registry, json: Json) -> Result<Value, DecodeError> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Real(n.as_f64().ok_or(DecodeError::Field {
                field: n.to_string(),
                reason: "number out of range".to_string(),
            })?),
        },
        Json::String(s) => Value::Text(s),
        Json::Array(items) => Value::List(
            items
                .into_iter()
                .map(|item| convert(registry, item))
                .collect::<Result<_, _>>()?,
        ),
        Json::Object(map) => {
            let kind = match map.get(KIND_TAG) {
                Some(Json::String(kind)) => kind.clone(),
                Some(_) => return Err(DecodeError::BadTag),
                None => return Err(DecodeError::Untagged),
            };
            Value::Record(build(registry, &kind, map)?)
        }
    })
}
