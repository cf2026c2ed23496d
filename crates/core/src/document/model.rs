use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::id::DocumentId;
use crate::error::StoreError;

/// Reserved field holding a document's identifier.
pub const ID_FIELD: &str = "_id";

/// Separator between the segments of a field path (`address.city`).
pub const PATH_SEPARATOR: char = '.';

/// A stored document: a loosely-typed nested map. Document shape varies
/// per collection, so everything below the collection layer works on this
/// rather than on concrete structs.
pub type Document = Map<String, Value>;

/// Serialize a typed value into a document. Fails when `T` does not
/// serialize to a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(serde::de::Error::custom(format!(
            "expected a document, found {}",
            kind_of(&other)
        )))),
    }
}

/// Deserialize a stored document into its typed form.
pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(document))?)
}

/// The identifier stored under `_id`, if present and well formed.
pub fn document_id(document: &Document) -> Option<DocumentId> {
    document.get(ID_FIELD).and_then(DocumentId::from_value)
}

/// Resolve a dotted path inside a document. Numeric segments index into
/// lists.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split(PATH_SEPARATOR);
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Structural equality with numeric normalization: integers compare
/// exactly, and as soon as either side is a float both sides compare as
/// `f64`, so `5` equals `5.0`.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            if let (Some(l), Some(r)) = (l.as_i64(), r.as_i64()) {
                l == r
            } else if let (Some(l), Some(r)) = (l.as_u64(), r.as_u64()) {
                l == r
            } else {
                l.as_f64() == r.as_f64()
            }
        }
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l
                    .iter()
                    .all(|(key, l)| r.get(key).is_some_and(|r| values_equal(l, r)))
        }
        _ => left == right,
    }
}

/// Canonical text form of a value, consistent with [`values_equal`]:
/// equal values encode to the same string. Object keys come out sorted and
/// integral floats are written as integers.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => out.push_str(&i.to_string()),
            (_, Some(u), _) => out.push_str(&u.to_string()),
            (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
                out.push_str(&(f as i64).to_string())
            }
            _ => out.push_str(&n.to_string()),
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        other => out.push_str(&other.to_string()),
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "document",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Movie {
        name: String,
        year: u16,
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn typed_values_convert_to_documents_and_back() {
        let movie = Movie {
            name: "Alien".into(),
            year: 1979,
        };
        let document = to_document(&movie).unwrap();
        assert_eq!(document.get("year"), Some(&json!(1979)));
        assert_eq!(from_document::<Movie>(document).unwrap(), movie);
    }

    #[test]
    fn scalars_are_not_documents() {
        assert!(matches!(to_document(&42), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn get_path_walks_maps_and_lists() {
        let d = doc(json!({"cast": [{"name": "Ripley"}], "meta": {"rating": 8.5}}));
        assert_eq!(get_path(&d, "cast.0.name"), Some(&json!("Ripley")));
        assert_eq!(get_path(&d, "meta.rating"), Some(&json!(8.5)));
        assert_eq!(get_path(&d, "meta.missing"), None);
        assert_eq!(get_path(&d, "cast.x"), None);
    }

    #[test]
    fn integer_and_float_with_same_value_are_equal() {
        assert!(values_equal(&json!(5), &json!(5.0)));
        assert!(values_equal(&json!({"a": [1, 2.0]}), &json!({"a": [1.0, 2]})));
        assert!(!values_equal(&json!(5), &json!(5.5)));
        assert!(!values_equal(&json!(5), &json!("5")));
    }

    #[test]
    fn canonical_string_agrees_with_equality() {
        assert_eq!(canonical_string(&json!(5)), canonical_string(&json!(5.0)));
        assert_eq!(
            canonical_string(&json!({"b": 1, "a": [true, null]})),
            r#"{"a":[true,null],"b":1}"#
        );
        assert_ne!(canonical_string(&json!("5")), canonical_string(&json!(5)));
    }
}
