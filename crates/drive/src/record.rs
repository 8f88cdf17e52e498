//! Typed records built from loosely-typed server responses.

use crate::error::{ErrorKind, Result};
use crate::fields::FieldSelection;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A single file/folder resource as returned by the server, before any typing.
pub type RawEntry = Map<String, Value>;

/// Server field names that surface under a different attribute name.
const RENAMES: &[(&str, &str)] = &[
    ("mimeType", "mime_type"),
    ("modifiedTime", "modified_time"),
    ("createdTime", "created_time"),
    ("webViewLink", "web_view_link"),
    ("quotaBytesUsed", "quota_bytes_used"),
];

/// Declared type of a record attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Str,
    Int,
    Bool,
    List,
}
impl FieldType {
    /// Type (and therefore default) declared for a server field.
    ///
    /// Anything not listed here is a string.
    pub fn of(field: &str) -> Self {
        match field {
            "size" | "quotaBytesUsed" | "version" => Self::Int,
            "trashed" | "starred" => Self::Bool,
            "parents" => Self::List,
            _ => Self::Str,
        }
    }

    pub fn default_value(self) -> FieldValue {
        match self {
            Self::Str => FieldValue::Str(String::new()),
            Self::Int => FieldValue::Int(0),
            Self::Bool => FieldValue::Bool(false),
            Self::List => FieldValue::List(Vec::new()),
        }
    }

    /// Coerce a server value into this type. `field` is only used for errors.
    pub fn coerce(self, field: &str, value: &Value) -> Result<FieldValue> {
        let fail = || {
            exn::Exn::from(ErrorKind::Conversion {
                field: field.to_string(),
                value: value.to_string(),
            })
        };
        Ok(match self {
            Self::Str => FieldValue::Str(stringify(value)),
            Self::Int => FieldValue::Int(match value {
                Value::Number(n) => n.as_i64().ok_or_else(fail)?,
                Value::String(s) => s.trim().parse().map_err(|_| fail())?,
                Value::Bool(b) => i64::from(*b),
                _ => return Err(fail()),
            }),
            Self::Bool => FieldValue::Bool(match value {
                Value::Bool(b) => *b,
                Value::String(s) if s == "true" => true,
                Value::String(s) if s == "false" => false,
                _ => return Err(fail()),
            }),
            Self::List => match value {
                Value::Array(items) => FieldValue::List(items.iter().map(stringify).collect()),
                _ => return Err(fail()),
            },
        })
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Attribute name a server field is stored under.
///
/// ```
/// use drivekit_drive::record::attribute_name;
///
/// assert_eq!(attribute_name("mimeType"), "mime_type");
/// assert_eq!(attribute_name("name"), "name");
/// ```
pub fn attribute_name(field: &str) -> &str {
    RENAMES.iter().find(|(from, _)| *from == field).map_or(field, |(_, to)| *to)
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
}
impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }
}
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::List(l) => write!(f, "[{}]", l.join(", ")),
        }
    }
}

/// A file or folder with exactly the attributes that were requested.
///
/// Every selected field is populated, either from the server response or from
/// the field's declared default; nothing outside the selection is ever
/// populated, even if the server sent it. Attributes are looked up by their
/// (possibly renamed) attribute name, e.g. `mime_type` for `mimeType`.
///
/// # Examples
///
/// ```
/// use drivekit_drive::{Entry, FieldSelection};
/// use serde_json::json;
///
/// let raw = json!({"id": "1", "name": "a", "mimeType": "application/pdf", "size": "10"});
/// let fields = FieldSelection::parse("id,name,mimeType,size");
/// let entry = Entry::from_raw(raw.as_object().unwrap(), &fields).unwrap();
/// assert_eq!(entry.id(), Some("1"));
/// assert_eq!(entry.mime_type(), Some("application/pdf"));
/// assert_eq!(entry.size(), Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    attributes: BTreeMap<String, FieldValue>,
}

impl Entry {
    /// Build a record from a raw server mapping and the fields that were
    /// requested for it.
    ///
    /// Missing or `null` fields fall back to their defaults; a present value
    /// that can't be coerced to the declared type aborts construction with
    /// [`Conversion`](ErrorKind::Conversion).
    pub fn from_raw(raw: &RawEntry, fields: &FieldSelection) -> Result<Self> {
        let mut attributes = BTreeMap::new();
        for field in fields.iter() {
            let kind = FieldType::of(field);
            let value = match raw.get(field) {
                None | Some(Value::Null) => kind.default_value(),
                Some(value) => kind.coerce(field, value)?,
            };
            attributes.insert(attribute_name(field).to_string(), value);
        }
        Ok(Self { attributes })
    }

    /// Look up an attribute by attribute name.
    pub fn get(&self, attribute: &str) -> Option<&FieldValue> {
        self.attributes.get(attribute)
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    /// Attribute names and values, ordered by name.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(FieldValue::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(FieldValue::as_str)
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.get("mime_type").and_then(FieldValue::as_str)
    }

    pub fn size(&self) -> Option<i64> {
        self.get("size").and_then(FieldValue::as_int)
    }

    pub fn parents(&self) -> Option<&[String]> {
        self.get("parents").and_then(FieldValue::as_list)
    }
}
impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID: {}", self.id().unwrap_or_default())
    }
}
