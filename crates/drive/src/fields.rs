//! Field selection parsing and merging.
//!
//! Drive only returns the attributes a request asks for, so every call carries
//! a comma-separated field list. [`FieldSelection`] is that list in parsed
//! form; [`Select`] is what callers hand to the facade to pick a base list and
//! append extra fields to it.

use std::fmt;

/// Field selection used when nothing else is configured.
pub use drivekit_config::DEFAULT_FIELDS;

/// Ordered list of requested field names.
///
/// Names are trimmed and empty segments dropped. Duplicates are kept as-is:
/// the server tolerates them and the resulting record simply sets the same
/// attribute twice.
///
/// # Examples
///
/// ```
/// use drivekit_drive::FieldSelection;
///
/// let fields = FieldSelection::parse("id, name,mimeType");
/// assert_eq!(fields.to_string(), "id, name, mimeType");
/// assert_eq!(fields.list_fields(), "files(id, name, mimeType), nextPageToken");
/// assert!(fields.contains("mimeType"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldSelection(Vec<String>);

impl FieldSelection {
    pub fn parse(fields: impl AsRef<str>) -> Self {
        Self(
            fields
                .as_ref()
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Append `more` to this selection without deduplicating.
    pub fn extend(mut self, more: &FieldSelection) -> Self {
        self.0.extend(more.0.iter().cloned());
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|f| f == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `fields` parameter for list requests.
    pub fn list_fields(&self) -> String {
        format!("files({self}), nextPageToken")
    }
}
impl Default for FieldSelection {
    fn default() -> Self {
        Self::parse(DEFAULT_FIELDS)
    }
}
impl fmt::Display for FieldSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}
impl From<&str> for FieldSelection {
    fn from(fields: &str) -> Self {
        Self::parse(fields)
    }
}

/// Caller-side field selection: an optional base list plus optional extras.
///
/// An unset (or empty) base falls back to the client's default fields; extra
/// fields are appended to whichever base wins.
///
/// ```
/// use drivekit_drive::{FieldSelection, Select};
///
/// let select = Select::default().more("parents");
/// let fields = select.resolve(&FieldSelection::default());
/// assert_eq!(fields.to_string(), "kind, id, name, mimeType, size, parents");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Select {
    fields: Option<FieldSelection>,
    more: Option<FieldSelection>,
}

impl Select {
    /// Replace the default field list.
    pub fn fields(fields: impl Into<FieldSelection>) -> Self {
        Self {
            fields: Some(fields.into()),
            more: None,
        }
    }

    /// Append fields to the base list.
    pub fn more(mut self, more: impl Into<FieldSelection>) -> Self {
        self.more = Some(more.into());
        self
    }

    pub fn resolve(&self, default: &FieldSelection) -> FieldSelection {
        let base = match &self.fields {
            Some(fields) if !fields.is_empty() => fields.clone(),
            _ => default.clone(),
        };
        match &self.more {
            Some(more) => base.extend(more),
            None => base,
        }
    }
}
