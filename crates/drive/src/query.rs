//! Search query composition.
//!
//! Drive's `q` parameter has its own small grammar. Only the handful of
//! clause shapes this crate needs are modelled, always joined with `and`:
//! no `or`, no grouping, no ordering operators.

use crate::record::RawEntry;
use serde_json::Value;
use std::fmt;

/// Well-known mime types.
pub struct MimeType;
impl MimeType {
    pub const DEFAULT: &'static str = "application/octet-stream";
    pub const BINARY: &'static str = "application/octet-stream";
    /// Discriminator separating folders from regular files.
    pub const FOLDER: &'static str = "application/vnd.google-apps.folder";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// `field='value'`
    Eq(String, String),
    /// `field!='value'`
    NotEq(String, String),
    /// `'id' in parents`
    InParents(String),
}
impl Clause {
    /// Evaluate the clause against a raw entry, the way the server would.
    pub fn matches(&self, entry: &RawEntry) -> bool {
        match self {
            Self::Eq(field, value) => entry.get(field).and_then(Value::as_str) == Some(value.as_str()),
            Self::NotEq(field, value) => entry.get(field).and_then(Value::as_str) != Some(value.as_str()),
            Self::InParents(id) => entry
                .get("parents")
                .and_then(Value::as_array)
                .is_some_and(|parents| parents.iter().any(|p| p.as_str() == Some(id.as_str()))),
        }
    }
}
impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq(field, value) => write!(f, "{field}='{}'", escape(value)),
            Self::NotEq(field, value) => write!(f, "{field}!='{}'", escape(value)),
            Self::InParents(id) => write!(f, "'{}' in parents", escape(id)),
        }
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// A conjunction of [`Clause`]s.
///
/// # Examples
///
/// ```
/// use drivekit_drive::query::{MimeType, Query};
///
/// let query = Query::default().eq("name", "report").eq("mimeType", MimeType::FOLDER);
/// assert_eq!(
///     query.to_string(),
///     "name='report' and mimeType='application/vnd.google-apps.folder'"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    /// Compose equality clauses from `(field, value)` pairs, in order.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        pairs.into_iter().fold(Self::default(), |query, (field, value)| query.eq(field, value))
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push(Clause::Eq(field.into(), value.into()));
        self
    }

    pub fn not_eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push(Clause::NotEq(field.into(), value.into()));
        self
    }

    pub fn in_parents(mut self, id: impl Into<String>) -> Self {
        self.clauses.push(Clause::InParents(id.into()));
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// `true` if every clause matches. The empty query matches everything.
    pub fn matches(&self, entry: &RawEntry) -> bool {
        self.clauses.iter().all(|clause| clause.matches(entry))
    }
}
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}
