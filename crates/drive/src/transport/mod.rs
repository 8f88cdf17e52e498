//! Transport trait and implementations.
//!
//! This module defines the `Transport` trait, the narrow seam between the
//! typed query layer and whatever actually talks to the storage service: the
//! Drive v3 REST API, an in-memory fake for tests, or a decorator wrapping
//! either of those.

#[cfg(feature = "http")]
mod auth;
#[cfg(feature = "http")]
mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod retry;

#[cfg(feature = "http")]
pub use self::http::HttpTransport;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockTransport;
pub use self::retry::{RetryPolicy, RetryTransport};
use crate::error::Result;
use crate::fields::FieldSelection;
use crate::query::Query;
use crate::record::RawEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Parameters of a single `files.list` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub query: Query,
    pub fields: FieldSelection,
    /// Opaque cursor from the previous page; `None` requests the first page.
    pub page_token: Option<String>,
    pub page_size: Option<u32>,
}

/// One page of a `files.list` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub files: Vec<RawEntry>,
    /// Absent on the last page.
    pub next_page_token: Option<String>,
}

/// Metadata for a file or folder about to be created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

/// Binary payload for uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A slice of a file's content together with the full content length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaChunk {
    pub data: Vec<u8>,
    pub total_size: u64,
}

/// Unified interface for talking to the storage service.
///
/// Implementations only move data; they never interpret field selections
/// beyond passing them on, and never retry on their own (wrap them in a
/// [`RetryTransport`] for that).
///
/// # Errors
///
/// - [`NotFound`](crate::error::ErrorKind::NotFound) when the addressed
///   entry does not exist,
/// - [`Network`](crate::error::ErrorKind::Network) /
///   [`Busy`](crate::error::ErrorKind::Busy) for failures worth retrying,
/// - anything else for failures that are not.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Name of the transport, for logging only.
    fn name(&self) -> &str;

    /// Fetch one page of entries matching the request's query.
    async fn list(&self, request: &ListRequest) -> Result<ListResponse>;

    /// Fetch a single entry's metadata by ID.
    async fn get(&self, file_id: &str, fields: &FieldSelection) -> Result<RawEntry>;

    /// Create an entry, optionally with content. Returns at least its `id`.
    async fn create(&self, entry: &NewEntry, media: Option<Media>) -> Result<RawEntry>;

    /// Read `length` bytes of content starting at `offset`.
    ///
    /// Returns fewer bytes than asked for at the end of the content, and an
    /// empty chunk when `offset` is at or past the end.
    async fn download_range(&self, file_id: &str, offset: u64, length: u64) -> Result<MediaChunk>;
}
