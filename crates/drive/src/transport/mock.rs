//! In-memory transport for testing.

use crate::error::{ErrorKind, Result};
use crate::fields::FieldSelection;
use crate::record::RawEntry;
use crate::transport::{ListRequest, ListResponse, Media, MediaChunk, NewEntry, Transport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};

/// Page size used when a request doesn't ask for one; same as the real API.
const DEFAULT_PAGE_SIZE: usize = 100;

struct Stored {
    meta: RawEntry,
    content: Vec<u8>,
}

/// In-memory transport for testing.
///
/// Entries are kept in insertion order behind a [`RwLock`], queries are
/// evaluated with [`Query::matches`](crate::query::Query::matches) and page
/// tokens are plain offsets. Responses only carry the requested fields, just
/// like the real service. Calls are counted, and faults can be queued with
/// [`fail_next`](Self::fail_next) to exercise error paths.
pub struct MockTransport {
    name: String,
    entries: RwLock<Vec<Stored>>,
    page_size: usize,
    failures: Mutex<VecDeque<ErrorKind>>,
    empty_pages: AtomicUsize,
    next_id: AtomicUsize,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    create_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl MockTransport {
    /// Create a mock transport pre-populated with entries (without content).
    ///
    /// Panics if any entry is not a JSON object. If test setup is wrong, then
    /// the test should not pass.
    pub fn with_entries(entries: impl IntoIterator<Item = Value>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| match entry {
                Value::Object(meta) => Stored { meta, content: Vec::new() },
                other => panic!("MockTransport::with_entries: not an object: {other}"),
            })
            .collect();
        Self {
            name: "mock".to_string(),
            entries: RwLock::new(entries),
            page_size: DEFAULT_PAGE_SIZE,
            failures: Mutex::new(VecDeque::new()),
            empty_pages: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
        }
    }

    /// Add a file with content. Its `size` is derived from the content.
    pub fn with_file(mut self, meta: Value, content: impl Into<Vec<u8>>) -> Self {
        let Value::Object(mut meta) = meta else {
            panic!("MockTransport::with_file: not an object");
        };
        let content = content.into();
        meta.insert("size".to_string(), Value::String(content.len().to_string()));
        self.entries.get_mut().push(Stored { meta, content });
        self
    }

    /// Page size used when requests don't specify one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Answer the next `count` list calls with an empty page whose token
    /// points back at the requested offset, as the real service sometimes does.
    pub fn with_empty_pages(mut self, count: usize) -> Self {
        *self.empty_pages.get_mut() = count;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make the next call (of any kind) fail with `kind`. Queued faults are
    /// consumed in order, one per call.
    pub async fn fail_next(&self, kind: ErrorKind) {
        self.failures.lock().await.push_back(kind);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    /// Full stored metadata of an entry, regardless of field selection.
    pub async fn entry(&self, id: &str) -> Option<RawEntry> {
        self.entries.read().await.iter().find(|s| has_id(&s.meta, id)).map(|s| s.meta.clone())
    }

    pub async fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.entries.read().await.iter().find(|s| has_id(&s.meta, id)).map(|s| s.content.clone())
    }

    async fn injected_failure(&self) -> Result<()> {
        match self.failures.lock().await.pop_front() {
            Some(kind) => Err(exn::Exn::from(kind)),
            None => Ok(()),
        }
    }
}
impl Default for MockTransport {
    fn default() -> Self {
        Self::with_entries([])
    }
}

fn has_id(meta: &RawEntry, id: &str) -> bool {
    meta.get("id").and_then(Value::as_str) == Some(id)
}

fn project(meta: &RawEntry, fields: &FieldSelection) -> RawEntry {
    meta.iter().filter(|(k, _)| fields.contains(k)).map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, request: &ListRequest) -> Result<ListResponse> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure().await?;
        let offset = match &request.page_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                exn::Exn::from(ErrorKind::Api {
                    status: 400,
                    message: format!("invalid page token: {token}"),
                })
            })?,
            None => 0,
        };
        let empty = self
            .empty_pages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if empty {
            return Ok(ListResponse {
                files: Vec::new(),
                next_page_token: Some(offset.to_string()),
            });
        }
        let page_size = request.page_size.map_or(self.page_size, |size| size as usize).max(1);
        let guard = self.entries.read().await;
        let matching: Vec<&Stored> = guard.iter().filter(|s| request.query.matches(&s.meta)).collect();
        let files = matching.iter().skip(offset).take(page_size).map(|s| project(&s.meta, &request.fields)).collect();
        let next = offset + page_size;
        let next_page_token = (next < matching.len()).then(|| next.to_string());
        Ok(ListResponse { files, next_page_token })
    }

    async fn get(&self, file_id: &str, fields: &FieldSelection) -> Result<RawEntry> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure().await?;
        let guard = self.entries.read().await;
        let stored = guard
            .iter()
            .find(|s| has_id(&s.meta, file_id))
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(file_id.to_string())))?;
        Ok(project(&stored.meta, fields))
    }

    async fn create(&self, entry: &NewEntry, media: Option<Media>) -> Result<RawEntry> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure().await?;
        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut meta = RawEntry::new();
        meta.insert("id".to_string(), Value::String(id.clone()));
        meta.insert("name".to_string(), Value::String(entry.name.clone()));
        if let Some(mime_type) = &entry.mime_type {
            meta.insert("mimeType".to_string(), Value::String(mime_type.clone()));
        }
        if !entry.parents.is_empty() {
            meta.insert("parents".to_string(), entry.parents.iter().cloned().map(Value::String).collect());
        }
        let content = match media {
            Some(media) => {
                meta.insert("size".to_string(), Value::String(media.data.len().to_string()));
                meta.entry("mimeType").or_insert(Value::String(media.mime_type));
                media.data
            },
            None => Vec::new(),
        };
        self.entries.write().await.push(Stored { meta, content });
        let mut created = RawEntry::new();
        created.insert("id".to_string(), Value::String(id));
        Ok(created)
    }

    async fn download_range(&self, file_id: &str, offset: u64, length: u64) -> Result<MediaChunk> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.injected_failure().await?;
        let guard = self.entries.read().await;
        let stored = guard
            .iter()
            .find(|s| has_id(&s.meta, file_id))
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(file_id.to_string())))?;
        let total = stored.content.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(total);
        let end = usize::try_from(offset.saturating_add(length)).unwrap_or(usize::MAX).min(total);
        Ok(MediaChunk {
            data: stored.content[start..end].to_vec(),
            total_size: total as u64,
        })
    }
}
