//! Query facade: the entry point callers use to look up, list, create and
//! transfer entries.

mod files;
mod folders;

pub use self::files::Files;
pub use self::folders::Folders;
use crate::TransportHandle;
use crate::error::{ErrorKind, Result};
use crate::fields::{FieldSelection, Select};
use crate::listing::Listing;
use crate::query::{MimeType, Query};
use crate::record::Entry;
use crate::transfer::created_id;
use crate::transport::{NewEntry, RetryPolicy, RetryTransport};
use drivekit_config::Config;
use std::sync::Arc;
use tracing::instrument;

/// Which entries a facade sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every entry, regardless of type.
    Any,
    /// Only entries with the folder mime type.
    Folders,
}
impl Scope {
    /// The mime type this scope is restricted to, if any.
    pub fn mime_type(self) -> Option<&'static str> {
        match self {
            Self::Any => None,
            Self::Folders => Some(MimeType::FOLDER),
        }
    }

    fn restrict(self, query: Query) -> Query {
        match self.mime_type() {
            Some(mime_type) => query.eq("mimeType", mime_type),
            None => query,
        }
    }
}

/// Identifies a single entry, either by ID or by exact name.
///
/// The ID wins when both are given. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookup {
    pub id: Option<String>,
    pub name: Option<String>,
}
impl Lookup {
    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    fn target(&self) -> Result<Target<'_>> {
        fn non_empty(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.is_empty())
        }
        if let Some(id) = non_empty(&self.id) {
            return Ok(Target::Id(id));
        }
        if let Some(name) = non_empty(&self.name) {
            return Ok(Target::Name(name));
        }
        exn::bail!(ErrorKind::MissingArgument("id or name"))
    }
}

enum Target<'a> {
    Id(&'a str),
    Name(&'a str),
}

/// Client for the remote file store.
///
/// Cheap to clone: the transport is shared and the settings are small.
/// Lookups go through [`files`](Self::files) and [`folders`](Self::folders);
/// the methods on `Drive` itself are the scope-less building blocks they use.
#[derive(Clone)]
pub struct Drive {
    transport: TransportHandle,
    default_fields: FieldSelection,
    page_size: Option<u32>,
    chunk_size: u64,
}

impl Drive {
    /// Client with default settings, using the transport as-is.
    pub fn new(transport: TransportHandle) -> Self {
        Self::with_settings(transport, &Config::default())
    }

    /// Client using the listing and transfer settings of `config`. The
    /// transport is used as-is.
    pub fn with_settings(transport: TransportHandle, config: &Config) -> Self {
        Self {
            transport,
            default_fields: FieldSelection::parse(&config.listing.default_fields),
            page_size: config.listing.page_size,
            chunk_size: config.transfer.chunk_size,
        }
    }

    /// Client configured from `config`, with the transport wrapped in a
    /// [`RetryTransport`] following the configured retry policy.
    pub fn from_config(transport: TransportHandle, config: &Config) -> Self {
        let retrying = RetryTransport::new(transport, RetryPolicy::from(&config.retry));
        Self::with_settings(Arc::new(retrying), config)
    }

    /// Load credentials as configured and connect to the Drive v3 API.
    #[cfg(feature = "http")]
    pub async fn connect(config: &Config) -> Result<Self> {
        let credentials = crate::credentials::Credentials::load(&config.credentials).await?;
        let transport = crate::transport::HttpTransport::new(credentials)?;
        Ok(Self::from_config(Arc::new(transport), config))
    }

    pub fn with_default_fields(mut self, fields: impl Into<FieldSelection>) -> Self {
        self.default_fields = fields.into();
        self
    }

    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    pub fn default_fields(&self) -> &FieldSelection {
        &self.default_fields
    }

    pub fn page_size(&self) -> Option<u32> {
        self.page_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Every entry, whatever its type.
    pub fn files(&self) -> Files<'_> {
        Files::new(self)
    }

    /// Only folders.
    pub fn folders(&self) -> Folders<'_> {
        Folders::new(self)
    }

    /// Fetch one entry by ID.
    #[instrument(level = "debug", skip(self, fields), fields(transport = self.transport.name()))]
    pub async fn get_by_id(&self, id: &str, fields: &FieldSelection) -> Result<Entry> {
        let raw = self.transport.get(id, fields).await?;
        Entry::from_raw(&raw, fields)
    }

    /// Fetch the single entry matching `query`.
    ///
    /// No match is [`NotFound`](ErrorKind::NotFound), more than one is
    /// [`Ambiguous`](ErrorKind::Ambiguous). At most two entries are pulled.
    #[instrument(level = "debug", skip(self, query, fields), fields(transport = self.transport.name(), query = %query))]
    pub async fn get_one(&self, query: Query, fields: FieldSelection) -> Result<Entry> {
        let mut listing = Listing::new(self.transport.clone(), query, fields, Some(2));
        let Some(entry) = listing.next_entry().await? else {
            exn::bail!(ErrorKind::NotFound(listing.query().to_string()));
        };
        if listing.next_entry().await?.is_some() {
            exn::bail!(ErrorKind::Ambiguous(listing.query().to_string()));
        }
        Ok(entry)
    }

    /// Lazily list every entry matching `query`.
    pub fn list(&self, query: Query, fields: FieldSelection) -> Listing {
        Listing::new(self.transport.clone(), query, fields, self.page_size)
    }

    /// Create an entry without content. Returns its ID.
    #[instrument(level = "debug", skip(self), fields(transport = self.transport.name()))]
    pub async fn create_entry(&self, name: &str, mime_type: Option<&str>, parents: &[String]) -> Result<String> {
        if name.is_empty() {
            exn::bail!(ErrorKind::MissingArgument("name"));
        }
        let entry = NewEntry {
            name: name.to_string(),
            mime_type: mime_type.map(str::to_string),
            parents: parents.to_vec(),
        };
        let id = created_id(self.transport.create(&entry, None).await?)?;
        tracing::debug!(%id, "Created entry");
        Ok(id)
    }
}

/// Operations shared by [`Files`] and [`Folders`], parameterised by scope.
#[derive(Clone, Copy)]
struct Scoped<'a> {
    drive: &'a Drive,
    scope: Scope,
}

impl Scoped<'_> {
    fn fields(&self, select: &Select) -> FieldSelection {
        select.resolve(&self.drive.default_fields)
    }

    #[instrument(skip(self, select), fields(scope = ?self.scope))]
    async fn get(&self, lookup: &Lookup, select: &Select) -> Result<Entry> {
        let fields = self.fields(select);
        match lookup.target()? {
            Target::Id(id) => {
                let Some(mime_type) = self.scope.mime_type() else {
                    return self.drive.get_by_id(id, &fields).await;
                };
                if !fields.contains("mimeType") {
                    exn::bail!(ErrorKind::SchemaMismatch("mimeType"));
                }
                let entry = self.drive.get_by_id(id, &fields).await?;
                if entry.mime_type() != Some(mime_type) {
                    exn::bail!(ErrorKind::NotFound(format!("id='{id}' with mimeType='{mime_type}'")));
                }
                Ok(entry)
            },
            Target::Name(name) => {
                let query = self.scope.restrict(Query::default().eq("name", name));
                self.drive.get_one(query, fields).await
            },
        }
    }

    fn filter(&self, name: &str, select: &Select) -> Result<Listing> {
        if name.is_empty() {
            exn::bail!(ErrorKind::MissingArgument("name"));
        }
        let query = self.scope.restrict(Query::default().eq("name", name));
        Ok(self.drive.list(query, self.fields(select)))
    }

    fn all(&self, select: &Select) -> Listing {
        self.drive.list(self.scope.restrict(Query::default()), self.fields(select))
    }

    async fn try_exists(&self, lookup: &Lookup) -> Result<bool> {
        match self.get(lookup, &Select::fields("id, mimeType")).await {
            Ok(_) => Ok(true),
            Err(err) => match &*err {
                ErrorKind::Ambiguous(_) => Ok(true),
                ErrorKind::NotFound(_) => Ok(false),
                _ => Err(err),
            },
        }
    }

    async fn exists(&self, lookup: &Lookup) -> bool {
        self.try_exists(lookup).await.unwrap_or_else(|err| {
            tracing::warn!(scope = ?self.scope, ?lookup, error = %err, "Existence check failed; reporting entry as absent");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use rstest::rstest;
    use serde_json::json;

    pub(super) fn setup() -> (Arc<MockTransport>, Drive) {
        let mock = Arc::new(
            MockTransport::with_entries([
                json!({"kind": "drive#file", "id": "f1", "name": "report.pdf", "mimeType": "application/pdf", "size": "10", "parents": ["d1"]}),
                json!({"kind": "drive#file", "id": "f2", "name": "dup.txt", "mimeType": "text/plain", "size": "3", "parents": ["d1"]}),
                json!({"kind": "drive#file", "id": "f3", "name": "dup.txt", "mimeType": "text/plain", "size": "4", "parents": ["d2"]}),
                json!({"kind": "drive#file", "id": "d1", "name": "docs", "mimeType": MimeType::FOLDER}),
                json!({"kind": "drive#file", "id": "d2", "name": "nested", "mimeType": MimeType::FOLDER, "parents": ["d1"]}),
                json!({"kind": "drive#file", "id": "d3", "name": "report.pdf", "mimeType": MimeType::FOLDER}),
            ])
            .with_page_size(2),
        );
        let drive = Drive::new(mock.clone());
        (mock, drive)
    }

    #[rstest]
    #[case(Lookup::id("a"), Some("id"))]
    #[case(Lookup::name("a"), Some("name"))]
    #[case(Lookup { id: Some("a".into()), name: Some("b".into()) }, Some("id"))]
    #[case(Lookup { id: Some(String::new()), name: Some("b".into()) }, Some("name"))]
    #[case(Lookup { id: Some(String::new()), name: Some(String::new()) }, None)]
    #[case(Lookup::default(), None)]
    fn test_lookup_target(#[case] lookup: Lookup, #[case] expected: Option<&str>) {
        let target = lookup.target().ok().map(|t| match t {
            Target::Id(_) => "id",
            Target::Name(_) => "name",
        });
        assert_eq!(target, expected);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.listing.page_size = Some(50);
        config.listing.default_fields = "id, name".to_string();
        config.transfer.chunk_size = 1024;
        let drive = Drive::from_config(Arc::new(MockTransport::default()), &config);
        assert_eq!(drive.page_size(), Some(50));
        assert_eq!(drive.default_fields(), &FieldSelection::parse("id, name"));
        assert_eq!(drive.chunk_size(), 1024);
        assert_eq!(drive.transport().name(), "mock");
    }

    #[tokio::test]
    async fn test_get_one_pulls_at_most_two() {
        let (mock, drive) = setup();
        let err = drive.get_one(Query::default(), FieldSelection::parse("id")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Ambiguous(_)));
        assert_eq!(mock.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_create_entry() {
        let (mock, drive) = setup();
        let id = drive.create_entry("new", Some("text/plain"), &["d1".to_string()]).await.unwrap();
        let meta = mock.entry(&id).await.unwrap();
        assert_eq!(meta.get("mimeType"), Some(&json!("text/plain")));
        assert_eq!(meta.get("parents"), Some(&json!(["d1"])));
        let err = drive.create_entry("", None, &[]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingArgument("name")));
    }

    #[tokio::test]
    async fn test_default_fields_apply_to_lookups() {
        let (_mock, drive) = setup();
        let drive = drive.with_default_fields("id, size");
        let entry = drive.files().get(&Lookup::id("f1"), &Select::default()).await.unwrap();
        assert_eq!(entry.len(), 2);
        assert_eq!(entry.size(), Some(10));
    }
}
