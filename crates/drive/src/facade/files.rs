use super::{Drive, Lookup, Scope, Scoped};
use crate::error::{ErrorKind, Result};
use crate::fields::Select;
use crate::listing::Listing;
use crate::record::Entry;
use crate::transfer::{Download, upload_file};
use std::path::Path;
use tokio::io::AsyncWrite;
use tracing::instrument;

/// Lookups over every entry, plus content transfers.
#[derive(Clone, Copy)]
pub struct Files<'a> {
    scoped: Scoped<'a>,
}

impl<'a> Files<'a> {
    pub(super) fn new(drive: &'a Drive) -> Self {
        Self {
            scoped: Scoped { drive, scope: Scope::Any },
        }
    }

    /// Fetch exactly one entry.
    pub async fn get(&self, lookup: &Lookup, select: &Select) -> Result<Entry> {
        self.scoped.get(lookup, select).await
    }

    /// Every entry named exactly `name`.
    pub fn filter(&self, name: &str, select: &Select) -> Result<Listing> {
        self.scoped.filter(name, select)
    }

    pub fn all(&self, select: &Select) -> Listing {
        self.scoped.all(select)
    }

    /// Whether the entry exists. Failures other than "not found" are logged
    /// and reported as `false`; use [`try_exists`](Self::try_exists) to see them.
    pub async fn exists(&self, lookup: &Lookup) -> bool {
        self.scoped.exists(lookup).await
    }

    pub async fn try_exists(&self, lookup: &Lookup) -> Result<bool> {
        self.scoped.try_exists(lookup).await
    }

    /// Upload a local file as binary content. Returns the new entry's ID.
    #[instrument(skip(self, full_path), fields(path = %full_path.as_ref().display()))]
    pub async fn upload(
        &self,
        file_name: &str,
        full_path: impl AsRef<Path>,
        parent_folder_id: Option<&str>,
    ) -> Result<String> {
        if file_name.is_empty() {
            exn::bail!(ErrorKind::MissingArgument("file_name"));
        }
        let parent_folder_id = parent_folder_id.filter(|id| !id.is_empty());
        upload_file(&self.scoped.drive.transport, file_name, full_path, parent_folder_id).await
    }

    /// Prepare a chunked download of `file_id` into `sink`. Nothing is
    /// requested until the download is driven.
    pub fn downloader<W: AsyncWrite + Unpin + Send>(&self, file_id: &str, sink: W) -> Result<Download<W>> {
        if file_id.is_empty() {
            exn::bail!(ErrorKind::MissingArgument("file_id"));
        }
        let drive = self.scoped.drive;
        Ok(Download::new(drive.transport.clone(), file_id, sink, drive.chunk_size))
    }

    pub fn downloader_to_memory(&self, file_id: &str) -> Result<Download<Vec<u8>>> {
        self.downloader(file_id, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::setup;
    use super::*;
    use crate::transport::MockTransport;
    use futures::TryStreamExt;
    use rstest::rstest;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_get_by_id() {
        let (mock, drive) = setup();
        let entry = drive.files().get(&Lookup::id("f1"), &Select::fields("id,name,mimeType,size")).await.unwrap();
        assert_eq!(entry.id(), Some("f1"));
        assert_eq!(entry.name(), Some("report.pdf"));
        assert_eq!(entry.mime_type(), Some("application/pdf"));
        assert_eq!(entry.size(), Some(10));
        assert_eq!(entry.len(), 4);
        assert_eq!(mock.get_calls(), 1);
        assert_eq!(mock.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let (_mock, drive) = setup();
        let err = drive.files().get(&Lookup::id("nope"), &Select::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_by_name() {
        let (_mock, drive) = setup();
        // The files scope has no type restriction, so a folder with the same
        // name as a file makes the name ambiguous.
        let err = drive.files().get(&Lookup::name("report.pdf"), &Select::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Ambiguous(_)));
        let entry = drive.files().get(&Lookup::name("docs"), &Select::default()).await.unwrap();
        assert_eq!(entry.id(), Some("d1"));
    }

    #[rstest]
    #[case("dup.txt", Some("ambiguous"))]
    #[case("missing", Some("not found"))]
    #[case("nested", None)]
    #[tokio::test]
    async fn test_get_by_name_outcomes(#[case] name: &str, #[case] expected_error: Option<&str>) {
        let (_mock, drive) = setup();
        let result = drive.files().get(&Lookup::name(name), &Select::default()).await;
        let error = result.err().map(|err| match &*err {
            ErrorKind::Ambiguous(_) => "ambiguous",
            ErrorKind::NotFound(_) => "not found",
            _ => "other",
        });
        assert_eq!(error, expected_error);
    }

    #[tokio::test]
    async fn test_get_requires_id_or_name() {
        let (mock, drive) = setup();
        let err = drive.files().get(&Lookup::default(), &Select::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingArgument(_)));
        assert_eq!(mock.get_calls() + mock.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_filter_and_all() {
        let (_mock, drive) = setup();
        let dups = drive.files().filter("dup.txt", &Select::fields("id")).unwrap().into_entries().await.unwrap();
        let ids: Vec<_> = dups.iter().filter_map(Entry::id).collect();
        assert_eq!(ids, ["f2", "f3"]);
        assert_eq!(drive.files().all(&Select::default()).count().await.unwrap(), 6);
        let err = drive.files().filter("", &Select::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingArgument("name")));
    }

    #[tokio::test]
    async fn test_listing_only_has_selected_fields() {
        let (_mock, drive) = setup();
        let mut listing = drive.files().all(&Select::fields("id").more("parents"));
        let entries: Vec<Entry> = listing.stream().try_collect().await.unwrap();
        for entry in &entries {
            assert_eq!(entry.attributes().map(|(k, _)| k).collect::<Vec<_>>(), ["id", "parents"]);
        }
        // Folders without parents get the declared default.
        assert_eq!(entries[3].parents(), Some(&[][..]));
    }

    #[rstest]
    #[case(Lookup::id("f1"), true)]
    #[case(Lookup::id("nope"), false)]
    #[case(Lookup::name("dup.txt"), true)]
    #[case(Lookup::name("docs"), true)]
    #[case(Lookup::name("missing"), false)]
    #[tokio::test]
    async fn test_exists(#[case] lookup: Lookup, #[case] expected: bool) {
        let (_mock, drive) = setup();
        assert_eq!(drive.files().exists(&lookup).await, expected);
        assert_eq!(drive.files().try_exists(&lookup).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_exists_swallows_other_failures() {
        let (mock, drive) = setup();
        mock.fail_next(ErrorKind::Api {
            status: 403,
            message: "forbidden".to_string(),
        })
        .await;
        assert!(!drive.files().exists(&Lookup::id("f1")).await);

        mock.fail_next(ErrorKind::Api {
            status: 403,
            message: "forbidden".to_string(),
        })
        .await;
        let err = drive.files().try_exists(&Lookup::id("f1")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Api { status: 403, .. }));
        assert!(!drive.files().exists(&Lookup::default()).await);
    }

    #[tokio::test]
    async fn test_upload() {
        let (mock, drive) = setup();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"some bytes").unwrap();
        let id = drive.files().upload("upload.bin", file.path(), Some("d1")).await.unwrap();
        let entry = drive.files().get(&Lookup::id(&id), &Select::default().more("parents")).await.unwrap();
        assert_eq!(entry.name(), Some("upload.bin"));
        assert_eq!(entry.size(), Some(10));
        assert_eq!(entry.parents(), Some(&["d1".to_string()][..]));
        assert_eq!(mock.content(&id).await.unwrap(), b"some bytes");

        let err = drive.files().upload("", file.path(), None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingArgument("file_name")));
    }

    #[tokio::test]
    async fn test_download_to_memory() {
        let mock = Arc::new(MockTransport::default().with_file(json!({"id": "blob", "name": "blob"}), &b"abcdefghij"[..]));
        let drive = Drive::new(mock.clone()).with_chunk_size(4);
        let mut download = drive.files().downloader_to_memory("blob").unwrap();
        download.download(true).await.unwrap();
        assert_eq!(download.into_sink(), b"abcdefghij");
        assert_eq!(mock.download_calls(), 3);

        let err = drive.files().downloader_to_memory("").err().unwrap();
        assert!(matches!(&*err, ErrorKind::MissingArgument("file_id")));
    }
}
