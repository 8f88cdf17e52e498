use super::{Drive, Lookup, Scope, Scoped};
use crate::error::{ErrorKind, Result};
use crate::fields::Select;
use crate::listing::Listing;
use crate::query::{MimeType, Query};
use crate::record::Entry;

/// Lookups restricted to folders, plus folder traversal.
///
/// Looking a folder up by ID needs `mimeType` in the selected fields, since
/// that is how folders are told apart from files.
#[derive(Clone, Copy)]
pub struct Folders<'a> {
    scoped: Scoped<'a>,
}

impl<'a> Folders<'a> {
    pub(super) fn new(drive: &'a Drive) -> Self {
        Self {
            scoped: Scoped {
                drive,
                scope: Scope::Folders,
            },
        }
    }

    pub async fn get(&self, lookup: &Lookup, select: &Select) -> Result<Entry> {
        self.scoped.get(lookup, select).await
    }

    pub fn filter(&self, name: &str, select: &Select) -> Result<Listing> {
        self.scoped.filter(name, select)
    }

    pub fn all(&self, select: &Select) -> Listing {
        self.scoped.all(select)
    }

    pub async fn exists(&self, lookup: &Lookup) -> bool {
        self.scoped.exists(lookup).await
    }

    pub async fn try_exists(&self, lookup: &Lookup) -> Result<bool> {
        self.scoped.try_exists(lookup).await
    }

    /// Direct children of the folder that are not folders themselves.
    pub fn files_in(&self, folder_id: &str, select: &Select) -> Result<Listing> {
        self.children(folder_id, select, |query| query.not_eq("mimeType", MimeType::FOLDER))
    }

    /// Every direct child of the folder.
    pub fn content(&self, folder_id: &str, select: &Select) -> Result<Listing> {
        self.children(folder_id, select, |query| query)
    }

    /// Direct children of the folder that are folders.
    pub fn subfolders(&self, folder_id: &str, select: &Select) -> Result<Listing> {
        self.children(folder_id, select, |query| query.eq("mimeType", MimeType::FOLDER))
    }

    /// Create a folder. Returns its ID.
    pub async fn create(&self, name: &str, parents: &[String]) -> Result<String> {
        self.scoped.drive.create_entry(name, Some(MimeType::FOLDER), parents).await
    }

    fn children(&self, folder_id: &str, select: &Select, narrow: impl FnOnce(Query) -> Query) -> Result<Listing> {
        if folder_id.is_empty() {
            exn::bail!(ErrorKind::MissingArgument("folder_id"));
        }
        let query = narrow(Query::default().in_parents(folder_id));
        Ok(self.scoped.drive.list(query, self.scoped.fields(select)))
    }
}
