//! Typed, lazily paginated access to a remote file store.
//!
//! ```
//! use drivekit_drive::{FieldSelection, Select};
//!
//! let fields = Select::fields("id, name").more("parents").resolve(&FieldSelection::default());
//! assert_eq!(fields.to_string(), "id, name, parents");
//! assert_eq!(fields.list_fields(), "files(id, name, parents), nextPageToken");
//! ```

pub mod credentials;
pub mod error;
mod facade;
mod fields;
mod listing;
pub mod query;
pub mod record;
mod transfer;
pub mod transport;

pub use crate::credentials::Credentials;
pub use crate::facade::{Drive, Files, Folders, Lookup, Scope};
pub use crate::fields::{DEFAULT_FIELDS, FieldSelection, Select};
pub use crate::listing::{Listing, ListingState};
pub use crate::query::{MimeType, Query};
pub use crate::record::{Entry, FieldValue};
pub use crate::transfer::{Download, DownloadStatus};
pub use crate::transport::Transport;
use std::sync::Arc;

pub type TransportHandle = Arc<dyn Transport + Send + Sync>;
