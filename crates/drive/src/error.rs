//! Drive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A drive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for drive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
///
/// ### Lookup Errors
/// - [`ErrorKind::NotFound`]
/// - [`ErrorKind::Ambiguous`]
///
/// ### Caller Errors
/// - [`ErrorKind::MissingArgument`]
/// - [`ErrorKind::SchemaMismatch`]
/// - [`ErrorKind::WrongInitialization`]
///
/// ### Transport Errors
/// - [`ErrorKind::Network`] and [`ErrorKind::Busy`] (retryable)
/// - [`ErrorKind::Api`], [`ErrorKind::InvalidResponse`], [`ErrorKind::Credentials`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An exact lookup matched nothing.
    #[display("entry not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// An exact-name lookup matched more than one entry.
    #[display("multiple entries returned for {_0}")]
    Ambiguous(#[error(not(source))] String),
    /// A required identifying parameter was omitted or empty.
    #[display("missing required argument: {_0}")]
    MissingArgument(#[error(not(source))] &'static str),
    /// A type filter was requested without selecting the field it needs.
    #[display("field `{_0}` must be selected when filtering by type")]
    SchemaMismatch(#[error(not(source))] &'static str),
    /// The client could not be set up from the given parameters.
    #[display("wrong initialization: {_0}")]
    WrongInitialization(#[error(not(source))] String),
    /// A server value could not be coerced into the field's declared type.
    #[display("cannot convert field '{field}' from value: {value}")]
    Conversion { field: String, value: String },
    /// Connection failed or timed out.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The server is rate limiting or temporarily unavailable.
    #[display("server busy: {_0}")]
    Busy(#[error(not(source))] String),
    /// The server rejected the request.
    #[display("API error {status}: {message}")]
    Api { status: u16, message: String },
    /// The server answered with something we can't make sense of.
    #[display("invalid response: {_0}")]
    InvalidResponse(#[error(not(source))] String),
    /// Access token could not be obtained or refreshed.
    #[display("credentials error: {_0}")]
    Credentials(#[error(not(source))] String),
    /// Underlying I/O error (local files during uploads)
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Busy(_))
    }
}
