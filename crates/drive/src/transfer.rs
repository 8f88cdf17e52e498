//! Content transfers: chunked downloads and single-request uploads.

use crate::TransportHandle;
use crate::error::{ErrorKind, Result};
use crate::query::MimeType;
use crate::transport::{Media, NewEntry};
use async_stream::try_stream;
use exn::OptionExt;
use futures::Stream;
use serde_json::Value;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Progress after a downloaded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadStatus {
    /// Bytes received so far.
    pub resumable_progress: u64,
    /// Total content length reported by the server.
    pub total_size: u64,
}
impl DownloadStatus {
    /// Fraction of the content received, between `0.0` and `1.0`.
    pub fn progress(&self) -> f64 {
        match self.total_size {
            0 => 1.0,
            total => self.resumable_progress as f64 / total as f64,
        }
    }
}

/// Chunked download of a file's content into an async sink.
///
/// Each call to [`next_chunk`](Self::next_chunk) transfers at most
/// `chunk_size` bytes and reports the progress so far; the sequence ends once
/// everything the server reported has been received.
pub struct Download<W> {
    transport: TransportHandle,
    file_id: String,
    sink: W,
    chunk_size: u64,
    received: u64,
    done: bool,
}

impl<W: AsyncWrite + Unpin + Send> Download<W> {
    pub fn new(transport: TransportHandle, file_id: impl Into<String>, sink: W, chunk_size: u64) -> Self {
        Self {
            transport,
            file_id: file_id.into(),
            sink,
            chunk_size: chunk_size.max(1),
            received: 0,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetch and write the next chunk. Returns `None` once the download has
    /// completed.
    pub async fn next_chunk(&mut self) -> Result<Option<DownloadStatus>> {
        if self.done {
            return Ok(None);
        }
        let chunk = self.transport.download_range(&self.file_id, self.received, self.chunk_size).await?;
        if chunk.data.is_empty() && self.received < chunk.total_size {
            exn::bail!(ErrorKind::InvalidResponse(format!(
                "download of {} stopped at {} of {} bytes",
                self.file_id, self.received, chunk.total_size
            )));
        }
        self.sink.write_all(&chunk.data).await.map_err(ErrorKind::Io)?;
        self.received += chunk.data.len() as u64;
        if self.received >= chunk.total_size {
            self.sink.flush().await.map_err(ErrorKind::Io)?;
            self.done = true;
        }
        tracing::debug!(file_id = %self.file_id, received = self.received, total = chunk.total_size, "Downloaded chunk");
        Ok(Some(DownloadStatus {
            resumable_progress: self.received,
            total_size: chunk.total_size,
        }))
    }

    /// The remaining progress values as a stream.
    pub fn stream(&mut self) -> impl Stream<Item = Result<DownloadStatus>> + Send + '_ {
        try_stream! {
            while let Some(status) = self.next_chunk().await? {
                yield status;
            }
        }
    }

    /// Run the download to completion, optionally logging progress.
    pub async fn download(&mut self, show_progress: bool) -> Result<()> {
        while let Some(status) = self.next_chunk().await? {
            if show_progress {
                tracing::info!(file_id = %self.file_id, "Download {}%", (status.progress() * 100.0) as u32);
            }
        }
        Ok(())
    }

    /// Give the sink back, e.g. to read an in-memory buffer.
    pub fn into_sink(self) -> W {
        self.sink
    }
}

/// Upload a local file as a binary entry. Returns the new entry's ID.
///
/// The file is read in full and closed before the request goes out.
pub async fn upload_file(
    transport: &TransportHandle,
    file_name: impl Into<String>,
    full_path: impl AsRef<Path>,
    parent_folder_id: Option<&str>,
) -> Result<String> {
    let full_path = full_path.as_ref();
    let data = tokio::fs::read(full_path).await.map_err(ErrorKind::Io)?;
    let entry = NewEntry {
        name: file_name.into(),
        mime_type: Some(MimeType::BINARY.to_string()),
        parents: parent_folder_id.map(str::to_string).into_iter().collect(),
    };
    tracing::debug!(path = %full_path.display(), bytes = data.len(), name = %entry.name, "Uploading file");
    let media = Media {
        mime_type: MimeType::BINARY.to_string(),
        data,
    };
    let created = transport.create(&entry, Some(media)).await?;
    created_id(created)
}

/// Pull the `id` out of a create response.
pub(crate) fn created_id(mut created: crate::record::RawEntry) -> Result<String> {
    let id = created.remove("id").ok_or_raise(|| ErrorKind::InvalidResponse("create response has no id".to_string()))?;
    match id {
        Value::String(id) => Ok(id),
        other => Err(exn::Exn::from(ErrorKind::InvalidResponse(format!("unexpected id: {other}")))),
    }
}
