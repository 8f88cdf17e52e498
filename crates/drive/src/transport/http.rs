//! Drive v3 REST transport.
//!
//! Talks JSON to the `files` collection, using ranged `alt=media` requests for
//! downloads and `multipart/related` requests for uploads with content.
//! Requests carry a bearer token from the [`Authenticator`], which refreshes
//! it as needed.

use super::auth::Authenticator;
use crate::credentials::Credentials;
use crate::error::{ErrorKind, Result};
use crate::fields::FieldSelection;
use crate::record::RawEntry;
use crate::transport::{ListRequest, ListResponse, Media, MediaChunk, NewEntry, Transport};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const MULTIPART_BOUNDARY: &str = "drivekit_related_boundary";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Transport speaking the Drive v3 REST API.
pub struct HttpTransport {
    client: reqwest::Client,
    auth: Authenticator,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(credentials: Credentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("drivekit/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .or_raise(|| ErrorKind::WrongInitialization("failed to build HTTP client".to_string()))?;
        Ok(Self {
            auth: Authenticator::new(client.clone(), credentials),
            client,
            base_url: parse_base_url(DEFAULT_BASE_URL)?,
        })
    }

    /// Point the transport at another host, e.g. a local emulator.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = parse_base_url(base_url)?;
        Ok(self)
    }

    fn files_url(&self) -> Url {
        self.endpoint(&["drive", "v3", "files"])
    }

    fn file_url(&self, file_id: &str) -> Url {
        self.endpoint(&["drive", "v3", "files", file_id])
    }

    fn upload_url(&self) -> Url {
        self.endpoint(&["upload", "drive", "v3", "files"])
    }

    /// `segments` appended to the base URL, each percent-encoded on its own.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Base URLs are checked in `parse_base_url`, so they always have a path.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Authorize and send a request, mapping failures to [`ErrorKind`]s.
    /// `target` names what was addressed, for `NotFound` errors.
    async fn send(&self, request: RequestBuilder, target: &str) -> Result<Response> {
        let token = self.auth.token().await?;
        let response = request.bearer_auth(token).send().await.map_err(request_error)?;
        let status = response.status();
        if status.is_success() || status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.auth.invalidate().await;
        }
        let body = response.text().await.unwrap_or_default();
        let kind = status_error(status, &body, target);
        tracing::debug!(%status, target, error = %kind, "Request failed");
        Err(exn::Exn::from(kind))
    }
}

async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await.map_err(request_error)?;
    serde_json::from_slice(&bytes)
        .or_raise(|| ErrorKind::InvalidResponse(String::from_utf8_lossy(&bytes).chars().take(200).collect()))
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "drive-v3"
    }

    async fn list(&self, request: &ListRequest) -> Result<ListResponse> {
        let mut params = vec![("fields", request.fields.list_fields())];
        if !request.query.is_empty() {
            params.push(("q", request.query.to_string()));
        }
        if let Some(token) = &request.page_token {
            params.push(("pageToken", token.clone()));
        }
        if let Some(size) = request.page_size {
            params.push(("pageSize", size.to_string()));
        }
        let target = request.query.to_string();
        let response = self.send(self.client.get(self.files_url()).query(&params), &target).await?;
        json(response).await
    }

    async fn get(&self, file_id: &str, fields: &FieldSelection) -> Result<RawEntry> {
        let request = self.client.get(self.file_url(file_id)).query(&[("fields", fields.to_string())]);
        let response = self.send(request, &format!("id='{file_id}'")).await?;
        json(response).await
    }

    async fn create(&self, entry: &NewEntry, media: Option<Media>) -> Result<RawEntry> {
        let request = match media {
            None => self.client.post(self.files_url()).query(&[("fields", "id")]).json(entry),
            Some(media) => {
                let metadata = serde_json::to_vec(entry)
                    .or_raise(|| ErrorKind::InvalidResponse("unserializable entry metadata".to_string()))?;
                self.client
                    .post(self.upload_url())
                    .query(&[("uploadType", "multipart"), ("fields", "id")])
                    .header(CONTENT_TYPE, format!("multipart/related; boundary={MULTIPART_BOUNDARY}"))
                    .body(multipart_related(&metadata, &media))
            },
        };
        let response = self.send(request, &entry.name).await?;
        json(response).await
    }

    async fn download_range(&self, file_id: &str, offset: u64, length: u64) -> Result<MediaChunk> {
        let last = offset.saturating_add(length.max(1)) - 1;
        let request = self
            .client
            .get(self.file_url(file_id))
            .query(&[("alt", "media")])
            .header(RANGE, format!("bytes={offset}-{last}"));
        let response = self.send(request, &format!("id='{file_id}'")).await?;
        let status = response.status();
        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(content_range_total);
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(MediaChunk {
                data: Vec::new(),
                total_size: total.unwrap_or(offset),
            });
        }
        let body = response.bytes().await.map_err(request_error)?;
        match (status, total) {
            (StatusCode::PARTIAL_CONTENT, Some(total)) => Ok(MediaChunk {
                data: body.to_vec(),
                total_size: total,
            }),
            (StatusCode::PARTIAL_CONTENT, None) => exn::bail!(ErrorKind::InvalidResponse(
                "partial content without a usable Content-Range".to_string()
            )),
            // Range ignored: the body is the whole content.
            _ => {
                let total_size = body.len() as u64;
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(body.len());
                let end = usize::try_from(offset.saturating_add(length)).unwrap_or(usize::MAX).min(body.len());
                Ok(MediaChunk {
                    data: body[start..end].to_vec(),
                    total_size,
                })
            },
        }
    }
}

/// Classify a failed request.
pub(super) fn request_error(err: reqwest::Error) -> ErrorKind {
    if err.is_decode() {
        ErrorKind::InvalidResponse(err.to_string())
    } else {
        ErrorKind::Network(err.to_string())
    }
}

/// Classify an unsuccessful response.
fn status_error(status: StatusCode, body: &str, target: &str) -> ErrorKind {
    let message = error_message(body);
    match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound(target.to_string()),
        StatusCode::UNAUTHORIZED => ErrorKind::Credentials(message),
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::Busy(message),
        status if status.is_server_error() => ErrorKind::Busy(message),
        status => ErrorKind::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// The `error.message` of a JSON error body, or the body itself.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.pointer("/error/message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Total length from a `Content-Range` header (`bytes 0-9/100`, `bytes */100`).
fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

fn multipart_related(metadata: &[u8], media: &Media) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + media.data.len() + 256);
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", media.mime_type).as_bytes());
    body.extend_from_slice(&media.data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    let invalid = || ErrorKind::WrongInitialization(format!("invalid base URL: {base_url}"));
    let url = Url::parse(base_url).or_raise(invalid)?;
    if url.cannot_be_a_base() {
        exn::bail!(invalid());
    }
    Ok(url)
}
