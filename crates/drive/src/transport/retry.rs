//! Retrying transport decorator.
//!
//! This module provides a transport implementation that wraps another
//! implementation and re-issues calls that failed with a retryable error,
//! sleeping a linearly increasing delay between attempts.

use crate::error::Result;
use crate::fields::FieldSelection;
use crate::record::RawEntry;
use crate::transport::{ListRequest, ListResponse, Media, MediaChunk, NewEntry, Transport};
use crate::TransportHandle;
use async_trait::async_trait;
use drivekit_config::RetrySettings;
use std::future::Future;
use std::time::Duration;

/// Bounded retry with linear backoff.
///
/// `max_attempts` counts the first call too. The first retry waits
/// `initial_delay`; every following retry waits `delay_step` longer than the
/// previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub delay_step: Duration,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}
impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: settings.initial_delay(),
            delay_step: settings.delay_step(),
        }
    }
}
impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, given that `attempt` (1-based) failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay + self.delay_step * attempt.saturating_sub(1)
    }
}

/// Retrying transport.
///
/// Wraps another transport and retries every call that fails with a
/// [retryable](crate::error::ErrorKind::is_retryable) error, logging a
/// [`warn event`](tracing::Event) per retry. Other errors, and the last
/// retryable one once attempts run out, are returned unchanged.
#[derive(Clone)]
pub struct RetryTransport {
    inner: TransportHandle,
    policy: RetryPolicy,
}
impl RetryTransport {
    pub fn new(inner: TransportHandle, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        transport = self.inner.name(),
                        operation,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transport call failed; sleeping before retrying",
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                result => return result,
            }
        }
    }
}

#[async_trait]
impl Transport for RetryTransport {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn list(&self, request: &ListRequest) -> Result<ListResponse> {
        self.with_retry("list", || self.inner.list(request)).await
    }

    async fn get(&self, file_id: &str, fields: &FieldSelection) -> Result<RawEntry> {
        self.with_retry("get", || self.inner.get(file_id, fields)).await
    }

    async fn create(&self, entry: &NewEntry, media: Option<Media>) -> Result<RawEntry> {
        self.with_retry("create", || self.inner.create(entry, media.clone())).await
    }

    async fn download_range(&self, file_id: &str, offset: u64, length: u64) -> Result<MediaChunk> {
        self.with_retry("download", || self.inner.download_range(file_id, offset, length)).await
    }
}
