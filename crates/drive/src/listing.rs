//! Lazy, cached iteration over paginated list results.

use crate::TransportHandle;
use crate::error::Result;
use crate::fields::FieldSelection;
use crate::query::Query;
use crate::record::Entry;
use crate::transport::ListRequest;
use async_stream::try_stream;
use futures::Stream;
use std::collections::VecDeque;
use std::fmt;
use tracing::instrument;

/// Where a [`Listing`] is in its single remote traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingState {
    /// Nothing fetched yet.
    Fresh,
    /// At least one page fetched; more may follow.
    Fetching,
    /// No page token left and the buffer is drained. Every further traversal
    /// replays the cache.
    Exhausted,
}

/// Paginated result set.
///
/// Pages are only requested when the caller pulls past the end of the current
/// page, so abandoning a listing early costs nothing. Every entry fetched is
/// also kept in a cache: once the remote traversal is complete, the listing
/// becomes a passive, replayable view that never touches the network again.
///
/// [`get`](Self::get), [`count`](Self::count) and [`entries`](Self::entries)
/// need the whole result set, so they drain whatever is left first.
pub struct Listing {
    transport: TransportHandle,
    request: ListRequest,
    cache: Vec<Entry>,
    pending: VecDeque<Entry>,
    state: ListingState,
}

impl Listing {
    pub fn new(transport: TransportHandle, query: Query, fields: FieldSelection, page_size: Option<u32>) -> Self {
        Self {
            transport,
            request: ListRequest {
                query,
                fields,
                page_token: None,
                page_size,
            },
            cache: Vec::new(),
            pending: VecDeque::new(),
            state: ListingState::Fresh,
        }
    }

    pub fn state(&self) -> ListingState {
        self.state
    }

    pub fn query(&self) -> &Query {
        &self.request.query
    }

    pub fn fields(&self) -> &FieldSelection {
        &self.request.fields
    }

    /// Entries fetched so far, in server order.
    pub fn cached(&self) -> &[Entry] {
        &self.cache
    }

    /// Pull the next entry, fetching the next page if the current one is used up.
    ///
    /// Returns `Ok(None)` once the result set is exhausted (and keeps doing so).
    /// Transport errors are returned as-is; the listing can be pulled again
    /// afterwards and will re-request the same page.
    pub async fn next_entry(&mut self) -> Result<Option<Entry>> {
        match self.state {
            ListingState::Exhausted => return Ok(None),
            ListingState::Fresh => self.fetch_page().await?,
            ListingState::Fetching => {},
        }
        loop {
            if let Some(entry) = self.pending.pop_front() {
                return Ok(Some(entry));
            }
            if self.request.page_token.is_none() {
                self.state = ListingState::Exhausted;
                return Ok(None);
            }
            // Servers may hand out empty pages that still carry a token.
            self.fetch_page().await?;
        }
    }

    /// Start a traversal and stream every entry.
    ///
    /// On an exhausted listing this replays the cache without any network
    /// calls. Otherwise the traversal starts over from the first page:
    /// anything fetched by an earlier, abandoned traversal is discarded so no
    /// entry is yielded or cached twice.
    pub fn stream(&mut self) -> impl Stream<Item = Result<Entry>> + Send + '_ {
        try_stream! {
            if self.state == ListingState::Exhausted {
                for entry in self.cache.iter() {
                    yield entry.clone();
                }
            } else {
                self.restart();
                while let Some(entry) = self.next_entry().await? {
                    yield entry;
                }
            }
        }
    }

    /// Entry at `index`, draining the listing first.
    pub async fn get(&mut self, index: usize) -> Result<Option<&Entry>> {
        Ok(self.entries().await?.get(index))
    }

    /// Number of entries, draining the listing first.
    pub async fn count(&mut self) -> Result<usize> {
        Ok(self.entries().await?.len())
    }

    /// All entries, draining the listing first.
    pub async fn entries(&mut self) -> Result<&[Entry]> {
        while self.next_entry().await?.is_some() {}
        Ok(&self.cache)
    }

    /// Drain the listing and take ownership of every entry.
    pub async fn into_entries(mut self) -> Result<Vec<Entry>> {
        self.entries().await?;
        Ok(self.cache)
    }

    fn restart(&mut self) {
        self.request.page_token = None;
        self.cache.clear();
        self.pending.clear();
        self.state = ListingState::Fresh;
    }

    #[instrument(level = "debug", skip(self), fields(transport = self.transport.name(), query = %self.request.query))]
    async fn fetch_page(&mut self) -> Result<()> {
        let response = self.transport.list(&self.request).await?;
        let entries = response
            .files
            .iter()
            .map(|raw| Entry::from_raw(raw, &self.request.fields))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            entries = entries.len(),
            has_next_page = response.next_page_token.is_some(),
            "Fetched page"
        );
        self.cache.extend(entries.iter().cloned());
        self.pending.extend(entries);
        self.request.page_token = response.next_page_token;
        self.state = ListingState::Fetching;
        Ok(())
    }
}

impl fmt::Debug for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listing")
            .field("transport", &self.transport.name())
            .field("query", &format_args!("{}", self.request.query))
            .field("fields", &self.request.fields)
            .field("state", &self.state)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::MockTransport;
    use futures::TryStreamExt;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    fn setup(total: usize, page_size: usize) -> (Arc<MockTransport>, Listing) {
        let mock = Arc::new(
            MockTransport::with_entries((0..total).map(|i| json!({"id": i.to_string(), "name": format!("f{i}")})))
                .with_page_size(page_size),
        );
        let listing = Listing::new(mock.clone(), Query::default(), FieldSelection::parse("id, name"), None);
        (mock, listing)
    }

    fn ids(entries: &[Entry]) -> Vec<String> {
        entries.iter().map(|e| e.id().unwrap().to_string()).collect()
    }

    #[rstest]
    #[case(1, 1)]
    #[case(4, 2)]
    #[case(5, 2)]
    #[case(7, 10)]
    #[case(10, 3)]
    #[tokio::test]
    async fn test_full_traversal(#[case] total: usize, #[case] page_size: usize) {
        let (mock, mut listing) = setup(total, page_size);
        let entries: Vec<Entry> = listing.stream().try_collect().await.unwrap();
        let expected: Vec<String> = (0..total).map(|i| i.to_string()).collect();
        assert_eq!(ids(&entries), expected);
        assert_eq!(mock.list_calls(), total.div_ceil(page_size));
        assert_eq!(listing.state(), ListingState::Exhausted);
    }

    #[tokio::test]
    async fn test_replay_without_fetching() {
        let (mock, mut listing) = setup(5, 2);
        let first: Vec<Entry> = listing.stream().try_collect().await.unwrap();
        let calls = mock.list_calls();
        let second: Vec<Entry> = listing.stream().try_collect().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.list_calls(), calls);
    }

    #[tokio::test]
    async fn test_lazy_fetching() {
        let (mock, mut listing) = setup(6, 2);
        assert_eq!(listing.state(), ListingState::Fresh);
        assert_eq!(mock.list_calls(), 0);
        listing.next_entry().await.unwrap();
        listing.next_entry().await.unwrap();
        assert_eq!(mock.list_calls(), 1);
        listing.next_entry().await.unwrap();
        assert_eq!(mock.list_calls(), 2);
        assert_eq!(listing.state(), ListingState::Fetching);
    }

    #[tokio::test]
    async fn test_index_and_count_drain() {
        let (mock, mut listing) = setup(5, 2);
        assert_eq!(listing.get(3).await.unwrap().and_then(Entry::id), Some("3"));
        assert_eq!(mock.list_calls(), 3);
        assert_eq!(listing.count().await.unwrap(), 5);
        assert!(listing.get(5).await.unwrap().is_none());
        assert_eq!(mock.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_count_after_partial_pull() {
        let (_mock, mut listing) = setup(5, 2);
        listing.next_entry().await.unwrap();
        assert_eq!(listing.count().await.unwrap(), 5);
        assert_eq!(ids(listing.cached()), ["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_abandoned_traversal_restarts_cleanly() {
        let (mock, mut listing) = setup(5, 2);
        {
            let stream = listing.stream();
            futures::pin_mut!(stream);
            stream.try_next().await.unwrap();
        }
        let entries: Vec<Entry> = listing.stream().try_collect().await.unwrap();
        assert_eq!(ids(&entries), ["0", "1", "2", "3", "4"]);
        assert_eq!(listing.count().await.unwrap(), 5);
        assert_eq!(mock.list_calls(), 1 + 3);
    }

    #[rstest]
    #[case(5, 2, 1)]
    #[case(5, 2, 3)]
    #[case(0, 2, 2)]
    #[tokio::test]
    async fn test_empty_pages_with_token_are_skipped(
        #[case] total: usize,
        #[case] page_size: usize,
        #[case] empty_pages: usize,
    ) {
        let mock = Arc::new(
            MockTransport::with_entries((0..total).map(|i| json!({"id": i.to_string()})))
                .with_page_size(page_size)
                .with_empty_pages(empty_pages),
        );
        let mut listing = Listing::new(mock.clone(), Query::default(), FieldSelection::parse("id"), None);
        let entries: Vec<Entry> = listing.stream().try_collect().await.unwrap();
        let expected: Vec<String> = (0..total).map(|i| i.to_string()).collect();
        assert_eq!(ids(&entries), expected);
        assert_eq!(mock.list_calls(), empty_pages + total.div_ceil(page_size).max(1));
        assert_eq!(listing.state(), ListingState::Exhausted);
    }

    #[tokio::test]
    async fn test_debug_output() {
        let (mock, mut listing) = setup(3, 2);
        let filtered = Listing::new(mock, Query::default().eq("name", "f1"), FieldSelection::parse("id"), None);
        let debug = format!("{filtered:?}");
        assert!(debug.contains("name='f1'"), "{debug}");
        assert!(debug.contains("Fresh"), "{debug}");
        listing.count().await.unwrap();
        let debug = format!("{listing:?}");
        assert!(debug.contains("Exhausted"), "{debug}");
        assert!(debug.contains("cached: 3"), "{debug}");
    }

    #[tokio::test]
    async fn test_empty_result_set() {
        let (mock, mut listing) = setup(0, 2);
        assert!(listing.next_entry().await.unwrap().is_none());
        assert_eq!(listing.state(), ListingState::Exhausted);
        assert_eq!(listing.count().await.unwrap(), 0);
        assert_eq!(mock.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_transport_errors_propagate() {
        let (mock, mut listing) = setup(4, 2);
        listing.next_entry().await.unwrap();
        listing.next_entry().await.unwrap();
        mock.fail_next(ErrorKind::Busy("rate limited".to_string())).await;
        let err = listing.next_entry().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Busy(_)));
        // The token was kept; pulling again resumes at the same page.
        assert_eq!(listing.next_entry().await.unwrap().and_then(|e| e.id().map(str::to_string)), Some("2".into()));
        assert_eq!(listing.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_conversion_errors_propagate() {
        let mock = Arc::new(MockTransport::with_entries([json!({"id": "1", "size": "big"})]));
        let mut listing = Listing::new(mock, Query::default(), FieldSelection::parse("id, size"), None);
        let err = listing.next_entry().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conversion { .. }));
    }
}
