//! Search session: the aggregator driven on a tokio runtime.
//!
//! [`SearchSession`] is the single owner of one view's result state. Every
//! fetch the aggregator asks for runs as a spawned task; its result comes
//! back over an mpsc channel tagged with the ticket it was issued under and
//! is applied by [`SearchSession::next_event`] on the owner's task, so all
//! mutations are serialized without locks.
//!
//! ```text
//!  submit_query / sentinel_crossed
//!          │
//!          ▼
//!   ResultAggregator ──ticket──▶ tokio::spawn(backend.search)
//!          ▲                               │
//!          └──── next_event ◀── mpsc ◀─────┘
//!                 (mapper runs here)
//! ```
//!
//! Each fetch runs in its own task under a small forwarding task that
//! always reports back: if the fetch panics or is aborted, the ticket comes
//! back with [`FetchError::Cancelled`], so `next_event` never waits on a
//! fetch that will not answer. A new query aborts the superseded fetch; the
//! cancellation it reports carries an old generation and is discarded.

use std::collections::BTreeMap;
use std::sync::Arc;

use citation_harness_core::aggregator::{Completion, PaginationOptions, ResultAggregator};
use citation_harness_core::aggregator::FetchTicket;
use citation_harness_core::backend::SearchBackend;
use citation_harness_core::diagnostics::{DiagnosticSink, Severity};
use citation_harness_core::error::FetchError;
use citation_harness_core::mapper::CoordinateMapper;
use citation_harness_core::models::{NormalizedCitation, PageSize, PositionedHighlight, ResultPage};
use citation_harness_core::sentinel::SentinelHandle;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

type FetchOutcome = (FetchTicket, Result<ResultPage<NormalizedCitation>, FetchError>);

pub struct SearchSession<B: SearchBackend + 'static> {
    backend: Arc<B>,
    mapper: CoordinateMapper,
    pages: BTreeMap<u32, PageSize>,
    sink: Arc<dyn DiagnosticSink>,
    aggregator: ResultAggregator<PositionedHighlight>,
    tx: mpsc::UnboundedSender<FetchOutcome>,
    rx: mpsc::UnboundedReceiver<FetchOutcome>,
    tasks: Vec<AbortHandle>,
}

impl<B: SearchBackend + 'static> SearchSession<B> {
    pub fn new(
        backend: Arc<B>,
        mapper: CoordinateMapper,
        pagination: PaginationOptions,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            backend,
            mapper,
            pages: BTreeMap::new(),
            aggregator: ResultAggregator::new(pagination, sink.clone()),
            sink,
            tx,
            rx,
            tasks: Vec::new(),
        }
    }

    pub fn aggregator(&self) -> &ResultAggregator<PositionedHighlight> {
        &self.aggregator
    }

    /// Mutable access for local highlight edits.
    pub fn aggregator_mut(&mut self) -> &mut ResultAggregator<PositionedHighlight> {
        &mut self.aggregator
    }

    /// Record the measured size of a rendered page.
    ///
    /// Applies to batches mapped from now on; highlights already in the
    /// list keep the geometry they were mapped with.
    pub fn set_page_size(&mut self, page_number: u32, size: PageSize) {
        self.pages.insert(page_number, size);
    }

    /// Start a new search. Returns false for a blank query.
    pub fn submit_query(&mut self, query: &str) -> bool {
        self.abort_outstanding();
        match self.aggregator.submit_query(query) {
            Some(ticket) => {
                self.spawn(ticket);
                true
            }
            None => false,
        }
    }

    /// Request the next page. Returns false if the trigger was dropped.
    pub fn load_more(&mut self) -> bool {
        match self.aggregator.load_more() {
            Some(ticket) => {
                self.spawn(ticket);
                true
            }
            None => false,
        }
    }

    pub fn sentinel_crossed(&mut self, handle: SentinelHandle) -> bool {
        match self.aggregator.sentinel_crossed(handle) {
            Some(ticket) => {
                self.spawn(ticket);
                true
            }
            None => false,
        }
    }

    /// Tear down the view state: abort fetches and disconnect sentinels.
    pub fn clear(&mut self) {
        self.abort_outstanding();
        self.aggregator.clear();
    }

    /// Wait for the in-flight fetch and apply it.
    ///
    /// Returns `None` immediately when nothing is loading. Stale responses
    /// are consumed and skipped.
    pub async fn next_event(&mut self) -> Option<Completion> {
        while self.aggregator.is_loading() {
            let (ticket, result) = self.rx.recv().await?;

            if !self.aggregator.is_current(&ticket) {
                self.sink.report(
                    Severity::Debug,
                    "discarding stale fetch response",
                    json!({ "query": ticket.query, "generation": ticket.generation }),
                );
                continue;
            }

            let mapped = result.map(|page| {
                page.map(|citations| self.mapper.map(&citations, &self.pages, self.sink.as_ref()))
            });
            return Some(self.aggregator.complete(&ticket, mapped));
        }
        None
    }

    /// Apply events until nothing is loading.
    pub async fn settle(&mut self) -> Vec<Completion> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    fn spawn(&mut self, ticket: FetchTicket) {
        let backend = Arc::clone(&self.backend);
        let query = ticket.query.clone();
        let window = ticket.window;
        let fetch = tokio::spawn(async move { backend.search(&query, window).await });
        let abort = fetch.abort_handle();

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = match fetch.await {
                Ok(result) => result,
                Err(e) => {
                    if e.is_panic() {
                        tracing::error!(query = %ticket.query, "search task panicked");
                    }
                    Err(FetchError::Cancelled)
                }
            };
            // The receiver only goes away with the session.
            let _ = tx.send((ticket, result));
        });

        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(abort);
    }

    fn abort_outstanding(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl<B: SearchBackend + 'static> Drop for SearchSession<B> {
    fn drop(&mut self) {
        self.abort_outstanding();
        self.aggregator.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citation_harness_core::aggregator::AggregatorState;
    use citation_harness_core::backend::memory::InMemoryBackend;
    use citation_harness_core::diagnostics::RecordingSink;
    use citation_harness_core::models::{HighlightId, Point};

    fn citations(prefix: &str, n: usize) -> Vec<NormalizedCitation> {
        (0..n)
            .map(|i| {
                let bbox = vec![
                    Point::new(0.0, 0.0),
                    Point::new(0.5, 0.0),
                    Point::new(0.5, 0.5),
                    Point::new(0.0, 0.5),
                ];
                NormalizedCitation::new(format!("{} {}", prefix, i), bbox, 1)
                    .with_source_id(format!("{}-{}", prefix, i))
            })
            .collect()
    }

    fn session(backend: Arc<InMemoryBackend>) -> SearchSession<InMemoryBackend> {
        SearchSession::new(
            backend,
            CoordinateMapper::default(),
            PaginationOptions::default(),
            Arc::new(RecordingSink::new()),
        )
    }

    #[tokio::test]
    async fn test_query_then_scroll() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert("foo", citations("foo", 25));
        let mut s = session(backend.clone());
        s.set_page_size(1, PageSize::new(200.0, 100.0));

        assert!(s.submit_query("foo"));
        assert!(matches!(s.next_event().await, Some(Completion::Applied { added: 10, .. })));
        assert_eq!(s.aggregator().len(), 10);
        assert_eq!(s.aggregator().items()[0].position.bounding_rect.x2, 100.0);

        let handle = s.aggregator().sentinel().unwrap();
        assert!(s.sentinel_crossed(handle));
        assert!(!s.sentinel_crossed(handle));
        s.settle().await;
        assert_eq!(s.aggregator().len(), 20);

        assert!(s.load_more());
        s.settle().await;
        assert_eq!(s.aggregator().len(), 25);
        assert!(!s.aggregator().has_more());
        assert!(!s.load_more());
        assert_eq!(backend.calls(), 3);
    }

    struct PanickingBackend;

    #[async_trait::async_trait]
    impl SearchBackend for PanickingBackend {
        async fn search(
            &self,
            _query: &str,
            _window: citation_harness_core::models::FetchWindow,
        ) -> Result<ResultPage<NormalizedCitation>, FetchError> {
            panic!("backend bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_fetch_fails_instead_of_hanging() {
        let mut s = SearchSession::new(
            Arc::new(PanickingBackend),
            CoordinateMapper::default(),
            PaginationOptions::default(),
            Arc::new(RecordingSink::new()),
        );
        s.submit_query("foo");

        match s.next_event().await {
            Some(Completion::Failed(failure)) => assert_eq!(failure.error, FetchError::Cancelled),
            other => panic!("expected a failed fetch, got {:?}", other),
        }
        assert!(!s.aggregator().is_loading());
        assert_eq!(s.aggregator().state(), AggregatorState::Idle);
    }

    #[tokio::test]
    async fn test_next_event_when_idle_returns_none() {
        let mut s = session(Arc::new(InMemoryBackend::new()));
        assert!(s.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_is_visible_and_distinct_from_empty() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.fail_with("foo", FetchError::Network("down".into()));
        let mut s = session(backend.clone());

        s.submit_query("foo");
        assert!(matches!(s.next_event().await, Some(Completion::Failed(_))));
        assert_eq!(s.aggregator().state(), AggregatorState::Idle);
        assert!(s.aggregator().last_error().is_some());

        backend.clear_failure("foo");
        s.submit_query("foo");
        assert_eq!(s.next_event().await, Some(Completion::Exhausted));
        assert_eq!(s.aggregator().state(), AggregatorState::Exhausted);
        assert!(s.aggregator().last_error().is_none());
    }

    #[tokio::test]
    async fn test_local_edits_survive_pagination() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.insert("foo", citations("foo", 15));
        let mut s = session(backend);

        s.submit_query("foo");
        s.settle().await;
        let position = s.aggregator().items()[0].position.clone();
        let local = s.aggregator_mut().add_local_highlight(
            position,
            citation_harness_core::models::HighlightContent::text("mine"),
            Default::default(),
        );

        s.load_more();
        s.settle().await;
        assert_eq!(s.aggregator().len(), 16);
        assert_eq!(s.aggregator().items()[0].id, local);
        assert_eq!(
            s.aggregator().items()[15].id,
            HighlightId::backend("foo-14")
        );
    }
}
