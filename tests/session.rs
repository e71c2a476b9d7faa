use async_trait::async_trait;
use citation_harness::session::SearchSession;
use citation_harness_core::aggregator::{AggregatorState, Completion, PaginationOptions};
use citation_harness_core::backend::memory::InMemoryBackend;
use citation_harness_core::backend::SearchBackend;
use citation_harness_core::diagnostics::{RecordingSink, Severity};
use citation_harness_core::error::FetchError;
use citation_harness_core::mapper::CoordinateMapper;
use citation_harness_core::models::{
    Comment, FetchWindow, HighlightContent, HighlightId, NormalizedCitation, Point, ResultPage,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// In-memory backend whose searches for gated queries block until released.
#[derive(Default)]
struct GatedBackend {
    inner: InMemoryBackend,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    /// Gated searches that got past their gate.
    released: AtomicUsize,
}

impl GatedBackend {
    fn gate(&self, query: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(query.to_string(), gate.clone());
        gate
    }
}

#[async_trait]
impl SearchBackend for GatedBackend {
    async fn search(
        &self,
        query: &str,
        window: FetchWindow,
    ) -> Result<ResultPage<NormalizedCitation>, FetchError> {
        let gate = self.gates.lock().unwrap().get(query).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.search(query, window).await
    }
}

fn citations(prefix: &str, n: usize) -> Vec<NormalizedCitation> {
    (0..n)
        .map(|i| {
            let bbox = vec![
                Point::new(0.1, 0.1),
                Point::new(0.2, 0.1),
                Point::new(0.2, 0.2),
                Point::new(0.1, 0.2),
            ];
            NormalizedCitation::new(format!("{} {}", prefix, i), bbox, 1)
                .with_source_id(format!("{}-{}", prefix, i))
        })
        .collect()
}

fn session<B: SearchBackend + 'static>(
    backend: Arc<B>,
    sink: Arc<RecordingSink>,
) -> SearchSession<B> {
    SearchSession::new(
        backend,
        CoordinateMapper::default(),
        PaginationOptions::default(),
        sink,
    )
}

#[tokio::test]
async fn test_superseded_query_never_lands() {
    let backend = Arc::new(GatedBackend::default());
    backend.inner.insert("foo", citations("foo", 10));
    backend.inner.insert("bar", citations("bar", 3));
    let foo_gate = backend.gate("foo");

    let mut s = session(backend.clone(), Arc::new(RecordingSink::new()));
    assert!(s.submit_query("foo"));
    assert!(s.submit_query("bar"));

    let event = s.next_event().await;
    assert!(matches!(event, Some(Completion::Applied { added: 3, .. })));

    foo_gate.notify_one();
    assert!(s.next_event().await.is_none());

    let texts: Vec<&str> = s
        .aggregator()
        .items()
        .iter()
        .map(|h| h.content.text.as_str())
        .collect();
    assert_eq!(texts, vec!["bar 0", "bar 1", "bar 2"]);
    assert_eq!(s.aggregator().query(), Some("bar"));
    assert_eq!(s.aggregator().state(), AggregatorState::Populated);
}

#[tokio::test]
async fn test_clear_while_loading_drops_response() {
    let backend = Arc::new(GatedBackend::default());
    backend.inner.insert("foo", citations("foo", 10));
    let gate = backend.gate("foo");

    let mut s = session(backend.clone(), Arc::new(RecordingSink::new()));
    s.submit_query("foo");
    assert!(s.aggregator().is_loading());
    s.clear();
    gate.notify_one();

    assert!(s.next_event().await.is_none());
    assert!(s.aggregator().is_empty());
    assert_eq!(s.aggregator().state(), AggregatorState::Idle);
    assert!(!s.aggregator().has_searched());
    assert_eq!(s.aggregator().live_sentinels(), 0);
}

#[tokio::test]
async fn test_drop_aborts_outstanding_fetch() {
    let backend = Arc::new(GatedBackend::default());
    backend.inner.insert("foo", citations("foo", 10));
    let gate = backend.gate("foo");

    let mut s = session(backend.clone(), Arc::new(RecordingSink::new()));
    s.submit_query("foo");
    // Let the fetch task start and park on the gate.
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    drop(s);

    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.released.load(Ordering::SeqCst), 0);
    assert_eq!(backend.inner.calls(), 0);
}

#[tokio::test]
async fn test_pagination_appends_in_rank_order() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.insert("foo", citations("foo", 23));
    let mut s = session(backend.clone(), Arc::new(RecordingSink::new()));

    s.submit_query("foo");
    s.settle().await;
    while s.load_more() {
        s.settle().await;
    }

    let ids: Vec<HighlightId> = s.aggregator().items().iter().map(|h| h.id.clone()).collect();
    let expected: Vec<HighlightId> = (0..23)
        .map(|i| HighlightId::backend(format!("foo-{}", i)))
        .collect();
    assert_eq!(ids, expected);
    assert!(!s.aggregator().has_more());
    assert_eq!(s.aggregator().live_sentinels(), 0);
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn test_failed_load_more_keeps_items_and_retries() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.insert("foo", citations("foo", 20));
    let sink = Arc::new(RecordingSink::new());
    let mut s = session(backend.clone(), sink.clone());

    s.submit_query("foo");
    s.settle().await;
    assert_eq!(s.aggregator().len(), 10);

    backend.fail_with(
        "foo",
        FetchError::Backend {
            status: 503,
            message: "unavailable".into(),
        },
    );
    assert!(s.load_more());
    assert!(matches!(s.next_event().await, Some(Completion::Failed(_))));
    assert_eq!(s.aggregator().len(), 10);
    assert_eq!(s.aggregator().state(), AggregatorState::Populated);
    assert!(s.aggregator().last_error().is_some());
    assert_eq!(sink.count(Severity::Error), 1);

    backend.clear_failure("foo");
    assert!(s.load_more());
    s.settle().await;
    assert_eq!(s.aggregator().len(), 20);
    assert!(s.aggregator().last_error().is_none());
}

#[tokio::test]
async fn test_malformed_backend_citation_is_reported_not_fatal() {
    let backend = Arc::new(InMemoryBackend::new());
    let mut results = citations("foo", 3);
    results[1].bounding_box.truncate(2);
    backend.insert("foo", results);
    let sink = Arc::new(RecordingSink::new());
    let mut s = session(backend, sink.clone());
    s.set_page_size(1, citation_harness_core::models::PageSize::new(100.0, 100.0));

    s.submit_query("foo");
    s.settle().await;
    assert_eq!(s.aggregator().len(), 2);
    assert_eq!(sink.count(Severity::Warn), 1);
}

#[tokio::test]
async fn test_local_highlight_edit_and_scroll() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.insert("foo", citations("foo", 2));
    let mut s = session(backend, Arc::new(RecordingSink::new()));

    s.submit_query("foo");
    s.settle().await;

    let position = s.aggregator().items()[1].position.clone();
    let agg = s.aggregator_mut();
    let id = agg.add_local_highlight(position, HighlightContent::text("note"), Comment::default());
    assert!(agg.update_comment(
        &id,
        Comment {
            text: "check this".into(),
            emoji: String::new(),
        }
    ));

    let request = agg.scroll_to(&id).unwrap();
    assert_eq!(request.page_number, 1);
    assert!(agg.is_scrolled_to(&id));

    assert!(agg.remove_highlight(&id).is_some());
    assert!(!agg.is_scrolled_to(&id));
    assert_eq!(agg.len(), 2);
}
