//! Incremental result aggregator.
//!
//! [`ResultAggregator`] owns the ordered, consumer-facing result list for
//! one view. It is driven by three kinds of events:
//!
//! 1. **Query submission** ([`submit_query`](ResultAggregator::submit_query)):
//!    clears everything and starts a fresh fetch under a new generation.
//! 2. **Pagination** ([`sentinel_crossed`](ResultAggregator::sentinel_crossed) /
//!    [`load_more`](ResultAggregator::load_more)): widens the fetch window
//!    and appends the next batch. At most one fetch is in flight; triggers
//!    arriving while loading are dropped.
//! 3. **Local mutation** (highlight add/update/remove): edits the list in
//!    place without refetching.
//!
//! The aggregator never performs I/O. Every fetch it wants is returned as a
//! [`FetchTicket`]; the caller runs it and hands the result back through
//! [`complete`](ResultAggregator::complete). Tickets from a superseded
//! generation, or from a fetch that is no longer the one in flight, are
//! discarded.
//!
//! # States
//!
//! ```text
//!            submit_query                   page with items
//!   Idle ─────────────────▶ Loading ───────────────────────▶ Populated
//!    ▲                       │  ▲                               │
//!    │ clear / failure       │  └──────── sentinel_crossed ─────┘
//!    │ with no items         │ empty first page
//!    └───────────────────────┴──────────────▶ Exhausted
//! ```
//!
//! Order is exactly the backend's arrival order; nothing is re-sorted.
//! Locally created highlights are inserted at the front.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::diagnostics::{DiagnosticSink, Severity};
use crate::error::{FetchError, FetchFailure};
use crate::models::{
    Comment, FetchWindow, HighlightContent, HighlightId, HighlightPosition, PositionedHighlight,
    ResultPage,
};
use crate::navigation::{ScrollRequest, ScrollSync};
use crate::sentinel::{SentinelArena, SentinelHandle};

/// Items the aggregator can hold: anything with a stable identity.
pub trait Keyed {
    fn key(&self) -> &HighlightId;
}

impl Keyed for PositionedHighlight {
    fn key(&self) -> &HighlightId {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregatorState {
    /// No query submitted yet, or cleared.
    Idle,
    /// A fetch is in flight.
    Loading,
    /// At least one result is visible and nothing is in flight.
    Populated,
    /// The query completed with no results.
    Exhausted,
}

/// Pagination tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationOptions {
    /// How far each "load more" widens the window.
    pub page_size: usize,
    /// `top_k` of the first fetch for a query.
    pub initial_top_k: usize,
    /// Drop items whose id was already delivered by an earlier page.
    pub dedup_across_pages: bool,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            page_size: 10,
            initial_top_k: 10,
            dedup_across_pages: true,
        }
    }
}

/// A fetch the caller should perform on behalf of the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub seq: u64,
    pub query: String,
    pub window: FetchWindow,
}

/// Outcome of handing a fetch result back via [`ResultAggregator::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Items were appended. `duplicates` counts items dropped as repeats.
    Applied { added: usize, duplicates: usize },
    /// The first page for the query was empty.
    Exhausted,
    /// The fetch failed; previous items are untouched.
    Failed(FetchFailure),
    /// The ticket was superseded and its result ignored.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Fresh,
    More,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    seq: u64,
    kind: FetchKind,
}

/// Partial update of a highlight's geometry and content.
#[derive(Debug, Clone, Default)]
pub struct HighlightUpdate {
    pub position: Option<HighlightPosition>,
    pub content: Option<HighlightContent>,
}

pub struct ResultAggregator<T> {
    options: PaginationOptions,
    sink: Arc<dyn DiagnosticSink>,
    items: Vec<T>,
    query: Option<String>,
    state: AggregatorState,
    generation: u64,
    next_seq: u64,
    fetch_cursor: usize,
    delivered: usize,
    has_more: bool,
    in_flight: Option<InFlight>,
    last_error: Option<FetchFailure>,
    sentinels: SentinelArena,
    sentinel: Option<SentinelHandle>,
    scroll: ScrollSync,
}

impl<T: Keyed> ResultAggregator<T> {
    pub fn new(options: PaginationOptions, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            fetch_cursor: options.initial_top_k,
            options,
            sink,
            items: Vec::new(),
            query: None,
            state: AggregatorState::Idle,
            generation: 0,
            next_seq: 0,
            delivered: 0,
            has_more: false,
            in_flight: None,
            last_error: None,
            sentinels: SentinelArena::new(),
            sentinel: None,
            scroll: ScrollSync::default(),
        }
    }

    // ── Queries and pagination ──────────────────────────────────────

    /// Start a new search, discarding all items and any fetch in flight.
    ///
    /// A blank query behaves like [`clear`](Self::clear) and returns `None`.
    pub fn submit_query(&mut self, query: impl Into<String>) -> Option<FetchTicket> {
        let query = query.into();
        if query.trim().is_empty() {
            self.clear();
            return None;
        }

        self.reset();
        self.query = Some(query);
        self.has_more = true;
        self.state = AggregatorState::Loading;
        Some(self.issue(FetchKind::Fresh))
    }

    /// Request the next page. Only valid from `Populated` with more results
    /// available; any other call is a no-op returning `None`.
    pub fn load_more(&mut self) -> Option<FetchTicket> {
        if self.state != AggregatorState::Populated || !self.has_more {
            self.sink.report(
                Severity::Debug,
                "ignoring load-more trigger",
                json!({ "state": self.state, "hasMore": self.has_more }),
            );
            return None;
        }

        self.fetch_cursor += self.options.page_size;
        self.state = AggregatorState::Loading;
        Some(self.issue(FetchKind::More))
    }

    /// The viewer saw `handle` scroll into view.
    pub fn sentinel_crossed(&mut self, handle: SentinelHandle) -> Option<FetchTicket> {
        if self.sentinel != Some(handle) || !self.sentinels.is_live(handle) {
            self.sink.report(
                Severity::Debug,
                "ignoring stale sentinel",
                json!({ "generation": self.generation }),
            );
            return None;
        }
        self.load_more()
    }

    /// True if `ticket` is the fetch the aggregator is waiting for.
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
            && self.in_flight.is_some_and(|f| f.seq == ticket.seq)
    }

    /// Hand back the result of a fetch described by `ticket`.
    pub fn complete(
        &mut self,
        ticket: &FetchTicket,
        result: Result<ResultPage<T>, FetchError>,
    ) -> Completion {
        let flight = match self.in_flight.take() {
            Some(f) if f.seq == ticket.seq && ticket.generation == self.generation => f,
            other => {
                self.in_flight = other;
                self.sink.report(
                    Severity::Debug,
                    "discarding stale fetch response",
                    json!({
                        "ticketGeneration": ticket.generation,
                        "ticketSeq": ticket.seq,
                        "generation": self.generation,
                    }),
                );
                return Completion::Stale;
            }
        };

        match result {
            Ok(page) => self.apply_page(flight.kind, page),
            Err(error) => {
                let failure = FetchFailure {
                    query: ticket.query.clone(),
                    generation: ticket.generation,
                    error,
                };
                self.sink.report(
                    Severity::Error,
                    "search fetch failed",
                    json!({
                        "query": ticket.query,
                        "offset": ticket.window.offset,
                        "topK": ticket.window.top_k,
                        "error": failure.error.to_string(),
                    }),
                );
                self.state = if self.items.is_empty() {
                    AggregatorState::Idle
                } else {
                    AggregatorState::Populated
                };
                self.last_error = Some(failure.clone());
                Completion::Failed(failure)
            }
        }
    }

    /// Return to `Idle`, invalidating every ticket and sentinel.
    pub fn clear(&mut self) {
        self.reset();
        self.query = None;
        self.has_more = false;
        self.state = AggregatorState::Idle;
    }

    pub fn dismiss_error(&mut self) -> Option<FetchFailure> {
        self.last_error.take()
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.items.clear();
        self.in_flight = None;
        self.fetch_cursor = self.options.initial_top_k;
        self.delivered = 0;
        self.last_error = None;
        self.sentinels.disconnect_all();
        self.sentinel = None;
        self.scroll.reset();
    }

    fn issue(&mut self, kind: FetchKind) -> FetchTicket {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.in_flight = Some(InFlight { seq, kind });
        FetchTicket {
            generation: self.generation,
            seq,
            query: self.query.clone().unwrap_or_default(),
            window: FetchWindow {
                offset: self.delivered,
                top_k: self.fetch_cursor,
            },
        }
    }

    fn apply_page(&mut self, kind: FetchKind, page: ResultPage<T>) -> Completion {
        self.delivered += page.consumed;
        self.has_more = page.has_more;
        self.last_error = None;

        let mut seen: HashSet<HighlightId> = if self.options.dedup_across_pages {
            self.items.iter().map(|i| i.key().clone()).collect()
        } else {
            HashSet::new()
        };

        let mut added = 0;
        let mut duplicates = 0;
        for item in page.items {
            if self.options.dedup_across_pages && !seen.insert(item.key().clone()) {
                duplicates += 1;
                continue;
            }
            self.items.push(item);
            added += 1;
        }

        if duplicates > 0 {
            self.sink.report(
                Severity::Debug,
                "dropped results already delivered by an earlier page",
                json!({ "duplicates": duplicates }),
            );
        }

        if kind == FetchKind::Fresh {
            if self.delivered == 0 {
                self.state = AggregatorState::Exhausted;
                return Completion::Exhausted;
            }
            self.sentinel = Some(self.sentinels.arm());
        }

        if !self.has_more {
            if let Some(handle) = self.sentinel.take() {
                self.sentinels.disarm(handle);
            }
        }

        self.state = if self.items.is_empty() && !self.has_more {
            AggregatorState::Exhausted
        } else {
            AggregatorState::Populated
        };
        Completion::Applied { added, duplicates }
    }

    // ── Generic item access ─────────────────────────────────────────

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &HighlightId) -> Option<&T> {
        self.items.iter().find(|i| i.key() == id)
    }

    /// Insert an item ahead of everything else.
    pub fn prepend(&mut self, item: T) {
        self.items.insert(0, item);
    }

    /// Edit one item in place. Returns false if `id` is unknown.
    pub fn update_item(&mut self, id: &HighlightId, f: impl FnOnce(&mut T)) -> bool {
        match self.items.iter_mut().find(|i| i.key() == id) {
            Some(item) => {
                f(item);
                true
            }
            None => {
                self.sink.report(
                    Severity::Debug,
                    "update for unknown item ignored",
                    json!({ "id": id }),
                );
                false
            }
        }
    }

    pub fn remove(&mut self, id: &HighlightId) -> Option<T> {
        let index = self.items.iter().position(|i| i.key() == id)?;
        Some(self.items.remove(index))
    }

    // ── View state ──────────────────────────────────────────────────

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == AggregatorState::Loading
    }

    pub fn has_searched(&self) -> bool {
        self.query.is_some()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn fetch_cursor(&self) -> usize {
        self.fetch_cursor
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_error(&self) -> Option<&FetchFailure> {
        self.last_error.as_ref()
    }

    /// The sentinel the viewer should observe, if pagination is possible.
    pub fn sentinel(&self) -> Option<SentinelHandle> {
        self.sentinel
    }

    pub fn live_sentinels(&self) -> usize {
        self.sentinels.live_count()
    }
}

impl ResultAggregator<PositionedHighlight> {
    /// Add a highlight the user just drew. It goes to the front of the list
    /// and gets a fresh local id.
    pub fn add_local_highlight(
        &mut self,
        position: HighlightPosition,
        content: HighlightContent,
        comment: Comment,
    ) -> HighlightId {
        let id = HighlightId::local();
        self.prepend(PositionedHighlight {
            id: id.clone(),
            position,
            content,
            comment,
            source: None,
        });
        id
    }

    /// Replace position and/or content of one highlight, keeping its place.
    pub fn update_highlight(&mut self, id: &HighlightId, update: HighlightUpdate) -> bool {
        self.update_item(id, |h| {
            if let Some(position) = update.position {
                h.position = position;
            }
            if let Some(content) = update.content {
                h.content = content;
            }
        })
    }

    pub fn update_comment(&mut self, id: &HighlightId, comment: Comment) -> bool {
        self.update_item(id, |h| h.comment = comment)
    }

    pub fn remove_highlight(&mut self, id: &HighlightId) -> Option<PositionedHighlight> {
        let removed = self.remove(id);
        if removed.is_some() && self.scroll.is_scrolled_to(id) {
            self.scroll.reset();
        }
        removed
    }

    /// Ask the renderer to bring `id` into view.
    pub fn scroll_to(&mut self, id: &HighlightId) -> Option<ScrollRequest> {
        let highlight = self.items.iter().find(|h| &h.id == id)?;
        Some(self.scroll.scroll_to(highlight))
    }

    pub fn is_scrolled_to(&self, id: &HighlightId) -> bool {
        self.scroll.is_scrolled_to(id)
    }
}
