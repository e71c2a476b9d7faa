//! In-memory [`SearchBackend`] for tests and demos.
//!
//! Each query maps to a fixed, already ranked list of citations. Windows
//! are sliced from that list. A query can be set to fail instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::{FetchWindow, NormalizedCitation, ResultPage};

use super::SearchBackend;

#[derive(Default)]
pub struct InMemoryBackend {
    corpora: RwLock<HashMap<String, Vec<NormalizedCitation>>>,
    failures: RwLock<HashMap<String, FetchError>>,
    calls: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ranked results for `query`.
    pub fn insert(&self, query: impl Into<String>, results: Vec<NormalizedCitation>) {
        self.corpora
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query.into(), results);
    }

    /// Make every search for `query` fail with `error`.
    pub fn fail_with(&self, query: impl Into<String>, error: FetchError) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query.into(), error);
    }

    pub fn clear_failure(&self, query: &str) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(query);
    }

    /// Number of searches served so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn search(
        &self,
        query: &str,
        window: FetchWindow,
    ) -> Result<ResultPage<NormalizedCitation>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self
            .failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query)
        {
            return Err(err.clone());
        }

        let corpora = self.corpora.read().unwrap_or_else(PoisonError::into_inner);
        let all = corpora.get(query).map(Vec::as_slice).unwrap_or(&[]);
        let start = window.offset.min(all.len());
        let end = window.top_k.min(all.len()).max(start);

        Ok(ResultPage::new(all[start..end].to_vec(), window.top_k < all.len()))
    }
}
