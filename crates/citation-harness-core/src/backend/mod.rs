//! Retrieval backend abstraction.
//!
//! The [`SearchBackend`] trait is the only asynchronous seam in the core.
//! The application supplies an HTTP implementation; [`memory::InMemoryBackend`]
//! serves fixed fixtures for tests and demos.
//!
//! Implementations must be `Send + Sync` so fetches can run as spawned tasks.

pub mod memory;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::{FetchWindow, NormalizedCitation, ResultPage};

/// Ranked citation search.
///
/// `window.top_k` is the total number of results requested so far for the
/// query; an implementation returns the results ranked
/// `window.offset..window.top_k`, in rank order, and whether more exist
/// beyond `top_k`.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        query: &str,
        window: FetchWindow,
    ) -> Result<ResultPage<NormalizedCitation>, FetchError>;
}
