//! Error taxonomy for the citation pipeline.
//!
//! Item-level problems ([`CitationError`]) are recovered inside the mapper
//! and only ever reported. Fetch-level problems ([`FetchError`]) surface in
//! the aggregator's state as a [`FetchFailure`].

use thiserror::Error;

/// Why a single citation was rejected by the mapper.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CitationError {
    #[error("bounding box has {found} points, expected 4")]
    WrongPointCount { found: usize },

    #[error("bounding box corner {corner} has a non-finite coordinate")]
    NonFiniteCorner { corner: usize },

    #[error("page number must be >= 1")]
    InvalidPage,

    #[error("duplicate source id `{0}` in batch")]
    DuplicateSourceId(String),
}

/// A fetch against the retrieval backend failed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("could not decode backend response: {0}")]
    Decode(String),

    /// The fetch task was aborted or panicked before producing a result.
    #[error("fetch was cancelled")]
    Cancelled,
}

/// A failed fetch as shown to the consumer.
///
/// Distinct from an empty result set: an aggregator holding a
/// `FetchFailure` did not learn anything about the query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("search for `{query}` failed: {error}")]
pub struct FetchFailure {
    pub query: String,
    pub generation: u64,
    pub error: FetchError,
}

/// An LLM answer that could not be parsed at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    #[error("failed to parse answer: {0}")]
    Unparseable(String),
}
