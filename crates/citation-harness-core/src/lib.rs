//! # Citation Harness Core
//!
//! Shared, runtime-free logic for Citation Harness: the citation data
//! model, the coordinate mapper that turns normalized bounding boxes into
//! pixel highlights, the incremental result aggregator, and the small
//! subscription/navigation primitives the viewer builds on.
//!
//! This crate contains no tokio, HTTP, or filesystem dependencies. All
//! operations are synchronous except the [`backend::SearchBackend`] trait,
//! which the application drives on its own runtime.
//!
//! ```text
//! backend ──▶ NormalizedCitation[] ──▶ mapper ──▶ PositionedHighlight[]
//!                                                      │
//!                                                      ▼
//!                             sidebar / overlay ◀── aggregator
//! ```

pub mod aggregator;
pub mod answer;
pub mod backend;
pub mod diagnostics;
pub mod error;
pub mod mapper;
pub mod models;
pub mod navigation;
pub mod sentinel;
