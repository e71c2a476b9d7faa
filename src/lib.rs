//! # Citation Harness
//!
//! Turns retrieval citations into highlights on a rendered document and
//! keeps a paginated, incrementally loaded list of them consistent while
//! queries change underneath it.
//!
//! The domain logic (mapping, aggregation, sentinels, answer resolution)
//! lives in the runtime-free `citation-harness-core` crate. This crate adds
//! configuration, logging, the HTTP retrieval backend, the tokio-driven
//! [`session`], and the `cite` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  citations  ┌──────────────────┐  highlights  ┌────────────┐
//! │  Retrieval   │────────────▶│ CoordinateMapper │─────────────▶│  Result    │
//! │  (HTTP)      │             │  (page sizes)    │              │ Aggregator │
//! └──────────────┘             └──────────────────┘              └─────┬──────┘
//!        ▲                                                             │
//!        └──────────── FetchTicket (generation, window) ◀──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`renderer`] | Process-wide renderer settings |
//! | [`backend`] | HTTP retrieval backend |
//! | [`session`] | Aggregator driven on tokio |
//! | [`map_cmd`] | `cite map` |
//! | [`search`] | `cite search` |
//! | [`answer`] | `cite answer` |

pub mod answer;
pub mod backend;
pub mod config;
pub mod logging;
pub mod map_cmd;
pub mod renderer;
pub mod search;
pub mod session;
