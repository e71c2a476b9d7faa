//! Core data models for citations and highlights.
//!
//! These types describe what flows from the retrieval backend
//! ([`NormalizedCitation`]) through the mapper ([`PositionedHighlight`])
//! and into the aggregator ([`ResultPage`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A page-fraction coordinate. Both axes are expected in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rendered size of a page in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// True when both dimensions are finite and strictly positive.
    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

fn first_page() -> u32 {
    1
}

/// One matched region of a document as returned by the retrieval backend.
///
/// Field names follow the retrieval service's JSON, which is not
/// consistent across connectors, so the common spellings are accepted as
/// aliases. Any metadata not modelled here is kept in `extra`.
///
/// Corner 0 of `bounding_box` is the top-left corner and corner 2 the
/// bottom-right one; corners 1 and 3 are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedCitation {
    #[serde(default)]
    pub content: String,
    #[serde(alias = "bounding_box", default)]
    pub bounding_box: Vec<Point>,
    #[serde(alias = "pageNum", alias = "page_number", default = "first_page")]
    pub page_number: u32,
    #[serde(alias = "_id", alias = "source_id", default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
    #[serde(alias = "record_id", default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NormalizedCitation {
    pub fn new(content: impl Into<String>, bounding_box: Vec<Point>, page_number: u32) -> Self {
        Self {
            content: content.into(),
            bounding_box,
            page_number,
            source_id: None,
            score: None,
            connector: None,
            record_id: None,
            extension: None,
            extra: Map::new(),
        }
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

/// Identity of a highlight.
///
/// Backend ids and locally generated ids live in separate variants, so a
/// highlight drawn by the user can never be confused with one returned by
/// the retrieval backend, whatever the backend's id scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum HighlightId {
    Backend(String),
    Local(Uuid),
}

impl HighlightId {
    /// Generate a fresh local identifier.
    pub fn local() -> Self {
        HighlightId::Local(Uuid::new_v4())
    }

    pub fn backend(id: impl Into<String>) -> Self {
        HighlightId::Backend(id.into())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, HighlightId::Local(_))
    }
}

impl fmt::Display for HighlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HighlightId::Backend(id) => f.write_str(id),
            HighlightId::Local(uuid) => write!(f, "local:{}", uuid),
        }
    }
}

/// A rectangle in absolute page pixels.
///
/// `width` and `height` are the rendered page dimensions the rectangle
/// was scaled against, so the renderer can rescale if the page is later
/// drawn at a different size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub width: f64,
    pub height: f64,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightPosition {
    pub bounding_rect: HighlightRect,
    pub rects: Vec<HighlightRect>,
    pub page_number: u32,
}

impl HighlightPosition {
    /// A position covering exactly one rectangle.
    pub fn single(rect: HighlightRect) -> Self {
        Self {
            bounding_rect: rect,
            rects: vec![rect],
            page_number: rect.page_number,
        }
    }
}

/// What a highlight covers: selected text, or a screenshot for area highlights.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HighlightContent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<u8>>,
}

impl HighlightContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }
}

/// User annotation attached to a highlight.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub emoji: String,
}

/// Backend metadata carried through untouched for display.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl From<&NormalizedCitation> for CitationSource {
    fn from(c: &NormalizedCitation) -> Self {
        Self {
            score: c.score,
            connector: c.connector.clone(),
            record_id: c.record_id.clone(),
            extension: c.extension.clone(),
            extra: c.extra.clone(),
        }
    }
}

/// A highlight positioned on a rendered page.
///
/// `source` is `None` for highlights the user drew locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedHighlight {
    pub id: HighlightId,
    pub position: HighlightPosition,
    pub content: HighlightContent,
    #[serde(default)]
    pub comment: Comment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<CitationSource>,
}

/// The window of ranked results one fetch asks for.
///
/// `top_k` is the total number of results requested so far for the
/// query; `offset` is how many of those were already delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchWindow {
    pub offset: usize,
    pub top_k: usize,
}

impl FetchWindow {
    pub fn len(&self) -> usize {
        self.top_k.saturating_sub(self.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One fetched batch, in backend rank order.
///
/// `consumed` is how many backend ranks the batch covers. It starts equal to
/// `items.len()` and stays fixed when items are filtered or converted, so
/// the next window starts after the last rank the backend sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    pub consumed: usize,
}

impl<T> ResultPage<T> {
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        let consumed = items.len();
        Self {
            items,
            has_more,
            consumed,
        }
    }

    pub fn with_consumed(mut self, consumed: usize) -> Self {
        self.consumed = consumed;
        self
    }

    /// Convert every item, keeping order, `has_more` and `consumed`.
    pub fn map<U>(self, f: impl FnOnce(Vec<T>) -> Vec<U>) -> ResultPage<U> {
        ResultPage {
            items: f(self.items),
            has_more: self.has_more,
            consumed: self.consumed,
        }
    }
}
