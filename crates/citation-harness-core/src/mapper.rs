//! Coordinate mapper: normalized citations to pixel highlights.
//!
//! The retrieval backend describes each citation with a bounding box in
//! page-fraction space (`[0, 1]` on both axes) and a 1-based page number.
//! The renderer needs absolute pixels. [`CoordinateMapper::map`] scales
//! corner 0 (top-left) and corner 2 (bottom-right) by the rendered size of
//! the citation's page and assigns each highlight its identity.
//!
//! # Failure handling
//!
//! Mapping never fails as a whole. A citation with a bad bounding box is
//! reported to the [`DiagnosticSink`] and left out; the rest of the batch
//! is mapped normally. A page whose size the renderer has not measured yet
//! falls back to [`MapperOptions::default_page`] and is reported once per
//! page, not once per citation.
//!
//! # Identity
//!
//! A citation with a non-empty `source_id` keeps it as
//! [`HighlightId::Backend`], so mapping the same input twice yields the same
//! ids. Citations without one get a fresh [`HighlightId::Local`] on every
//! call. Within one call ids are unique: later citations repeating an
//! earlier `source_id` are dropped.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::json;

use crate::diagnostics::{DiagnosticSink, Severity};
use crate::error::CitationError;
use crate::models::{
    CitationSource, Comment, HighlightContent, HighlightId, HighlightPosition, HighlightRect,
    NormalizedCitation, PageSize, Point, PositionedHighlight,
};

/// Page size assumed before the renderer has measured a page.
pub const DEFAULT_PAGE_SIZE: PageSize = PageSize::new(967.0, 747.23);

/// Source of rendered page sizes, keyed by 1-based page number.
pub trait PageDimensions {
    fn page_size(&self, page_number: u32) -> Option<PageSize>;
}

impl PageDimensions for HashMap<u32, PageSize> {
    fn page_size(&self, page_number: u32) -> Option<PageSize> {
        self.get(&page_number).copied()
    }
}

impl PageDimensions for BTreeMap<u32, PageSize> {
    fn page_size(&self, page_number: u32) -> Option<PageSize> {
        self.get(&page_number).copied()
    }
}

impl<F> PageDimensions for F
where
    F: Fn(u32) -> Option<PageSize>,
{
    fn page_size(&self, page_number: u32) -> Option<PageSize> {
        self(page_number)
    }
}

/// No page has been measured yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmeasured;

impl PageDimensions for Unmeasured {
    fn page_size(&self, _page_number: u32) -> Option<PageSize> {
        None
    }
}

/// How corner 0 and corner 2 are turned into a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CornerPolicy {
    /// Corner 0 is top-left and corner 2 bottom-right, as the backend promises.
    #[default]
    Trust,
    /// Take the min/max of both corners, so inverted boxes still produce
    /// `x1 <= x2` and `y1 <= y2`.
    Normalize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapperOptions {
    pub default_page: PageSize,
    pub corner_policy: CornerPolicy,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            default_page: DEFAULT_PAGE_SIZE,
            corner_policy: CornerPolicy::Trust,
        }
    }
}

/// Stateless mapper from [`NormalizedCitation`]s to [`PositionedHighlight`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateMapper {
    options: MapperOptions,
}

impl CoordinateMapper {
    pub fn new(options: MapperOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    /// Map a batch of citations, in order, skipping the malformed ones.
    pub fn map(
        &self,
        citations: &[NormalizedCitation],
        pages: &dyn PageDimensions,
        sink: &dyn DiagnosticSink,
    ) -> Vec<PositionedHighlight> {
        let mut highlights = Vec::with_capacity(citations.len());
        let mut seen_ids: HashSet<&str> = HashSet::new();
        let mut defaulted_pages: HashSet<u32> = HashSet::new();

        for (index, citation) in citations.iter().enumerate() {
            if let Err(err) = validate_citation(citation) {
                report_rejected(sink, index, citation, &err);
                continue;
            }

            let id = match citation.source_id.as_deref().filter(|id| !id.is_empty()) {
                Some(source_id) => {
                    if !seen_ids.insert(source_id) {
                        let err = CitationError::DuplicateSourceId(source_id.to_string());
                        report_rejected(sink, index, citation, &err);
                        continue;
                    }
                    HighlightId::backend(source_id)
                }
                None => HighlightId::local(),
            };

            let page = self.resolve_page(citation.page_number, pages, &mut defaulted_pages, sink);
            let rect = self.scale(
                citation.bounding_box[0],
                citation.bounding_box[2],
                page,
                citation.page_number,
            );

            highlights.push(PositionedHighlight {
                id,
                position: HighlightPosition::single(rect),
                content: HighlightContent::text(citation.content.clone()),
                comment: Comment::default(),
                source: Some(CitationSource::from(citation)),
            });
        }

        highlights
    }

    fn resolve_page(
        &self,
        page_number: u32,
        pages: &dyn PageDimensions,
        defaulted: &mut HashSet<u32>,
        sink: &dyn DiagnosticSink,
    ) -> PageSize {
        match pages.page_size(page_number) {
            Some(size) if size.is_usable() => size,
            _ => {
                if defaulted.insert(page_number) {
                    sink.report(
                        Severity::Warn,
                        "page dimensions unavailable, using default page size",
                        json!({
                            "pageNumber": page_number,
                            "width": self.options.default_page.width,
                            "height": self.options.default_page.height,
                        }),
                    );
                }
                self.options.default_page
            }
        }
    }

    fn scale(&self, top_left: Point, bottom_right: Point, page: PageSize, page_number: u32) -> HighlightRect {
        let (x1, x2, y1, y2) = match self.options.corner_policy {
            CornerPolicy::Trust => (top_left.x, bottom_right.x, top_left.y, bottom_right.y),
            CornerPolicy::Normalize => (
                top_left.x.min(bottom_right.x),
                top_left.x.max(bottom_right.x),
                top_left.y.min(bottom_right.y),
                top_left.y.max(bottom_right.y),
            ),
        };

        HighlightRect {
            x1: x1 * page.width,
            y1: y1 * page.height,
            x2: x2 * page.width,
            y2: y2 * page.height,
            width: page.width,
            height: page.height,
            page_number,
        }
    }
}

/// Map a batch with default options.
pub fn map_citations_to_highlights(
    citations: &[NormalizedCitation],
    pages: &dyn PageDimensions,
    sink: &dyn DiagnosticSink,
) -> Vec<PositionedHighlight> {
    CoordinateMapper::default().map(citations, pages, sink)
}

/// Check the parts of a citation the mapper depends on.
pub fn validate_citation(citation: &NormalizedCitation) -> Result<(), CitationError> {
    if citation.bounding_box.len() != 4 {
        return Err(CitationError::WrongPointCount {
            found: citation.bounding_box.len(),
        });
    }
    if citation.page_number == 0 {
        return Err(CitationError::InvalidPage);
    }
    for corner in [0, 2] {
        let p = citation.bounding_box[corner];
        if !p.x.is_finite() || !p.y.is_finite() {
            return Err(CitationError::NonFiniteCorner { corner });
        }
    }
    Ok(())
}

fn report_rejected(
    sink: &dyn DiagnosticSink,
    index: usize,
    citation: &NormalizedCitation,
    err: &CitationError,
) {
    sink.report(
        Severity::Warn,
        "skipping malformed citation",
        json!({
            "index": index,
            "sourceId": citation.source_id,
            "pageNumber": citation.page_number,
            "reason": err.to_string(),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;

    fn square(x1: f64, y1: f64, x2: f64, y2: f64) -> Vec<Point> {
        vec![
            Point::new(x1, y1),
            Point::new(x2, y1),
            Point::new(x2, y2),
            Point::new(x1, y2),
        ]
    }

    fn pages(width: f64, height: f64) -> HashMap<u32, PageSize> {
        (1..=10).map(|p| (p, PageSize::new(width, height))).collect()
    }

    #[test]
    fn test_full_page_box_scales_to_page_size() {
        let sink = RecordingSink::new();
        let citations = vec![NormalizedCitation::new("all", square(0.0, 0.0, 1.0, 1.0), 1)];
        let out = map_citations_to_highlights(&citations, &pages(967.0, 747.23), &sink);

        assert_eq!(out.len(), 1);
        let r = out[0].position.bounding_rect;
        assert_eq!((r.x1, r.y1, r.x2, r.y2), (0.0, 0.0, 967.0, 747.23));
        assert_eq!(r.page_number, 1);
        assert_eq!(out[0].position.rects, vec![r]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_partial_box_scales_each_axis() {
        let sink = RecordingSink::new();
        let citations = vec![NormalizedCitation::new("q", square(0.25, 0.5, 0.75, 1.0), 2)];
        let out = map_citations_to_highlights(&citations, &pages(800.0, 1000.0), &sink);
        let r = out[0].position.bounding_rect;
        assert_eq!((r.x1, r.y1, r.x2, r.y2), (200.0, 500.0, 600.0, 1000.0));
        assert_eq!((r.width, r.height), (800.0, 1000.0));
    }

    #[test]
    fn test_malformed_box_is_dropped_and_reported_once() {
        let sink = RecordingSink::new();
        let mut citations: Vec<NormalizedCitation> = (0..5)
            .map(|i| {
                NormalizedCitation::new(format!("c{}", i), square(0.1, 0.1, 0.2, 0.2), 1)
                    .with_source_id(format!("id-{}", i))
            })
            .collect();
        citations[2].bounding_box.truncate(2);

        let out = map_citations_to_highlights(&citations, &pages(100.0, 100.0), &sink);

        assert_eq!(out.len(), 4);
        let ids: Vec<String> = out.iter().map(|h| h.id.to_string()).collect();
        assert_eq!(ids, vec!["id-0", "id-1", "id-3", "id-4"]);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.count(Severity::Warn), 1);
        assert_eq!(sink.diagnostics()[0].context["index"], 2);
    }

    #[test]
    fn test_backend_id_is_kept_and_stable() {
        let sink = RecordingSink::new();
        let citations =
            vec![NormalizedCitation::new("x", square(0.0, 0.0, 0.5, 0.5), 1).with_source_id("abc123")];
        let first = map_citations_to_highlights(&citations, &pages(10.0, 10.0), &sink);
        let second = map_citations_to_highlights(&citations, &pages(10.0, 10.0), &sink);
        assert_eq!(first[0].id, HighlightId::backend("abc123"));
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn test_missing_source_id_gets_fresh_local_id() {
        let sink = RecordingSink::new();
        let citations = vec![
            NormalizedCitation::new("a", square(0.0, 0.0, 0.5, 0.5), 1),
            NormalizedCitation::new("b", square(0.0, 0.0, 0.5, 0.5), 1).with_source_id(""),
        ];
        let out = map_citations_to_highlights(&citations, &pages(10.0, 10.0), &sink);
        assert_eq!(out.len(), 2);
        assert!(out[0].id.is_local());
        assert!(out[1].id.is_local());
        assert_ne!(out[0].id, out[1].id);

        let again = map_citations_to_highlights(&citations, &pages(10.0, 10.0), &sink);
        assert_ne!(out[0].id, again[0].id);
    }

    #[test]
    fn test_duplicate_source_id_keeps_first() {
        let sink = RecordingSink::new();
        let citations = vec![
            NormalizedCitation::new("first", square(0.0, 0.0, 0.5, 0.5), 1).with_source_id("dup"),
            NormalizedCitation::new("second", square(0.0, 0.0, 0.5, 0.5), 1).with_source_id("dup"),
        ];
        let out = map_citations_to_highlights(&citations, &pages(10.0, 10.0), &sink);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content.text, "first");
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_unknown_page_falls_back_and_warns_once_per_page() {
        let sink = RecordingSink::new();
        let mapper = CoordinateMapper::new(MapperOptions {
            default_page: PageSize::new(500.0, 400.0),
            ..MapperOptions::default()
        });
        let citations = vec![
            NormalizedCitation::new("a", square(0.0, 0.0, 1.0, 1.0), 4),
            NormalizedCitation::new("b", square(0.0, 0.0, 1.0, 1.0), 4),
            NormalizedCitation::new("c", square(0.0, 0.0, 1.0, 1.0), 5),
        ];
        let out = mapper.map(&citations, &Unmeasured, &sink);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].position.bounding_rect.x2, 500.0);
        assert_eq!(out[0].position.bounding_rect.y2, 400.0);
        assert_eq!(sink.count(Severity::Warn), 2);
    }

    #[test]
    fn test_unusable_page_size_falls_back() {
        let sink = RecordingSink::new();
        let measured = |_page: u32| Some(PageSize::new(0.0, 100.0));
        let citations = vec![NormalizedCitation::new("a", square(0.0, 0.0, 1.0, 1.0), 1)];
        let out = map_citations_to_highlights(&citations, &measured, &sink);
        assert_eq!(out[0].position.bounding_rect.x2, DEFAULT_PAGE_SIZE.width);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_trust_policy_keeps_inverted_corners() {
        let sink = RecordingSink::new();
        let citations = vec![NormalizedCitation::new("x", square(0.8, 0.9, 0.2, 0.1), 1)];
        let out = map_citations_to_highlights(&citations, &pages(100.0, 100.0), &sink);
        let r = out[0].position.bounding_rect;
        assert!(r.x1 > r.x2);
        assert!(r.y1 > r.y2);
    }

    #[test]
    fn test_normalize_policy_orders_corners() {
        let sink = RecordingSink::new();
        let mapper = CoordinateMapper::new(MapperOptions {
            corner_policy: CornerPolicy::Normalize,
            ..MapperOptions::default()
        });
        let citations = vec![NormalizedCitation::new("x", square(0.8, 0.9, 0.2, 0.1), 1)];
        let out = mapper.map(&citations, &pages(100.0, 100.0), &sink);
        let r = out[0].position.bounding_rect;
        assert!((r.x1 - 20.0).abs() < 1e-9 && (r.x2 - 80.0).abs() < 1e-9);
        assert!((r.y1 - 10.0).abs() < 1e-9 && (r.y2 - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_page_zero_and_non_finite_corners() {
        let zero = NormalizedCitation::new("z", square(0.0, 0.0, 1.0, 1.0), 0);
        assert_eq!(validate_citation(&zero), Err(CitationError::InvalidPage));

        let mut nan = NormalizedCitation::new("n", square(0.0, 0.0, 1.0, 1.0), 1);
        nan.bounding_box[2].x = f64::NAN;
        assert_eq!(
            validate_citation(&nan),
            Err(CitationError::NonFiniteCorner { corner: 2 })
        );
    }

    #[test]
    fn test_passthrough_metadata_is_carried() {
        let sink = RecordingSink::new();
        let mut c = NormalizedCitation::new("x", square(0.0, 0.0, 1.0, 1.0), 1);
        c.score = Some(0.87);
        c.connector = Some("SLACK".to_string());
        c.record_id = Some("rec-1".to_string());
        let out = map_citations_to_highlights(&[c], &pages(10.0, 10.0), &sink);
        let source = out[0].source.as_ref().unwrap();
        assert_eq!(source.score, Some(0.87));
        assert_eq!(source.connector.as_deref(), Some("SLACK"));
        assert_eq!(source.record_id.as_deref(), Some("rec-1"));
        assert_eq!(out[0].comment, Comment::default());
    }
}
