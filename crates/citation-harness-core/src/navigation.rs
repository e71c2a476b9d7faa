//! Scroll synchronisation between the sidebar and the highlight overlay.

use serde::Serialize;

use crate::models::{HighlightId, HighlightRect, PositionedHighlight};

/// What the renderer needs to bring a highlight into view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollRequest {
    pub id: HighlightId,
    pub page_number: u32,
    pub rect: HighlightRect,
}

/// Tracks which highlight the viewer was last asked to scroll to.
#[derive(Debug, Clone, Default)]
pub struct ScrollSync {
    target: Option<HighlightId>,
}

impl ScrollSync {
    pub fn scroll_to(&mut self, highlight: &PositionedHighlight) -> ScrollRequest {
        self.target = Some(highlight.id.clone());
        ScrollRequest {
            id: highlight.id.clone(),
            page_number: highlight.position.page_number,
            rect: highlight.position.bounding_rect,
        }
    }

    /// Overlay predicate: is this the highlight currently scrolled to?
    pub fn is_scrolled_to(&self, id: &HighlightId) -> bool {
        self.target.as_ref() == Some(id)
    }

    pub fn current(&self) -> Option<&HighlightId> {
        self.target.as_ref()
    }

    pub fn reset(&mut self) {
        self.target = None;
    }
}
