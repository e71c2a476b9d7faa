//! `cite map`: convert a citation file into positioned highlights.
//!
//! Input is either a bare JSON array of citations or an object with a
//! `citations` array (the shape the chat endpoint returns). The optional
//! pages file maps page numbers to measured sizes:
//!
//! ```json
//! { "1": { "width": 612.0, "height": 792.0 } }
//! ```
//!
//! The highlights are written to stdout as a JSON array. Skipped citations
//! are logged at `warn`. With `--report` the output is an object holding
//! both the highlights and every diagnostic the mapper raised.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use citation_harness_core::diagnostics::{DiagnosticSink, RecordingSink, TracingSink};
use citation_harness_core::mapper::{CornerPolicy, CoordinateMapper};
use citation_harness_core::models::{NormalizedCitation, PageSize, PositionedHighlight};
use serde_json::{json, Value};

use crate::renderer;

pub fn run_map(
    citations_path: &Path,
    pages_path: Option<&Path>,
    normalize: bool,
    report: bool,
) -> Result<()> {
    let citations = read_citations(citations_path)?;
    let pages = match pages_path {
        Some(p) => read_pages(p)?,
        None => BTreeMap::new(),
    };

    let mut options = *renderer::mapper().options();
    if normalize {
        options.corner_policy = CornerPolicy::Normalize;
    }

    let mapper = CoordinateMapper::new(options);
    let recording = RecordingSink::new();
    let highlights = if report {
        map_file(&citations, &pages, mapper, &recording)
    } else {
        map_file(&citations, &pages, mapper, &TracingSink)
    };
    tracing::info!(
        "mapped {} of {} citations",
        highlights.len(),
        citations.len()
    );

    let output = if report {
        json!({
            "highlights": highlights,
            "diagnostics": recording.diagnostics(),
        })
    } else {
        serde_json::to_value(&highlights)?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn map_file(
    citations: &[NormalizedCitation],
    pages: &BTreeMap<u32, PageSize>,
    mapper: CoordinateMapper,
    sink: &dyn DiagnosticSink,
) -> Vec<PositionedHighlight> {
    mapper.map(citations, pages, sink)
}

pub fn read_citations(path: &Path) -> Result<Vec<NormalizedCitation>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read citations file: {}", path.display()))?;
    let json: Value = serde_json::from_str(&content)
        .with_context(|| format!("Citations file is not JSON: {}", path.display()))?;

    let list = match json {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("citations") {
            Some(Value::Array(items)) => items,
            _ => bail!("expected a `citations` array in {}", path.display()),
        },
        _ => bail!("expected a JSON array of citations in {}", path.display()),
    };

    // Entries that do not even decode are dropped here; the mapper handles
    // the ones that decode but are malformed.
    let citations = list
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value(item) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!(index = i, "skipping undecodable citation: {}", e);
                None
            }
        })
        .collect();
    Ok(citations)
}

pub fn read_pages(path: &Path) -> Result<BTreeMap<u32, PageSize>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pages file: {}", path.display()))?;
    let raw: BTreeMap<String, PageSize> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse pages file: {}", path.display()))?;

    raw.into_iter()
        .map(|(k, size)| {
            let page: u32 = k
                .trim()
                .parse()
                .with_context(|| format!("invalid page number '{}' in pages file", k))?;
            Ok((page, size))
        })
        .collect()
}
