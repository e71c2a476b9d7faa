//! `cite search`: run a query against the retrieval service and page
//! through the results the way the viewer's infinite scroll does.

use std::sync::Arc;

use anyhow::{bail, Result};
use citation_harness_core::aggregator::{AggregatorState, Completion};
use citation_harness_core::diagnostics::TracingSink;

use crate::backend::HttpSearchBackend;
use crate::config::Config;
use crate::renderer;
use crate::session::SearchSession;

/// Fetch up to `pages` pages for `query` and print the highlights as JSON.
pub async fn run_search(config: &Config, query: &str, pages: usize) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let backend = Arc::new(HttpSearchBackend::new(&config.backend)?);
    tracing::debug!("searching {}", backend.endpoint());

    let mut session = SearchSession::new(
        backend,
        renderer::mapper(),
        config.pagination_options(),
        Arc::new(TracingSink),
    );

    session.submit_query(query);
    let mut fetched = 0;
    while let Some(event) = session.next_event().await {
        match event {
            Completion::Failed(failure) => bail!("{}", failure),
            Completion::Applied { added, duplicates } => {
                fetched += 1;
                tracing::info!(page = fetched, added, duplicates, "page loaded");
            }
            Completion::Exhausted | Completion::Stale => {}
        }
        if fetched >= pages || !session.load_more() {
            break;
        }
    }

    let aggregator = session.aggregator();
    if aggregator.state() == AggregatorState::Exhausted || aggregator.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(aggregator.items())?);
    if aggregator.has_more() {
        tracing::info!(
            "{} highlights shown, more are available (use --pages)",
            aggregator.len()
        );
    }
    Ok(())
}
