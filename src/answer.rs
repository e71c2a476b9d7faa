//! `cite answer`: attach citations to a model answer.

use std::path::Path;

use anyhow::{Context, Result};
use citation_harness_core::answer::{resolve_answer_citations, RetrievedDocument};

pub fn run_answer(answer_path: &Path, documents_path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(answer_path)
        .with_context(|| format!("Failed to read answer file: {}", answer_path.display()))?;
    let documents = read_documents(documents_path)?;

    let resolved = resolve_answer_citations(&raw, &documents)?;
    tracing::info!(
        "resolved {} citations against {} documents",
        resolved.citations.len(),
        documents.len()
    );
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

/// Documents in prompt order. Accepts a bare array or `{"searchResults": [...]}`.
pub fn read_documents(path: &Path) -> Result<Vec<RetrievedDocument>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents file: {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Documents file is not JSON: {}", path.display()))?;

    let list = match json.get("searchResults") {
        Some(results) => results.clone(),
        None => json,
    };
    serde_json::from_value(list)
        .with_context(|| format!("expected an array of documents in {}", path.display()))
}
