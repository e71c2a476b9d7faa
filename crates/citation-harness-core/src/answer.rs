//! Resolve the chunk references in an LLM answer to citations.
//!
//! The chat endpoint numbers the retrieved chunks `1..=n` in the prompt and
//! asks the model to answer with JSON naming the chunks it used. Models are
//! not strict about it: the JSON may be wrapped in quotes, carry escaped
//! newlines, have prose around it, name the field `chunkIndexes`,
//! `chunkindex` or `chunk_indexes` at any depth, give indexes as numbers,
//! strings, or a comma-separated string, or only mention `[1, 2]` inside
//! the answer text. [`resolve_answer_citations`] accepts all of these.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AnswerError;

const INDEX_KEYS: [&str; 3] = ["chunkIndexes", "chunkindex", "chunk_indexes"];

/// A chunk that was part of the prompt, as returned by retrieval.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RetrievedDocument {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerCitation {
    pub content: String,
    /// 1-based index into the prompt's chunk list.
    pub chunk_index: usize,
    pub metadata: Value,
    pub citation_type: String,
}

/// The model's answer object with its resolved citations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerWithCitations {
    #[serde(flatten)]
    pub answer: Map<String, Value>,
    pub citations: Vec<AnswerCitation>,
}

/// Parse the raw model output into JSON, tolerating common wrapping.
pub fn parse_answer(raw: &str) -> Result<Value, AnswerError> {
    let mut cleaned = raw.trim().to_string();
    if cleaned.len() >= 2 && cleaned.starts_with('"') && cleaned.ends_with('"') {
        cleaned = cleaned[1..cleaned.len() - 1].replace("\\\"", "\"");
    }
    let cleaned = cleaned.replace("\\n", "\n").replace("\\t", "\t");

    match serde_json::from_str(&cleaned) {
        Ok(value) => Ok(value),
        Err(first) => {
            let start = cleaned.find('{');
            let end = cleaned.rfind('}');
            match (start, end) {
                (Some(s), Some(e)) if e > s => serde_json::from_str(&cleaned[s..=e])
                    .map_err(|nested| AnswerError::Unparseable(format!("{}; {}", first, nested))),
                _ => Err(AnswerError::Unparseable(first.to_string())),
            }
        }
    }
}

/// Depth-first search for the first non-null chunk index field.
pub fn find_chunk_indexes(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) => {
            let direct = INDEX_KEYS
                .iter()
                .filter_map(|k| map.get(*k))
                .find(|v| !v.is_null());
            direct.or_else(|| map.values().find_map(find_chunk_indexes))
        }
        Value::Array(items) => items.iter().find_map(find_chunk_indexes),
        _ => None,
    }
}

fn bracket_marker() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(r"\[([0-9,\s]+)\]").ok())
        .as_ref()
}

/// Contents of the first `[1, 2]`-style marker in free text.
fn find_bracket_marker(text: &str) -> Option<&str> {
    bracket_marker()?
        .captures(text)?
        .get(1)
        .map(|m| m.as_str())
}

/// A JSON index value as a whole number; `2.0` counts, `2.5` does not.
fn whole_number(n: &serde_json::Number) -> Option<String> {
    if let Some(u) = n.as_u64() {
        return Some(u.to_string());
    }
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= 0.0)
        .map(|f| format!("{}", f as u64))
}

fn parse_index_list(text: &str) -> Vec<String> {
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '"' | '\''))
        .collect();
    if stripped.contains(',') {
        stripped.split(',').map(|s| s.trim().to_string()).collect()
    } else {
        stripped.split_whitespace().map(str::to_string).collect()
    }
}

fn index_candidates(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => whole_number(n),
                other => Some(other.to_string()),
            })
            .collect(),
        Value::String(s) => parse_index_list(s),
        Value::Null => Vec::new(),
        Value::Number(n) => whole_number(n).into_iter().collect(),
        other => vec![other.to_string()],
    }
}

/// Parse `raw` and attach the chunks it references.
///
/// Indexes are 1-based; values that do not parse or fall outside
/// `documents` are skipped.
pub fn resolve_answer_citations(
    raw: &str,
    documents: &[RetrievedDocument],
) -> Result<AnswerWithCitations, AnswerError> {
    let parsed = parse_answer(raw)?;

    let mut candidates = find_chunk_indexes(&parsed).map(index_candidates);
    if candidates.is_none() {
        candidates = parsed
            .get("answer")
            .and_then(Value::as_str)
            .and_then(find_bracket_marker)
            .map(parse_index_list);
    }

    let citations = candidates
        .unwrap_or_default()
        .iter()
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<usize>().ok())
        .filter(|&i| i >= 1 && i <= documents.len())
        .map(|i| {
            let doc = &documents[i - 1];
            AnswerCitation {
                content: doc.content.clone(),
                chunk_index: i,
                metadata: doc.metadata.clone(),
                citation_type: "vectordb|document".to_string(),
            }
        })
        .collect();

    let answer = match parsed {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            let text = match other {
                Value::String(s) => s,
                v => v.to_string(),
            };
            map.insert("answer".to_string(), Value::String(text));
            map
        }
    };

    Ok(AnswerWithCitations { answer, citations })
}
