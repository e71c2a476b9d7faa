//! Diagnostic reporting.
//!
//! Core operations never fail on bad input from a single item and never
//! panic on a failed fetch. Instead they report through a caller-supplied
//! [`DiagnosticSink`]. [`TracingSink`] forwards to `tracing` and is the
//! production default; [`RecordingSink`] keeps everything in memory.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// A single reported event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub context: Value,
    pub at: DateTime<Utc>,
}

/// Receiver for diagnostics. Implementations must not panic.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, severity: Severity, message: &str, context: Value);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Arc<S> {
    fn report(&self, severity: Severity, message: &str, context: Value) {
        (**self).report(severity, message, context)
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &S {
    fn report(&self, severity: Severity, message: &str, context: Value) {
        (**self).report(severity, message, context)
    }
}

/// Forwards diagnostics to the `tracing` subscriber installed by the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, severity: Severity, message: &str, context: Value) {
        match severity {
            Severity::Debug => tracing::debug!(context = %context, "{}", message),
            Severity::Info => tracing::info!(context = %context, "{}", message),
            Severity::Warn => tracing::warn!(context = %context, "{}", message),
            Severity::Error => tracing::error!(context = %context, "{}", message),
        }
    }
}

/// Keeps every diagnostic in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of diagnostics at exactly `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, severity: Severity, message: &str, context: Value) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Diagnostic {
                severity,
                message: message.to_string(),
                context,
                at: Utc::now(),
            });
    }
}
