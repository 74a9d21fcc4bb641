/*
 * logging.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Sinks for errors handled by the `log` error strategy.
//!
//! The [`ErrorLogger`] trait lets embedders decide where swallowed tag
//! errors go. The default, [`TracingLogger`], emits `tracing` events so the
//! errors show up in whatever subscriber the application installs.

use std::sync::{Mutex, PoisonError};

use crate::position::Position;

/// One error recorded by the `log` strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Name of the tag whose resolution failed.
    pub tag: String,
    /// Where the tag starts in its template.
    pub position: Position,
    /// Rendered error message.
    pub message: String,
    /// Original source text of the tag.
    pub source_text: String,
}

/// Receiver for errors that the `log` strategy swallows.
///
/// Implementations must be `Send + Sync`: a single engine (and its logger)
/// may serve concurrent executions.
pub trait ErrorLogger: Send + Sync {
    fn log_error(&self, record: &ErrorRecord);
}

/// Logger that drops every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl ErrorLogger for NoopLogger {
    fn log_error(&self, _record: &ErrorRecord) {}
}

/// Logger that emits one `tracing` warning per record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl TracingLogger {
    pub fn new() -> Self {
        Self
    }
}

impl ErrorLogger for TracingLogger {
    fn log_error(&self, record: &ErrorRecord) {
        tracing::warn!(
            tag = %record.tag,
            line = record.position.line,
            column = record.position.column,
            error = %record.message,
            "Tag resolution failed"
        );
    }
}

/// Logger that keeps records in memory.
///
/// Useful for tests and for callers that want to surface swallowed errors
/// after an execution finishes.
#[derive(Debug, Default)]
pub struct CollectingLogger {
    records: Mutex<Vec<ErrorRecord>>,
}

impl CollectingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records collected so far.
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl ErrorLogger for CollectingLogger {
    fn log_error(&self, record: &ErrorRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}
