/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Engine configuration: delimiters, default error strategy, resource limits
//! and the logging sink.
//!
//! Configuration is built with `with_*` methods, or loaded from a JSON
//! document with [`EngineConfig::from_json`]:
//!
//! ```ignore
//! let config = EngineConfig::from_json(r#"{ "error_strategy": "log", "max_depth": 4 }"#)?;
//! let engine = Engine::with_config(config);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::context::ErrorStrategy;
use crate::logging::{ErrorLogger, TracingLogger};

/// Errors raised while building a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid delimiters: {0}")]
    InvalidDelimiters(String),

    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),
}

/// The open/close marker pair that surrounds tags.
///
/// With the default `{~` / `~}` pair, the derived markers are:
/// - self-closing end: `/~}`
/// - close tag start: `{~/`
/// - escape: `\{~`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    open: String,
    close: String,
}

impl Delimiters {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Result<Self, ConfigError> {
        let open = open.into();
        let close = close.into();

        if open.is_empty() || close.is_empty() {
            return Err(ConfigError::InvalidDelimiters(
                "delimiters must not be empty".to_string(),
            ));
        }
        if open == close {
            return Err(ConfigError::InvalidDelimiters(format!(
                "open and close delimiters must differ (both are `{}`)",
                open
            )));
        }
        if open.starts_with('/') || close.starts_with('/') {
            return Err(ConfigError::InvalidDelimiters(
                "delimiters must not start with `/`".to_string(),
            ));
        }
        if open.chars().chain(close.chars()).any(char::is_whitespace) {
            return Err(ConfigError::InvalidDelimiters(
                "delimiters must not contain whitespace".to_string(),
            ));
        }

        Ok(Self { open, close })
    }

    pub fn open(&self) -> &str {
        &self.open
    }

    pub fn close(&self) -> &str {
        &self.close
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            open: "{~".to_string(),
            close: "~}".to_string(),
        }
    }
}

/// Independently configurable resource limits.
///
/// Exceeding any of these is always fatal, whatever error strategy is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum include nesting depth.
    pub max_depth: usize,
    /// Maximum iterations of a single loop (independent of a tag's `limit`).
    pub max_loop_iterations: usize,
    /// Maximum size of the rendered output.
    pub max_output_bytes: usize,
    /// Wall-clock budget of one top-level execution.
    pub execution_timeout: Duration,
    /// Budget of a single resolver call.
    pub resolver_timeout: Duration,
    /// Budget of a single expression function call.
    pub function_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_loop_iterations: 10_000,
            max_output_bytes: 10 * 1024 * 1024,
            execution_timeout: Duration::from_secs(30),
            resolver_timeout: Duration::from_secs(5),
            function_timeout: Duration::from_secs(1),
        }
    }
}

impl Limits {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_loop_iterations(mut self, iterations: usize) -> Self {
        self.max_loop_iterations = iterations;
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn with_resolver_timeout(mut self, timeout: Duration) -> Self {
        self.resolver_timeout = timeout;
        self
    }

    pub fn with_function_timeout(mut self, timeout: Duration) -> Self {
        self.function_timeout = timeout;
        self
    }
}

/// Complete engine configuration.
#[derive(Clone)]
pub struct EngineConfig {
    pub(crate) delimiters: Delimiters,
    pub(crate) default_error_strategy: ErrorStrategy,
    pub(crate) limits: Limits,
    pub(crate) logger: Arc<dyn ErrorLogger>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delimiters: Delimiters::default(),
            default_error_strategy: ErrorStrategy::Throw,
            limits: Limits::default(),
            logger: Arc::new(TracingLogger::new()),
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("delimiters", &self.delimiters)
            .field("default_error_strategy", &self.default_error_strategy)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiters(mut self, delimiters: Delimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    /// Set the strategy used by tags without an `onerror` attribute.
    pub fn with_error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.default_error_strategy = strategy;
        self
    }

    /// Set the maximum include depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.limits.max_depth = depth;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the sink that receives errors handled by the `log` strategy.
    pub fn with_logger(mut self, logger: Arc<dyn ErrorLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    pub fn default_error_strategy(&self) -> ErrorStrategy {
        self.default_error_strategy
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn logger(&self) -> &Arc<dyn ErrorLogger> {
        &self.logger
    }

    /// Load a configuration from a JSON document.
    ///
    /// Every field is optional; durations are given in milliseconds.
    /// The logging sink cannot be configured this way and stays the tracing sink.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let doc: ConfigDocument = serde_json::from_str(json)?;
        doc.into_config()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigDocument {
    open_delimiter: Option<String>,
    close_delimiter: Option<String>,
    error_strategy: Option<ErrorStrategy>,
    max_depth: Option<usize>,
    max_loop_iterations: Option<usize>,
    max_output_bytes: Option<usize>,
    execution_timeout_ms: Option<u64>,
    resolver_timeout_ms: Option<u64>,
    function_timeout_ms: Option<u64>,
}

impl ConfigDocument {
    fn into_config(self) -> Result<EngineConfig, ConfigError> {
        let mut config = EngineConfig::default();

        if self.open_delimiter.is_some() || self.close_delimiter.is_some() {
            let defaults = Delimiters::default();
            config.delimiters = Delimiters::new(
                self.open_delimiter.unwrap_or(defaults.open),
                self.close_delimiter.unwrap_or(defaults.close),
            )?;
        }
        if let Some(strategy) = self.error_strategy {
            config.default_error_strategy = strategy;
        }

        let limits = &mut config.limits;
        if let Some(v) = self.max_depth {
            limits.max_depth = v;
        }
        if let Some(v) = self.max_loop_iterations {
            limits.max_loop_iterations = v;
        }
        if let Some(v) = self.max_output_bytes {
            limits.max_output_bytes = v;
        }
        if let Some(ms) = self.execution_timeout_ms {
            limits.execution_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.resolver_timeout_ms {
            limits.resolver_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.function_timeout_ms {
            limits.function_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_depth, 10);
        assert_eq!(limits.max_loop_iterations, 10_000);
        assert_eq!(limits.max_output_bytes, 10 * 1024 * 1024);
        assert_eq!(limits.execution_timeout, Duration::from_secs(30));
        assert_eq!(limits.resolver_timeout, Duration::from_secs(5));
        assert_eq!(limits.function_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_delimiters_validation() {
        assert!(Delimiters::new("<<", ">>").is_ok());
        assert!(Delimiters::new("", ">>").is_err());
        assert!(Delimiters::new("<<", "<<").is_err());
        assert!(Delimiters::new("/<", ">").is_err());
        assert!(Delimiters::new("< <", ">>").is_err());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_error_strategy(ErrorStrategy::Remove)
            .with_max_depth(3);

        assert_eq!(config.default_error_strategy(), ErrorStrategy::Remove);
        assert_eq!(config.limits().max_depth, 3);
        assert_eq!(config.delimiters(), &Delimiters::default());
    }

    #[test]
    fn test_from_json() {
        let config = EngineConfig::from_json(
            r#"{
                "open_delimiter": "<%",
                "close_delimiter": "%>",
                "error_strategy": "keepraw",
                "max_loop_iterations": 50,
                "resolver_timeout_ms": 250
            }"#,
        )
        .unwrap();

        assert_eq!(config.delimiters().open(), "<%");
        assert_eq!(config.delimiters().close(), "%>");
        assert_eq!(config.default_error_strategy(), ErrorStrategy::KeepRaw);
        assert_eq!(config.limits().max_loop_iterations, 50);
        assert_eq!(config.limits().resolver_timeout, Duration::from_millis(250));
        assert_eq!(config.limits().max_depth, 10);
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "max_dept": 3 }"#),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_from_json_validates_delimiters() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "open_delimiter": "~}" }"#),
            Err(ConfigError::InvalidDelimiters(_))
        ));
    }
}
