//! Error types for the execution engine
//!
//! Failures are split by how far they are allowed to travel: build errors,
//! protocol and resolver failures are contained at the smallest enclosing
//! item, while [`EngineError`] aborts a run before any stream starts.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Diagnostic attached to a specification that failed to parse or validate
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub file_name: String,
    pub line_no: usize,
    pub message: String,
    #[serde(default)]
    pub line_text: String,
}

impl ParseError {
    pub fn new(
        file_name: impl Into<String>,
        line_no: usize,
        message: impl Into<String>,
        line_text: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            line_no,
            message: message.into(),
            line_text: line_text.into(),
        }
    }

    /// Error without a source location
    pub fn message(message: impl Into<String>) -> Self {
        Self::new("", 0, message, "")
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line_no == 0 && self.file_name.is_empty() {
            return write!(f, "{}", self.message);
        }
        write!(
            f,
            "{}:{} {} => '{}'",
            self.file_name, self.line_no, self.message, self.line_text
        )
    }
}

impl std::error::Error for ParseError {}

/// Failure talking to a runner
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("runner is not alive")]
    Unreachable,

    #[error("runner did not respond within {0}ms")]
    Timeout(u64),

    #[error("malformed response from runner: {0}")]
    MalformedResponse(String),

    #[error("runner i/o failed: {0}")]
    Io(String),

    #[error("failed to start runner: {0}")]
    Startup(String),
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::Io(err.to_string())
    }
}

/// Failure resolving a step argument into a concrete value
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("Resolver not found for special param <{0}>")]
    NotFound(String),

    #[error("Invalid special param <{token}>: {reason}")]
    InvalidSpecialParam { token: String, reason: String },

    #[error("Malformed table at row {row}: expected {expected} cells, found {found}")]
    MalformedTable {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Dynamic param <{0}> could not be resolved, no matching table column")]
    UnknownColumn(String),
}

/// Failure reading or writing the execution status record
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid execution status information in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Invalid configuration value, rejected before the run starts
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("number of streams must be at least 1")]
    InvalidStreamCount,

    #[error("invalid table rows '{0}': {1}")]
    InvalidTableRows(String, String),

    #[error("invalid tag expression '{0}': {1}")]
    InvalidTagExpression(String, String),

    #[error("unknown distribution strategy '{0}' (expected eager or lazy)")]
    UnknownStrategy(String),

    #[error("table row {row} is out of range for {spec}, which has {available} rows")]
    TableRowOutOfRange {
        spec: String,
        row: usize,
        available: usize,
    },
}

/// Fatal errors that abort a run before any stream starts
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read project manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("event bus already initialized for this run")]
    BusAlreadyInitialized,

    #[error(transparent)]
    Status(#[from] StatusError),
}
