//! Error types for the IP allow engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for IP allow operations.
pub type IpAllowResult<T> = Result<T, IpAllowError>;

/// Errors that can occur while building or publishing ACL tables.
#[derive(Debug, Error)]
pub enum IpAllowError {
    /// The process-wide method registry was queried before it was installed.
    #[error("method registry not initialized")]
    NotInitialized,

    /// The process-wide method registry was installed twice.
    #[error("method registry already initialized")]
    AlreadyInitialized,

    /// More methods were registered than fit in a method mask.
    #[error("too many methods: at most {max} can be registered")]
    TooManyMethods {
        /// Mask capacity in bits.
        max: usize,
    },

    /// A method name was registered twice.
    #[error("duplicate method name: {0}")]
    DuplicateMethod(String),

    /// The rules file could not be read.
    #[error("failed to read rules file '{path}': {source}")]
    ReadFailed {
        /// Path to the rules file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A background reload task panicked or was cancelled.
    #[error("reload task failed: {0}")]
    ReloadTask(String),
}

impl IpAllowError {
    /// Check if retrying the same operation later may succeed.
    ///
    /// Registry errors are programming or configuration mistakes that a retry
    /// cannot fix.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ReadFailed { .. } | Self::ReloadTask(_))
    }
}

/// A configuration line that was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct LineError {
    /// One-based line number in the rules file.
    pub line: usize,
    /// What was wrong with the line.
    pub kind: LineErrorKind,
}

impl LineError {
    /// Create a new line error.
    #[must_use]
    pub fn new(line: usize, kind: LineErrorKind) -> Self {
        Self { line, kind }
    }
}

/// Reason a configuration line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineErrorKind {
    /// The line could not be split into `label=value` tokens.
    #[error("malformed line: {0}")]
    Malformed(String),

    /// No `src_ip` token was present.
    #[error("missing source specifier (src_ip)")]
    MissingSource,

    /// More than one `src_ip` token was present.
    #[error("multiple source specifiers (src_ip)")]
    MultipleSources,

    /// The `src_ip` value is not an address or a valid range.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// No recognised `action=` token was present.
    #[error("Invalid action/method specified")]
    MissingAction,
}
