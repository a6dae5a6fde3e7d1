//! Error types for archive filtering and appending.
//!
//! Every fallible operation in this crate returns [`Result<T>`], an alias for
//! `Result<T, ArchiveError>`.  All errors are terminal for the call that produced them: nothing
//! is retried internally and nothing is logged and dropped.
//!
//! # Error Categories
//!
//! - **Container errors**: [`Decode`] for malformed or truncated headers
//! - **Stream errors**: [`Io`] for read, write, copy and spill failures
//! - **Pattern errors**: [`Pattern`] for invalid exclusion globs
//! - **Preconditions**: [`EmptyName`], [`NilBody`], [`NilOutput`]
//!
//! [`Decode`]: ArchiveError::Decode
//! [`Io`]: ArchiveError::Io
//! [`Pattern`]: ArchiveError::Pattern
//! [`EmptyName`]: ArchiveError::EmptyName
//! [`NilBody`]: ArchiveError::NilBody
//! [`NilOutput`]: ArchiveError::NilOutput

use std::io;

/// Result type alias for operations that may return an ArchiveError.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Errors produced while filtering or appending to a tar stream.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The header of the entry at `index` (0-based, counting resolved entries) could not be
    /// decoded.
    #[error("unable to read header of entry #{index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: io::Error,
    },

    /// A read, write or copy against one of the underlying streams failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// An exclusion pattern is malformed, or could not be evaluated.
    #[error("invalid exclusion pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("filename must not be empty")]
    EmptyName,

    #[error("input reader must not be None")]
    NilBody,

    #[error("output archive must not be None")]
    NilOutput,
}

impl ArchiveError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        ArchiveError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        ArchiveError::Pattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}
