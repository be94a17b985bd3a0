//! Error types for archive reading and layer materialization.
//!
//! Only two conditions terminate a materialization: a corrupt archive
//! ([`InvalidHeader`], [`TruncatedEntry`]) and a failed link creation
//! ([`Link`]). Timestamp, attribute, and security-descriptor failures are
//! advisory and are reported as warnings on the apply report instead of
//! through this type.
//!
//! [`InvalidHeader`]: LayerError::InvalidHeader
//! [`TruncatedEntry`]: LayerError::TruncatedEntry
//! [`Link`]: LayerError::Link

use std::path::PathBuf;

use crate::header::HeaderError;
use crate::pax::PaxError;

/// Result type alias for operations that may return a [`LayerError`].
pub type Result<T> = std::result::Result<T, LayerError>;

/// Errors terminating an archive read or a materialization pass.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    /// I/O error from the underlying stream or the destination tree.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A header block failed validation. The archive is considered corrupt;
    /// the position identifies the offending block.
    #[error("bad header in record {record} block {block}: {source}")]
    InvalidHeader {
        /// Record number of the offending block.
        record: u64,
        /// Block number within the record.
        block: u64,
        /// The underlying validation failure.
        source: HeaderError,
    },

    /// The stream ended inside an entry's data section, a long-name body,
    /// or an extended-header body.
    #[error("archive truncated in record {record} block {block}: {context}")]
    TruncatedEntry {
        /// Record number where the stream ended.
        record: u64,
        /// Block number within the record.
        block: u64,
        /// What was being read when the stream ended.
        context: &'static str,
    },

    /// A PAX extended-header body could not be decoded.
    #[error("bad PAX header in record {record} block {block}: {source}")]
    InvalidPaxHeader {
        /// Record number of the offending header.
        record: u64,
        /// Block number within the record.
        block: u64,
        /// The underlying decode failure.
        source: PaxError,
    },

    /// A required hard link or directory junction could not be created.
    /// Fatal: later passes assume the expanded tree is complete.
    #[error("failed to link {path} -> {target}: {source}")]
    Link {
        /// The link path that was being created.
        path: PathBuf,
        /// The existing path the link should point at.
        target: PathBuf,
        /// The underlying OS error.
        source: std::io::Error,
    },
}
