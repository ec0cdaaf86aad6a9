//! Error types for unpack-relay
//!
//! This module provides the error taxonomy for the library:
//! - Job-level errors (transfer failures, empty archives, oversized input)
//! - Extraction errors (unsupported formats, decode failures, bad passwords)
//! - Context information (archive path, entry name, byte counts)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for unpack-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for unpack-relay
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "work_dir")
        key: Option<String>,
    },

    /// Job-level error
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// Archive extraction error
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// Outbound transport error (download, upload, or message delivery)
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Job not found
    #[error("job not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (ffprobe, ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Job lifecycle errors
#[derive(Debug, Error)]
pub enum JobError {
    /// Archive download or file upload failed at the I/O level.
    /// Retryable by the owner via resubmission; never retried automatically.
    #[error("transfer failed for job {id}: {reason}")]
    TransferFailed {
        /// The job whose transfer failed
        id: u64,
        /// The underlying transport failure
        reason: String,
    },

    /// The inbound archive exceeds the processing ceiling
    #[error("archive is {size} bytes, exceeding the {limit} byte ceiling")]
    ArchiveTooLarge {
        /// Size of the inbound archive in bytes
        size: u64,
        /// Configured ceiling in bytes
        limit: u64,
    },

    /// Extraction produced no usable files (terminal, not an archive defect)
    #[error("no files found in archive")]
    NoFilesFound,

    /// Job was cancelled by the owner (terminal state, not surfaced as an error)
    #[error("job cancelled")]
    Cancelled,
}

/// Archive extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Container signature did not match any supported format
    #[error("unsupported archive format: {archive}")]
    UnsupportedFormat {
        /// The archive file with the unrecognized signature
        archive: PathBuf,
    },

    /// Archive could not be decoded (corruption, truncation, disk errors)
    #[error("decode failed for {archive}: {reason}")]
    DecodeFailed {
        /// The archive file that failed to decode
        archive: PathBuf,
        /// The reason decoding failed
        reason: String,
    },

    /// Wrong or missing password for an encrypted archive
    #[error("wrong password for encrypted archive {archive}")]
    WrongPassword {
        /// The encrypted archive that could not be opened
        archive: PathBuf,
    },

    /// An entry attempted to escape the destination directory
    #[error("entry {entry:?} in {archive} escapes the destination directory")]
    UnsafePath {
        /// The archive containing the malicious entry
        archive: PathBuf,
        /// The offending entry name as stored in the archive
        entry: String,
    },
}
