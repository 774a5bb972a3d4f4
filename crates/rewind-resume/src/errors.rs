//! Error types for snapshot restoration and resume orchestration.

use thiserror::Error;

/// Errors raised by external collaborators (metadata and log sources).
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading a log location failed.
    #[error("failed to read {location}: {source}")]
    Io {
        /// Location being read.
        location: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The collaborator could not serve the request.
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while materializing a working tree from a snapshot.
///
/// Never fatal to a resume: the applier logs them and moves on.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// The snapshot has no archive to restore from.
    #[error("snapshot {tree_hash} has no archive")]
    MissingArchive {
        /// Snapshot tree hash.
        tree_hash: String,
    },
    /// The archive could not be retrieved.
    #[error("failed to fetch archive {archive}: {message}")]
    Fetch {
        /// Archive reference.
        archive: String,
        /// What went wrong.
        message: String,
    },
    /// The snapshot tree hash is not a full hex object id.
    #[error("invalid snapshot tree hash {tree_hash:?}")]
    InvalidTreeHash {
        /// Hash as recorded in the log.
        tree_hash: String,
    },
    /// The git index could not be saved or put back.
    #[error("failed to access git index {}: {source}", path.display())]
    Index {
        /// Index file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// A git command could not be started.
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
    /// A git command exited unsuccessfully.
    #[error("git {command} failed: {stderr}")]
    Git {
        /// Subcommand and arguments.
        command: String,
        /// Captured stderr.
        stderr: String,
    },
    /// The materialized tree does not match the snapshot.
    #[error("restored tree {actual} does not match snapshot {expected}")]
    TreeMismatch {
        /// Snapshot tree hash.
        expected: String,
        /// Tree hash after restoration.
        actual: String,
    },
}

/// Errors that abort a resume.
///
/// Only the read steps fail a resume; callers fall back to a fresh start.
#[derive(Debug, Error)]
pub enum ResumeError {
    /// Run metadata could not be fetched.
    #[error("failed to fetch run metadata: {0}")]
    Metadata(#[source] SourceError),
    /// The run log could not be fetched.
    #[error("failed to fetch run log: {0}")]
    LogFetch(#[source] SourceError),
}

/// Result type for resume operations.
pub type Result<T> = std::result::Result<T, ResumeError>;
