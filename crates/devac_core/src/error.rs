//! Error types for devac_core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for devac_core operations.
#[derive(Error, Debug)]
pub enum DevacError {
    /// Package has never been analyzed (no seed partitions on disk).
    #[error("no seeds for package: {}", package.display())]
    NoSeeds {
        /// Package root the caller tried to read.
        package: PathBuf,
    },

    /// Lock acquisition exceeded its timeout while a fresh holder existed.
    #[error(
        "timed out after {waited_ms}ms waiting for lock at {} (held by pid {holder_pid} on {holder_host})",
        path.display()
    )]
    LockTimeout {
        /// Path to the contended lock marker.
        path: PathBuf,
        /// Process id recorded in the marker.
        holder_pid: u32,
        /// Hostname recorded in the marker.
        holder_host: String,
        /// Total time spent waiting, in milliseconds.
        waited_ms: u64,
    },

    /// Lock marker exists but cannot be read or parsed.
    #[error("unreadable lock marker at {}: {}", path.display(), reason)]
    StaleLock {
        /// Path to the suspect marker.
        path: PathBuf,
        /// What went wrong while inspecting it.
        reason: String,
    },

    /// A partition's columnar files failed to open, decode, or merge.
    #[error("corrupt partition at {}: {}", path.display(), reason)]
    PartitionCorrupt {
        /// Path to the offending file or partition directory.
        path: PathBuf,
        /// Description of the corruption.
        reason: String,
    },

    /// No entity with the given id exists in the merged view.
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// Malformed query or out-of-range query parameters.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Repository registration could not proceed.
    #[error("registration failed for {}: {}", path.display(), reason)]
    RegistrationFailed {
        /// Repository path the caller tried to register.
        path: PathBuf,
        /// Why registration failed.
        reason: String,
    },

    /// The hub database is locked by another process.
    #[error("hub store at {} is locked by another process", path.display())]
    HubLocked {
        /// Path to the hub database.
        path: PathBuf,
    },

    /// A parser record set failed ingest validation.
    #[error("invalid records for {file}: {reason}")]
    InvalidRecord {
        /// Source file the records came from.
        file: String,
        /// Description of the violation.
        reason: String,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error while encoding rows or markers.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error while decoding rows or markers.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Underlying database error (hub registry or merged SQL view).
    #[error("database error: {0}")]
    Database(String),

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    Config(String),
}

impl DevacError {
    /// Returns a user-facing recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NoSeeds { .. } => {
                Some("Run a full analysis first: 'devac ingest <package> --records <json>'.")
            }
            Self::LockTimeout { .. } => Some(
                "Another writer holds the partition. Wait for it to finish, or if its process \
                 is gone, remove the stale lock with 'devac unlock <package>'.",
            ),
            Self::StaleLock { .. } => {
                Some("The lock marker is damaged. Remove it with 'devac unlock <package>'.")
            }
            Self::PartitionCorrupt { .. } => {
                Some("Re-run a full analysis to rebuild the partition from parser output.")
            }
            Self::InvalidQuery(_) => {
                Some("Narrow the query to a single read-only SELECT and check its parameters.")
            }
            Self::HubLocked { .. } => {
                Some("Another process is writing the hub store. Retry once it finishes.")
            }
            Self::RegistrationFailed { .. } => Some(
                "Check that the path exists and contains at least one package manifest \
                 (package.json, Cargo.toml, pyproject.toml, go.mod).",
            ),
            _ => None,
        }
    }

    /// True when the error indicates writer contention rather than damage.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::HubLocked { .. })
    }
}

/// Convenience Result type for devac_core operations.
pub type Result<T> = std::result::Result<T, DevacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_suggestions_present_for_operator_errors() {
        let err = DevacError::NoSeeds {
            package: PathBuf::from("/tmp/pkg"),
        };
        assert!(err.recovery_suggestion().is_some());

        let err = DevacError::LockTimeout {
            path: PathBuf::from("/tmp/pkg/.devac.lock"),
            holder_pid: 42,
            holder_host: "build-1".to_string(),
            waited_ms: 30_000,
        };
        assert!(err.recovery_suggestion().unwrap().contains("unlock"));

        let err = DevacError::Serialization("oops".to_string());
        assert!(err.recovery_suggestion().is_none());
    }

    #[test]
    fn test_contention_classification() {
        assert!(DevacError::HubLocked {
            path: PathBuf::from("/tmp/hub.db")
        }
        .is_contention());
        assert!(!DevacError::EntityNotFound("x".to_string()).is_contention());
    }
}
