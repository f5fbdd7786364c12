//! Error types for Reshard
//!
//! This module defines the common error types used throughout the system.

use crate::types::SegmentId;
use thiserror::Error;

/// Common result type for Reshard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Reshard
#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("invalid segment counts: old {old}, new {new} (need new > old >= 1)")]
    InvalidSegmentCounts { old: u32, new: u32 },

    #[error("segment {segment} is outside a cluster of {count} segments")]
    SegmentOutOfCluster { segment: u32, count: u32 },

    #[error("hash distribution requires at least one key column")]
    EmptyDistributionKey,

    #[error("configuration error: {0}")]
    Configuration(String),

    // Resource errors
    #[error("cannot bind hash context to {segments} segments")]
    HashBind { segments: u32 },

    // Consistency errors
    #[error(
        "delete row lives on segment {current} but hashes to segment {computed} under {old_segments} segments"
    )]
    DeleteSegmentMismatch {
        current: SegmentId,
        computed: SegmentId,
        old_segments: u32,
    },

    #[error("destination segment {segment} out of range for {count} segments")]
    DestinationOutOfRange { segment: SegmentId, count: u32 },

    #[error("no matching row to delete on segment {segment}")]
    RowNotFound { segment: SegmentId },

    // Row shape errors
    #[error("row has no column {column} (row width {width})")]
    MissingColumn { column: usize, width: usize },

    // Stream and lifecycle errors
    #[error("upstream operator does not support rescan")]
    RescanUnsupported,

    #[error("operator cancelled")]
    Cancelled,

    #[error("upstream error: {0}")]
    Upstream(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an upstream error
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Check if this error was raised while validating setup parameters
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidSegmentCounts { .. }
                | Self::SegmentOutOfCluster { .. }
                | Self::EmptyDistributionKey
                | Self::Configuration(_)
        )
    }

    /// Check if this error signals a routing invariant violation
    #[must_use]
    pub const fn is_consistency(&self) -> bool {
        matches!(
            self,
            Self::DeleteSegmentMismatch { .. }
                | Self::DestinationOutOfRange { .. }
                | Self::RowNotFound { .. }
        )
    }

    /// Check if this is a retryable error
    ///
    /// Resharding never retries rows on its own; the enclosing statement owns
    /// the retry policy.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }
}
