//! Configuration types for Reshard
//!
//! This module defines configuration structures used across components.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Root configuration for a resharding run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cluster configuration
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Reshuffle operator configuration
    #[serde(default)]
    pub reshuffle: ReshuffleConfig,
}

impl Config {
    /// Validate segment counts and the local segment index
    pub fn validate(&self) -> Result<()> {
        let old = self.reshuffle.old_segments;
        let new = self.cluster.segment_count;
        if old == 0 || new <= old {
            return Err(Error::InvalidSegmentCounts { old, new });
        }
        if self.cluster.self_segment >= new {
            return Err(Error::SegmentOutOfCluster {
                segment: self.cluster.self_segment,
                count: new,
            });
        }
        Ok(())
    }
}

/// Cluster topology as reported by the cluster
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Total number of segments after expansion
    #[serde(default = "default_segment_count")]
    pub segment_count: u32,
    /// Index of the local segment
    #[serde(default)]
    pub self_segment: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            segment_count: default_segment_count(),
            self_segment: 0,
        }
    }
}

/// Reshuffle operator configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReshuffleConfig {
    /// Number of segments the table lives on before expansion
    #[serde(default = "default_old_segments")]
    pub old_segments: u32,
    /// Recompute the old hash of every delete row and fail on mismatch
    #[serde(default = "default_verify_deletes")]
    pub verify_deletes: bool,
    /// Seed for random distribution; OS entropy when unset
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for ReshuffleConfig {
    fn default() -> Self {
        Self {
            old_segments: default_old_segments(),
            verify_deletes: default_verify_deletes(),
            random_seed: None,
        }
    }
}

impl ReshuffleConfig {
    /// Configuration for a table currently spread over `old_segments`
    #[must_use]
    pub fn with_old_segments(old_segments: u32) -> Self {
        Self {
            old_segments,
            ..Self::default()
        }
    }

    /// Derive the random seed for one segment
    ///
    /// Segments must not share a random sequence, otherwise every old segment
    /// would ship its rows to the same new segments in lockstep.
    #[must_use]
    pub fn segment_seed(&self, segment: u32) -> Option<u64> {
        self.random_seed
            .map(|seed| seed ^ u64::from(segment).wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}

const fn default_segment_count() -> u32 {
    2
}

const fn default_old_segments() -> u32 {
    1
}

const fn default_verify_deletes() -> bool {
    cfg!(debug_assertions)
}
