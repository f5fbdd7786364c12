//! Cluster topology representation

use reshard_common::{Config, Error, Result, SegmentId};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Segment counts before and after expansion, seen from one segment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTopology {
    old_segments: u32,
    new_segments: u32,
    self_segment: SegmentId,
}

impl ClusterTopology {
    /// Create a topology, rejecting anything but `new > old >= 1` and a
    /// local segment inside the expanded cluster
    pub fn new(old_segments: u32, new_segments: u32, self_segment: SegmentId) -> Result<Self> {
        if old_segments == 0 || new_segments <= old_segments {
            return Err(Error::InvalidSegmentCounts {
                old: old_segments,
                new: new_segments,
            });
        }
        if self_segment.get() >= new_segments {
            return Err(Error::SegmentOutOfCluster {
                segment: self_segment.get(),
                count: new_segments,
            });
        }
        Ok(Self {
            old_segments,
            new_segments,
            self_segment,
        })
    }

    /// Build the topology from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Self::new(
            config.reshuffle.old_segments,
            config.cluster.segment_count,
            SegmentId::new(config.cluster.self_segment),
        )
    }

    /// The same cluster seen from another segment
    pub fn for_segment(&self, segment: SegmentId) -> Result<Self> {
        Self::new(self.old_segments, self.new_segments, segment)
    }

    /// Segment count before expansion (O)
    #[must_use]
    pub const fn old_segments(&self) -> u32 {
        self.old_segments
    }

    /// Segment count after expansion (N)
    #[must_use]
    pub const fn new_segments(&self) -> u32 {
        self.new_segments
    }

    /// Local segment index
    #[must_use]
    pub const fn self_segment(&self) -> SegmentId {
        self.self_segment
    }

    /// Whether the local segment holds pre-expansion data
    #[must_use]
    pub const fn is_source(&self) -> bool {
        self.self_segment.get() < self.old_segments
    }

    /// Indices of the segments added by the expansion
    #[must_use]
    pub const fn added_segments(&self) -> Range<u32> {
        self.old_segments..self.new_segments
    }

    /// Whether `segment` exists after expansion
    #[must_use]
    pub const fn contains(&self, segment: SegmentId) -> bool {
        segment.get() < self.new_segments
    }

    /// Every segment after expansion
    pub fn segments(&self) -> impl Iterator<Item = SegmentId> {
        (0..self.new_segments).map(SegmentId::new)
    }
}
