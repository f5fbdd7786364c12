//! Destination lists for replicated tables
//!
//! Every old segment holds a full copy of a replicated table, so the new
//! segments can be seeded without any coordination: segment `s` copies its
//! data to `s + O`, `s + 2·O`, ... while that stays below `N`.
//!
//! ```text
//! O = 3, N = 7
//! seg0 -> [3, 6]
//! seg1 -> [4]
//! seg2 -> [5]
//! ```

use crate::topology::ClusterTopology;
use reshard_common::SegmentId;
use serde::{Deserialize, Serialize};

/// New segments one old segment is responsible for
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationList {
    segments: Vec<SegmentId>,
}

impl DestinationList {
    /// Compute the list for the local segment of `topology`
    #[must_use]
    pub fn compute(topology: &ClusterTopology) -> Self {
        if !topology.is_source() {
            return Self::default();
        }

        let step = topology.old_segments() as usize;
        let first = topology.self_segment().get() + topology.old_segments();
        let segments = (first..topology.new_segments())
            .step_by(step)
            .map(SegmentId::new)
            .collect();

        Self { segments }
    }

    /// Destination at `cursor`
    #[must_use]
    pub fn get(&self, cursor: usize) -> Option<SegmentId> {
        self.segments.get(cursor).copied()
    }

    /// Number of destinations
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether this segment seeds no new segment
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Destinations in round-robin order
    #[must_use]
    pub fn as_slice(&self) -> &[SegmentId] {
        &self.segments
    }
}
