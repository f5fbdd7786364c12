//! Scan-side reshuffle filter
//!
//! Decides on the source segment whether a stored row has to move. Only rows
//! accepted here are turned into delete/insert pairs, so a row whose
//! destination does not change is never shipped.

use crate::hash::SegmentHash;
use crate::topology::ClusterTopology;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reshard_common::{Datum, DistributionPolicy, Result};

/// Predicate selecting the rows a segment must reshuffle
#[derive(Debug)]
pub struct ReshuffleFilter {
    topology: ClusterTopology,
    policy: DistributionPolicy,
    hash: SegmentHash,
    rng: StdRng,
}

impl ReshuffleFilter {
    /// Create a filter for the local segment of `topology`
    pub fn new(
        topology: ClusterTopology,
        policy: DistributionPolicy,
        seed: Option<u64>,
    ) -> Result<Self> {
        policy.validate()?;
        let hash = SegmentHash::bind(topology.new_segments())?;
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Ok(Self {
            topology,
            policy,
            hash,
            rng,
        })
    }

    /// Whether a row stored on the local segment must move
    ///
    /// - hash: its key hashes somewhere else under the new segment count
    /// - random: a draw in `[0, N)` lands on an added segment, so each old
    ///   segment keeps `O/N` of its rows
    /// - replicated: always, every row is copied to the new segments
    pub fn needs_move(&mut self, values: &[Datum]) -> Result<bool> {
        if !self.topology.is_source() {
            return Ok(false);
        }

        match &self.policy {
            DistributionPolicy::Hash { key_columns } => {
                let target = self.hash.hash_key(values, key_columns)?;
                Ok(target != self.topology.self_segment())
            }
            DistributionPolicy::Random => {
                let draw = self.rng.gen_range(0..self.topology.new_segments());
                Ok(draw >= self.topology.old_segments())
            }
            DistributionPolicy::Replicated => Ok(true),
        }
    }
}
