//! Whole-table resharding across every segment of a cluster
//!
//! Each segment gets its own pipeline and its own outboxes; nothing is shared
//! between segments until the outboxes are merged and applied.

use crate::motion::ExplicitMotion;
use crate::reshuffle::{Reshuffle, ReshuffleStats};
use crate::scan::SegmentScan;
use crate::split_update::SplitUpdate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reshard_common::{
    DistributionPolicy, DmlAction, Error, ReshuffleConfig, Result, Row, SegmentId, same_row,
};
use reshard_placement::{ClusterTopology, ReshuffleFilter, SegmentHash};
use serde::Serialize;
use tracing::info;

/// Rows of one table, per segment
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TableLayout {
    segments: Vec<Vec<Row>>,
}

impl TableLayout {
    /// Empty table over `segments` segments
    #[must_use]
    pub fn new(segments: u32) -> Self {
        Self {
            segments: vec![Vec::new(); segments as usize],
        }
    }

    /// Place rows on `segments` segments the way `policy` would
    pub fn distribute(
        rows: impl IntoIterator<Item = Row>,
        policy: &DistributionPolicy,
        segments: u32,
        seed: Option<u64>,
    ) -> Result<Self> {
        policy.validate()?;
        let mut layout = Self::new(segments);
        let mut hash = SegmentHash::bind(segments)?;
        let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        for row in rows {
            match policy {
                DistributionPolicy::Hash { key_columns } => {
                    let segment = hash.hash_key(&row, key_columns)?;
                    layout.segments[segment.as_usize()].push(row);
                }
                DistributionPolicy::Random => {
                    let segment = rng.gen_range(0..layout.segments.len());
                    layout.segments[segment].push(row);
                }
                DistributionPolicy::Replicated => {
                    for segment in &mut layout.segments {
                        segment.push(row.clone());
                    }
                }
            }
        }
        Ok(layout)
    }

    /// Number of segments
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn segment_count(&self) -> u32 {
        self.segments.len() as u32
    }

    /// Rows stored on `segment`
    #[must_use]
    pub fn rows(&self, segment: SegmentId) -> &[Row] {
        self.segments
            .get(segment.as_usize())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Row count per segment
    #[must_use]
    pub fn row_counts(&self) -> Vec<usize> {
        self.segments.iter().map(Vec::len).collect()
    }

    /// Total stored rows, counting every replica
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    /// Add empty segments up to `segments`
    pub fn grow(&mut self, segments: u32) {
        if segments > self.segment_count() {
            self.segments.resize_with(segments as usize, Vec::new);
        }
    }

    /// Apply delivered rows: deletes first, then inserts
    pub fn apply(&mut self, motion: &ExplicitMotion) -> Result<()> {
        self.grow(motion.segments());

        for segment in (0..motion.segments()).map(SegmentId::new) {
            let stored = &mut self.segments[segment.as_usize()];
            for row in motion.outbox(segment) {
                if row.action == DmlAction::Delete {
                    let position = stored
                        .iter()
                        .position(|r| same_row(r, &row.values))
                        .ok_or(Error::RowNotFound { segment })?;
                    stored.swap_remove(position);
                }
            }
        }

        for segment in (0..motion.segments()).map(SegmentId::new) {
            let stored = &mut self.segments[segment.as_usize()];
            stored.extend(
                motion
                    .outbox(segment)
                    .iter()
                    .filter(|row| row.is_insert())
                    .map(|row| row.values.clone()),
            );
        }
        Ok(())
    }
}

/// What one segment's pipeline did
#[derive(Clone, Debug, Serialize)]
pub struct SegmentReport {
    /// Source segment
    pub segment: SegmentId,
    /// Rows read by the scan
    pub scanned: u64,
    /// Rows the reshuffle filter selected
    pub selected: u64,
    /// Reshuffle operator counters
    pub stats: ReshuffleStats,
    /// Rows handed to the motion
    pub shipped: u64,
}

/// Result of resharding a table
#[derive(Clone, Debug)]
pub struct ReshuffleOutcome {
    /// One report per segment of the expanded cluster
    pub reports: Vec<SegmentReport>,
    /// Rows to deliver, per destination segment
    pub motion: ExplicitMotion,
}

impl ReshuffleOutcome {
    /// Total rows shipped by all segments
    #[must_use]
    pub fn shipped(&self) -> u64 {
        self.reports.iter().map(|r| r.shipped).sum()
    }
}

/// Run the full pipeline of one segment
///
/// scan + reshuffle filter -> split update -> reshuffle -> explicit motion
pub fn reshuffle_segment(
    rows: Vec<Row>,
    topology: ClusterTopology,
    policy: &DistributionPolicy,
    config: &ReshuffleConfig,
) -> Result<(SegmentReport, ExplicitMotion)> {
    let segment = topology.self_segment();
    let filter_seed = config.segment_seed(segment.get()).map(|seed| !seed);
    let filter = ReshuffleFilter::new(topology, policy.clone(), filter_seed)?;
    let scan = SegmentScan::new(segment, rows).with_filter(filter);

    let mut node = Reshuffle::new(SplitUpdate::new(scan), topology, policy.clone(), config)?;
    let mut motion = ExplicitMotion::new(topology.new_segments());
    let shipped = motion.drain(&mut node)?;

    let scan = node.child().child();
    let report = SegmentReport {
        segment,
        scanned: scan.scanned(),
        selected: scan.accepted(),
        stats: node.stats(),
        shipped,
    };
    Ok((report, motion))
}

/// Reshard a table from its current segments onto `new_segments`
///
/// Segments run one after the other here; every segment's pipeline is
/// independent, so callers may run [`reshuffle_segment`] in parallel instead.
pub fn reshuffle_table(
    layout: &TableLayout,
    new_segments: u32,
    policy: &DistributionPolicy,
    config: &ReshuffleConfig,
) -> Result<ReshuffleOutcome> {
    if config.old_segments != layout.segment_count() {
        return Err(Error::configuration(format!(
            "table spans {} segments but operator is configured for {}",
            layout.segment_count(),
            config.old_segments
        )));
    }

    let cluster = ClusterTopology::new(layout.segment_count(), new_segments, SegmentId::new(0))?;
    let mut motion = ExplicitMotion::new(new_segments);
    let mut reports = Vec::with_capacity(new_segments as usize);

    for segment in cluster.segments() {
        let topology = cluster.for_segment(segment)?;
        let rows = layout.rows(segment).to_vec();
        let (report, outboxes) = reshuffle_segment(rows, topology, policy, config)?;
        motion.merge(outboxes)?;
        reports.push(report);
    }

    let outcome = ReshuffleOutcome { reports, motion };
    info!(
        policy = %policy,
        old_segments = cluster.old_segments(),
        new_segments,
        shipped = outcome.shipped(),
        "table reshuffled"
    );
    Ok(outcome)
}
