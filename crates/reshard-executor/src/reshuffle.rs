//! Reshuffle operator
//!
//! Stamps the destination segment on every row coming out of a split update
//! while a table is spread from `O` onto `N` segments. Each old segment runs
//! its own instance; the instances never talk to each other, so every
//! decision is a pure function of the row, the segment counts and the local
//! segment index.
//!
//! # Routing
//!
//! | policy     | insert row                          | delete row                      |
//! |------------|-------------------------------------|---------------------------------|
//! | hash       | `hash(key, N)`                      | unchanged, optionally verified  |
//! |            |                                     | against `hash(key, O)`          |
//! | random     | `O + uniform(0, N - O)`             | unchanged                       |
//! | replicated | next entries of the destination list| dropped                         |
//!
//! A replicated table is identical on every old segment, so nothing is ever
//! deleted. Old segment `s` seeds new segments `s + O`, `s + 2·O`, ... and
//! copies each insert row to every one of them: the row is held in a
//! one-row lookahead while the destination cursor walks the list, and the
//! next row is pulled once the cursor wraps.
//!
//! Segments at index `O` or above hold no pre-expansion data and end their
//! stream on the first call without pulling from upstream.

use crate::source::RowSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reshard_common::{
    DistributionPolicy, DmlAction, Error, ReshuffleConfig, Result, SegmentId, TaggedRow,
};
use reshard_placement::{ClusterTopology, DestinationList, SegmentHash};
use serde::Serialize;
use tracing::{debug, error, info};

/// Lifecycle of a reshuffle operator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    /// Set up, no row requested yet
    Ready,
    /// Serving rows
    Running,
    /// Upstream exhausted or a fault occurred; contexts released
    Ended,
    /// Cancelled by the consumer; contexts released
    Cancelled,
}

/// Per-operator row counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReshuffleStats {
    /// Rows pulled from upstream
    pub rows_in: u64,
    /// Rows handed to the consumer
    pub rows_out: u64,
    /// Insert rows given a new destination
    pub inserts_routed: u64,
    /// Delete rows passed through
    pub deletes_passed: u64,
    /// Delete rows discarded (replicated tables)
    pub deletes_dropped: u64,
}

/// Reshuffle operator over an upstream row source
#[derive(Debug)]
pub struct Reshuffle<S> {
    child: S,
    topology: ClusterTopology,
    policy: DistributionPolicy,
    verify_deletes: bool,
    /// Bound to N
    hash: Option<SegmentHash>,
    /// Bound to O, only when deletes are verified
    old_hash: Option<SegmentHash>,
    rng: StdRng,
    destinations: DestinationList,
    cursor: usize,
    lookahead: Option<TaggedRow>,
    state: LifecycleState,
    stats: ReshuffleStats,
}

impl<S: RowSource> Reshuffle<S> {
    /// Set up the operator
    ///
    /// Fails on an invalid policy, on a configuration whose old segment count
    /// disagrees with `topology`, or when a hash context cannot be bound.
    pub fn new(
        child: S,
        topology: ClusterTopology,
        policy: DistributionPolicy,
        config: &ReshuffleConfig,
    ) -> Result<Self> {
        policy.validate()?;
        if config.old_segments != topology.old_segments() {
            return Err(Error::configuration(format!(
                "operator configured for {} old segments but topology has {}",
                config.old_segments,
                topology.old_segments()
            )));
        }

        let (hash, old_hash) = bind_contexts(&topology, config.verify_deletes)?;
        let destinations = match policy {
            DistributionPolicy::Replicated => DestinationList::compute(&topology),
            DistributionPolicy::Hash { .. } | DistributionPolicy::Random => {
                DestinationList::default()
            }
        };
        let rng = config
            .segment_seed(topology.self_segment().get())
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        info!(
            segment = %topology.self_segment(),
            old_segments = topology.old_segments(),
            new_segments = topology.new_segments(),
            policy = %policy,
            destinations = ?destinations.as_slice(),
            verify_deletes = config.verify_deletes,
            "reshuffle ready"
        );

        Ok(Self {
            child,
            topology,
            policy,
            verify_deletes: config.verify_deletes,
            hash,
            old_hash,
            rng,
            destinations,
            cursor: 0,
            lookahead: None,
            state: LifecycleState::Ready,
            stats: ReshuffleStats::default(),
        })
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Row counters since setup or the last rescan
    #[must_use]
    pub const fn stats(&self) -> ReshuffleStats {
        self.stats
    }

    /// New segments this segment seeds (replicated tables only)
    #[must_use]
    pub const fn destinations(&self) -> &DestinationList {
        &self.destinations
    }

    /// Whether hash contexts are still held
    #[must_use]
    pub const fn has_hash_context(&self) -> bool {
        self.hash.is_some()
    }

    /// Whether deletes are checked against the old hash
    #[must_use]
    pub const fn verifies_deletes(&self) -> bool {
        self.old_hash.is_some()
    }

    /// Upstream source
    pub const fn child(&self) -> &S {
        &self.child
    }

    /// Tear down: release contexts and stop serving rows
    pub fn end(&mut self) {
        self.finish();
    }

    /// Abort: release contexts and refuse further pulls
    pub fn cancel(&mut self) {
        self.release();
        self.state = LifecycleState::Cancelled;
        debug!(segment = %self.topology.self_segment(), "reshuffle cancelled");
    }

    fn release(&mut self) {
        self.hash = None;
        self.old_hash = None;
        self.lookahead = None;
    }

    fn finish(&mut self) {
        if self.state != LifecycleState::Ended {
            debug!(
                segment = %self.topology.self_segment(),
                rows_in = self.stats.rows_in,
                rows_out = self.stats.rows_out,
                deletes_dropped = self.stats.deletes_dropped,
                "reshuffle finished"
            );
        }
        self.release();
        self.state = LifecycleState::Ended;
    }

    /// Hash and random tables: one output row per input row
    fn next_partitioned(&mut self) -> Result<Option<TaggedRow>> {
        let Some(mut row) = self.child.next_row()? else {
            return Ok(None);
        };
        self.stats.rows_in += 1;

        match row.action {
            DmlAction::Insert => {
                let destination = self.route_insert(&row)?;
                self.check_destination(destination)?;
                row.segment = destination;
                self.stats.inserts_routed += 1;
            }
            DmlAction::Delete => {
                if self.verify_deletes {
                    self.verify_delete(&row)?;
                }
                self.stats.deletes_passed += 1;
            }
        }

        Ok(Some(row))
    }

    fn route_insert(&mut self, row: &TaggedRow) -> Result<SegmentId> {
        match &self.policy {
            DistributionPolicy::Hash { key_columns } => {
                let hash = self
                    .hash
                    .as_mut()
                    .ok_or_else(|| Error::internal("hash context released"))?;
                hash.hash_key(&row.values, key_columns)
            }
            DistributionPolicy::Random => {
                Ok(SegmentId::new(self.rng.gen_range(self.topology.added_segments())))
            }
            DistributionPolicy::Replicated => Err(Error::internal(
                "replicated rows are routed through the destination list",
            )),
        }
    }

    fn check_destination(&self, destination: SegmentId) -> Result<()> {
        debug_assert!(
            self.topology.contains(destination),
            "destination {destination} outside {} segments",
            self.topology.new_segments()
        );
        if self.topology.contains(destination) {
            return Ok(());
        }
        error!(
            segment = %self.topology.self_segment(),
            %destination,
            new_segments = self.topology.new_segments(),
            "destination out of range"
        );
        Err(Error::DestinationOutOfRange {
            segment: destination,
            count: self.topology.new_segments(),
        })
    }

    fn verify_delete(&mut self, row: &TaggedRow) -> Result<()> {
        self.check_destination(row.segment)?;

        let (DistributionPolicy::Hash { key_columns }, Some(old_hash)) =
            (&self.policy, self.old_hash.as_mut())
        else {
            return Ok(());
        };

        let computed = old_hash.hash_key(&row.values, key_columns)?;
        if computed != row.segment {
            error!(
                segment = %self.topology.self_segment(),
                current = %row.segment,
                %computed,
                "delete row does not hash to its segment"
            );
            return Err(Error::DeleteSegmentMismatch {
                current: row.segment,
                computed,
                old_segments: self.topology.old_segments(),
            });
        }
        Ok(())
    }

    /// Replicated tables: drop deletes, copy inserts to every destination
    fn next_replicated(&mut self) -> Result<Option<TaggedRow>> {
        if self.destinations.is_empty() {
            return Ok(None);
        }

        let row = loop {
            if let Some(row) = self.lookahead.take() {
                break row;
            }
            let Some(row) = self.child.next_row()? else {
                return Ok(None);
            };
            self.stats.rows_in += 1;
            if row.action == DmlAction::Delete {
                self.stats.deletes_dropped += 1;
                continue;
            }
            break row;
        };

        let destination = self
            .destinations
            .get(self.cursor)
            .ok_or_else(|| Error::internal("destination cursor out of range"))?;
        self.cursor = (self.cursor + 1) % self.destinations.len();

        // Keep the row for the remaining destinations until the cursor wraps
        let mut out = if self.cursor == 0 {
            row
        } else {
            let copy = row.clone();
            self.lookahead = Some(row);
            copy
        };
        out.segment = destination;
        self.stats.inserts_routed += 1;
        Ok(Some(out))
    }
}

impl<S: RowSource> RowSource for Reshuffle<S> {
    fn next_row(&mut self) -> Result<Option<TaggedRow>> {
        match self.state {
            LifecycleState::Ended => return Ok(None),
            LifecycleState::Cancelled => return Err(Error::Cancelled),
            LifecycleState::Ready => self.state = LifecycleState::Running,
            LifecycleState::Running => {}
        }

        if !self.topology.is_source() {
            debug!(
                segment = %self.topology.self_segment(),
                old_segments = self.topology.old_segments(),
                "segment holds no pre-expansion data"
            );
            self.finish();
            return Ok(None);
        }

        let routed = match self.policy {
            DistributionPolicy::Replicated => self.next_replicated(),
            DistributionPolicy::Hash { .. } | DistributionPolicy::Random => {
                self.next_partitioned()
            }
        };

        match routed {
            Ok(Some(row)) => {
                self.stats.rows_out += 1;
                Ok(Some(row))
            }
            Ok(None) => {
                self.finish();
                Ok(None)
            }
            Err(e) => {
                self.finish();
                Err(e)
            }
        }
    }

    fn can_rescan(&self) -> bool {
        self.child.can_rescan()
    }

    fn rescan(&mut self) -> Result<()> {
        if self.state == LifecycleState::Cancelled {
            return Err(Error::Cancelled);
        }
        if !self.child.can_rescan() {
            return Err(Error::RescanUnsupported);
        }
        self.child.rescan()?;

        if self.hash.is_none() {
            let (hash, old_hash) = bind_contexts(&self.topology, self.verify_deletes)?;
            self.hash = hash;
            self.old_hash = old_hash;
        }
        self.cursor = 0;
        self.lookahead = None;
        self.stats = ReshuffleStats::default();
        self.state = LifecycleState::Ready;

        debug!(segment = %self.topology.self_segment(), "reshuffle rescanned");
        Ok(())
    }
}

impl<S: RowSource> Iterator for Reshuffle<S> {
    type Item = Result<TaggedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

fn bind_contexts(
    topology: &ClusterTopology,
    verify_deletes: bool,
) -> Result<(Option<SegmentHash>, Option<SegmentHash>)> {
    let hash = SegmentHash::bind(topology.new_segments())?;
    let old_hash = if verify_deletes {
        Some(SegmentHash::bind(topology.old_segments())?)
    } else {
        None
    };
    Ok((Some(hash), old_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VecSource;
    use reshard_common::{Datum, Row};
    use std::collections::HashMap;

    const OLD: u32 = 3;
    const NEW: u32 = 7;

    fn topology(segment: u32) -> ClusterTopology {
        ClusterTopology::new(OLD, NEW, SegmentId::new(segment)).unwrap()
    }

    fn config(verify_deletes: bool) -> ReshuffleConfig {
        ReshuffleConfig {
            old_segments: OLD,
            verify_deletes,
            random_seed: Some(42),
        }
    }

    fn hash_of(values: &[Datum], segments: u32) -> SegmentId {
        SegmentHash::bind(segments)
            .unwrap()
            .hash_key(values, &[0])
            .unwrap()
    }

    /// Delete/insert pairs for rows that live on `segment` and must move
    fn moving_pairs(segment: u32, count: usize) -> Vec<TaggedRow> {
        let segment = SegmentId::new(segment);
        (0_i64..)
            .map(|v| vec![Datum::Int(v), Datum::from(format!("row-{v}"))])
            .filter(|row| hash_of(row, OLD) == segment && hash_of(row, NEW) != segment)
            .take(count)
            .flat_map(|row: Row| {
                [
                    TaggedRow::delete(row.clone(), segment),
                    TaggedRow::insert(row, segment),
                ]
            })
            .collect()
    }

    fn inserts(count: i64) -> Vec<TaggedRow> {
        (0..count)
            .map(|v| TaggedRow::insert(vec![Datum::Int(v)], SegmentId::new(0)))
            .collect()
    }

    struct FailingSource {
        remaining: usize,
    }

    impl RowSource for FailingSource {
        fn next_row(&mut self) -> Result<Option<TaggedRow>> {
            if self.remaining == 0 {
                return Err(Error::upstream("scan failed"));
            }
            self.remaining -= 1;
            Ok(Some(TaggedRow::insert(vec![Datum::Int(1)], SegmentId::new(0))))
        }
    }

    #[test]
    fn test_hash_routing() {
        for segment in 0..OLD {
            let input = moving_pairs(segment, 200);
            let node = Reshuffle::new(
                VecSource::new(input.clone()),
                topology(segment),
                DistributionPolicy::hash([0]),
                &config(true),
            )
            .unwrap();
            assert!(node.verifies_deletes());

            let output: Vec<TaggedRow> = node.collect::<Result<_>>().unwrap();
            assert_eq!(output.len(), input.len());

            for (before, after) in input.iter().zip(&output) {
                assert_eq!(before.values, after.values);
                assert_eq!(before.action, after.action);
                match after.action {
                    DmlAction::Delete => {
                        assert_eq!(after.segment, SegmentId::new(segment));
                        assert_eq!(hash_of(&after.values, OLD), after.segment);
                    }
                    DmlAction::Insert => {
                        assert_eq!(after.segment, hash_of(&after.values, NEW));
                        assert!(after.segment.get() >= OLD);
                    }
                }
            }
        }
    }

    #[test]
    fn test_hash_delete_mismatch_is_fatal() {
        let row = vec![Datum::Int(5)];
        let home = hash_of(&row, OLD);
        let wrong = SegmentId::new((home.get() + 1) % OLD);
        let input = vec![
            TaggedRow::delete(row.clone(), wrong),
            TaggedRow::insert(row, wrong),
        ];

        let mut node = Reshuffle::new(
            VecSource::new(input),
            topology(0),
            DistributionPolicy::hash([0]),
            &config(true),
        )
        .unwrap();

        let err = node.next_row().unwrap_err();
        assert!(err.is_consistency());
        assert!(matches!(
            err,
            Error::DeleteSegmentMismatch { current, computed, old_segments: OLD }
                if current == wrong && computed == home
        ));
        assert_eq!(node.state(), LifecycleState::Ended);
        assert!(!node.has_hash_context());
        assert!(node.next_row().unwrap().is_none());
    }

    #[test]
    fn test_hash_delete_unverified_passes_through() {
        let row = vec![Datum::Int(5)];
        let wrong = SegmentId::new((hash_of(&row, OLD).get() + 1) % OLD);
        let mut node = Reshuffle::new(
            VecSource::new(vec![TaggedRow::delete(row, wrong)]),
            topology(0),
            DistributionPolicy::hash([0]),
            &config(false),
        )
        .unwrap();
        assert!(!node.verifies_deletes());

        let out = node.next_row().unwrap().unwrap();
        assert_eq!(out.segment, wrong);
        assert_eq!(node.stats().deletes_passed, 1);
    }

    fn random_node() -> Reshuffle<VecSource> {
        Reshuffle::new(
            VecSource::new(Vec::new()),
            topology(0),
            DistributionPolicy::Random,
            &config(true),
        )
        .unwrap()
    }

    #[test]
    fn test_destination_in_range() {
        let node = random_node();
        assert!(node.check_destination(SegmentId::new(0)).is_ok());
        assert!(node.check_destination(SegmentId::new(NEW - 1)).is_ok());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside 7 segments")]
    fn test_destination_out_of_range_asserts() {
        let _ = random_node().check_destination(SegmentId::new(NEW));
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_destination_out_of_range_is_fatal() {
        let node = random_node();
        let err = node.check_destination(SegmentId::new(NEW)).unwrap_err();
        assert!(matches!(
            err,
            Error::DestinationOutOfRange { segment, count: NEW } if segment == SegmentId::new(NEW)
        ));
        assert!(err.is_consistency());

        // A verified delete tagged outside the cluster ends the stream
        let mut node = Reshuffle::new(
            VecSource::new(vec![TaggedRow::delete(vec![Datum::Int(1)], SegmentId::new(NEW))]),
            topology(0),
            DistributionPolicy::Random,
            &config(true),
        )
        .unwrap();
        assert!(matches!(
            node.next_row(),
            Err(Error::DestinationOutOfRange { count: NEW, .. })
        ));
        assert_eq!(node.state(), LifecycleState::Ended);
    }

    #[test]
    fn test_hash_missing_key_column() {
        let input = vec![TaggedRow::insert(vec![Datum::Int(1)], SegmentId::new(0))];
        let mut node = Reshuffle::new(
            VecSource::new(input),
            topology(0),
            DistributionPolicy::hash([2]),
            &config(false),
        )
        .unwrap();
        assert!(matches!(
            node.next_row(),
            Err(Error::MissingColumn { column: 2, width: 1 })
        ));
    }

    #[test]
    fn test_random_routing_targets_only_new_segments() {
        let node = Reshuffle::new(
            VecSource::new(inserts(10_000)),
            topology(1),
            DistributionPolicy::Random,
            &config(false),
        )
        .unwrap();

        let mut counts: HashMap<u32, usize> = HashMap::new();
        for row in node {
            let row = row.unwrap();
            assert!(row.segment.get() >= OLD && row.segment.get() < NEW);
            *counts.entry(row.segment.get()).or_default() += 1;
        }

        assert_eq!(counts.len(), 4);
        // ~2500 per new segment
        for count in counts.values() {
            assert!(*count > 2300 && *count < 2700, "unbalanced: {counts:?}");
        }
    }

    #[test]
    fn test_random_deletes_pass_through() {
        let row = vec![Datum::Int(9)];
        let input = vec![
            TaggedRow::delete(row.clone(), SegmentId::new(2)),
            TaggedRow::insert(row, SegmentId::new(2)),
        ];
        let output: Vec<TaggedRow> = Reshuffle::new(
            VecSource::new(input),
            topology(2),
            DistributionPolicy::Random,
            &config(true),
        )
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();

        assert_eq!(output[0].action, DmlAction::Delete);
        assert_eq!(output[0].segment, SegmentId::new(2));
        assert_eq!(output[1].action, DmlAction::Insert);
        assert!(output[1].segment.get() >= OLD);
    }

    #[test]
    fn test_random_seed_is_reproducible() {
        let run = || -> Vec<SegmentId> {
            Reshuffle::new(
                VecSource::new(inserts(100)),
                topology(0),
                DistributionPolicy::Random,
                &config(false),
            )
            .unwrap()
            .map(|r| r.unwrap().segment)
            .collect()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_replicated_round_robin() {
        let mut node = Reshuffle::new(
            VecSource::new(inserts(3)),
            topology(0),
            DistributionPolicy::Replicated,
            &config(true),
        )
        .unwrap();
        assert_eq!(
            node.destinations().as_slice(),
            &[SegmentId::new(3), SegmentId::new(6)]
        );

        let output: Vec<TaggedRow> = node.by_ref().collect::<Result<_>>().unwrap();
        let destinations: Vec<u32> = output.iter().map(|r| r.segment.get()).collect();
        assert_eq!(&destinations[..3], &[3, 6, 3]);

        // Every row reaches every destination
        assert_eq!(destinations, vec![3, 6, 3, 6, 3, 6]);
        for pair in output.chunks(2) {
            assert_eq!(pair[0].values, pair[1].values);
        }
        assert_eq!(node.stats().rows_in, 3);
        assert_eq!(node.stats().rows_out, 6);
        assert_eq!(node.state(), LifecycleState::Ended);
    }

    #[test]
    fn test_replicated_single_destination() {
        let output: Vec<u32> = Reshuffle::new(
            VecSource::new(inserts(3)),
            topology(1),
            DistributionPolicy::Replicated,
            &config(true),
        )
        .unwrap()
        .map(|r| r.unwrap().segment.get())
        .collect();
        assert_eq!(output, vec![4, 4, 4]);
    }

    #[test]
    fn test_replicated_drops_deletes() {
        let input: Vec<TaggedRow> = (0..10)
            .map(|v| TaggedRow::delete(vec![Datum::Int(v)], SegmentId::new(0)))
            .collect();
        let mut node = Reshuffle::new(
            VecSource::new(input),
            topology(0),
            DistributionPolicy::Replicated,
            &config(true),
        )
        .unwrap();

        assert!(node.next_row().unwrap().is_none());
        assert_eq!(node.stats().deletes_dropped, 10);
        assert_eq!(node.stats().rows_out, 0);
    }

    #[test]
    fn test_replicated_skips_deletes_between_inserts() {
        let input = vec![
            TaggedRow::delete(vec![Datum::Int(1)], SegmentId::new(2)),
            TaggedRow::insert(vec![Datum::Int(1)], SegmentId::new(2)),
            TaggedRow::delete(vec![Datum::Int(2)], SegmentId::new(2)),
            TaggedRow::insert(vec![Datum::Int(2)], SegmentId::new(2)),
        ];
        let output: Vec<TaggedRow> = Reshuffle::new(
            VecSource::new(input),
            topology(2),
            DistributionPolicy::Replicated,
            &config(true),
        )
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();

        assert_eq!(output.len(), 2);
        assert!(output.iter().all(TaggedRow::is_insert));
        assert!(output.iter().all(|r| r.segment == SegmentId::new(5)));
        assert_eq!(output[0].values, vec![Datum::Int(1)]);
        assert_eq!(output[1].values, vec![Datum::Int(2)]);
    }

    #[test]
    fn test_replicated_empty_destination_list() {
        // O = 4, N = 6: segment 2 seeds nothing
        let topology = ClusterTopology::new(4, 6, SegmentId::new(2)).unwrap();
        let mut node = Reshuffle::new(
            VecSource::new(inserts(5)),
            topology,
            DistributionPolicy::Replicated,
            &ReshuffleConfig::with_old_segments(4),
        )
        .unwrap();

        assert!(node.destinations().is_empty());
        assert!(node.next_row().unwrap().is_none());
        assert_eq!(node.child().remaining(), 5);
        assert_eq!(node.state(), LifecycleState::Ended);
    }

    #[test]
    fn test_new_segments_produce_nothing() {
        for policy in [
            DistributionPolicy::hash([0]),
            DistributionPolicy::Random,
            DistributionPolicy::Replicated,
        ] {
            for segment in OLD..NEW {
                let mut node = Reshuffle::new(
                    VecSource::new(inserts(4)),
                    topology(segment),
                    policy.clone(),
                    &config(true),
                )
                .unwrap();
                assert!(node.next_row().unwrap().is_none());
                assert_eq!(node.child().remaining(), 4);
                assert_eq!(node.stats().rows_in, 0);
            }
        }
    }

    #[test]
    fn test_lifecycle() {
        let mut node = Reshuffle::new(
            VecSource::new(inserts(1)),
            topology(0),
            DistributionPolicy::hash([0]),
            &config(true),
        )
        .unwrap();
        assert_eq!(node.state(), LifecycleState::Ready);
        assert!(node.has_hash_context());

        assert!(node.next_row().unwrap().is_some());
        assert_eq!(node.state(), LifecycleState::Running);

        assert!(node.next_row().unwrap().is_none());
        assert_eq!(node.state(), LifecycleState::Ended);
        assert!(!node.has_hash_context());
        assert!(!node.verifies_deletes());

        // Ended stays ended
        assert!(node.next_row().unwrap().is_none());
    }

    #[test]
    fn test_rescan_restarts_fan_out() {
        let mut node = Reshuffle::new(
            VecSource::new(inserts(2)),
            topology(0),
            DistributionPolicy::Replicated,
            &config(false),
        )
        .unwrap();
        let destinations = node.destinations().clone();

        let first = node.next_row().unwrap().unwrap();
        assert_eq!(first.segment, SegmentId::new(3));

        node.rescan().unwrap();
        assert_eq!(node.state(), LifecycleState::Ready);
        assert_eq!(node.destinations(), &destinations);

        let output: Vec<TaggedRow> = node.by_ref().collect::<Result<_>>().unwrap();
        let segments: Vec<u32> = output.iter().map(|r| r.segment.get()).collect();
        assert_eq!(segments, vec![3, 6, 3, 6]);
        assert_eq!(output[0].values, vec![Datum::Int(0)]);

        // Rescanning after the end binds fresh contexts
        assert!(!node.has_hash_context());
        node.rescan().unwrap();
        assert!(node.has_hash_context());
        assert_eq!(node.count(), 4);
    }

    #[test]
    fn test_rescan_requires_rescannable_child() {
        let mut node = Reshuffle::new(
            VecSource::once(inserts(2)),
            topology(0),
            DistributionPolicy::hash([0]),
            &config(false),
        )
        .unwrap();
        assert!(!node.can_rescan());
        assert!(matches!(node.rescan(), Err(Error::RescanUnsupported)));
    }

    #[test]
    fn test_cancel_releases_contexts() {
        let mut node = Reshuffle::new(
            VecSource::new(inserts(3)),
            topology(0),
            DistributionPolicy::hash([0]),
            &config(true),
        )
        .unwrap();
        assert!(node.next_row().unwrap().is_some());

        node.cancel();
        assert_eq!(node.state(), LifecycleState::Cancelled);
        assert!(!node.has_hash_context());
        assert!(matches!(node.next_row(), Err(Error::Cancelled)));
        assert!(matches!(node.rescan(), Err(Error::Cancelled)));
        assert_eq!(node.child().remaining(), 2);
    }

    #[test]
    fn test_end_releases_contexts() {
        let mut node = Reshuffle::new(
            VecSource::new(inserts(3)),
            topology(0),
            DistributionPolicy::Random,
            &config(true),
        )
        .unwrap();
        node.end();
        assert_eq!(node.state(), LifecycleState::Ended);
        assert!(!node.has_hash_context());
        assert!(node.next_row().unwrap().is_none());
    }

    #[test]
    fn test_upstream_error_propagates() {
        let mut node = Reshuffle::new(
            FailingSource { remaining: 1 },
            topology(0),
            DistributionPolicy::Random,
            &config(false),
        )
        .unwrap();
        assert!(node.next_row().unwrap().is_some());
        assert!(matches!(node.next_row(), Err(Error::Upstream(msg)) if msg == "scan failed"));
        assert_eq!(node.state(), LifecycleState::Ended);
    }

    #[test]
    fn test_setup_faults() {
        assert!(matches!(
            Reshuffle::new(
                VecSource::default(),
                topology(0),
                DistributionPolicy::hash(Vec::new()),
                &config(true),
            ),
            Err(Error::EmptyDistributionKey)
        ));

        let err = Reshuffle::new(
            VecSource::default(),
            topology(0),
            DistributionPolicy::Random,
            &ReshuffleConfig::with_old_segments(2),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_setup_is_idempotent() {
        let build = || {
            Reshuffle::new(
                VecSource::default(),
                topology(0),
                DistributionPolicy::Replicated,
                &config(true),
            )
            .unwrap()
        };
        assert_eq!(build().destinations(), build().destinations());
    }
}
