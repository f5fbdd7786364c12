//! Reshard Executor - resharding pipeline operators
//!
//! Every segment that held data before the cluster grew runs the same
//! pull-based pipeline, independently of its peers:
//!
//! ```text
//! ExplicitMotion          ships each row to the segment it names
//!   -> Reshuffle          stamps the destination segment (this crate's core)
//!     -> SplitUpdate      turns a row into a delete/insert pair
//!       -> SegmentScan    yields stored rows accepted by the reshuffle filter
//! ```
//!
//! # Example
//! ```
//! use reshard_common::{Datum, DistributionPolicy, ReshuffleConfig, SegmentId, TaggedRow};
//! use reshard_executor::{Reshuffle, RowSource, VecSource};
//! use reshard_placement::ClusterTopology;
//!
//! let topology = ClusterTopology::new(3, 7, SegmentId::new(0)).unwrap();
//! let rows = VecSource::new(vec![TaggedRow::insert(vec![Datum::Int(1)], SegmentId::new(0))]);
//! let mut node = Reshuffle::new(
//!     rows,
//!     topology,
//!     DistributionPolicy::Replicated,
//!     &ReshuffleConfig::with_old_segments(3),
//! )
//! .unwrap();
//! let row = node.next_row().unwrap().unwrap();
//! assert_eq!(row.segment, SegmentId::new(3));
//! ```

pub mod cluster;
pub mod motion;
pub mod reshuffle;
pub mod scan;
pub mod source;
pub mod split_update;

pub use cluster::{ReshuffleOutcome, SegmentReport, TableLayout, reshuffle_segment, reshuffle_table};
pub use motion::ExplicitMotion;
pub use reshuffle::{LifecycleState, Reshuffle, ReshuffleStats};
pub use scan::{SegmentScan, TupleSource};
pub use source::{RowSource, VecSource};
pub use split_update::SplitUpdate;
