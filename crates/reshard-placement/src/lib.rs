//! Reshard Placement - segment placement primitives
//!
//! This crate implements the deterministic pieces of resharding that every
//! segment computes on its own, without talking to its peers:
//!
//! - **Segment hash**: folds key column values into one state and reduces it
//!   to a segment with jump consistent hashing, so growing a cluster only
//!   moves keys onto the new segments.
//! - **Cluster topology**: old and new segment counts plus the local index.
//! - **Destination lists**: which new segments an old segment seeds when a
//!   replicated table is expanded.
//! - **Reshuffle filter**: the scan-side test that decides whether a stored
//!   row has to move at all.
//!
//! # Example
//! ```
//! use reshard_common::Datum;
//! use reshard_placement::SegmentHash;
//!
//! let mut hash = SegmentHash::bind(7).unwrap();
//! let segment = hash.hash_key(&[Datum::Int(42)], &[0]).unwrap();
//! assert!(segment.get() < 7);
//! ```

pub mod destinations;
pub mod filter;
pub mod hash;
pub mod topology;

pub use destinations::DestinationList;
pub use filter::ReshuffleFilter;
pub use hash::{SegmentHash, jump_consistent_hash};
pub use topology::ClusterTopology;
