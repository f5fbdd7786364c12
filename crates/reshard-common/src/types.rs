//! Core type definitions for Reshard
//!
//! This module defines the fundamental types used throughout the system:
//! segment identifiers, column values, tagged rows and distribution policies.

use crate::error::{Error, Result};
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a storage segment in the cluster
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into,
)]
#[display("{_0}")]
pub struct SegmentId(u32);

impl SegmentId {
    /// Create a segment ID from its index
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the raw segment index
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Get the segment index for slice addressing
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// A single column value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Datum {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl Datum {
    /// Check if this value is NULL
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Value equality as storage sees it
    ///
    /// Unlike `==`, a NaN float matches another NaN and `-0.0` matches `0.0`,
    /// the same way both hash.
    #[must_use]
    pub fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => {
                canonical_float_bits(*a) == canonical_float_bits(*b)
            }
            _ => self == other,
        }
    }
}

/// Float bits with `-0.0` folded into `0.0` and every NaN into one pattern
#[must_use]
pub fn canonical_float_bits(v: f64) -> u64 {
    if v == 0.0 {
        0.0_f64.to_bits()
    } else if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

/// Compare two rows column by column with [`Datum::same_value`]
#[must_use]
pub fn same_row(a: &[Datum], b: &[Datum]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_value(y))
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Datum {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Row values in column order
pub type Row = Vec<Datum>;

/// Action carried by a row produced by a split update
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum DmlAction {
    /// Row must be added on its destination segment
    Insert,
    /// Row must be removed from the segment it lives on
    Delete,
}

/// A row tagged with a DML action and a destination segment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaggedRow {
    /// Column values
    pub values: Row,
    /// Insert or delete
    pub action: DmlAction,
    /// Destination segment, rewritten by the router
    pub segment: SegmentId,
}

impl TaggedRow {
    /// Create an insert row
    #[must_use]
    pub const fn insert(values: Row, segment: SegmentId) -> Self {
        Self {
            values,
            action: DmlAction::Insert,
            segment,
        }
    }

    /// Create a delete row
    #[must_use]
    pub const fn delete(values: Row, segment: SegmentId) -> Self {
        Self {
            values,
            action: DmlAction::Delete,
            segment,
        }
    }

    /// Get a column value
    pub fn column(&self, column: usize) -> Result<&Datum> {
        self.values.get(column).ok_or(Error::MissingColumn {
            column,
            width: self.values.len(),
        })
    }

    /// Check whether this is an insert row
    #[must_use]
    pub fn is_insert(&self) -> bool {
        self.action == DmlAction::Insert
    }
}

/// How a table's rows are spread over segments
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionPolicy {
    /// Destination is a hash of the key columns
    Hash {
        /// Zero-based key column positions, in hash order
        key_columns: Vec<usize>,
    },
    /// Rows are spread at random
    Random,
    /// Every segment holds a full copy
    Replicated,
}

impl DistributionPolicy {
    /// Hash policy over the given key columns
    #[must_use]
    pub fn hash(key_columns: impl Into<Vec<usize>>) -> Self {
        Self::Hash {
            key_columns: key_columns.into(),
        }
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Hash { key_columns } if key_columns.is_empty() => {
                Err(Error::EmptyDistributionKey)
            }
            _ => Ok(()),
        }
    }

    /// Short policy name for logs and reports
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hash { .. } => "hash",
            Self::Random => "random",
            Self::Replicated => "replicated",
        }
    }

    /// Key columns for hash distribution
    #[must_use]
    pub fn key_columns(&self) -> Option<&[usize]> {
        match self {
            Self::Hash { key_columns } => Some(key_columns),
            Self::Random | Self::Replicated => None,
        }
    }
}

impl fmt::Display for DistributionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash { key_columns } => write!(f, "hash{key_columns:?}"),
            Self::Random | Self::Replicated => f.write_str(self.name()),
        }
    }
}
