//! Segment hash
//!
//! Key columns are folded one by one into a streaming xxh64 state, each value
//! prefixed by its 1-based position and a type tag. The digest is reduced to a
//! segment with jump consistent hashing: when the segment count grows from
//! `O` to `N`, a key either keeps its segment or moves to one in `[O, N)`.

use reshard_common::{Datum, Error, Result, SegmentId, canonical_float_bits};
use std::fmt;
use xxhash_rust::xxh64::Xxh64;

const HASH_SEED: u64 = 0;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_TEXT: u8 = 4;
const TAG_BYTES: u8 = 5;

/// Hash context bound to a segment count
pub struct SegmentHash {
    segments: u32,
    state: Xxh64,
}

impl SegmentHash {
    /// Bind a hash context to `segments` segments
    pub fn bind(segments: u32) -> Result<Self> {
        if segments == 0 {
            return Err(Error::HashBind { segments });
        }
        Ok(Self {
            segments,
            state: Xxh64::new(HASH_SEED),
        })
    }

    /// Clear the folded state
    pub fn reset(&mut self) {
        self.state.reset(HASH_SEED);
    }

    /// Fold one key value at a 1-based position
    ///
    /// NULL is folded as its own tag, so it never collides with any
    /// concrete value.
    pub fn fold(&mut self, position: u32, value: &Datum) {
        self.state.update(&position.to_le_bytes());
        match value {
            Datum::Null => self.state.update(&[TAG_NULL]),
            Datum::Bool(v) => self.state.update(&[TAG_BOOL, u8::from(*v)]),
            Datum::Int(v) => {
                self.state.update(&[TAG_INT]);
                self.state.update(&v.to_le_bytes());
            }
            Datum::Float(v) => {
                self.state.update(&[TAG_FLOAT]);
                self.state.update(&canonical_float_bits(*v).to_le_bytes());
            }
            Datum::Text(v) => self.fold_bytes(TAG_TEXT, v.as_bytes()),
            Datum::Bytes(v) => self.fold_bytes(TAG_BYTES, v),
        }
    }

    fn fold_bytes(&mut self, tag: u8, bytes: &[u8]) {
        let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        self.state.update(&[tag]);
        self.state.update(&len.to_le_bytes());
        self.state.update(bytes);
    }

    /// Reduce the folded state to a segment in `[0, segments)`
    #[must_use]
    pub fn reduce(&self) -> SegmentId {
        SegmentId::new(jump_consistent_hash(self.digest(), self.segments))
    }

    pub(crate) fn digest(&self) -> u64 {
        self.state.digest()
    }

    /// Hash the key columns of a row to a segment
    pub fn hash_key(&mut self, values: &[Datum], key_columns: &[usize]) -> Result<SegmentId> {
        self.reset();
        for (position, &column) in (1..).zip(key_columns) {
            let value = values.get(column).ok_or(Error::MissingColumn {
                column,
                width: values.len(),
            })?;
            self.fold(position, value);
        }
        Ok(self.reduce())
    }
}

impl fmt::Debug for SegmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentHash")
            .field("segments", &self.segments)
            .finish_non_exhaustive()
    }
}

/// Jump consistent hash (Lamping & Veach)
///
/// Maps `key` to a bucket in `[0, buckets)`. `buckets` must be non-zero.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn jump_consistent_hash(mut key: u64, buckets: u32) -> u32 {
    debug_assert!(buckets > 0, "jump hash needs at least one bucket");

    let mut b: i64 = -1;
    let mut j: i64 = 0;
    while j < i64::from(buckets) {
        b = j;
        key = key.wrapping_mul(2_862_933_555_777_941_757).wrapping_add(1);
        j = ((b + 1) as f64 * ((1_i64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }
    b as u32
}
