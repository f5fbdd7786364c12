//! Explicit motion: deliver each row to the segment it names

use crate::source::RowSource;
use reshard_common::{Error, Result, SegmentId, TaggedRow};
use tracing::debug;

/// In-memory transport with one outbox per segment
#[derive(Clone, Debug, Default)]
pub struct ExplicitMotion {
    outboxes: Vec<Vec<TaggedRow>>,
}

impl ExplicitMotion {
    /// Create a transport for `segments` segments
    #[must_use]
    pub fn new(segments: u32) -> Self {
        Self {
            outboxes: vec![Vec::new(); segments as usize],
        }
    }

    /// Number of segments served
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn segments(&self) -> u32 {
        self.outboxes.len() as u32
    }

    /// Deliver one row to its destination
    pub fn send(&mut self, row: TaggedRow) -> Result<()> {
        let count = self.segments();
        let outbox = self
            .outboxes
            .get_mut(row.segment.as_usize())
            .ok_or(Error::DestinationOutOfRange {
                segment: row.segment,
                count,
            })?;
        outbox.push(row);
        Ok(())
    }

    /// Drain a source, returning the number of rows delivered
    pub fn drain<S: RowSource>(&mut self, source: &mut S) -> Result<u64> {
        let mut sent = 0;
        while let Some(row) = source.next_row()? {
            self.send(row)?;
            sent += 1;
        }
        debug!(rows = sent, "motion drained source");
        Ok(sent)
    }

    /// Rows delivered to `segment`
    #[must_use]
    pub fn outbox(&self, segment: SegmentId) -> &[TaggedRow] {
        self.outboxes
            .get(segment.as_usize())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total rows delivered
    #[must_use]
    pub fn len(&self) -> usize {
        self.outboxes.iter().map(Vec::len).sum()
    }

    /// Whether nothing was delivered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outboxes.iter().all(Vec::is_empty)
    }

    /// Append another transport's outboxes, segment by segment
    pub fn merge(&mut self, other: Self) -> Result<()> {
        if other.segments() != self.segments() {
            return Err(Error::internal(format!(
                "cannot merge motion for {} segments into {}",
                other.segments(),
                self.segments()
            )));
        }
        for (outbox, rows) in self.outboxes.iter_mut().zip(other.outboxes) {
            outbox.extend(rows);
        }
        Ok(())
    }
}
