//! Segment scan with the reshuffle filter applied

use reshard_common::{Error, Result, Row, SegmentId};
use reshard_placement::ReshuffleFilter;

/// Producer of untagged rows
pub trait TupleSource {
    /// Pull the next row
    fn next_tuple(&mut self) -> Result<Option<Row>>;

    /// Segment the rows are read from
    fn segment(&self) -> SegmentId;

    /// Whether the source can restart from its first row
    fn can_rescan(&self) -> bool {
        false
    }

    /// Restart from the first row
    fn rescan(&mut self) -> Result<()> {
        Err(Error::RescanUnsupported)
    }
}

/// Sequential scan over the rows stored on one segment
#[derive(Debug)]
pub struct SegmentScan {
    segment: SegmentId,
    rows: Vec<Row>,
    position: usize,
    filter: Option<ReshuffleFilter>,
    scanned: u64,
    accepted: u64,
}

impl SegmentScan {
    /// Scan every stored row
    #[must_use]
    pub const fn new(segment: SegmentId, rows: Vec<Row>) -> Self {
        Self {
            segment,
            rows,
            position: 0,
            filter: None,
            scanned: 0,
            accepted: 0,
        }
    }

    /// Only yield rows the filter says must move
    #[must_use]
    pub fn with_filter(mut self, filter: ReshuffleFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Rows read so far
    #[must_use]
    pub const fn scanned(&self) -> u64 {
        self.scanned
    }

    /// Rows yielded so far
    #[must_use]
    pub const fn accepted(&self) -> u64 {
        self.accepted
    }
}

impl TupleSource for SegmentScan {
    fn next_tuple(&mut self) -> Result<Option<Row>> {
        while let Some(row) = self.rows.get(self.position) {
            self.position += 1;
            self.scanned += 1;

            let keep = match self.filter.as_mut() {
                Some(filter) => filter.needs_move(row)?,
                None => true,
            };
            if keep {
                self.accepted += 1;
                return Ok(Some(row.clone()));
            }
        }
        Ok(None)
    }

    fn segment(&self) -> SegmentId {
        self.segment
    }

    fn can_rescan(&self) -> bool {
        true
    }

    fn rescan(&mut self) -> Result<()> {
        self.position = 0;
        self.scanned = 0;
        self.accepted = 0;
        Ok(())
    }
}
