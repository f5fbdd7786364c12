//! Split update: one delete and one insert per source row

use crate::scan::TupleSource;
use crate::source::RowSource;
use reshard_common::{Result, TaggedRow};

/// Turns every row of a tuple source into a delete/insert pair
///
/// Both rows carry the source segment; the reshuffle operator downstream
/// rewrites the insert's destination.
#[derive(Debug)]
pub struct SplitUpdate<T> {
    child: T,
    pending_insert: Option<TaggedRow>,
}

impl<T: TupleSource> SplitUpdate<T> {
    /// Wrap a tuple source
    pub const fn new(child: T) -> Self {
        Self {
            child,
            pending_insert: None,
        }
    }

    /// Underlying tuple source
    pub const fn child(&self) -> &T {
        &self.child
    }
}

impl<T: TupleSource> RowSource for SplitUpdate<T> {
    fn next_row(&mut self) -> Result<Option<TaggedRow>> {
        if let Some(insert) = self.pending_insert.take() {
            return Ok(Some(insert));
        }

        let Some(values) = self.child.next_tuple()? else {
            return Ok(None);
        };
        let segment = self.child.segment();
        self.pending_insert = Some(TaggedRow::insert(values.clone(), segment));
        Ok(Some(TaggedRow::delete(values, segment)))
    }

    fn can_rescan(&self) -> bool {
        self.child.can_rescan()
    }

    fn rescan(&mut self) -> Result<()> {
        self.child.rescan()?;
        self.pending_insert = None;
        Ok(())
    }
}
