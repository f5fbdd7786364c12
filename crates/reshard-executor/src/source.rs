//! Pull interface between pipeline operators

use reshard_common::{Error, Result, TaggedRow};

/// Producer of tagged rows
///
/// `Ok(None)` marks the end of the stream. Errors are passed through by
/// consumers unchanged.
pub trait RowSource {
    /// Pull the next row
    fn next_row(&mut self) -> Result<Option<TaggedRow>>;

    /// Whether the source can restart from its first row
    fn can_rescan(&self) -> bool {
        false
    }

    /// Restart from the first row
    fn rescan(&mut self) -> Result<()> {
        Err(Error::RescanUnsupported)
    }
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn next_row(&mut self) -> Result<Option<TaggedRow>> {
        (**self).next_row()
    }

    fn can_rescan(&self) -> bool {
        (**self).can_rescan()
    }

    fn rescan(&mut self) -> Result<()> {
        (**self).rescan()
    }
}

/// In-memory row source
#[derive(Clone, Debug, Default)]
pub struct VecSource {
    rows: Vec<TaggedRow>,
    position: usize,
    rescannable: bool,
}

impl VecSource {
    /// Create a rescannable source over `rows`
    #[must_use]
    pub const fn new(rows: Vec<TaggedRow>) -> Self {
        Self {
            rows,
            position: 0,
            rescannable: true,
        }
    }

    /// Create a source that refuses to rescan
    #[must_use]
    pub const fn once(rows: Vec<TaggedRow>) -> Self {
        Self {
            rows,
            position: 0,
            rescannable: false,
        }
    }

    /// Rows not pulled yet
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len() - self.position
    }
}

impl RowSource for VecSource {
    fn next_row(&mut self) -> Result<Option<TaggedRow>> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    fn can_rescan(&self) -> bool {
        self.rescannable
    }

    fn rescan(&mut self) -> Result<()> {
        if !self.rescannable {
            return Err(Error::RescanUnsupported);
        }
        self.position = 0;
        Ok(())
    }
}
