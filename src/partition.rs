use anyhow::{bail, Result};

/// Row-block partition of an `rows`-row grid across a fixed set of ranks.
///
/// Each rank owns `rows / size` contiguous rows; the last rank absorbs the
/// remainder. The owned ranges cover `0..rows` exactly, with no gaps and no
/// overlaps. Every rank additionally holds one halo row per interior
/// boundary: edge ranks (first and last) get a one-sided halo, interior
/// ranks get halos on both sides.
#[derive(Debug, Clone, Copy)]
pub struct RowPartition {
    rows: usize,
    size: usize,
    base: usize,
    remainder: usize,
}

impl RowPartition {
    pub fn new(rows: usize, size: usize) -> Result<Self> {
        if size == 0 {
            bail!("cannot partition across zero ranks");
        }
        if rows < size {
            bail!("cannot partition {rows} rows across {size} ranks");
        }
        Ok(Self {
            rows,
            size,
            base: rows / size,
            remainder: rows % size,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The row range and halo layout assigned to `rank`.
    pub fn assignment(&self, rank: usize) -> RankAssignment {
        debug_assert!(rank < self.size);
        let owned_rows = if rank == self.size - 1 {
            self.base + self.remainder
        } else {
            self.base
        };
        RankAssignment {
            first_row: rank * self.base,
            owned_rows,
            top_halo: rank > 0,
            bottom_halo: rank < self.size - 1,
        }
    }
}

/// One rank's share of the grid: its owned row block plus halo layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankAssignment {
    /// Global index of the first owned row.
    pub first_row: usize,
    /// Number of owned rows.
    pub owned_rows: usize,
    /// Whether the local slice carries a halo row above the owned block.
    pub top_halo: bool,
    /// Whether the local slice carries a halo row below the owned block.
    pub bottom_halo: bool,
}

impl RankAssignment {
    pub fn halo_rows(&self) -> usize {
        self.top_halo as usize + self.bottom_halo as usize
    }

    /// Rows in the local slice: owned block plus halos.
    pub fn slice_rows(&self) -> usize {
        self.owned_rows + self.halo_rows()
    }

    /// Elements in the local slice for an `n`-column grid.
    pub fn slice_len(&self, n: usize) -> usize {
        self.slice_rows() * n
    }

    /// Global index of the first slice row (the top halo row, if present).
    pub fn slice_first_row(&self) -> usize {
        self.first_row - self.top_halo as usize
    }
}
