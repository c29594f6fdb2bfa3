//! Message-passing transport between ranks.
//!
//! Ranks own independent memory and coordinate exclusively through the
//! [`Communicator`] trait: point-to-point block transfer for the initial
//! scatter, atomic paired send-receive for halo rows, and blocking
//! collective reductions for the termination protocol. The trait keeps the
//! solver independent of the underlying transport; [`channel::ChannelComm`]
//! runs a full rank group in one process for tests and the CLI driver.

pub mod channel;

use anyhow::{bail, Result};

/// Blocking message-passing operations within a fixed group of ranks.
///
/// All collective operations (`all_reduce_*`, `gather_blocks`) must be
/// called by every rank of the group in the same order; a rank that skips
/// one stalls the whole group. A disconnected peer is a fatal error: the
/// protocol has no retry path.
pub trait Communicator {
    /// This rank's index within the group.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Sends a data block to `to`. Does not block on the receiver.
    fn send_block(&self, to: usize, data: Vec<f64>) -> Result<()>;

    /// Blocks until a data block from `from` arrives.
    fn recv_block(&self, from: usize) -> Result<Vec<f64>>;

    /// Atomic paired exchange of one grid row with `peer`.
    ///
    /// Both sides must call this against each other; neither side can
    /// deadlock waiting for the other's send to complete first.
    fn send_recv_row(&self, peer: usize, row: &[f64]) -> Result<Vec<f64>>;

    /// Logical AND of `value` across all ranks. Every rank gets the result.
    fn all_reduce_and(&self, value: bool) -> Result<bool>;

    /// Sum of `value` across all ranks. Every rank gets the result.
    fn all_reduce_sum(&self, value: f64) -> Result<f64>;

    /// Rank-ordered gather. Rank 0 receives every rank's block (its own
    /// first); all other ranks receive `None`.
    fn gather_blocks(&self, block: Vec<f64>) -> Result<Option<Vec<Vec<f64>>>>;
}

/// The linear chain of ranks: rank `r` neighbors `r - 1` and `r + 1`.
///
/// Fixed for the lifetime of the run, independent of the transport.
#[derive(Debug, Clone, Copy)]
pub struct RankTopology {
    rank: usize,
    size: usize,
}

impl RankTopology {
    pub fn new(rank: usize, size: usize) -> Self {
        debug_assert!(rank < size);
        Self { rank, size }
    }

    pub fn has_top_neighbor(&self) -> bool {
        self.rank > 0
    }

    pub fn has_bottom_neighbor(&self) -> bool {
        self.rank < self.size - 1
    }

    /// Rank of the neighbor above. Only valid when [`Self::has_top_neighbor`].
    pub fn top_rank(&self) -> usize {
        debug_assert!(self.has_top_neighbor());
        self.rank - 1
    }

    /// Rank of the neighbor below. Only valid when [`Self::has_bottom_neighbor`].
    pub fn bottom_rank(&self) -> usize {
        debug_assert!(self.has_bottom_neighbor());
        self.rank + 1
    }
}

/// Transport for a group of one: the sequential and thread-parallel modes.
///
/// Reductions are the identity and there are no peers to exchange with.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleRank;

impl Communicator for SingleRank {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send_block(&self, to: usize, _data: Vec<f64>) -> Result<()> {
        bail!("single-rank group has no peer {to}");
    }

    fn recv_block(&self, from: usize) -> Result<Vec<f64>> {
        bail!("single-rank group has no peer {from}");
    }

    fn send_recv_row(&self, peer: usize, _row: &[f64]) -> Result<Vec<f64>> {
        bail!("single-rank group has no peer {peer}");
    }

    fn all_reduce_and(&self, value: bool) -> Result<bool> {
        Ok(value)
    }

    fn all_reduce_sum(&self, value: f64) -> Result<f64> {
        Ok(value)
    }

    fn gather_blocks(&self, block: Vec<f64>) -> Result<Option<Vec<Vec<f64>>>> {
        Ok(Some(vec![block]))
    }
}
