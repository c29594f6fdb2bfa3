use anyhow::{bail, Result};

use crate::comm::{Communicator, RankTopology};

/// Element offsets of the boundary rows exchanged with neighbors.
///
/// Computed once from the local slice length and the halo width `n`. The
/// first and last slice rows are halos (where the corresponding neighbor
/// exists), so the first owned row starts at `n` and the last owned row
/// ends `2n` before the end of the slice.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeOffsets {
    /// First owned row, sent to the top neighbor.
    pub send_top: usize,
    /// Top halo row, overwritten with the top neighbor's last owned row.
    pub recv_top: usize,
    /// Last owned row, sent to the bottom neighbor.
    pub send_bottom: usize,
    /// Bottom halo row, overwritten with the bottom neighbor's first owned row.
    pub recv_bottom: usize,
}

impl ExchangeOffsets {
    pub fn new(slice_len: usize, n: usize) -> Self {
        Self {
            send_top: n,
            recv_top: 0,
            send_bottom: slice_len - 2 * n,
            recv_bottom: slice_len - n,
        }
    }
}

/// Exchanges updated boundary rows with both row neighbors, top neighbor
/// first, then bottom.
///
/// The order is the same on every rank so messages always pair up, and each
/// neighbor exchange is a single atomic send-receive: a send-then-receive
/// sequence of separate blocking calls would leave the whole chain waiting
/// on itself.
pub fn exchange_halos<C: Communicator>(
    comm: &C,
    topo: &RankTopology,
    offsets: &ExchangeOffsets,
    n: usize,
    slice: &mut [f64],
) -> Result<()> {
    if topo.has_top_neighbor() {
        let sent = &slice[offsets.send_top..offsets.send_top + n];
        let received = comm.send_recv_row(topo.top_rank(), sent)?;
        if received.len() != n {
            bail!(
                "halo row from rank {} has {} values, expected {n}",
                topo.top_rank(),
                received.len()
            );
        }
        slice[offsets.recv_top..offsets.recv_top + n].copy_from_slice(&received);
    }

    if topo.has_bottom_neighbor() {
        let sent = &slice[offsets.send_bottom..offsets.send_bottom + n];
        let received = comm.send_recv_row(topo.bottom_rank(), sent)?;
        if received.len() != n {
            bail!(
                "halo row from rank {} has {} values, expected {n}",
                topo.bottom_rank(),
                received.len()
            );
        }
        slice[offsets.recv_bottom..offsets.recv_bottom + n].copy_from_slice(&received);
    }

    Ok(())
}
