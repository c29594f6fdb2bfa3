use anyhow::{bail, Result};

use crate::comm::Communicator;
use crate::partition::{RankAssignment, RowPartition};

/// Distributes the initial grid from the coordinating rank.
///
/// Rank 0 keeps its own slice directly and sends every other rank its
/// contiguous sub-range of the global buffer, halo rows included. Every
/// other rank blocks on a single transfer and checks it against the slice
/// size the partition predicts. A global buffer that does not match the
/// partitioned grid is fatal.
pub fn scatter_initial<C: Communicator>(
    comm: &C,
    global: Option<&[f64]>,
    partition: &RowPartition,
    n: usize,
) -> Result<Vec<f64>> {
    let expected = partition.assignment(comm.rank()).slice_len(n);

    if comm.rank() == 0 {
        let global = match global {
            Some(grid) => grid,
            None => bail!("the coordinating rank needs the initial grid"),
        };
        if global.len() != partition.rows() * n {
            bail!(
                "initial grid has {} values, expected {} ({} x {n})",
                global.len(),
                partition.rows() * n,
                partition.rows()
            );
        }

        for to in 1..comm.size() {
            let assignment = partition.assignment(to);
            let start = assignment.slice_first_row() * n;
            comm.send_block(to, global[start..start + assignment.slice_len(n)].to_vec())?;
        }

        Ok(global[..expected].to_vec())
    } else {
        let slice = comm.recv_block(0)?;
        if slice.len() != expected {
            bail!(
                "received a slice of {} values, expected {expected}",
                slice.len()
            );
        }
        Ok(slice)
    }
}

/// Collects the final grid on the coordinating rank.
///
/// Every rank trims the halo rows off its slice before the rank-ordered
/// gather, so the coordinator reassembles the owned blocks in global
/// top-to-bottom order with no duplicated rows. Only rank 0 gets the
/// merged grid.
pub fn gather_final<C: Communicator>(
    comm: &C,
    slice: &[f64],
    assignment: &RankAssignment,
    partition: &RowPartition,
    n: usize,
) -> Result<Option<Vec<f64>>> {
    let top = assignment.top_halo as usize * n;
    let bottom = assignment.bottom_halo as usize * n;
    let owned = slice[top..slice.len() - bottom].to_vec();

    match comm.gather_blocks(owned)? {
        Some(blocks) => {
            let mut global = Vec::with_capacity(partition.rows() * n);
            for block in blocks {
                global.extend_from_slice(&block);
            }
            if global.len() != partition.rows() * n {
                bail!(
                    "gathered grid has {} values, expected {}",
                    global.len(),
                    partition.rows() * n
                );
            }
            Ok(Some(global))
        }
        None => Ok(None),
    }
}
