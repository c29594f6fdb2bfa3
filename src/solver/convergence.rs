use anyhow::Result;

use crate::comm::Communicator;

/// A rank's "locally converged" state.
///
/// Monotonic: once set it stays set for the rest of the run. A latched rank
/// stops sweeping its own rows but keeps exchanging its current boundary
/// rows and keeps entering the global reduction, so neighbors that are
/// still sweeping may read an unchanging boundary until they latch too.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvergenceLatch {
    converged: bool,
}

impl ConvergenceLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one iteration's stop decision into the latch.
    pub fn observe(&mut self, stop: bool) {
        self.converged |= stop;
    }

    pub fn is_set(&self) -> bool {
        self.converged
    }
}

/// Combines every rank's latch into the global stop decision with a
/// blocking AND-reduction.
///
/// Every rank must call this once per iteration; the result is true only
/// when every rank has individually reached its stopping condition.
pub fn globally_converged<C: Communicator>(comm: &C, latch: &ConvergenceLatch) -> Result<bool> {
    comm.all_reduce_and(latch.is_set())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::channel::run_ranks;
    use crate::comm::SingleRank;

    #[test]
    fn test_latch_is_monotonic() {
        let mut latch = ConvergenceLatch::new();
        assert!(!latch.is_set());
        latch.observe(false);
        assert!(!latch.is_set());
        latch.observe(true);
        assert!(latch.is_set());
        // Later non-converged sweeps must not reset it.
        latch.observe(false);
        assert!(latch.is_set());
    }

    #[test]
    fn test_single_rank_global_flag_mirrors_latch() {
        let comm = SingleRank;
        let mut latch = ConvergenceLatch::new();
        assert!(!globally_converged(&comm, &latch).unwrap());
        latch.observe(true);
        assert!(globally_converged(&comm, &latch).unwrap());
    }

    #[test]
    fn test_global_flag_requires_every_rank() {
        let flags = run_ranks(3, |comm| {
            let mut latch = ConvergenceLatch::new();
            latch.observe(comm.rank() != 2);
            globally_converged(&comm, &latch)
        })
        .unwrap();
        assert_eq!(flags, vec![false, false, false]);

        let flags = run_ranks(3, |comm| {
            let mut latch = ConvergenceLatch::new();
            latch.observe(true);
            globally_converged(&comm, &latch)
        })
        .unwrap();
        assert_eq!(flags, vec![true, true, true]);
    }
}
