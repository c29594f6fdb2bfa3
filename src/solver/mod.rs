//! Relaxation loop orchestration.
//!
//! # Architecture
//!
//! ```text
//! scatter_initial() ──► Mesh::update() ──► exchange_halos() ──► all-reduce AND
//!        │                   ▲                                       │
//!        │                   └────────── not converged ◄─────────────┤
//!        │                                                           ▼ converged
//!        └────────────────────────────────► gather_final() ──► write / report
//! ```
//!
//! One loop serves all three execution modes. A single-rank transport makes
//! the halo exchange a no-op and the reductions the identity, and the worker
//! thread count controls how each sweep is split, so the sequential,
//! thread-parallel and distributed runs share every line of the iteration
//! logic.

pub mod convergence;
pub mod gateway;
pub mod halo;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};

use crate::comm::channel::run_ranks;
use crate::comm::{Communicator, RankTopology, SingleRank};
use crate::config::SolverConfig;
use crate::domain::Domain;
use crate::mesh::{Forcing, Mesh};
use crate::partition::{RankAssignment, RowPartition};

use convergence::ConvergenceLatch;
use gateway::{gather_final, scatter_initial};
use halo::{exchange_halos, ExchangeOffsets};

/// Outcome of one relaxation run.
#[derive(Debug, Clone, Copy)]
pub struct SolveReport {
    /// Global iterations executed.
    pub iterations: usize,
    /// Mean wall-clock time of one sweep, averaged over ranks [ms].
    pub mean_sweep_ms: f64,
    /// True when every rank's error fell below the tolerance, false when the
    /// run stopped at the sweep cap.
    pub converged: bool,
    /// This rank's error after its last sweep.
    pub final_error: f64,
}

/// Drives the relaxation of one rank's grid slice to global convergence.
///
/// Rank and group size are owned by the injected communicator; nothing is
/// read from ambient global state.
pub struct Solver<C: Communicator> {
    comm: C,
    topo: RankTopology,
    mesh: Mesh,
    offsets: ExchangeOffsets,
    assignment: RankAssignment,
    partition: RowPartition,
    config: SolverConfig,
    n: usize,
}

impl<C: Communicator> Solver<C> {
    /// Single-rank constructor from a pre-built mesh.
    pub fn from_mesh(comm: C, mesh: Mesh, config: SolverConfig) -> Result<Self> {
        config.validate()?;
        if comm.size() != 1 {
            bail!(
                "the pre-built mesh constructor is for single-rank groups, got {} ranks",
                comm.size()
            );
        }
        let (rows, n) = mesh.size();
        let partition = RowPartition::new(rows, 1)?;
        Ok(Self {
            topo: RankTopology::new(comm.rank(), comm.size()),
            offsets: ExchangeOffsets::new(rows * n, n),
            assignment: partition.assignment(0),
            partition,
            comm,
            mesh,
            config,
            n,
        })
    }

    /// Distributed constructor: scatters the initial `n x n` grid from the
    /// coordinating rank and builds this rank's local slice.
    ///
    /// Only rank 0 provides the global grid; every other rank passes `None`
    /// and receives its slice through the gateway.
    pub fn scattered(
        comm: C,
        global: Option<&[f64]>,
        domain: Domain,
        n: usize,
        forcing: Forcing,
        config: SolverConfig,
    ) -> Result<Self> {
        config.validate()?;
        let partition = RowPartition::new(n, comm.size())?;
        let slice = scatter_initial(&comm, global, &partition, n)?;
        let assignment = partition.assignment(comm.rank());
        let mesh = Mesh::with_row_offset(slice, n, assignment.slice_first_row(), domain, forcing)?;
        Ok(Self {
            topo: RankTopology::new(comm.rank(), comm.size()),
            offsets: ExchangeOffsets::new(assignment.slice_len(n), n),
            assignment,
            partition,
            comm,
            mesh,
            config,
            n,
        })
    }

    /// Runs the iteration loop to global convergence.
    ///
    /// Each iteration sweeps (unless this rank's latch is already set),
    /// folds the stop decision into the latch, runs the AND-reduction, and
    /// exchanges boundary rows. Updated halos are installed only when the
    /// group continues; on the final iteration the exchanged rows are
    /// discarded. All ranks leave the loop on the same iteration.
    pub fn solve(&mut self, threads: usize) -> Result<SolveReport> {
        let SolverConfig { tolerance, n_max } = self.config;
        let has_neighbors = self.topo.has_top_neighbor() || self.topo.has_bottom_neighbor();

        let mut latch = ConvergenceLatch::new();
        let mut iterations: usize = 1;
        let mut sweep_ms = 0.0;

        loop {
            if !latch.is_set() {
                let start = Instant::now();
                self.mesh.update(threads);
                sweep_ms += start.elapsed().as_secs_f64() * 1e3;
                latch.observe(self.mesh.error() < tolerance || iterations == n_max - 1);
            }

            let all_converged = convergence::globally_converged(&self.comm, &latch)?;

            if has_neighbors {
                let mut buffer = self.mesh.values().to_vec();
                exchange_halos(&self.comm, &self.topo, &self.offsets, self.n, &mut buffer)?;
                if !all_converged {
                    self.mesh.set_values(buffer)?;
                }
            }

            if all_converged {
                break;
            }
            iterations += 1;
        }

        let converged = self.comm.all_reduce_and(self.mesh.error() < tolerance)?;
        let total_ms = self.comm.all_reduce_sum(sweep_ms)?;
        let mean_ms = total_ms / self.comm.size() as f64;
        let report = SolveReport {
            iterations,
            mean_sweep_ms: mean_ms / iterations as f64,
            converged,
            final_error: self.mesh.error(),
        };

        if self.comm.rank() == 0 {
            println!(
                "Iter: {} - time: {:.3} ms - mean time each update: {:.3} ms",
                report.iterations, mean_ms, report.mean_sweep_ms
            );
        }

        Ok(report)
    }

    /// Collects the final grid on the coordinating rank; `None` elsewhere.
    pub fn gather_solution(&self) -> Result<Option<Vec<f64>>> {
        gather_final(
            &self.comm,
            self.mesh.values(),
            &self.assignment,
            &self.partition,
            self.n,
        )
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }
}

/// Writes the solved grid to `vtk_files/approx_sol-<ranks>-<rows>.vtk` and
/// returns the path. Meant for the coordinating rank only.
pub fn write_solution(
    global: &[f64],
    n: usize,
    ranks: usize,
    domain: Domain,
    forcing: Forcing,
) -> Result<PathBuf> {
    let mesh = Mesh::new(global.to_vec(), n, domain, forcing)?;
    let (rows, _) = mesh.size();
    let path = PathBuf::from(format!("vtk_files/approx_sol-{ranks}-{rows}.vtk"));
    mesh.write(&path)?;
    Ok(path)
}

/// Solves sequentially: one rank, one worker thread.
pub fn run_sequential(
    grid: Vec<f64>,
    n: usize,
    domain: Domain,
    forcing: Forcing,
    config: SolverConfig,
) -> Result<(Vec<f64>, SolveReport)> {
    run_threaded(grid, n, domain, forcing, config, 1)
}

/// Solves in a single rank, splitting each sweep across `threads` workers.
pub fn run_threaded(
    grid: Vec<f64>,
    n: usize,
    domain: Domain,
    forcing: Forcing,
    config: SolverConfig,
    threads: usize,
) -> Result<(Vec<f64>, SolveReport)> {
    let mesh = Mesh::new(grid, n, domain, forcing)?;
    let mut solver = Solver::from_mesh(SingleRank, mesh, config)?;
    let report = solver.solve(threads)?;
    let solution = solver
        .gather_solution()?
        .ok_or_else(|| anyhow!("single rank produced no gathered grid"))?;
    Ok((solution, report))
}

/// Solves across `ranks` message-passing ranks, each rank sweeping with
/// `threads` worker threads.
///
/// Spawns one thread per rank over the in-process channel transport,
/// propagates the first rank failure, and returns the coordinating rank's
/// gathered grid and report.
pub fn run_distributed(
    grid: &[f64],
    n: usize,
    domain: Domain,
    forcing: Forcing,
    config: SolverConfig,
    ranks: usize,
    threads: usize,
) -> Result<(Vec<f64>, SolveReport)> {
    let mut results = run_ranks(ranks, |comm| {
        let root_grid = (comm.rank() == 0).then_some(grid);
        let mut solver = Solver::scattered(comm, root_grid, domain, n, forcing.clone(), config)?;
        let report = solver.solve(threads)?;
        let solution = solver.gather_solution()?;
        Ok((solution, report))
    })?;

    let (solution, report) = results.swap_remove(0);
    let solution = solution.ok_or_else(|| anyhow!("coordinating rank produced no gathered grid"))?;
    Ok((solution, report))
}
