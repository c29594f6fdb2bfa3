use std::f64::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use jacobi2d::solver::{run_distributed, run_sequential, run_threaded, write_solution};
use jacobi2d::{Domain, Forcing, SolverConfig};

/// Jacobi relaxation solver for the 2-D Poisson problem on the unit square.
#[derive(Parser)]
#[command(name = "jacobi2d", version, about)]
struct Cli {
    /// Grid points per side.
    #[arg(long, default_value_t = 64)]
    size: usize,

    /// Execution mode.
    #[arg(long, value_enum, default_value = "sequential")]
    mode: Mode,

    /// Message-passing ranks (distributed mode only).
    #[arg(long, default_value_t = 4)]
    ranks: usize,

    /// Worker threads per sweep.
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// JSON file with the stopping conditions.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// One rank, one worker thread.
    Sequential,
    /// One rank, multi-threaded sweeps.
    Threaded,
    /// Row blocks across message-passing ranks.
    Distributed,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SolverConfig::from_file(path)?,
        None => SolverConfig::default(),
    };

    let n = cli.size;
    let domain = Domain::unit_square();
    // Manufactured problem: -laplacian(u) = f with exact solution
    // u = sin(2*pi*x) * sin(2*pi*y), zero on the boundary.
    let forcing: Forcing =
        Arc::new(|x: f64, y: f64| 8.0 * PI * PI * (2.0 * PI * x).sin() * (2.0 * PI * y).sin());
    let grid = vec![0.0; n * n];

    println!(
        "jacobi2d: {n} x {n} grid, tolerance {:.1e}, at most {} sweeps",
        config.tolerance,
        config.n_max - 1
    );

    let (solution, report, ranks) = match cli.mode {
        Mode::Sequential => {
            let (solution, report) = run_sequential(grid, n, domain, forcing.clone(), config)?;
            (solution, report, 1)
        }
        Mode::Threaded => {
            println!("threaded mode: {} worker threads", cli.threads);
            let (solution, report) =
                run_threaded(grid, n, domain, forcing.clone(), config, cli.threads)?;
            (solution, report, 1)
        }
        Mode::Distributed => {
            println!(
                "distributed mode: {} ranks x {} worker threads",
                cli.ranks, cli.threads
            );
            let (solution, report) = run_distributed(
                &grid,
                n,
                domain,
                forcing.clone(),
                config,
                cli.ranks,
                cli.threads,
            )?;
            (solution, report, cli.ranks)
        }
    };

    let path = write_solution(&solution, n, ranks, domain, forcing)?;
    if report.converged {
        println!(
            "Converged after {} iterations (final error {:.3e})",
            report.iterations, report.final_error
        );
    } else {
        println!(
            "Stopped at the sweep cap after {} iterations (final error {:.3e})",
            report.iterations, report.final_error
        );
    }
    println!("Solution written to {}", path.display());
    Ok(())
}
