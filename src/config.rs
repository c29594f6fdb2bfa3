use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Stopping conditions for the relaxation loop.
///
/// The loop terminates when the per-sweep error falls below `tolerance` or
/// when the sweep counter reaches `n_max - 1`, whichever comes first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Error threshold for convergence.
    pub tolerance: f64,
    /// Maximum sweep count. The solver performs at most `n_max - 1` sweeps.
    pub n_max: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            n_max: 10_000,
        }
    }
}

impl SolverConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let config: SolverConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects parameter combinations the loop cannot terminate under.
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            bail!("tolerance must be finite and non-negative, got {}", self.tolerance);
        }
        if self.n_max < 2 {
            bail!("n_max must be at least 2, got {}", self.n_max);
        }
        Ok(())
    }
}
