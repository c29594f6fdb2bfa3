//! Grid slice storage and the Jacobi relaxation kernel.
//!
//! A [`Mesh`] holds the rows of the grid one rank works on: its owned row
//! block plus any halo rows. One [`Mesh::update`] call applies a single
//! five-point Jacobi sweep to the writable rows, reading only the
//! previous-iteration buffer, so the numerical result is independent of how
//! the sweep is split across worker threads.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use rayon::prelude::*;

use crate::domain::Domain;
use crate::vtk;

/// Forcing term `f(x, y)` of the Poisson problem `-laplacian(u) = f`.
///
/// Shared across ranks and worker threads.
pub type Forcing = Arc<dyn Fn(f64, f64) -> f64 + Send + Sync>;

/// A row-major grid slice with its relaxation state.
///
/// The first and last slice rows are never written: they are either global
/// Dirichlet boundary rows or halo rows owned by a neighboring rank. The
/// same holds for the first and last column of every row.
pub struct Mesh {
    values: Vec<f64>,
    /// Next-iterate buffer, swapped with `values` after each sweep.
    scratch: Vec<f64>,
    n: usize,
    /// Global index of the first slice row, for physical-coordinate mapping.
    row_offset: usize,
    domain: Domain,
    forcing: Forcing,
    h: f64,
    error: f64,
}

impl Mesh {
    /// Creates a mesh covering the full grid (first row is global row 0).
    pub fn new(values: Vec<f64>, n: usize, domain: Domain, forcing: Forcing) -> Result<Self> {
        Self::with_row_offset(values, n, 0, domain, forcing)
    }

    /// Creates a mesh for a slice whose first row is global row `row_offset`.
    pub fn with_row_offset(
        values: Vec<f64>,
        n: usize,
        row_offset: usize,
        domain: Domain,
        forcing: Forcing,
    ) -> Result<Self> {
        if n < 2 {
            bail!("grid needs at least 2 columns, got {n}");
        }
        if values.is_empty() || values.len() % n != 0 {
            bail!(
                "grid buffer of {} values is not a whole number of {n}-column rows",
                values.len()
            );
        }
        let rows = values.len() / n;
        if rows < 2 {
            bail!("grid slice needs at least 2 rows, got {rows}");
        }
        let h = domain.spacing(n);
        Ok(Self {
            scratch: values.clone(),
            values,
            n,
            row_offset,
            domain,
            forcing,
            h,
            error: 0.0,
        })
    }

    /// Applies one Jacobi sweep to all writable rows.
    ///
    /// With `threads > 1` the writable row range is split into contiguous
    /// chunks updated concurrently. Each chunk writes only its own rows and
    /// reads the previous-iteration buffer, so no locking is needed and the
    /// result is identical for any thread count.
    pub fn update(&mut self, threads: usize) {
        let n = self.n;
        let rows = self.values.len() / n;
        self.scratch.copy_from_slice(&self.values);

        let prev = &self.values;
        let h = self.h;
        let domain = self.domain;
        let row_offset = self.row_offset;
        let forcing = self.forcing.as_ref();

        let relax_row = |out_row: &mut [f64], i: usize| {
            let base = i * n;
            let y = domain.y(row_offset + i, h);
            for j in 1..n - 1 {
                let x = domain.x(j, h);
                out_row[j] = 0.25
                    * (prev[base - n + j]
                        + prev[base + n + j]
                        + prev[base + j - 1]
                        + prev[base + j + 1]
                        + h * h * forcing(x, y));
            }
        };

        let interior_rows = rows - 2;
        let interior = &mut self.scratch[n..(rows - 1) * n];

        if threads <= 1 {
            for (k, out_row) in interior.chunks_mut(n).enumerate() {
                relax_row(out_row, k + 1);
            }
        } else {
            let chunk_rows = interior_rows.div_ceil(threads).max(1);
            interior
                .par_chunks_mut(chunk_rows * n)
                .enumerate()
                .for_each(|(c, chunk)| {
                    let first = 1 + c * chunk_rows;
                    for (k, out_row) in chunk.chunks_mut(n).enumerate() {
                        relax_row(out_row, first + k);
                    }
                });
        }

        // Error in fixed row order, independent of the chunking above.
        let mut sum = 0.0;
        for (new, old) in self.scratch[n..(rows - 1) * n]
            .iter()
            .zip(&self.values[n..(rows - 1) * n])
        {
            let d = new - old;
            sum += d * d;
        }
        self.error = (h * sum).sqrt();

        std::mem::swap(&mut self.values, &mut self.scratch);
    }

    /// Convergence error of the most recent sweep: `sqrt(h * sum((u' - u)^2))`
    /// over the rows this mesh updates.
    pub fn error(&self) -> f64 {
        self.error
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Replaces the slice buffer, keeping the last sweep error.
    pub fn set_values(&mut self, values: Vec<f64>) -> Result<()> {
        if values.len() != self.values.len() {
            bail!(
                "replacement buffer has {} values, slice holds {}",
                values.len(),
                self.values.len()
            );
        }
        self.values = values;
        Ok(())
    }

    /// (rows, cols) of this slice.
    pub fn size(&self) -> (usize, usize) {
        (self.values.len() / self.n, self.n)
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn forcing(&self) -> &Forcing {
        &self.forcing
    }

    /// Persists the slice as a VTK file.
    pub fn write(&self, path: &Path) -> Result<()> {
        let (rows, cols) = self.size();
        vtk::write_vtk(path, &self.values, rows, cols, &self.domain)
    }
}
