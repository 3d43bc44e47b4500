//! Embedded-atom method over full Verlet lists.
//!
//! The embedding function `F(rho)`, the density `rho(r)` and `z2(r) = r phi(r)`
//! are cubic splines on uniform grids. A force evaluation takes two passes:
//! densities and `F'` for owned particles, a copy of `F'` onto ghosts, then
//! the pair forces.

use crate::atom::{Atom, PositionStorage};
use crate::config::{VECTOR_WIDTH, parallel_min_len};
use crate::error::{MdError, Result};
use crate::neighbor::NeighborList;
use crate::stats::Stats;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info_span};

/// Coefficients of one spline interval. Entries 3..=6 give the value as a
/// cubic in the interval fraction; entries 0..=2 give the derivative with
/// respect to the abscissa.
pub type SplineCoeffs = [f64; 7];

#[derive(Clone, Debug)]
pub struct Spline {
    /// Row `m` (1-based) covers `[(m - 1) dx, m dx]`. Row 0 is unused.
    coeffs: Vec<SplineCoeffs>,
    rdx: f64,
}

impl Spline {
    /// Fits a spline to `samples[k] = f(k * delta)`. Slopes come from a
    /// five-point stencil in the interior and one-sided differences at the
    /// ends, so any table with at least two samples is accepted.
    pub fn interpolate(samples: &[f64], delta: f64) -> Result<Self> {
        let n = samples.len();
        if n < 2 {
            return Err(MdError::InvalidTable(format!(
                "spline needs at least 2 samples, got {n}"
            )));
        }
        if !delta.is_finite() || delta <= 0.0 {
            return Err(MdError::InvalidTable(format!(
                "spline spacing must be positive, got {delta}"
            )));
        }
        if samples.iter().any(|v| !v.is_finite()) {
            return Err(MdError::InvalidTable("spline samples must be finite".into()));
        }

        // 1-based copy to keep the stencil readable
        let f = |m: usize| samples[m - 1];
        let mut s = vec![[0.0; 7]; n + 1];
        for m in 1..=n {
            s[m][6] = f(m);
            s[m][5] = if m == 1 {
                f(2) - f(1)
            } else if m == n {
                f(n) - f(n - 1)
            } else if m == 2 || m == n - 1 {
                0.5 * (f(m + 1) - f(m - 1))
            } else {
                ((f(m - 2) - f(m + 2)) + 8.0 * (f(m + 1) - f(m - 1))) / 12.0
            };
        }
        for m in 1..n {
            let diff = s[m + 1][6] - s[m][6];
            s[m][4] = 3.0 * diff - 2.0 * s[m][5] - s[m + 1][5];
            s[m][3] = s[m][5] + s[m + 1][5] - 2.0 * diff;
        }
        s[n][4] = 0.0;
        s[n][3] = 0.0;
        for row in s.iter_mut().skip(1) {
            row[2] = row[5] / delta;
            row[1] = 2.0 * row[4] / delta;
            row[0] = 3.0 * row[3] / delta;
        }

        Ok(Self {
            coeffs: s,
            rdx: 1.0 / delta,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.coeffs.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interval and fraction for abscissa `x`. Both are clamped so that no
    /// `x` reads outside the table.
    #[inline]
    fn locate(&self, x: f64) -> (&SplineCoeffs, f64) {
        let n = self.len() as i64;
        let p = x * self.rdx + 1.0;
        let m = (p as i64).clamp(1, n - 1);
        let frac = (p - m as f64).min(1.0);
        (&self.coeffs[m as usize], frac)
    }

    #[inline]
    pub fn value(&self, x: f64) -> f64 {
        let (c, p) = self.locate(x);
        ((c[3] * p + c[4]) * p + c[5]) * p + c[6]
    }

    #[inline]
    pub fn derivative(&self, x: f64) -> f64 {
        let (c, p) = self.locate(x);
        (c[0] * p + c[1]) * p + c[2]
    }

    #[inline]
    pub fn value_and_derivative(&self, x: f64) -> (f64, f64) {
        let (c, p) = self.locate(x);
        (
            ((c[3] * p + c[4]) * p + c[5]) * p + c[6],
            (c[0] * p + c[1]) * p + c[2],
        )
    }
}

/// Spline tables for `ntypes` particle types.
#[derive(Clone, Debug)]
pub struct EamTables {
    ntypes: usize,
    pub cutmax: f64,
    /// Embedding function per type.
    pub frho: Vec<Spline>,
    /// `rhor[tj * ntypes + ti]` is the density at a type-`ti` particle
    /// caused by a type-`tj` neighbor.
    pub rhor: Vec<Spline>,
    /// `r phi(r)`, symmetric in the type pair.
    pub z2r: Vec<Spline>,
}

impl EamTables {
    /// Builds splines from uniformly spaced samples. `frho` holds one table
    /// per type, `rhor` and `z2r` one per ordered type pair.
    pub fn from_tabulated(
        ntypes: usize,
        drho: f64,
        frho: &[Vec<f64>],
        dr: f64,
        rhor: &[Vec<f64>],
        z2r: &[Vec<f64>],
        cutmax: f64,
    ) -> Result<Self> {
        if ntypes == 0 {
            return Err(MdError::InvalidTable("EAM tables need at least one type".into()));
        }
        if frho.len() != ntypes || rhor.len() != ntypes * ntypes || z2r.len() != ntypes * ntypes {
            return Err(MdError::InvalidTable(format!(
                "expected {ntypes} embedding tables and {} pair tables",
                ntypes * ntypes
            )));
        }
        if !cutmax.is_finite() || cutmax <= 0.0 {
            return Err(MdError::InvalidTable(format!("invalid EAM cutoff {cutmax}")));
        }

        let tables = Self {
            ntypes,
            cutmax,
            frho: frho
                .iter()
                .map(|t| Spline::interpolate(t, drho))
                .collect::<Result<_>>()?,
            rhor: rhor
                .iter()
                .map(|t| Spline::interpolate(t, dr))
                .collect::<Result<_>>()?,
            z2r: z2r
                .iter()
                .map(|t| Spline::interpolate(t, dr))
                .collect::<Result<_>>()?,
        };
        debug!(ntypes, cutmax, "EAM splines built");
        Ok(tables)
    }

    /// Samples analytic functions on `nrho` density and `nr` distance points.
    #[allow(clippy::too_many_arguments)]
    pub fn from_functions(
        ntypes: usize,
        nrho: usize,
        drho: f64,
        nr: usize,
        dr: f64,
        cutmax: f64,
        frho: impl Fn(usize, f64) -> f64,
        rhor: impl Fn(usize, usize, f64) -> f64,
        z2r: impl Fn(usize, usize, f64) -> f64,
    ) -> Result<Self> {
        let frho_tables: Vec<Vec<f64>> = (0..ntypes)
            .map(|t| (0..nrho).map(|k| frho(t, k as f64 * drho)).collect())
            .collect();
        let pair_tables = |f: &dyn Fn(usize, usize, f64) -> f64| -> Vec<Vec<f64>> {
            (0..ntypes * ntypes)
                .map(|idx| {
                    let (ti, tj) = (idx / ntypes, idx % ntypes);
                    (0..nr).map(|k| f(ti, tj, k as f64 * dr)).collect()
                })
                .collect()
        };
        let rhor_tables = pair_tables(&rhor);
        let z2r_tables = pair_tables(&z2r);
        Self::from_tabulated(ntypes, drho, &frho_tables, dr, &rhor_tables, &z2r_tables, cutmax)
    }

    pub fn ntypes(&self) -> usize {
        self.ntypes
    }

    #[inline]
    fn pair(&self, ti: usize, tj: usize) -> usize {
        ti * self.ntypes + tj
    }
}

/// EAM state carried between the two passes.
#[derive(Clone, Debug)]
pub struct Eam {
    pub tables: EamTables,
    /// Electron density of every owned particle.
    pub rho: Vec<f64>,
    /// `F'(rho)` of every owned and ghost particle.
    pub fp: Vec<f64>,
}

impl Eam {
    pub fn new(tables: EamTables) -> Self {
        Self {
            tables,
            rho: Vec::new(),
            fp: Vec::new(),
        }
    }
}

pub fn compute_force_eam(eam: &mut Eam, atom: &mut Atom, list: &NeighborList, stats: &mut Stats) -> f64 {
    let n_local = atom.n_local;
    let _span = info_span!("compute_force_eam", n_local).entered();
    let start = Instant::now();

    if eam.fp.len() < atom.n_max {
        eam.fp.resize(atom.n_max, 0.0);
        eam.rho.resize(atom.n_max, 0.0);
    }
    let tables = &eam.tables;
    let positions = &atom.positions;
    let types = &atom.types;
    let params = &atom.params;
    let min_len = parallel_min_len(n_local);

    // Pass 1: densities and embedding derivatives of owned particles
    eam.rho[..n_local]
        .par_iter_mut()
        .zip(eam.fp[..n_local].par_iter_mut())
        .enumerate()
        .with_min_len(min_len)
        .for_each(|(i, (rho_i, fp_i))| {
            let pos_i = positions.get(i);
            let ti = types[i];
            let mut rho = 0.0;
            for &j in list.neighbors_of(i) {
                let rsq = (pos_i - positions.get(j)).norm_squared();
                let tj = types[j];
                if rsq < params.cutforcesq[params.index(ti, tj)] {
                    rho += tables.rhor[tables.pair(tj, ti)].value(rsq.sqrt());
                }
            }
            *rho_i = rho;
            *fp_i = tables.frho[ti].derivative(rho);
        });

    // Ghosts take F' from their owners before any pair force is formed
    for k in 0..atom.n_ghost {
        eam.fp[n_local + k] = eam.fp[atom.border_map[k]];
    }

    // Pass 2: pair forces
    let fp = &eam.fp;
    let local = atom.forces[..n_local]
        .par_iter_mut()
        .enumerate()
        .with_min_len(min_len)
        .map(|(i, f)| {
            let pos_i = positions.get(i);
            let ti = types[i];
            let neighs = list.neighbors_of(i);
            let mut st = Stats {
                total_force_neighs: neighs.len() as u64,
                total_force_iters: neighs.len().div_ceil(VECTOR_WIDTH) as u64,
                ..Default::default()
            };

            for &j in neighs {
                let del = pos_i - positions.get(j);
                let rsq = del.norm_squared();
                let tj = types[j];
                if rsq >= params.cutforcesq[params.index(ti, tj)] {
                    st.atoms_outside_cutoff += 1;
                    continue;
                }
                st.atoms_within_cutoff += 1;

                let r = rsq.sqrt();
                let recip = 1.0 / r;
                // density at i from j, and at j from i
                let rhojp = tables.rhor[tables.pair(tj, ti)].derivative(r);
                let rhoip = tables.rhor[tables.pair(ti, tj)].derivative(r);
                let (z2, z2p) = tables.z2r[tables.pair(ti, tj)].value_and_derivative(r);

                let phi = z2 * recip;
                let phip = z2p * recip - phi * recip;
                let psip = fp[i] * rhojp + fp[j] * rhoip + phip;
                *f += del * (-psip * recip);
            }
            st
        })
        .reduce(Stats::default, |a, b| a + b);

    *stats += local;
    start.elapsed().as_secs_f64()
}
