//! Short-range force kernels.
//!
//! Kernels add into `Atom::forces`; callers zero the forces before a step.
//! Every kernel returns its wall time in seconds.

pub mod eam;
pub mod lj;
pub mod lj_cluster;

pub use eam::{Eam, EamTables};

use crate::atom::Atom;
use crate::config::{ForceField, KernelVariant, Parameter, get_parallel_threshold, parallel_min_len};
use crate::error::{MdError, Result};
use crate::neighbor::{NeighborBuilder, Neighbors};
use crate::stats::Stats;
use nalgebra::Vector3;
use rayon::prelude::*;
use std::ops::Range;

/// Lennard-Jones force divided by the distance: `48 eps s6/r^6 (s6/r^6 - 0.5) / r^2`.
#[inline]
pub fn lj_force_over_r(rsq: f64, sigma6: f64, epsilon: f64) -> f64 {
    let sr2 = 1.0 / rsq;
    let sr6 = sr2 * sr2 * sr2 * sigma6;
    48.0 * sr6 * (sr6 - 0.5) * sr2 * epsilon
}

/// Reaction buffers of the half-list passes, one flat buffer per rayon worker.
/// Lists keep one of these between force calls so the buffers are allocated
/// once and only zeroed afterwards.
#[derive(Clone, Debug, Default)]
pub struct ReactionScratch {
    buffers: Vec<Vec<f64>>,
}

impl ReactionScratch {
    /// Splits `0..n` into one contiguous range per worker and runs `body` on
    /// each range with that worker's buffer, zeroed to `len` values. Small
    /// loops run as a single range.
    pub(crate) fn run<F>(&mut self, n: usize, len: usize, body: F) -> Stats
    where
        F: Fn(Range<usize>, &mut [f64]) -> Stats + Sync,
    {
        let workers = if n < get_parallel_threshold() {
            1
        } else {
            rayon::current_num_threads().min(n).max(1)
        };
        let chunk = n.div_ceil(workers).max(1);
        self.buffers.resize_with(workers, Vec::new);

        self.buffers
            .par_iter_mut()
            .enumerate()
            .map(|(w, buf)| {
                buf.clear();
                buf.resize(len, 0.0);
                body((w * chunk).min(n)..((w + 1) * chunk).min(n), buf.as_mut_slice())
            })
            .reduce(Stats::default, |a, b| a + b)
    }

    /// Sum of value `k` over all worker buffers.
    #[inline]
    fn total(&self, k: usize) -> f64 {
        self.buffers.iter().map(|b| b[k]).sum()
    }

    /// Sum of the three values of particle `i` in a Verlet-style buffer.
    #[inline]
    fn vector(&self, i: usize) -> Vector3<f64> {
        Vector3::new(self.total(3 * i), self.total(3 * i + 1), self.total(3 * i + 2))
    }

    /// Overwrites `out` with the element-wise sum of the worker buffers.
    pub(crate) fn reduce_into(&self, out: &mut [f64]) {
        let min_len = parallel_min_len(out.len());
        out.par_iter_mut()
            .enumerate()
            .with_min_len(min_len)
            .for_each(|(k, o)| *o = self.total(k));
    }
}

/// Adds reduced reactions onto the particle forces, folding ghost entries
/// onto their owners. Runs after the parallel pass.
pub(crate) fn apply_reactions(atom: &mut Atom, reactions: &ReactionScratch) {
    let n_local = atom.n_local;
    atom.forces[..n_local]
        .par_iter_mut()
        .enumerate()
        .with_min_len(parallel_min_len(n_local))
        .for_each(|(i, f)| *f += reactions.vector(i));
    for k in 0..atom.n_ghost {
        let owner = atom.border_map[k];
        atom.forces[owner] += reactions.vector(n_local + k);
    }
}

/// Runs the kernel selected by `param` over the current lists.
pub fn compute_force(
    param: &Parameter,
    atom: &mut Atom,
    neighbors: &mut Neighbors,
    eam: Option<&mut Eam>,
    stats: &mut Stats,
) -> Result<f64> {
    match (param.force_field, neighbors) {
        (ForceField::LennardJones, Neighbors::Verlet(list)) => {
            Ok(lj::compute_force_lj(atom, list, param.variant, stats))
        }
        (ForceField::LennardJones, Neighbors::Cluster(list)) => {
            Ok(lj_cluster::compute_force_lj_cluster(atom, list, param.variant, stats))
        }
        (ForceField::Eam, Neighbors::Verlet(list)) => {
            if param.variant != KernelVariant::Scalar || list.is_half() {
                return Err(MdError::UnsupportedCombination(
                    "the EAM kernel runs scalar over full Verlet lists".into(),
                ));
            }
            let eam = eam.ok_or_else(|| {
                MdError::InvalidParameter("EAM force field selected without tables".into())
            })?;
            Ok(eam::compute_force_eam(eam, atom, list, stats))
        }
        (ForceField::Eam, Neighbors::Cluster(_)) => Err(MdError::UnsupportedCombination(
            "the EAM potential requires Verlet neighbor lists".into(),
        )),
    }
}
