use std::ops::{Add, AddAssign};
use tracing::info;

/// Counters filled by the force kernels. Workers keep their own copy and the
/// copies are summed after the parallel region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub total_force_neighs: u64,
    pub total_force_iters: u64,
    pub atoms_within_cutoff: u64,
    pub atoms_outside_cutoff: u64,
    pub clusters_within_cutoff: u64,
    pub clusters_outside_cutoff: u64,
}

impl Add for Stats {
    type Output = Stats;

    fn add(self, rhs: Stats) -> Stats {
        Stats {
            total_force_neighs: self.total_force_neighs + rhs.total_force_neighs,
            total_force_iters: self.total_force_iters + rhs.total_force_iters,
            atoms_within_cutoff: self.atoms_within_cutoff + rhs.atoms_within_cutoff,
            atoms_outside_cutoff: self.atoms_outside_cutoff + rhs.atoms_outside_cutoff,
            clusters_within_cutoff: self.clusters_within_cutoff + rhs.clusters_within_cutoff,
            clusters_outside_cutoff: self.clusters_outside_cutoff + rhs.clusters_outside_cutoff,
        }
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, rhs: Stats) {
        *self = *self + rhs;
    }
}

impl Stats {
    pub fn reset(&mut self) {
        *self = Stats::default();
    }

    /// Fraction of examined particle pairs that were inside the force cutoff.
    pub fn cutoff_efficiency(&self) -> f64 {
        let total = self.atoms_within_cutoff + self.atoms_outside_cutoff;
        if total == 0 {
            0.0
        } else {
            self.atoms_within_cutoff as f64 / total as f64
        }
    }

    pub fn log_summary(&self, n_local: usize, steps: usize) {
        let steps = steps.max(1) as f64;
        let n_local = n_local.max(1) as f64;
        info!(
            avg_neighs_per_atom = self.total_force_neighs as f64 / n_local / steps,
            avg_iters_per_atom = self.total_force_iters as f64 / n_local / steps,
            cutoff_efficiency = self.cutoff_efficiency(),
            clusters_within_cutoff = self.clusters_within_cutoff,
            clusters_outside_cutoff = self.clusters_outside_cutoff,
            "force statistics"
        );
    }
}
