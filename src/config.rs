use crate::error::{MdError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

include!(concat!(env!("OUT_DIR"), "/tuned_constants.rs"));

/// Number of particles per i-cluster.
pub const CLUSTER_M: usize = 4;
/// Number of particles per j-cluster.
pub const CLUSTER_N: usize = 4;
/// Lanes in one SIMD register of the vectorized kernels (`wide::f64x4`).
pub const VECTOR_WIDTH: usize = 4;

/// Factor applied to the largest observed neighbor count when a list overflows.
pub const NEIGHBOR_GROWTH_FACTOR: f64 = 1.2;

/// Target number of rayon tasks per worker thread for list builds and kernels.
pub const PARALLEL_TASKS_PER_THREAD: usize = 4;

static PARALLEL_THRESHOLD_VALUE: AtomicUsize = AtomicUsize::new(PARALLEL_THRESHOLD);
static INITIAL_MAXNEIGHS_VALUE: AtomicUsize = AtomicUsize::new(INITIAL_MAXNEIGHS);

pub fn get_parallel_threshold() -> usize {
    PARALLEL_THRESHOLD_VALUE.load(Ordering::Relaxed)
}

pub fn set_parallel_threshold(val: usize) {
    PARALLEL_THRESHOLD_VALUE.store(val, Ordering::Relaxed);
}

/// Minimum chunk length for a parallel loop over `n` items. Below the
/// parallel threshold the whole loop runs as a single task.
pub fn parallel_min_len(n: usize) -> usize {
    if n < get_parallel_threshold() {
        n.max(1)
    } else {
        (n / (rayon::current_num_threads() * PARALLEL_TASKS_PER_THREAD)).max(1)
    }
}

pub fn get_initial_maxneighs() -> usize {
    INITIAL_MAXNEIGHS_VALUE.load(Ordering::Relaxed)
}

pub fn set_initial_maxneighs(val: usize) {
    // A zero-capacity list would regrow on every build.
    INITIAL_MAXNEIGHS_VALUE.store(val.max(1), Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceField {
    LennardJones,
    Eam,
}

impl std::str::FromStr for ForceField {
    type Err = MdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lj" => Ok(Self::LennardJones),
            "eam" => Ok(Self::Eam),
            other => Err(MdError::InvalidParameter(format!(
                "unknown force field '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborStrategy {
    /// One list of partner particles per owned particle.
    Verlet,
    /// One list of j-clusters per i-cluster.
    ClusterPair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelVariant {
    Scalar,
    Simd,
}

/// Memory layout of the position array. Velocities and forces are not affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLayout {
    Aos,
    Soa,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub force_field: ForceField,
    pub strategy: NeighborStrategy,
    pub variant: KernelVariant,
    pub layout: DataLayout,
    pub epsilon: f64,
    pub sigma6: f64,
    pub rho: f64,
    pub ntypes: usize,
    pub ntimes: usize,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Box lengths. Set by the lattice builder or by the caller for read-in systems.
    pub xprd: f64,
    pub yprd: f64,
    pub zprd: f64,
    pub pbc: [bool; 3],
    pub cutforce: f64,
    pub skin: f64,
    pub mass: f64,
    pub dt: f64,
    pub half_neigh: bool,
    pub reneigh_every: usize,
    pub prune_every: usize,
}

impl Default for Parameter {
    fn default() -> Self {
        Self {
            force_field: ForceField::LennardJones,
            strategy: NeighborStrategy::Verlet,
            variant: KernelVariant::Scalar,
            layout: DataLayout::Soa,
            epsilon: 1.0,
            sigma6: 1.0,
            rho: 0.8442,
            ntypes: 4,
            ntimes: 200,
            nx: 32,
            ny: 32,
            nz: 32,
            xprd: 0.0,
            yprd: 0.0,
            zprd: 0.0,
            pbc: [true, true, true],
            cutforce: 2.5,
            skin: 0.3,
            mass: 1.0,
            dt: 0.005,
            half_neigh: false,
            reneigh_every: 20,
            prune_every: 1000,
        }
    }
}

impl Parameter {
    pub fn cutneigh(&self) -> f64 {
        self.cutforce + self.skin
    }

    /// FCC lattice constant for the configured density.
    pub fn lattice(&self) -> f64 {
        (4.0 / self.rho).powf(1.0 / 3.0)
    }

    pub fn box_lengths(&self) -> [f64; 3] {
        [self.xprd, self.yprd, self.zprd]
    }

    /// Checks scalar ranges and rejects kernel combinations that have no
    /// implementation. Called once before any step runs.
    pub fn validate(&self) -> Result<()> {
        if !self.cutforce.is_finite() || self.cutforce <= 0.0 {
            return Err(MdError::InvalidParameter(
                "cutforce must be positive and finite".into(),
            ));
        }
        if !self.skin.is_finite() || self.skin < 0.0 {
            return Err(MdError::InvalidParameter(
                "skin must be non-negative and finite".into(),
            ));
        }
        if self.ntypes == 0 {
            return Err(MdError::InvalidParameter("ntypes must be at least 1".into()));
        }
        if self.reneigh_every == 0 || self.prune_every == 0 {
            return Err(MdError::InvalidParameter(
                "reneigh_every and prune_every must be at least 1".into(),
            ));
        }
        if self.force_field == ForceField::Eam {
            if self.variant == KernelVariant::Simd {
                return Err(MdError::UnsupportedCombination(
                    "the EAM potential has no vectorized kernel".into(),
                ));
            }
            if self.strategy == NeighborStrategy::ClusterPair {
                return Err(MdError::UnsupportedCombination(
                    "the EAM potential requires Verlet neighbor lists".into(),
                ));
            }
            if self.half_neigh {
                return Err(MdError::UnsupportedCombination(
                    "the EAM density pass requires full neighbor lists".into(),
                ));
            }
        }
        Ok(())
    }
}
