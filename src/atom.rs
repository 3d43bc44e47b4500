//! Particle store: owned particles followed by their ghost images, plus the
//! per-type interaction tables.

use crate::config::DataLayout;
use crate::error::{MdError, Result};
use nalgebra::Vector3;
use std::ops::Range;
use tracing::debug;

/// Storage increment applied whenever the particle arrays are full.
pub const DELTA: usize = 20000;

/// Indexed access to particle positions, independent of memory layout.
pub trait PositionStorage {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, i: usize) -> Vector3<f64>;

    fn set(&mut self, i: usize, pos: Vector3<f64>);

    /// Resizes to `n` slots, keeping existing entries at their indices.
    fn resize(&mut self, n: usize);

    fn layout(&self) -> DataLayout;
}

/// Interleaved `x0 y0 z0 x1 y1 z1 ...` storage.
#[derive(Clone, Debug, Default)]
pub struct AosPositions {
    data: Vec<f64>,
}

impl PositionStorage for AosPositions {
    fn len(&self) -> usize {
        self.data.len() / 3
    }

    #[inline]
    fn get(&self, i: usize) -> Vector3<f64> {
        Vector3::new(self.data[3 * i], self.data[3 * i + 1], self.data[3 * i + 2])
    }

    #[inline]
    fn set(&mut self, i: usize, pos: Vector3<f64>) {
        self.data[3 * i] = pos.x;
        self.data[3 * i + 1] = pos.y;
        self.data[3 * i + 2] = pos.z;
    }

    fn resize(&mut self, n: usize) {
        self.data.resize(3 * n, 0.0);
    }

    fn layout(&self) -> DataLayout {
        DataLayout::Aos
    }
}

/// Separate `x`, `y` and `z` arrays.
#[derive(Clone, Debug, Default)]
pub struct SoaPositions {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl PositionStorage for SoaPositions {
    fn len(&self) -> usize {
        self.x.len()
    }

    #[inline]
    fn get(&self, i: usize) -> Vector3<f64> {
        Vector3::new(self.x[i], self.y[i], self.z[i])
    }

    #[inline]
    fn set(&mut self, i: usize, pos: Vector3<f64>) {
        self.x[i] = pos.x;
        self.y[i] = pos.y;
        self.z[i] = pos.z;
    }

    fn resize(&mut self, n: usize) {
        self.x.resize(n, 0.0);
        self.y.resize(n, 0.0);
        self.z.resize(n, 0.0);
    }

    fn layout(&self) -> DataLayout {
        DataLayout::Soa
    }
}

/// Position storage selected at configuration time.
#[derive(Clone, Debug)]
pub enum Positions {
    Aos(AosPositions),
    Soa(SoaPositions),
}

impl Positions {
    pub fn new(layout: DataLayout) -> Self {
        match layout {
            DataLayout::Aos => Self::Aos(AosPositions::default()),
            DataLayout::Soa => Self::Soa(SoaPositions::default()),
        }
    }
}

impl PositionStorage for Positions {
    fn len(&self) -> usize {
        match self {
            Self::Aos(p) => p.len(),
            Self::Soa(p) => p.len(),
        }
    }

    #[inline]
    fn get(&self, i: usize) -> Vector3<f64> {
        match self {
            Self::Aos(p) => p.get(i),
            Self::Soa(p) => p.get(i),
        }
    }

    #[inline]
    fn set(&mut self, i: usize, pos: Vector3<f64>) {
        match self {
            Self::Aos(p) => p.set(i, pos),
            Self::Soa(p) => p.set(i, pos),
        }
    }

    fn resize(&mut self, n: usize) {
        match self {
            Self::Aos(p) => p.resize(n),
            Self::Soa(p) => p.resize(n),
        }
    }

    fn layout(&self) -> DataLayout {
        match self {
            Self::Aos(p) => p.layout(),
            Self::Soa(p) => p.layout(),
        }
    }
}

/// Symmetric `ntypes x ntypes` pair parameters, row-major.
#[derive(Clone, Debug)]
pub struct TypeParams {
    ntypes: usize,
    pub epsilon: Vec<f64>,
    pub sigma6: Vec<f64>,
    pub cutforcesq: Vec<f64>,
    pub cutneighsq: Vec<f64>,
}

impl TypeParams {
    pub fn uniform(ntypes: usize, epsilon: f64, sigma6: f64, cutforce: f64, cutneigh: f64) -> Self {
        let n = ntypes * ntypes;
        Self {
            ntypes,
            epsilon: vec![epsilon; n],
            sigma6: vec![sigma6; n],
            cutforcesq: vec![cutforce * cutforce; n],
            cutneighsq: vec![cutneigh * cutneigh; n],
        }
    }

    pub fn ntypes(&self) -> usize {
        self.ntypes
    }

    #[inline]
    pub fn index(&self, type_i: usize, type_j: usize) -> usize {
        type_i * self.ntypes + type_j
    }

    /// Sets the LJ parameters of one type pair in both triangle halves.
    pub fn set_pair(&mut self, type_i: usize, type_j: usize, epsilon: f64, sigma6: f64) {
        for idx in [self.index(type_i, type_j), self.index(type_j, type_i)] {
            self.epsilon[idx] = epsilon;
            self.sigma6[idx] = sigma6;
        }
    }

    pub fn max_cutneighsq(&self) -> f64 {
        self.cutneighsq.iter().cloned().fold(0.0, f64::max)
    }

    pub fn max_cutforcesq(&self) -> f64 {
        self.cutforcesq.iter().cloned().fold(0.0, f64::max)
    }
}

#[derive(Clone, Debug)]
pub struct Atom {
    pub n_local: usize,
    pub n_ghost: usize,
    pub n_max: usize,
    pub positions: Positions,
    pub velocities: Vec<Vector3<f64>>,
    pub forces: Vec<Vector3<f64>>,
    pub types: Vec<usize>,
    /// Ghost `k` (particle `n_local + k`) is an image of `border_map[k]`.
    pub border_map: Vec<usize>,
    /// Box translation of ghost `k`, in units of box lengths.
    pub pbc_shift: Vec<Vector3<i32>>,
    pub params: TypeParams,
}

impl Atom {
    pub fn new(layout: DataLayout, params: TypeParams) -> Self {
        Self {
            n_local: 0,
            n_ghost: 0,
            n_max: 0,
            positions: Positions::new(layout),
            velocities: Vec::new(),
            forces: Vec::new(),
            types: Vec::new(),
            border_map: Vec::new(),
            pbc_shift: Vec::new(),
            params,
        }
    }

    pub fn n_all(&self) -> usize {
        self.n_local + self.n_ghost
    }

    pub fn ntypes(&self) -> usize {
        self.params.ntypes()
    }

    /// Extends every per-particle array by [`DELTA`] slots. Indices stay
    /// valid; slices taken before the call must be re-fetched.
    pub fn grow(&mut self) -> usize {
        self.n_max += DELTA;
        let n_max = self.n_max;
        self.positions.resize(n_max);
        self.velocities.resize(n_max, Vector3::zeros());
        self.forces.resize(n_max, Vector3::zeros());
        self.types.resize(n_max, 0);
        self.border_map.resize(n_max, 0);
        self.pbc_shift.resize(n_max, Vector3::zeros());
        debug!(n_max, "grew particle storage");
        n_max
    }

    /// Adds an owned particle and returns its index. Existing ghosts are
    /// discarded since they no longer follow the owned range.
    pub fn append(
        &mut self,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        type_id: usize,
    ) -> Result<usize> {
        if type_id >= self.ntypes() {
            return Err(MdError::InvalidParameter(format!(
                "particle type {type_id} out of range for {} types",
                self.ntypes()
            )));
        }
        self.clear_ghosts();
        if self.n_all() == self.n_max {
            self.grow();
        }
        let i = self.n_local;
        self.positions.set(i, position);
        self.velocities[i] = velocity;
        self.forces[i] = Vector3::zeros();
        self.types[i] = type_id;
        self.n_local += 1;
        Ok(i)
    }

    pub fn clear_ghosts(&mut self) {
        self.n_ghost = 0;
    }

    /// Appends a ghost image of owned particle `source` translated by
    /// `translation`.
    pub fn add_ghost(
        &mut self,
        source: usize,
        shift: Vector3<i32>,
        translation: Vector3<f64>,
    ) -> usize {
        if self.n_all() == self.n_max {
            self.grow();
        }
        let g = self.n_all();
        let k = self.n_ghost;
        let pos = self.positions.get(source) + translation;
        self.positions.set(g, pos);
        self.velocities[g] = self.velocities[source];
        self.forces[g] = Vector3::zeros();
        self.types[g] = self.types[source];
        self.border_map[k] = source;
        self.pbc_shift[k] = shift;
        self.n_ghost += 1;
        g
    }

    /// Owned and ghost index ranges.
    pub fn classify(&self) -> (Range<usize>, Range<usize>) {
        (0..self.n_local, self.n_local..self.n_all())
    }

    #[inline]
    pub fn is_ghost(&self, i: usize) -> bool {
        i >= self.n_local
    }

    /// Owned particle that `i` is (an image of).
    #[inline]
    pub fn owner(&self, i: usize) -> usize {
        if i < self.n_local {
            i
        } else {
            self.border_map[i - self.n_local]
        }
    }

    #[inline]
    pub fn position(&self, i: usize) -> Vector3<f64> {
        self.positions.get(i)
    }

    pub fn set_position(&mut self, i: usize, pos: Vector3<f64>) {
        self.positions.set(i, pos);
    }

    /// Copies of the owned positions, in index order.
    pub fn local_positions(&self) -> Vec<Vector3<f64>> {
        (0..self.n_local).map(|i| self.positions.get(i)).collect()
    }

    pub fn zero_forces(&mut self) {
        let n_all = self.n_all();
        self.forces[..n_all].fill(Vector3::zeros());
    }

    /// Sum of the forces on owned particles.
    pub fn net_force(&self) -> Vector3<f64> {
        self.forces[..self.n_local]
            .iter()
            .fold(Vector3::zeros(), |acc, f| acc + f)
    }
}
