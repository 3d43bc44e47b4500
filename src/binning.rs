use crate::atom::{Atom, PositionStorage};
use crate::error::{MdError, Result};
use nalgebra::Vector3;
use tracing::info_span;

pub struct BinGrid {
    /// particles[slot] = particle index, grouped by bin rank
    particles: Vec<usize>,
    /// bin_starts[bin_rank] = first slot of the bin in `particles`
    bin_starts: Vec<usize>,
    /// Maps linear bin index (bx + nx*(by + ny*bz)) to Morton rank
    bin_ranks: Vec<usize>,
    /// Bin of every particle, indexed by particle.
    particle_bins: Vec<usize>,
    lo: Vector3<f64>,
    bin_size: Vector3<f64>,
    num_bins: Vector3<usize>,
}

impl BinGrid {
    /// Bins all owned and ghost particles. Bins are at least `cutneigh` wide
    /// so every partner within `cutneigh` sits in the 27-bin stencil.
    pub fn build(atom: &Atom, cutneigh: f64) -> Result<Self> {
        let n_all = atom.n_all();
        let _span = info_span!("BinGrid::build", n_all = n_all).entered();

        if !cutneigh.is_finite() || cutneigh <= 0.0 {
            return Err(MdError::InvalidParameter(
                "neighbor cutoff must be positive and finite".into(),
            ));
        }

        // 1. Bounding box of owned + ghost particles
        let mut lo = Vector3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut hi = Vector3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for i in 0..n_all {
            let p = atom.positions.get(i);
            lo = lo.inf(&p);
            hi = hi.sup(&p);
        }
        if n_all == 0 {
            lo = Vector3::zeros();
            hi = Vector3::zeros();
        }
        let extent = hi - lo;
        if extent.iter().any(|e| !e.is_finite()) {
            return Err(MdError::EmptyGrid {
                extent: [extent.x, extent.y, extent.z],
                bin_size: cutneigh,
            });
        }

        // 2. Grid dimensions
        let nx = (extent.x / cutneigh).floor() as usize;
        let ny = (extent.y / cutneigh).floor() as usize;
        let nz = (extent.z / cutneigh).floor() as usize;
        let num_bins = Vector3::new(nx.max(1), ny.max(1), nz.max(1));
        let bin_size = Vector3::new(
            (extent.x / num_bins.x as f64).max(cutneigh),
            (extent.y / num_bins.y as f64).max(cutneigh),
            (extent.z / num_bins.z as f64).max(cutneigh),
        );
        let total_bins = num_bins.x * num_bins.y * num_bins.z;
        if total_bins == 0 {
            return Err(MdError::EmptyGrid {
                extent: [extent.x, extent.y, extent.z],
                bin_size: cutneigh,
            });
        }

        // 3. Morton ranks for bins, so neighboring bins are close in memory
        let mut bin_ranks = vec![0; total_bins];
        {
            let _s = info_span!("compute_bin_ranks").entered();
            let mut bin_morton: Vec<(u64, usize)> = (0..total_bins)
                .map(|i| {
                    let bx = i % num_bins.x;
                    let by = (i / num_bins.x) % num_bins.y;
                    let bz = i / (num_bins.x * num_bins.y);
                    (
                        interleave_3(bx as u64)
                            | (interleave_3(by as u64) << 1)
                            | (interleave_3(bz as u64) << 2),
                        i,
                    )
                })
                .collect();
            bin_morton.sort_unstable_by_key(|&(z, _)| z);
            for (rank, &(_z, linear_idx)) in bin_morton.iter().enumerate() {
                bin_ranks[linear_idx] = rank;
            }
        }

        let mut grid = Self {
            particles: Vec::new(),
            bin_starts: Vec::new(),
            bin_ranks,
            particle_bins: Vec::with_capacity(n_all),
            lo,
            bin_size,
            num_bins,
        };

        // 4. Bin counts
        let mut counts = vec![0; total_bins];
        for i in 0..n_all {
            let b = grid.coord2bin(&atom.positions.get(i));
            let rank = grid.bin_ranks[grid.linear_index(&b)];
            grid.particle_bins.push(rank);
            counts[rank] += 1;
        }

        let mut bin_starts = vec![0; total_bins + 1];
        let mut accum = 0;
        for i in 0..total_bins {
            bin_starts[i] = accum;
            accum += counts[i];
        }
        bin_starts[total_bins] = accum;

        // 5. Fill in insertion order
        let mut particles = vec![0; n_all];
        let mut current_fill = bin_starts.clone();
        {
            let _s = info_span!("bin_fill").entered();
            for (i, &rank) in grid.particle_bins.iter().enumerate() {
                particles[current_fill[rank]] = i;
                current_fill[rank] += 1;
            }
        }

        grid.particles = particles;
        grid.bin_starts = bin_starts;
        Ok(grid)
    }

    pub fn num_bins(&self) -> Vector3<usize> {
        self.num_bins
    }

    pub fn total_bins(&self) -> usize {
        self.num_bins.x * self.num_bins.y * self.num_bins.z
    }

    pub fn bin_size(&self) -> Vector3<f64> {
        self.bin_size
    }

    /// Grid coordinate of a position, clamped to the grid.
    pub fn coord2bin(&self, pos: &Vector3<f64>) -> Vector3<usize> {
        let rel = (pos - self.lo).component_div(&self.bin_size);
        Vector3::new(
            (rel.x.max(0.0) as usize).min(self.num_bins.x - 1),
            (rel.y.max(0.0) as usize).min(self.num_bins.y - 1),
            (rel.z.max(0.0) as usize).min(self.num_bins.z - 1),
        )
    }

    #[inline]
    fn linear_index(&self, b: &Vector3<usize>) -> usize {
        b.x + self.num_bins.x * (b.y + self.num_bins.y * b.z)
    }

    /// Storage rank of the bin at grid coordinate `b`.
    pub fn rank_of(&self, b: &Vector3<usize>) -> usize {
        self.bin_ranks[self.linear_index(b)]
    }

    /// Rank of the bin that particle `i` was assigned to.
    pub fn bin_of(&self, i: usize) -> usize {
        self.particle_bins[i]
    }

    pub fn get_atoms_in_bin(&self, bx: usize, by: usize, bz: usize) -> &[usize] {
        if bx >= self.num_bins.x || by >= self.num_bins.y || bz >= self.num_bins.z {
            return &[];
        }
        self.atoms_in_rank(self.rank_of(&Vector3::new(bx, by, bz)))
    }

    pub fn atoms_in_rank(&self, rank: usize) -> &[usize] {
        &self.particles[self.bin_starts[rank]..self.bin_starts[rank + 1]]
    }

    /// The up to 27 bins around `b` (itself included), clipped at the grid edge.
    pub fn stencil(&self, b: &Vector3<usize>) -> impl Iterator<Item = Vector3<usize>> + '_ {
        let b = b.map(|v| v as i64);
        let n = self.num_bins.map(|v| v as i64);
        (-1..=1i64).flat_map(move |dz| {
            (-1..=1i64).flat_map(move |dy| {
                (-1..=1i64).filter_map(move |dx| {
                    let c = Vector3::new(b.x + dx, b.y + dy, b.z + dz);
                    let inside = (0..3).all(|k| c[k] >= 0 && c[k] < n[k]);
                    inside.then(|| c.map(|v| v as usize))
                })
            })
        })
    }
}

fn interleave_3(mut x: u64) -> u64 {
    x &= 0x1fffff;
    x = (x | x << 32) & 0x1f00000000ffffu64;
    x = (x | x << 16) & 0x1f0000ff0000ffu64;
    x = (x | x << 8) & 0x100f00f00f00f00fu64;
    x = (x | x << 4) & 0x10c30c30c30c30c3u64;
    x = (x | x << 2) & 0x1249249249249249u64;
    x
}
