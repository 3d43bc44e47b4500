//! Cluster-pair lists.
//!
//! Particles of one bin are sorted along z and cut into clusters of
//! `CLUSTER_M`. Each i-cluster keeps the j-clusters whose bounding boxes come
//! within the neighbor cutoff, together with a bitmask of the interacting
//! slot pairs.

use super::masks::{Diagonal, ExclusionMasks};
use super::{NeighborBuilder, half_admits};
use crate::atom::{Atom, PositionStorage};
use crate::binning::BinGrid;
use crate::config::{self, CLUSTER_M, CLUSTER_N, NEIGHBOR_GROWTH_FACTOR};
use crate::error::Result;
use crate::force::ReactionScratch;
use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::{debug, info_span};

const _: () = assert!(CLUSTER_M == CLUSTER_N);

/// Values per cluster in `cl_x`, `cl_v` and `cl_f`: x lanes, y lanes, z lanes.
pub const CL_STRIDE: usize = 3 * CLUSTER_M;
pub const CL_X_OFFSET: usize = 0;
pub const CL_Y_OFFSET: usize = CLUSTER_M;
pub const CL_Z_OFFSET: usize = 2 * CLUSTER_M;

/// Coordinate stored in dummy slots.
pub const DUMMY_COORD: f64 = f64::INFINITY;

#[derive(Clone, Debug)]
pub struct Cluster {
    pub natoms: usize,
    pub bbmin: Vector3<f64>,
    pub bbmax: Vector3<f64>,
    /// Grid coordinate of the bin the cluster was cut from.
    pub bin: Vector3<usize>,
}

impl Cluster {
    /// Squared distance between two bounding boxes, zero when they overlap.
    pub fn bbox_distance_sq(&self, other: &Cluster) -> f64 {
        (0..3)
            .map(|k| {
                let gap = (other.bbmin[k] - self.bbmax[k])
                    .max(self.bbmin[k] - other.bbmax[k])
                    .max(0.0);
                gap * gap
            })
            .sum()
    }
}

/// Clustered copy of the particle store. Local clusters come first, ghost
/// clusters after them.
#[derive(Clone, Debug, Default)]
pub struct ClusterLayout {
    pub clusters: Vec<Cluster>,
    pub n_local_clusters: usize,
    pub n_ghost_clusters: usize,
    /// Particle held by each slot, `None` for dummy slots.
    pub slot_atom: Vec<Option<usize>>,
    pub cl_x: Vec<f64>,
    pub cl_v: Vec<f64>,
    pub cl_f: Vec<f64>,
    pub cl_t: Vec<usize>,
    /// Clusters cut from each bin, by bin rank.
    bin_clusters: Vec<Vec<usize>>,
}

impl ClusterLayout {
    pub fn new(total_bins: usize) -> Self {
        Self {
            bin_clusters: vec![Vec::new(); total_bins],
            ..Default::default()
        }
    }

    pub fn build(atom: &Atom, bins: &BinGrid) -> Self {
        let _span = info_span!("ClusterLayout::build", n_all = atom.n_all()).entered();
        let mut layout = Self::new(bins.total_bins());

        for ghosts in [false, true] {
            for rank in 0..bins.total_bins() {
                let mut members: Vec<usize> = bins
                    .atoms_in_rank(rank)
                    .iter()
                    .copied()
                    .filter(|&i| atom.is_ghost(i) == ghosts)
                    .collect();
                members.sort_by(|&a, &b| {
                    atom.positions.get(a).z.total_cmp(&atom.positions.get(b).z)
                });
                for chunk in members.chunks(CLUSTER_M) {
                    let bin = bins.coord2bin(&atom.positions.get(chunk[0]));
                    layout.push_cluster(atom, bin, rank, chunk);
                }
            }
        }

        debug!(
            n_local_clusters = layout.n_local_clusters,
            n_ghost_clusters = layout.n_ghost_clusters,
            "clusters built"
        );
        layout
    }

    /// Appends one cluster made of `members`, which must be all owned or all
    /// ghost particles. Owned clusters must precede ghost clusters.
    pub fn push_cluster(&mut self, atom: &Atom, bin: Vector3<usize>, rank: usize, members: &[usize]) {
        debug_assert!(!members.is_empty() && members.len() <= CLUSTER_M);
        let ci = self.clusters.len();
        if atom.is_ghost(members[0]) {
            self.n_ghost_clusters += 1;
        } else {
            debug_assert_eq!(self.n_ghost_clusters, 0);
            self.n_local_clusters += 1;
        }

        self.cl_x.extend_from_slice(&[DUMMY_COORD; CL_STRIDE]);
        self.cl_v.extend_from_slice(&[0.0; CL_STRIDE]);
        self.cl_f.extend_from_slice(&[0.0; CL_STRIDE]);
        self.cl_t.extend_from_slice(&[0; CLUSTER_M]);
        self.slot_atom.extend_from_slice(&[None; CLUSTER_M]);

        let mut cluster = Cluster {
            natoms: members.len(),
            bbmin: Vector3::zeros(),
            bbmax: Vector3::zeros(),
            bin,
        };
        for (lane, &a) in members.iter().enumerate() {
            self.slot_atom[ci * CLUSTER_M + lane] = Some(a);
            self.cl_t[ci * CLUSTER_M + lane] = atom.types[a];
        }
        refresh_cluster(
            &mut cluster,
            &mut self.cl_x[ci * CL_STRIDE..(ci + 1) * CL_STRIDE],
            &mut self.cl_v[ci * CL_STRIDE..(ci + 1) * CL_STRIDE],
            &self.slot_atom[ci * CLUSTER_M..(ci + 1) * CLUSTER_M],
            atom,
        );
        self.clusters.push(cluster);

        if rank >= self.bin_clusters.len() {
            self.bin_clusters.resize(rank + 1, Vec::new());
        }
        self.bin_clusters[rank].push(ci);
    }

    pub fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn clusters_in_bin(&self, rank: usize) -> &[usize] {
        self.bin_clusters.get(rank).map_or(&[], |v| v.as_slice())
    }

    #[inline]
    pub fn cluster_x(&self, ci: usize) -> &[f64] {
        &self.cl_x[ci * CL_STRIDE..(ci + 1) * CL_STRIDE]
    }

    #[inline]
    pub fn slot(&self, ci: usize, lane: usize) -> Option<usize> {
        self.slot_atom[ci * CLUSTER_M + lane]
    }

    /// Copies current positions and velocities into the cluster arrays and
    /// recomputes the bounding boxes. Membership does not change.
    pub fn update_positions(&mut self, atom: &Atom) {
        let min_len = config::parallel_min_len(self.clusters.len());
        self.cl_x
            .par_chunks_mut(CL_STRIDE)
            .zip(self.cl_v.par_chunks_mut(CL_STRIDE))
            .zip(self.clusters.par_iter_mut())
            .zip(self.slot_atom.par_chunks(CLUSTER_M))
            .with_min_len(min_len)
            .for_each(|(((x, v), cluster), slots)| refresh_cluster(cluster, x, v, slots, atom));
    }

    pub fn zero_forces(&mut self) {
        self.cl_f.fill(0.0);
    }

    /// Adds the cluster forces onto the particle forces. Ghost slots are
    /// folded onto their owners.
    pub fn scatter_forces(&self, atom: &mut Atom) {
        for (ci, f) in self.cl_f.chunks(CL_STRIDE).enumerate() {
            for lane in 0..CLUSTER_M {
                if let Some(a) = self.slot(ci, lane) {
                    let owner = atom.owner(a);
                    atom.forces[owner] += Vector3::new(
                        f[CL_X_OFFSET + lane],
                        f[CL_Y_OFFSET + lane],
                        f[CL_Z_OFFSET + lane],
                    );
                }
            }
        }
    }

    /// Per-slot half-convention mask between owned cluster `ci` and ghost
    /// cluster `cj`.
    fn half_key_mask(&self, atom: &Atom, ci: usize, cj: usize) -> u16 {
        let mut mask = 0u16;
        for ii in 0..CLUSTER_M {
            let Some(a) = self.slot(ci, ii) else { continue };
            for jj in 0..CLUSTER_N {
                if let Some(b) = self.slot(cj, jj) {
                    if half_admits(atom, a, b) {
                        mask |= 1 << (ii * CLUSTER_N + jj);
                    }
                }
            }
        }
        mask
    }
}

fn refresh_cluster(
    cluster: &mut Cluster,
    x: &mut [f64],
    v: &mut [f64],
    slots: &[Option<usize>],
    atom: &Atom,
) {
    let mut bbmin = Vector3::repeat(f64::INFINITY);
    let mut bbmax = Vector3::repeat(f64::NEG_INFINITY);
    for (lane, slot) in slots.iter().enumerate() {
        let Some(a) = *slot else { continue };
        let p = atom.positions.get(a);
        let vel = atom.velocities[a];
        for k in 0..3 {
            x[k * CLUSTER_M + lane] = p[k];
            v[k * CLUSTER_M + lane] = vel[k];
        }
        bbmin = bbmin.inf(&p);
        bbmax = bbmax.sup(&p);
    }
    cluster.bbmin = bbmin;
    cluster.bbmax = bbmax;
}

/// Borrowed j-cluster rows of a [`ClusterPairList`].
#[derive(Clone, Copy)]
pub struct PairRows<'a> {
    maxneighs: usize,
    numneigh: &'a [usize],
    neighbors: &'a [usize],
    imasks: &'a [u16],
}

impl<'a> PairRows<'a> {
    pub fn numneigh(self, ci: usize) -> usize {
        self.numneigh[ci]
    }

    pub fn entries(self, ci: usize) -> impl Iterator<Item = (usize, u16)> + 'a {
        let (neighbors, imasks) = (self.neighbors, self.imasks);
        let start = ci * self.maxneighs;
        let end = start + self.numneigh[ci];
        neighbors[start..end]
            .iter()
            .copied()
            .zip(imasks[start..end].iter().copied())
    }
}

/// j-cluster lists of the owned clusters, stored as rows of `maxneighs`.
#[derive(Clone, Debug)]
pub struct ClusterPairList {
    pub layout: ClusterLayout,
    pub maxneighs: usize,
    pub numneigh: Vec<usize>,
    pub neighbors: Vec<usize>,
    /// Interaction mask of each entry, see [`ExclusionMasks`].
    pub imasks: Vec<u16>,
    /// Worker buffers of the half-list force pass.
    pub(crate) reactions: ReactionScratch,
    half: bool,
}

impl ClusterPairList {
    pub fn new(half: bool) -> Self {
        Self {
            layout: ClusterLayout::default(),
            maxneighs: config::get_initial_maxneighs(),
            numneigh: Vec::new(),
            neighbors: Vec::new(),
            imasks: Vec::new(),
            reactions: ReactionScratch::default(),
            half,
        }
    }

    /// Entries of i-cluster `ci` as `(j-cluster, mask)`.
    pub fn entries_of(&self, ci: usize) -> impl Iterator<Item = (usize, u16)> + '_ {
        self.rows().entries(ci)
    }

    pub fn rows(&self) -> PairRows<'_> {
        PairRows {
            maxneighs: self.maxneighs,
            numneigh: &self.numneigh,
            neighbors: &self.neighbors,
            imasks: &self.imasks,
        }
    }

    /// The cluster arrays for writing together with the rows for reading.
    pub fn layout_and_rows(&mut self) -> (&mut ClusterLayout, PairRows<'_>) {
        let rows = PairRows {
            maxneighs: self.maxneighs,
            numneigh: &self.numneigh,
            neighbors: &self.neighbors,
            imasks: &self.imasks,
        };
        (&mut self.layout, rows)
    }

    /// Replaces all rows with explicit entries. Used for synthetic lists.
    pub fn set_rows(&mut self, rows: Vec<Vec<(usize, u16)>>) {
        self.maxneighs = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
        self.numneigh = rows.iter().map(Vec::len).collect();
        self.neighbors = vec![0; rows.len() * self.maxneighs];
        self.imasks = vec![0; rows.len() * self.maxneighs];
        for (ci, row) in rows.iter().enumerate() {
            for (k, &(cj, imask)) in row.iter().enumerate() {
                self.neighbors[ci * self.maxneighs + k] = cj;
                self.imasks[ci * self.maxneighs + k] = imask;
            }
        }
    }

    fn build_pass(&mut self, atom: &Atom, bins: &BinGrid) -> usize {
        let maxneighs = self.maxneighs;
        let half = self.half;
        let layout = &self.layout;
        let cutneighsq = atom.params.max_cutneighsq();
        let min_len = config::parallel_min_len(layout.n_local_clusters);

        self.neighbors
            .par_chunks_mut(maxneighs)
            .zip(self.imasks.par_chunks_mut(maxneighs))
            .zip(self.numneigh.par_iter_mut())
            .enumerate()
            .with_min_len(min_len)
            .map(|(ci, ((row, mrow), count))| {
                *count = search_cluster(layout, atom, bins, ci, half, cutneighsq, row, mrow);
                *count
            })
            .max()
            .unwrap_or(0)
    }
}

#[allow(clippy::too_many_arguments)]
fn search_cluster(
    layout: &ClusterLayout,
    atom: &Atom,
    bins: &BinGrid,
    ci: usize,
    half: bool,
    cutneighsq: f64,
    row: &mut [usize],
    mrow: &mut [u16],
) -> usize {
    let masks = ExclusionMasks::global();
    let icluster = &layout.clusters[ci];
    let mut n = 0;

    for c in bins.stencil(&icluster.bin) {
        for &cj in layout.clusters_in_bin(bins.rank_of(&c)) {
            // owned pairs are stored on the lower cluster index
            if half && cj < ci {
                continue;
            }
            let jcluster = &layout.clusters[cj];
            if icluster.bbox_distance_sq(jcluster) > cutneighsq {
                continue;
            }
            let diag = match (cj == ci, half) {
                (false, _) => Diagonal::None,
                (true, false) => Diagonal::Full,
                (true, true) => Diagonal::Half,
            };
            let mut imask = masks.lookup(icluster.natoms, jcluster.natoms, diag);
            if half && cj >= layout.n_local_clusters {
                imask &= layout.half_key_mask(atom, ci, cj);
            }
            if imask == 0 {
                continue;
            }
            if n < row.len() {
                row[n] = cj;
                mrow[n] = imask;
            }
            n += 1;
        }
    }
    n
}

impl NeighborBuilder for ClusterPairList {
    fn build(&mut self, atom: &Atom, bins: &BinGrid) -> Result<()> {
        let _span = info_span!("ClusterPairList::build", n_local = atom.n_local, half = self.half)
            .entered();
        self.layout = ClusterLayout::build(atom, bins);
        let n_local_clusters = self.layout.n_local_clusters;

        loop {
            self.numneigh.clear();
            self.numneigh.resize(n_local_clusters, 0);
            self.neighbors.resize(n_local_clusters * self.maxneighs, 0);
            self.imasks.resize(n_local_clusters * self.maxneighs, 0);

            let max_count = self.build_pass(atom, bins);
            if max_count <= self.maxneighs {
                break;
            }
            self.maxneighs = ((max_count as f64 * NEIGHBOR_GROWTH_FACTOR) as usize).max(max_count);
            debug!(maxneighs = self.maxneighs, "cluster list overflow, rebuilding");
        }
        Ok(())
    }

    fn prune(&mut self, atom: &Atom) {
        let _span = info_span!("ClusterPairList::prune").entered();
        self.layout.update_positions(atom);

        let maxneighs = self.maxneighs;
        let layout = &self.layout;
        let cutforcesq = atom.params.max_cutforcesq();
        let min_len = config::parallel_min_len(layout.n_local_clusters);

        self.neighbors
            .par_chunks_mut(maxneighs)
            .zip(self.imasks.par_chunks_mut(maxneighs))
            .zip(self.numneigh.par_iter_mut())
            .enumerate()
            .with_min_len(min_len)
            .for_each(|(ci, ((row, mrow), count))| {
                let icluster = &layout.clusters[ci];
                let mut kept = 0;
                for k in 0..*count {
                    let cj = row[k];
                    if icluster.bbox_distance_sq(&layout.clusters[cj]) <= cutforcesq {
                        row[kept] = cj;
                        mrow[kept] = mrow[k];
                        kept += 1;
                    }
                }
                *count = kept;
            });
    }

    fn pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for ci in 0..self.layout.n_local_clusters {
            for (cj, imask) in self.entries_of(ci) {
                for ii in 0..CLUSTER_M {
                    let bits = ExclusionMasks::row_bits(imask, ii);
                    for jj in 0..CLUSTER_N {
                        if bits & (1 << jj) == 0 {
                            continue;
                        }
                        if let (Some(a), Some(b)) = (self.layout.slot(ci, ii), self.layout.slot(cj, jj)) {
                            pairs.push((a, b));
                        }
                    }
                }
            }
        }
        pairs
    }

    fn num_entries(&self) -> usize {
        self.numneigh.iter().sum()
    }

    fn is_half(&self) -> bool {
        self.half
    }
}
