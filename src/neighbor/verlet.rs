use super::{NeighborBuilder, half_admits};
use crate::atom::{Atom, PositionStorage};
use crate::binning::BinGrid;
use crate::config::{self, NEIGHBOR_GROWTH_FACTOR};
use crate::error::Result;
use crate::force::ReactionScratch;
use rayon::prelude::*;
use tracing::{debug, info_span};

/// Per-particle Verlet list stored as fixed-width rows of `maxneighs`.
#[derive(Clone, Debug)]
pub struct NeighborList {
    pub maxneighs: usize,
    /// Valid entries in each row.
    pub numneigh: Vec<usize>,
    /// Row `i` occupies `neighbors[i * maxneighs..(i + 1) * maxneighs]`.
    pub neighbors: Vec<usize>,
    /// Worker buffers of the half-list force pass.
    pub(crate) reactions: ReactionScratch,
    half: bool,
    n_local: usize,
}

impl NeighborList {
    pub fn new(half: bool) -> Self {
        Self {
            maxneighs: config::get_initial_maxneighs(),
            numneigh: Vec::new(),
            neighbors: Vec::new(),
            reactions: ReactionScratch::default(),
            half,
            n_local: 0,
        }
    }

    pub fn n_local(&self) -> usize {
        self.n_local
    }

    #[inline]
    pub fn neighbors_of(&self, i: usize) -> &[usize] {
        let start = i * self.maxneighs;
        &self.neighbors[start..start + self.numneigh[i]]
    }

    /// One pass over all owned particles with the current capacity. Returns
    /// the largest partner count seen, which exceeds `maxneighs` on overflow.
    fn build_pass(&mut self, atom: &Atom, bins: &BinGrid) -> usize {
        let maxneighs = self.maxneighs;
        let half = self.half;
        let min_len = config::parallel_min_len(self.n_local);

        self.neighbors
            .par_chunks_mut(maxneighs)
            .zip(self.numneigh.par_iter_mut())
            .enumerate()
            .with_min_len(min_len)
            .map(|(i, (row, count))| {
                *count = search_particle(atom, bins, i, half, row);
                *count
            })
            .max()
            .unwrap_or(0)
    }
}

/// Stencil scan for owned particle `i`. Writes up to `row.len()` partners and
/// returns the full count.
fn search_particle(atom: &Atom, bins: &BinGrid, i: usize, half: bool, row: &mut [usize]) -> usize {
    let pos_i = atom.positions.get(i);
    let type_i = atom.types[i];
    let params = &atom.params;
    let home = bins.coord2bin(&pos_i);

    let mut n = 0;
    for c in bins.stencil(&home) {
        for &j in bins.atoms_in_rank(bins.rank_of(&c)) {
            if j == i || (half && !half_admits(atom, i, j)) {
                continue;
            }
            let rsq = (pos_i - atom.positions.get(j)).norm_squared();
            if rsq <= params.cutneighsq[params.index(type_i, atom.types[j])] {
                if n < row.len() {
                    row[n] = j;
                }
                n += 1;
            }
        }
    }
    n
}

impl NeighborBuilder for NeighborList {
    fn build(&mut self, atom: &Atom, bins: &BinGrid) -> Result<()> {
        let _span = info_span!("NeighborList::build", n_local = atom.n_local, half = self.half)
            .entered();
        self.n_local = atom.n_local;

        loop {
            self.numneigh.clear();
            self.numneigh.resize(self.n_local, 0);
            self.neighbors.resize(self.n_local * self.maxneighs, 0);

            let max_count = self.build_pass(atom, bins);
            if max_count <= self.maxneighs {
                break;
            }
            self.maxneighs = ((max_count as f64 * NEIGHBOR_GROWTH_FACTOR) as usize).max(max_count);
            debug!(maxneighs = self.maxneighs, "neighbor list overflow, rebuilding");
        }
        Ok(())
    }

    fn prune(&mut self, atom: &Atom) {
        let _span = info_span!("NeighborList::prune", n_local = self.n_local).entered();
        let maxneighs = self.maxneighs;
        let params = &atom.params;
        let min_len = config::parallel_min_len(self.n_local);

        self.neighbors
            .par_chunks_mut(maxneighs)
            .zip(self.numneigh.par_iter_mut())
            .enumerate()
            .with_min_len(min_len)
            .for_each(|(i, (row, count))| {
                let pos_i = atom.positions.get(i);
                let type_i = atom.types[i];
                let mut kept = 0;
                for k in 0..*count {
                    let j = row[k];
                    let rsq = (pos_i - atom.positions.get(j)).norm_squared();
                    if rsq <= params.cutforcesq[params.index(type_i, atom.types[j])] {
                        row[kept] = j;
                        kept += 1;
                    }
                }
                *count = kept;
            });
    }

    fn pairs(&self) -> Vec<(usize, usize)> {
        (0..self.n_local)
            .flat_map(|i| self.neighbors_of(i).iter().map(move |&j| (i, j)))
            .collect()
    }

    fn num_entries(&self) -> usize {
        self.numneigh.iter().sum()
    }

    fn is_half(&self) -> bool {
        self.half
    }
}
