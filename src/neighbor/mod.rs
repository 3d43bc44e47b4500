//! Candidate partner lists built from the binned particles.

pub mod cluster;
pub mod masks;
pub mod pattern;
pub mod verlet;

pub use cluster::{ClusterLayout, ClusterPairList, PairRows};
pub use masks::{Diagonal, ExclusionMasks};
pub use verlet::NeighborList;

use crate::atom::Atom;
use crate::binning::BinGrid;
use crate::config::NeighborStrategy;
use crate::error::Result;

/// Common contract of the Verlet and cluster-pair builders.
///
/// After `build`, every owned particle `i` and partner `j` (owned or ghost)
/// with `|x_i - x_j|^2 <= cutneighsq(type_i, type_j)` appears in the list,
/// once per pair when the list is half and once per direction when it is full.
pub trait NeighborBuilder {
    /// Rebuilds the list from scratch. Capacity overflow is handled inside by
    /// growing and rebuilding.
    fn build(&mut self, atom: &Atom, bins: &BinGrid) -> Result<()>;

    /// Drops entries that are beyond the force cutoff at the current
    /// positions. Entries still inside the force cutoff are kept.
    fn prune(&mut self, atom: &Atom);

    /// Every stored particle pair as `(owned particle, partner)`.
    fn pairs(&self) -> Vec<(usize, usize)>;

    /// Number of stored entries (partners or j-clusters).
    fn num_entries(&self) -> usize;

    fn is_half(&self) -> bool;
}

/// The list kept by a simulation, selected by [`NeighborStrategy`].
#[derive(Clone, Debug)]
pub enum Neighbors {
    Verlet(NeighborList),
    Cluster(ClusterPairList),
}

impl Neighbors {
    pub fn new(strategy: NeighborStrategy, half: bool) -> Self {
        match strategy {
            NeighborStrategy::Verlet => Self::Verlet(NeighborList::new(half)),
            NeighborStrategy::ClusterPair => Self::Cluster(ClusterPairList::new(half)),
        }
    }

    pub fn builder(&self) -> &dyn NeighborBuilder {
        match self {
            Self::Verlet(list) => list,
            Self::Cluster(list) => list,
        }
    }

    pub fn builder_mut(&mut self) -> &mut dyn NeighborBuilder {
        match self {
            Self::Verlet(list) => list,
            Self::Cluster(list) => list,
        }
    }
}

/// Ordering key of particle `j` for the half convention: the owner index
/// followed by the image shift (z, then y, then x). Owned particles carry a
/// zero shift.
#[inline]
pub fn image_key(atom: &Atom, j: usize) -> (usize, i32, i32, i32) {
    if j < atom.n_local {
        (j, 0, 0, 0)
    } else {
        let k = j - atom.n_local;
        let s = atom.pbc_shift[k];
        (atom.border_map[k], s.z, s.y, s.x)
    }
}

/// Whether the half convention stores the pair on owned particle `i`.
///
/// The pair between `i` and an image of `j` under shift `s` is mirrored by
/// the pair between `j` and an image of `i` under `-s`. Exactly one of the
/// two has a partner key greater than the owner key.
#[inline]
pub fn half_admits(atom: &Atom, i: usize, j: usize) -> bool {
    image_key(atom, j) > (i, 0, 0, 0)
}
