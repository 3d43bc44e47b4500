//! Interaction masks for cluster pairs.
//!
//! Bit `ii * CLUSTER_N + jj` of a mask is set when slot `ii` of the i-cluster
//! interacts with slot `jj` of the j-cluster.

use crate::config::{CLUSTER_M, CLUSTER_N};
use crate::simd::mask_from_bits;
use std::sync::OnceLock;
use wide::f64x4;

const _: () = assert!(CLUSTER_M * CLUSTER_N <= u16::BITS as usize);
const _: () = assert!(CLUSTER_N == 4);

/// How an i-cluster relates to a j-cluster on the diagonal of the pair list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagonal {
    /// Distinct clusters.
    None,
    /// Cluster paired with itself in a full list: only `ii == jj` is excluded.
    Full,
    /// Cluster paired with itself in a half list: only `jj > ii` remains.
    Half,
}

impl Diagonal {
    fn index(self) -> usize {
        match self {
            Diagonal::None => 0,
            Diagonal::Full => 1,
            Diagonal::Half => 2,
        }
    }
}

pub struct ExclusionMasks {
    /// Indexed by `(ni * (CLUSTER_N + 1) + nj) * 3 + diagonal`.
    table: Vec<u16>,
    /// Lane mask for every 4-bit row pattern.
    lane_masks: Vec<f64x4>,
}

impl ExclusionMasks {
    fn new() -> Self {
        let mut table = Vec::with_capacity((CLUSTER_M + 1) * (CLUSTER_N + 1) * 3);
        for ni in 0..=CLUSTER_M {
            for nj in 0..=CLUSTER_N {
                for diag in [Diagonal::None, Diagonal::Full, Diagonal::Half] {
                    table.push(compute_mask(ni, nj, diag));
                }
            }
        }
        let lane_masks = (0..1usize << CLUSTER_N).map(mask_from_bits).collect();
        Self { table, lane_masks }
    }

    /// The process-wide table, computed on first use.
    pub fn global() -> &'static ExclusionMasks {
        static MASKS: OnceLock<ExclusionMasks> = OnceLock::new();
        MASKS.get_or_init(ExclusionMasks::new)
    }

    /// Mask for an i-cluster with `ni` real slots against a j-cluster with
    /// `nj` real slots. Dummy slots never interact.
    #[inline]
    pub fn lookup(&self, ni: usize, nj: usize, diag: Diagonal) -> u16 {
        self.table[(ni * (CLUSTER_N + 1) + nj) * 3 + diag.index()]
    }

    /// The `CLUSTER_N` bits of row `ii`.
    #[inline]
    pub fn row_bits(mask: u16, ii: usize) -> usize {
        ((mask >> (ii * CLUSTER_N)) as usize) & ((1 << CLUSTER_N) - 1)
    }

    #[inline]
    pub fn lane_mask(&self, bits: usize) -> f64x4 {
        self.lane_masks[bits]
    }
}

fn compute_mask(ni: usize, nj: usize, diag: Diagonal) -> u16 {
    let mut mask = 0u16;
    for ii in 0..ni {
        for jj in 0..nj {
            let keep = match diag {
                Diagonal::None => true,
                Diagonal::Full => ii != jj,
                Diagonal::Half => jj > ii,
            };
            if keep {
                mask |= 1 << (ii * CLUSTER_N + jj);
            }
        }
    }
    mask
}
