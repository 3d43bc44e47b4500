//! Lennard-Jones over cluster pairs (4xN).
//!
//! Each i-slot is broadcast against the `CLUSTER_N` j-slots of one entry. The
//! entry mask removes self pairs, dummy slots and pairs owned by the mirror
//! entry.

use super::lj_force_over_r;
use crate::atom::{Atom, TypeParams};
use crate::config::{CLUSTER_M, CLUSTER_N, KernelVariant, parallel_min_len};
use crate::neighbor::cluster::{CL_STRIDE, CL_X_OFFSET, CL_Y_OFFSET, CL_Z_OFFSET};
use crate::neighbor::{ClusterPairList, ExclusionMasks, NeighborBuilder};
use crate::simd::{count_lanes, gather, h_reduce_sum};
use crate::stats::Stats;
use rayon::prelude::*;
use std::time::Instant;
use tracing::info_span;
use wide::{CmpLt, f64x4};

type ClusterForces = [f64; CL_STRIDE];

/// Row bits of an entry row without exclusions.
const FULL_ROW: usize = (1 << CLUSTER_N) - 1;

#[derive(Clone, Copy)]
struct ClusterView<'a> {
    cl_x: &'a [f64],
    cl_t: &'a [usize],
    params: &'a TypeParams,
}

impl ClusterView<'_> {
    #[inline]
    fn x(&self, ci: usize) -> &[f64] {
        &self.cl_x[ci * CL_STRIDE..(ci + 1) * CL_STRIDE]
    }

    #[inline]
    fn t(&self, ci: usize, lane: usize) -> usize {
        self.cl_t[ci * CLUSTER_M + lane]
    }
}

pub fn compute_force_lj_cluster(
    atom: &mut Atom,
    list: &mut ClusterPairList,
    variant: KernelVariant,
    stats: &mut Stats,
) -> f64 {
    let half = list.is_half();
    let _span = info_span!(
        "compute_force_lj_cluster",
        n_local_clusters = list.layout.n_local_clusters,
        half,
        ?variant
    )
    .entered();
    let start = Instant::now();

    list.layout.update_positions(atom);
    let mut reactions = std::mem::take(&mut list.reactions);
    let local = {
        let (layout, rows) = list.layout_and_rows();
        let n_local_clusters = layout.n_local_clusters;
        let view = ClusterView {
            cl_x: &layout.cl_x,
            cl_t: &layout.cl_t,
            params: &atom.params,
        };
        let run = |ci: usize, fi: &mut ClusterForces, mut sink: Option<&mut [f64]>| {
            let mut st = Stats {
                total_force_neighs: rows.numneigh(ci) as u64,
                total_force_iters: (rows.numneigh(ci) * CLUSTER_M) as u64,
                ..Default::default()
            };
            for (cj, imask) in rows.entries(ci) {
                let mut fj = [0.0; CL_STRIDE];
                let within = match variant {
                    KernelVariant::Scalar => pair_scalar(view, ci, cj, imask, fi, &mut fj),
                    KernelVariant::Simd => pair_simd(view, ci, cj, imask, fi, &mut fj),
                };
                if let Some(buf) = sink.as_deref_mut() {
                    for (b, f) in buf[cj * CL_STRIDE..(cj + 1) * CL_STRIDE].iter_mut().zip(&fj) {
                        *b += f;
                    }
                }
                st.atoms_within_cutoff += within;
                st.atoms_outside_cutoff += imask.count_ones() as u64 - within;
                if within > 0 {
                    st.clusters_within_cutoff += 1;
                } else {
                    st.clusters_outside_cutoff += 1;
                }
            }
            st
        };

        if half {
            let st = reactions.run(n_local_clusters, layout.cl_f.len(), |range, buf| {
                let mut st = Stats::default();
                for ci in range {
                    let mut fi = [0.0; CL_STRIDE];
                    st += run(ci, &mut fi, Some(&mut *buf));
                    for (b, f) in buf[ci * CL_STRIDE..(ci + 1) * CL_STRIDE].iter_mut().zip(&fi) {
                        *b += f;
                    }
                }
                st
            });
            reactions.reduce_into(&mut layout.cl_f);
            st
        } else {
            layout.cl_f.fill(0.0);
            layout.cl_f[..n_local_clusters * CL_STRIDE]
                .par_chunks_mut(CL_STRIDE)
                .enumerate()
                .with_min_len(parallel_min_len(n_local_clusters))
                .map(|(ci, out)| {
                    let mut fi = [0.0; CL_STRIDE];
                    let st = run(ci, &mut fi, None);
                    out.copy_from_slice(&fi);
                    st
                })
                .reduce(Stats::default, |a, b| a + b)
        }
    };
    list.reactions = reactions;

    list.layout.scatter_forces(atom);
    *stats += local;
    start.elapsed().as_secs_f64()
}

/// Reference path over the same lanes as [`pair_simd`]. Adds the force on the
/// i-slots to `fi` and the reactions on the j-slots to `fj`, and returns the
/// number of slot pairs inside the cutoff.
fn pair_scalar(
    view: ClusterView<'_>,
    ci: usize,
    cj: usize,
    imask: u16,
    fi: &mut ClusterForces,
    fj: &mut ClusterForces,
) -> u64 {
    let xi = view.x(ci);
    let xj = view.x(cj);
    let mut within = 0;

    for ii in 0..CLUSTER_M {
        let bits = ExclusionMasks::row_bits(imask, ii);
        if bits == 0 {
            continue;
        }
        let type_i = view.t(ci, ii);
        for jj in 0..CLUSTER_N {
            if bits & (1 << jj) == 0 {
                continue;
            }
            let delx = xi[CL_X_OFFSET + ii] - xj[CL_X_OFFSET + jj];
            let dely = xi[CL_Y_OFFSET + ii] - xj[CL_Y_OFFSET + jj];
            let delz = xi[CL_Z_OFFSET + ii] - xj[CL_Z_OFFSET + jj];
            let rsq = delx * delx + dely * dely + delz * delz;
            let idx = view.params.index(type_i, view.t(cj, jj));
            if rsq < view.params.cutforcesq[idx] {
                let force = lj_force_over_r(rsq, view.params.sigma6[idx], view.params.epsilon[idx]);
                fi[CL_X_OFFSET + ii] += delx * force;
                fi[CL_Y_OFFSET + ii] += dely * force;
                fi[CL_Z_OFFSET + ii] += delz * force;
                fj[CL_X_OFFSET + jj] -= delx * force;
                fj[CL_Y_OFFSET + jj] -= dely * force;
                fj[CL_Z_OFFSET + jj] -= delz * force;
                within += 1;
            }
        }
    }
    within
}

fn pair_simd(
    view: ClusterView<'_>,
    ci: usize,
    cj: usize,
    imask: u16,
    fi: &mut ClusterForces,
    fj: &mut ClusterForces,
) -> u64 {
    let masks = ExclusionMasks::global();
    let xi = view.x(ci);
    let xj = view.x(cj);
    let xjx = f64x4::from(&xj[CL_X_OFFSET..CL_X_OFFSET + CLUSTER_N]);
    let xjy = f64x4::from(&xj[CL_Y_OFFSET..CL_Y_OFFSET + CLUSTER_N]);
    let xjz = f64x4::from(&xj[CL_Z_OFFSET..CL_Z_OFFSET + CLUSTER_N]);
    let c48 = f64x4::from(48.0);
    let half = f64x4::from(0.5);

    let mut fjx = f64x4::ZERO;
    let mut fjy = f64x4::ZERO;
    let mut fjz = f64x4::ZERO;
    let mut within = 0;

    for ii in 0..CLUSTER_M {
        let bits = ExclusionMasks::row_bits(imask, ii);
        if bits == 0 {
            continue;
        }
        let type_i = view.t(ci, ii);
        let tidx: [usize; CLUSTER_N] = std::array::from_fn(|jj| view.params.index(type_i, view.t(cj, jj)));

        let delx = f64x4::from(xi[CL_X_OFFSET + ii]) - xjx;
        let dely = f64x4::from(xi[CL_Y_OFFSET + ii]) - xjy;
        let delz = f64x4::from(xi[CL_Z_OFFSET + ii]) - xjz;
        let rsq = delx * delx + dely * dely + delz * delz;

        let cutforcesq = gather(|l| view.params.cutforcesq[tidx[l]]);
        let sigma6 = gather(|l| view.params.sigma6[tidx[l]]);
        let epsilon = gather(|l| view.params.epsilon[tidx[l]]);
        let cutoff = rsq.cmp_lt(cutforcesq);
        let mask = if bits == FULL_ROW { cutoff } else { masks.lane_mask(bits) & cutoff };

        let sr2 = f64x4::ONE / rsq;
        let sr6 = sr2 * sr2 * sr2 * sigma6;
        let force = mask.blend(c48 * sr6 * (sr6 - half) * sr2 * epsilon, f64x4::ZERO);
        let fx = mask.blend(delx * force, f64x4::ZERO);
        let fy = mask.blend(dely * force, f64x4::ZERO);
        let fz = mask.blend(delz * force, f64x4::ZERO);

        fi[CL_X_OFFSET + ii] += h_reduce_sum(fx);
        fi[CL_Y_OFFSET + ii] += h_reduce_sum(fy);
        fi[CL_Z_OFFSET + ii] += h_reduce_sum(fz);
        fjx = fjx - fx;
        fjy = fjy - fy;
        fjz = fjz - fz;
        within += count_lanes(mask);
    }

    for (offset, v) in [(CL_X_OFFSET, fjx), (CL_Y_OFFSET, fjy), (CL_Z_OFFSET, fjz)] {
        for (out, f) in fj[offset..offset + CLUSTER_N].iter_mut().zip(v.to_array()) {
            *out += f;
        }
    }
    within
}
