//! Lennard-Jones over Verlet lists, scalar and four-lane vectorized.

use super::{apply_reactions, lj_force_over_r};
use crate::atom::{Atom, PositionStorage, Positions, TypeParams};
use crate::config::{KernelVariant, VECTOR_WIDTH, parallel_min_len};
use crate::neighbor::{NeighborBuilder, NeighborList};
use crate::simd::{count_lanes, gather, h_reduce_sum, lane_seq};
use crate::stats::Stats;
use nalgebra::Vector3;
use rayon::prelude::*;
use std::time::Instant;
use tracing::info_span;
use wide::{CmpLt, f64x4};

/// Read-only view of the particle data used inside the parallel loops.
#[derive(Clone, Copy)]
struct PairView<'a> {
    positions: &'a Positions,
    types: &'a [usize],
    params: &'a TypeParams,
}

pub fn compute_force_lj(
    atom: &mut Atom,
    list: &mut NeighborList,
    variant: KernelVariant,
    stats: &mut Stats,
) -> f64 {
    let _span = info_span!(
        "compute_force_lj",
        n_local = atom.n_local,
        half = list.is_half(),
        ?variant
    )
    .entered();
    let start = Instant::now();

    let local = if list.is_half() {
        half_pass(atom, list, variant)
    } else {
        full_pass(atom, list, variant)
    };
    *stats += local;
    start.elapsed().as_secs_f64()
}

/// Force on `i` from row `neighs`. `reaction` receives the opposite force
/// for every partner inside the cutoff.
fn row_force(
    view: PairView<'_>,
    variant: KernelVariant,
    i: usize,
    neighs: &[usize],
    reaction: impl FnMut(usize, Vector3<f64>),
) -> (Vector3<f64>, Stats) {
    match variant {
        KernelVariant::Scalar => row_force_scalar(view, i, neighs, reaction),
        KernelVariant::Simd => row_force_simd(view, i, neighs, reaction),
    }
}

fn row_force_scalar(
    view: PairView<'_>,
    i: usize,
    neighs: &[usize],
    mut reaction: impl FnMut(usize, Vector3<f64>),
) -> (Vector3<f64>, Stats) {
    let pos_i = view.positions.get(i);
    let type_i = view.types[i];
    let mut fi = Vector3::zeros();
    let mut st = row_stats(neighs.len());

    for &j in neighs {
        let del = pos_i - view.positions.get(j);
        let rsq = del.norm_squared();
        let idx = view.params.index(type_i, view.types[j]);
        if rsq < view.params.cutforcesq[idx] {
            let f = del * lj_force_over_r(rsq, view.params.sigma6[idx], view.params.epsilon[idx]);
            fi += f;
            reaction(j, f);
            st.atoms_within_cutoff += 1;
        } else {
            st.atoms_outside_cutoff += 1;
        }
    }
    (fi, st)
}

fn row_force_simd(
    view: PairView<'_>,
    i: usize,
    neighs: &[usize],
    mut reaction: impl FnMut(usize, Vector3<f64>),
) -> (Vector3<f64>, Stats) {
    let pos_i = view.positions.get(i);
    let type_i = view.types[i];
    let xi = f64x4::from(pos_i.x);
    let yi = f64x4::from(pos_i.y);
    let zi = f64x4::from(pos_i.z);
    let numneighs = f64x4::from(neighs.len() as f64);
    let c48 = f64x4::from(48.0);
    let half = f64x4::from(0.5);

    let mut fix = f64x4::ZERO;
    let mut fiy = f64x4::ZERO;
    let mut fiz = f64x4::ZERO;
    let mut st = row_stats(neighs.len());

    for (chunk_idx, chunk) in neighs.chunks(VECTOR_WIDTH).enumerate() {
        let k = chunk_idx * VECTOR_WIDTH;
        // padding lanes point at i itself and are masked out below
        let idx: [usize; VECTOR_WIDTH] = std::array::from_fn(|l| chunk.get(l).copied().unwrap_or(i));
        let pos_j: [Vector3<f64>; VECTOR_WIDTH] = std::array::from_fn(|l| view.positions.get(idx[l]));
        let tidx: [usize; VECTOR_WIDTH] =
            std::array::from_fn(|l| view.params.index(type_i, view.types[idx[l]]));

        let delx = xi - gather(|l| pos_j[l].x);
        let dely = yi - gather(|l| pos_j[l].y);
        let delz = zi - gather(|l| pos_j[l].z);
        let rsq = delx * delx + dely * dely + delz * delz;

        let cutforcesq = gather(|l| view.params.cutforcesq[tidx[l]]);
        let sigma6 = gather(|l| view.params.sigma6[tidx[l]]);
        let epsilon = gather(|l| view.params.epsilon[tidx[l]]);

        let in_list = (lane_seq() + f64x4::from(k as f64)).cmp_lt(numneighs);
        let mask = in_list & rsq.cmp_lt(cutforcesq);

        let sr2 = f64x4::ONE / rsq;
        let sr6 = sr2 * sr2 * sr2 * sigma6;
        let force = mask.blend(c48 * sr6 * (sr6 - half) * sr2 * epsilon, f64x4::ZERO);

        let fx = mask.blend(delx * force, f64x4::ZERO);
        let fy = mask.blend(dely * force, f64x4::ZERO);
        let fz = mask.blend(delz * force, f64x4::ZERO);
        fix = fix + fx;
        fiy = fiy + fy;
        fiz = fiz + fz;

        let inside = count_lanes(mask);
        st.atoms_within_cutoff += inside;
        st.atoms_outside_cutoff += chunk.len() as u64 - inside;

        let on = mask.blend(f64x4::ONE, f64x4::ZERO).to_array();
        let (ax, ay, az) = (fx.to_array(), fy.to_array(), fz.to_array());
        for (l, &j) in chunk.iter().enumerate() {
            if on[l] != 0.0 {
                reaction(j, Vector3::new(ax[l], ay[l], az[l]));
            }
        }
    }

    (Vector3::new(h_reduce_sum(fix), h_reduce_sum(fiy), h_reduce_sum(fiz)), st)
}

fn row_stats(numneighs: usize) -> Stats {
    Stats {
        total_force_neighs: numneighs as u64,
        total_force_iters: numneighs.div_ceil(VECTOR_WIDTH) as u64,
        ..Default::default()
    }
}

fn full_pass(atom: &mut Atom, list: &NeighborList, variant: KernelVariant) -> Stats {
    let n_local = atom.n_local;
    let view = PairView {
        positions: &atom.positions,
        types: &atom.types,
        params: &atom.params,
    };
    atom.forces[..n_local]
        .par_iter_mut()
        .enumerate()
        .with_min_len(parallel_min_len(n_local))
        .map(|(i, f)| {
            let (fi, st) = row_force(view, variant, i, list.neighbors_of(i), |_, _| {});
            *f += fi;
            st
        })
        .reduce(Stats::default, |a, b| a + b)
}

/// Each pair once. Every worker owns a contiguous block of rows and one
/// reaction buffer; the buffers are summed and folded onto owners afterwards.
fn half_pass(atom: &mut Atom, list: &mut NeighborList, variant: KernelVariant) -> Stats {
    let n_local = atom.n_local;
    let mut reactions = std::mem::take(&mut list.reactions);
    let stats = {
        let view = PairView {
            positions: &atom.positions,
            types: &atom.types,
            params: &atom.params,
        };
        let rows: &NeighborList = &*list;
        reactions.run(n_local, 3 * atom.n_all(), |range, buf| {
            let mut st = Stats::default();
            for i in range {
                let (fi, row_st) = row_force(view, variant, i, rows.neighbors_of(i), |j, f| {
                    buf[3 * j] -= f.x;
                    buf[3 * j + 1] -= f.y;
                    buf[3 * j + 2] -= f.z;
                });
                buf[3 * i] += fi.x;
                buf[3 * i + 1] += fi.y;
                buf[3 * i + 2] += fi.z;
                st += row_st;
            }
            st
        })
    };

    apply_reactions(atom, &reactions);
    list.reactions = reactions;
    stats
}
