//! Small helpers around `wide::f64x4` used by the vectorized kernels.

use crate::config::VECTOR_WIDTH;
use wide::{CmpGt, f64x4};

const LANE_SEQ: [f64; VECTOR_WIDTH] = [0.0, 1.0, 2.0, 3.0];

/// `[0, 1, 2, 3]`, the lane offsets inside one chunk of a neighbor row.
#[inline]
pub fn lane_seq() -> f64x4 {
    f64x4::from(LANE_SEQ)
}

#[inline]
pub fn h_reduce_sum(v: f64x4) -> f64 {
    let a = v.to_array();
    (a[0] + a[1]) + (a[2] + a[3])
}

/// Lane mask with lane `l` set iff bit `l` of `bits` is set.
pub fn mask_from_bits(bits: usize) -> f64x4 {
    let mut lanes = [0.0; VECTOR_WIDTH];
    for (l, lane) in lanes.iter_mut().enumerate() {
        if bits & (1 << l) != 0 {
            *lane = 1.0;
        }
    }
    f64x4::from(lanes).cmp_gt(f64x4::ZERO)
}

/// Number of set lanes in a comparison mask.
#[inline]
pub fn count_lanes(mask: f64x4) -> u64 {
    h_reduce_sum(mask.blend(f64x4::ONE, f64x4::ZERO)) as u64
}

#[inline]
pub fn gather(f: impl Fn(usize) -> f64) -> f64x4 {
    f64x4::from([f(0), f(1), f(2), f(3)])
}
