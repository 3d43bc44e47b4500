use crate::error::{MdError, Result};
use nalgebra::Vector3;

/// Rectangular simulation box spanning `[0, lengths)` with independent
/// periodicity per axis.
#[derive(Clone, Debug)]
pub struct SimBox {
    lengths: Vector3<f64>,
    pbc: Vector3<bool>,
}

impl SimBox {
    pub fn new(lengths: Vector3<f64>, pbc: Vector3<bool>) -> Result<Self> {
        if lengths.iter().any(|&l| !l.is_finite() || l <= 0.0) {
            return Err(MdError::InvalidParameter(format!(
                "box lengths must be positive and finite, got [{}, {}, {}]",
                lengths.x, lengths.y, lengths.z
            )));
        }
        Ok(Self { lengths, pbc })
    }

    pub fn cubic(length: f64) -> Result<Self> {
        Self::new(
            Vector3::new(length, length, length),
            Vector3::new(true, true, true),
        )
    }

    pub fn lengths(&self) -> &Vector3<f64> {
        &self.lengths
    }

    pub fn pbc(&self) -> &Vector3<bool> {
        &self.pbc
    }

    pub fn volume(&self) -> f64 {
        self.lengths.x * self.lengths.y * self.lengths.z
    }

    pub fn to_fractional(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        cart.component_div(&self.lengths)
    }

    /// Translation for an image shifted by `shift` box lengths.
    pub fn lattice_vector(&self, shift: &Vector3<i32>) -> Vector3<f64> {
        Vector3::new(
            shift.x as f64 * self.lengths.x,
            shift.y as f64 * self.lengths.y,
            shift.z as f64 * self.lengths.z,
        )
    }

    /// A single layer of ghost images only covers every interaction if the
    /// neighbor cutoff fits into each periodic box length.
    pub fn check_cutoff(&self, cutneigh: f64) -> Result<()> {
        for axis in 0..3 {
            if self.pbc[axis] && cutneigh >= self.lengths[axis] {
                return Err(MdError::DegenerateGeometry {
                    axis,
                    box_len: self.lengths[axis],
                    cutneigh,
                });
            }
        }
        Ok(())
    }

    /// Minimum-image shift and displacement from `r_i` to `r_j`.
    pub fn get_shift_and_displacement(
        &self,
        r_i: &Vector3<f64>,
        r_j: &Vector3<f64>,
    ) -> (Vector3<i32>, Vector3<f64>) {
        let d_frac = self.to_fractional(&(r_j - r_i));
        let shift = Vector3::new(
            if self.pbc.x { -d_frac.x.round() as i32 } else { 0 },
            if self.pbc.y { -d_frac.y.round() as i32 } else { 0 },
            if self.pbc.z { -d_frac.z.round() as i32 } else { 0 },
        );
        let disp = r_j + self.lattice_vector(&shift) - r_i;
        (shift, disp)
    }
}

/// O(N²) minimum-image reference search over owned particles. Returns `(i, j)`
/// with `i < j` for every pair closer than `cutoff`.
pub fn brute_force_pairs(
    simbox: &SimBox,
    positions: &[Vector3<f64>],
    cutoff: f64,
) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let n = positions.len();
    let cutoff_sq = cutoff * cutoff;

    for i in 0..n {
        for j in (i + 1)..n {
            let (_, disp) = simbox.get_shift_and_displacement(&positions[i], &positions[j]);
            if disp.norm_squared() < cutoff_sq {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_coordinate_transformation() {
        let simbox = SimBox::new(Vector3::new(10.0, 5.0, 8.0), Vector3::new(true, true, true))
            .unwrap();

        let cart = Vector3::new(5.0, 1.0, 6.0);
        let frac = simbox.to_fractional(&cart);

        assert_relative_eq!(frac.x, 0.5);
        assert_relative_eq!(frac.y, 0.2);
        assert_relative_eq!(frac.z, 0.75);
    }

    #[test]
    fn test_invalid_box() {
        assert!(SimBox::new(Vector3::new(0.0, 1.0, 1.0), Vector3::new(true, true, true)).is_err());
        assert!(SimBox::cubic(f64::NAN).is_err());
    }

    #[test]
    fn test_check_cutoff() {
        let simbox = SimBox::new(Vector3::new(10.0, 2.0, 10.0), Vector3::new(true, true, true))
            .unwrap();
        assert!(matches!(
            simbox.check_cutoff(2.8),
            Err(MdError::DegenerateGeometry { axis: 1, .. })
        ));

        let open_y =
            SimBox::new(Vector3::new(10.0, 2.0, 10.0), Vector3::new(true, false, true)).unwrap();
        assert!(open_y.check_cutoff(2.8).is_ok());
    }

    #[test]
    fn test_minimum_image() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let r_i = Vector3::new(1.0, 1.0, 1.0);
        let r_j = Vector3::new(9.0, 9.0, 9.0);

        let (shift, disp) = simbox.get_shift_and_displacement(&r_i, &r_j);

        assert_eq!(shift, Vector3::new(-1, -1, -1));
        assert_relative_eq!(disp.x, -2.0);
        assert_relative_eq!(disp.y, -2.0);
        assert_relative_eq!(disp.z, -2.0);
    }

    #[test]
    fn test_brute_force_reference() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let positions = vec![
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(1.0, 3.5, 1.0),
            Vector3::new(8.5, 1.0, 1.0),
        ];

        let mut pairs = brute_force_pairs(&simbox, &positions, 3.0);
        pairs.sort();
        assert_eq!(pairs, vec![(0, 1), (0, 2)]);
    }
}
