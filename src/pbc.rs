//! Ghost images for periodic boundaries.
//!
//! Every owned particle closer than `cutneigh` to a periodic face gets one
//! image per crossed face combination, appended after the owned range. The
//! neighbor search then works on plain Euclidean distances.

use crate::atom::{Atom, PositionStorage};
use crate::domain::SimBox;
use crate::error::Result;
use nalgebra::Vector3;
use tracing::{debug, info_span};

/// Image shifts admissible on one axis for coordinate `x`.
fn axis_shifts(x: f64, length: f64, periodic: bool, cutneigh: f64) -> ([i32; 3], usize) {
    let mut shifts = [0; 3];
    let mut n = 1;
    if periodic {
        if x < cutneigh {
            shifts[n] = 1;
            n += 1;
        }
        if x >= length - cutneigh {
            shifts[n] = -1;
            n += 1;
        }
    }
    (shifts, n)
}

/// Rebuilds the ghost range from the current owned positions.
pub fn setup_pbc(atom: &mut Atom, simbox: &SimBox, cutneigh: f64) -> Result<()> {
    let _span = info_span!("setup_pbc", n_local = atom.n_local).entered();
    simbox.check_cutoff(cutneigh)?;
    atom.clear_ghosts();

    let lengths = *simbox.lengths();
    let pbc = *simbox.pbc();

    for i in 0..atom.n_local {
        let pos = atom.position(i);
        let (sx, nx) = axis_shifts(pos.x, lengths.x, pbc.x, cutneigh);
        let (sy, ny) = axis_shifts(pos.y, lengths.y, pbc.y, cutneigh);
        let (sz, nz) = axis_shifts(pos.z, lengths.z, pbc.z, cutneigh);

        for &px in &sx[..nx] {
            for &py in &sy[..ny] {
                for &pz in &sz[..nz] {
                    if px == 0 && py == 0 && pz == 0 {
                        continue;
                    }
                    let shift = Vector3::new(px, py, pz);
                    atom.add_ghost(i, shift, simbox.lattice_vector(&shift));
                }
            }
        }
    }

    debug!(
        n_local = atom.n_local,
        n_ghost = atom.n_ghost,
        "ghost images created"
    );
    Ok(())
}

/// Moves ghosts along with their owners without changing membership. Valid
/// until the next reneighbor.
pub fn update_pbc(atom: &mut Atom, simbox: &SimBox) {
    let n_local = atom.n_local;
    for k in 0..atom.n_ghost {
        let source = atom.border_map[k];
        let pos = atom.positions.get(source) + simbox.lattice_vector(&atom.pbc_shift[k]);
        atom.positions.set(n_local + k, pos);
    }
}

/// Wraps owned particles that left the box back into `[0, L)` on periodic axes.
pub fn update_atoms_pbc(atom: &mut Atom, simbox: &SimBox) {
    let lengths = *simbox.lengths();
    let pbc = *simbox.pbc();
    for i in 0..atom.n_local {
        let mut pos = atom.position(i);
        for axis in 0..3 {
            if !pbc[axis] {
                continue;
            }
            if pos[axis] < 0.0 {
                pos[axis] += lengths[axis];
            } else if pos[axis] >= lengths[axis] {
                pos[axis] -= lengths[axis];
            }
        }
        atom.set_position(i, pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::TypeParams;
    use crate::config::DataLayout;
    use crate::error::MdError;
    use approx::assert_relative_eq;

    fn atom_with(positions: &[[f64; 3]]) -> Atom {
        let mut atom = Atom::new(DataLayout::Soa, TypeParams::uniform(1, 1.0, 1.0, 2.5, 2.8));
        for p in positions {
            atom.append(Vector3::new(p[0], p[1], p[2]), Vector3::zeros(), 0)
                .unwrap();
        }
        atom
    }

    #[test]
    fn test_interior_particle_has_no_ghost() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let mut atom = atom_with(&[[5.0, 5.0, 5.0]]);
        setup_pbc(&mut atom, &simbox, 2.8).unwrap();
        assert_eq!(atom.n_ghost, 0);
    }

    #[test]
    fn test_face_edge_corner_counts() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let mut atom = atom_with(&[[1.0, 5.0, 5.0], [1.0, 9.0, 5.0], [1.0, 1.0, 9.5]]);
        setup_pbc(&mut atom, &simbox, 2.8).unwrap();
        // face: 1, edge: 3, corner: 7
        assert_eq!(atom.n_ghost, 1 + 3 + 7);

        let g = atom.n_local;
        assert_eq!(atom.border_map[0], 0);
        assert_eq!(atom.pbc_shift[0], Vector3::new(1, 0, 0));
        assert_relative_eq!(atom.position(g).x, 11.0);
    }

    #[test]
    fn test_small_box_gives_26_images() {
        // Box shorter than twice the cutoff: the particle is near both faces.
        let simbox = SimBox::cubic(5.0).unwrap();
        let mut atom = atom_with(&[[2.5, 2.5, 2.5]]);
        setup_pbc(&mut atom, &simbox, 2.8).unwrap();
        assert_eq!(atom.n_ghost, 26);
    }

    #[test]
    fn test_open_axis_has_no_images() {
        let simbox =
            SimBox::new(Vector3::new(10.0, 10.0, 10.0), Vector3::new(false, true, true)).unwrap();
        let mut atom = atom_with(&[[0.5, 5.0, 5.0]]);
        setup_pbc(&mut atom, &simbox, 2.8).unwrap();
        assert_eq!(atom.n_ghost, 0);
    }

    #[test]
    fn test_degenerate_box_is_fatal() {
        let simbox = SimBox::cubic(2.0).unwrap();
        let mut atom = atom_with(&[[1.0, 1.0, 1.0]]);
        let err = setup_pbc(&mut atom, &simbox, 2.8).unwrap_err();
        assert!(matches!(err, MdError::DegenerateGeometry { .. }));
    }

    #[test]
    fn test_update_pbc_follows_owner() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let mut atom = atom_with(&[[1.0, 1.0, 5.0]]);
        setup_pbc(&mut atom, &simbox, 2.8).unwrap();
        let n_ghost = atom.n_ghost;

        atom.set_position(0, Vector3::new(1.3, 0.9, 5.2));
        update_pbc(&mut atom, &simbox);

        assert_eq!(atom.n_ghost, n_ghost);
        for k in 0..atom.n_ghost {
            let expected = atom.position(0) + simbox.lattice_vector(&atom.pbc_shift[k]);
            let got = atom.position(atom.n_local + k);
            assert_relative_eq!((expected - got).norm(), 0.0);
        }
    }

    #[test]
    fn test_update_atoms_pbc_wraps() {
        let simbox = SimBox::cubic(10.0).unwrap();
        let mut atom = atom_with(&[[-0.5, 10.25, 3.0]]);
        update_atoms_pbc(&mut atom, &simbox);
        let pos = atom.position(0);
        assert_relative_eq!(pos.x, 9.5);
        assert_relative_eq!(pos.y, 0.25, epsilon = 1e-12);
        assert_relative_eq!(pos.z, 3.0);
    }
}
