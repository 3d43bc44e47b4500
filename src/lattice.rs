//! Face-centered cubic start configuration.

use crate::atom::{Atom, TypeParams};
use crate::config::Parameter;
use crate::domain::SimBox;
use crate::error::{MdError, Result};
use nalgebra::Vector3;
use tracing::info;

/// Fills an `nx * ny * nz` cell box with an FCC lattice at density `param.rho`.
///
/// The box lengths are written back into `param`. Sites are the points of the
/// half-spaced cubic grid whose index sum is even, which gives the four-site
/// basis per unit cell. Types cycle through `0..ntypes` by creation order.
pub fn create_fcc_lattice(param: &mut Parameter) -> Result<(Atom, SimBox)> {
    if param.nx == 0 || param.ny == 0 || param.nz == 0 {
        return Err(MdError::InvalidParameter(
            "lattice needs at least one unit cell per axis".into(),
        ));
    }
    if !param.rho.is_finite() || param.rho <= 0.0 {
        return Err(MdError::InvalidParameter(format!(
            "density must be positive, got {}",
            param.rho
        )));
    }

    let alat = param.lattice();
    param.xprd = param.nx as f64 * alat;
    param.yprd = param.ny as f64 * alat;
    param.zprd = param.nz as f64 * alat;
    let simbox = SimBox::new(
        Vector3::new(param.xprd, param.yprd, param.zprd),
        Vector3::new(param.pbc[0], param.pbc[1], param.pbc[2]),
    )?;

    let params = TypeParams::uniform(
        param.ntypes,
        param.epsilon,
        param.sigma6,
        param.cutforce,
        param.cutneigh(),
    );
    let mut atom = Atom::new(param.layout, params);

    let half = 0.5 * alat;
    let mut n = 0;
    for k in 0..2 * param.nz {
        for j in 0..2 * param.ny {
            for i in 0..2 * param.nx {
                if (i + j + k) % 2 != 0 {
                    continue;
                }
                let pos = Vector3::new(i as f64 * half, j as f64 * half, k as f64 * half);
                atom.append(pos, Vector3::zeros(), n % param.ntypes)?;
                n += 1;
            }
        }
    }

    info!(
        n_local = atom.n_local,
        alat,
        xprd = param.xprd,
        yprd = param.yprd,
        zprd = param.zprd,
        "created FCC lattice"
    );
    Ok((atom, simbox))
}
