use approx::assert_relative_eq;
use mdbench_rs::{
    EamTables, ForceField, MdError, NeighborStrategy, Neighbors, Parameter, PositionStorage,
    Simulation, create_fcc_lattice,
};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CUTMAX: f64 = 3.0;
/// Density and pair terms reach zero here, the force cutoff of the runs.
const CUT: f64 = 2.5;

fn tables() -> EamTables {
    let nr = 3001;
    EamTables::from_functions(
        1,
        2001,
        0.02,
        nr,
        CUTMAX / (nr - 1) as f64,
        CUTMAX,
        |_, rho| 0.05 * rho * rho - rho.sqrt(),
        |_, _, r| (CUT - r).max(0.0).powi(2),
        |_, _, r| r * 0.3 * (CUT - r).max(0.0).powi(3),
    )
    .unwrap()
}

fn eam_param() -> Parameter {
    Parameter {
        force_field: ForceField::Eam,
        ntypes: 1,
        nx: 4,
        ny: 4,
        nz: 4,
        ..Default::default()
    }
}

fn jittered(displace: Option<(usize, Vector3<f64>)>) -> Simulation {
    let mut param = eam_param();
    let (mut atom, simbox) = create_fcc_lattice(&mut param).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    for i in 0..atom.n_local {
        let d = Vector3::new(
            rng.gen_range(-0.08..0.08),
            rng.gen_range(-0.08..0.08),
            rng.gen_range(-0.08..0.08),
        );
        atom.set_position(i, atom.position(i) + d);
    }
    if let Some((i, d)) = displace {
        atom.set_position(i, atom.position(i) + d);
    }
    Simulation::new(param, simbox, atom, Some(tables())).unwrap()
}

/// Total energy from the splines over the full list: embedding terms plus
/// half of every pair term.
fn energy(sim: &Simulation) -> f64 {
    let Neighbors::Verlet(list) = &sim.neighbors else {
        panic!("EAM runs on Verlet lists");
    };
    let eam = sim.eam.as_ref().unwrap();
    let cutforcesq = sim.atom.params.cutforcesq[0];
    let mut total = 0.0;
    for i in 0..sim.atom.n_local {
        let xi = sim.atom.positions.get(i);
        let mut rho = 0.0;
        for &j in list.neighbors_of(i) {
            let rsq = (xi - sim.atom.positions.get(j)).norm_squared();
            if rsq < cutforcesq {
                let r = rsq.sqrt();
                rho += eam.tables.rhor[0].value(r);
                total += 0.5 * eam.tables.z2r[0].value(r) / r;
            }
        }
        total += eam.tables.frho[0].value(rho);
    }
    total
}

#[test]
fn test_force_is_negative_energy_gradient() {
    let mut sim = jittered(None);
    sim.compute_force().unwrap();
    let sampled = [0, 17, 200];

    for &i in &sampled {
        for axis in 0..3 {
            let h = 1e-5;
            let mut d = Vector3::zeros();
            d[axis] = h;
            let mut plus = jittered(Some((i, d)));
            let mut minus = jittered(Some((i, -d)));
            // builds the lists
            plus.compute_force().unwrap();
            minus.compute_force().unwrap();
            let gradient = (energy(&plus) - energy(&minus)) / (2.0 * h);
            assert_relative_eq!(sim.atom.forces[i][axis], -gradient, epsilon = 1e-5, max_relative = 1e-4);
        }
    }
    assert_relative_eq!(sim.atom.net_force().norm(), 0.0, epsilon = 1e-9);
}

#[test]
fn test_ghosts_share_owner_embedding_derivative() {
    let mut sim = jittered(None);
    sim.compute_force().unwrap();
    let eam = sim.eam.as_ref().unwrap();
    assert!(sim.atom.n_ghost > 0);
    for k in 0..sim.atom.n_ghost {
        let owner = sim.atom.border_map[k];
        assert_eq!(eam.fp[sim.atom.n_local + k], eam.fp[owner]);
    }
}

#[test]
fn test_perfect_lattice_has_uniform_density() {
    let mut param = eam_param();
    let (atom, simbox) = create_fcc_lattice(&mut param).unwrap();
    let mut sim = Simulation::new(param, simbox, atom, Some(tables())).unwrap();
    sim.compute_force().unwrap();
    let eam = sim.eam.as_ref().unwrap();
    for i in 1..sim.atom.n_local {
        assert_relative_eq!(eam.rho[i], eam.rho[0], epsilon = 1e-10);
        assert!(sim.atom.forces[i].norm() < 1e-9);
    }
}

#[test]
fn test_cluster_strategy_rejected() {
    let mut param = Parameter {
        strategy: NeighborStrategy::ClusterPair,
        ..eam_param()
    };
    let (atom, simbox) = create_fcc_lattice(&mut param).unwrap();
    assert!(matches!(
        Simulation::new(param, simbox, atom, Some(tables())),
        Err(MdError::UnsupportedCombination(_))
    ));
}
