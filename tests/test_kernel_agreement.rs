use approx::assert_relative_eq;
use mdbench_rs::{
    KernelVariant, NeighborStrategy, Parameter, Simulation, create_fcc_lattice,
};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn jittered(param: &Parameter, seed: u64) -> Simulation {
    let mut param = param.clone();
    let (mut atom, simbox) = create_fcc_lattice(&mut param).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    for i in 0..atom.n_local {
        let d = Vector3::new(
            rng.gen_range(-0.1..0.1),
            rng.gen_range(-0.1..0.1),
            rng.gen_range(-0.1..0.1),
        );
        atom.set_position(i, atom.position(i) + d);
    }
    atom.params.set_pair(0, 1, 1.3, 0.9);
    atom.params.set_pair(2, 3, 0.7, 1.4);
    Simulation::new(param, simbox, atom, None).unwrap()
}

fn forces(param: &Parameter, seed: u64) -> Vec<Vector3<f64>> {
    let mut sim = jittered(param, seed);
    sim.compute_force().unwrap();
    assert_relative_eq!(sim.atom.net_force().norm(), 0.0, epsilon = 1e-8);
    sim.atom.forces[..sim.atom.n_local].to_vec()
}

#[test]
fn test_all_kernels_match_scalar_verlet() {
    let base = Parameter {
        nx: 5,
        ny: 5,
        nz: 5,
        ..Default::default()
    };
    let reference = forces(&base, 7);
    assert!(reference.iter().any(|f| f.norm() > 1e-3));

    for strategy in [NeighborStrategy::Verlet, NeighborStrategy::ClusterPair] {
        for variant in [KernelVariant::Scalar, KernelVariant::Simd] {
            for half_neigh in [false, true] {
                let param = Parameter {
                    strategy,
                    variant,
                    half_neigh,
                    ..base.clone()
                };
                for (a, b) in reference.iter().zip(&forces(&param, 7)) {
                    assert_relative_eq!(a, b, epsilon = 1e-9, max_relative = 1e-6);
                }
            }
        }
    }
}

#[test]
fn test_soa_and_aos_layouts_agree() {
    let base = Parameter {
        nx: 4,
        ny: 4,
        nz: 4,
        ..Default::default()
    };
    let aos = forces(
        &Parameter {
            layout: mdbench_rs::DataLayout::Aos,
            ..base.clone()
        },
        3,
    );
    let soa = forces(
        &Parameter {
            layout: mdbench_rs::DataLayout::Soa,
            ..base
        },
        3,
    );
    assert_eq!(aos, soa);
}
