use mdbench_rs::{
    KernelVariant, NeighborBuilder, NeighborStrategy, Neighbors, Parameter, Simulation,
    create_fcc_lattice,
};

/// 4x4x4 unit cells at the default density: 256 sites, lattice constant
/// 1.6796. FCC shells lie at a * sqrt(n / 2); 54 sites fall inside 2.5 and
/// 78 inside 2.8.
fn fcc_param() -> Parameter {
    Parameter {
        nx: 4,
        ny: 4,
        nz: 4,
        ..Default::default()
    }
}

fn simulation(param: Parameter) -> Simulation {
    let mut param = param;
    let (atom, simbox) = create_fcc_lattice(&mut param).unwrap();
    Simulation::new(param, simbox, atom, None).unwrap()
}

#[test]
fn test_coordination_counts() {
    let mut sim = simulation(fcc_param());
    sim.setup().unwrap();
    assert_eq!(sim.atom.n_local, 256);

    let Neighbors::Verlet(list) = &sim.neighbors else {
        panic!("expected a Verlet list");
    };
    for i in 0..sim.atom.n_local {
        assert_eq!(list.neighbors_of(i).len(), 78, "particle {i}");
    }

    sim.neighbors.builder_mut().prune(&sim.atom);
    let Neighbors::Verlet(list) = &sim.neighbors else {
        unreachable!()
    };
    for i in 0..sim.atom.n_local {
        assert_eq!(list.neighbors_of(i).len(), 54, "particle {i}");
    }
}

#[test]
fn test_half_list_stores_each_pair_once() {
    let mut sim = simulation(Parameter {
        half_neigh: true,
        ..fcc_param()
    });
    sim.setup().unwrap();
    assert_eq!(sim.neighbors.builder().num_entries(), 256 * 78 / 2);
}

#[test]
fn test_lattice_forces_vanish_for_every_kernel() {
    for strategy in [NeighborStrategy::Verlet, NeighborStrategy::ClusterPair] {
        for variant in [KernelVariant::Scalar, KernelVariant::Simd] {
            for half_neigh in [false, true] {
                let mut sim = simulation(Parameter {
                    strategy,
                    variant,
                    half_neigh,
                    ..fcc_param()
                });
                sim.compute_force().unwrap();

                for i in 0..sim.atom.n_local {
                    assert!(
                        sim.atom.forces[i].norm() < 1e-9,
                        "{strategy:?} {variant:?} half={half_neigh}: particle {i} has {}",
                        sim.atom.forces[i]
                    );
                }
                let pairs_in_range = if half_neigh { 256 * 54 / 2 } else { 256 * 54 };
                assert_eq!(sim.stats.atoms_within_cutoff, pairs_in_range);
            }
        }
    }
}
