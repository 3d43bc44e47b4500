use approx::assert_relative_eq;
use mdbench_rs::{
    KernelVariant, NeighborBuilder, NeighborStrategy, Parameter, Simulation, create_fcc_lattice,
};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn param(strategy: NeighborStrategy, half_neigh: bool) -> Parameter {
    Parameter {
        nx: 4,
        ny: 4,
        nz: 4,
        strategy,
        variant: KernelVariant::Simd,
        half_neigh,
        reneigh_every: 10,
        prune_every: 1000,
        ..Default::default()
    }
}

fn displacements(n: usize, max: f64, seed: u64) -> Vec<Vector3<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Vector3::new(
                rng.gen_range(-max..max),
                rng.gen_range(-max..max),
                rng.gen_range(-max..max),
            )
        })
        .collect()
}

fn fresh_forces(sim: &Simulation) -> Vec<Vector3<f64>> {
    let mut fresh = Simulation::new(
        sim.param.clone(),
        sim.simbox.clone(),
        sim.atom.clone(),
        None,
    )
    .unwrap();
    fresh.compute_force().unwrap();
    fresh.atom.forces[..fresh.atom.n_local].to_vec()
}

/// Moves below half the skin keep every force-range pair in a stale list.
#[test]
fn test_stale_lists_stay_exact_within_skin() {
    for strategy in [NeighborStrategy::Verlet, NeighborStrategy::ClusterPair] {
        for half_neigh in [false, true] {
            let mut p = param(strategy, half_neigh);
            let (atom, simbox) = create_fcc_lattice(&mut p).unwrap();
            let mut sim = Simulation::new(p, simbox, atom, None).unwrap();
            sim.setup().unwrap();

            let moves = displacements(sim.atom.n_local, 0.07, 5);
            for (i, d) in moves.iter().enumerate() {
                let pos = sim.atom.position(i) + d;
                sim.atom.set_position(i, pos);
            }
            // step 0 is not a reneighbor step: ghosts follow, lists stay
            sim.between_steps(0).unwrap();
            assert_eq!(sim.reneighbor_count(), 1);
            sim.compute_force().unwrap();

            let expected = fresh_forces(&sim);
            for (a, b) in expected.iter().zip(&sim.atom.forces[..sim.atom.n_local]) {
                assert_relative_eq!(a, b, epsilon = 1e-9, max_relative = 1e-6);
            }
        }
    }
}

#[test]
fn test_reneighbor_wraps_and_rebuilds() {
    let mut p = param(NeighborStrategy::Verlet, false);
    let (atom, simbox) = create_fcc_lattice(&mut p).unwrap();
    let lengths = *simbox.lengths();
    let mut sim = Simulation::new(p, simbox, atom, None).unwrap();
    sim.setup().unwrap();
    let n_ghost = sim.atom.n_ghost;

    // push particle 0 out through the lower x face
    let pos = sim.atom.position(0) + Vector3::new(-0.05, 0.0, 0.0);
    sim.atom.set_position(0, pos);
    for step in 0..10 {
        sim.between_steps(step).unwrap();
    }
    assert_eq!(sim.reneighbor_count(), 2);
    let wrapped = sim.atom.position(0);
    assert!(wrapped.x >= 0.0 && wrapped.x < lengths.x);
    assert_relative_eq!(wrapped.x, lengths.x - 0.05, epsilon = 1e-12);
    assert!(sim.atom.n_ghost >= n_ghost);

    for k in 0..sim.atom.n_ghost {
        let owner = sim.atom.border_map[k];
        let image = sim.atom.position(owner) + sim.simbox.lattice_vector(&sim.atom.pbc_shift[k]);
        assert_eq!(sim.atom.position(sim.atom.n_local + k), image);
    }

    sim.compute_force().unwrap();
    let expected = fresh_forces(&sim);
    for (a, b) in expected.iter().zip(&sim.atom.forces[..sim.atom.n_local]) {
        assert_relative_eq!(a, b, epsilon = 1e-9, max_relative = 1e-6);
    }
}

#[test]
fn test_prune_keeps_forces() {
    for strategy in [NeighborStrategy::Verlet, NeighborStrategy::ClusterPair] {
        let mut p = Parameter {
            prune_every: 1,
            ..param(strategy, true)
        };
        let (atom, simbox) = create_fcc_lattice(&mut p).unwrap();
        let mut sim = Simulation::new(p, simbox, atom, None).unwrap();
        sim.setup().unwrap();
        let before = sim.neighbors.builder().num_entries();

        for (i, d) in displacements(sim.atom.n_local, 0.05, 9).iter().enumerate() {
            let pos = sim.atom.position(i) + d;
            sim.atom.set_position(i, pos);
        }
        sim.between_steps(0).unwrap();
        assert!(sim.neighbors.builder().num_entries() <= before);

        sim.compute_force().unwrap();
        let expected = fresh_forces(&sim);
        for (a, b) in expected.iter().zip(&sim.atom.forces[..sim.atom.n_local]) {
            assert_relative_eq!(a, b, epsilon = 1e-9, max_relative = 1e-6);
        }
    }
}
