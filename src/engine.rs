//! Step orchestration around the neighbor lists and force kernels.
//!
//! Reneighbor: wrap owned particles, rebuild ghosts, bin, rebuild the list.
//! Between reneighbors only the ghost positions follow their owners, with an
//! occasional prune of the list.

use crate::atom::Atom;
use crate::binning::BinGrid;
use crate::config::{ForceField, Parameter};
use crate::domain::SimBox;
use crate::error::{MdError, Result};
use crate::force::{self, Eam, EamTables};
use crate::neighbor::Neighbors;
use crate::pbc::{setup_pbc, update_atoms_pbc, update_pbc};
use crate::stats::Stats;
use std::time::Instant;
use tracing::{debug, info, info_span};

/// Accumulated wall time in seconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct Timers {
    pub force: f64,
    pub neigh: f64,
}

pub struct Simulation {
    pub param: Parameter,
    pub simbox: SimBox,
    pub atom: Atom,
    pub neighbors: Neighbors,
    pub eam: Option<Eam>,
    pub stats: Stats,
    pub timers: Timers,
    bins: Option<BinGrid>,
    reneighbors: usize,
}

impl Simulation {
    /// Checks the configuration and takes ownership of the particles. No list
    /// exists until [`setup`](Self::setup) or the first force computation.
    pub fn new(param: Parameter, simbox: SimBox, atom: Atom, eam_tables: Option<EamTables>) -> Result<Self> {
        param.validate()?;
        simbox.check_cutoff(param.cutneigh())?;

        let eam = match (param.force_field, eam_tables) {
            (ForceField::Eam, None) => {
                return Err(MdError::InvalidParameter(
                    "EAM force field selected without tables".into(),
                ));
            }
            (ForceField::Eam, Some(tables)) => {
                if param.cutforce > tables.cutmax {
                    return Err(MdError::InvalidParameter(format!(
                        "cutforce {} exceeds the EAM table range {}",
                        param.cutforce, tables.cutmax
                    )));
                }
                if tables.ntypes() != atom.ntypes() {
                    return Err(MdError::InvalidParameter(format!(
                        "EAM tables cover {} types, particles use {}",
                        tables.ntypes(),
                        atom.ntypes()
                    )));
                }
                Some(Eam::new(tables))
            }
            (ForceField::LennardJones, _) => None,
        };

        let neighbors = Neighbors::new(param.strategy, param.half_neigh);
        Ok(Self {
            param,
            simbox,
            atom,
            neighbors,
            eam,
            stats: Stats::default(),
            timers: Timers::default(),
            bins: None,
            reneighbors: 0,
        })
    }

    /// Initial ghost creation and list build.
    pub fn setup(&mut self) -> Result<()> {
        let _span = info_span!("setup", n_local = self.atom.n_local).entered();
        self.reneighbor()?;
        info!(
            n_local = self.atom.n_local,
            n_ghost = self.atom.n_ghost,
            entries = self.neighbors.builder().num_entries(),
            "setup done"
        );
        Ok(())
    }

    /// Full rebuild: wrap, replicate, bin, build.
    pub fn reneighbor(&mut self) -> Result<()> {
        let start = Instant::now();
        let cutneigh = self.param.cutneigh();

        update_atoms_pbc(&mut self.atom, &self.simbox);
        setup_pbc(&mut self.atom, &self.simbox, cutneigh)?;
        let bins = BinGrid::build(&self.atom, cutneigh)?;
        self.neighbors.builder_mut().build(&self.atom, &bins)?;
        self.bins = Some(bins);
        self.reneighbors += 1;

        self.timers.neigh += start.elapsed().as_secs_f64();
        debug!(
            n_local = self.atom.n_local,
            n_ghost = self.atom.n_ghost,
            reneighbors = self.reneighbors,
            "reneighbored"
        );
        Ok(())
    }

    /// Work due after `step` and before the next force computation.
    pub fn between_steps(&mut self, step: usize) -> Result<()> {
        if (step + 1) % self.param.reneigh_every == 0 {
            return self.reneighbor();
        }
        let start = Instant::now();
        update_pbc(&mut self.atom, &self.simbox);
        if (step + 1) % self.param.prune_every == 0 {
            self.neighbors.builder_mut().prune(&self.atom);
            debug!(step, entries = self.neighbors.builder().num_entries(), "pruned");
        }
        self.timers.neigh += start.elapsed().as_secs_f64();
        Ok(())
    }

    /// Zeroes the forces and runs the configured kernel. Builds the lists
    /// first if that has not happened yet.
    pub fn compute_force(&mut self) -> Result<f64> {
        if self.bins.is_none() {
            self.reneighbor()?;
        }
        self.atom.zero_forces();
        let elapsed = force::compute_force(
            &self.param,
            &mut self.atom,
            &mut self.neighbors,
            self.eam.as_mut(),
            &mut self.stats,
        )?;
        self.timers.force += elapsed;
        Ok(elapsed)
    }

    /// Force computations interleaved with the reneighbor/prune schedule,
    /// without moving particles.
    pub fn run(&mut self, steps: usize) -> Result<()> {
        let _span = info_span!("run", steps).entered();
        self.compute_force()?;
        for step in 0..steps {
            self.between_steps(step)?;
            self.compute_force()?;
        }
        self.stats.log_summary(self.atom.n_local, steps + 1);
        info!(
            force_time = self.timers.force,
            neigh_time = self.timers.neigh,
            "run finished"
        );
        Ok(())
    }

    pub fn bins(&self) -> Option<&BinGrid> {
        self.bins.as_ref()
    }

    pub fn reneighbor_count(&self) -> usize {
        self.reneighbors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KernelVariant, NeighborStrategy};
    use crate::lattice::create_fcc_lattice;
    use approx::assert_relative_eq;

    fn fcc(param: &mut Parameter) -> Simulation {
        let (atom, simbox) = create_fcc_lattice(param).unwrap();
        Simulation::new(param.clone(), simbox, atom, None).unwrap()
    }

    fn small_param() -> Parameter {
        Parameter {
            nx: 4,
            ny: 4,
            nz: 4,
            ntypes: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_force_triggers_build() {
        let mut sim = fcc(&mut small_param());
        assert!(sim.bins().is_none());
        sim.compute_force().unwrap();
        assert_eq!(sim.reneighbor_count(), 1);
        assert!(sim.atom.n_ghost > 0);
        assert_relative_eq!(sim.atom.net_force().norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_schedule() {
        let mut param = Parameter {
            reneigh_every: 5,
            prune_every: 3,
            ..small_param()
        };
        let mut sim = fcc(&mut param);
        sim.setup().unwrap();
        let entries = sim.neighbors.builder().num_entries();
        for step in 0..10 {
            sim.between_steps(step).unwrap();
        }
        // setup plus steps 4 and 9
        assert_eq!(sim.reneighbor_count(), 3);
        // step 9 rebuilt the list pruned at step 8
        assert_eq!(sim.neighbors.builder().num_entries(), entries);
    }

    #[test]
    fn test_cluster_strategy_runs() {
        let mut param = Parameter {
            strategy: NeighborStrategy::ClusterPair,
            variant: KernelVariant::Simd,
            half_neigh: true,
            ..small_param()
        };
        let mut sim = fcc(&mut param);
        sim.run(3).unwrap();
        assert!(sim.timers.force >= 0.0);
        assert!(sim.stats.clusters_within_cutoff > 0);
        assert_relative_eq!(sim.atom.net_force().norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_eam_without_tables_rejected() {
        let mut param = Parameter {
            force_field: ForceField::Eam,
            ..small_param()
        };
        let (atom, simbox) = create_fcc_lattice(&mut param).unwrap();
        assert!(matches!(
            Simulation::new(param, simbox, atom, None),
            Err(MdError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_box_smaller_than_cutoff_rejected() {
        let mut param = Parameter {
            nx: 1,
            ny: 1,
            nz: 1,
            ..small_param()
        };
        let (atom, simbox) = create_fcc_lattice(&mut param).unwrap();
        assert!(matches!(
            Simulation::new(param, simbox, atom, None),
            Err(MdError::DegenerateGeometry { .. })
        ));
    }
}
