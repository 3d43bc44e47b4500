//! Synthetic cluster systems with prescribed j-cluster access patterns, for
//! timing the cluster kernels independently of the list builder.

use super::cluster::{ClusterLayout, ClusterPairList};
use super::masks::{Diagonal, ExclusionMasks};
use crate::atom::{Atom, TypeParams};
use crate::config::{CLUSTER_M, Parameter};
use crate::error::{MdError, Result};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::str::FromStr;
use tracing::info;

/// Spacing along the diagonal between consecutive synthetic particles.
const SYNTHETIC_SPACING: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborPattern {
    /// Cluster `ci` sees `ci, ci + 1, ...` (wrapping).
    Seq,
    /// Every cluster sees `0, 1, ..., nneighs - 1`.
    Fix,
    /// Distinct j-clusters drawn uniformly at random.
    Rand,
}

impl FromStr for NeighborPattern {
    type Err = MdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "seq" => Ok(Self::Seq),
            "fix" => Ok(Self::Fix),
            "rand" => Ok(Self::Rand),
            other => Err(MdError::InvalidParameter(format!(
                "unknown neighbor pattern '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticSetup {
    pub pattern: NeighborPattern,
    pub niclusters: usize,
    /// Real particles per cluster, at most `CLUSTER_M`.
    pub iclusters_natoms: usize,
    /// j-cluster entries per i-cluster before replication.
    pub nneighs: usize,
    /// How many times each row is repeated.
    pub nreps: usize,
    /// When false no i-cluster lists itself, so every entry carries the plain
    /// real-slot mask and no diagonal exclusions are exercised.
    pub masked: bool,
    pub seed: u64,
}

impl Default for SyntheticSetup {
    fn default() -> Self {
        Self {
            pattern: NeighborPattern::Seq,
            niclusters: 256,
            iclusters_natoms: CLUSTER_M,
            nneighs: 9,
            nreps: 1,
            masked: true,
            seed: 0,
        }
    }
}

/// Builds the particles and the full cluster-pair list of a synthetic system.
/// All particles sit on one line so that every pair is inside a large cutoff.
pub fn create_synthetic_system(
    param: &Parameter,
    setup: &SyntheticSetup,
) -> Result<(Atom, ClusterPairList)> {
    if setup.iclusters_natoms == 0 || setup.iclusters_natoms > CLUSTER_M {
        return Err(MdError::InvalidParameter(format!(
            "clusters hold between 1 and {CLUSTER_M} particles"
        )));
    }
    if setup.niclusters == 0 || setup.nneighs == 0 || setup.nreps == 0 {
        return Err(MdError::InvalidParameter(
            "synthetic system needs clusters, neighbors and repetitions".into(),
        ));
    }
    if (setup.pattern == NeighborPattern::Rand || !setup.masked) && setup.niclusters <= setup.nneighs {
        return Err(MdError::InvalidParameter(
            "random and unmasked patterns need more j-clusters than neighbors per i-cluster".into(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(setup.seed);
    let params = TypeParams::uniform(
        param.ntypes,
        param.epsilon,
        param.sigma6,
        param.cutforce,
        param.cutneigh(),
    );
    let mut atom = Atom::new(param.layout, params);
    let mut layout = ClusterLayout::new(1);
    let mut members = Vec::with_capacity(setup.iclusters_natoms);

    for ci in 0..setup.niclusters {
        members.clear();
        for cii in 0..setup.iclusters_natoms {
            let d = (ci * setup.iclusters_natoms + cii) as f64 * SYNTHETIC_SPACING;
            let type_id = rng.gen_range(0..param.ntypes);
            members.push(atom.append(Vector3::new(d, d, d), Vector3::zeros(), type_id)?);
        }
        layout.push_cluster(&atom, Vector3::zeros(), 0, &members);
    }

    let rows = pattern_rows(&layout, setup, &mut rng);
    let mut list = ClusterPairList::new(false);
    list.layout = layout;
    list.set_rows(rows);

    info!(
        pattern = ?setup.pattern,
        niclusters = setup.niclusters,
        nneighs = setup.nneighs,
        nreps = setup.nreps,
        masked = setup.masked,
        "synthetic cluster system created"
    );
    Ok((atom, list))
}

fn pattern_rows(
    layout: &ClusterLayout,
    setup: &SyntheticSetup,
    rng: &mut StdRng,
) -> Vec<Vec<(usize, u16)>> {
    let masks = ExclusionMasks::global();
    let ncj = layout.n_clusters();
    let natoms = setup.iclusters_natoms;
    let imask = |ci: usize, cj: usize| {
        let diag = if ci == cj { Diagonal::Full } else { Diagonal::None };
        masks.lookup(natoms, natoms, diag)
    };

    (0..layout.n_local_clusters)
        .map(|ci| {
            let mut base: Vec<usize> = Vec::with_capacity(setup.nneighs);
            let admits = |cj: usize| setup.masked || cj != ci;
            match setup.pattern {
                NeighborPattern::Seq => {
                    let first = usize::from(!setup.masked);
                    base.extend((first..first + setup.nneighs).map(|k| (ci + k) % ncj))
                }
                NeighborPattern::Fix => {
                    base.extend((0..).map(|k| k % ncj).filter(|&cj| admits(cj)).take(setup.nneighs))
                }
                NeighborPattern::Rand => {
                    while base.len() < setup.nneighs {
                        let cj = rng.gen_range(0..ncj);
                        if admits(cj) && !base.contains(&cj) {
                            base.push(cj);
                        }
                    }
                }
            }
            let row: Vec<(usize, u16)> = base.iter().map(|&cj| (cj, imask(ci, cj))).collect();
            row.iter()
                .copied()
                .cycle()
                .take(row.len() * setup.nreps)
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::NeighborBuilder;

    fn setup(pattern: NeighborPattern) -> SyntheticSetup {
        SyntheticSetup {
            pattern,
            niclusters: 16,
            iclusters_natoms: 3,
            nneighs: 5,
            nreps: 2,
            masked: true,
            seed: 7,
        }
    }

    #[test]
    fn test_seq_pattern() {
        let (atom, list) = create_synthetic_system(&Parameter::default(), &setup(NeighborPattern::Seq)).unwrap();
        assert_eq!(atom.n_local, 48);
        assert_eq!(list.layout.n_local_clusters, 16);
        let row: Vec<usize> = list.entries_of(14).map(|(cj, _)| cj).collect();
        assert_eq!(row, vec![14, 15, 0, 1, 2, 14, 15, 0, 1, 2]);
        // self entry excludes the diagonal and the dummy slot
        let (_, self_mask) = list.entries_of(14).next().unwrap();
        assert_eq!(self_mask.count_ones(), 6);
    }

    #[test]
    fn test_fix_pattern_shares_rows() {
        let (_, list) = create_synthetic_system(&Parameter::default(), &setup(NeighborPattern::Fix)).unwrap();
        let first: Vec<usize> = list.entries_of(3).map(|(cj, _)| cj).collect();
        let second: Vec<usize> = list.entries_of(9).map(|(cj, _)| cj).collect();
        assert_eq!(first, second);
        assert_eq!(list.num_entries(), 16 * 10);
    }

    #[test]
    fn test_rand_pattern_is_distinct_and_seeded() {
        let (_, a) = create_synthetic_system(&Parameter::default(), &setup(NeighborPattern::Rand)).unwrap();
        let (_, b) = create_synthetic_system(&Parameter::default(), &setup(NeighborPattern::Rand)).unwrap();
        for ci in 0..16 {
            let row: Vec<usize> = a.entries_of(ci).map(|(cj, _)| cj).take(5).collect();
            let mut sorted = row.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 5);
            assert!(a.entries_of(ci).eq(b.entries_of(ci)));
        }
    }

    #[test]
    fn test_rand_pattern_needs_enough_clusters() {
        let mut s = setup(NeighborPattern::Rand);
        s.nneighs = 16;
        assert!(create_synthetic_system(&Parameter::default(), &s).is_err());
    }

    #[test]
    fn test_unmasked_rows_skip_self() {
        let masks = ExclusionMasks::global();
        let plain = masks.lookup(3, 3, Diagonal::None);
        for pattern in [NeighborPattern::Seq, NeighborPattern::Fix, NeighborPattern::Rand] {
            let mut s = setup(pattern);
            s.masked = false;
            let (_, list) = create_synthetic_system(&Parameter::default(), &s).unwrap();
            assert_eq!(list.num_entries(), 16 * 10);
            for ci in 0..16 {
                assert!(list.entries_of(ci).all(|(cj, imask)| cj != ci && imask == plain));
            }
        }
        let (_, seq) = create_synthetic_system(&Parameter::default(), &{
            let mut s = setup(NeighborPattern::Seq);
            s.masked = false;
            s
        })
        .unwrap();
        let row: Vec<usize> = seq.entries_of(14).map(|(cj, _)| cj).take(5).collect();
        assert_eq!(row, vec![15, 0, 1, 2, 3]);
    }

    #[test]
    fn test_unmasked_needs_enough_clusters() {
        let mut s = setup(NeighborPattern::Fix);
        s.masked = false;
        s.nneighs = 16;
        assert!(create_synthetic_system(&Parameter::default(), &s).is_err());
    }

    #[test]
    fn test_pattern_from_str() {
        assert_eq!("fix".parse::<NeighborPattern>().unwrap(), NeighborPattern::Fix);
        assert!("zigzag".parse::<NeighborPattern>().is_err());
    }
}
