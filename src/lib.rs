pub mod atom;
pub mod binning;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod force;
pub mod lattice;
pub mod neighbor;
pub mod pbc;
pub mod simd;
pub mod stats;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

pub use atom::{Atom, PositionStorage, TypeParams};
pub use binning::BinGrid;
pub use config::{DataLayout, ForceField, KernelVariant, NeighborStrategy, Parameter};
pub use domain::SimBox;
pub use engine::Simulation;
pub use error::{MdError, Result};
pub use force::{Eam, EamTables, compute_force};
pub use lattice::create_fcc_lattice;
pub use neighbor::{ClusterPairList, NeighborBuilder, NeighborList, Neighbors};
pub use stats::Stats;

use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber. `RUST_LOG` wins over `level`; a second
/// call is a no-op.
pub fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_thread_ids(true)
        .try_init();
}
