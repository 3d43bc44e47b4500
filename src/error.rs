use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MdError {
    /// The neighbor cutoff does not fit into the periodic box, so a single
    /// layer of ghost images cannot cover every interaction.
    #[error(
        "Degenerate geometry on axis {axis}: box length {box_len} must exceed the neighbor cutoff {cutneigh}"
    )]
    DegenerateGeometry {
        axis: usize,
        box_len: f64,
        cutneigh: f64,
    },
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Unsupported combination: {0}")]
    UnsupportedCombination(String),
    #[error("Invalid spline table: {0}")]
    InvalidTable(String),
    #[error("Bin grid has no cells (extent {extent:?}, bin size {bin_size})")]
    EmptyGrid { extent: [f64; 3], bin_size: f64 },
}

pub type Result<T> = std::result::Result<T, MdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_geometry_message() {
        let err = MdError::DegenerateGeometry {
            axis: 1,
            box_len: 2.0,
            cutneigh: 2.8,
        };
        let msg = err.to_string();
        assert!(msg.contains("axis 1"));
        assert!(msg.contains("2.8"));
    }

    #[test]
    fn test_unsupported_combination_message() {
        let err = MdError::UnsupportedCombination("eam + simd".into());
        assert_eq!(err.to_string(), "Unsupported combination: eam + simd");
    }
}
