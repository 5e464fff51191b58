//! Error types for gnr-solver

use gnr_model::MeshError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolverError>;

/// Failures of element evaluation and assembly.
///
/// All variants are fatal for the current analysis step: the caller is
/// expected to abandon the step (cut back the time step or stop), never to
/// retry with the same state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Inverted element {element} at Gauss point {gauss_point}: det F = {jacobian:e}")]
    InvertedElement {
        element: usize,
        gauss_point: usize,
        jacobian: f64,
    },

    #[error(
        "Degenerate element {element} at Gauss point {gauss_point}: reference mapping determinant = {determinant:e}"
    )]
    DegenerateElement {
        element: usize,
        gauss_point: usize,
        determinant: f64,
    },

    #[error("Dimension mismatch: {0}")]
    Dimension(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),
}

impl SolverError {
    /// True for the inverted-element failure that signals mesh collapse
    /// or divergence of the outer iteration.
    pub fn is_inversion(&self) -> bool {
        matches!(self, SolverError::InvertedElement { .. })
    }
}
