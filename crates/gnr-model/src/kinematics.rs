//! Global kinematic state arrays.
//!
//! Each array is indexed by (dof, global node). The structural unknowns live
//! in the rows `offset..offset + dim`, where `offset` comes from the equation
//! record; the remaining rows belong to other equations of a coupled problem.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// One of the three kinematic arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KinematicField {
    Acceleration,
    Velocity,
    Displacement,
}

impl KinematicField {
    pub const ALL: [KinematicField; 3] = [
        KinematicField::Acceleration,
        KinematicField::Velocity,
        KinematicField::Displacement,
    ];
}

/// Acceleration, velocity and displacement at the generalized-α stage
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicState {
    pub acceleration: DMatrix<f64>,
    pub velocity: DMatrix<f64>,
    pub displacement: DMatrix<f64>,
    /// Nodal activation passed through to the constitutive model
    pub activation: Option<DVector<f64>>,
}

impl KinematicState {
    /// All-zero state with `num_dofs` rows and `num_nodes` columns
    pub fn zeros(num_dofs: usize, num_nodes: usize) -> Self {
        Self {
            acceleration: DMatrix::zeros(num_dofs, num_nodes),
            velocity: DMatrix::zeros(num_dofs, num_nodes),
            displacement: DMatrix::zeros(num_dofs, num_nodes),
            activation: None,
        }
    }

    /// Attach a nodal activation field
    pub fn with_activation(mut self, activation: DVector<f64>) -> Self {
        self.activation = Some(activation);
        self
    }

    pub fn num_dofs(&self) -> usize {
        self.displacement.nrows()
    }

    pub fn num_nodes(&self) -> usize {
        self.displacement.ncols()
    }

    pub fn field(&self, kind: KinematicField) -> &DMatrix<f64> {
        match kind {
            KinematicField::Acceleration => &self.acceleration,
            KinematicField::Velocity => &self.velocity,
            KinematicField::Displacement => &self.displacement,
        }
    }

    pub fn field_mut(&mut self, kind: KinematicField) -> &mut DMatrix<f64> {
        match kind {
            KinematicField::Acceleration => &mut self.acceleration,
            KinematicField::Velocity => &mut self.velocity,
            KinematicField::Displacement => &mut self.displacement,
        }
    }

    /// Check that all three arrays share one shape and the activation
    /// (if any) covers every node.
    pub fn is_consistent(&self) -> bool {
        let shape = self.displacement.shape();
        self.acceleration.shape() == shape
            && self.velocity.shape() == shape
            && self
                .activation
                .as_ref()
                .is_none_or(|act| act.len() == self.num_nodes())
    }

    /// Activation at one node, zero when no field is attached
    pub fn activation_at(&self, node: usize) -> f64 {
        self.activation.as_ref().map_or(0.0, |act| act[node])
    }
}
