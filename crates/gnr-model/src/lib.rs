//! Data model for growth-and-remodeling solid mechanics.
//!
//! This crate holds the records the solver consumes but does not own:
//! - Element types and their Gauss-point shape tables
//! - The mesh with optional nodal prestress, growth properties and body force
//! - Node-to-element adjacency maps at two granularities
//! - Global kinematic arrays (acceleration, velocity, displacement)
//! - Equation, domain and generalized-α time-integration records

pub mod adjacency;
pub mod equation;
pub mod kinematics;
pub mod mesh;
pub mod shape;

pub use adjacency::{Granularity, NodeElementMap};
pub use equation::{Domain, Equation, Physics, SolidProperties, TimeIntegration};
pub use kinematics::{KinematicField, KinematicState};
pub use mesh::{Element, Mesh, MeshError, gather_columns};
pub use shape::{ElementType, FaceSample, ShapeTable, map_gradients};
