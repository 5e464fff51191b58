//! Global assembly targets.
//!
//! The solver never owns the global system; it scatters finished local
//! blocks into whatever implements [`AssemblyBackend`]. Two targets are
//! provided:
//! - [`DenseSystem`]: dense residual and tangent, for small problems and tests
//! - [`TripletSystem`]: COO triplets converted to CSR on demand, the
//!   interchange format consumed by sparse and distributed solvers
//!
//! Global dof numbering is node-major: dof `i` of node `A` is row
//! `A * dofs_per_node + i`.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::error::{Result, SolverError};

/// Receiver of local residual and tangent blocks
pub trait AssemblyBackend {
    /// Dofs per node of the global numbering
    fn dofs_per_node(&self) -> usize;

    /// Add a local residual laid out as `a * dofs_per_node + i`
    fn add_residual(&mut self, nodes: &[usize], local: &DVector<f64>);

    /// Add a local tangent block; rows follow `row_nodes`, columns follow
    /// `col_nodes`, both with the node-major layout
    fn add_tangent(&mut self, row_nodes: &[usize], col_nodes: &[usize], local: &DMatrix<f64>);
}

/// Dense global system
#[derive(Debug, Clone)]
pub struct DenseSystem {
    pub residual: DVector<f64>,
    pub tangent: DMatrix<f64>,
    dofs_per_node: usize,
}

impl DenseSystem {
    pub fn new(num_nodes: usize, dofs_per_node: usize) -> Self {
        let n = num_nodes * dofs_per_node;
        Self {
            residual: DVector::zeros(n),
            tangent: DMatrix::zeros(n, n),
            dofs_per_node,
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.residual.len()
    }

    /// Zero residual and tangent, keeping the allocation
    pub fn clear(&mut self) {
        self.residual.fill(0.0);
        self.tangent.fill(0.0);
    }
}

impl AssemblyBackend for DenseSystem {
    fn dofs_per_node(&self) -> usize {
        self.dofs_per_node
    }

    fn add_residual(&mut self, nodes: &[usize], local: &DVector<f64>) {
        let d = self.dofs_per_node;
        for (a, &node) in nodes.iter().enumerate() {
            for i in 0..d {
                self.residual[node * d + i] += local[a * d + i];
            }
        }
    }

    fn add_tangent(&mut self, row_nodes: &[usize], col_nodes: &[usize], local: &DMatrix<f64>) {
        let d = self.dofs_per_node;
        for (a, &row) in row_nodes.iter().enumerate() {
            for (b, &col) in col_nodes.iter().enumerate() {
                for i in 0..d {
                    for j in 0..d {
                        self.tangent[(row * d + i, col * d + j)] += local[(a * d + i, b * d + j)];
                    }
                }
            }
        }
    }
}

/// Sparse global system collected as COO triplets
#[derive(Debug, Clone)]
pub struct TripletSystem {
    pub residual: DVector<f64>,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
    dofs_per_node: usize,
}

impl TripletSystem {
    pub fn new(num_nodes: usize, dofs_per_node: usize) -> Self {
        Self {
            residual: DVector::zeros(num_nodes * dofs_per_node),
            rows: Vec::new(),
            cols: Vec::new(),
            values: Vec::new(),
            dofs_per_node,
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.residual.len()
    }

    /// Number of stored triplets (duplicates are summed on conversion)
    pub fn num_triplets(&self) -> usize {
        self.values.len()
    }

    /// Convert the triplets to CSR, summing duplicates
    pub fn to_csr(&self) -> Result<CsrMatrix<f64>> {
        let n = self.num_dofs();
        let coo = CooMatrix::try_from_triplets(
            n,
            n,
            self.rows.clone(),
            self.cols.clone(),
            self.values.clone(),
        )
        .map_err(|e| SolverError::Dimension(format!("Failed to create COO matrix: {:?}", e)))?;
        Ok(CsrMatrix::from(&coo))
    }

    pub fn clear(&mut self) {
        self.residual.fill(0.0);
        self.rows.clear();
        self.cols.clear();
        self.values.clear();
    }
}

impl AssemblyBackend for TripletSystem {
    fn dofs_per_node(&self) -> usize {
        self.dofs_per_node
    }

    fn add_residual(&mut self, nodes: &[usize], local: &DVector<f64>) {
        let d = self.dofs_per_node;
        for (a, &node) in nodes.iter().enumerate() {
            for i in 0..d {
                self.residual[node * d + i] += local[a * d + i];
            }
        }
    }

    fn add_tangent(&mut self, row_nodes: &[usize], col_nodes: &[usize], local: &DMatrix<f64>) {
        let d = self.dofs_per_node;
        for (a, &row) in row_nodes.iter().enumerate() {
            for (b, &col) in col_nodes.iter().enumerate() {
                for i in 0..d {
                    for j in 0..d {
                        let v = local[(a * d + i, b * d + j)];
                        if v != 0.0 {
                            self.rows.push(row * d + i);
                            self.cols.push(col * d + j);
                            self.values.push(v);
                        }
                    }
                }
            }
        }
    }
}
