//! First-order Lagrange element types and their Gauss-point shape tables.
//!
//! Supports:
//! - Tri3: 3-node triangle, 3-point rule
//! - Quad4: 4-node quadrilateral, 2×2 Gauss rule
//! - Tet4: 4-node tetrahedron, 4-point rule
//! - Hex8: 8-node hexahedron (brick), 2×2×2 Gauss rule
//!
//! Hex8 node ordering (same as the C3D8 convention):
//! ```text
//!        7----------6
//!       /|         /|
//!      / |        / |
//!     4----------5  |
//!     |  3-------|--2
//!     | /        | /
//!     |/         |/
//!     0----------1
//! ```

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

/// Element type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// 3-node linear triangle
    Tri3,
    /// 4-node bilinear quadrilateral
    Quad4,
    /// 4-node linear tetrahedron
    Tet4,
    /// 8-node trilinear hexahedron
    Hex8,
}

impl ElementType {
    /// Get the number of nodes for this element type
    pub fn num_nodes(&self) -> usize {
        match self {
            ElementType::Tri3 => 3,
            ElementType::Quad4 | ElementType::Tet4 => 4,
            ElementType::Hex8 => 8,
        }
    }

    /// Spatial dimension of the parent domain
    pub fn dim(&self) -> usize {
        match self {
            ElementType::Tri3 | ElementType::Quad4 => 2,
            ElementType::Tet4 | ElementType::Hex8 => 3,
        }
    }

    /// Simplices have constant shape-function gradients, so the
    /// reference-to-physical map only needs to be computed once per element.
    pub fn has_constant_gradients(&self) -> bool {
        matches!(self, ElementType::Tri3 | ElementType::Tet4)
    }

    /// Number of faces (edges in 2D) with a built-in face rule
    pub fn num_faces(&self) -> usize {
        match self {
            ElementType::Quad4 => 4,
            ElementType::Hex8 => 6,
            ElementType::Tri3 | ElementType::Tet4 => 0,
        }
    }

    /// Gauss points and weights in parametric coordinates
    pub fn gauss_rule(&self) -> (Vec<Vec<f64>>, Vec<f64>) {
        match self {
            ElementType::Tri3 => {
                let a = 1.0 / 6.0;
                let b = 2.0 / 3.0;
                (
                    vec![vec![a, a], vec![b, a], vec![a, b]],
                    vec![1.0 / 6.0; 3],
                )
            }
            ElementType::Quad4 => {
                let gp = 1.0 / f64::sqrt(3.0);
                (
                    vec![
                        vec![-gp, -gp],
                        vec![gp, -gp],
                        vec![gp, gp],
                        vec![-gp, gp],
                    ],
                    vec![1.0; 4],
                )
            }
            ElementType::Tet4 => {
                let a = 0.585_410_196_624_968_5;
                let b = 0.138_196_601_125_010_5;
                (
                    vec![
                        vec![b, b, b],
                        vec![a, b, b],
                        vec![b, a, b],
                        vec![b, b, a],
                    ],
                    vec![1.0 / 24.0; 4],
                )
            }
            ElementType::Hex8 => {
                let gp = 1.0 / f64::sqrt(3.0);
                (
                    vec![
                        vec![-gp, -gp, -gp],
                        vec![gp, -gp, -gp],
                        vec![gp, gp, -gp],
                        vec![-gp, gp, -gp],
                        vec![-gp, -gp, gp],
                        vec![gp, -gp, gp],
                        vec![gp, gp, gp],
                        vec![-gp, gp, gp],
                    ],
                    vec![1.0; 8],
                )
            }
        }
    }

    /// Shape values N (node count) and parametric gradients dN/dξ
    /// (dim × node count) at a parametric point.
    pub fn evaluate(&self, xi: &[f64]) -> (DVector<f64>, DMatrix<f64>) {
        let nen = self.num_nodes();
        let dim = self.dim();
        let mut n = DVector::zeros(nen);
        let mut dn = DMatrix::zeros(dim, nen);

        match self {
            ElementType::Tri3 => {
                let (r, s) = (xi[0], xi[1]);
                n[0] = 1.0 - r - s;
                n[1] = r;
                n[2] = s;
                dn[(0, 0)] = -1.0;
                dn[(1, 0)] = -1.0;
                dn[(0, 1)] = 1.0;
                dn[(1, 2)] = 1.0;
            }
            ElementType::Quad4 => {
                let xi_n = [-1.0, 1.0, 1.0, -1.0];
                let eta_n = [-1.0, -1.0, 1.0, 1.0];
                for a in 0..4 {
                    n[a] = (1.0 + xi[0] * xi_n[a]) * (1.0 + xi[1] * eta_n[a]) / 4.0;
                    dn[(0, a)] = xi_n[a] * (1.0 + xi[1] * eta_n[a]) / 4.0;
                    dn[(1, a)] = (1.0 + xi[0] * xi_n[a]) * eta_n[a] / 4.0;
                }
            }
            ElementType::Tet4 => {
                let (r, s, t) = (xi[0], xi[1], xi[2]);
                n[0] = 1.0 - r - s - t;
                n[1] = r;
                n[2] = s;
                n[3] = t;
                for i in 0..3 {
                    dn[(i, 0)] = -1.0;
                    dn[(i, i + 1)] = 1.0;
                }
            }
            ElementType::Hex8 => {
                // N_a = (1 + ξξ_a)(1 + ηη_a)(1 + ζζ_a) / 8
                let xi_n = [-1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0];
                let eta_n = [-1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0];
                let zeta_n = [-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0];
                let (r, s, t) = (xi[0], xi[1], xi[2]);
                for a in 0..8 {
                    let fr = 1.0 + r * xi_n[a];
                    let fs = 1.0 + s * eta_n[a];
                    let ft = 1.0 + t * zeta_n[a];
                    n[a] = fr * fs * ft / 8.0;
                    dn[(0, a)] = xi_n[a] * fs * ft / 8.0;
                    dn[(1, a)] = fr * eta_n[a] * ft / 8.0;
                    dn[(2, a)] = fr * fs * zeta_n[a] / 8.0;
                }
            }
        }

        (n, dn)
    }

    /// Build the Gauss-point shape table for this element type
    pub fn shape_table(&self) -> ShapeTable {
        let (points, weights) = self.gauss_rule();
        let mut n = DMatrix::zeros(self.num_nodes(), points.len());
        let mut dn = Vec::with_capacity(points.len());
        for (g, xi) in points.iter().enumerate() {
            let (n_g, dn_g) = self.evaluate(xi);
            n.set_column(g, &n_g);
            dn.push(dn_g);
        }
        ShapeTable { n, dn, weights }
    }

    /// Face definition for tensor-product elements.
    ///
    /// Returns (fixed parametric axis, fixed value, free axes). The free axes
    /// are ordered so that the cross product of the tangents (or the rotated
    /// tangent in 2D) points out of the element.
    fn face_definition(&self, face: usize) -> Option<(usize, f64, Vec<(usize, f64)>)> {
        match (self, face) {
            // Quad4 edges, traversed counter-clockwise
            (ElementType::Quad4, 0) => Some((1, -1.0, vec![(0, 1.0)])),
            (ElementType::Quad4, 1) => Some((0, 1.0, vec![(1, 1.0)])),
            (ElementType::Quad4, 2) => Some((1, 1.0, vec![(0, -1.0)])),
            (ElementType::Quad4, 3) => Some((0, -1.0, vec![(1, -1.0)])),
            // Hex8 faces: ζ=-1, ζ=+1, η=-1, ξ=+1, η=+1, ξ=-1
            (ElementType::Hex8, 0) => Some((2, -1.0, vec![(1, 1.0), (0, 1.0)])),
            (ElementType::Hex8, 1) => Some((2, 1.0, vec![(0, 1.0), (1, 1.0)])),
            (ElementType::Hex8, 2) => Some((1, -1.0, vec![(0, 1.0), (2, 1.0)])),
            (ElementType::Hex8, 3) => Some((0, 1.0, vec![(1, 1.0), (2, 1.0)])),
            (ElementType::Hex8, 4) => Some((1, 1.0, vec![(2, 1.0), (0, 1.0)])),
            (ElementType::Hex8, 5) => Some((0, -1.0, vec![(2, 1.0), (1, 1.0)])),
            _ => None,
        }
    }

    /// Gauss samples on one face of an element with reference coordinates
    /// `xl` (dim × node count).
    ///
    /// The returned normal is outward and area-weighted: `weight * |normal|`
    /// is the reference area (length in 2D) element at the sample.
    pub fn face_samples(&self, face: usize, xl: &DMatrix<f64>) -> Option<Vec<FaceSample>> {
        let (fixed_axis, fixed_value, free) = self.face_definition(face)?;
        let dim = self.dim();
        let gp = 1.0 / f64::sqrt(3.0);
        let line = [-gp, gp];

        let mut params: Vec<Vec<f64>> = Vec::new();
        if free.len() == 1 {
            for &u in &line {
                params.push(vec![u]);
            }
        } else {
            for &v in &line {
                for &u in &line {
                    params.push(vec![u, v]);
                }
            }
        }

        let mut samples = Vec::with_capacity(params.len());
        for p in params {
            let mut xi = vec![0.0; dim];
            xi[fixed_axis] = fixed_value;
            for (k, &(axis, _)) in free.iter().enumerate() {
                xi[axis] = p[k];
            }

            let (_, dn) = self.evaluate(&xi);
            // Tangent along each free axis: dx/du = Σ x_a dN_a/du
            let tangents: Vec<Vector3<f64>> = free
                .iter()
                .map(|&(axis, sign)| {
                    let mut t = Vector3::zeros();
                    for a in 0..self.num_nodes() {
                        for i in 0..dim {
                            t[i] += sign * xl[(i, a)] * dn[(axis, a)];
                        }
                    }
                    t
                })
                .collect();

            let normal = if dim == 2 {
                Vector3::new(tangents[0][1], -tangents[0][0], 0.0)
            } else {
                tangents[0].cross(&tangents[1])
            };

            samples.push(FaceSample {
                xi,
                weight: 1.0,
                normal,
            });
        }

        Some(samples)
    }
}

/// Shape values, parametric gradients and weights at every Gauss point
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeTable {
    /// Shape values, node count × Gauss points
    pub n: DMatrix<f64>,
    /// Parametric gradients per Gauss point, each dim × node count
    pub dn: Vec<DMatrix<f64>>,
    /// Quadrature weights
    pub weights: Vec<f64>,
}

impl ShapeTable {
    pub fn num_points(&self) -> usize {
        self.weights.len()
    }
}

/// One quadrature sample on an element face
#[derive(Debug, Clone, PartialEq)]
pub struct FaceSample {
    /// Parametric coordinates in the parent element
    pub xi: Vec<f64>,
    /// Quadrature weight
    pub weight: f64,
    /// Outward reference normal scaled by the face measure (z = 0 in 2D)
    pub normal: Vector3<f64>,
}

/// Map parametric gradients to reference-configuration gradients.
///
/// `dn` is dim × node count, `xl` holds the element's reference coordinates
/// (dim × node count). Returns `Nx = J⁻ᵀ dN/dξ` and `det J`, or `None` when
/// the map is singular.
pub fn map_gradients(dn: &DMatrix<f64>, xl: &DMatrix<f64>) -> Option<(DMatrix<f64>, f64)> {
    // J(i, j) = ∂x_i/∂ξ_j
    let jac = xl * dn.transpose();
    let det = jac.determinant();
    let jac_inv = jac.try_inverse()?;
    Some((jac_inv.transpose() * dn, det))
}
