//! Follower-pressure boundary loads.
//!
//! A pressure of magnitude h acts along the current normal of a face. By
//! Nanson's formula the current area-weighted normal is J F⁻ᵀ N dA, so the
//! external force at node a is
//!
//! ```text
//! f_a = ∫ h N_a J F⁻ᵀ N dA
//! ```
//!
//! and is subtracted from the residual. Its linearization is skew in the
//! dof indices: the load rotates with the surface.
//!
//! Shape functions and gradients are those of the parent element evaluated
//! at the face's Gauss points, so F is the full volumetric deformation
//! gradient.

use std::time::Instant;

use nalgebra::{DMatrix, DVector, SMatrix, SVector};

use gnr_model::{ElementType, FaceSample, Mesh, TimeIntegration, gather_columns, map_gradients};

use crate::assembly::{AssemblyReport, check_backend};
use crate::backend::AssemblyBackend;
use crate::element::ElementContext;
use crate::error::{Result, SolverError};
use crate::tensor::{det, inverse};

/// Inputs at one face Gauss point
#[derive(Debug, Clone)]
pub struct TractionPoint<'a, const D: usize> {
    pub element: usize,
    pub gauss_point: usize,
    /// Quadrature weight
    pub weight: f64,
    /// Parent-element shape values
    pub n: &'a DVector<f64>,
    /// Parent-element reference gradients, D × element nodes
    pub nx: &'a DMatrix<f64>,
    /// Local displacement, total dofs × element nodes
    pub displacement: &'a DMatrix<f64>,
    pub offset: usize,
    /// Outward reference normal scaled by the face measure
    pub normal: SVector<f64, D>,
    /// Interpolated pressure magnitude
    pub pressure: f64,
}

/// Accumulate the follower-pressure residual and load stiffness of one
/// face point.
///
/// # Arguments
/// * `point` - Face point data
/// * `time` - Generalized-α coefficients (the tangent is scaled by α_f β Δt²)
/// * `residual` - Local residual, D × element nodes
/// * `tangent` - Local tangent
pub fn follower_pressure_point<const D: usize>(
    point: &TractionPoint<'_, D>,
    time: &TimeIntegration,
    residual: &mut DVector<f64>,
    tangent: &mut DMatrix<f64>,
) -> Result<()> {
    let nen = point.n.len();
    let s = point.offset;
    let nx = point.nx;

    let mut f = SMatrix::<f64, D, D>::identity();
    for a in 0..nen {
        for i in 0..D {
            for j in 0..D {
                f[(i, j)] += nx[(j, a)] * point.displacement[(s + i, a)];
            }
        }
    }
    let jac = det(&f);
    let inverted = SolverError::InvertedElement {
        element: point.element,
        gauss_point: point.gauss_point,
        jacobian: jac,
    };
    if jac.is_nan() || jac <= 0.0 {
        return Err(inverted);
    }
    let fi = inverse(&f).ok_or(inverted)?;

    // F⁻ᵀ N and F⁻ᵀ ∇N_a
    let n_fi = fi.transpose() * point.normal;
    let mut nx_fi = DMatrix::<f64>::zeros(D, nen);
    for a in 0..nen {
        for i in 0..D {
            for k in 0..D {
                nx_fi[(i, a)] += fi[(k, i)] * nx[(k, a)];
            }
        }
    }

    let wl = point.weight * jac * point.pressure;
    let afu = time.afu();
    for a in 0..nen {
        for i in 0..D {
            residual[a * D + i] -= wl * point.n[a] * n_fi[i];
        }
        for b in 0..nen {
            for i in 0..D {
                for j in (i + 1)..D {
                    let ku = wl
                        * afu
                        * point.n[a]
                        * (n_fi[j] * nx_fi[(i, b)] - n_fi[i] * nx_fi[(j, b)]);
                    tangent[(a * D + i, b * D + j)] += ku;
                    tangent[(a * D + j, b * D + i)] -= ku;
                }
            }
        }
    }

    Ok(())
}

/// Face of an element carrying a pressure load
#[derive(Debug, Clone, PartialEq)]
pub struct PressureFace {
    pub element: usize,
    pub samples: Vec<FaceSample>,
}

impl PressureFace {
    /// Face with explicitly supplied samples (needed for simplices)
    pub fn new(element: usize, samples: Vec<FaceSample>) -> Self {
        Self { element, samples }
    }

    /// Face `face` of `element` using the built-in face rule
    pub fn from_face(mesh: &Mesh, element: usize, face: usize) -> Result<Self> {
        let et = mesh.element_type();
        let xl = mesh.element_coords(element);
        let samples = et.face_samples(face, &xl).ok_or_else(|| {
            SolverError::Dimension(format!(
                "{:?} has no built-in rule for face {} (it has {})",
                et,
                face,
                et.num_faces()
            ))
        })?;
        Ok(Self { element, samples })
    }
}

/// Follower pressure over a set of faces with nodal magnitudes
#[derive(Debug, Clone, PartialEq)]
pub struct PressureLoad {
    pub faces: Vec<PressureFace>,
    /// Pressure magnitude per global node
    pub pressure: DVector<f64>,
}

impl PressureLoad {
    pub fn new(faces: Vec<PressureFace>, pressure: DVector<f64>) -> Self {
        Self { faces, pressure }
    }

    /// Uniform magnitude on every node
    pub fn uniform(faces: Vec<PressureFace>, num_nodes: usize, magnitude: f64) -> Self {
        Self::new(faces, DVector::from_element(num_nodes, magnitude))
    }

    /// Assemble residual and load stiffness of every face
    pub fn assemble<B: AssemblyBackend>(
        &self,
        ctx: &ElementContext<'_>,
        backend: &mut B,
    ) -> Result<AssemblyReport> {
        let start = Instant::now();
        check_backend(ctx, backend)?;
        if self.pressure.len() != ctx.mesh.num_nodes() {
            return Err(SolverError::Dimension(format!(
                "pressure has {} entries, mesh has {} nodes",
                self.pressure.len(),
                ctx.mesh.num_nodes()
            )));
        }

        let mut report = AssemblyReport::default();
        for face in &self.faces {
            let (residual, tangent) = match ctx.mesh.dim() {
                2 => self.face_contribution::<2>(ctx, face)?,
                3 => self.face_contribution::<3>(ctx, face)?,
                d => {
                    return Err(SolverError::Dimension(format!(
                        "unsupported spatial dimension {}",
                        d
                    )));
                }
            };
            let nodes = &ctx.mesh.element(face.element).nodes;
            backend.add_residual(nodes, &residual);
            backend.add_tangent(nodes, nodes, &tangent);
            report.elements += 1;
            report.gauss_points += face.samples.len();
        }
        report.elapsed = start.elapsed();
        Ok(report)
    }

    fn face_contribution<const D: usize>(
        &self,
        ctx: &ElementContext<'_>,
        face: &PressureFace,
    ) -> Result<(DVector<f64>, DMatrix<f64>)> {
        let mesh = ctx.mesh;
        let et: ElementType = mesh.element_type();
        let nodes = &mesh.element(face.element).nodes;
        let nen = nodes.len();
        let xl = mesh.element_coords(face.element);
        let dl = gather_columns(&ctx.state.displacement, nodes);
        let hl: Vec<f64> = nodes.iter().map(|&n| self.pressure[n]).collect();

        let mut residual = DVector::zeros(D * nen);
        let mut tangent = DMatrix::zeros(D * nen, D * nen);
        for (g, sample) in face.samples.iter().enumerate() {
            let (n, dn) = et.evaluate(&sample.xi);
            let degenerate = |determinant| SolverError::DegenerateElement {
                element: face.element,
                gauss_point: g,
                determinant,
            };
            let (nx, map_det) = map_gradients(&dn, &xl).ok_or(degenerate(0.0))?;
            if map_det.is_nan() || map_det <= 0.0 {
                return Err(degenerate(map_det));
            }

            let pressure: f64 = (0..nen).map(|a| n[a] * hl[a]).sum();
            let point = TractionPoint::<D> {
                element: face.element,
                gauss_point: g,
                weight: sample.weight,
                n: &n,
                nx: &nx,
                displacement: &dl,
                offset: ctx.equation.offset,
                normal: SVector::<f64, D>::from_fn(|i, _| sample.normal[i]),
                pressure,
            };
            follower_pressure_point(&point, &ctx.equation.time, &mut residual, &mut tangent)?;
        }
        Ok((residual, tangent))
    }
}
