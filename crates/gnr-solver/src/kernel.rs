//! Gauss-point kernel for the nonlinear structural residual and tangent.
//!
//! For one quadrature point of one element the kernel:
//! 1. builds F = I + Σ_a u_a ⊗ ∇N_a, checks J = det F > 0 and inverts F
//! 2. forms the viscous stress 2μJ F⁻¹ dev(sym(∇v F⁻¹)) F⁻ᵀ
//! 3. calls the constitutive model for S and D
//! 4. records S_elastic + S_viscous for the prestress accumulator
//! 5. adds the interpolated prestress and forms P = F S
//! 6. accumulates the residual and, in full mode, the tangent:
//!    mass/damping, geometric, material (Bᵀ D B) and viscous terms
//!
//! Local layout: row `a * D + i` is dof `i` of element node `a`; the tangent
//! is indexed the same way in both directions.

use nalgebra::{DMatrix, DVector, SMatrix, SVector, Vector3};

use gnr_model::{SolidProperties, TimeIntegration};

use crate::constitutive::{ConstitutiveModel, MaterialPoint};
use crate::error::{Result, SolverError};
use crate::tensor::{det, deviator, from_voigt, inverse, symmetric, to_voigt, voigt_pairs};

/// How much of the kernel runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Residual and tangent
    Full,
    /// Residual only
    ResidualOnly,
    /// Constitutive update only; residual and tangent are untouched
    StressOnly,
}

impl EvalMode {
    pub fn needs_residual(&self) -> bool {
        !matches!(self, EvalMode::StressOnly)
    }

    pub fn needs_tangent(&self) -> bool {
        matches!(self, EvalMode::Full)
    }
}

/// Gathered element data at one Gauss point
#[derive(Debug, Clone)]
pub struct KernelInput<'a> {
    pub element: usize,
    pub gauss_point: usize,
    /// Quadrature weight times the reference mapping determinant
    pub weight: f64,
    /// Shape values, one per element node
    pub n: &'a DVector<f64>,
    /// Reference shape gradients, D × element nodes
    pub nx: &'a DMatrix<f64>,
    /// Local acceleration, velocity and displacement, total dofs × element nodes
    pub acceleration: &'a DMatrix<f64>,
    pub velocity: &'a DMatrix<f64>,
    pub displacement: &'a DMatrix<f64>,
    /// First structural row of the local kinematic slices
    pub offset: usize,
    /// Nodal body force, D × element nodes
    pub body_force: &'a DMatrix<f64>,
    /// Nodal prestress in Voigt form, NV × element nodes
    pub prestress: &'a DMatrix<f64>,
    pub fibers: &'a [Vector3<f64>],
    pub activation: f64,
    pub growth_props: &'a [f64],
}

/// Results of one kernel call beyond the local arrays
#[derive(Debug, Clone, PartialEq)]
pub struct PointResult<const NV: usize> {
    /// det F
    pub jacobian: f64,
    /// S_elastic + S_viscous in Voigt form; `None` in stress-only mode
    pub stress: Option<SVector<f64, NV>>,
}

/// Evaluate one Gauss point and accumulate into the local arrays.
///
/// # Arguments
/// * `model` - Constitutive model
/// * `input` - Gathered element data at this point
/// * `props` - Density, viscosity, damping and uniform body force
/// * `time` - Generalized-α coefficients
/// * `internal` - Internal variables of this Gauss point
/// * `mode` - Which outputs to accumulate
/// * `residual` - Local residual, length D × element nodes
/// * `tangent` - Local tangent, square of the residual length
///
/// # Returns
/// The Jacobian and the stress recorded for prestress accumulation, or
/// `InvertedElement` when det F ≤ 0.
#[allow(clippy::too_many_arguments)]
pub fn solid_point<M, const D: usize, const NV: usize>(
    model: &M,
    input: &KernelInput<'_>,
    props: &SolidProperties,
    time: &TimeIntegration,
    internal: &mut [f64],
    mode: EvalMode,
    residual: &mut DVector<f64>,
    tangent: &mut DMatrix<f64>,
) -> Result<PointResult<NV>>
where
    M: ConstitutiveModel,
{
    let nen = input.n.len();
    let s = input.offset;
    let nx = input.nx;

    let mut f = SMatrix::<f64, D, D>::identity();
    let mut vx = SMatrix::<f64, D, D>::zeros();
    for a in 0..nen {
        for i in 0..D {
            for j in 0..D {
                f[(i, j)] += nx[(j, a)] * input.displacement[(s + i, a)];
                vx[(i, j)] += nx[(j, a)] * input.velocity[(s + i, a)];
            }
        }
    }

    let jac = det(&f);
    let inverted = SolverError::InvertedElement {
        element: input.element,
        gauss_point: input.gauss_point,
        jacobian: jac,
    };
    if jac.is_nan() || jac <= 0.0 {
        return Err(inverted);
    }
    let fi = inverse(&f).ok_or(inverted)?;

    // Velocity gradient in the current configuration
    let vx_fi = vx * fi;
    let ddev = deviator(&symmetric(&vx_fi));
    let mu_visc = props.viscosity;
    let s_vis = fi * ddev * fi.transpose() * (2.0 * mu_visc * jac);

    let point = MaterialPoint {
        deformation_gradient: f,
        fibers: input.fibers,
        activation: input.activation,
        growth_props: input.growth_props,
    };
    let response = model.evaluate::<D, NV>(&point, internal)?;

    if mode == EvalMode::StressOnly {
        return Ok(PointResult {
            jacobian: jac,
            stress: None,
        });
    }

    let mut stress = response.stress + s_vis;
    let recorded = to_voigt::<D, NV>(&stress);

    let mut s0 = SVector::<f64, NV>::zeros();
    for a in 0..nen {
        for p in 0..NV {
            s0[p] += input.n[a] * input.prestress[(p, a)];
        }
    }
    stress += from_voigt::<D, NV>(&s0);
    let p_stress = f * stress;

    // Inertia, damping and body force
    let rho = props.density;
    let dmp = props.damping;
    let mut ud = SVector::<f64, D>::zeros();
    for i in 0..D {
        ud[i] = -rho * props.body_force[i];
        for a in 0..nen {
            ud[i] += input.n[a]
                * (rho * (input.acceleration[(s + i, a)] - input.body_force[(i, a)])
                    + dmp * input.velocity[(s + i, a)]);
        }
    }

    let w = input.weight;
    for a in 0..nen {
        for i in 0..D {
            let mut r = input.n[a] * ud[i];
            for j in 0..D {
                r += nx[(j, a)] * p_stress[(i, j)];
            }
            residual[a * D + i] += w * r;
        }
    }

    if !mode.needs_tangent() {
        return Ok(PointResult {
            jacobian: jac,
            stress: Some(recorded),
        });
    }

    // Strain-displacement matrices, one NV × D block per node
    let pairs = voigt_pairs(D);
    let bm: Vec<SMatrix<f64, NV, D>> = (0..nen)
        .map(|a| {
            let mut b = SMatrix::<f64, NV, D>::zeros();
            for (p, &(k, l)) in pairs.iter().enumerate().take(NV) {
                for i in 0..D {
                    b[(p, i)] = if k == l {
                        nx[(k, a)] * f[(i, k)]
                    } else {
                        nx[(k, a)] * f[(i, l)] + f[(i, k)] * nx[(l, a)]
                    };
                }
            }
            b
        })
        .collect();

    // Push-forward shape gradients and velocity-gradient products
    let mut nx_fi = DMatrix::<f64>::zeros(D, nen);
    for a in 0..nen {
        for i in 0..D {
            for k in 0..D {
                nx_fi[(i, a)] += fi[(k, i)] * nx[(k, a)];
            }
        }
    }
    let mut dd_nx = DMatrix::<f64>::zeros(D, nen);
    let mut vx_nx = DMatrix::<f64>::zeros(D, nen);
    for a in 0..nen {
        for i in 0..D {
            for k in 0..D {
                dd_nx[(i, a)] += ddev[(i, k)] * nx_fi[(k, a)];
                vx_nx[(i, a)] += vx_fi[(k, i)] * nx_fi[(k, a)];
            }
        }
    }

    let afu = time.afu();
    let afv = time.afv();
    let amd = time.amd(rho, dmp);
    let rmu = afu * mu_visc * jac;
    let rmv = afv * mu_visc * jac;
    // Deviatoric correction of the viscous tangent
    let c = 2.0 / D as f64;
    let dm = response.tangent;

    for a in 0..nen {
        for b in 0..nen {
            let mut nx_s_nx = 0.0;
            let mut nx_nx = 0.0;
            for i in 0..D {
                nx_nx += nx_fi[(i, a)] * nx_fi[(i, b)];
                for j in 0..D {
                    nx_s_nx += nx[(i, a)] * stress[(i, j)] * nx[(j, b)];
                }
            }
            let t1 = amd * input.n[a] * input.n[b] + afu * nx_s_nx;
            let bdb = bm[a].transpose() * dm * bm[b];

            for i in 0..D {
                for j in 0..D {
                    let tv = (2.0
                        * (dd_nx[(i, a)] * nx_fi[(j, b)] - dd_nx[(i, b)] * nx_fi[(j, a)])
                        - (nx_nx * vx_fi[(i, j)] + nx_fi[(i, b)] * vx_nx[(j, a)]
                            - c * nx_fi[(i, a)] * vx_nx[(j, b)]))
                        * rmu
                        + (nx_fi[(j, a)] * nx_fi[(i, b)] - c * nx_fi[(i, a)] * nx_fi[(j, b)]
                            + if i == j { nx_nx } else { 0.0 })
                            * rmv;

                    let diag = if i == j { t1 } else { 0.0 };
                    tangent[(a * D + i, b * D + j)] += w * (diag + afu * bdb[(i, j)] + tv);
                }
            }
        }
    }

    Ok(PointResult {
        jacobian: jac,
        stress: Some(recorded),
    })
}
