//! Constitutive contract and reference material models.
//!
//! The element kernel only needs the second Piola-Kirchhoff stress and its
//! Voigt-form tangent with respect to Green-Lagrange strain. A model receives
//! the deformation gradient together with fiber directions, activation,
//! interpolated growth properties and the Gauss point's internal variables,
//! which it may read and overwrite.
//!
//! # Models
//!
//! - [`ZeroStress`]: zero strain energy
//! - [`SaintVenantKirchhoff`]: S = λ tr(E) I + 2μE
//! - [`NeoHookean`]: compressible, S = μ(I − C⁻¹) + λ ln J C⁻¹
//! - [`IsotropicGrowth`]: history-dependent growth multiplier wrapped around
//!   any of the above

use nalgebra::{SMatrix, Vector3};

use crate::error::{Result, SolverError};
use crate::tensor::{det, green_lagrange, inverse, voigt_pairs};

/// Inputs of a constitutive evaluation at one Gauss point
#[derive(Debug, Clone)]
pub struct MaterialPoint<'a, const D: usize> {
    /// Deformation gradient F
    pub deformation_gradient: SMatrix<f64, D, D>,
    /// Reference fiber directions of the element
    pub fibers: &'a [Vector3<f64>],
    /// Interpolated activation
    pub activation: f64,
    /// Interpolated growth properties
    pub growth_props: &'a [f64],
}

/// Second Piola-Kirchhoff stress and Voigt material tangent
#[derive(Debug, Clone, PartialEq)]
pub struct StressResponse<const D: usize, const NV: usize> {
    pub stress: SMatrix<f64, D, D>,
    pub tangent: SMatrix<f64, NV, NV>,
}

impl<const D: usize, const NV: usize> StressResponse<D, NV> {
    pub fn zeros() -> Self {
        Self {
            stress: SMatrix::zeros(),
            tangent: SMatrix::zeros(),
        }
    }
}

/// Material law evaluated at every Gauss point.
///
/// Implementations must be deterministic functions of their inputs and the
/// internal-variable slice; the finite-difference tangent relies on it.
pub trait ConstitutiveModel: Send + Sync {
    /// Evaluate stress and tangent.
    ///
    /// # Arguments
    /// * `point` - Deformation gradient and per-point material inputs
    /// * `internal` - Internal variables of this Gauss point (read/write)
    fn evaluate<const D: usize, const NV: usize>(
        &self,
        point: &MaterialPoint<'_, D>,
        internal: &mut [f64],
    ) -> Result<StressResponse<D, NV>>;

    /// Model name for diagnostics
    fn name(&self) -> &str;
}

/// Material with zero strain energy
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZeroStress;

impl ConstitutiveModel for ZeroStress {
    fn evaluate<const D: usize, const NV: usize>(
        &self,
        _point: &MaterialPoint<'_, D>,
        _internal: &mut [f64],
    ) -> Result<StressResponse<D, NV>> {
        Ok(StressResponse::zeros())
    }

    fn name(&self) -> &str {
        "zero-stress"
    }
}

/// Isotropic elastic constants in Lamé form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lame {
    pub lambda: f64,
    pub mu: f64,
}

/// Saint Venant-Kirchhoff material (plane strain in 2D)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaintVenantKirchhoff {
    pub lame: Lame,
}

impl SaintVenantKirchhoff {
    pub fn new(lambda: f64, mu: f64) -> Self {
        Self {
            lame: Lame { lambda, mu },
        }
    }
}

impl ConstitutiveModel for SaintVenantKirchhoff {
    fn evaluate<const D: usize, const NV: usize>(
        &self,
        point: &MaterialPoint<'_, D>,
        _internal: &mut [f64],
    ) -> Result<StressResponse<D, NV>> {
        let Lame { lambda, mu } = self.lame;
        let e = green_lagrange(&point.deformation_gradient);
        let stress = SMatrix::<f64, D, D>::identity() * (lambda * e.trace()) + e * (2.0 * mu);

        let mut tangent = SMatrix::<f64, NV, NV>::zeros();
        for p in 0..NV {
            for q in 0..NV {
                if p < D && q < D {
                    tangent[(p, q)] = lambda;
                }
            }
            tangent[(p, p)] += mu;
            if p < D {
                tangent[(p, p)] += mu;
            }
        }

        Ok(StressResponse { stress, tangent })
    }

    fn name(&self) -> &str {
        "saint-venant-kirchhoff"
    }
}

/// Compressible neo-Hookean material
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeoHookean {
    pub lame: Lame,
}

impl NeoHookean {
    pub fn new(lambda: f64, mu: f64) -> Self {
        Self {
            lame: Lame { lambda, mu },
        }
    }
}

impl ConstitutiveModel for NeoHookean {
    fn evaluate<const D: usize, const NV: usize>(
        &self,
        point: &MaterialPoint<'_, D>,
        _internal: &mut [f64],
    ) -> Result<StressResponse<D, NV>> {
        let Lame { lambda, mu } = self.lame;
        let f = &point.deformation_gradient;
        let j = det(f);
        if j <= 0.0 || !j.is_finite() {
            return Err(SolverError::Dimension(format!(
                "neo-Hookean model needs det F > 0, got {}",
                j
            )));
        }
        let c = f.transpose() * f;
        let ci = inverse(&c).ok_or_else(|| {
            SolverError::Dimension("right Cauchy-Green tensor is singular".to_string())
        })?;
        let ln_j = j.ln();
        let identity = SMatrix::<f64, D, D>::identity();
        let stress = (identity - ci) * mu + ci * (lambda * ln_j);

        // C_ijkl = λ C⁻¹_ij C⁻¹_kl + (μ − λ ln J)(C⁻¹_ik C⁻¹_jl + C⁻¹_il C⁻¹_jk)
        let pairs = voigt_pairs(D);
        let scale = mu - lambda * ln_j;
        let mut tangent = SMatrix::<f64, NV, NV>::zeros();
        for (p, &(i, jj)) in pairs.iter().enumerate().take(NV) {
            for (q, &(k, l)) in pairs.iter().enumerate().take(NV) {
                tangent[(p, q)] = lambda * ci[(i, jj)] * ci[(k, l)]
                    + scale * (ci[(i, k)] * ci[(jj, l)] + ci[(i, l)] * ci[(jj, k)]);
            }
        }

        Ok(StressResponse { stress, tangent })
    }

    fn name(&self) -> &str {
        "neo-hookean"
    }
}

/// Isotropic growth wrapped around an elastic base model.
///
/// Internal variables used:
/// - `history`: converged multiplier of the previous step (read only)
/// - `multiplier`: current growth multiplier θ
///
/// The stress is θ·S_base(F) with θ read from the stored (possibly smoothed)
/// multiplier. After the stress is formed the stored multiplier is updated to
/// `history + rate·(J − 1)`. The returned tangent is θ·D_base and omits
/// dθ/dF, so a consistent tangent needs the finite-difference path.
///
/// The first interpolated growth property, when present, overrides `rate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsotropicGrowth<M> {
    pub base: M,
    pub rate: f64,
    pub history: usize,
    pub multiplier: usize,
}

impl<M: ConstitutiveModel> IsotropicGrowth<M> {
    pub fn new(base: M, rate: f64, history: usize, multiplier: usize) -> Self {
        Self {
            base,
            rate,
            history,
            multiplier,
        }
    }

    /// Number of internal variables this model touches
    pub fn internal_width(&self) -> usize {
        self.history.max(self.multiplier) + 1
    }
}

impl<M: ConstitutiveModel> ConstitutiveModel for IsotropicGrowth<M> {
    fn evaluate<const D: usize, const NV: usize>(
        &self,
        point: &MaterialPoint<'_, D>,
        internal: &mut [f64],
    ) -> Result<StressResponse<D, NV>> {
        if internal.len() < self.internal_width() {
            return Err(SolverError::Dimension(format!(
                "isotropic growth needs {} internal variables, got {}",
                self.internal_width(),
                internal.len()
            )));
        }

        let theta = internal[self.multiplier];
        let base = self.base.evaluate::<D, NV>(point, internal)?;

        let rate = point.growth_props.first().copied().unwrap_or(self.rate);
        let j = det(&point.deformation_gradient);
        internal[self.multiplier] = internal[self.history] + rate * (j - 1.0);

        Ok(StressResponse {
            stress: base.stress * theta,
            tangent: base.tangent * theta,
        })
    }

    fn name(&self) -> &str {
        "isotropic-growth"
    }
}
