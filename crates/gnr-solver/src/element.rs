//! Element-level evaluation: gather, Gauss loop, prestress accumulation.
//!
//! [`evaluate_element`] is the single entry point used by both the analytic
//! assembler and the finite-difference driver. It gathers the nodal slices of
//! one element, maps shape gradients at each Gauss point, hands the point's
//! internal variables to the kernel and returns the local residual and
//! tangent ready for scatter.

use nalgebra::{DMatrix, DVector, SVector};

use gnr_model::{Equation, KinematicState, Mesh, gather_columns, map_gradients};

use crate::constitutive::ConstitutiveModel;
use crate::error::{Result, SolverError};
use crate::growth::InternalVariables;
use crate::kernel::{EvalMode, KernelInput, solid_point};

/// Read-only inputs shared by every element evaluation
#[derive(Debug, Clone, Copy)]
pub struct ElementContext<'a> {
    pub mesh: &'a Mesh,
    pub equation: &'a Equation,
    pub state: &'a KinematicState,
}

impl<'a> ElementContext<'a> {
    pub fn new(mesh: &'a Mesh, equation: &'a Equation, state: &'a KinematicState) -> Self {
        Self {
            mesh,
            equation,
            state,
        }
    }

    /// Check array shapes once before a loop over elements
    pub fn validate(&self) -> Result<()> {
        let dim = self.mesh.dim();
        if dim != 2 && dim != 3 {
            return Err(SolverError::Dimension(format!(
                "unsupported spatial dimension {}",
                dim
            )));
        }
        if !self.state.is_consistent() {
            return Err(SolverError::Dimension(
                "kinematic arrays have inconsistent shapes".to_string(),
            ));
        }
        if self.state.num_nodes() != self.mesh.num_nodes() {
            return Err(SolverError::Dimension(format!(
                "kinematic state has {} nodes, mesh has {}",
                self.state.num_nodes(),
                self.mesh.num_nodes()
            )));
        }
        if self.equation.offset + dim > self.state.num_dofs() {
            return Err(SolverError::Dimension(format!(
                "structural rows {}..{} exceed the {} kinematic dofs",
                self.equation.offset,
                self.equation.offset + dim,
                self.state.num_dofs()
            )));
        }
        Ok(())
    }

    /// True when the element belongs to a structural domain
    pub fn is_structural(&self, e: usize) -> bool {
        let domain = self.mesh.element(e).domain;
        self.equation.structural_props(domain).is_some()
    }
}

/// Local residual and tangent of one element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementContribution {
    pub element: usize,
    pub nodes: Vec<usize>,
    pub residual: DVector<f64>,
    /// Present only in [`EvalMode::Full`]
    pub tangent: Option<DMatrix<f64>>,
}

/// Running nodal prestress numerator and denominator.
///
/// Each Gauss point adds w·N_a·S (Voigt) to the numerator and w·N_a to the
/// denominator of node a, where S is the elastic plus viscous stress before
/// any existing prestress is added.
#[derive(Debug, Clone, PartialEq)]
pub struct PrestressAccumulator {
    pub numerator: DMatrix<f64>,
    pub denominator: DVector<f64>,
}

impl PrestressAccumulator {
    /// Empty accumulator with `voigt_size` rows for `num_nodes` nodes
    pub fn new(voigt_size: usize, num_nodes: usize) -> Self {
        Self {
            numerator: DMatrix::zeros(voigt_size, num_nodes),
            denominator: DVector::zeros(num_nodes),
        }
    }

    pub fn for_mesh(mesh: &Mesh) -> Self {
        Self::new(mesh.voigt_size(), mesh.num_nodes())
    }

    pub fn reset(&mut self) {
        self.numerator.fill(0.0);
        self.denominator.fill(0.0);
    }

    fn add<const NV: usize>(
        &mut self,
        nodes: &[usize],
        n: &DVector<f64>,
        weight: f64,
        stress: &SVector<f64, NV>,
    ) {
        for (a, &node) in nodes.iter().enumerate() {
            let wn = weight * n[a];
            for p in 0..NV {
                self.numerator[(p, node)] += wn * stress[p];
            }
            self.denominator[node] += wn;
        }
    }

    /// Nodal prestress numerator / denominator, zero where nothing was added
    pub fn nodal_average(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.numerator.nrows(), self.numerator.ncols(), |p, node| {
            let den = self.denominator[node];
            if den != 0.0 {
                self.numerator[(p, node)] / den
            } else {
                0.0
            }
        })
    }
}

/// Evaluate one element.
///
/// # Arguments
/// * `model` - Constitutive model
/// * `ctx` - Mesh, equation and kinematic state
/// * `e` - Element index
/// * `internal` - Internal-variable field (the element's points are updated)
/// * `mode` - Full, residual-only or stress-only
/// * `accumulator` - Optional prestress accumulator
///
/// # Returns
/// `None` for elements outside a structural domain, otherwise the local
/// contribution (empty residual in stress-only mode).
pub fn evaluate_element<M: ConstitutiveModel>(
    model: &M,
    ctx: &ElementContext<'_>,
    e: usize,
    internal: &mut InternalVariables,
    mode: EvalMode,
    accumulator: Option<&mut PrestressAccumulator>,
) -> Result<Option<ElementContribution>> {
    match ctx.mesh.dim() {
        2 => evaluate_dim::<M, 2, 3>(model, ctx, e, internal, mode, accumulator),
        3 => evaluate_dim::<M, 3, 6>(model, ctx, e, internal, mode, accumulator),
        d => Err(SolverError::Dimension(format!(
            "unsupported spatial dimension {}",
            d
        ))),
    }
}

fn evaluate_dim<M: ConstitutiveModel, const D: usize, const NV: usize>(
    model: &M,
    ctx: &ElementContext<'_>,
    e: usize,
    internal: &mut InternalVariables,
    mode: EvalMode,
    mut accumulator: Option<&mut PrestressAccumulator>,
) -> Result<Option<ElementContribution>> {
    let mesh = ctx.mesh;
    let element = mesh.element(e);
    let Some(props) = ctx.equation.structural_props(element.domain) else {
        return Ok(None);
    };

    let nodes = &element.nodes;
    let nen = nodes.len();
    let xl = mesh.element_coords(e);
    let al = gather_columns(&ctx.state.acceleration, nodes);
    let yl = gather_columns(&ctx.state.velocity, nodes);
    let dl = gather_columns(&ctx.state.displacement, nodes);
    let bfl = mesh
        .body_force()
        .map_or_else(|| DMatrix::zeros(D, nen), |b| gather_columns(b, nodes));
    let pstl = mesh
        .prestress()
        .map_or_else(|| DMatrix::zeros(NV, nen), |p| gather_columns(p, nodes));
    let gpl = mesh
        .growth_props()
        .map_or_else(|| DMatrix::zeros(0, nen), |g| gather_columns(g, nodes));
    let act: Vec<f64> = nodes.iter().map(|&n| ctx.state.activation_at(n)).collect();

    let mut residual = DVector::zeros(if mode.needs_residual() { D * nen } else { 0 });
    let mut tangent = if mode.needs_tangent() {
        DMatrix::zeros(D * nen, D * nen)
    } else {
        DMatrix::zeros(0, 0)
    };

    let table = mesh.shape_table();
    let mut constant: Option<(DMatrix<f64>, f64)> = None;
    for g in 0..table.num_points() {
        let (nx, det) = match &constant {
            Some(mapped) => mapped.clone(),
            None => {
                let mapped = map_gradients(&table.dn[g], &xl).ok_or(
                    SolverError::DegenerateElement {
                        element: e,
                        gauss_point: g,
                        determinant: 0.0,
                    },
                )?;
                if mesh.element_type().has_constant_gradients() {
                    constant = Some(mapped.clone());
                }
                mapped
            }
        };
        if det.is_nan() || det <= 0.0 {
            return Err(SolverError::DegenerateElement {
                element: e,
                gauss_point: g,
                determinant: det,
            });
        }

        let n: DVector<f64> = table.n.column(g).into_owned();
        let growth: Vec<f64> = (0..gpl.nrows())
            .map(|i| (0..nen).map(|a| n[a] * gpl[(i, a)]).sum())
            .collect();
        let activation: f64 = (0..nen).map(|a| n[a] * act[a]).sum();
        let weight = table.weights[g] * det;

        let input = KernelInput {
            element: e,
            gauss_point: g,
            weight,
            n: &n,
            nx: &nx,
            acceleration: &al,
            velocity: &yl,
            displacement: &dl,
            offset: ctx.equation.offset,
            body_force: &bfl,
            prestress: &pstl,
            fibers: &element.fibers,
            activation,
            growth_props: &growth,
        };

        let out = solid_point::<M, D, NV>(
            model,
            &input,
            props,
            &ctx.equation.time,
            internal.point_mut(e, g),
            mode,
            &mut residual,
            &mut tangent,
        )?;

        if let (Some(acc), Some(stress)) = (accumulator.as_deref_mut(), out.stress.as_ref()) {
            acc.add(nodes, &n, weight, stress);
        }
    }

    Ok(Some(ElementContribution {
        element: e,
        nodes: nodes.clone(),
        residual,
        tangent: mode.needs_tangent().then_some(tangent),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constitutive::{SaintVenantKirchhoff, ZeroStress};
    use gnr_model::{Domain, Element, ElementType, Physics, SolidProperties, TimeIntegration};
    use nalgebra::Matrix3;

    fn unit_cube(domain: usize) -> Mesh {
        let coords = DMatrix::from_column_slice(
            3,
            8,
            &[
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, //
                0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0,
            ],
        );
        Mesh::new(
            ElementType::Hex8,
            coords,
            vec![Element::new((0..8).collect(), domain)],
        )
        .unwrap()
    }

    fn equation(props: SolidProperties) -> Equation {
        Equation::new(
            TimeIntegration::generalized_alpha(0.5, 0.1),
            0,
            vec![
                Domain::structural(1, props),
                Domain {
                    id: 2,
                    physics: Physics::Heat,
                    props,
                },
            ],
        )
    }

    #[test]
    fn test_reference_state_residual_is_pure_inertia() {
        // F = I and zero strain energy: R_a = ∫ N_a ρ a0 dV = ρ a0 / 8 per node
        let mesh = unit_cube(1);
        let props = SolidProperties {
            density: 2.0,
            ..SolidProperties::default()
        };
        let eq = equation(props);
        let mut state = KinematicState::zeros(3, 8);
        for a in 0..8 {
            state.acceleration[(1, a)] = 3.0;
        }
        let ctx = ElementContext::new(&mesh, &eq, &state);
        let mut internal = InternalVariables::for_mesh(&mesh, 1);
        let c = evaluate_element(&ZeroStress, &ctx, 0, &mut internal, EvalMode::Full, None)
            .unwrap()
            .unwrap();
        for a in 0..8 {
            assert!(c.residual[a * 3].abs() < 1e-14);
            assert!(
                (c.residual[a * 3 + 1] - 2.0 * 3.0 / 8.0).abs() < 1e-13,
                "node {}: {}",
                a,
                c.residual[a * 3 + 1]
            );
        }
        // Tangent is the consistent mass scaled by am·ρ
        let k = c.tangent.unwrap();
        let total: f64 = (0..8)
            .flat_map(|a| (0..8).map(move |b| (a, b)))
            .map(|(a, b)| k[(a * 3, b * 3)])
            .sum();
        assert!((total - eq.time.am * 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_body_force_balances_acceleration() {
        let mesh = unit_cube(1);
        let props = SolidProperties {
            density: 1.5,
            body_force: [0.0, 0.0, -9.81],
            ..SolidProperties::default()
        };
        let eq = equation(props);
        let mut state = KinematicState::zeros(3, 8);
        for a in 0..8 {
            state.acceleration[(2, a)] = -9.81;
        }
        let ctx = ElementContext::new(&mesh, &eq, &state);
        let mut internal = InternalVariables::for_mesh(&mesh, 1);
        let c = evaluate_element(&ZeroStress, &ctx, 0, &mut internal, EvalMode::ResidualOnly, None)
            .unwrap()
            .unwrap();
        assert!(c.residual.norm() < 1e-13);
        assert!(c.tangent.is_none());
    }

    #[test]
    fn test_uniaxial_stretch_nodal_forces() {
        let mesh = unit_cube(1);
        let props = SolidProperties {
            density: 0.0,
            ..SolidProperties::default()
        };
        let eq = equation(props);
        let (lambda, mu) = (1.2, 0.8);
        let delta = 0.05;
        let mut state = KinematicState::zeros(3, 8);
        for a in 0..8 {
            state.displacement[(0, a)] = delta * mesh.coords()[(0, a)];
        }
        let ctx = ElementContext::new(&mesh, &eq, &state);
        let mut internal = InternalVariables::for_mesh(&mesh, 1);
        let c = evaluate_element(
            &SaintVenantKirchhoff::new(lambda, mu),
            &ctx,
            0,
            &mut internal,
            EvalMode::ResidualOnly,
            None,
        )
        .unwrap()
        .unwrap();

        let e11 = 0.5 * ((1.0 + delta) * (1.0 + delta) - 1.0);
        let fx = (1.0 + delta) * (lambda + 2.0 * mu) * e11 / 4.0;
        let fy = lambda * e11 / 4.0;
        for a in 0..8 {
            let x = mesh.coords()[(0, a)];
            let y = mesh.coords()[(1, a)];
            let z = mesh.coords()[(2, a)];
            let sx = if x > 0.5 { 1.0 } else { -1.0 };
            let sy = if y > 0.5 { 1.0 } else { -1.0 };
            let sz = if z > 0.5 { 1.0 } else { -1.0 };
            assert!((c.residual[a * 3] - sx * fx).abs() < 1e-13, "node {} x", a);
            assert!((c.residual[a * 3 + 1] - sy * fy).abs() < 1e-13, "node {} y", a);
            assert!((c.residual[a * 3 + 2] - sz * fy).abs() < 1e-13, "node {} z", a);
        }
    }

    #[test]
    fn test_viscous_stress_of_pure_deformation_rate() {
        // F = I and v = L·X: S_vis = 2μ dev(sym L) and R_a = ∫ ∇N_a dV · S_vis
        let mesh = unit_cube(1);
        let mu = 0.5;
        let props = SolidProperties {
            density: 0.0,
            viscosity: mu,
            damping: 0.0,
            body_force: [0.0; 3],
        };
        let eq = equation(props);
        let (rate, shear) = (0.3, 0.2);
        let mut state = KinematicState::zeros(3, 8);
        for a in 0..8 {
            let x = mesh.coords()[(0, a)];
            let y = mesh.coords()[(1, a)];
            state.velocity[(0, a)] = rate * x + shear * y;
            state.velocity[(1, a)] = -rate * y;
        }
        let ctx = ElementContext::new(&mesh, &eq, &state);
        let mut internal = InternalVariables::for_mesh(&mesh, 1);
        let mut acc = PrestressAccumulator::for_mesh(&mesh);
        let c = evaluate_element(
            &ZeroStress,
            &ctx,
            0,
            &mut internal,
            EvalMode::ResidualOnly,
            Some(&mut acc),
        )
        .unwrap()
        .unwrap();

        // sym L is already traceless
        let s_vis = Matrix3::new(rate, 0.5 * shear, 0.0, 0.5 * shear, -rate, 0.0, 0.0, 0.0, 0.0)
            * (2.0 * mu);
        for a in 0..8 {
            for i in 0..3 {
                // ∫ ∂N_a/∂X_j dV = ±1/4 on the unit cube
                let expected: f64 = (0..3)
                    .map(|j| {
                        let sign = if mesh.coords()[(j, a)] > 0.5 { 1.0 } else { -1.0 };
                        0.25 * sign * s_vis[(i, j)]
                    })
                    .sum();
                assert!(
                    (c.residual[a * 3 + i] - expected).abs() < 1e-13,
                    "node {} dof {}",
                    a,
                    i
                );
            }
        }

        // The viscous stress is recorded for prestress
        let avg = acc.nodal_average();
        let voigt = [2.0 * mu * rate, -2.0 * mu * rate, 0.0, mu * shear, 0.0, 0.0];
        for node in 0..8 {
            for (p, &v) in voigt.iter().enumerate() {
                assert!((avg[(p, node)] - v).abs() < 1e-13);
            }
        }
    }

    #[test]
    fn test_non_structural_element_is_skipped() {
        let mesh = unit_cube(2);
        let eq = equation(SolidProperties::default());
        let state = KinematicState::zeros(3, 8);
        let ctx = ElementContext::new(&mesh, &eq, &state);
        assert!(!ctx.is_structural(0));
        let mut internal = InternalVariables::for_mesh(&mesh, 1);
        let c =
            evaluate_element(&ZeroStress, &ctx, 0, &mut internal, EvalMode::Full, None).unwrap();
        assert!(c.is_none());
    }

    #[test]
    fn test_prestress_accumulator_recovers_uniform_stress() {
        let mesh = unit_cube(1);
        let eq = equation(SolidProperties::default());
        let mut state = KinematicState::zeros(3, 8);
        for a in 0..8 {
            state.displacement[(0, a)] = 0.02 * mesh.coords()[(0, a)];
        }
        let ctx = ElementContext::new(&mesh, &eq, &state);
        let mut internal = InternalVariables::for_mesh(&mesh, 1);
        let mut acc = PrestressAccumulator::for_mesh(&mesh);
        let model = SaintVenantKirchhoff::new(1.0, 1.0);
        evaluate_element(&model, &ctx, 0, &mut internal, EvalMode::ResidualOnly, Some(&mut acc))
            .unwrap();

        let e11 = 0.5 * (1.02f64 * 1.02 - 1.0);
        let avg = acc.nodal_average();
        for node in 0..8 {
            assert!((avg[(0, node)] - 3.0 * e11).abs() < 1e-13);
            assert!((avg[(1, node)] - e11).abs() < 1e-13);
            assert!(avg[(3, node)].abs() < 1e-13);
        }
        acc.reset();
        assert_eq!(acc.nodal_average().norm(), 0.0);
    }

    #[test]
    fn test_context_validation() {
        let mesh = unit_cube(1);
        let eq = equation(SolidProperties::default());
        let state = KinematicState::zeros(2, 8);
        assert!(ElementContext::new(&mesh, &eq, &state).validate().is_err());
        let state = KinematicState::zeros(3, 7);
        assert!(ElementContext::new(&mesh, &eq, &state).validate().is_err());
        let state = KinematicState::zeros(3, 8);
        assert!(ElementContext::new(&mesh, &eq, &state).validate().is_ok());
    }
}
