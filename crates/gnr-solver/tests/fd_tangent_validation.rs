//! Validation of the finite-difference tangent against the analytic one
//!
//! For history-free materials the two paths compute the same operator up to
//! the displacement part of the viscous term, so the finite-difference
//! sweep must reproduce the closed-form tangent to truncation accuracy. With
//! growth the sweep is compared against brute-force differences of the full
//! residual pass.

use gnr_model::{
    Domain, Element, ElementType, Equation, KinematicField, KinematicState, Mesh,
    SolidProperties, TimeIntegration,
};
use gnr_solver::{
    AnalyticAssembler, AssemblyBackend, ConstitutiveModel, DenseSystem, ElementContext,
    FdTangentDriver, GrowthRemodelState, InternalVariables, IsotropicGrowth, NeoHookean,
    SaintVenantKirchhoff, SmoothingMode, SolverConfig, SweepReport,
};
use nalgebra::DMatrix;

/// Row of `n` unit hexahedra along x
fn hex_row(n: usize) -> Mesh {
    let num_nodes = 4 * (n + 1);
    let id = |i: usize, j: usize, k: usize| i + (n + 1) * (j + 2 * k);
    let mut coords = DMatrix::zeros(3, num_nodes);
    for k in 0..2 {
        for j in 0..2 {
            for i in 0..=n {
                let a = id(i, j, k);
                coords[(0, a)] = i as f64;
                coords[(1, a)] = j as f64;
                coords[(2, a)] = k as f64;
            }
        }
    }
    let elements = (0..n)
        .map(|i| {
            Element::new(
                vec![
                    id(i, 0, 0),
                    id(i + 1, 0, 0),
                    id(i + 1, 1, 0),
                    id(i, 1, 0),
                    id(i, 0, 1),
                    id(i + 1, 0, 1),
                    id(i + 1, 1, 1),
                    id(i, 1, 1),
                ],
                1,
            )
        })
        .collect();
    Mesh::new(ElementType::Hex8, coords, elements).unwrap()
}

fn equation(props: SolidProperties) -> Equation {
    Equation::new(
        TimeIntegration::generalized_alpha(0.5, 0.1),
        0,
        vec![Domain::structural(1, props)],
    )
}

/// Smooth, non-trivial kinematic state
fn deformed_state(mesh: &Mesh) -> KinematicState {
    let mut state = KinematicState::zeros(3, mesh.num_nodes());
    for a in 0..mesh.num_nodes() {
        let (x, y, z) = (
            mesh.coords()[(0, a)],
            mesh.coords()[(1, a)],
            mesh.coords()[(2, a)],
        );
        state.displacement[(0, a)] = 0.03 * x * y - 0.01 * z;
        state.displacement[(1, a)] = 0.02 * y - 0.015 * x * z;
        state.displacement[(2, a)] = 0.01 * x * x + 0.025 * y * z;
        state.velocity[(0, a)] = 0.1 * z;
        state.velocity[(1, a)] = -0.2 * x;
        state.velocity[(2, a)] = 0.05 * y;
        state.acceleration[(0, a)] = 0.3 - 0.1 * y;
        state.acceleration[(1, a)] = 0.2 * x * z;
        state.acceleration[(2, a)] = -0.4;
    }
    state
}

fn max_abs(m: &DMatrix<f64>) -> f64 {
    m.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

/// Analytic and finite-difference assemblies of one model on a row of hexahedra
struct TangentGap {
    analytic: DMatrix<f64>,
    /// max |K_analytic|
    scale: f64,
    /// max |K_fd - K_analytic|
    diff: f64,
    /// |R_fd - R_analytic|
    residual_diff: f64,
    report: SweepReport,
}

fn tangent_gap<M: ConstitutiveModel>(model: &M, eq: &Equation, eps: f64) -> TangentGap {
    let mesh = hex_row(2);
    let state = deformed_state(&mesh);
    let ctx = ElementContext::new(&mesh, eq, &state);

    let mut internal = InternalVariables::for_mesh(&mesh, 1);
    let mut analytic = DenseSystem::new(mesh.num_nodes(), 3);
    AnalyticAssembler::new(model)
        .assemble(&ctx, &mut internal, None, &mut analytic)
        .unwrap();

    let config = SolverConfig {
        fd_epsilon: eps,
        smoothing: SmoothingMode::None,
        growth_multiplier: 0,
        ..SolverConfig::finite_difference()
    };
    let mut growth =
        GrowthRemodelState::new(InternalVariables::for_mesh(&mesh, 1), SmoothingMode::None, 0)
            .unwrap();
    let mut fd = DenseSystem::new(mesh.num_nodes(), 3);
    let report = FdTangentDriver::new(model, &config)
        .unwrap()
        .assemble(&ctx, &mut growth, None, &mut fd)
        .unwrap();

    TangentGap {
        scale: max_abs(&analytic.tangent),
        diff: max_abs(&(&fd.tangent - &analytic.tangent)),
        residual_diff: (&fd.residual - &analytic.residual).norm(),
        analytic: analytic.tangent,
        report,
    }
}

fn inviscid() -> SolidProperties {
    SolidProperties {
        density: 1.3,
        viscosity: 0.0,
        damping: 0.4,
        body_force: [0.0, 0.0, -1.0],
    }
}

fn compare_paths<M: ConstitutiveModel>(model: &M, label: &str) {
    let gap = tangent_gap(model, &equation(inviscid()), 1e-6);
    println!(
        "{}: max |K| = {:.4e}, max |K_fd - K| = {:.4e}, {} evaluations",
        label, gap.scale, gap.diff, gap.report.evaluations
    );
    assert!(gap.scale > 0.0);
    assert!(gap.diff < 1e-4 * gap.scale, "{}: tangent mismatch {:.3e}", label, gap.diff);
    assert!(gap.residual_diff < 1e-12);
    // 1 residual pass + 12 nodes × (1 central + 3 dofs × 3 fields)
    assert_eq!(gap.report.evaluations, 1 + 12 * 10);
    assert_eq!(gap.report.nodes, 12);
}

#[test]
fn test_fd_matches_analytic_svk() {
    compare_paths(&SaintVenantKirchhoff::new(1.0, 0.5), "svk");
}

#[test]
fn test_fd_matches_analytic_neo_hookean() {
    compare_paths(&NeoHookean::new(2.0, 0.8), "neo-hookean");
}

#[test]
fn test_fd_error_shrinks_with_step() {
    let model = SaintVenantKirchhoff::new(1.0, 0.5);
    let eq = equation(inviscid());
    let errors: Vec<f64> = [1e-4, 1e-5, 1e-6]
        .iter()
        .map(|&eps| tangent_gap(&model, &eq, eps).diff)
        .collect();
    println!("svk: max |K_fd - K| for eps 1e-4, 1e-5, 1e-6 = {:?}", errors);
    // One-sided differences: the error is first order in the step
    for pair in errors.windows(2) {
        assert!(pair[1] < 0.5 * pair[0], "no first-order decay: {:?}", errors);
    }
}

#[test]
fn test_viscous_velocity_block_matches_fd() {
    // With β = 0 the displacement coefficient vanishes and the tangent is
    // the mass, damping and viscous-velocity blocks, all linear in v and a
    let props = SolidProperties {
        viscosity: 0.5,
        ..inviscid()
    };
    let mut time = TimeIntegration::generalized_alpha(0.5, 0.1);
    time.beta = 0.0;
    let model = SaintVenantKirchhoff::new(1.0, 0.5);

    let viscous_eq = Equation::new(time, 0, vec![Domain::structural(1, props)]);
    let plain_eq = Equation::new(time, 0, vec![Domain::structural(1, inviscid())]);
    let viscous = tangent_gap(&model, &viscous_eq, 1e-6);
    let plain = tangent_gap(&model, &plain_eq, 1e-6);

    assert!(viscous.diff < 1e-6 * viscous.scale, "mismatch {:.3e}", viscous.diff);
    assert!(viscous.residual_diff < 1e-12);
    // The viscous block is a visible part of the operator
    assert!(max_abs(&(&viscous.analytic - &plain.analytic)) > 1e-3 * viscous.scale);
}

#[test]
fn test_viscous_displacement_block_approximates_fd() {
    // The displacement part of the viscous tangent linearises the push-forward
    // of dev(sym(∇v F⁻¹)) only approximately: against finite differences it
    // agrees to about 1e-3 of the largest entry, independent of the step
    let props = SolidProperties {
        viscosity: 0.5,
        ..inviscid()
    };
    let gap = tangent_gap(&SaintVenantKirchhoff::new(1.0, 0.5), &equation(props), 1e-6);
    println!("viscous: max |K| = {:.4e}, max |K_fd - K| = {:.4e}", gap.scale, gap.diff);
    assert!(gap.diff < 1e-2 * gap.scale, "mismatch {:.3e}", gap.diff);
    assert!(gap.residual_diff < 1e-12);
}

#[test]
fn test_parallel_sweep_equals_sequential() {
    let mesh = hex_row(3);
    let eq = equation(SolidProperties::default());
    let state = deformed_state(&mesh);
    let ctx = ElementContext::new(&mesh, &eq, &state);
    let model = IsotropicGrowth::new(SaintVenantKirchhoff::new(1.0, 0.5), 0.5, 0, 1);

    let mut field = InternalVariables::for_mesh(&mesh, 2);
    field.fill_variable(0, 1.1);
    field.fill_variable(1, 1.1);

    let run = |parallel: bool| {
        let config = SolverConfig {
            fd_epsilon: 1e-6,
            growth_multiplier: 1,
            parallel,
            ..SolverConfig::finite_difference()
        };
        let mut growth =
            GrowthRemodelState::new(field.clone(), config.smoothing, config.growth_multiplier)
                .unwrap();
        let mut system = DenseSystem::new(mesh.num_nodes(), 3);
        FdTangentDriver::new(&model, &config)
            .unwrap()
            .assemble(&ctx, &mut growth, None, &mut system)
            .unwrap();
        (system, growth)
    };

    let (sequential, growth_seq) = run(false);
    let (parallel, growth_par) = run(true);
    assert_eq!(sequential.tangent, parallel.tangent);
    assert_eq!(sequential.residual, parallel.residual);
    assert_eq!(growth_seq, growth_par);
}

#[test]
fn test_growth_tangent_matches_global_differences() {
    // Node-wise stencils must see every element a perturbation reaches
    // through element-node smoothing
    let mesh = hex_row(3);
    let eq = equation(SolidProperties {
        density: 0.8,
        ..SolidProperties::default()
    });
    let state = deformed_state(&mesh);
    let model = IsotropicGrowth::new(SaintVenantKirchhoff::new(1.0, 0.5), 2.0, 0, 1);
    let eps = 1e-6;
    let config = SolverConfig {
        fd_epsilon: eps,
        growth_multiplier: 1,
        ..SolverConfig::finite_difference()
    };
    let driver = FdTangentDriver::new(&model, &config).unwrap();

    let mut field = InternalVariables::for_mesh(&mesh, 2);
    for e in 0..mesh.num_elements() {
        for g in 0..field.num_points() {
            field.set(e, g, 0, 1.0 + 0.05 * (e + g) as f64);
        }
    }
    let initial = GrowthRemodelState::new(field, SmoothingMode::ElementNode, 1).unwrap();

    let residual_of = |state: &KinematicState| {
        let ctx = ElementContext::new(&mesh, &eq, state);
        let mut growth = initial.clone();
        let mut system = DenseSystem::new(mesh.num_nodes(), 3);
        driver
            .residual_pass(&ctx, &mut growth, None, &mut system)
            .unwrap();
        system.residual
    };

    let ctx = ElementContext::new(&mesh, &eq, &state);
    let mut growth = initial.clone();
    let mut fd = DenseSystem::new(mesh.num_nodes(), 3);
    driver.assemble(&ctx, &mut growth, None, &mut fd).unwrap();

    // Brute force: perturb every dof of every field and rerun the full pass
    let t = &eq.time;
    let coefficients = [
        (KinematicField::Acceleration, t.am / eps),
        (KinematicField::Velocity, t.afv() / eps),
        (KinematicField::Displacement, t.afu() / eps),
    ];
    let r0 = residual_of(&state);
    let n = fd.num_dofs();
    let mut brute = DMatrix::zeros(n, n);
    for col in 0..n {
        let (node, i) = (col / 3, col % 3);
        for (kind, c) in coefficients {
            let mut perturbed = state.clone();
            perturbed.field_mut(kind)[(i, node)] += eps;
            let r = residual_of(&perturbed);
            brute.column_mut(col).axpy(c, &(r - &r0), 1.0);
        }
    }

    let scale = max_abs(&brute);
    let diff = max_abs(&(&fd.tangent - &brute));
    println!("growth: max |K| = {:.4e}, max |K_fd - K_brute| = {:.4e}", scale, diff);
    assert!(diff < 1e-6 * scale);
}

#[test]
fn test_growth_coupling_is_missing_from_analytic_tangent() {
    let mesh = hex_row(2);
    let eq = equation(SolidProperties::default());
    let state = deformed_state(&mesh);
    let ctx = ElementContext::new(&mesh, &eq, &state);
    let model = IsotropicGrowth::new(SaintVenantKirchhoff::new(1.0, 0.5), 50.0, 0, 1);

    let mut field = InternalVariables::for_mesh(&mesh, 2);
    field.fill_variable(0, 1.0);
    field.fill_variable(1, 1.0);

    let mut analytic = DenseSystem::new(mesh.num_nodes(), 3);
    AnalyticAssembler::new(&model)
        .assemble(&ctx, &mut field.clone(), None, &mut analytic)
        .unwrap();

    let config = SolverConfig {
        fd_epsilon: 1e-6,
        growth_multiplier: 1,
        smoothing: SmoothingMode::Element,
        ..SolverConfig::finite_difference()
    };
    let mut growth = GrowthRemodelState::new(field, SmoothingMode::Element, 1).unwrap();
    let mut fd = DenseSystem::new(mesh.num_nodes(), 3);
    FdTangentDriver::new(&model, &config)
        .unwrap()
        .assemble(&ctx, &mut growth, None, &mut fd)
        .unwrap();

    let diff = max_abs(&(&fd.tangent - &analytic.tangent));
    assert!(diff > 1e-6, "growth coupling not visible: {:.3e}", diff);
    assert_eq!(fd.dofs_per_node(), 3);
}
