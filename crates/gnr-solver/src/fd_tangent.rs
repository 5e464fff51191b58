//! Finite-difference tangent for history-dependent growth models.
//!
//! When the growth multiplier depends on the deformation through stored
//! history, the element kernel cannot differentiate it. This driver builds
//! the global tangent one node column at a time by perturbing the kinematic
//! state and re-evaluating only the elements that can see the perturbation.
//!
//! # Protocol
//!
//! **Residual pass** (all structural elements):
//! 1. stress-only update of the internal variables
//! 2. smoothing of the growth multiplier
//! 3. snapshot, residual evaluation and scatter
//! 4. restore the internal variables from the snapshot
//!
//! **Tangent sweep**, for every node A with the stencil chosen by the
//! smoothing mode (touching elements for `None`/`Element`, neighbourhood for
//! `ElementNode`):
//! 1. central evaluation R₀; every dof column gets −(c_a + c_v + c_u)·R₀
//! 2. for each dof i and each field (acceleration, velocity, displacement):
//!    perturb entry (i, A) by ε, evaluate R, add c_k·R to column i, restore
//! 3. scatter the node column (rows: stencil nodes, columns: dofs of A)
//!
//! with c_a = α_m/ε, c_v = α_f γ Δt/ε, c_u = α_f β Δt²/ε. Every evaluation
//! runs stress-only update, smoothing and residual over the stencil, and the
//! stencil's internal variables are restored before the next one. After the
//! sweep the field equals its pre-sweep value bit for bit.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use gnr_model::{KinematicField, KinematicState, TimeIntegration};

use crate::assembly::check_backend;
use crate::backend::AssemblyBackend;
use crate::config::SolverConfig;
use crate::constitutive::ConstitutiveModel;
use crate::element::{ElementContext, PrestressAccumulator, evaluate_element};
use crate::error::{Result, SolverError};
use crate::growth::{
    GrowthRemodelState, InternalSnapshot, InternalVariables, SmoothingMode, smooth_field,
};
use crate::kernel::EvalMode;

/// Perturbation coefficients of the three kinematic fields
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FdCoefficients {
    /// α_m / ε
    pub acceleration: f64,
    /// α_f γ Δt / ε
    pub velocity: f64,
    /// α_f β Δt² / ε
    pub displacement: f64,
}

impl FdCoefficients {
    pub fn new(time: &TimeIntegration, epsilon: f64) -> Self {
        Self {
            acceleration: time.am / epsilon,
            velocity: time.afv() / epsilon,
            displacement: time.afu() / epsilon,
        }
    }

    pub fn of(&self, field: KinematicField) -> f64 {
        match field {
            KinematicField::Acceleration => self.acceleration,
            KinematicField::Velocity => self.velocity,
            KinematicField::Displacement => self.displacement,
        }
    }

    /// Coefficient applied to the central residual
    pub fn total(&self) -> f64 {
        self.acceleration + self.velocity + self.displacement
    }
}

/// Scoped perturbation of one kinematic entry.
///
/// The entry is shifted by ε on creation and written back to its exact
/// original value when the guard is dropped.
pub struct Perturbation<'a> {
    state: &'a mut KinematicState,
    field: KinematicField,
    row: usize,
    node: usize,
    original: f64,
}

impl<'a> Perturbation<'a> {
    pub fn apply(
        state: &'a mut KinematicState,
        field: KinematicField,
        row: usize,
        node: usize,
        epsilon: f64,
    ) -> Self {
        let entry = &mut state.field_mut(field)[(row, node)];
        let original = *entry;
        *entry = original + epsilon;
        Self {
            state,
            field,
            row,
            node,
            original,
        }
    }

    /// The perturbed state
    pub fn state(&self) -> &KinematicState {
        self.state
    }
}

impl Drop for Perturbation<'_> {
    fn drop(&mut self) {
        self.state.field_mut(self.field)[(self.row, self.node)] = self.original;
    }
}

/// Counts and timing of a residual pass or tangent sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Nodes whose column was assembled
    pub nodes: usize,
    /// Stencil evaluations (central plus perturbed)
    pub evaluations: usize,
    /// Element evaluations summed over all stencils
    pub element_evaluations: usize,
    pub elapsed: Duration,
}

impl SweepReport {
    fn merge(&mut self, other: &SweepReport) {
        self.nodes += other.nodes;
        self.evaluations += other.evaluations;
        self.element_evaluations += other.element_evaluations;
    }
}

/// Tangent column of one node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeColumn {
    pub node: usize,
    /// Row nodes in ascending order
    pub rows: Vec<usize>,
    /// (rows × dim) × dim block
    pub block: DMatrix<f64>,
}

/// Finite-difference tangent driver
#[derive(Debug, Clone, Copy)]
pub struct FdTangentDriver<'a, M> {
    model: &'a M,
    epsilon: f64,
    parallel: bool,
    verbose: bool,
}

impl<'a, M: ConstitutiveModel> FdTangentDriver<'a, M> {
    /// Create a driver using ε, parallelism and verbosity from `config`
    pub fn new(model: &'a M, config: &SolverConfig) -> Result<Self> {
        if !config.fd_epsilon.is_finite() || config.fd_epsilon <= 0.0 {
            return Err(SolverError::Config(format!(
                "fd_epsilon must be finite and positive, got {}",
                config.fd_epsilon
            )));
        }
        Ok(Self {
            model,
            epsilon: config.fd_epsilon,
            parallel: config.parallel,
            verbose: config.verbose,
        })
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Residual pass followed by the tangent sweep
    pub fn assemble<B: AssemblyBackend>(
        &self,
        ctx: &ElementContext<'_>,
        growth: &mut GrowthRemodelState,
        accumulator: Option<&mut PrestressAccumulator>,
        backend: &mut B,
    ) -> Result<SweepReport> {
        let mut report = self.residual_pass(ctx, growth, accumulator, backend)?;
        let sweep = self.tangent_sweep(ctx, growth, backend)?;
        report.merge(&sweep);
        report.elapsed += sweep.elapsed;
        Ok(report)
    }

    /// Assemble the global residual over every structural element.
    ///
    /// The internal variables are updated in stress-only mode and smoothed;
    /// that state is kept, while the overwrites of the residual evaluation
    /// itself are undone. Points of non-structural elements are left as they
    /// are.
    pub fn residual_pass<B: AssemblyBackend>(
        &self,
        ctx: &ElementContext<'_>,
        growth: &mut GrowthRemodelState,
        mut accumulator: Option<&mut PrestressAccumulator>,
        backend: &mut B,
    ) -> Result<SweepReport> {
        let start = Instant::now();
        check_backend(ctx, backend)?;
        growth.field.check_mesh(ctx.mesh)?;

        let all: BTreeSet<usize> = (0..ctx.mesh.num_elements())
            .filter(|&e| ctx.is_structural(e))
            .collect();
        for &e in &all {
            evaluate_element(self.model, ctx, e, &mut growth.field, EvalMode::StressOnly, None)?;
        }
        growth.smooth(ctx.mesh, &all);

        let snapshot = growth.field.snapshot();
        let mut report = SweepReport {
            evaluations: 1,
            ..SweepReport::default()
        };
        {
            let mut field = growth.field.checkpoint(&snapshot, &all);
            for &e in &all {
                let contribution = evaluate_element(
                    self.model,
                    ctx,
                    e,
                    &mut field,
                    EvalMode::ResidualOnly,
                    accumulator.as_deref_mut(),
                )?;
                if let Some(c) = contribution {
                    backend.add_residual(&c.nodes, &c.residual);
                    report.element_evaluations += 1;
                }
            }
        }

        report.elapsed = start.elapsed();
        if self.verbose {
            eprintln!(
                "fd residual pass ({}): {} elements in {:.3?}",
                self.model.name(),
                report.element_evaluations,
                report.elapsed
            );
        }
        Ok(report)
    }

    /// Assemble the finite-difference tangent, one node column at a time
    pub fn tangent_sweep<B: AssemblyBackend>(
        &self,
        ctx: &ElementContext<'_>,
        growth: &mut GrowthRemodelState,
        backend: &mut B,
    ) -> Result<SweepReport> {
        let start = Instant::now();
        check_backend(ctx, backend)?;
        growth.field.check_mesh(ctx.mesh)?;

        let snapshot = growth.field.snapshot();
        let num_nodes = ctx.mesh.num_nodes();
        let (mode, multiplier) = (growth.mode, growth.multiplier);

        let mut report = if self.parallel {
            let chunk = num_nodes.div_ceil(rayon::current_num_threads()).max(1);
            let nodes: Vec<usize> = (0..num_nodes).collect();
            let parts = nodes
                .par_chunks(chunk)
                .map(|chunk_nodes| -> Result<(Vec<NodeColumn>, SweepReport)> {
                    // Each worker owns its field and kinematic state
                    let mut field = growth.field.clone();
                    let mut state = ctx.state.clone();
                    let mut part = SweepReport::default();
                    let mut columns = Vec::with_capacity(chunk_nodes.len());
                    for &node in chunk_nodes {
                        if let Some(column) = self.node_column(
                            ctx,
                            mode,
                            multiplier,
                            &mut field,
                            &snapshot,
                            &mut state,
                            node,
                            &mut part,
                        )? {
                            columns.push(column);
                        }
                    }
                    Ok((columns, part))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut report = SweepReport::default();
            for (columns, part) in parts {
                for column in &columns {
                    backend.add_tangent(&column.rows, &[column.node], &column.block);
                }
                report.merge(&part);
            }
            report
        } else {
            let mut state = ctx.state.clone();
            let mut report = SweepReport::default();
            for node in 0..num_nodes {
                if let Some(column) = self.node_column(
                    ctx,
                    mode,
                    multiplier,
                    &mut growth.field,
                    &snapshot,
                    &mut state,
                    node,
                    &mut report,
                )? {
                    backend.add_tangent(&column.rows, &[column.node], &column.block);
                }
            }
            report
        };

        growth.field.restore(&snapshot);

        report.elapsed = start.elapsed();
        if self.verbose {
            eprintln!(
                "fd tangent sweep ({}): {} nodes, {} evaluations, {} element evaluations in {:.3?}",
                self.model.name(),
                report.nodes,
                report.evaluations,
                report.element_evaluations,
                report.elapsed
            );
        }
        Ok(report)
    }

    /// Build the tangent column of one node.
    ///
    /// Returns `None` for nodes without structural elements in their stencil.
    #[allow(clippy::too_many_arguments)]
    fn node_column(
        &self,
        ctx: &ElementContext<'_>,
        mode: SmoothingMode,
        multiplier: usize,
        field: &mut InternalVariables,
        snapshot: &InternalSnapshot,
        state: &mut KinematicState,
        node: usize,
        report: &mut SweepReport,
    ) -> Result<Option<NodeColumn>> {
        let mesh = ctx.mesh;
        let dim = mesh.dim();
        let stencil: BTreeSet<usize> = mesh
            .adjacency(mode.granularity())
            .elements(node)
            .iter()
            .copied()
            .filter(|&e| ctx.is_structural(e))
            .collect();
        if stencil.is_empty() {
            return Ok(None);
        }

        let rows: Vec<usize> = stencil
            .iter()
            .flat_map(|&e| mesh.element(e).nodes.iter().copied())
            .collect::<BTreeSet<usize>>()
            .into_iter()
            .collect();
        let row_index: HashMap<usize, usize> =
            rows.iter().enumerate().map(|(i, &n)| (n, i)).collect();

        let coef = FdCoefficients::new(&ctx.equation.time, self.epsilon);
        let mut block = DMatrix::zeros(rows.len() * dim, dim);

        let central = self.evaluate_stencil(
            ctx,
            mode,
            multiplier,
            field,
            snapshot,
            state,
            &stencil,
            &row_index,
            report,
        )?;
        for j in 0..dim {
            block.column_mut(j).axpy(-coef.total(), &central, 1.0);
        }

        let offset = ctx.equation.offset;
        for i in 0..dim {
            for kind in KinematicField::ALL {
                let perturbed = Perturbation::apply(state, kind, offset + i, node, self.epsilon);
                let r = self.evaluate_stencil(
                    ctx,
                    mode,
                    multiplier,
                    field,
                    snapshot,
                    perturbed.state(),
                    &stencil,
                    &row_index,
                    report,
                )?;
                drop(perturbed);
                block.column_mut(i).axpy(coef.of(kind), &r, 1.0);
            }
        }

        report.nodes += 1;
        Ok(Some(NodeColumn { node, rows, block }))
    }

    /// Stress-only update, smoothing and residual over one stencil.
    ///
    /// The stencil's internal variables are restored from `snapshot` before
    /// returning, on success and on error.
    #[allow(clippy::too_many_arguments)]
    fn evaluate_stencil(
        &self,
        ctx: &ElementContext<'_>,
        mode: SmoothingMode,
        multiplier: usize,
        field: &mut InternalVariables,
        snapshot: &InternalSnapshot,
        state: &KinematicState,
        stencil: &BTreeSet<usize>,
        row_index: &HashMap<usize, usize>,
        report: &mut SweepReport,
    ) -> Result<DVector<f64>> {
        let local_ctx = ElementContext::new(ctx.mesh, ctx.equation, state);
        let dim = ctx.mesh.dim();
        let mut residual = DVector::zeros(row_index.len() * dim);

        let mut field = field.checkpoint(snapshot, stencil);
        for &e in stencil {
            evaluate_element(self.model, &local_ctx, e, &mut field, EvalMode::StressOnly, None)?;
        }
        smooth_field(&mut field, mode, multiplier, ctx.mesh, stencil);
        for &e in stencil {
            let contribution = evaluate_element(
                self.model,
                &local_ctx,
                e,
                &mut field,
                EvalMode::ResidualOnly,
                None,
            )?;
            let Some(c) = contribution else {
                continue;
            };
            for (a, node) in c.nodes.iter().enumerate() {
                let r = row_index[node];
                for i in 0..dim {
                    residual[r * dim + i] += c.residual[a * dim + i];
                }
            }
        }

        report.evaluations += 1;
        report.element_evaluations += stencil.len();
        Ok(residual)
    }
}
