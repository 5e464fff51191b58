//! Analytic assembly of the structural residual and tangent.
//!
//! Loops every element, skips those outside a structural domain, evaluates
//! the rest with the closed-form tangent and scatters the local blocks into
//! an [`AssemblyBackend`].
//!
//! ## Assembly Process
//!
//! 1. Check array shapes and the backend's dofs per node
//! 2. For each structural element:
//!    - Run the Gauss loop in full mode (internal variables are updated)
//!    - Accumulate the prestress numerator and denominator when requested
//!    - Add the local residual and tangent to the backend
//! 3. Return an [`AssemblyReport`]

use std::time::{Duration, Instant};

use crate::backend::AssemblyBackend;
use crate::constitutive::ConstitutiveModel;
use crate::element::{ElementContext, PrestressAccumulator, evaluate_element};
use crate::error::{Result, SolverError};
use crate::growth::InternalVariables;
use crate::kernel::EvalMode;

/// Counts and timing of one assembly
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyReport {
    /// Elements evaluated
    pub elements: usize,
    /// Elements skipped because their domain is not structural
    pub skipped: usize,
    /// Gauss points evaluated
    pub gauss_points: usize,
    pub elapsed: Duration,
}

/// Element loop for the analytic tangent path
#[derive(Debug, Clone, Copy)]
pub struct AnalyticAssembler<'a, M> {
    model: &'a M,
    verbose: bool,
}

impl<'a, M: ConstitutiveModel> AnalyticAssembler<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self {
            model,
            verbose: false,
        }
    }

    /// Print a summary line to stderr after each assembly
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Assemble residual and tangent of every structural element.
    ///
    /// # Arguments
    /// * `ctx` - Mesh, equation and kinematic state
    /// * `internal` - Internal-variable field, updated in place
    /// * `accumulator` - Optional prestress accumulator
    /// * `backend` - Global system receiving the local blocks
    pub fn assemble<B: AssemblyBackend>(
        &self,
        ctx: &ElementContext<'_>,
        internal: &mut InternalVariables,
        mut accumulator: Option<&mut PrestressAccumulator>,
        backend: &mut B,
    ) -> Result<AssemblyReport> {
        let start = Instant::now();
        check_backend(ctx, backend)?;
        internal.check_mesh(ctx.mesh)?;

        let num_points = ctx.mesh.shape_table().num_points();
        let mut report = AssemblyReport::default();
        for e in 0..ctx.mesh.num_elements() {
            let contribution = evaluate_element(
                self.model,
                ctx,
                e,
                internal,
                EvalMode::Full,
                accumulator.as_deref_mut(),
            )?;
            let Some(c) = contribution else {
                report.skipped += 1;
                continue;
            };
            backend.add_residual(&c.nodes, &c.residual);
            if let Some(k) = &c.tangent {
                backend.add_tangent(&c.nodes, &c.nodes, k);
            }
            report.elements += 1;
            report.gauss_points += num_points;
        }

        report.elapsed = start.elapsed();
        if self.verbose {
            eprintln!(
                "analytic assembly ({}): {} elements, {} skipped, {} Gauss points in {:.3?}",
                self.model.name(),
                report.elements,
                report.skipped,
                report.gauss_points,
                report.elapsed
            );
        }
        Ok(report)
    }
}

/// Check that a backend and the kinematic arrays fit the mesh
pub(crate) fn check_backend<B: AssemblyBackend>(
    ctx: &ElementContext<'_>,
    backend: &B,
) -> Result<()> {
    ctx.validate()?;
    if backend.dofs_per_node() != ctx.mesh.dim() {
        return Err(SolverError::Dimension(format!(
            "backend has {} dofs per node but the mesh is {}D",
            backend.dofs_per_node(),
            ctx.mesh.dim()
        )));
    }
    Ok(())
}
