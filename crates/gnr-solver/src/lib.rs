//! Residual and tangent assembly for nonlinear solids with growth and
//! remodeling.
//!
//! The crate computes, per element, the internal-force residual and the
//! consistent tangent of a hyperelastic/viscoelastic solid under
//! generalized-α time integration. When the constitutive law depends on
//! history variables that have no closed-form derivative, the tangent is
//! built by finite differences over minimal element stencils instead, with
//! the growth multiplier smoothed between evaluations and the internal
//! variables restored exactly afterwards.
//!
//! # Modules
//!
//! - [`kernel`]: Gauss-point residual and tangent
//! - [`element`]: gather, Gauss loop and prestress accumulation
//! - [`growth`]: internal variables, snapshots and smoothing
//! - [`assembly`]: analytic element loop
//! - [`fd_tangent`]: finite-difference tangent driver
//! - [`traction`]: follower-pressure boundary loads
//! - [`backend`]: dense and triplet global systems
//!
//! # Example
//!
//! ```no_run
//! use gnr_model::{Equation, KinematicState, Mesh};
//! use gnr_solver::{DenseSystem, SaintVenantKirchhoff, SolverConfig, StructuralSolver};
//!
//! # fn example(mesh: Mesh, equation: Equation, state: KinematicState) -> gnr_solver::Result<()> {
//! let model = SaintVenantKirchhoff::new(1.0, 0.5);
//! let mut solver = StructuralSolver::new(&mesh, &equation, model, SolverConfig::default(), 1)?;
//! let mut system = DenseSystem::new(mesh.num_nodes(), mesh.dim());
//! solver.assemble(&state, &mut system)?;
//! println!("|R| = {:.6e}", system.residual.norm());
//! # Ok(())
//! # }
//! ```

pub mod assembly;
pub mod backend;
pub mod config;
pub mod constitutive;
pub mod element;
pub mod error;
pub mod fd_tangent;
pub mod growth;
pub mod kernel;
pub mod tensor;
pub mod traction;

pub use assembly::{AnalyticAssembler, AssemblyReport};
pub use backend::{AssemblyBackend, DenseSystem, TripletSystem};
pub use config::{SolverConfig, TangentMethod};
pub use constitutive::{
    ConstitutiveModel, IsotropicGrowth, Lame, MaterialPoint, NeoHookean, SaintVenantKirchhoff,
    StressResponse, ZeroStress,
};
pub use element::{ElementContext, ElementContribution, PrestressAccumulator, evaluate_element};
pub use error::{Result, SolverError};
pub use fd_tangent::{FdCoefficients, FdTangentDriver, NodeColumn, Perturbation, SweepReport};
pub use growth::{
    Checkpoint, GrowthRemodelState, InternalSnapshot, InternalVariables, SmoothingMode,
};
pub use kernel::{EvalMode, KernelInput, PointResult, solid_point};
pub use traction::{PressureFace, PressureLoad, TractionPoint, follower_pressure_point};

use gnr_model::{Equation, KinematicState, Mesh};

/// Report of one [`StructuralSolver::assemble`] call
#[derive(Debug, Clone, PartialEq)]
pub enum StepReport {
    Analytic(AssemblyReport),
    FiniteDifference(SweepReport),
}

/// Mesh, equation, material, configuration and growth state in one place
pub struct StructuralSolver<'a, M> {
    mesh: &'a Mesh,
    equation: &'a Equation,
    model: M,
    config: SolverConfig,
    growth: GrowthRemodelState,
    prestress: PrestressAccumulator,
}

impl<'a, M: ConstitutiveModel> StructuralSolver<'a, M> {
    /// Create a solver with an all-zero internal-variable field.
    ///
    /// # Arguments
    /// * `mesh` - Mesh with shape tables and adjacency
    /// * `equation` - Time integration, dof offset and domains
    /// * `model` - Constitutive model
    /// * `config` - Solver configuration
    /// * `internal_width` - Internal variables per Gauss point
    pub fn new(
        mesh: &'a Mesh,
        equation: &'a Equation,
        model: M,
        config: SolverConfig,
        internal_width: usize,
    ) -> Result<Self> {
        let field = InternalVariables::for_mesh(mesh, internal_width);
        Self::with_internal(mesh, equation, model, config, field)
    }

    /// Create a solver from an existing internal-variable field
    pub fn with_internal(
        mesh: &'a Mesh,
        equation: &'a Equation,
        model: M,
        config: SolverConfig,
        field: InternalVariables,
    ) -> Result<Self> {
        config.validate(field.width())?;
        field.check_mesh(mesh)?;
        let growth = GrowthRemodelState::new(
            field,
            config.effective_smoothing(),
            config.growth_multiplier,
        )?;
        if config.verbose {
            eprintln!(
                "structural solver: {} elements, {} nodes, {:?} tangent, {:?} smoothing, model {}",
                mesh.num_elements(),
                mesh.num_nodes(),
                config.tangent,
                config.effective_smoothing(),
                model.name()
            );
        }
        Ok(Self {
            mesh,
            equation,
            model,
            config,
            growth,
            prestress: PrestressAccumulator::for_mesh(mesh),
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn growth(&self) -> &GrowthRemodelState {
        &self.growth
    }

    pub fn growth_mut(&mut self) -> &mut GrowthRemodelState {
        &mut self.growth
    }

    /// Prestress accumulated by the last assembly
    pub fn prestress(&self) -> &PrestressAccumulator {
        &self.prestress
    }

    /// Assemble residual and tangent with the configured tangent method.
    ///
    /// The prestress accumulator is reset first and refilled by this call.
    pub fn assemble<B: AssemblyBackend>(
        &mut self,
        state: &KinematicState,
        backend: &mut B,
    ) -> Result<StepReport> {
        let ctx = ElementContext::new(self.mesh, self.equation, state);
        self.prestress.reset();
        match self.config.tangent {
            TangentMethod::Analytic => {
                let report = AnalyticAssembler::new(&self.model)
                    .verbose(self.config.verbose)
                    .assemble(&ctx, &mut self.growth.field, Some(&mut self.prestress), backend)?;
                Ok(StepReport::Analytic(report))
            }
            TangentMethod::FiniteDifference => {
                let report = FdTangentDriver::new(&self.model, &self.config)?.assemble(
                    &ctx,
                    &mut self.growth,
                    Some(&mut self.prestress),
                    backend,
                )?;
                Ok(StepReport::FiniteDifference(report))
            }
        }
    }

    /// Add follower-pressure loads at the given state
    pub fn apply_pressure<B: AssemblyBackend>(
        &self,
        load: &PressureLoad,
        state: &KinematicState,
        backend: &mut B,
    ) -> Result<AssemblyReport> {
        let ctx = ElementContext::new(self.mesh, self.equation, state);
        load.assemble(&ctx, backend)
    }
}
