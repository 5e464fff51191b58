//! Solver configuration.
//!
//! Read from JSON by callers that keep their settings on disk; every field
//! has a default so partial documents are accepted.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};
use crate::growth::SmoothingMode;

/// How the global tangent is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TangentMethod {
    /// Closed-form consistent tangent from the element kernel
    #[default]
    Analytic,
    /// Directional finite differences over per-node element stencils
    FiniteDifference,
}

/// Solver configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Tangent computation path
    pub tangent: TangentMethod,
    /// Smoothing applied to the growth multiplier
    pub smoothing: SmoothingMode,
    /// Finite-difference step, fixed for the whole problem
    pub fd_epsilon: f64,
    /// Index of the smoothed internal variable
    pub growth_multiplier: usize,
    /// Distribute the finite-difference node loop over rayon workers
    pub parallel: bool,
    /// Print progress and warnings to stderr
    pub verbose: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tangent: TangentMethod::Analytic,
            smoothing: SmoothingMode::ElementNode,
            fd_epsilon: 1.0e-8,
            growth_multiplier: 30,
            parallel: false,
            verbose: false,
        }
    }
}

impl SolverConfig {
    /// Finite-difference configuration with the default step
    pub fn finite_difference() -> Self {
        Self {
            tangent: TangentMethod::FiniteDifference,
            ..Self::default()
        }
    }

    /// Smoothing actually applied; the analytic path never smooths
    pub fn effective_smoothing(&self) -> SmoothingMode {
        match self.tangent {
            TangentMethod::Analytic => SmoothingMode::None,
            TangentMethod::FiniteDifference => self.smoothing,
        }
    }

    /// Check the configuration against the internal-variable width.
    ///
    /// The multiplier index is only checked when smoothing is in effect.
    ///
    /// # Arguments
    /// * `internal_width` - Number of internal variables per Gauss point
    pub fn validate(&self, internal_width: usize) -> Result<()> {
        if !self.fd_epsilon.is_finite() || self.fd_epsilon <= 0.0 {
            return Err(SolverError::Config(format!(
                "fd_epsilon must be finite and positive, got {}",
                self.fd_epsilon
            )));
        }
        if self.effective_smoothing() != SmoothingMode::None
            && self.growth_multiplier >= internal_width
        {
            return Err(SolverError::Config(format!(
                "growth_multiplier index {} is outside the internal-variable width {}",
                self.growth_multiplier, internal_width
            )));
        }
        Ok(())
    }

    /// Parse a configuration from JSON
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SolverError::Config(e.to_string()))
    }

    /// Serialize the configuration to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SolverError::Config(e.to_string()))
    }
}
