//! Equation, domain and time-integration records.

use serde::{Deserialize, Serialize};

/// Generalized-α time-integration coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeIntegration {
    pub am: f64,
    pub af: f64,
    pub gamma: f64,
    pub beta: f64,
    pub dt: f64,
}

impl TimeIntegration {
    /// Coefficients for a given spectral radius at infinity.
    ///
    /// # Arguments
    /// * `rho_inf` - High-frequency spectral radius in [0, 1]
    /// * `dt` - Time step
    pub fn generalized_alpha(rho_inf: f64, dt: f64) -> Self {
        let am = 0.5 * (3.0 - rho_inf) / (1.0 + rho_inf);
        let af = 1.0 / (1.0 + rho_inf);
        let gamma = 0.5 + am - af;
        let beta = 0.25 * (1.0 + am - af).powi(2);
        Self {
            am,
            af,
            gamma,
            beta,
            dt,
        }
    }

    /// Displacement coefficient α_f·β·Δt²
    pub fn afu(&self) -> f64 {
        self.af * self.beta * self.dt * self.dt
    }

    /// Velocity coefficient α_f·γ·Δt
    pub fn afv(&self) -> f64 {
        self.af * self.gamma * self.dt
    }

    /// Mass and damping coefficient α_m·ρ + α_f·γ·Δt·c
    pub fn amd(&self, density: f64, damping: f64) -> f64 {
        self.am * density + self.afv() * damping
    }
}

impl Default for TimeIntegration {
    fn default() -> Self {
        Self::generalized_alpha(0.5, 1.0e-3)
    }
}

/// Material parameters read by the element kernel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolidProperties {
    /// Mass density
    pub density: f64,
    /// Solid viscosity μ
    pub viscosity: f64,
    /// Mass-proportional damping
    pub damping: f64,
    /// Uniform body force (per unit mass); only the first `dim` entries are read
    pub body_force: [f64; 3],
}

impl Default for SolidProperties {
    fn default() -> Self {
        Self {
            density: 1.0,
            viscosity: 0.0,
            damping: 0.0,
            body_force: [0.0; 3],
        }
    }
}

/// Physics tag of a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Physics {
    Structural,
    Fluid,
    Heat,
}

/// A domain: an id, its physics and its material record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: usize,
    pub physics: Physics,
    pub props: SolidProperties,
}

impl Domain {
    pub fn structural(id: usize, props: SolidProperties) -> Self {
        Self {
            id,
            physics: Physics::Structural,
            props,
        }
    }
}

/// Equation record: time integration, dof offset and domain table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    pub time: TimeIntegration,
    /// First row of the structural unknowns in the kinematic arrays
    pub offset: usize,
    pub domains: Vec<Domain>,
}

impl Equation {
    pub fn new(time: TimeIntegration, offset: usize, domains: Vec<Domain>) -> Self {
        Self {
            time,
            offset,
            domains,
        }
    }

    /// Look up a domain by id
    pub fn domain(&self, id: usize) -> Option<&Domain> {
        self.domains.iter().find(|d| d.id == id)
    }

    /// Structural material record of a domain, `None` if the domain is
    /// unknown or carries a different physics
    pub fn structural_props(&self, id: usize) -> Option<&SolidProperties> {
        self.domain(id)
            .filter(|d| d.physics == Physics::Structural)
            .map(|d| &d.props)
    }
}
