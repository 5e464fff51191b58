//! Growth-and-remodeling internal variables and their smoothing.
//!
//! Internal variables are stored per (element, Gauss point) with a fixed
//! width. Every residual or tangent evaluation overwrites them, so the
//! finite-difference path takes a [`InternalSnapshot`] before it perturbs
//! anything and puts it back afterwards.
//!
//! ## Smoothing modes
//!
//! Only the growth multiplier (one distinguished variable index) is
//! smoothed:
//! - **None**: values are used as computed
//! - **Element**: each point takes the mean over its element's points
//! - **ElementNode**: shape-function projection to the nodes and back,
//!   Σ_a N_a (Σ w N_a θ) / (Σ w N_a)

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use gnr_model::{Granularity, Mesh};

use crate::error::{Result, SolverError};

/// Dense internal-variable field indexed by (element, Gauss point, variable)
#[derive(Debug, Clone, PartialEq)]
pub struct InternalVariables {
    num_elements: usize,
    num_points: usize,
    width: usize,
    data: Vec<f64>,
}

impl InternalVariables {
    /// All-zero field
    pub fn zeros(num_elements: usize, num_points: usize, width: usize) -> Self {
        Self {
            num_elements,
            num_points,
            width,
            data: vec![0.0; num_elements * num_points * width],
        }
    }

    /// Field sized for a mesh's elements and Gauss rule
    pub fn for_mesh(mesh: &Mesh, width: usize) -> Self {
        Self::zeros(mesh.num_elements(), mesh.shape_table().num_points(), width)
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Check that the field has one slot per element and Gauss point of `mesh`
    pub fn check_mesh(&self, mesh: &Mesh) -> Result<()> {
        let num_points = mesh.shape_table().num_points();
        if self.num_elements != mesh.num_elements() || self.num_points != num_points {
            return Err(SolverError::Dimension(format!(
                "internal field is {}x{} points, mesh needs {}x{}",
                self.num_elements,
                self.num_points,
                mesh.num_elements(),
                num_points
            )));
        }
        Ok(())
    }

    fn index(&self, element: usize, point: usize) -> usize {
        (element * self.num_points + point) * self.width
    }

    /// Variables of one Gauss point
    pub fn point(&self, element: usize, point: usize) -> &[f64] {
        let start = self.index(element, point);
        &self.data[start..start + self.width]
    }

    pub fn point_mut(&mut self, element: usize, point: usize) -> &mut [f64] {
        let start = self.index(element, point);
        let width = self.width;
        &mut self.data[start..start + width]
    }

    pub fn get(&self, element: usize, point: usize, var: usize) -> f64 {
        self.data[self.index(element, point) + var]
    }

    pub fn set(&mut self, element: usize, point: usize, var: usize, value: f64) {
        let i = self.index(element, point) + var;
        self.data[i] = value;
    }

    /// Set one variable at every Gauss point
    pub fn fill_variable(&mut self, var: usize, value: f64) {
        for chunk in self.data.chunks_mut(self.width) {
            chunk[var] = value;
        }
    }

    /// Value copy of the whole field
    pub fn snapshot(&self) -> InternalSnapshot {
        InternalSnapshot {
            data: self.data.clone(),
        }
    }

    /// Restore the whole field from a snapshot of the same shape
    pub fn restore(&mut self, snapshot: &InternalSnapshot) {
        self.data.copy_from_slice(&snapshot.data);
    }

    /// Restore only the points of the listed elements
    pub fn restore_elements<'a, I>(&mut self, snapshot: &InternalSnapshot, elements: I)
    where
        I: IntoIterator<Item = &'a usize>,
    {
        let len = self.num_points * self.width;
        for &e in elements {
            let start = self.index(e, 0);
            self.data[start..start + len].copy_from_slice(&snapshot.data[start..start + len]);
        }
    }

    /// Scoped checkpoint: the listed elements are restored from `snapshot`
    /// when the guard is dropped, on every exit path.
    pub fn checkpoint<'a>(
        &'a mut self,
        snapshot: &'a InternalSnapshot,
        elements: &'a BTreeSet<usize>,
    ) -> Checkpoint<'a> {
        Checkpoint {
            field: self,
            snapshot,
            elements,
        }
    }
}

/// Saved copy of an internal-variable field
#[derive(Debug, Clone, PartialEq)]
pub struct InternalSnapshot {
    data: Vec<f64>,
}

impl InternalSnapshot {
    /// True when `field` holds exactly the saved values (bit for bit)
    pub fn matches(&self, field: &InternalVariables) -> bool {
        self.data.len() == field.data.len()
            && self
                .data
                .iter()
                .zip(&field.data)
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

/// Guard returned by [`InternalVariables::checkpoint`]
pub struct Checkpoint<'a> {
    field: &'a mut InternalVariables,
    snapshot: &'a InternalSnapshot,
    elements: &'a BTreeSet<usize>,
}

impl std::ops::Deref for Checkpoint<'_> {
    type Target = InternalVariables;

    fn deref(&self) -> &InternalVariables {
        self.field
    }
}

impl std::ops::DerefMut for Checkpoint<'_> {
    fn deref_mut(&mut self) -> &mut InternalVariables {
        self.field
    }
}

impl Drop for Checkpoint<'_> {
    fn drop(&mut self) {
        self.field.restore_elements(self.snapshot, self.elements);
    }
}

/// Smoothing applied to the growth multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SmoothingMode {
    None,
    Element,
    #[default]
    ElementNode,
}

impl SmoothingMode {
    /// Adjacency granularity a single-node perturbation must cover
    pub fn granularity(&self) -> Granularity {
        match self {
            SmoothingMode::None | SmoothingMode::Element => Granularity::Touching,
            SmoothingMode::ElementNode => Granularity::Neighborhood,
        }
    }
}

/// Internal-variable field plus the smoothing operator
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthRemodelState {
    pub field: InternalVariables,
    pub mode: SmoothingMode,
    /// Index of the smoothed variable
    pub multiplier: usize,
}

impl GrowthRemodelState {
    pub fn new(field: InternalVariables, mode: SmoothingMode, multiplier: usize) -> Result<Self> {
        if mode != SmoothingMode::None && multiplier >= field.width() {
            return Err(SolverError::Config(format!(
                "growth multiplier index {} is outside the internal-variable width {}",
                multiplier,
                field.width()
            )));
        }
        Ok(Self {
            field,
            mode,
            multiplier,
        })
    }

    /// Smooth the growth multiplier over an active element set
    pub fn smooth<'a, I>(&mut self, mesh: &Mesh, elements: I)
    where
        I: IntoIterator<Item = &'a usize> + Clone,
    {
        smooth_field(&mut self.field, self.mode, self.multiplier, mesh, elements);
    }
}

/// Smooth variable `var` of `field` over the listed elements.
///
/// Elements outside the list are neither read nor written, so restricting
/// the list to a perturbation stencil keeps the rest of the field intact.
pub fn smooth_field<'a, I>(
    field: &mut InternalVariables,
    mode: SmoothingMode,
    var: usize,
    mesh: &Mesh,
    elements: I,
) where
    I: IntoIterator<Item = &'a usize> + Clone,
{
    let num_points = field.num_points();
    match mode {
        SmoothingMode::None => {}
        SmoothingMode::Element => {
            for &e in elements {
                let mean = (0..num_points).map(|g| field.get(e, g, var)).sum::<f64>()
                    / num_points as f64;
                for g in 0..num_points {
                    field.set(e, g, var, mean);
                }
            }
        }
        SmoothingMode::ElementNode => {
            let table = mesh.shape_table();
            // Pass 1: project to the nodes
            let mut nodal: HashMap<usize, (f64, f64)> = HashMap::new();
            for &e in elements.clone() {
                for (a, &node) in mesh.element(e).nodes.iter().enumerate() {
                    let entry = nodal.entry(node).or_insert((0.0, 0.0));
                    for g in 0..num_points {
                        let wn = table.weights[g] * table.n[(a, g)];
                        entry.0 += wn * field.get(e, g, var);
                        entry.1 += wn;
                    }
                }
            }
            // Pass 2: interpolate back to the Gauss points
            for &e in elements {
                let nodes = &mesh.element(e).nodes;
                for g in 0..num_points {
                    let value = nodes
                        .iter()
                        .enumerate()
                        .map(|(a, node)| {
                            let (num, den) = nodal.get(node).copied().unwrap_or((0.0, 0.0));
                            if den != 0.0 {
                                table.n[(a, g)] * num / den
                            } else {
                                0.0
                            }
                        })
                        .sum();
                    field.set(e, g, var, value);
                }
            }
        }
    }
}
