//! Mesh data structures for growth-and-remodeling solid analysis.
//!
//! A mesh holds a single first-order element type, the reference nodal
//! coordinates, element connectivity with per-element domain ids and fiber
//! directions, and the optional nodal fields the element kernel reads
//! (prestress, growth properties, body force). Missing optional fields are
//! treated as zero by every consumer.

use nalgebra::{DMatrix, Vector3};
use thiserror::Error;

use crate::adjacency::{Granularity, NodeElementMap};
use crate::shape::{ElementType, ShapeTable};

/// Errors raised while building a mesh
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    #[error("Element {element} of type {element_type:?} has {actual} nodes but expected {expected}")]
    WrongNodeCount {
        element: usize,
        element_type: ElementType,
        expected: usize,
        actual: usize,
    },

    #[error("Element {element} references node {node} but the mesh has {num_nodes} nodes")]
    NodeOutOfRange {
        element: usize,
        node: usize,
        num_nodes: usize,
    },

    #[error("Coordinates have {actual} rows but {element_type:?} needs {expected}")]
    CoordinateDimension {
        element_type: ElementType,
        expected: usize,
        actual: usize,
    },

    #[error("Array '{name}' is {rows}x{cols} but expected {expected_rows}x{expected_cols}")]
    ArrayShape {
        name: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },
}

/// An element of the mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Node connectivity (0-based global node indices)
    pub nodes: Vec<usize>,
    /// Domain id, resolved against the equation's domain table
    pub domain: usize,
    /// Fiber directions in the reference configuration
    pub fibers: Vec<Vector3<f64>>,
}

impl Element {
    /// Create a new element without fibers
    pub fn new(nodes: Vec<usize>, domain: usize) -> Self {
        Self {
            nodes,
            domain,
            fibers: Vec::new(),
        }
    }

    /// Attach fiber directions
    pub fn with_fibers(mut self, fibers: Vec<Vector3<f64>>) -> Self {
        self.fibers = fibers;
        self
    }
}

/// Complete finite element mesh
#[derive(Debug, Clone)]
pub struct Mesh {
    element_type: ElementType,
    /// Reference coordinates, dim × node count
    coords: DMatrix<f64>,
    elements: Vec<Element>,
    /// Nodal prestress in Voigt form, Voigt rows × node count
    prestress: Option<DMatrix<f64>>,
    /// Nodal growth properties, property count × node count
    growth_props: Option<DMatrix<f64>>,
    /// Nodal body force, dim × node count
    body_force: Option<DMatrix<f64>>,
    shape: ShapeTable,
    touching: NodeElementMap,
    neighborhood: NodeElementMap,
}

impl Mesh {
    /// Create a mesh and build its shape table and adjacency maps
    pub fn new(
        element_type: ElementType,
        coords: DMatrix<f64>,
        elements: Vec<Element>,
    ) -> Result<Self, MeshError> {
        let dim = element_type.dim();
        if coords.nrows() != dim {
            return Err(MeshError::CoordinateDimension {
                element_type,
                expected: dim,
                actual: coords.nrows(),
            });
        }

        let num_nodes = coords.ncols();
        let nen = element_type.num_nodes();
        for (e, element) in elements.iter().enumerate() {
            if element.nodes.len() != nen {
                return Err(MeshError::WrongNodeCount {
                    element: e,
                    element_type,
                    expected: nen,
                    actual: element.nodes.len(),
                });
            }
            if let Some(&node) = element.nodes.iter().find(|&&n| n >= num_nodes) {
                return Err(MeshError::NodeOutOfRange {
                    element: e,
                    node,
                    num_nodes,
                });
            }
        }

        let touching = NodeElementMap::build(num_nodes, &elements, Granularity::Touching);
        let neighborhood = NodeElementMap::build(num_nodes, &elements, Granularity::Neighborhood);

        Ok(Self {
            element_type,
            coords,
            elements,
            prestress: None,
            growth_props: None,
            body_force: None,
            shape: element_type.shape_table(),
            touching,
            neighborhood,
        })
    }

    /// Attach nodal prestress (Voigt rows × node count)
    pub fn with_prestress(mut self, prestress: DMatrix<f64>) -> Result<Self, MeshError> {
        self.check_shape("prestress", &prestress, Some(self.voigt_size()))?;
        self.prestress = Some(prestress);
        Ok(self)
    }

    /// Attach nodal growth properties (any property count × node count)
    pub fn with_growth_props(mut self, props: DMatrix<f64>) -> Result<Self, MeshError> {
        self.check_shape("growth_props", &props, None)?;
        self.growth_props = Some(props);
        Ok(self)
    }

    /// Attach a nodal body force (dim × node count)
    pub fn with_body_force(mut self, body_force: DMatrix<f64>) -> Result<Self, MeshError> {
        self.check_shape("body_force", &body_force, Some(self.dim()))?;
        self.body_force = Some(body_force);
        Ok(self)
    }

    fn check_shape(
        &self,
        name: &'static str,
        array: &DMatrix<f64>,
        rows: Option<usize>,
    ) -> Result<(), MeshError> {
        let expected_rows = rows.unwrap_or(array.nrows());
        if array.nrows() != expected_rows || array.ncols() != self.num_nodes() {
            return Err(MeshError::ArrayShape {
                name,
                expected_rows,
                expected_cols: self.num_nodes(),
                rows: array.nrows(),
                cols: array.ncols(),
            });
        }
        Ok(())
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Spatial dimension
    pub fn dim(&self) -> usize {
        self.element_type.dim()
    }

    /// Number of independent stress components (3 in 2D, 6 in 3D)
    pub fn voigt_size(&self) -> usize {
        if self.dim() == 2 { 3 } else { 6 }
    }

    pub fn num_nodes(&self) -> usize {
        self.coords.ncols()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn coords(&self) -> &DMatrix<f64> {
        &self.coords
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, e: usize) -> &Element {
        &self.elements[e]
    }

    pub fn shape_table(&self) -> &ShapeTable {
        &self.shape
    }

    pub fn prestress(&self) -> Option<&DMatrix<f64>> {
        self.prestress.as_ref()
    }

    pub fn growth_props(&self) -> Option<&DMatrix<f64>> {
        self.growth_props.as_ref()
    }

    pub fn body_force(&self) -> Option<&DMatrix<f64>> {
        self.body_force.as_ref()
    }

    /// Number of growth properties per node (0 when none are attached)
    pub fn num_growth_props(&self) -> usize {
        self.growth_props.as_ref().map_or(0, |p| p.nrows())
    }

    /// Node-to-element adjacency at the requested granularity
    pub fn adjacency(&self, granularity: Granularity) -> &NodeElementMap {
        match granularity {
            Granularity::Touching => &self.touching,
            Granularity::Neighborhood => &self.neighborhood,
        }
    }

    /// Reference coordinates of one element, dim × element node count
    pub fn element_coords(&self, e: usize) -> DMatrix<f64> {
        gather_columns(&self.coords, &self.elements[e].nodes)
    }
}

/// Gather the columns of a nodal array for a list of nodes.
pub fn gather_columns(array: &DMatrix<f64>, nodes: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(array.nrows(), nodes.len(), |i, a| array[(i, nodes[a])])
}
