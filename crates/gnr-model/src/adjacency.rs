//! Node-to-element adjacency.
//!
//! Two granularities are kept: the elements that contain a node, and the
//! elements that contain any node sharing an element with it. The second set
//! is the stencil needed when a perturbation must be seen through nodal
//! smoothing, which spreads a Gauss-point change to every neighbouring
//! element.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::mesh::Element;

/// Adjacency granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    /// Elements containing the node
    Touching,
    /// Elements containing the node or any node that shares an element with it
    Neighborhood,
}

/// Ordered element sets per global node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeElementMap {
    granularity: Granularity,
    sets: Vec<BTreeSet<usize>>,
}

impl NodeElementMap {
    /// Build the map for `num_nodes` nodes from element connectivity
    pub fn build(num_nodes: usize, elements: &[Element], granularity: Granularity) -> Self {
        let mut touching = vec![BTreeSet::new(); num_nodes];
        for (e, element) in elements.iter().enumerate() {
            for &node in &element.nodes {
                touching[node].insert(e);
            }
        }

        let sets = match granularity {
            Granularity::Touching => touching,
            Granularity::Neighborhood => touching
                .iter()
                .map(|direct| {
                    direct
                        .iter()
                        .flat_map(|&e| elements[e].nodes.iter())
                        .flat_map(|&node| touching[node].iter().copied())
                        .collect()
                })
                .collect(),
        };

        Self { granularity, sets }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn num_nodes(&self) -> usize {
        self.sets.len()
    }

    /// Elements adjacent to `node`
    pub fn elements(&self, node: usize) -> &BTreeSet<usize> {
        &self.sets[node]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three triangles in a strip:
    /// ```text
    /// 3---4---5
    /// | \ | \ |
    /// 0---1---2
    /// ```
    /// Only elements 0..3 are built: (0,1,3), (1,4,3), (1,2,4)
    fn strip() -> Vec<Element> {
        vec![
            Element::new(vec![0, 1, 3], 1),
            Element::new(vec![1, 4, 3], 1),
            Element::new(vec![1, 2, 4], 1),
        ]
    }

    #[test]
    fn touching_sets() {
        let map = NodeElementMap::build(6, &strip(), Granularity::Touching);
        assert_eq!(map.elements(0).iter().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(map.elements(1).iter().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(map.elements(2).iter().copied().collect::<Vec<_>>(), vec![2]);
        assert!(map.elements(5).is_empty());
    }

    #[test]
    fn neighborhood_contains_touching() {
        let elements = strip();
        let touching = NodeElementMap::build(6, &elements, Granularity::Touching);
        let neighborhood = NodeElementMap::build(6, &elements, Granularity::Neighborhood);
        for node in 0..6 {
            assert!(touching.elements(node).is_subset(neighborhood.elements(node)));
        }
        // Node 0 only touches element 0, but node 1 (shared) reaches all three
        assert_eq!(
            neighborhood.elements(0).iter().copied().collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        // Node 2 reaches element 0 through node 1
        assert!(neighborhood.elements(2).contains(&0));
    }

    #[test]
    fn map_metadata() {
        let map = NodeElementMap::build(6, &strip(), Granularity::Touching);
        assert_eq!(map.granularity(), Granularity::Touching);
        assert_eq!(map.num_nodes(), 6);
    }
}
