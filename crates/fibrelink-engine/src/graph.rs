//! Filament graph: an undirected simple graph of [`SpatialVertex`] points.
//!
//! Backed by a `petgraph` [`UnGraph`]. Vertices are never removed, so
//! [`VertexId`]s stay valid for the lifetime of the graph (and of any
//! clone of it). Parallel edges and self-loops are rejected at insertion.

use std::collections::HashMap;

use petgraph::algo::astar;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::types::{FilamentEdge, Point3, SpatialVertex};

/// Opaque identity of a vertex within its graph.
pub type VertexId = NodeIndex;

/// Opaque identity of an edge within its graph.
pub type EdgeId = EdgeIndex;

/// Errors raised by graph mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The vertex is not a member of this graph.
    #[error("vertex {0:?} is not part of the graph")]
    UnknownVertex(VertexId),

    /// An edge would connect a vertex to itself.
    #[error("self-loop on vertex {0:?}")]
    SelfLoop(VertexId),

    /// The unordered pair is already connected.
    #[error("edge {0:?} -- {1:?} already exists")]
    DuplicateEdge(VertexId, VertexId),
}

/// Result of a shortest-path query between two connected vertices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathInfo {
    /// Number of edges along the path.
    pub edge_count: usize,
    /// Euclidean length summed over the path's edges.
    pub length: f64,
}

/// Undirected simple graph of filament vertices.
///
/// `Clone` produces a deep copy with identical [`VertexId`]s, which is how
/// callers duplicate an upstream graph before handing it to the engine.
#[derive(Debug, Clone, Default)]
pub struct FilamentGraph {
    inner: UnGraph<SpatialVertex, FilamentEdge>,
}

impl FilamentGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex and return its identity.
    pub fn add_vertex(&mut self, vertex: SpatialVertex) -> VertexId {
        self.inner.add_node(vertex)
    }

    /// Connect `a` and `b`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownVertex`] if either endpoint is not in
    /// the graph, [`GraphError::SelfLoop`] if `a == b`, and
    /// [`GraphError::DuplicateEdge`] if the pair is already connected.
    pub fn add_edge(
        &mut self,
        a: VertexId,
        b: VertexId,
        edge: FilamentEdge,
    ) -> Result<EdgeId, GraphError> {
        for v in [a, b] {
            if !self.contains_vertex(v) {
                return Err(GraphError::UnknownVertex(v));
            }
        }
        if a == b {
            return Err(GraphError::SelfLoop(a));
        }
        if self.contains_edge(a, b) {
            return Err(GraphError::DuplicateEdge(a, b));
        }
        Ok(self.inner.add_edge(a, b, edge))
    }

    /// Whether `v` is a member of this graph.
    #[must_use]
    pub fn contains_vertex(&self, v: VertexId) -> bool {
        self.inner.node_weight(v).is_some()
    }

    /// Vertex attributes, if `v` is a member.
    #[must_use]
    pub fn vertex(&self, v: VertexId) -> Option<&SpatialVertex> {
        self.inner.node_weight(v)
    }

    /// Mutable vertex attributes, if `v` is a member.
    pub fn vertex_mut(&mut self, v: VertexId) -> Option<&mut SpatialVertex> {
        self.inner.node_weight_mut(v)
    }

    /// Edge attributes of the edge connecting `a` and `b`, if any.
    #[must_use]
    pub fn edge_between(&self, a: VertexId, b: VertexId) -> Option<&FilamentEdge> {
        self.inner
            .find_edge(a, b)
            .and_then(|e| self.inner.edge_weight(e))
    }

    /// All vertex identities in insertion order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.inner.node_indices()
    }

    /// All edges as `(a, b, attributes)`.
    pub fn edges(&self) -> impl Iterator<Item = (VertexId, VertexId, &FilamentEdge)> + '_ {
        self.inner
            .edge_references()
            .map(|e| (e.source(), e.target(), e.weight()))
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Returns `true` if the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Number of edges incident to `v` (0 for unknown vertices).
    #[must_use]
    pub fn degree_of(&self, v: VertexId) -> usize {
        self.inner.edges(v).count()
    }

    /// Vertices adjacent to `v`.
    pub fn neighbors_of(&self, v: VertexId) -> impl Iterator<Item = VertexId> + '_ {
        self.inner.neighbors(v)
    }

    /// Whether the unordered pair `{a, b}` is connected by an edge.
    #[must_use]
    pub fn contains_edge(&self, a: VertexId, b: VertexId) -> bool {
        self.inner.find_edge(a, b).is_some()
    }

    /// Fewest-edges path between `a` and `b`.
    ///
    /// Every edge has unit cost, so the path minimises the edge count;
    /// [`PathInfo::length`] is the Euclidean length along that path.
    /// Returns `None` when `b` is unreachable from `a`. A vertex has a
    /// zero-length path to itself.
    #[must_use]
    pub fn shortest_path(&self, a: VertexId, b: VertexId) -> Option<PathInfo> {
        if !self.contains_vertex(a) || !self.contains_vertex(b) {
            return None;
        }
        let (edge_count, nodes) = astar(&self.inner, a, |n| n == b, |_| 1_usize, |_| 0)?;
        let length = nodes
            .windows(2)
            .map(|w| self.position(w[0]).distance(self.position(w[1])))
            .sum();
        Some(PathInfo { edge_count, length })
    }

    /// Connected components as vertex sets, ordered by their lowest vertex.
    #[must_use]
    pub fn connected_components(&self) -> Vec<Vec<VertexId>> {
        let labels = self.component_labels();
        let mut order: HashMap<usize, usize> = HashMap::new();
        let mut components: Vec<Vec<VertexId>> = Vec::new();
        for v in self.vertex_ids() {
            let slot = *order.entry(labels.of(v)).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[slot].push(v);
        }
        components
    }

    /// Component label per vertex, computed once for repeated
    /// "same component?" queries.
    #[must_use]
    pub fn component_labels(&self) -> ComponentLabels {
        let mut uf = UnionFind::<usize>::new(self.inner.node_count());
        for e in self.inner.edge_references() {
            uf.union(e.source().index(), e.target().index());
        }
        ComponentLabels {
            labels: uf.into_labeling(),
        }
    }

    /// Unit vector from the single neighbour of `v` towards `v`.
    ///
    /// Only endpoints (degree 1) have a direction. With `project_z`, both
    /// positions are flattened onto `z = 0` first. Coincident positions
    /// yield `None`.
    #[must_use]
    pub fn direction_of(&self, v: VertexId, project_z: bool) -> Option<Point3> {
        let mut neighbors = self.inner.neighbors(v);
        let neighbor = neighbors.next()?;
        if neighbors.next().is_some() {
            return None;
        }
        let (here, there) = if project_z {
            (self.position(v).projected(), self.position(neighbor).projected())
        } else {
            (self.position(v), self.position(neighbor))
        };
        here.sub(there).normalized()
    }

    fn position(&self, v: VertexId) -> Point3 {
        self.inner[v].position
    }
}

/// Snapshot of component membership; see
/// [`FilamentGraph::component_labels`].
#[derive(Debug, Clone)]
pub struct ComponentLabels {
    labels: Vec<usize>,
}

impl ComponentLabels {
    /// Component label of `v`.
    #[must_use]
    pub fn of(&self, v: VertexId) -> usize {
        self.labels.get(v.index()).copied().unwrap_or(usize::MAX)
    }

    /// Whether `a` and `b` are in the same component.
    #[must_use]
    pub fn connected(&self, a: VertexId, b: VertexId) -> bool {
        self.of(a) == self.of(b)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn vertex(x: f64, y: f64) -> SpatialVertex {
        SpatialVertex::new(Point3::new(x, y, 0.0))
    }

    /// a - b - c    d
    fn chain() -> (FilamentGraph, [VertexId; 4]) {
        let mut g = FilamentGraph::new();
        let a = g.add_vertex(vertex(0.0, 0.0));
        let b = g.add_vertex(vertex(3.0, 4.0));
        let c = g.add_vertex(vertex(3.0, 10.0));
        let d = g.add_vertex(vertex(50.0, 50.0));
        g.add_edge(a, b, FilamentEdge::default()).unwrap();
        g.add_edge(b, c, FilamentEdge::default()).unwrap();
        (g, [a, b, c, d])
    }

    #[test]
    fn degree_and_neighbors() {
        let (g, [a, b, c, d]) = chain();
        assert_eq!(g.degree_of(a), 1);
        assert_eq!(g.degree_of(b), 2);
        assert_eq!(g.degree_of(c), 1);
        assert_eq!(g.degree_of(d), 0);
        let mut n: Vec<_> = g.neighbors_of(b).collect();
        n.sort();
        assert_eq!(n, vec![a, c]);
    }

    #[test]
    fn contains_edge_is_undirected() {
        let (g, [a, b, _, d]) = chain();
        assert!(g.contains_edge(a, b));
        assert!(g.contains_edge(b, a));
        assert!(!g.contains_edge(a, d));
    }

    #[test]
    fn add_edge_rejects_self_loop_and_duplicates() {
        let (mut g, [a, b, _, _]) = chain();
        assert_eq!(
            g.add_edge(a, a, FilamentEdge::default()),
            Err(GraphError::SelfLoop(a))
        );
        assert_eq!(
            g.add_edge(b, a, FilamentEdge::default()),
            Err(GraphError::DuplicateEdge(b, a))
        );
        let ghost = VertexId::new(99);
        assert_eq!(
            g.add_edge(a, ghost, FilamentEdge::default()),
            Err(GraphError::UnknownVertex(ghost))
        );
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn shortest_path_counts_edges_and_length() {
        let (g, [a, _, c, d]) = chain();
        let info = g.shortest_path(a, c).unwrap();
        assert_eq!(info.edge_count, 2);
        assert!((info.length - 11.0).abs() < 1e-10);
        assert!(g.shortest_path(a, d).is_none());
        assert_eq!(g.shortest_path(d, d).unwrap().edge_count, 0);
    }

    #[test]
    fn connected_components_partition_vertices() {
        let (g, [a, b, c, d]) = chain();
        let comps = g.connected_components();
        assert_eq!(comps, vec![vec![a, b, c], vec![d]]);

        let labels = g.component_labels();
        assert!(labels.connected(a, c));
        assert!(!labels.connected(a, d));
    }

    #[test]
    fn direction_points_away_from_neighbor() {
        let (g, [a, b, c, d]) = chain();
        let dir = g.direction_of(c, false).unwrap();
        assert!((dir.y - 1.0).abs() < 1e-10);
        assert!(dir.x.abs() < 1e-10);
        let dir_a = g.direction_of(a, false).unwrap();
        assert!((dir_a.x + 0.6).abs() < 1e-10);
        assert!((dir_a.y + 0.8).abs() < 1e-10);
        assert!(g.direction_of(b, false).is_none());
        assert!(g.direction_of(d, false).is_none());
    }

    #[test]
    fn direction_projection_ignores_z() {
        let mut g = FilamentGraph::new();
        let a = g.add_vertex(SpatialVertex::new(Point3::new(0.0, 0.0, 0.0)));
        let b = g.add_vertex(SpatialVertex::new(Point3::new(0.0, 0.0, 5.0)));
        g.add_edge(a, b, FilamentEdge::default()).unwrap();
        assert!(g.direction_of(b, false).is_some());
        assert!(g.direction_of(b, true).is_none());
    }

    #[test]
    fn clone_is_independent_deep_copy() {
        let (g, [a, _, _, d]) = chain();
        let mut copy = g.clone();
        copy.add_edge(a, d, FilamentEdge::default()).unwrap();
        assert_eq!(copy.edge_count(), 3);
        assert_eq!(g.edge_count(), 2);
        assert!(!g.contains_edge(a, d));
    }
}
