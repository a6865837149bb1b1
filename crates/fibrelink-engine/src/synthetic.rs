//! Deterministic test graphs.

use serde::{Deserialize, Serialize};

use crate::graph::FilamentGraph;
use crate::types::{FilamentEdge, Point3, SpatialVertex};

/// Parallel straight filaments along `x`, each broken once in the middle.
///
/// Filament `i` lies at `y = i * row_spacing` and `z = i % slices`. It is
/// made of two pieces of `points_per_piece` vertices each, spaced
/// `spacing` apart, separated by a gap of `gap`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrokenFilaments {
    /// Number of filaments.
    pub filaments: usize,
    /// Vertices per piece; at least 2 gives each piece a direction.
    pub points_per_piece: usize,
    /// Distance between consecutive vertices of a piece.
    pub spacing: f64,
    /// Distance between the two pieces.
    pub gap: f64,
    /// Distance between neighbouring filaments.
    pub row_spacing: f64,
    /// Number of distinct `z` planes the filaments cycle through.
    pub slices: usize,
}

impl Default for BrokenFilaments {
    fn default() -> Self {
        Self {
            filaments: 16,
            points_per_piece: 8,
            spacing: 1.0,
            gap: 4.0,
            row_spacing: 20.0,
            slices: 1,
        }
    }
}

impl BrokenFilaments {
    /// Build the graph.
    #[must_use]
    pub fn build(&self) -> FilamentGraph {
        let mut graph = FilamentGraph::new();
        let slices = self.slices.max(1);
        for i in 0..self.filaments {
            #[allow(clippy::cast_precision_loss)]
            let (y, z) = (i as f64 * self.row_spacing, (i % slices) as f64);
            let mut x = 0.0;
            for _ in 0..2 {
                let mut previous = None;
                for _ in 0..self.points_per_piece {
                    let v = graph.add_vertex(SpatialVertex::new(Point3::new(x, y, z)));
                    if let Some(p) = previous
                        && let Err(e) = graph.add_edge(p, v, FilamentEdge::default())
                    {
                        tracing::debug!("synthetic edge skipped: {e}");
                    }
                    previous = Some(v);
                    x += self.spacing;
                }
                x += self.gap - self.spacing;
            }
        }
        graph
    }

    /// Number of breaks, i.e. the edges a perfect reconnection adds.
    #[must_use]
    pub const fn break_count(&self) -> usize {
        self.filaments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_match_layout() {
        let fixture = BrokenFilaments {
            filaments: 3,
            points_per_piece: 4,
            ..BrokenFilaments::default()
        };
        let g = fixture.build();
        assert_eq!(g.vertex_count(), 24);
        assert_eq!(g.edge_count(), 18);
        assert_eq!(g.connected_components().len(), 6);
        assert_eq!(fixture.break_count(), 3);
    }

    #[test]
    fn gap_separates_pieces() {
        let fixture = BrokenFilaments {
            filaments: 1,
            points_per_piece: 2,
            spacing: 1.0,
            gap: 5.0,
            ..BrokenFilaments::default()
        };
        let g = fixture.build();
        let xs: Vec<f64> = g
            .vertex_ids()
            .filter_map(|v| g.vertex(v).map(|s| s.position.x))
            .collect();
        assert_eq!(xs, vec![0.0, 1.0, 6.0, 7.0]);
    }

    #[test]
    fn filaments_cycle_through_slices() {
        let fixture = BrokenFilaments {
            filaments: 3,
            points_per_piece: 1,
            slices: 2,
            ..BrokenFilaments::default()
        };
        let g = fixture.build();
        let zs: Vec<f64> = g
            .vertex_ids()
            .filter_map(|v| g.vertex(v).map(|s| s.position.z))
            .collect();
        assert_eq!(zs, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    }
}
