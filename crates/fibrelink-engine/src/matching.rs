//! Greedy degree-constrained matching: commit scored candidates best-first
//! while no vertex exceeds its budget of new edges.
//!
//! A single pass, not a globally optimal b-matching. A candidate that does
//! not fit the budget when its turn comes is skipped and never retried.

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::candidate::EdgeCandidate;
use crate::graph::{FilamentGraph, VertexId};
use crate::policy::ScoreOrder;
use crate::types::FilamentEdge;

/// Per-vertex counters of edges added during one run.
#[derive(Debug, Clone)]
pub struct DegreeBudget {
    limit: Option<u32>,
    ignore_source: bool,
    ignore_target: bool,
    added: HashMap<VertexId, u32>,
}

impl DegreeBudget {
    /// A fresh budget. `None` means unlimited.
    ///
    /// An ignored side is exempt from the check, but its counter still
    /// advances on every commit.
    #[must_use]
    pub fn new(limit: Option<u32>, ignore_source: bool, ignore_target: bool) -> Self {
        Self {
            limit,
            ignore_source,
            ignore_target,
            added: HashMap::new(),
        }
    }

    /// Edges added to `v` so far.
    #[must_use]
    pub fn added(&self, v: VertexId) -> u32 {
        self.added.get(&v).copied().unwrap_or(0)
    }

    /// Whether an edge `source -- target` still fits.
    #[must_use]
    pub fn admits(&self, source: VertexId, target: VertexId) -> bool {
        let Some(limit) = self.limit else {
            return true;
        };
        (self.ignore_source || self.added(source) < limit)
            && (self.ignore_target || self.added(target) < limit)
    }

    /// Count a committed edge against both endpoints.
    pub fn record(&mut self, source: VertexId, target: VertexId) {
        for v in [source, target] {
            *self.added.entry(v).or_insert(0) += 1;
        }
    }
}

/// Stable sort into commit order; equal scores keep discovery order.
pub fn sort_candidates(candidates: &mut [EdgeCandidate], order: ScoreOrder) {
    match order {
        ScoreOrder::HighestFirst => candidates.sort_by(|a, b| b.score.total_cmp(&a.score)),
        ScoreOrder::LowestFirst => candidates.sort_by(|a, b| a.score.total_cmp(&b.score)),
    }
}

/// What the commit pass did with each candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    /// Edges added to the graph.
    pub created: usize,
    /// Skipped because an endpoint's budget was exhausted.
    pub skipped_budget: usize,
    /// Skipped because the pair was already connected by an edge.
    pub skipped_duplicate: usize,
    /// Skipped because an earlier commit connected the endpoints.
    pub skipped_connected: usize,
    /// The pass stopped early on cancellation.
    pub cancelled: bool,
}

/// Sequential commit pass.
#[derive(Debug, Clone)]
pub struct GreedyMatcher {
    order: ScoreOrder,
    budget: DegreeBudget,
    template: FilamentEdge,
    recheck_path: bool,
}

impl GreedyMatcher {
    /// Commit in `order`, spending `budget`, stamping every new edge with
    /// a copy of `template`.
    #[must_use]
    pub const fn new(order: ScoreOrder, budget: DegreeBudget, template: FilamentEdge) -> Self {
        Self {
            order,
            budget,
            template,
            recheck_path: false,
        }
    }

    /// Skip candidates whose endpoints were connected by an edge committed
    /// earlier in the same pass.
    #[must_use]
    pub const fn with_path_recheck(mut self, recheck_path: bool) -> Self {
        self.recheck_path = recheck_path;
        self
    }

    /// Sort `candidates` and commit them into `graph`.
    ///
    /// An existing edge between the endpoints skips the candidate without
    /// consuming budget, so symmetric proposals never produce parallel
    /// edges.
    pub fn commit(
        mut self,
        graph: &mut FilamentGraph,
        mut candidates: Vec<EdgeCandidate>,
        cancel: &CancellationToken,
    ) -> CommitOutcome {
        sort_candidates(&mut candidates, self.order);

        let mut components = self.recheck_path.then(|| {
            let mut uf = UnionFind::<usize>::new(graph.vertex_count());
            for (a, b, _) in graph.edges() {
                uf.union(a.index(), b.index());
            }
            uf
        });

        let mut outcome = CommitOutcome::default();
        for c in candidates {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            if graph.contains_edge(c.source, c.target) {
                outcome.skipped_duplicate += 1;
                continue;
            }
            if let Some(uf) = &components
                && uf.equiv(c.source.index(), c.target.index())
            {
                outcome.skipped_connected += 1;
                continue;
            }
            if !self.budget.admits(c.source, c.target) {
                outcome.skipped_budget += 1;
                continue;
            }
            match graph.add_edge(c.source, c.target, self.template.clone()) {
                Ok(_) => {
                    self.budget.record(c.source, c.target);
                    if let Some(uf) = &mut components {
                        uf.union(c.source.index(), c.target.index());
                    }
                    outcome.created += 1;
                }
                Err(e) => {
                    tracing::debug!("skipping candidate: {e}");
                    outcome.skipped_duplicate += 1;
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Color, Point3, SpatialVertex};

    fn graph(n: usize) -> (FilamentGraph, Vec<VertexId>) {
        let mut g = FilamentGraph::new();
        #[allow(clippy::cast_precision_loss)]
        let ids = (0..n)
            .map(|i| g.add_vertex(SpatialVertex::new(Point3::new(i as f64, 0.0, 0.0))))
            .collect();
        (g, ids)
    }

    fn cand(source: VertexId, target: VertexId, score: f64) -> EdgeCandidate {
        EdgeCandidate {
            source,
            target,
            score,
            length: 0.0,
        }
    }

    #[test]
    fn sort_is_stable_in_both_orders() {
        let (_, v) = graph(4);
        let mut cs = vec![cand(v[0], v[1], 1.0), cand(v[1], v[2], 2.0), cand(v[2], v[3], 1.0)];
        sort_candidates(&mut cs, ScoreOrder::LowestFirst);
        assert_eq!(cs[0].source, v[0]);
        assert_eq!(cs[1].source, v[2]);
        sort_candidates(&mut cs, ScoreOrder::HighestFirst);
        assert_eq!(cs[0].source, v[1]);
        assert_eq!(cs[1].source, v[0]);
    }

    #[test]
    fn budget_limits_each_vertex() {
        let (mut g, v) = graph(3);
        let matcher = GreedyMatcher::new(
            ScoreOrder::LowestFirst,
            DegreeBudget::new(Some(1), false, false),
            FilamentEdge::default(),
        );
        let out = matcher.commit(
            &mut g,
            vec![cand(v[0], v[1], 1.0), cand(v[1], v[2], 2.0), cand(v[0], v[2], 3.0)],
            &CancellationToken::new(),
        );
        assert_eq!(out.created, 1);
        assert_eq!(out.skipped_budget, 2);
        assert!(g.contains_edge(v[0], v[1]));
    }

    #[test]
    fn ignored_side_bypasses_check_but_counts() {
        let mut budget = DegreeBudget::new(Some(1), true, false);
        let (_, v) = graph(3);
        budget.record(v[0], v[1]);
        assert!(budget.admits(v[0], v[2]));
        assert!(!budget.admits(v[2], v[1]));
        assert_eq!(budget.added(v[0]), 1);
    }

    #[test]
    fn symmetric_duplicate_is_skipped_without_spending_budget() {
        let (mut g, v) = graph(3);
        let matcher = GreedyMatcher::new(
            ScoreOrder::HighestFirst,
            DegreeBudget::new(Some(2), false, false),
            FilamentEdge::default(),
        );
        let out = matcher.commit(
            &mut g,
            vec![
                cand(v[0], v[1], 5.0),
                cand(v[1], v[0], 4.0),
                cand(v[1], v[2], 3.0),
            ],
            &CancellationToken::new(),
        );
        assert_eq!(out.created, 2);
        assert_eq!(out.skipped_duplicate, 1);
        assert_eq!(g.degree_of(v[1]), 2);
    }

    #[test]
    fn new_edges_carry_template() {
        let (mut g, v) = graph(2);
        let mut template = FilamentEdge {
            color: Some(Color::GREEN),
            ..FilamentEdge::default()
        };
        template
            .metadata
            .insert("origin".to_string(), "reconnect".to_string());
        let matcher = GreedyMatcher::new(ScoreOrder::LowestFirst, DegreeBudget::new(None, false, false), template.clone());
        matcher.commit(&mut g, vec![cand(v[0], v[1], 0.0)], &CancellationToken::new());
        assert_eq!(g.edge_between(v[0], v[1]), Some(&template));
    }

    #[test]
    fn path_recheck_prevents_triangles() {
        let (mut g, v) = graph(3);
        let matcher = GreedyMatcher::new(
            ScoreOrder::LowestFirst,
            DegreeBudget::new(None, false, false),
            FilamentEdge::default(),
        )
        .with_path_recheck(true);
        let out = matcher.commit(
            &mut g,
            vec![cand(v[0], v[1], 1.0), cand(v[1], v[2], 1.0), cand(v[0], v[2], 2.0)],
            &CancellationToken::new(),
        );
        assert_eq!(out.created, 2);
        assert_eq!(out.skipped_connected, 1);
        assert!(!g.contains_edge(v[0], v[2]));
    }

    #[test]
    fn cancellation_stops_commit() {
        let (mut g, v) = graph(2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = GreedyMatcher::new(
            ScoreOrder::LowestFirst,
            DegreeBudget::new(None, false, false),
            FilamentEdge::default(),
        )
        .commit(&mut g, vec![cand(v[0], v[1], 0.0)], &cancel);
        assert!(out.cancelled);
        assert_eq!(g.edge_count(), 0);
    }
}
