//! The reconnection entry point: select, generate, commit.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::candidate::{self, Generator, RejectionCounts};
use crate::constraint::Predicate;
use crate::diagnostics::{
    Clock, ConnectDiagnostics, ConnectSummary, NullClock, StageDiagnostics, StageMetrics,
};
use crate::graph::FilamentGraph;
use crate::mask::MaskVolume;
use crate::matching::{CommitOutcome, DegreeBudget, GreedyMatcher};
use crate::policy::{ConnectConfig, ConstraintPolicy};
use crate::types::{ConnectError, FilamentEdge};

/// Result of one reconnection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOutcome {
    /// Edges added to the graph.
    pub created: usize,
    /// Candidates that survived every filter.
    pub candidate_count: usize,
    /// Rejections per filter during generation.
    pub rejections: RejectionCounts,
    /// What the commit pass did.
    pub commit: CommitOutcome,
    /// Predicate, scorer and vertex filter evaluations that failed.
    pub evaluation_errors: usize,
    /// The run stopped early on cancellation.
    pub cancelled: bool,
}

impl ConnectOutcome {
    /// One-line summary for the host's log.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("Successfully created {} edges", self.created)
    }
}

/// Configured reconnection engine.
///
/// Construction validates all parameters; a constructed engine can be run
/// any number of times on different graphs.
///
/// ```rust
/// use fibrelink_engine::{
///     CancellationToken, ConnectConfig, ConstraintPolicy, FastConstraints, FilamentGraph,
///     Point3, Reconnector, SpatialVertex,
/// };
///
/// let mut graph = FilamentGraph::new();
/// graph.add_vertex(SpatialVertex::new(Point3::new(0.0, 0.0, 0.0)));
/// graph.add_vertex(SpatialVertex::new(Point3::new(4.0, 0.0, 0.0)));
///
/// let engine = Reconnector::new(
///     ConnectConfig::default(),
///     ConstraintPolicy::Fast(FastConstraints::default()),
/// )?;
/// let outcome = engine.run(&mut graph, None, &CancellationToken::new());
/// assert_eq!(outcome.summary(), "Successfully created 1 edges");
/// # Ok::<(), fibrelink_engine::ConnectError>(())
/// ```
pub struct Reconnector {
    config: ConnectConfig,
    policy: ConstraintPolicy,
    source_filter: Option<Box<dyn Predicate>>,
    target_filter: Option<Box<dyn Predicate>>,
}

impl Reconnector {
    /// Validate the parameters and build the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::InvalidConfig`] if the connection limit is
    /// zero or a fast-variant range is inverted or NaN.
    pub fn new(config: ConnectConfig, policy: ConstraintPolicy) -> Result<Self, ConnectError> {
        config.validate()?;
        policy.validate()?;
        Ok(Self {
            config,
            policy,
            source_filter: None,
            target_filter: None,
        })
    }

    /// Only vertices passing `filter` may act as candidate sources.
    #[must_use]
    pub fn with_source_filter(mut self, filter: impl Predicate + 'static) -> Self {
        self.source_filter = Some(Box::new(filter));
        self
    }

    /// Only vertices passing `filter` may act as candidate targets.
    #[must_use]
    pub fn with_target_filter(mut self, filter: impl Predicate + 'static) -> Self {
        self.target_filter = Some(Box::new(filter));
        self
    }

    /// The shared parameters.
    #[must_use]
    pub const fn config(&self) -> &ConnectConfig {
        &self.config
    }

    /// The variant parameters.
    #[must_use]
    pub const fn policy(&self) -> &ConstraintPolicy {
        &self.policy
    }

    /// Add reconnecting edges to `graph` in place.
    ///
    /// Existing vertices and edges are never touched. A cancelled run
    /// leaves the edges committed so far.
    pub fn run(
        &self,
        graph: &mut FilamentGraph,
        mask: Option<&MaskVolume>,
        cancel: &CancellationToken,
    ) -> ConnectOutcome {
        self.run_with_diagnostics(graph, mask, cancel, &NullClock).0
    }

    /// Run on a deep copy of `graph` and return the copy; `graph` itself
    /// is left untouched.
    #[must_use]
    pub fn run_on_copy(
        &self,
        graph: &FilamentGraph,
        mask: Option<&MaskVolume>,
        cancel: &CancellationToken,
    ) -> (FilamentGraph, ConnectOutcome) {
        let mut copy = graph.clone();
        let outcome = self.run(&mut copy, mask, cancel);
        (copy, outcome)
    }

    /// [`run`](Self::run), collecting per-phase timing and counts.
    pub fn run_with_diagnostics<C: Clock>(
        &self,
        graph: &mut FilamentGraph,
        mask: Option<&MaskVolume>,
        cancel: &CancellationToken,
        clock: &C,
    ) -> (ConnectOutcome, ConnectDiagnostics) {
        let total_start = clock.now();
        let edges_before = graph.edge_count();

        // --- Selection ---
        let start = clock.now();
        let table = candidate::vertex_table(graph, !self.config.enable_3d);
        let require_direction = match &self.policy {
            ConstraintPolicy::Thorough(c) => c.require_direction,
            ConstraintPolicy::Fast(_) => false,
        };
        let selection = candidate::select(
            &table,
            &self.config,
            self.source_filter.as_deref(),
            self.target_filter.as_deref(),
            require_direction,
        );
        debug!(
            "{} variant: {} sources, {} targets of {} vertices",
            self.policy.name(),
            selection.sources.len(),
            selection.targets.len(),
            table.len(),
        );
        let selection_diag = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Selection {
                vertex_count: table.len(),
                source_count: selection.sources.len(),
                target_count: selection.targets.len(),
                endpoint_count: table.iter().filter(|v| v.degree == 1).count(),
                filter_errors: selection.filter_errors,
            },
        };

        // --- Generation ---
        let start = clock.now();
        let generated =
            Generator::new(graph, &table, &self.config, &self.policy, mask, cancel)
                .generate(&selection);
        debug!(
            "{} pairs evaluated, {} rejected, {} candidates",
            generated.pairs_evaluated,
            generated.rejections.total(),
            generated.candidates.len(),
        );
        let generation_diag = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Generation {
                pairs_evaluated: generated.pairs_evaluated,
                candidate_count: generated.candidates.len(),
                duplicates_removed: generated.duplicates_removed,
                rejections: generated.rejections,
            },
        };

        let evaluation_errors = generated.rejections.errors + selection.filter_errors;
        if evaluation_errors > 0 {
            warn!("{evaluation_errors} constraint evaluations failed; affected candidates were rejected");
        }

        let mut outcome = ConnectOutcome {
            candidate_count: generated.candidates.len(),
            rejections: generated.rejections,
            evaluation_errors,
            ..ConnectOutcome::default()
        };

        // --- Commit ---
        let commit_diag = if generated.cancelled {
            warn!("reconnection cancelled during candidate generation");
            outcome.cancelled = true;
            None
        } else {
            let start = clock.now();
            let candidate_count = generated.candidates.len();
            let commit = self
                .matcher()
                .commit(graph, generated.candidates, cancel);
            if commit.cancelled {
                warn!("reconnection cancelled after {} edges", commit.created);
            }
            outcome.created = commit.created;
            outcome.commit = commit;
            outcome.cancelled = commit.cancelled;
            Some(StageDiagnostics {
                duration: clock.elapsed(&start),
                metrics: StageMetrics::Commit {
                    candidate_count,
                    created: commit.created,
                    skipped_budget: commit.skipped_budget,
                    skipped_duplicate: commit.skipped_duplicate,
                    skipped_connected: commit.skipped_connected,
                },
            })
        };

        info!("{}", outcome.summary());

        let diagnostics = ConnectDiagnostics {
            variant: self.policy.name().to_string(),
            selection: selection_diag,
            generation: generation_diag,
            commit: commit_diag,
            total_duration: clock.elapsed(&total_start),
            summary: ConnectSummary {
                vertex_count: graph.vertex_count(),
                edges_before,
                edges_after: graph.edge_count(),
                created: outcome.created,
                cancelled: outcome.cancelled,
            },
        };
        (outcome, diagnostics)
    }

    fn matcher(&self) -> GreedyMatcher {
        let template = FilamentEdge {
            color: self.config.new_edge_color,
            metadata: self.config.new_edge_metadata.clone(),
        };
        let budget = DegreeBudget::new(
            self.config.limit_connections,
            self.config.ignore_limit_for_source,
            self.config.ignore_limit_for_target,
        );
        let recheck = matches!(&self.policy, ConstraintPolicy::Fast(f) if f.recheck_path_on_commit);
        GreedyMatcher::new(self.policy.score_order(), budget, template).with_path_recheck(recheck)
    }
}

impl fmt::Debug for Reconnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconnector")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("source_filter", &self.source_filter.is_some())
            .field("target_filter", &self.target_filter.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::constraint::{ConstraintError, Variables};
    use crate::policy::FastConstraints;
    use crate::types::{Color, Point3, SpatialVertex, ValueRange};

    fn two_points(gap: f64) -> FilamentGraph {
        let mut g = FilamentGraph::new();
        g.add_vertex(SpatialVertex::new(Point3::new(0.0, 0.0, 0.0)));
        g.add_vertex(SpatialVertex::new(Point3::new(gap, 0.0, 0.0)));
        g
    }

    #[test]
    fn new_rejects_invalid_parameters() {
        let zero_limit = ConnectConfig {
            limit_connections: Some(0),
            ..ConnectConfig::default()
        };
        assert!(matches!(
            Reconnector::new(zero_limit, ConstraintPolicy::default()),
            Err(ConnectError::InvalidConfig(_))
        ));
        let bad_range = ConstraintPolicy::Fast(FastConstraints {
            value_range: ValueRange::new(2.0, 1.0),
            ..FastConstraints::default()
        });
        assert!(Reconnector::new(ConnectConfig::default(), bad_range).is_err());
    }

    #[test]
    fn run_colors_new_edges() {
        let mut g = two_points(3.0);
        let engine = Reconnector::new(ConnectConfig::default(), ConstraintPolicy::default()).unwrap();
        let outcome = engine.run(&mut g, None, &CancellationToken::new());
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.summary(), "Successfully created 1 edges");
        let ids: Vec<_> = g.vertex_ids().collect();
        assert_eq!(
            g.edge_between(ids[0], ids[1]).unwrap().color,
            Some(Color::GREEN)
        );
    }

    #[test]
    fn run_on_copy_leaves_input_untouched() {
        let g = two_points(3.0);
        let engine = Reconnector::new(ConnectConfig::default(), ConstraintPolicy::default()).unwrap();
        let (copy, outcome) = engine.run_on_copy(&g, None, &CancellationToken::new());
        assert_eq!(outcome.created, 1);
        assert_eq!(g.edge_count(), 0);
        assert_eq!(copy.edge_count(), 1);
    }

    #[test]
    fn cancelled_run_commits_nothing() {
        let mut g = two_points(3.0);
        let engine = Reconnector::new(ConnectConfig::default(), ConstraintPolicy::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (outcome, diag) = engine.run_with_diagnostics(&mut g, None, &cancel, &NullClock);
        assert!(outcome.cancelled);
        assert_eq!(outcome.created, 0);
        assert!(diag.commit.is_none());
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn failing_target_filter_counts_errors() {
        let mut g = two_points(3.0);
        let failing = |_: &Variables| -> Result<bool, ConstraintError> {
            Err(ConstraintError::Evaluation("no".to_string()))
        };
        let engine = Reconnector::new(ConnectConfig::default(), ConstraintPolicy::default())
            .unwrap()
            .with_target_filter(failing);
        let outcome = engine.run(&mut g, None, &CancellationToken::new());
        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.evaluation_errors, 2);
    }

    #[test]
    fn diagnostics_summarise_the_run() {
        let mut g = two_points(3.0);
        let engine = Reconnector::new(ConnectConfig::default(), ConstraintPolicy::default()).unwrap();
        let (_, diag) = engine.run_with_diagnostics(&mut g, None, &CancellationToken::new(), &NullClock);
        assert_eq!(diag.variant, "fast");
        assert_eq!(diag.summary.edges_before, 0);
        assert_eq!(diag.summary.edges_after, 1);
        assert!(diag.report().contains("Created edges: 1"));
    }
}
