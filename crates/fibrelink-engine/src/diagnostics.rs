//! Run diagnostics: timing, counts, and rejection statistics per phase.
//!
//! These diagnostics are permanent instrumentation intended for parameter
//! tuning. [`Reconnector::run_with_diagnostics`](crate::Reconnector::run_with_diagnostics)
//! collects them alongside the run result.
//!
//! Timestamps come from a caller-supplied [`Clock`], so the engine itself
//! never reads the system time.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::candidate::RejectionCounts;

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// Current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Clock that always reports zero elapsed time.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClock;

impl Clock for NullClock {
    type Instant = ();

    fn now(&self) -> Self::Instant {}

    fn elapsed(&self, _since: &Self::Instant) -> Duration {
        Duration::ZERO
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single reconnection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectDiagnostics {
    /// Engine variant (`thorough` or `fast`).
    pub variant: String,
    /// Phase 1: vertex snapshot and source/target selection.
    pub selection: StageDiagnostics,
    /// Phase 2: pair enumeration, filtering and scoring.
    pub generation: StageDiagnostics,
    /// Phase 3: greedy commit. `None` when generation was cancelled.
    pub commit: Option<StageDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all phases.
    pub summary: ConnectSummary,
}

/// Diagnostics for a single phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this phase (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Phase-specific metrics.
    pub metrics: StageMetrics,
}

/// Phase-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Selection metrics.
    Selection {
        /// Vertices in the graph.
        vertex_count: usize,
        /// Vertices eligible as sources.
        source_count: usize,
        /// Vertices eligible as targets.
        target_count: usize,
        /// Degree-1 vertices (those with a direction).
        endpoint_count: usize,
        /// Vertex filter evaluations that failed.
        filter_errors: usize,
    },
    /// Generation metrics.
    Generation {
        /// Ordered pairs that reached the filters.
        pairs_evaluated: usize,
        /// Candidates emitted.
        candidate_count: usize,
        /// Symmetric duplicates removed (fast variant).
        duplicates_removed: usize,
        /// Rejections per filter.
        rejections: RejectionCounts,
    },
    /// Commit metrics.
    Commit {
        /// Candidates handed to the matcher.
        candidate_count: usize,
        /// Edges added.
        created: usize,
        /// Skipped on an exhausted budget.
        skipped_budget: usize,
        /// Skipped because the edge already existed.
        skipped_duplicate: usize,
        /// Skipped because the endpoints became connected this run.
        skipped_connected: usize,
    },
}

/// High-level summary for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectSummary {
    /// Vertices in the graph.
    pub vertex_count: usize,
    /// Edges before the run.
    pub edges_before: usize,
    /// Edges after the run.
    pub edges_after: usize,
    /// Edges created by this run.
    pub created: usize,
    /// The run was cancelled before finishing.
    pub cancelled: bool,
}

impl ConnectDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Reconnect Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Variant: {}  |  Graph: {} vertices, {} -> {} edges",
            self.variant,
            self.summary.vertex_count,
            self.summary.edges_before,
            self.summary.edges_after,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        let mut stages: Vec<(&str, &StageDiagnostics)> = vec![
            ("Selection", &self.selection),
            ("Generation", &self.generation),
        ];
        if let Some(ref commit) = self.commit {
            stages.push(("Commit", commit));
        }

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        if let StageMetrics::Generation { rejections, .. } = &self.generation.metrics {
            lines.push(String::new());
            lines.push(format!("Rejections: {}", format_rejections(rejections)));
        }

        lines.push(String::new());
        lines.push(format!(
            "Created edges: {}{}",
            self.summary.created,
            if self.summary.cancelled {
                "  (cancelled)"
            } else {
                ""
            },
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Selection {
            vertex_count,
            source_count,
            target_count,
            endpoint_count,
            filter_errors,
        } => format!(
            "{vertex_count} vertices ({endpoint_count} endpoints) -> {source_count} sources, {target_count} targets, {filter_errors} filter errors",
        ),
        StageMetrics::Generation {
            pairs_evaluated,
            candidate_count,
            duplicates_removed,
            rejections,
        } => format!(
            "{pairs_evaluated} pairs, {} rejected, {duplicates_removed} duplicates -> {candidate_count} candidates",
            rejections.total(),
        ),
        StageMetrics::Commit {
            candidate_count,
            created,
            skipped_budget,
            skipped_duplicate,
            skipped_connected,
        } => format!(
            "{candidate_count} candidates -> {created} edges (budget={skipped_budget} dup={skipped_duplicate} connected={skipped_connected})",
        ),
    }
}

/// Non-zero rejection counters, or `none`.
fn format_rejections(r: &RejectionCounts) -> String {
    let parts: Vec<String> = [
        ("axis", r.axis),
        ("plane", r.plane),
        ("edge", r.existing_edge),
        ("range", r.range),
        ("mask", r.mask),
        ("path", r.path),
        ("predicate", r.predicate),
        ("length", r.length),
        ("score", r.score),
        ("errors", r.errors),
    ]
    .into_iter()
    .filter(|&(_, n)| n > 0)
    .map(|(name, n)| format!("{name}={n}"))
    .collect();
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join(" ")
    }
}
