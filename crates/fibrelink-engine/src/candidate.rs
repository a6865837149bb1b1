//! Candidate generation: enumerate ordered vertex pairs, run the rejection
//! filters, and emit scored [`EdgeCandidate`]s.
//!
//! Filters run cheapest first, and each rejected pair is counted under the
//! first filter that rejected it:
//!
//! 1. channel / frame mismatch (unless crossing is allowed)
//! 2. unequal `z` when 3D is disabled
//! 3. fast only: existing edge, degree window, value window
//! 4. mask feasibility
//! 5. thorough only: endpoint directions, angle and dot product
//! 6. path existence
//! 7. thorough: user predicate; fast: length window and path exclusion
//! 8. score (NaN rejects)
//!
//! The outer (source) loop is sharded across rayon worker threads. Each
//! shard only reads the graph; shards are merged in source order, so the
//! candidate list is identical from run to run.

use std::collections::HashSet;

use rayon::prelude::*;
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::constraint::{
    PairMeasures, Predicate, Variables, pair_variables, vertex_filter_variables,
};
use crate::graph::{ComponentLabels, FilamentGraph, VertexId};
use crate::mask::{self, MaskVolume};
use crate::policy::{ConnectConfig, ConstraintPolicy, FastConstraints, ThoroughConstraints};
use crate::types::{AxisLocation, Point3};

/// A provisional, scored proposal to connect `source` and `target`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeCandidate {
    /// Vertex the proposal was enumerated from.
    pub source: VertexId,
    /// Vertex the proposal points at.
    pub target: VertexId,
    /// Ranking score; see [`ScoreOrder`](crate::policy::ScoreOrder).
    pub score: f64,
    /// Euclidean distance between the endpoints.
    pub length: f64,
}

impl EdgeCandidate {
    /// The endpoints as an unordered key, lower index first.
    #[must_use]
    pub fn canonical_pair(&self) -> (VertexId, VertexId) {
        if self.source <= self.target {
            (self.source, self.target)
        } else {
            (self.target, self.source)
        }
    }
}

/// How many pairs each filter rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounts {
    /// Channel or frame mismatch.
    pub axis: usize,
    /// Different `z` with 3D disabled.
    pub plane: usize,
    /// Already connected by an edge (fast).
    pub existing_edge: usize,
    /// Degree or value outside its window (fast).
    pub range: usize,
    /// Failed the mask test.
    pub mask: usize,
    /// Already connected by a path.
    pub path: usize,
    /// Predicate returned `false` (thorough).
    pub predicate: usize,
    /// Length outside its window (fast).
    pub length: usize,
    /// Score was NaN.
    pub score: usize,
    /// Predicate or scorer returned an error (thorough).
    pub errors: usize,
}

impl RejectionCounts {
    /// Total number of rejected pairs.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.axis
            + self.plane
            + self.existing_edge
            + self.range
            + self.mask
            + self.path
            + self.predicate
            + self.length
            + self.score
            + self.errors
    }

    fn merge(&mut self, other: &Self) {
        self.axis += other.axis;
        self.plane += other.plane;
        self.existing_edge += other.existing_edge;
        self.range += other.range;
        self.mask += other.mask;
        self.path += other.path;
        self.predicate += other.predicate;
        self.length += other.length;
        self.score += other.score;
        self.errors += other.errors;
    }
}

// ---------------------------------------------------------------------------
// Per-vertex precomputation
// ---------------------------------------------------------------------------

/// Everything the pair loop needs about one vertex, read once from the graph.
#[derive(Debug, Clone)]
pub(crate) struct VertexInfo {
    pub id: VertexId,
    pub position: Point3,
    pub axis: AxisLocation,
    pub degree: usize,
    pub value: f64,
    pub direction: Option<Point3>,
    pub variables: Variables,
}

/// Snapshot every vertex in insertion order.
///
/// With `project_z`, directions are computed in the `z = 0` plane.
pub(crate) fn vertex_table(graph: &FilamentGraph, project_z: bool) -> Vec<VertexInfo> {
    graph
        .vertex_ids()
        .filter_map(|id| {
            let vertex = graph.vertex(id)?;
            let degree = graph.degree_of(id);
            let direction = graph.direction_of(id, project_z);
            Some(VertexInfo {
                id,
                position: vertex.position,
                axis: vertex.axis,
                degree,
                value: vertex.value,
                direction,
                variables: Variables::for_vertex(vertex, degree, direction),
            })
        })
        .collect()
}

/// Vertices allowed to act as sources and as targets, as indices into the
/// vertex table.
#[derive(Debug, Clone, Default)]
pub(crate) struct Selection {
    pub sources: Vec<usize>,
    pub targets: Vec<usize>,
    /// Vertex filter evaluations that returned an error.
    pub filter_errors: usize,
    /// Sources dropped because they have no direction.
    pub undirected_sources: usize,
}

/// Apply the optional vertex filters.
///
/// A filter error excludes only that vertex.
pub(crate) fn select(
    table: &[VertexInfo],
    config: &ConnectConfig,
    source_filter: Option<&dyn Predicate>,
    target_filter: Option<&dyn Predicate>,
    require_direction: bool,
) -> Selection {
    let mut selection = Selection::default();
    for (i, info) in table.iter().enumerate() {
        let vars = if source_filter.is_some() || target_filter.is_some() {
            vertex_filter_variables(&config.variables, &info.variables)
        } else {
            Variables::new()
        };
        let mut passes = |filter: Option<&dyn Predicate>| match filter {
            None => true,
            Some(p) => p.test(&vars).unwrap_or_else(|e| {
                tracing::debug!("vertex filter failed on {:?}: {e}", info.id);
                selection.filter_errors += 1;
                false
            }),
        };
        let is_source = passes(source_filter);
        let is_target = passes(target_filter);
        if is_source {
            if require_direction && info.direction.is_none() {
                selection.undirected_sources += 1;
            } else {
                selection.sources.push(i);
            }
        }
        if is_target {
            selection.targets.push(i);
        }
    }
    selection
}

// ---------------------------------------------------------------------------
// Pair enumeration
// ---------------------------------------------------------------------------

/// Output of one generation pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct Generated {
    pub candidates: Vec<EdgeCandidate>,
    pub rejections: RejectionCounts,
    /// Ordered pairs that reached the filters.
    pub pairs_evaluated: usize,
    /// Symmetric fast-mode duplicates dropped after the merge. Zero when a
    /// per-side limit bypass is enabled.
    pub duplicates_removed: usize,
    pub cancelled: bool,
}

#[derive(Default)]
struct Shard {
    candidates: Vec<EdgeCandidate>,
    rejections: RejectionCounts,
    pairs_evaluated: usize,
    cancelled: bool,
}

/// Read-only state shared by every shard of one run.
pub(crate) struct Generator<'a> {
    graph: &'a FilamentGraph,
    table: &'a [VertexInfo],
    config: &'a ConnectConfig,
    policy: &'a ConstraintPolicy,
    mask: Option<&'a MaskVolume>,
    labels: ComponentLabels,
    cancel: &'a CancellationToken,
}

impl<'a> Generator<'a> {
    /// `mask` is ignored when mask enforcement is disabled.
    pub(crate) fn new(
        graph: &'a FilamentGraph,
        table: &'a [VertexInfo],
        config: &'a ConnectConfig,
        policy: &'a ConstraintPolicy,
        mask: Option<&'a MaskVolume>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            graph,
            table,
            config,
            policy,
            mask: mask.filter(|_| config.enforce_edges_within_mask),
            labels: graph.component_labels(),
            cancel,
        }
    }

    /// Enumerate and filter all `(source, target)` pairs of `selection`.
    pub(crate) fn generate(&self, selection: &Selection) -> Generated {
        let lookup = match self.policy {
            ConstraintPolicy::Fast(fast) => TargetLookup::build(self.table, selection, fast),
            ConstraintPolicy::Thorough(_) => TargetLookup::Exhaustive,
        };

        let shards: Vec<Shard> = selection
            .sources
            .par_iter()
            .map(|&s| self.candidates_from(s, selection, &lookup))
            .collect();

        let mut out = Generated::default();
        for shard in shards {
            out.candidates.extend(shard.candidates);
            out.rejections.merge(&shard.rejections);
            out.pairs_evaluated += shard.pairs_evaluated;
            out.cancelled |= shard.cancelled;
        }

        // The per-side limit bypass depends on which endpoint is the
        // source, so both orientations are kept when it is enabled.
        let side_sensitive =
            self.config.ignore_limit_for_source || self.config.ignore_limit_for_target;
        if matches!(self.policy, ConstraintPolicy::Fast(_)) && !side_sensitive {
            let before = out.candidates.len();
            let mut seen = HashSet::with_capacity(before);
            out.candidates.retain(|c| seen.insert(c.canonical_pair()));
            out.duplicates_removed = before - out.candidates.len();
        }
        out
    }

    fn candidates_from(&self, s: usize, selection: &Selection, lookup: &TargetLookup) -> Shard {
        let mut shard = Shard::default();
        if self.cancel.is_cancelled() {
            shard.cancelled = true;
            return shard;
        }
        let source = &self.table[s];
        for t in lookup.targets_near(source, selection) {
            if self.cancel.is_cancelled() {
                shard.cancelled = true;
                break;
            }
            if t == s {
                continue;
            }
            let target = &self.table[t];
            shard.pairs_evaluated += 1;
            let candidate = match self.policy {
                ConstraintPolicy::Thorough(c) => {
                    self.evaluate_thorough(source, target, c, &mut shard.rejections)
                }
                ConstraintPolicy::Fast(c) => {
                    self.evaluate_fast(source, target, c, &mut shard.rejections)
                }
            };
            shard.candidates.extend(candidate);
        }
        shard
    }

    /// Filters 1 and 2, shared by both variants.
    fn structurally_compatible(
        &self,
        s: &VertexInfo,
        t: &VertexInfo,
        counts: &mut RejectionCounts,
    ) -> bool {
        if (!self.config.connect_across_channels && s.axis.channel != t.axis.channel)
            || (!self.config.connect_across_frames && s.axis.frame != t.axis.frame)
        {
            counts.axis += 1;
            return false;
        }
        #[allow(clippy::float_cmp)]
        let same_plane = s.position.z == t.position.z;
        if !self.config.enable_3d && !same_plane {
            counts.plane += 1;
            return false;
        }
        true
    }

    fn mask_allows(&self, s: &VertexInfo, t: &VertexInfo) -> bool {
        self.mask.is_none_or(|m| {
            mask::is_feasible(
                m,
                s.position,
                t.position,
                self.policy.mask_sampling(),
                s.direction.is_some() && t.direction.is_some(),
            )
        })
    }

    fn evaluate_thorough(
        &self,
        s: &VertexInfo,
        t: &VertexInfo,
        c: &ThoroughConstraints,
        counts: &mut RejectionCounts,
    ) -> Option<EdgeCandidate> {
        if !self.structurally_compatible(s, t, counts) {
            return None;
        }
        if !self.mask_allows(s, t) {
            counts.mask += 1;
            return None;
        }

        let (angle, dot_product) = match (s.direction, t.direction) {
            (Some(d1), Some(d2)) => {
                let dot = d1.dot(d2);
                (dot.clamp(-1.0, 1.0).acos().to_degrees(), dot)
            }
            _ => (f64::NAN, f64::NAN),
        };

        let path = if c.find_path && self.labels.connected(s.id, t.id) {
            self.graph.shortest_path(s.id, t.id)
        } else {
            None
        };
        #[allow(clippy::cast_precision_loss)]
        let measures = PairMeasures {
            length: s.position.distance(t.position),
            angle,
            dot_product,
            path_exists: path.is_some(),
            path_length: path.map_or(f64::NAN, |p| p.edge_count as f64),
        };
        let vars = pair_variables(&self.config.variables, &s.variables, &t.variables, &measures);

        match c.predicate.test(&vars) {
            Ok(true) => {}
            Ok(false) => {
                counts.predicate += 1;
                return None;
            }
            Err(e) => {
                tracing::debug!("predicate failed on {:?} -> {:?}: {e}", s.id, t.id);
                counts.errors += 1;
                return None;
            }
        }

        let score = match (&c.scorer, self.config.limit_connections) {
            (Some(scorer), Some(_)) => match scorer.score(&vars) {
                Ok(score) => score,
                Err(e) => {
                    tracing::debug!("scorer failed on {:?} -> {:?}: {e}", s.id, t.id);
                    counts.errors += 1;
                    return None;
                }
            },
            _ => 0.0,
        };
        if score.is_nan() {
            counts.score += 1;
            return None;
        }

        Some(EdgeCandidate {
            source: s.id,
            target: t.id,
            score,
            length: measures.length,
        })
    }

    fn evaluate_fast(
        &self,
        s: &VertexInfo,
        t: &VertexInfo,
        c: &FastConstraints,
        counts: &mut RejectionCounts,
    ) -> Option<EdgeCandidate> {
        if !self.structurally_compatible(s, t, counts) {
            return None;
        }
        if self.graph.contains_edge(s.id, t.id) {
            counts.existing_edge += 1;
            return None;
        }
        if !c.degree_range.contains(s.degree)
            || !c.degree_range.contains(t.degree)
            || !c.value_range.contains(s.value)
            || !c.value_range.contains(t.value)
        {
            counts.range += 1;
            return None;
        }
        if !self.mask_allows(s, t) {
            counts.mask += 1;
            return None;
        }

        let length = s.position.distance(t.position);
        if !c.length_range.contains(length) {
            counts.length += 1;
            return None;
        }
        if c.ignore_if_has_path && self.labels.connected(s.id, t.id) {
            counts.path += 1;
            return None;
        }

        let score = c.score_for(length);
        if score.is_nan() {
            counts.score += 1;
            return None;
        }
        Some(EdgeCandidate {
            source: s.id,
            target: t.id,
            score,
            length,
        })
    }
}

// ---------------------------------------------------------------------------
// Target lookup
// ---------------------------------------------------------------------------

type IndexedPoint = GeomWithData<[f64; 3], usize>;

/// Relative slack on the R-tree query radius; the exact length filter
/// runs on every returned target anyway.
const QUERY_SLACK: f64 = 1e-9;

/// Which targets the inner loop visits for a given source.
enum TargetLookup {
    /// Every selected target.
    Exhaustive,
    /// Only targets within `max_length`.
    Spatial { tree: RTree<IndexedPoint>, max_squared: f64 },
}

impl TargetLookup {
    fn build(table: &[VertexInfo], selection: &Selection, fast: &FastConstraints) -> Self {
        let max = fast.length_range.max;
        if !max.is_finite() || max < 0.0 {
            return Self::Exhaustive;
        }
        let points: Vec<IndexedPoint> = selection
            .targets
            .iter()
            .map(|&t| GeomWithData::new(table[t].position.to_array(), t))
            .collect();
        let radius = max.mul_add(QUERY_SLACK, max) + QUERY_SLACK;
        Self::Spatial {
            tree: RTree::bulk_load(points),
            max_squared: radius * radius,
        }
    }

    /// Target indices for `source`, in ascending table order.
    fn targets_near(&self, source: &VertexInfo, selection: &Selection) -> Vec<usize> {
        match self {
            Self::Exhaustive => selection.targets.clone(),
            Self::Spatial { tree, max_squared } => {
                let mut near: Vec<usize> = tree
                    .locate_within_distance(source.position.to_array(), *max_squared)
                    .map(|p| p.data)
                    .collect();
                near.sort_unstable();
                near
            }
        }
    }
}
