//! fibrelink-engine: reconnect broken filament skeleton graphs (sans-IO).
//!
//! Given a graph of traced 3D filament points whose connectivity has gaps,
//! the engine proposes candidate edges between vertices, filters and scores
//! them under geometric, topological and image-mask constraints, and
//! commits a subset under a per-vertex budget of new edges:
//!
//! select -> generate (parallel) -> commit (sequential)
//!
//! Two variants share that skeleton, chosen by [`ConstraintPolicy`]:
//! a thorough one driven by a caller-supplied [`Predicate`] and [`Scorer`]
//! over a rich variable context, and a fast one using numeric range
//! filters only.
//!
//! This crate has **no I/O dependencies**. Mask slices arrive as in-memory
//! images, and timing goes through a caller-supplied
//! [`Clock`](diagnostics::Clock).

pub mod cancel;
pub mod candidate;
pub mod constraint;
pub mod diagnostics;
pub mod engine;
pub mod graph;
pub mod mask;
pub mod matching;
pub mod policy;
pub mod synthetic;
pub mod types;

pub use cancel::CancellationToken;
pub use candidate::{EdgeCandidate, RejectionCounts};
pub use constraint::{ConstraintError, Predicate, Scorer, Variables};
pub use engine::{ConnectOutcome, Reconnector};
pub use graph::{FilamentGraph, GraphError, PathInfo, VertexId};
pub use mask::{MaskSampling, MaskVolume};
pub use policy::{
    ConnectConfig, ConstraintPolicy, FastConstraints, LengthSortOrder, ScoreOrder,
    ThoroughConstraints,
};
pub use types::{
    AxisLocation, Color, ConnectError, FilamentEdge, Point3, SpatialVertex, Value, ValueRange,
};
