//! Engine parameters.
//!
//! [`ConnectConfig`] holds everything shared by both engine variants and
//! is plain serde data. The variant-specific half lives in
//! [`ConstraintPolicy`]: [`FastConstraints`] is serde data too, while
//! [`ThoroughConstraints`] carries caller-supplied predicate and scorer
//! objects.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constraint::{EndpointGap, Predicate, Scorer};
use crate::mask::MaskSampling;
use crate::types::{Color, ConnectError, ValueRange, Value};

/// Variant-independent reconnection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Allow edges between vertices on different channels.
    pub connect_across_channels: bool,
    /// Allow edges between vertices on different frames.
    pub connect_across_frames: bool,
    /// Compare full 3D positions. When disabled, only vertices with equal
    /// `z` may connect and directions are computed in the `z = 0` plane.
    pub enable_3d: bool,
    /// Maximum number of new edges per vertex in one run; `None` commits
    /// every accepted candidate.
    pub limit_connections: Option<u32>,
    /// Exempt the source endpoint from the limit check.
    pub ignore_limit_for_source: bool,
    /// Exempt the target endpoint from the limit check.
    pub ignore_limit_for_target: bool,
    /// Reject candidates that leave the mask (when a mask is supplied).
    pub enforce_edges_within_mask: bool,
    /// Color applied to every committed edge.
    pub new_edge_color: Option<Color>,
    /// Metadata copied onto every committed edge.
    pub new_edge_metadata: BTreeMap<String, String>,
    /// Custom variables visible to every predicate and scorer.
    pub variables: BTreeMap<String, Value>,
}

impl ConnectConfig {
    /// Default for [`connect_across_channels`](Self::connect_across_channels).
    pub const DEFAULT_CONNECT_ACROSS_CHANNELS: bool = false;
    /// Default for [`connect_across_frames`](Self::connect_across_frames).
    pub const DEFAULT_CONNECT_ACROSS_FRAMES: bool = false;
    /// Default for [`enable_3d`](Self::enable_3d).
    pub const DEFAULT_ENABLE_3D: bool = true;
    /// Default for [`enforce_edges_within_mask`](Self::enforce_edges_within_mask).
    pub const DEFAULT_ENFORCE_EDGES_WITHIN_MASK: bool = true;
    /// Default for [`new_edge_color`](Self::new_edge_color).
    pub const DEFAULT_NEW_EDGE_COLOR: Option<Color> = Some(Color::GREEN);

    /// Check the parameters before a run.
    ///
    /// # Errors
    ///
    /// [`ConnectError::InvalidConfig`] if the connection limit is zero.
    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.limit_connections == Some(0) {
            return Err(ConnectError::InvalidConfig(
                "limit_connections must be at least 1 when enabled".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            connect_across_channels: Self::DEFAULT_CONNECT_ACROSS_CHANNELS,
            connect_across_frames: Self::DEFAULT_CONNECT_ACROSS_FRAMES,
            enable_3d: Self::DEFAULT_ENABLE_3D,
            limit_connections: None,
            ignore_limit_for_source: false,
            ignore_limit_for_target: false,
            enforce_edges_within_mask: Self::DEFAULT_ENFORCE_EDGES_WITHIN_MASK,
            new_edge_color: Self::DEFAULT_NEW_EDGE_COLOR,
            new_edge_metadata: BTreeMap::new(),
            variables: BTreeMap::new(),
        }
    }
}

/// Order in which the fast variant prefers candidate lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LengthSortOrder {
    /// Shortest candidates first.
    #[default]
    Ascending,
    /// Longest candidates first.
    Descending,
}

/// How the matcher orders scored candidates before committing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreOrder {
    /// Highest score first (thorough variant).
    HighestFirst,
    /// Lowest score first (fast variant; the score is a signed length).
    LowestFirst,
}

/// Numeric range filters of the fast variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastConstraints {
    /// Accepted Euclidean distance between the two positions.
    pub length_range: ValueRange<f64>,
    /// Accepted current degree of both endpoints.
    pub degree_range: ValueRange<usize>,
    /// Accepted vertex value of both endpoints.
    pub value_range: ValueRange<f64>,
    /// Which lengths the matcher prefers.
    pub sort_order: LengthSortOrder,
    /// Reject pairs that are already connected by a path.
    pub ignore_if_has_path: bool,
    /// Re-test connectivity against edges committed earlier in the same run.
    pub recheck_path_on_commit: bool,
}

impl FastConstraints {
    /// Default for [`length_range`](Self::length_range).
    pub const DEFAULT_LENGTH_RANGE: ValueRange<f64> = ValueRange::new(0.0, 10.0);
    /// Default for [`degree_range`](Self::degree_range).
    pub const DEFAULT_DEGREE_RANGE: ValueRange<usize> = ValueRange::new(0, 1);
    /// Default for [`value_range`](Self::value_range).
    pub const DEFAULT_VALUE_RANGE: ValueRange<f64> =
        ValueRange::new(f64::NEG_INFINITY, f64::INFINITY);
    /// Default for [`ignore_if_has_path`](Self::ignore_if_has_path).
    pub const DEFAULT_IGNORE_IF_HAS_PATH: bool = true;

    /// Check every range before a run.
    ///
    /// # Errors
    ///
    /// [`ConnectError::InvalidConfig`] if a range has `min > max` or a NaN
    /// bound.
    pub fn validate(&self) -> Result<(), ConnectError> {
        if !self.length_range.is_valid() {
            return Err(invalid_range("length_range", &self.length_range));
        }
        if !self.degree_range.is_valid() {
            return Err(invalid_range("degree_range", &self.degree_range));
        }
        if !self.value_range.is_valid() {
            return Err(invalid_range("value_range", &self.value_range));
        }
        Ok(())
    }

    /// Signed length used as the candidate score.
    #[must_use]
    pub fn score_for(&self, length: f64) -> f64 {
        match self.sort_order {
            LengthSortOrder::Ascending => length,
            LengthSortOrder::Descending => -length,
        }
    }
}

impl Default for FastConstraints {
    fn default() -> Self {
        Self {
            length_range: Self::DEFAULT_LENGTH_RANGE,
            degree_range: Self::DEFAULT_DEGREE_RANGE,
            value_range: Self::DEFAULT_VALUE_RANGE,
            sort_order: LengthSortOrder::default(),
            ignore_if_has_path: Self::DEFAULT_IGNORE_IF_HAS_PATH,
            recheck_path_on_commit: false,
        }
    }
}

fn invalid_range<T: fmt::Debug>(name: &str, range: &ValueRange<T>) -> ConnectError {
    ConnectError::InvalidConfig(format!(
        "{name} must satisfy min <= max, got [{:?}, {:?}]",
        range.min, range.max
    ))
}

/// Predicate-driven constraints of the thorough variant.
pub struct ThoroughConstraints {
    /// Accept/reject test over the pair context.
    pub predicate: Box<dyn Predicate>,
    /// Candidate scorer; only consulted when a connection limit is set.
    /// Without one every candidate scores 0.
    pub scorer: Option<Box<dyn Scorer>>,
    /// Query the graph for an existing path between the endpoints.
    pub find_path: bool,
    /// Skip sources without a direction.
    pub require_direction: bool,
}

impl ThoroughConstraints {
    /// Default for [`find_path`](Self::find_path).
    pub const DEFAULT_FIND_PATH: bool = true;

    /// Constraints with the given predicate and default settings.
    #[must_use]
    pub fn new(predicate: impl Predicate + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
            scorer: None,
            find_path: Self::DEFAULT_FIND_PATH,
            require_direction: false,
        }
    }

    /// Builder-style setter for the scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: impl Scorer + 'static) -> Self {
        self.scorer = Some(Box::new(scorer));
        self
    }

    /// Builder-style setter for [`find_path`](Self::find_path).
    #[must_use]
    pub const fn with_find_path(mut self, find_path: bool) -> Self {
        self.find_path = find_path;
        self
    }

    /// Builder-style setter for [`require_direction`](Self::require_direction).
    #[must_use]
    pub const fn with_require_direction(mut self, require_direction: bool) -> Self {
        self.require_direction = require_direction;
        self
    }
}

impl Default for ThoroughConstraints {
    fn default() -> Self {
        Self::new(EndpointGap::default())
    }
}

impl fmt::Debug for ThoroughConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThoroughConstraints")
            .field("scorer", &self.scorer.is_some())
            .field("find_path", &self.find_path)
            .field("require_direction", &self.require_direction)
            .finish_non_exhaustive()
    }
}

/// Selects the engine variant.
#[derive(Debug)]
pub enum ConstraintPolicy {
    /// Direction- and path-aware predicate evaluation; marches the mask
    /// along each candidate segment.
    Thorough(ThoroughConstraints),
    /// Numeric range filters; samples the mask at the source only.
    Fast(FastConstraints),
}

impl ConstraintPolicy {
    /// Short name for logs and diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Thorough(_) => "thorough",
            Self::Fast(_) => "fast",
        }
    }

    /// Order the matcher applies to this variant's scores.
    #[must_use]
    pub const fn score_order(&self) -> ScoreOrder {
        match self {
            Self::Thorough(_) => ScoreOrder::HighestFirst,
            Self::Fast(_) => ScoreOrder::LowestFirst,
        }
    }

    /// Mask test granularity of this variant.
    #[must_use]
    pub const fn mask_sampling(&self) -> MaskSampling {
        match self {
            Self::Thorough(_) => MaskSampling::Segment,
            Self::Fast(_) => MaskSampling::SourceOnly,
        }
    }

    /// Check the variant's parameters.
    ///
    /// # Errors
    ///
    /// See [`FastConstraints::validate`].
    pub fn validate(&self) -> Result<(), ConnectError> {
        match self {
            Self::Thorough(_) => Ok(()),
            Self::Fast(fast) => fast.validate(),
        }
    }
}

impl Default for ConstraintPolicy {
    fn default() -> Self {
        Self::Fast(FastConstraints::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let c = ConnectConfig::default();
        assert!(!c.connect_across_channels);
        assert!(!c.connect_across_frames);
        assert!(c.enable_3d);
        assert!(c.limit_connections.is_none());
        assert!(c.enforce_edges_within_mask);
        assert_eq!(c.new_edge_color, Some(Color::GREEN));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_limit_is_rejected() {
        let c = ConnectConfig {
            limit_connections: Some(0),
            ..ConnectConfig::default()
        };
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("limit_connections"));
    }

    #[test]
    fn fast_defaults() {
        let f = FastConstraints::default();
        assert_eq!(f.length_range, ValueRange::new(0.0, 10.0));
        assert_eq!(f.degree_range, ValueRange::new(0, 1));
        assert!(f.value_range.contains(-1e300));
        assert!(f.ignore_if_has_path);
        assert!(!f.recheck_path_on_commit);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn fast_rejects_inverted_and_nan_ranges() {
        let inverted = FastConstraints {
            degree_range: ValueRange::new(3, 1),
            ..FastConstraints::default()
        };
        assert!(inverted.validate().is_err());
        let nan = FastConstraints {
            length_range: ValueRange::new(0.0, f64::NAN),
            ..FastConstraints::default()
        };
        let err = nan.validate().unwrap_err();
        assert!(err.to_string().contains("length_range"));
    }

    #[test]
    fn fast_score_is_signed_length() {
        let mut f = FastConstraints::default();
        assert!((f.score_for(4.0) - 4.0).abs() < f64::EPSILON);
        f.sort_order = LengthSortOrder::Descending;
        assert!((f.score_for(4.0) + 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn policy_orders_and_sampling() {
        let thorough = ConstraintPolicy::Thorough(ThoroughConstraints::default());
        assert_eq!(thorough.score_order(), ScoreOrder::HighestFirst);
        assert_eq!(thorough.mask_sampling(), MaskSampling::Segment);
        let fast = ConstraintPolicy::default();
        assert_eq!(fast.score_order(), ScoreOrder::LowestFirst);
        assert_eq!(fast.mask_sampling(), MaskSampling::SourceOnly);
        assert_eq!(fast.name(), "fast");
    }

    #[test]
    fn config_json_fills_missing_fields_with_defaults() {
        let c: ConnectConfig =
            serde_json::from_str(r#"{"limit_connections": 2, "enable_3d": false}"#).unwrap();
        assert_eq!(c.limit_connections, Some(2));
        assert!(!c.enable_3d);
        assert_eq!(c.new_edge_color, Some(Color::GREEN));
    }

    #[test]
    fn thorough_debug_hides_callables() {
        let t = ThoroughConstraints::default().with_find_path(false);
        let s = format!("{t:?}");
        assert!(s.contains("find_path: false"));
    }
}
