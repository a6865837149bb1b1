//! Constraint evaluation: the variable context handed to user predicates
//! and scorers, and the [`Predicate`] / [`Scorer`] traits they implement.
//!
//! The engine never interprets expressions itself. Callers plug in any
//! boolean test and numeric scorer over a named-variable map; closures of
//! the right shape implement both traits directly.
//!
//! # Variables
//!
//! Per vertex (vertex filters, and prefixed with `source.` / `target.` in
//! pair contexts): every metadata key, then `x`, `y`, `z`, `c` (channel),
//! `t` (frame), `value`, `radius`, `degree`, `color` (hex text, when set)
//! and `direction.x` / `direction.y` / `direction.z` (0 without a
//! direction). Built-in names shadow metadata keys of the same name.
//!
//! Per pair: `length`, `angle` (degrees), `dot_product`, `path_exists` and
//! `path_length` (edge count). `angle` and `dot_product` are NaN unless
//! both endpoints have a direction; `path_length` is NaN without a path.
//!
//! Caller-supplied custom variables are present in every context and are
//! shadowed by all of the above.

use std::collections::BTreeMap;

use crate::types::{Point3, SpatialVertex, Value};

/// Errors raised by predicate and scorer implementations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConstraintError {
    /// A required variable is absent from the context.
    #[error("variable `{0}` is not defined")]
    MissingVariable(String),

    /// A variable holds a value of the wrong type.
    #[error("variable `{key}` is {found}, expected {expected}")]
    TypeMismatch {
        /// Variable name.
        key: String,
        /// Type the caller asked for.
        expected: &'static str,
        /// Type actually stored.
        found: &'static str,
    },

    /// Any other evaluation failure.
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

/// Named-variable context passed to predicates and scorers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    values: BTreeMap<String, Value>,
}

impl Variables {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Raw value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Whether `key` is defined.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of defined variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no variable is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Numeric value of `key`; booleans read as 0/1.
    ///
    /// # Errors
    ///
    /// [`ConstraintError::MissingVariable`] if undefined,
    /// [`ConstraintError::TypeMismatch`] if the value has no numeric view.
    pub fn number(&self, key: &str) -> Result<f64, ConstraintError> {
        let value = self.require(key)?;
        value
            .as_number()
            .ok_or_else(|| mismatch(key, "number", value))
    }

    /// Boolean value of `key`.
    ///
    /// # Errors
    ///
    /// [`ConstraintError::MissingVariable`] if undefined,
    /// [`ConstraintError::TypeMismatch`] if the value is not a boolean.
    pub fn boolean(&self, key: &str) -> Result<bool, ConstraintError> {
        let value = self.require(key)?;
        value.as_bool().ok_or_else(|| mismatch(key, "bool", value))
    }

    /// Text value of `key`.
    ///
    /// # Errors
    ///
    /// [`ConstraintError::MissingVariable`] if undefined,
    /// [`ConstraintError::TypeMismatch`] if the value is not text.
    pub fn text(&self, key: &str) -> Result<&str, ConstraintError> {
        let value = self.require(key)?;
        value.as_text().ok_or_else(|| mismatch(key, "text", value))
    }

    /// Copy every entry of `other` under `prefix.`.
    pub fn insert_prefixed(&mut self, prefix: &str, other: &Self) {
        for (k, v) in &other.values {
            self.values.insert(format!("{prefix}.{k}"), v.clone());
        }
    }

    /// Variables describing one vertex.
    ///
    /// `direction` is the endpoint direction (see
    /// [`FilamentGraph::direction_of`](crate::graph::FilamentGraph::direction_of)).
    #[must_use]
    pub fn for_vertex(vertex: &SpatialVertex, degree: usize, direction: Option<Point3>) -> Self {
        let mut vars = Self::new();
        for (k, v) in &vertex.metadata {
            vars.set(k.clone(), v.clone());
        }
        vars.set("x", vertex.position.x);
        vars.set("y", vertex.position.y);
        vars.set("z", vertex.position.z);
        vars.set("c", vertex.axis.channel);
        vars.set("t", vertex.axis.frame);
        vars.set("value", vertex.value);
        vars.set("radius", vertex.radius);
        vars.set("degree", degree);
        if let Some(color) = vertex.color {
            vars.set("color", color.to_string());
        }
        let d = direction.unwrap_or_default();
        vars.set("direction.x", d.x);
        vars.set("direction.y", d.y);
        vars.set("direction.z", d.z);
        vars
    }

    fn require(&self, key: &str) -> Result<&Value, ConstraintError> {
        self.values
            .get(key)
            .ok_or_else(|| ConstraintError::MissingVariable(key.to_string()))
    }
}

impl FromIterator<(String, Value)> for Variables {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

fn mismatch(key: &str, expected: &'static str, found: &Value) -> ConstraintError {
    ConstraintError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: found.type_name(),
    }
}

/// Pair-level measurements exposed alongside the two vertex contexts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairMeasures {
    /// Euclidean distance between the two positions.
    pub length: f64,
    /// Angle between the endpoint directions in degrees, or NaN.
    pub angle: f64,
    /// Dot product of the endpoint directions, or NaN.
    pub dot_product: f64,
    /// Whether the endpoints are already connected.
    pub path_exists: bool,
    /// Edge count of the shortest existing path, or NaN.
    pub path_length: f64,
}

/// Assemble the context for one candidate pair.
///
/// `custom` is inserted first, so every engine-provided name wins over a
/// custom variable of the same name.
#[must_use]
pub fn pair_variables(
    custom: &BTreeMap<String, Value>,
    source: &Variables,
    target: &Variables,
    measures: &PairMeasures,
) -> Variables {
    let mut vars: Variables = custom
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    vars.insert_prefixed("source", source);
    vars.insert_prefixed("target", target);
    vars.set("length", measures.length);
    vars.set("angle", measures.angle);
    vars.set("dot_product", measures.dot_product);
    vars.set("path_exists", measures.path_exists);
    vars.set("path_length", measures.path_length);
    vars
}

/// Context for a vertex filter: custom variables shadowed by the vertex's own.
#[must_use]
pub fn vertex_filter_variables(custom: &BTreeMap<String, Value>, vertex: &Variables) -> Variables {
    let mut vars: Variables = custom
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (k, v) in vertex.iter() {
        vars.set(k, v.clone());
    }
    vars
}

/// Boolean test over a variable context.
///
/// An `Err` rejects the candidate (or excludes the vertex, for vertex
/// filters) without aborting the run.
pub trait Predicate: Send + Sync {
    /// Evaluate the predicate.
    ///
    /// # Errors
    ///
    /// Any [`ConstraintError`] the implementation raises.
    fn test(&self, vars: &Variables) -> Result<bool, ConstraintError>;
}

impl<F> Predicate for F
where
    F: Fn(&Variables) -> Result<bool, ConstraintError> + Send + Sync,
{
    fn test(&self, vars: &Variables) -> Result<bool, ConstraintError> {
        self(vars)
    }
}

/// Numeric scorer over a variable context.
pub trait Scorer: Send + Sync {
    /// Compute the score.
    ///
    /// # Errors
    ///
    /// Any [`ConstraintError`] the implementation raises.
    fn score(&self, vars: &Variables) -> Result<f64, ConstraintError>;
}

impl<F> Scorer for F
where
    F: Fn(&Variables) -> Result<f64, ConstraintError> + Send + Sync,
{
    fn score(&self, vars: &Variables) -> Result<f64, ConstraintError> {
        self(vars)
    }
}

/// Predicate accepting everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Predicate for AcceptAll {
    fn test(&self, _vars: &Variables) -> Result<bool, ConstraintError> {
        Ok(true)
    }
}

/// Scorer returning the same value for every candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantScore(pub f64);

impl Scorer for ConstantScore {
    fn score(&self, _vars: &Variables) -> Result<f64, ConstraintError> {
        Ok(self.0)
    }
}

/// Bridge gaps between two filament ends: `length < max_length` and both
/// endpoints have degree 1.
///
/// This is the default thorough predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointGap {
    /// Exclusive upper bound on the gap length.
    pub max_length: f64,
}

impl EndpointGap {
    /// Default maximum gap length.
    pub const DEFAULT_MAX_LENGTH: f64 = 100.0;
}

impl Default for EndpointGap {
    fn default() -> Self {
        Self {
            max_length: Self::DEFAULT_MAX_LENGTH,
        }
    }
}

impl Predicate for EndpointGap {
    fn test(&self, vars: &Variables) -> Result<bool, ConstraintError> {
        let length = vars.number("length")?;
        #[allow(clippy::float_cmp)]
        let endpoints =
            vars.number("source.degree")? == 1.0 && vars.number("target.degree")? == 1.0;
        Ok(length < self.max_length && endpoints)
    }
}

/// Score by negated gap length, so shorter gaps rank first under a
/// highest-first ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortestGap;

impl Scorer for ShortestGap {
    fn score(&self, vars: &Variables) -> Result<f64, ConstraintError> {
        Ok(-vars.number("length")?)
    }
}
