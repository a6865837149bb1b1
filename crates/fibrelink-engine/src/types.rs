//! Shared types for the fibrelink reconnection engine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A 3D point in image coordinates (pixels or physical units).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// Depth (slice) position.
    pub z: f64,
}

impl Point3 {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The same point with `z` set to zero.
    #[must_use]
    pub const fn projected(self) -> Self {
        Self::new(self.x, self.y, 0.0)
    }

    /// Component-wise difference `self - other`.
    #[must_use]
    pub fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.z
            .mul_add(other.z, self.x.mul_add(other.x, self.y * other.y))
    }

    /// Euclidean length of the vector.
    #[must_use]
    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a zero vector.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if n > 0.0 && n.is_finite() {
            Some(Self::new(self.x / n, self.y / n, self.z / n))
        } else {
            None
        }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let d = self.sub(other);
        d.dot(d)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Linear interpolation `self + t * (other - self)`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self::new(
            t.mul_add(other.x - self.x, self.x),
            t.mul_add(other.y - self.y, self.y),
            t.mul_add(other.z - self.z, self.z),
        )
    }

    pub(crate) const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Non-spatial plane of a vertex: which channel and frame it was traced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AxisLocation {
    /// Channel index.
    pub channel: i32,
    /// Frame (time point) index.
    pub frame: i32,
}

impl AxisLocation {
    /// Create a new axis location.
    #[must_use]
    pub const fn new(channel: i32, frame: i32) -> Self {
        Self { channel, frame }
    }
}

/// An RGB color attached to vertices and edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red component.
    pub r: u8,
    /// Green component.
    pub g: u8,
    /// Blue component.
    pub b: u8,
}

impl Color {
    /// Pure green, the default color for newly created edges.
    pub const GREEN: Self = Self::new(0, 255, 0);

    /// Create a new color.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A scalar handed to predicates and scorers, or stored as vertex metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Floating-point number (integers are widened).
    Number(f64),
    /// Free-form text.
    Text(String),
}

impl Value {
    /// Numeric view: numbers as-is, booleans as 0/1, text parsed if possible.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Boolean view; only [`Value::Bool`] qualifies.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Text view; only [`Value::Text`] qualifies.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<usize> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(v: usize) -> Self {
        Self::Number(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Inclusive `[min, max]` window used by the range filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange<T> {
    /// Lower bound (inclusive).
    pub min: T,
    /// Upper bound (inclusive).
    pub max: T,
}

impl<T: PartialOrd + Copy> ValueRange<T> {
    /// Create a new range.
    #[must_use]
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    /// Whether `v` lies within `[min, max]`.
    ///
    /// Incomparable values (NaN) are outside every range.
    #[must_use]
    pub fn contains(&self, v: T) -> bool {
        self.min <= v && v <= self.max
    }

    /// Whether the range is well-formed (`min <= max`).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }
}

/// A traced filament point.
///
/// Vertices are owned by a [`FilamentGraph`](crate::graph::FilamentGraph)
/// and addressed by [`VertexId`](crate::graph::VertexId); two vertices with
/// identical attributes are still distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialVertex {
    /// Spatial location.
    pub position: Point3,
    /// Channel/frame plane the vertex belongs to.
    pub axis: AxisLocation,
    /// Scalar attribute, e.g. the intensity at the vertex.
    pub value: f64,
    /// Filament thickness at the vertex.
    pub radius: f64,
    /// Display color.
    pub color: Option<Color>,
    /// Free-form annotations readable by predicates.
    pub metadata: BTreeMap<String, Value>,
}

impl SpatialVertex {
    /// Create a vertex at `position` on channel 0, frame 0.
    #[must_use]
    pub const fn new(position: Point3) -> Self {
        Self {
            position,
            axis: AxisLocation::new(0, 0),
            value: 0.0,
            radius: 1.0,
            color: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Builder-style setter for the axis location.
    #[must_use]
    pub fn with_axis(mut self, axis: AxisLocation) -> Self {
        self.axis = axis;
        self
    }

    /// Builder-style setter for the scalar value.
    #[must_use]
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    /// Builder-style setter for one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Attributes of an undirected filament edge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilamentEdge {
    /// Display color.
    pub color: Option<Color>,
    /// Free-form annotations.
    pub metadata: BTreeMap<String, String>,
}

/// Errors raised before a reconnection run starts.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Engine parameters are inconsistent.
    #[error("invalid connect configuration: {0}")]
    InvalidConfig(String),

    /// The mask volume cannot be used.
    #[error("invalid mask volume: {0}")]
    InvalidMask(String),
}
