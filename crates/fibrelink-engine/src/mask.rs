//! Mask feasibility: keep proposed edges inside a foreground region.
//!
//! The mask is a z-stack of 8-bit slices; a zero pixel is background.
//! Candidates are tested either by marching along the proposed segment or
//! by a single lookup at the source vertex. All three axes are clamped to
//! the volume, so vertices outside the image sample the nearest border
//! pixel instead of reading out of range.

use image::GrayImage;

use crate::types::{ConnectError, Point3};

/// Read-only volumetric label image (channel 0, frame 0).
#[derive(Debug, Clone)]
pub struct MaskVolume {
    slices: Vec<GrayImage>,
}

impl MaskVolume {
    /// Build a volume from z-ordered slices.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::InvalidMask`] if there are no slices, a
    /// slice has zero width or height, or slice dimensions differ.
    pub fn new(slices: Vec<GrayImage>) -> Result<Self, ConnectError> {
        let Some(first) = slices.first() else {
            return Err(ConnectError::InvalidMask("mask has no slices".to_string()));
        };
        let dims = first.dimensions();
        if dims.0 == 0 || dims.1 == 0 {
            return Err(ConnectError::InvalidMask(format!(
                "mask slice is empty ({}x{})",
                dims.0, dims.1
            )));
        }
        if let Some((z, s)) = slices
            .iter()
            .enumerate()
            .find(|(_, s)| s.dimensions() != dims)
        {
            return Err(ConnectError::InvalidMask(format!(
                "slice {z} is {}x{}, expected {}x{}",
                s.width(),
                s.height(),
                dims.0,
                dims.1
            )));
        }
        Ok(Self { slices })
    }

    /// Single-slice volume.
    ///
    /// # Errors
    ///
    /// See [`MaskVolume::new`].
    pub fn from_slice(slice: GrayImage) -> Result<Self, ConnectError> {
        Self::new(vec![slice])
    }

    /// Slice width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.slices.first().map_or(0, GrayImage::width)
    }

    /// Slice height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.slices.first().map_or(0, GrayImage::height)
    }

    /// Number of z slices.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.slices.len()
    }

    /// Pixel value nearest to `p`, clamped into the volume.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn sample(&self, p: Point3) -> u8 {
        let x = clamp_index(p.x, self.width() as usize);
        let y = clamp_index(p.y, self.height() as usize);
        let z = clamp_index(p.z, self.depth());
        self.slices
            .get(z)
            .map_or(0, |slice| slice.get_pixel(x as u32, y as u32).0[0])
    }

    /// Whether the pixel nearest to `p` is foreground.
    #[must_use]
    pub fn is_foreground(&self, p: Point3) -> bool {
        self.sample(p) != 0
    }
}

/// Round `v` to the nearest index in `0..len`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_index(v: f64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let r = v.round();
    if r.is_nan() || r <= 0.0 {
        0
    } else {
        (r as usize).min(len - 1)
    }
}

/// How a candidate is tested against the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskSampling {
    /// March along the segment when both endpoints have a direction,
    /// otherwise sample the source vertex.
    Segment,
    /// Only ever sample the source vertex. O(1) per candidate.
    SourceOnly,
}

/// Whether the candidate `source -> target` passes the mask.
///
/// `both_directed` states whether both endpoints are degree-1 vertices;
/// only then does [`MaskSampling::Segment`] march the segment. The march
/// takes `floor(|target - source|)` steps and tests the intermediate
/// samples only, never the endpoints themselves. A segment shorter than
/// two steps has no intermediate sample, so the source is tested instead.
#[must_use]
pub fn is_feasible(
    mask: &MaskVolume,
    source: Point3,
    target: Point3,
    sampling: MaskSampling,
    both_directed: bool,
) -> bool {
    match sampling {
        MaskSampling::Segment if both_directed => segment_inside(mask, source, target),
        MaskSampling::Segment | MaskSampling::SourceOnly => mask.is_foreground(source),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn segment_inside(mask: &MaskVolume, a: Point3, b: Point3) -> bool {
    let length = a.distance(b);
    if !length.is_finite() {
        return false;
    }
    let n_steps = length.floor() as usize;
    if n_steps < 2 {
        return mask.is_foreground(a);
    }
    (1..n_steps).all(|i| {
        #[allow(clippy::cast_precision_loss)]
        let t = i as f64 / n_steps as f64;
        mask.is_foreground(a.lerp(b, t))
    })
}
