use std::cmp::Ordering;
use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Identifier of an image series (primary CT or a co-registered secondary).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesId(pub u64);

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "series {}", self.0)
    }
}

impl From<u64> for SeriesId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Registration used to map a secondary onto the primary's frame of reference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationId {
    /// Whatever registration the catalog resolves as default for the pair
    /// (identity when the series share a frame of reference).
    #[default]
    Default,
    Explicit(String),
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Explicit(id) => write!(f, "{id}"),
        }
    }
}

/// Per-slice record handed over by the image-fetch collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceDescriptor {
    pub instance_uid: String,
    pub instance_number: i32,
    /// Distance of the slice origin along the slice normal, in mm.
    pub position: f64,
}

impl SliceDescriptor {
    pub fn new(instance_uid: impl Into<String>, instance_number: i32, position: f64) -> Self {
        Self {
            instance_uid: instance_uid.into(),
            instance_number,
            position,
        }
    }
}

/// Order slices along the slice normal, breaking ties by instance number.
///
/// Fused data is aligned to this order, so every consumer must see the
/// primary's slices sorted the same way.
pub fn sort_slices(slices: &mut [SliceDescriptor]) {
    slices.sort_by(|a, b| {
        a.position
            .partial_cmp(&b.position)
            .unwrap_or(Ordering::Equal)
            .then(a.instance_number.cmp(&b.instance_number))
    });
}

/// Metadata of a secondary series, fetched once per preload.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesMetadata {
    pub series: SeriesId,
    pub modality: String,
    pub slice_count: usize,
}

/// Fused secondary pixels resampled onto one primary slice.
///
/// The coordination core treats this as an opaque handle and only looks at
/// its size for memory accounting.
#[derive(Clone, Debug)]
pub struct FusedSlice {
    pub slice_index: usize,
    pub data: Array2<f32>,
    pub min: f32,
    pub max: f32,
}

impl FusedSlice {
    pub fn new(slice_index: usize, data: Array2<f32>) -> Self {
        let (min, max) = data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let (min, max) = if data.is_empty() { (0.0, 0.0) } else { (min, max) };
        Self {
            slice_index,
            data,
            min,
            max,
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}
