//! Deterministic in-process collaborators.
//!
//! `SyntheticArchive` stands in for the image-fetch, registration and
//! fusion services so sessions can be driven without DICOM data. Failures
//! and latency can be injected per series or per slice.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{FuseboxError, Result};
use crate::fusion::{FusionKey, FusionSource};
use crate::orchestrator::{ImageSource, RegistrationAssociation, RegistrationCatalog};
use crate::series::{FusedSlice, RegistrationId, SeriesId, SeriesMetadata, SliceDescriptor};

/// Slice spacing used for generated positions, in mm.
const SLICE_SPACING_MM: f64 = 2.5;

#[derive(Clone, Debug)]
struct SeriesInfo {
    modality: String,
    slice_count: usize,
}

#[derive(Default)]
struct Faults {
    unavailable_series: HashSet<SeriesId>,
    unavailable_metadata: HashSet<SeriesId>,
    failing_slices: HashSet<(SeriesId, usize)>,
}

pub struct SyntheticArchive {
    series: HashMap<SeriesId, SeriesInfo>,
    associations: HashMap<SeriesId, Vec<RegistrationAssociation>>,
    faults: Mutex<Faults>,
    slice_shape: (usize, usize),
    fuse_delay: Duration,
    paused: Mutex<bool>,
    resumed: Condvar,
    series_loads: AtomicUsize,
    metadata_fetches: AtomicUsize,
    slices_fused: AtomicUsize,
}

impl SyntheticArchive {
    pub fn new() -> Self {
        Self {
            series: HashMap::new(),
            associations: HashMap::new(),
            faults: Mutex::new(Faults::default()),
            slice_shape: (16, 16),
            fuse_delay: Duration::ZERO,
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            series_loads: AtomicUsize::new(0),
            metadata_fetches: AtomicUsize::new(0),
            slices_fused: AtomicUsize::new(0),
        }
    }

    pub fn with_series(
        mut self,
        series: SeriesId,
        modality: impl Into<String>,
        slice_count: usize,
    ) -> Self {
        self.series.insert(
            series,
            SeriesInfo {
                modality: modality.into(),
                slice_count,
            },
        );
        self
    }

    /// Register `secondary` onto `primary`.
    pub fn with_association(
        mut self,
        primary: SeriesId,
        secondary: SeriesId,
        registration: RegistrationId,
    ) -> Self {
        let modality = self
            .series
            .get(&secondary)
            .map_or_else(|| "OT".to_string(), |s| s.modality.clone());
        self.associations
            .entry(primary)
            .or_default()
            .push(RegistrationAssociation {
                secondary,
                registration,
                modality,
            });
        self
    }

    pub fn with_slice_shape(mut self, height: usize, width: usize) -> Self {
        self.slice_shape = (height, width);
        self
    }

    /// Artificial latency per fused slice.
    pub fn with_fuse_delay(mut self, delay: Duration) -> Self {
        self.fuse_delay = delay;
        self
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_series_available(&self, series: SeriesId, available: bool) {
        let mut faults = self.faults();
        if available {
            faults.unavailable_series.remove(&series);
        } else {
            faults.unavailable_series.insert(series);
        }
    }

    pub fn set_metadata_available(&self, series: SeriesId, available: bool) {
        let mut faults = self.faults();
        if available {
            faults.unavailable_metadata.remove(&series);
        } else {
            faults.unavailable_metadata.insert(series);
        }
    }

    /// Make fusion of one primary slice fail for `secondary`.
    pub fn fail_slice(&self, secondary: SeriesId, index: usize) {
        self.faults().failing_slices.insert((secondary, index));
    }

    pub fn heal_slice(&self, secondary: SeriesId, index: usize) {
        self.faults().failing_slices.remove(&(secondary, index));
    }

    /// Hold every `fuse_slice` call until `resume`.
    pub fn pause(&self) {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn resume(&self) {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.resumed.notify_all();
    }

    fn wait_while_paused(&self) {
        let paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = self
            .resumed
            .wait_while(paused, |p| *p)
            .unwrap_or_else(PoisonError::into_inner);
    }

    pub fn series_loads(&self) -> usize {
        self.series_loads.load(Ordering::SeqCst)
    }

    pub fn metadata_fetches(&self) -> usize {
        self.metadata_fetches.load(Ordering::SeqCst)
    }

    pub fn slices_fused(&self) -> usize {
        self.slices_fused.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageSource for SyntheticArchive {
    fn load_series(&self, series: SeriesId) -> Result<Vec<SliceDescriptor>> {
        self.series_loads.fetch_add(1, Ordering::SeqCst);
        if self.faults().unavailable_series.contains(&series) {
            return Err(FuseboxError::SeriesFetch {
                series,
                reason: "series unavailable".into(),
            });
        }
        let info = self.series.get(&series).ok_or_else(|| FuseboxError::SeriesFetch {
            series,
            reason: "unknown series".into(),
        })?;
        // Instances are listed in reverse acquisition order, the way archives
        // often return them; callers must sort.
        Ok((0..info.slice_count)
            .rev()
            .map(|i| {
                SliceDescriptor::new(
                    format!("1.2.826.0.1.{}.{}", series.0, i + 1),
                    (i + 1) as i32,
                    i as f64 * SLICE_SPACING_MM,
                )
            })
            .collect())
    }
}

impl RegistrationCatalog for SyntheticArchive {
    fn associations(&self, primary: SeriesId) -> Result<Vec<RegistrationAssociation>> {
        Ok(self.associations.get(&primary).cloned().unwrap_or_default())
    }
}

impl FusionSource for SyntheticArchive {
    fn secondary_metadata(&self, secondary: SeriesId) -> Result<SeriesMetadata> {
        self.metadata_fetches.fetch_add(1, Ordering::SeqCst);
        if self.faults().unavailable_metadata.contains(&secondary) {
            return Err(FuseboxError::SeriesFetch {
                series: secondary,
                reason: "metadata unavailable".into(),
            });
        }
        let info = self
            .series
            .get(&secondary)
            .ok_or_else(|| FuseboxError::SeriesFetch {
                series: secondary,
                reason: "unknown series".into(),
            })?;
        Ok(SeriesMetadata {
            series: secondary,
            modality: info.modality.clone(),
            slice_count: info.slice_count,
        })
    }

    fn fuse_slice(
        &self,
        key: &FusionKey,
        metadata: &SeriesMetadata,
        _descriptor: &SliceDescriptor,
        index: usize,
    ) -> Result<FusedSlice> {
        self.wait_while_paused();
        if !self.fuse_delay.is_zero() {
            std::thread::sleep(self.fuse_delay);
        }
        if self.faults().failing_slices.contains(&(key.secondary, index)) {
            return Err(FuseboxError::SliceFusion {
                key: key.clone(),
                index,
                reason: "resampling failed".into(),
            });
        }

        let (h, w) = self.slice_shape;
        // Nearest secondary slice along the primary's axis.
        let source_slice = if metadata.slice_count == 0 {
            0
        } else {
            index.min(metadata.slice_count - 1)
        };
        let phase = (key.secondary.0 % 7) as f32 + source_slice as f32 * 0.01;
        let pixels: Vec<f32> = (0..h)
            .into_par_iter()
            .flat_map_iter(|r| {
                (0..w).map(move |c| {
                    let base = ((r + c) % 32) as f32 / 32.0;
                    let overlay = ((r as f32 * 0.3 + c as f32 * 0.2 + phase).sin() + 1.0) * 0.5;
                    0.5 * base + 0.5 * overlay
                })
            })
            .collect();
        let fused = Array2::from_shape_vec((h, w), pixels).map_err(|e| FuseboxError::SliceFusion {
            key: key.clone(),
            index,
            reason: e.to_string(),
        })?;

        self.slices_fused.fetch_add(1, Ordering::SeqCst);
        Ok(FusedSlice::new(index, fused))
    }
}
