use std::fmt;
use std::sync::Arc;

use crate::series::FusedSlice;

use super::preload::{Listener, PreloadRun};

/// Per-slice result. `Fused` is final: once a slice is fused it is never
/// recomputed or replaced.
#[derive(Clone, Debug)]
pub enum SliceState {
    Pending,
    Fused(Arc<FusedSlice>),
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FusionStatus {
    NotStarted,
    Preloading { progress: f32 },
    Ready,
    Error(String),
}

impl FusionStatus {
    pub fn is_preloading(&self) -> bool {
        matches!(self, Self::Preloading { .. })
    }
}

impl fmt::Display for FusionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "Not started"),
            Self::Preloading { progress } => write!(f, "Preloading ({:.0}%)", progress * 100.0),
            Self::Ready => write!(f, "Ready"),
            Self::Error(reason) => write!(f, "Error: {reason}"),
        }
    }
}

/// Point-in-time counts for one key.
#[derive(Clone, Debug, PartialEq)]
pub struct EntrySummary {
    pub total: usize,
    pub fused: usize,
    pub failed: usize,
    pub pending: usize,
    pub bytes: usize,
    pub status: FusionStatus,
}

pub(super) struct FusionEntry {
    pub(super) slices: Vec<SliceState>,
    pub(super) status: FusionStatus,
    pub(super) progress: f32,
    pub(super) bytes: usize,
    pub(super) run: Option<Arc<PreloadRun>>,
    pub(super) listeners: Vec<Arc<Listener>>,
}

impl FusionEntry {
    pub(super) fn new(slice_count: usize) -> Self {
        Self {
            slices: vec![SliceState::Pending; slice_count],
            status: FusionStatus::NotStarted,
            progress: 0.0,
            bytes: 0,
            run: None,
            listeners: Vec::new(),
        }
    }

    pub(super) fn in_flight(&self) -> bool {
        self.run.is_some()
    }

    pub(super) fn fused_count(&self) -> usize {
        self.slices
            .iter()
            .filter(|s| matches!(s, SliceState::Fused(_)))
            .count()
    }

    /// Slices that finished in either direction.
    pub(super) fn processed_count(&self) -> usize {
        self.slices
            .iter()
            .filter(|s| !matches!(s, SliceState::Pending))
            .count()
    }

    pub(super) fn fraction(&self, done: usize) -> f32 {
        if self.slices.is_empty() {
            1.0
        } else {
            done as f32 / self.slices.len() as f32
        }
    }

    /// Failed slices get another chance on the next run; fused ones stay.
    pub(super) fn reset_failed(&mut self) {
        for slice in self.slices.iter_mut() {
            if matches!(slice, SliceState::Failed(_)) {
                *slice = SliceState::Pending;
            }
        }
    }

    pub(super) fn pending_indices(&self) -> Vec<usize> {
        self.slices
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, SliceState::Pending))
            .map(|(i, _)| i)
            .collect()
    }

    pub(super) fn summary(&self) -> EntrySummary {
        let fused = self.fused_count();
        let failed = self
            .slices
            .iter()
            .filter(|s| matches!(s, SliceState::Failed(_)))
            .count();
        EntrySummary {
            total: self.slices.len(),
            fused,
            failed,
            pending: self.slices.len() - fused - failed,
            bytes: self.bytes,
            status: self.status.clone(),
        }
    }
}
