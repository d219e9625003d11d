use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_FUSION_BUDGET_BYTES, DEFAULT_FUSION_OPACITY, DEFAULT_READY_THRESHOLD,
    DEFAULT_SETTLE_WINDOW_MS, MAX_VIEWPORTS,
};
use crate::error::{FuseboxError, Result};
use crate::fusion::{ReadyBasis, ReadyPolicy};
use crate::viewport::LayoutPreset;

/// Session-wide viewer configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
}

impl ViewerConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.layout.max_viewports == 0 || self.layout.max_viewports > MAX_VIEWPORTS {
            return Err(FuseboxError::Config(format!(
                "max_viewports must be between 1 and {MAX_VIEWPORTS}, got {}",
                self.layout.max_viewports
            )));
        }
        if self.layout.initial.slot_count() > self.layout.max_viewports {
            return Err(FuseboxError::Config(format!(
                "initial layout {} needs {} slots but max_viewports is {}",
                self.layout.initial,
                self.layout.initial.slot_count(),
                self.layout.max_viewports
            )));
        }
        if !(0.0..=1.0).contains(&self.fusion.ready_threshold) {
            return Err(FuseboxError::Config(format!(
                "ready_threshold must be within [0, 1], got {}",
                self.fusion.ready_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.fusion.opacity) {
            return Err(FuseboxError::Config(format!(
                "opacity must be within [0, 1], got {}",
                self.fusion.opacity
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Layout applied when a session starts.
    pub initial: LayoutPreset,
    pub max_viewports: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            initial: LayoutPreset::Single,
            max_viewports: MAX_VIEWPORTS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period (ms) after the last continuous update before reconciling.
    pub settle_window_ms: u64,
}

impl SyncConfig {
    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle_window_ms: DEFAULT_SETTLE_WINDOW_MS,
        }
    }
}

/// Where preload work runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreloadMode {
    /// One named worker thread per preloading key.
    #[default]
    Background,
    /// On the thread that requested the preload.
    Inline,
}

impl fmt::Display for PreloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Background => write!(f, "Background"),
            Self::Inline => write!(f, "Inline"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub ready_threshold: f32,
    pub ready_basis: ReadyBasis,
    /// Fused-pixel memory budget in bytes. `None` keeps every entry.
    pub memory_budget_bytes: Option<usize>,
    pub preload_mode: PreloadMode,
    /// Overlay opacity in [0, 1].
    pub opacity: f32,
}

impl FusionConfig {
    pub fn ready_policy(&self) -> ReadyPolicy {
        ReadyPolicy {
            threshold: self.ready_threshold,
            basis: self.ready_basis,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            ready_threshold: DEFAULT_READY_THRESHOLD,
            ready_basis: ReadyBasis::default(),
            memory_budget_bytes: Some(DEFAULT_FUSION_BUDGET_BYTES),
            preload_mode: PreloadMode::default(),
            opacity: DEFAULT_FUSION_OPACITY,
        }
    }
}
