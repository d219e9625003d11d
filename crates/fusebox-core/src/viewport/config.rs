use std::fmt;

use serde::{Deserialize, Serialize};

use crate::series::SeriesId;

/// Stable identifier of a viewport slot for its whole lifetime.
///
/// Slot ids are never reused within a registry; `PRIMARY` always names the
/// slot at ordinal 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewportId(pub u32);

impl ViewportId {
    pub const PRIMARY: Self = Self(0);

    pub fn is_primary(&self) -> bool {
        *self == Self::PRIMARY
    }
}

impl fmt::Display for ViewportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_primary() {
            write!(f, "primary")
        } else {
            write!(f, "viewport-{}", self.0)
        }
    }
}

/// Lifecycle of a slot's image load.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ViewportPhase {
    #[default]
    Initializing,
    LoadingImages,
    Ready,
    Error(String),
}

impl fmt::Display for ViewportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::LoadingImages => write!(f, "Loading images"),
            Self::Ready => write!(f, "Ready"),
            Self::Error(reason) => write!(f, "Error: {reason}"),
        }
    }
}

/// One rendering pane's configuration and lifecycle state.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportConfig {
    pub id: ViewportId,
    /// `None` displays the primary series alone.
    pub secondary_series_id: Option<SeriesId>,
    pub show_structures: bool,
    pub show_mpr: bool,
    pub load_error: Option<String>,
    pub is_retrying: bool,
    pub phase: ViewportPhase,
    /// Bumped on every retry; renderers key their remount on it.
    pub retry_count: u32,
}

impl ViewportConfig {
    pub fn new(id: ViewportId, secondary_series_id: Option<SeriesId>) -> Self {
        Self {
            id,
            secondary_series_id,
            show_structures: true,
            show_mpr: false,
            load_error: None,
            is_retrying: false,
            phase: ViewportPhase::Initializing,
            retry_count: 0,
        }
    }

    pub fn begin_loading(&mut self) {
        self.phase = ViewportPhase::LoadingImages;
    }

    pub fn mark_ready(&mut self) {
        self.phase = ViewportPhase::Ready;
        self.load_error = None;
        self.is_retrying = false;
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.phase = ViewportPhase::Error(message.clone());
        self.load_error = Some(message);
        self.is_retrying = false;
    }

    /// Leave the error track and go back to loading with a fresh render key.
    pub fn retry(&mut self) {
        self.load_error = None;
        self.is_retrying = true;
        self.retry_count += 1;
        self.phase = ViewportPhase::LoadingImages;
    }

    /// Point the slot at another secondary. Any previous load error belonged
    /// to the old content and is dropped.
    pub fn reassign(&mut self, secondary: Option<SeriesId>) {
        self.secondary_series_id = secondary;
        self.load_error = None;
        self.is_retrying = false;
        self.phase = ViewportPhase::Initializing;
    }

    /// Exchange displayed content with another slot, keeping both ids.
    pub(crate) fn swap_content(&mut self, other: &mut ViewportConfig) {
        std::mem::swap(&mut self.secondary_series_id, &mut other.secondary_series_id);
        std::mem::swap(&mut self.show_structures, &mut other.show_structures);
        std::mem::swap(&mut self.show_mpr, &mut other.show_mpr);
        std::mem::swap(&mut self.load_error, &mut other.load_error);
        std::mem::swap(&mut self.is_retrying, &mut other.is_retrying);
        std::mem::swap(&mut self.phase, &mut other.phase);
    }
}
