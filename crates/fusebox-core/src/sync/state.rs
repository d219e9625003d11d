use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_WINDOW_CENTER, DEFAULT_WINDOW_WIDTH};
use crate::error::{FuseboxError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Display window in Hounsfield units. `width` is always positive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowLevel {
    pub width: f32,
    pub center: f32,
}

impl WindowLevel {
    pub fn new(width: f32, center: f32) -> Self {
        Self { width, center }
    }
}

impl Default for WindowLevel {
    fn default() -> Self {
        Self {
            width: DEFAULT_WINDOW_WIDTH,
            center: DEFAULT_WINDOW_CENTER,
        }
    }
}

/// Navigation parameters shared by every locked viewport.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub current_index: usize,
    pub zoom: f32,
    pub pan: Point,
    pub window_level: WindowLevel,
    pub crosshair: Point,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            current_index: 0,
            zoom: 1.0,
            pan: Point::default(),
            window_level: WindowLevel::default(),
            crosshair: Point::default(),
        }
    }
}

impl SyncState {
    pub fn validate(&self) -> Result<()> {
        check_zoom(self.zoom)?;
        check_finite("pan.x", self.pan.x)?;
        check_finite("pan.y", self.pan.y)?;
        check_window_level(&self.window_level)?;
        check_finite("crosshair.x", self.crosshair.x)?;
        check_finite("crosshair.y", self.crosshair.y)
    }

    /// Shallow merge: only fields present in the patch are overwritten.
    /// Returns whether anything changed.
    pub fn merge(&mut self, patch: &SyncPatch) -> bool {
        let before = *self;
        if let Some(index) = patch.current_index {
            self.current_index = index;
        }
        if let Some(zoom) = patch.zoom {
            self.zoom = zoom;
        }
        if let Some(pan) = patch.pan {
            self.pan = pan;
        }
        if let Some(wl) = patch.window_level {
            self.window_level = wl;
        }
        if let Some(crosshair) = patch.crosshair {
            self.crosshair = crosshair;
        }
        *self != before
    }
}

/// Partial `SyncState` carried by a single `update()` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPatch {
    pub current_index: Option<usize>,
    pub zoom: Option<f32>,
    pub pan: Option<Point>,
    pub window_level: Option<WindowLevel>,
    pub crosshair: Option<Point>,
}

impl SyncPatch {
    pub fn with_index(mut self, index: usize) -> Self {
        self.current_index = Some(index);
        self
    }

    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.zoom = Some(zoom);
        self
    }

    pub fn with_pan(mut self, x: f32, y: f32) -> Self {
        self.pan = Some(Point::new(x, y));
        self
    }

    pub fn with_window_level(mut self, width: f32, center: f32) -> Self {
        self.window_level = Some(WindowLevel::new(width, center));
        self
    }

    pub fn with_crosshair(mut self, x: f32, y: f32) -> Self {
        self.crosshair = Some(Point::new(x, y));
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The whole patch is rejected if any present field is out of range.
    pub fn validate(&self) -> Result<()> {
        if let Some(zoom) = self.zoom {
            check_zoom(zoom)?;
        }
        if let Some(pan) = self.pan {
            check_finite("pan.x", pan.x)?;
            check_finite("pan.y", pan.y)?;
        }
        if let Some(wl) = &self.window_level {
            check_window_level(wl)?;
        }
        if let Some(c) = self.crosshair {
            check_finite("crosshair.x", c.x)?;
            check_finite("crosshair.y", c.y)?;
        }
        Ok(())
    }
}

fn check_finite(field: &'static str, value: f32) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FuseboxError::InvalidSyncValue { field, value })
    }
}

fn check_zoom(zoom: f32) -> Result<()> {
    check_finite("zoom", zoom)?;
    if zoom <= 0.0 {
        return Err(FuseboxError::InvalidSyncValue {
            field: "zoom",
            value: zoom,
        });
    }
    Ok(())
}

fn check_window_level(wl: &WindowLevel) -> Result<()> {
    check_finite("window_level.width", wl.width)?;
    check_finite("window_level.center", wl.center)?;
    if wl.width <= 0.0 {
        return Err(FuseboxError::InvalidSyncValue {
            field: "window_level.width",
            value: wl.width,
        });
    }
    Ok(())
}
