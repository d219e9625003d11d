use std::fmt;

use crate::viewport::{ViewportAssignments, ViewportId};

/// Outward hooks for toolbars and host UI. Every method defaults to a no-op.
pub trait ViewerListener: Send {
    /// Fired after every mutation of the viewport list or its assignments.
    fn on_viewport_assignments_change(&mut self, _assignments: &ViewportAssignments) {}

    fn on_fusion_opacity_change(&mut self, _opacity: f32) {}

    /// Fired when reconciled navigation carries a new zoom.
    fn on_zoom_change(&mut self, _zoom: f32) {}

    /// `Some(message)` when a slot fails to load, `None` when its error
    /// is cleared.
    fn on_load_error(&mut self, _viewport: ViewportId, _message: Option<&str>) {}
}

/// What a viewport can show for its secondary right now.
#[derive(Clone, Debug, PartialEq)]
pub enum FusionDisplay {
    /// No secondary assigned.
    PrimaryOnly,
    /// Fusion is being computed; fused slices appear as they complete.
    Loading { progress: f32 },
    Fused,
    /// Fusion failed for the pair; the viewport shows the primary alone
    /// with a degraded marker.
    Degraded(String),
}

impl fmt::Display for FusionDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryOnly => write!(f, "Primary only"),
            Self::Loading { progress } => write!(f, "Loading ({:.0}%)", progress * 100.0),
            Self::Fused => write!(f, "Fused"),
            Self::Degraded(reason) => write!(f, "Degraded: {reason}"),
        }
    }
}
