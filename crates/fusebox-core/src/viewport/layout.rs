use std::fmt;

use serde::{Deserialize, Serialize};

/// Pane arrangement presets offered by the layout toolbar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutPreset {
    #[default]
    Single,
    Dual,
    Triple,
    Quad,
}

impl LayoutPreset {
    pub const ALL: &[Self] = &[Self::Single, Self::Dual, Self::Triple, Self::Quad];

    /// Number of viewport slots the preset displays.
    pub fn slot_count(&self) -> usize {
        match self {
            Self::Single => 1,
            Self::Dual => 2,
            Self::Triple => 3,
            Self::Quad => 4,
        }
    }

    /// Smallest preset that shows `count` slots, if any.
    pub fn for_slot_count(count: usize) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.slot_count() >= count)
    }
}

impl fmt::Display for LayoutPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "Single"),
            Self::Dual => write!(f, "Dual"),
            Self::Triple => write!(f, "Triple"),
            Self::Quad => write!(f, "Quad"),
        }
    }
}
