mod config;
mod layout;
mod registry;

pub use config::{ViewportConfig, ViewportId, ViewportPhase};
pub use layout::LayoutPreset;
pub use registry::{ViewportAssignments, ViewportRegistry};
