/// Maximum number of viewport slots in a layout.
pub const MAX_VIEWPORTS: usize = 4;

/// Fraction of successfully fused slices at which a preloaded pair is
/// treated as ready and not preloaded again.
pub const DEFAULT_READY_THRESHOLD: f32 = 0.9;

/// Quiet period after the last continuous interaction before the sync
/// engine reconciles into the cold snapshot.
pub const DEFAULT_SETTLE_WINDOW_MS: u64 = 150;

/// Default fused-pixel memory budget for the prefetch cache. Default: 1 GiB.
pub const DEFAULT_FUSION_BUDGET_BYTES: usize = 1_073_741_824;

/// Default overlay opacity for fused secondaries.
pub const DEFAULT_FUSION_OPACITY: f32 = 0.5;

/// Default CT window width (Hounsfield units, soft tissue).
pub const DEFAULT_WINDOW_WIDTH: f32 = 400.0;

/// Default CT window center (Hounsfield units, soft tissue).
pub const DEFAULT_WINDOW_CENTER: f32 = 40.0;

/// Lower zoom clamp applied to toolbar-driven zoom.
pub const MIN_ZOOM: f32 = 0.1;

/// Upper zoom clamp applied to toolbar-driven zoom.
pub const MAX_ZOOM: f32 = 20.0;

/// Prefix for background preload worker thread names.
pub const PRELOAD_THREAD_PREFIX: &str = "fusebox-preload";
