mod cache;
mod entry;
mod key;
mod policy;
mod preload;
mod source;

pub use cache::{CacheStats, FusionPrefetchCache, PinOwner, PreloadRequest};
pub use entry::{EntrySummary, FusionStatus, SliceState};
pub use key::FusionKey;
pub use policy::{ReadyBasis, ReadyPolicy};
pub use preload::{PreloadHandle, PreloadOutcome, ProgressCallback};
pub use source::FusionSource;
