use crate::error::Result;
use crate::series::{FusedSlice, SeriesId, SeriesMetadata, SliceDescriptor};

use super::key::FusionKey;

/// Registration + resampling collaborator that produces fused slices.
///
/// Implementations may block; the cache never holds its lock while calling
/// into them.
pub trait FusionSource: Send + Sync {
    /// Fetch what the secondary series needs before any slice can be fused.
    /// A failure here fails the whole key.
    fn secondary_metadata(&self, secondary: SeriesId) -> Result<SeriesMetadata>;

    /// Resample the secondary onto primary slice `index`. A failure only
    /// affects that slice.
    fn fuse_slice(
        &self,
        key: &FusionKey,
        metadata: &SeriesMetadata,
        descriptor: &SliceDescriptor,
        index: usize,
    ) -> Result<FusedSlice>;
}
