use std::sync::Arc;

use crate::config::ViewerConfig;
use crate::error::Result;
use crate::fusion::{FusionPrefetchCache, FusionSource};
use crate::sync::{SyncEngine, SyncState};

/// Shared state of one viewing session, injected into the orchestrator.
///
/// The cache is reference-counted so it can outlive a layout session and be
/// shared with other sessions on the same primary.
pub struct SessionContext {
    pub config: ViewerConfig,
    pub cache: Arc<FusionPrefetchCache>,
    pub sync: SyncEngine,
}

impl SessionContext {
    pub fn new(config: ViewerConfig, fusion: Arc<dyn FusionSource>) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(FusionPrefetchCache::new(fusion, &config.fusion));
        Ok(Self::assemble(config, cache))
    }

    /// Build a session around an existing cache.
    pub fn with_cache(config: ViewerConfig, cache: Arc<FusionPrefetchCache>) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, cache))
    }

    fn assemble(config: ViewerConfig, cache: Arc<FusionPrefetchCache>) -> Self {
        let sync = SyncEngine::new(SyncState::default(), config.sync.settle_window());
        Self {
            config,
            cache,
            sync,
        }
    }
}
