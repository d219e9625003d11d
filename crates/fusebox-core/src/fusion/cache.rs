use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::{FusionConfig, PreloadMode};
use crate::consts::PRELOAD_THREAD_PREFIX;
use crate::error::FuseboxError;
use crate::series::{FusedSlice, RegistrationId, SeriesId, SliceDescriptor};

use super::entry::{EntrySummary, FusionEntry, FusionStatus, SliceState};
use super::key::FusionKey;
use super::policy::ReadyPolicy;
use super::preload::{Listener, PreloadHandle, PreloadOutcome, PreloadRun, ProgressCallback};
use super::source::FusionSource;

/// Everything needed to preload one key.
#[derive(Clone, Debug)]
pub struct PreloadRequest {
    pub primary: SeriesId,
    pub secondary: SeriesId,
    /// The primary's slices in display order.
    pub slices: Arc<[SliceDescriptor]>,
    pub registration: RegistrationId,
}

impl PreloadRequest {
    pub fn new(primary: SeriesId, secondary: SeriesId, slices: Arc<[SliceDescriptor]>) -> Self {
        Self {
            primary,
            secondary,
            slices,
            registration: RegistrationId::Default,
        }
    }

    pub fn with_registration(mut self, registration: RegistrationId) -> Self {
        self.registration = registration;
        self
    }

    pub fn key(&self) -> FusionKey {
        FusionKey::new(self.primary, self.secondary, self.registration.clone())
    }
}

/// Counters for observability and tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub preloads_started: usize,
    pub preloads_attached: usize,
    pub preloads_skipped: usize,
    pub slices_fused: usize,
    pub slices_failed: usize,
    pub evictions: usize,
}

/// One holder of pins on a cache that may be shared between sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PinOwner(u64);

struct CacheInner {
    entries: HashMap<FusionKey, FusionEntry>,
    /// Registration most recently requested for each (primary, secondary).
    active: HashMap<(SeriesId, SeriesId), RegistrationId>,
    /// LRU order: front = oldest, back = most recently used.
    lru: Vec<FusionKey>,
    /// Keys each owner currently shows. A key stays pinned while any owner
    /// lists it.
    pins: HashMap<PinOwner, HashSet<FusionKey>>,
    total_bytes: usize,
    stats: CacheStats,
}

impl CacheInner {
    fn touch(&mut self, key: &FusionKey) {
        self.lru.retain(|k| k != key);
        self.lru.push(key.clone());
    }

    fn is_pinned(&self, key: &FusionKey) -> bool {
        self.pins.values().any(|keys| keys.contains(key))
    }

    fn active_key(&self, primary: SeriesId, secondary: SeriesId) -> Option<FusionKey> {
        self.active
            .get(&(primary, secondary))
            .map(|reg| FusionKey::new(primary, secondary, reg.clone()))
    }

    /// Drop least recently used entries until under budget. In-flight and
    /// pinned entries are never evicted.
    fn evict_to(&mut self, budget: usize) {
        while self.total_bytes > budget {
            let victim = self.lru.iter().position(|k| {
                !self.is_pinned(k)
                    && self.entries.get(k).is_some_and(|e| !e.in_flight())
            });
            let Some(pos) = victim else {
                break;
            };
            let key = self.lru.remove(pos);
            if let Some(entry) = self.entries.remove(&key) {
                self.total_bytes = self.total_bytes.saturating_sub(entry.bytes);
                self.stats.evictions += 1;
                info!(%key, bytes = entry.bytes, "Evicted fusion entry");
            }
            if self.active.get(&(key.primary, key.secondary)) == Some(&key.registration) {
                self.active.remove(&(key.primary, key.secondary));
            }
        }
    }
}

/// Session-wide cache of fused overlays.
///
/// Each key is computed at most once at a time: concurrent requests attach
/// to the running preload. Slices become readable through `get` as soon as
/// they are fused, and stay immutable until the whole entry is evicted.
/// Preloads run to completion regardless of who asked for them.
pub struct FusionPrefetchCache {
    inner: Mutex<CacheInner>,
    source: Arc<dyn FusionSource>,
    policy: ReadyPolicy,
    mode: PreloadMode,
    budget_bytes: Option<usize>,
    next_owner: AtomicU64,
}

impl FusionPrefetchCache {
    pub fn new(source: Arc<dyn FusionSource>, config: &FusionConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                active: HashMap::new(),
                lru: Vec::new(),
                pins: HashMap::new(),
                total_bytes: 0,
                stats: CacheStats::default(),
            }),
            source,
            policy: config.ready_policy(),
            mode: config.preload_mode,
            budget_bytes: config.memory_budget_bytes,
            next_owner: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn policy(&self) -> ReadyPolicy {
        self.policy
    }

    pub fn mode(&self) -> PreloadMode {
        self.mode
    }

    /// Make sure the pair's fused data is (being) computed.
    ///
    /// Joins a running preload for the same key instead of starting another;
    /// the joining callback first receives the current progress. Returns
    /// `AlreadyReady` without calling `on_progress` when the entry already
    /// satisfies the ready policy.
    pub fn preload_fusion_pair(
        self: &Arc<Self>,
        request: PreloadRequest,
        on_progress: Option<ProgressCallback>,
    ) -> PreloadOutcome {
        let key = request.key();
        let listener = on_progress.map(|cb| Arc::new(Listener::new(cb)));

        let run = {
            let mut inner = self.lock();
            inner
                .active
                .insert((key.primary, key.secondary), key.registration.clone());
            inner.touch(&key);

            let entry = inner
                .entries
                .entry(key.clone())
                .or_insert_with(|| FusionEntry::new(request.slices.len()));

            if let Some(run) = entry.run.clone() {
                let replay = listener.map(|l| {
                    entry.listeners.push(l.clone());
                    (l, entry.processed_count(), entry.slices.len())
                });
                inner.stats.preloads_attached += 1;
                drop(inner);
                debug!(%key, "Attached to running preload");
                if let Some((l, loaded, total)) = replay {
                    l.emit(loaded, total);
                }
                return PreloadOutcome::Attached(PreloadHandle::new(run));
            }

            if self.policy.is_satisfied(&entry.summary()) {
                inner.stats.preloads_skipped += 1;
                debug!(%key, "Preload skipped: entry meets the ready policy");
                return PreloadOutcome::AlreadyReady;
            }

            if entry.slices.len() != request.slices.len() {
                warn!(
                    %key,
                    cached = entry.slices.len(),
                    requested = request.slices.len(),
                    "Slice count differs from the cached entry; keeping the cached layout"
                );
            }

            let run = Arc::new(PreloadRun::new(key.clone()));
            entry.reset_failed();
            entry.run = Some(run.clone());
            entry.progress = entry.fraction(entry.processed_count());
            entry.status = FusionStatus::Preloading {
                progress: entry.progress,
            };
            entry.listeners = listener.into_iter().collect();
            inner.stats.preloads_started += 1;
            run
        };

        info!(%key, slices = request.slices.len(), mode = %self.mode, "Starting fusion preload");
        let handle = PreloadHandle::new(run.clone());

        match self.mode {
            PreloadMode::Inline => self.run_preload(&key, &request.slices, &run),
            PreloadMode::Background => {
                let cache = Arc::clone(self);
                let slices = Arc::clone(&request.slices);
                let thread_key = key.clone();
                let thread_run = run.clone();
                let spawned = std::thread::Builder::new()
                    .name(format!(
                        "{PRELOAD_THREAD_PREFIX}-{}-{}",
                        key.primary.0, key.secondary.0
                    ))
                    .spawn(move || cache.run_preload(&thread_key, &slices, &thread_run));
                if let Err(e) = spawned {
                    warn!(%key, error = %e, "Failed to spawn preload thread, running inline");
                    self.run_preload(&key, &request.slices, &run);
                }
            }
        }

        PreloadOutcome::Started(handle)
    }

    fn run_preload(&self, key: &FusionKey, slices: &[SliceDescriptor], run: &PreloadRun) {
        let metadata = match self.source.secondary_metadata(key.secondary) {
            Ok(m) => m,
            Err(e) => {
                let err = FuseboxError::FusionPreload {
                    key: key.clone(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Fusion preload aborted");
                self.finish(key, run, FusionStatus::Error(e.to_string()));
                return;
            }
        };

        let (pending, total) = {
            let inner = self.lock();
            match inner.entries.get(key) {
                Some(entry) => (entry.pending_indices(), entry.slices.len()),
                None => (Vec::new(), 0),
            }
        };

        for index in pending {
            let result = match slices.get(index) {
                Some(descriptor) => {
                    self.source
                        .fuse_slice(key, &metadata, descriptor, index)
                }
                None => Err(FuseboxError::SliceFusion {
                    key: key.clone(),
                    index,
                    reason: "no slice descriptor".into(),
                }),
            };

            let (listeners, loaded) = {
                let mut inner = self.lock();
                let inner = &mut *inner;
                let Some(entry) = inner.entries.get_mut(key) else {
                    break;
                };
                match result {
                    Ok(slice) => {
                        let bytes = slice.byte_len();
                        entry.slices[index] = SliceState::Fused(Arc::new(slice));
                        entry.bytes += bytes;
                        inner.total_bytes += bytes;
                        inner.stats.slices_fused += 1;
                    }
                    Err(e) => {
                        warn!(%key, index, error = %e, "Slice fusion failed");
                        entry.slices[index] = SliceState::Failed(e.to_string());
                        inner.stats.slices_failed += 1;
                    }
                }
                let loaded = entry.processed_count();
                entry.progress = entry.fraction(loaded).max(entry.progress);
                entry.status = FusionStatus::Preloading {
                    progress: entry.progress,
                };
                (entry.listeners.clone(), loaded)
            };

            for listener in &listeners {
                listener.emit(loaded, total);
            }
        }

        let status = {
            let inner = self.lock();
            match inner.entries.get(key) {
                Some(entry) if entry.fused_count() == 0 && !entry.slices.is_empty() => {
                    FusionStatus::Error("no slice could be fused".into())
                }
                _ => FusionStatus::Ready,
            }
        };
        self.finish(key, run, status);
    }

    fn finish(&self, key: &FusionKey, run: &PreloadRun, status: FusionStatus) {
        {
            let mut inner = self.lock();
            if let Some(entry) = inner.entries.get_mut(key) {
                entry.status = status.clone();
                entry.run = None;
                entry.listeners.clear();
                let summary = entry.summary();
                info!(
                    %key,
                    fused = summary.fused,
                    failed = summary.failed,
                    status = %status,
                    "Fusion preload finished"
                );
            }
            if let Some(budget) = self.budget_bytes {
                inner.evict_to(budget);
            }
        }
        run.complete(status);
    }

    /// Fused slice for render time. A miss is not an error: the caller
    /// falls back to primary-only display.
    pub fn get(
        &self,
        primary: SeriesId,
        secondary: SeriesId,
        slice_index: usize,
    ) -> Option<Arc<FusedSlice>> {
        let key = self.lock().active_key(primary, secondary)?;
        self.get_key(&key, slice_index)
    }

    /// Fused slice under an exact key, whatever registration other callers
    /// requested last.
    pub fn get_key(&self, key: &FusionKey, slice_index: usize) -> Option<Arc<FusedSlice>> {
        let mut inner = self.lock();
        let slice = match inner.entries.get(key)?.slices.get(slice_index)? {
            SliceState::Fused(slice) => Arc::clone(slice),
            _ => return None,
        };
        inner.touch(key);
        Some(slice)
    }

    pub fn is_preloading(&self, primary: SeriesId, secondary: SeriesId) -> bool {
        let inner = self.lock();
        inner
            .active_key(primary, secondary)
            .and_then(|k| inner.entries.get(&k))
            .is_some_and(|e| e.in_flight())
    }

    /// Last known completion fraction in [0, 1]; 0 if never started.
    pub fn progress(&self, primary: SeriesId, secondary: SeriesId) -> f32 {
        let inner = self.lock();
        inner
            .active_key(primary, secondary)
            .and_then(|k| inner.entries.get(&k))
            .map_or(0.0, |e| e.progress)
    }

    pub fn status(&self, key: &FusionKey) -> FusionStatus {
        self.lock()
            .entries
            .get(key)
            .map_or(FusionStatus::NotStarted, |e| e.status.clone())
    }

    /// Status of the pair under its most recently requested registration.
    pub fn pair_status(&self, primary: SeriesId, secondary: SeriesId) -> FusionStatus {
        let inner = self.lock();
        inner
            .active_key(primary, secondary)
            .and_then(|k| inner.entries.get(&k))
            .map_or(FusionStatus::NotStarted, |e| e.status.clone())
    }

    pub fn summary(&self, key: &FusionKey) -> Option<EntrySummary> {
        self.lock().entries.get(key).map(|e| e.summary())
    }

    /// Failure reason recorded for one slice, if it failed.
    pub fn slice_error(&self, key: &FusionKey, slice_index: usize) -> Option<String> {
        match self.lock().entries.get(key)?.slices.get(slice_index)? {
            SliceState::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Whether a request for `key` would start new work.
    pub fn needs_preload(&self, key: &FusionKey) -> bool {
        match self.lock().entries.get(key) {
            None => true,
            Some(e) if e.in_flight() => false,
            Some(e) => !self.policy.is_satisfied(&e.summary()),
        }
    }

    pub fn register_pin_owner(&self) -> PinOwner {
        PinOwner(self.next_owner.fetch_add(1, Ordering::Relaxed))
    }

    /// Replace the keys `owner` shows. Keys no owner lists any more become
    /// eligible for eviction.
    pub fn set_pinned(&self, owner: PinOwner, keys: impl IntoIterator<Item = FusionKey>) {
        let mut inner = self.lock();
        let keys: HashSet<FusionKey> = keys.into_iter().collect();
        if keys.is_empty() {
            inner.pins.remove(&owner);
        } else {
            inner.pins.insert(owner, keys);
        }
        if let Some(budget) = self.budget_bytes {
            inner.evict_to(budget);
        }
    }

    /// Drop every pin held by `owner`.
    pub fn release_pins(&self, owner: PinOwner) {
        self.set_pinned(owner, std::iter::empty());
    }

    /// Drop every finished entry no owner pins.
    pub fn evict_unpinned(&self) -> usize {
        let mut inner = self.lock();
        let before = inner.stats.evictions;
        inner.evict_to(0);
        inner.stats.evictions - before
    }

    pub fn total_bytes(&self) -> usize {
        self.lock().total_bytes
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn contains(&self, key: &FusionKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }
}
