use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::Result;
use crate::viewport::ViewportId;

use super::state::{SyncPatch, SyncState};

/// Hot-path listener of one viewport. Receives every applied update in order.
pub type SyncCallback = Box<dyn FnMut(&SyncState) + Send>;

/// Receives the cold snapshot whenever the engine reconciles.
pub type ReconcileCallback = Box<dyn FnMut(&SyncState) + Send>;

/// How an update should be reconciled into the cold snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateKind {
    /// Part of a drag/scroll burst: reconcile after the settle window.
    #[default]
    Continuous,
    /// A single discrete action (button, menu): reconcile immediately.
    Discrete,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Do not notify the viewport that originated the update.
    pub skip_source: bool,
    pub kind: UpdateKind,
}

impl UpdateOptions {
    pub fn continuous() -> Self {
        Self::default()
    }

    pub fn discrete() -> Self {
        Self {
            skip_source: false,
            kind: UpdateKind::Discrete,
        }
    }

    pub fn skipping_source(mut self) -> Self {
        self.skip_source = true;
        self
    }
}

struct Subscriber {
    viewport: ViewportId,
    locked: bool,
    callback: SyncCallback,
}

/// Two-tier navigation state shared by all viewports of a layout session.
///
/// The hot tier is written by `update()` and pushed synchronously to every
/// locked subscriber; last write wins. The cold tier is a reconciled
/// snapshot for consumers outside the render path. It catches up with the
/// hot tier immediately for discrete updates and once no continuous update
/// has arrived for `settle_window`.
pub struct SyncEngine {
    hot: SyncState,
    cold: SyncState,
    subscribers: Vec<Subscriber>,
    reconcile: Option<ReconcileCallback>,
    settle_window: Duration,
    /// Time of the last continuous update not yet reconciled.
    pending_since: Option<Instant>,
    slice_count: Option<usize>,
}

impl SyncEngine {
    pub fn new(initial: SyncState, settle_window: Duration) -> Self {
        Self {
            hot: initial,
            cold: initial,
            subscribers: Vec::new(),
            reconcile: None,
            settle_window,
            pending_since: None,
            slice_count: None,
        }
    }

    /// Hot-tier state, as the renderer sees it.
    pub fn state(&self) -> &SyncState {
        &self.hot
    }

    /// Last reconciled snapshot.
    pub fn snapshot(&self) -> &SyncState {
        &self.cold
    }

    pub fn settle_window(&self) -> Duration {
        self.settle_window
    }

    pub fn has_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    pub fn set_reconcile_callback(&mut self, callback: Option<ReconcileCallback>) {
        self.reconcile = callback;
    }

    /// Register a viewport's hot-path listener. It is locked by default and
    /// immediately receives the current state. Re-subscribing replaces the
    /// previous callback.
    pub fn subscribe(&mut self, viewport: ViewportId, mut callback: SyncCallback) {
        callback(&self.hot);
        if let Some(existing) = self.subscribers.iter_mut().find(|s| s.viewport == viewport) {
            existing.callback = callback;
            existing.locked = true;
            return;
        }
        self.subscribers.push(Subscriber {
            viewport,
            locked: true,
            callback,
        });
    }

    pub fn unsubscribe(&mut self, viewport: ViewportId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.viewport != viewport);
        self.subscribers.len() != before
    }

    pub fn is_subscribed(&self, viewport: ViewportId) -> bool {
        self.subscribers.iter().any(|s| s.viewport == viewport)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Unlocked viewports keep their subscription but stop following shared
    /// navigation. Relocking pushes the current state to them.
    pub fn set_locked(&mut self, viewport: ViewportId, locked: bool) -> bool {
        let Some(sub) = self.subscribers.iter_mut().find(|s| s.viewport == viewport) else {
            return false;
        };
        if locked && !sub.locked {
            (sub.callback)(&self.hot);
        }
        sub.locked = locked;
        true
    }

    pub fn is_locked(&self, viewport: ViewportId) -> bool {
        self.subscribers
            .iter()
            .any(|s| s.viewport == viewport && s.locked)
    }

    /// Tell the engine how many slices the primary has; `current_index` is
    /// clamped into range from now on.
    pub fn set_slice_count(&mut self, count: usize) {
        self.slice_count = Some(count);
        let clamped = self.clamp_index(self.hot.current_index);
        if clamped != self.hot.current_index {
            self.hot.current_index = clamped;
            self.cold.current_index = self.clamp_index(self.cold.current_index);
            self.notify(None);
        }
    }

    fn clamp_index(&self, index: usize) -> usize {
        match self.slice_count {
            Some(0) => 0,
            Some(n) => index.min(n - 1),
            None => index,
        }
    }

    /// Apply an interaction from `source` at the current time.
    ///
    /// Returns the reconciled snapshot when this call caused a reconcile.
    pub fn update(
        &mut self,
        source: ViewportId,
        patch: SyncPatch,
        options: UpdateOptions,
    ) -> Result<Option<SyncState>> {
        self.update_at(source, patch, options, Instant::now())
    }

    /// Same as `update`, with an explicit clock for the settle rule.
    pub fn update_at(
        &mut self,
        source: ViewportId,
        mut patch: SyncPatch,
        options: UpdateOptions,
        now: Instant,
    ) -> Result<Option<SyncState>> {
        patch.validate()?;
        if let Some(index) = patch.current_index {
            patch.current_index = Some(self.clamp_index(index));
        }

        self.hot.merge(&patch);
        trace!(viewport = %source, ?patch, "Sync update applied");

        let skip = options.skip_source.then_some(source);
        self.notify(skip);

        match options.kind {
            UpdateKind::Discrete => Ok(Some(self.reconcile_now())),
            UpdateKind::Continuous => {
                self.pending_since = Some(now);
                Ok(None)
            }
        }
    }

    /// Reconcile if the settle window has elapsed since the last continuous
    /// update. Hosts call this from their frame/tick loop.
    pub fn poll_settle(&mut self, now: Instant) -> Option<SyncState> {
        let since = self.pending_since?;
        if now.saturating_duration_since(since) >= self.settle_window {
            Some(self.reconcile_now())
        } else {
            None
        }
    }

    /// Reconcile any pending burst right away.
    pub fn flush(&mut self) -> Option<SyncState> {
        self.pending_since?;
        Some(self.reconcile_now())
    }

    /// Replace both tiers with an externally driven state and push it to
    /// every locked subscriber. The reconcile callback is not fired, since
    /// the value did not originate from an interaction.
    pub fn set_state(&mut self, state: SyncState) -> Result<()> {
        state.validate()?;
        let mut state = state;
        state.current_index = self.clamp_index(state.current_index);
        self.hot = state;
        self.cold = state;
        self.pending_since = None;
        self.notify(None);
        Ok(())
    }

    fn notify(&mut self, skip: Option<ViewportId>) {
        let hot = &self.hot;
        for sub in self.subscribers.iter_mut() {
            if !sub.locked || Some(sub.viewport) == skip {
                continue;
            }
            (sub.callback)(hot);
        }
    }

    fn reconcile_now(&mut self) -> SyncState {
        self.cold = self.hot;
        self.pending_since = None;
        debug!(
            index = self.cold.current_index,
            zoom = self.cold.zoom,
            "Sync state reconciled"
        );
        if let Some(cb) = self.reconcile.as_mut() {
            cb(&self.cold);
        }
        self.cold
    }
}
