use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use super::entry::FusionStatus;
use super::key::FusionKey;

/// Progress observer: `(loaded, total)` slices.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// A progress callback attached to one preload run. Never reports a lower
/// `loaded` than it already reported.
pub(super) struct Listener {
    callback: ProgressCallback,
    last: AtomicUsize,
}

impl Listener {
    pub(super) fn new(callback: ProgressCallback) -> Self {
        Self {
            callback,
            last: AtomicUsize::new(0),
        }
    }

    pub(super) fn emit(&self, loaded: usize, total: usize) {
        let prev = self.last.fetch_max(loaded, Ordering::AcqRel);
        if loaded >= prev {
            (self.callback)(loaded, total);
        }
    }
}

/// Completion state shared between a running preload and its handles.
pub(super) struct PreloadRun {
    key: FusionKey,
    outcome: Mutex<Option<FusionStatus>>,
    done: Condvar,
}

impl PreloadRun {
    pub(super) fn new(key: FusionKey) -> Self {
        Self {
            key,
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    pub(super) fn complete(&self, status: FusionStatus) {
        let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        *outcome = Some(status);
        self.done.notify_all();
    }
}

/// Handle on an in-flight (or finished) preload. Cloning is cheap; every
/// requester attached to the same key holds a handle on the same run.
#[derive(Clone)]
pub struct PreloadHandle {
    run: Arc<PreloadRun>,
}

impl PreloadHandle {
    pub(super) fn new(run: Arc<PreloadRun>) -> Self {
        Self { run }
    }

    pub fn key(&self) -> &FusionKey {
        &self.run.key
    }

    pub fn is_finished(&self) -> bool {
        self.run
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Block until the run finishes and return the key's final status.
    pub fn wait(&self) -> FusionStatus {
        let mut outcome = self.run.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(status) = outcome.as_ref() {
                return status.clone();
            }
            outcome = self
                .run
                .done
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `wait`, giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<FusionStatus> {
        let outcome = self.run.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        let (outcome, _) = self
            .run
            .done
            .wait_timeout_while(outcome, timeout, |o| o.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        outcome.clone()
    }

    /// Whether two handles observe the same underlying run.
    pub fn same_run(&self, other: &PreloadHandle) -> bool {
        Arc::ptr_eq(&self.run, &other.run)
    }
}

/// Result of a `preload_fusion_pair` call.
#[derive(Clone)]
pub enum PreloadOutcome {
    /// This call started the key's preload.
    Started(PreloadHandle),
    /// A preload for the key was already running; the caller joined it.
    Attached(PreloadHandle),
    /// The key is complete enough; nothing was run.
    AlreadyReady,
}

impl PreloadOutcome {
    pub fn handle(&self) -> Option<&PreloadHandle> {
        match self {
            Self::Started(h) | Self::Attached(h) => Some(h),
            Self::AlreadyReady => None,
        }
    }

    /// Wait for the run if there is one. `AlreadyReady` returns `Ready`.
    pub fn wait(&self) -> FusionStatus {
        match self.handle() {
            Some(h) => h.wait(),
            None => FusionStatus::Ready,
        }
    }
}
