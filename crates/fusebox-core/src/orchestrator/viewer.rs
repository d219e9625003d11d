use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::consts::{MAX_ZOOM, MIN_ZOOM};
use crate::error::{FuseboxError, Result};
use crate::fusion::{
    FusionKey, FusionPrefetchCache, FusionStatus, PinOwner, PreloadHandle, PreloadRequest,
    ProgressCallback,
};
use crate::series::{sort_slices, FusedSlice, RegistrationId, SeriesId, SliceDescriptor};
use crate::sync::{SyncEngine, SyncPatch, SyncState, UpdateOptions};
use crate::viewport::{
    LayoutPreset, ViewportAssignments, ViewportConfig, ViewportId, ViewportRegistry,
};

use super::events::{FusionDisplay, ViewerListener};
use super::session::SessionContext;
use super::sources::{ImageSource, RegistrationAssociation, RegistrationCatalog};

/// Notified with `(key, loaded, total)` for every preload the orchestrator
/// starts.
pub type PreloadObserver = Arc<dyn Fn(&FusionKey, usize, usize) + Send + Sync>;

/// The primary series every viewport displays.
#[derive(Clone, Debug)]
pub struct PrimarySeries {
    pub id: SeriesId,
    /// Sorted along the slice normal.
    pub slices: Arc<[SliceDescriptor]>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum OrchestratorPhase {
    #[default]
    Idle,
    LoadingPrimary,
    Ready,
    /// The primary could not be loaded; nothing can render.
    Failed(String),
}

impl fmt::Display for OrchestratorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::LoadingPrimary => write!(f, "Loading primary"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed(reason) => write!(f, "Failed: {reason}"),
        }
    }
}

/// Owns the viewport list and wires it to the session's sync engine and
/// fusion cache.
pub struct Orchestrator {
    session: SessionContext,
    images: Arc<dyn ImageSource>,
    catalog: Arc<dyn RegistrationCatalog>,
    registry: ViewportRegistry,
    layout: LayoutPreset,
    primary: Option<PrimarySeries>,
    phase: OrchestratorPhase,
    associations: Vec<RegistrationAssociation>,
    default_secondary: Option<SeriesId>,
    opacity: f32,
    reported_zoom: f32,
    listeners: Vec<Box<dyn ViewerListener>>,
    preload_observer: Option<PreloadObserver>,
    preloads: HashMap<FusionKey, PreloadHandle>,
    /// Pins this orchestrator holds on the session cache.
    pin_owner: PinOwner,
}

impl Orchestrator {
    pub fn new(
        session: SessionContext,
        images: Arc<dyn ImageSource>,
        catalog: Arc<dyn RegistrationCatalog>,
    ) -> Self {
        let registry = ViewportRegistry::new(session.config.layout.max_viewports);
        let layout = session.config.layout.initial;
        let opacity = session.config.fusion.opacity;
        let reported_zoom = session.sync.state().zoom;
        let pin_owner = session.cache.register_pin_owner();
        Self {
            session,
            images,
            catalog,
            registry,
            layout,
            primary: None,
            phase: OrchestratorPhase::Idle,
            associations: Vec::new(),
            default_secondary: None,
            opacity,
            reported_zoom,
            listeners: Vec::new(),
            preload_observer: None,
            preloads: HashMap::new(),
            pin_owner,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn ViewerListener>) {
        self.listeners.push(listener);
    }

    pub fn set_preload_observer(&mut self, observer: Option<PreloadObserver>) {
        self.preload_observer = observer;
    }

    pub fn phase(&self) -> &OrchestratorPhase {
        &self.phase
    }

    pub fn primary(&self) -> Option<&PrimarySeries> {
        self.primary.as_ref()
    }

    pub fn layout(&self) -> LayoutPreset {
        self.layout
    }

    pub fn viewports(&self) -> &[ViewportConfig] {
        self.registry.slots()
    }

    pub fn viewport(&self, id: ViewportId) -> Option<&ViewportConfig> {
        self.registry.get(id)
    }

    pub fn assignments(&self) -> ViewportAssignments {
        self.registry.assignments()
    }

    pub fn associations(&self) -> &[RegistrationAssociation] {
        &self.associations
    }

    pub fn cache(&self) -> &Arc<FusionPrefetchCache> {
        &self.session.cache
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.session.sync
    }

    pub fn sync_mut(&mut self) -> &mut SyncEngine {
        &mut self.session.sync
    }

    /// Secondaries eligible for fusion, in catalog order.
    pub fn secondary_candidates(&self) -> Vec<SeriesId> {
        self.associations.iter().map(|a| a.secondary).collect()
    }

    /// Externally selected secondary used when no candidate is free.
    pub fn set_default_secondary(&mut self, secondary: Option<SeriesId>) {
        self.default_secondary = secondary;
    }

    /// Load the primary's slice list. Failure is fatal for the layout: the
    /// orchestrator enters `Failed` and no viewport can render.
    pub fn load_primary(&mut self, series: SeriesId) -> Result<()> {
        self.phase = OrchestratorPhase::LoadingPrimary;
        info!(%series, "Loading primary series");

        let mut slices = match self.images.load_series(series) {
            Ok(s) if s.is_empty() => {
                return Err(self.fail_primary(series, "series has no slices".into()));
            }
            Ok(s) => s,
            Err(e) => return Err(self.fail_primary(series, e.to_string())),
        };
        sort_slices(&mut slices);
        self.session.sync.set_slice_count(slices.len());

        self.associations = match self.catalog.associations(series) {
            Ok(a) => a,
            Err(e) => {
                warn!(%series, error = %e, "Registration catalog unavailable, no fusion candidates");
                Vec::new()
            }
        };

        info!(
            %series,
            slices = slices.len(),
            secondaries = self.associations.len(),
            "Primary series loaded"
        );
        self.primary = Some(PrimarySeries {
            id: series,
            slices: slices.into(),
        });
        self.phase = OrchestratorPhase::Ready;

        let candidates = self.secondary_candidates();
        self.registry
            .apply_preset(self.layout, &candidates, self.default_secondary);
        self.after_mutation();
        Ok(())
    }

    /// Layout mutations are refused while the primary is unavailable.
    fn layout_blocked(&self, operation: &'static str) -> bool {
        match &self.phase {
            OrchestratorPhase::Failed(reason) => {
                warn!(operation, %reason, "Layout blocked by primary failure");
                true
            }
            _ => false,
        }
    }

    fn fail_primary(&mut self, series: SeriesId, reason: String) -> FuseboxError {
        warn!(%series, %reason, "Primary series unavailable");
        self.phase = OrchestratorPhase::Failed(reason.clone());
        FuseboxError::PrimarySeriesUnavailable { series, reason }
    }

    pub fn apply_layout(&mut self, preset: LayoutPreset) {
        if self.layout_blocked("apply_layout") {
            return;
        }
        let candidates = self.secondary_candidates();
        let removed = self
            .registry
            .apply_preset(preset, &candidates, self.default_secondary);
        for id in removed {
            self.session.sync.unsubscribe(id);
        }
        self.layout = preset;
        info!(layout = %preset, slots = self.registry.len(), "Layout changed");
        self.after_mutation();
    }

    pub fn add_viewport(&mut self) -> Option<ViewportId> {
        if self.layout_blocked("add_viewport") {
            return None;
        }
        let candidates = self.secondary_candidates();
        let id = self
            .registry
            .add_viewport(&candidates, self.default_secondary)?;
        self.after_slot_count_change();
        Some(id)
    }

    pub fn add_viewport_with_secondary(&mut self, secondary: SeriesId) -> Option<ViewportId> {
        if self.layout_blocked("add_viewport_with_secondary") {
            return None;
        }
        let id = self.registry.add_viewport_with_secondary(secondary)?;
        self.after_slot_count_change();
        Some(id)
    }

    /// Remove a non-primary slot. Its in-flight preload keeps running.
    pub fn remove_viewport(&mut self, id: ViewportId) -> bool {
        if self.layout_blocked("remove_viewport") || !self.registry.remove_viewport(id) {
            return false;
        }
        self.session.sync.unsubscribe(id);
        self.after_slot_count_change();
        true
    }

    pub fn swap(&mut self) -> bool {
        if self.layout_blocked("swap") || !self.registry.swap() {
            return false;
        }
        self.after_mutation();
        true
    }

    /// Reassign a slot's secondary. The old pair's cache entry is left alone
    /// since other slots may still show it.
    pub fn change_secondary(
        &mut self,
        id: ViewportId,
        secondary: Option<SeriesId>,
    ) -> Result<bool> {
        if self.layout_blocked("change_secondary") {
            return Ok(false);
        }
        let had_error = self.registry.get(id).is_some_and(|s| s.load_error.is_some());
        let changed = self.registry.change_secondary(id, secondary)?;
        if changed {
            if had_error {
                self.emit_load_error(id, None);
            }
            self.after_mutation();
        }
        Ok(changed)
    }

    pub fn toggle_structures(&mut self, id: ViewportId) -> Result<bool> {
        let slot = self.registry.require_mut(id)?;
        slot.show_structures = !slot.show_structures;
        Ok(slot.show_structures)
    }

    pub fn toggle_mpr(&mut self, id: ViewportId) -> Result<bool> {
        let slot = self.registry.require_mut(id)?;
        slot.show_mpr = !slot.show_mpr;
        Ok(slot.show_mpr)
    }

    /// Fetch the images a slot needs. Fetch failures become the slot's load
    /// error rather than an `Err`; only an unknown viewport is an error.
    pub fn load_viewport_images(&mut self, id: ViewportId) -> Result<()> {
        let slot = self.registry.require_mut(id)?;
        slot.begin_loading();
        let secondary = slot.secondary_series_id;

        if self.primary.is_none() {
            self.report_load_error(id, "primary series not loaded")?;
            return Ok(());
        }
        match secondary.map(|s| self.images.load_series(s)) {
            Some(Err(e)) => self.report_load_error(id, e.to_string()),
            _ => self.report_images_loaded(id),
        }
    }

    pub fn report_images_loaded(&mut self, id: ViewportId) -> Result<()> {
        let slot = self.registry.require_mut(id)?;
        slot.mark_ready();
        debug!(viewport = %id, "Viewport images loaded");
        Ok(())
    }

    /// Record an image-load failure on one slot. Siblings and the cache are
    /// unaffected.
    pub fn report_load_error(&mut self, id: ViewportId, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        let slot = self.registry.require_mut(id)?;
        slot.mark_error(message.clone());
        let err = FuseboxError::ImageLoad {
            viewport: id,
            message: message.clone(),
        };
        warn!(error = %err, "Viewport failed to load");
        self.emit_load_error(id, Some(&message));
        Ok(())
    }

    /// Clear a slot's error and load it again with a new render key.
    pub fn retry(&mut self, id: ViewportId) -> Result<()> {
        let slot = self.registry.require_mut(id)?;
        slot.retry();
        info!(viewport = %id, attempt = slot.retry_count, "Retrying viewport load");
        self.emit_load_error(id, None);
        self.load_viewport_images(id)
    }

    fn emit_load_error(&mut self, id: ViewportId, message: Option<&str>) {
        for listener in self.listeners.iter_mut() {
            listener.on_load_error(id, message);
        }
    }

    /// Cache key the orchestrator uses for a secondary on the current primary.
    pub fn fusion_key_for(&self, secondary: SeriesId) -> Option<FusionKey> {
        let primary = self.primary.as_ref()?;
        let registration = self
            .associations
            .iter()
            .find(|a| a.secondary == secondary)
            .map_or(RegistrationId::Default, |a| a.registration.clone());
        Some(FusionKey::new(primary.id, secondary, registration))
    }

    pub fn viewport_fusion(&self, id: ViewportId) -> Option<FusionDisplay> {
        let slot = self.registry.get(id)?;
        let Some(secondary) = slot.secondary_series_id else {
            return Some(FusionDisplay::PrimaryOnly);
        };
        let Some(key) = self.fusion_key_for(secondary) else {
            return Some(FusionDisplay::Loading { progress: 0.0 });
        };
        let display = match self.session.cache.status(&key) {
            FusionStatus::NotStarted => FusionDisplay::Loading { progress: 0.0 },
            FusionStatus::Preloading { progress } => FusionDisplay::Loading { progress },
            FusionStatus::Ready => FusionDisplay::Fused,
            FusionStatus::Error(reason) => FusionDisplay::Degraded(reason),
        };
        Some(display)
    }

    /// Fused overlay for a slot at `slice_index`, if it is available yet.
    pub fn fused_slice(&self, id: ViewportId, slice_index: usize) -> Option<Arc<FusedSlice>> {
        let secondary = self.registry.get(id)?.secondary_series_id?;
        let key = self.fusion_key_for(secondary)?;
        self.session.cache.get_key(&key, slice_index)
    }

    pub fn fusion_opacity(&self) -> f32 {
        self.opacity
    }

    /// Set the overlay opacity (clamped to [0, 1]) and tell listeners if it
    /// changed.
    pub fn set_fusion_opacity(&mut self, opacity: f32) -> f32 {
        let opacity = if opacity.is_finite() {
            opacity.clamp(0.0, 1.0)
        } else {
            self.opacity
        };
        if opacity != self.opacity {
            self.opacity = opacity;
            for listener in self.listeners.iter_mut() {
                listener.on_fusion_opacity_change(opacity);
            }
        }
        self.opacity
    }

    /// Accept a zoom driven by the external toolbar. It is applied to every
    /// locked viewport but not echoed back through `on_zoom_change`.
    pub fn set_zoom_from_toolbar(&mut self, zoom: f32) -> Result<()> {
        if !zoom.is_finite() {
            return Err(FuseboxError::InvalidSyncValue { field: "zoom", value: zoom });
        }
        let zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        let state = SyncState {
            zoom,
            ..*self.session.sync.state()
        };
        self.session.sync.set_state(state)?;
        self.reported_zoom = zoom;
        Ok(())
    }

    /// Route an interaction through the sync engine and relay reconciled
    /// zoom changes outward.
    pub fn interact(
        &mut self,
        source: ViewportId,
        patch: SyncPatch,
        options: UpdateOptions,
    ) -> Result<()> {
        self.interact_at(source, patch, options, Instant::now())
    }

    pub fn interact_at(
        &mut self,
        source: ViewportId,
        patch: SyncPatch,
        options: UpdateOptions,
        now: Instant,
    ) -> Result<()> {
        if self.registry.get(source).is_none() {
            return Err(FuseboxError::UnknownViewport(source));
        }
        if let Some(state) = self.session.sync.update_at(source, patch, options, now)? {
            self.relay_reconciled(&state);
        }
        Ok(())
    }

    /// Drive the settle rule; call once per frame.
    pub fn tick(&mut self, now: Instant) {
        if let Some(state) = self.session.sync.poll_settle(now) {
            self.relay_reconciled(&state);
        }
    }

    fn relay_reconciled(&mut self, state: &SyncState) {
        if state.zoom != self.reported_zoom {
            self.reported_zoom = state.zoom;
            for listener in self.listeners.iter_mut() {
                listener.on_zoom_change(state.zoom);
            }
        }
    }

    /// Block until every preload this orchestrator started has finished.
    pub fn wait_for_preloads(&mut self) -> Vec<(FusionKey, FusionStatus)> {
        let mut finished: Vec<(FusionKey, FusionStatus)> = self
            .preloads
            .drain()
            .map(|(key, handle)| (key, handle.wait()))
            .collect();
        finished.sort_by_key(|(key, _)| key.secondary);
        finished
    }

    fn after_slot_count_change(&mut self) {
        if let Some(preset) = LayoutPreset::for_slot_count(self.registry.len()) {
            self.layout = preset;
        }
        self.after_mutation();
    }

    /// Publish assignments, pin what is on screen, and preload new pairs.
    fn after_mutation(&mut self) {
        let assignments = self.registry.assignments();
        debug!(?assignments, "Viewport assignments changed");
        for listener in self.listeners.iter_mut() {
            listener.on_viewport_assignments_change(&assignments);
        }

        let Some(primary) = self.primary.clone() else {
            return;
        };
        let keys: Vec<FusionKey> = self
            .registry
            .referenced_secondaries()
            .into_iter()
            .filter_map(|s| self.fusion_key_for(s))
            .collect();
        self.session.cache.set_pinned(self.pin_owner, keys.iter().cloned());
        self.preloads.retain(|_, handle| !handle.is_finished());

        for key in keys {
            if !self.session.cache.needs_preload(&key) {
                continue;
            }
            let request = PreloadRequest::new(primary.id, key.secondary, Arc::clone(&primary.slices))
                .with_registration(key.registration.clone());
            let callback = self.preload_observer.clone().map(|observer| {
                let key = key.clone();
                Arc::new(move |loaded: usize, total: usize| observer(&key, loaded, total)) as ProgressCallback
            });
            if let Some(handle) = self
                .session
                .cache
                .preload_fusion_pair(request, callback)
                .handle()
            {
                self.preloads.insert(key, handle.clone());
            }
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.session.cache.release_pins(self.pin_owner);
    }
}
