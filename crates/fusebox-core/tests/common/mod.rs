#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use fusebox_core::config::{PreloadMode, ViewerConfig};
use fusebox_core::fusion::{FusionKey, FusionPrefetchCache, PreloadRequest};
use fusebox_core::orchestrator::{Orchestrator, SessionContext, ViewerListener};
use fusebox_core::series::{RegistrationId, SeriesId, SliceDescriptor};
use fusebox_core::synthetic::SyntheticArchive;
use fusebox_core::viewport::{ViewportAssignments, ViewportId};

pub const PRIMARY: SeriesId = SeriesId(1);
pub const PT: SeriesId = SeriesId(10);
pub const MR: SeriesId = SeriesId(20);
pub const NM: SeriesId = SeriesId(30);

/// Archive with a CT primary and three registered secondaries.
pub fn archive(slices: usize) -> SyntheticArchive {
    SyntheticArchive::new()
        .with_series(PRIMARY, "CT", slices)
        .with_series(PT, "PT", slices)
        .with_series(MR, "MR", slices)
        .with_series(NM, "NM", slices)
        .with_association(PRIMARY, PT, RegistrationId::Explicit("REG-PT".into()))
        .with_association(PRIMARY, MR, RegistrationId::Explicit("REG-MR".into()))
        .with_association(PRIMARY, NM, RegistrationId::Explicit("REG-NM".into()))
        .with_slice_shape(4, 4)
}

pub fn config(mode: PreloadMode) -> ViewerConfig {
    let mut config = ViewerConfig::default();
    config.fusion.preload_mode = mode;
    config
}

pub fn cache(archive: &Arc<SyntheticArchive>, config: &ViewerConfig) -> Arc<FusionPrefetchCache> {
    Arc::new(FusionPrefetchCache::new(archive.clone(), &config.fusion))
}

/// Descriptors in display order, as the orchestrator would hand them over.
pub fn slices(count: usize) -> Arc<[SliceDescriptor]> {
    (0..count)
        .map(|i| SliceDescriptor::new(format!("1.2.3.{}", i + 1), (i + 1) as i32, i as f64 * 2.5))
        .collect()
}

pub fn request(secondary: SeriesId, count: usize) -> PreloadRequest {
    PreloadRequest::new(PRIMARY, secondary, slices(count))
}

pub fn key(secondary: SeriesId) -> FusionKey {
    FusionKey::pair(PRIMARY, secondary)
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Assignments(ViewportAssignments),
    Opacity(f32),
    Zoom(f32),
    LoadError(ViewportId, Option<String>),
}

/// Records every outward notification in order.
#[derive(Clone, Default)]
pub struct Recorder {
    pub events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn zooms(&self) -> Vec<f32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Zoom(z) => Some(z),
                _ => None,
            })
            .collect()
    }

    pub fn load_errors(&self) -> Vec<(ViewportId, Option<String>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::LoadError(id, msg) => Some((id, msg)),
                _ => None,
            })
            .collect()
    }

    pub fn last_assignments(&self) -> Option<ViewportAssignments> {
        self.events().into_iter().rev().find_map(|e| match e {
            Event::Assignments(a) => Some(a),
            _ => None,
        })
    }
}

impl ViewerListener for Recorder {
    fn on_viewport_assignments_change(&mut self, assignments: &ViewportAssignments) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Assignments(assignments.clone()));
    }

    fn on_fusion_opacity_change(&mut self, opacity: f32) {
        self.events.lock().unwrap().push(Event::Opacity(opacity));
    }

    fn on_zoom_change(&mut self, zoom: f32) {
        self.events.lock().unwrap().push(Event::Zoom(zoom));
    }

    fn on_load_error(&mut self, viewport: ViewportId, message: Option<&str>) {
        self.events
            .lock()
            .unwrap()
            .push(Event::LoadError(viewport, message.map(str::to_string)));
    }
}

/// Orchestrator over a synthetic archive, with a recorder attached.
pub fn viewer(
    archive: &Arc<SyntheticArchive>,
    config: ViewerConfig,
) -> (Orchestrator, Recorder) {
    let session = SessionContext::new(config, archive.clone()).unwrap();
    let mut viewer = Orchestrator::new(session, archive.clone(), archive.clone());
    let recorder = Recorder::default();
    viewer.add_listener(Box::new(recorder.clone()));
    (viewer, recorder)
}
