mod common;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use fusebox_core::config::{PreloadMode, ViewerConfig};
use fusebox_core::error::FuseboxError;
use fusebox_core::fusion::{FusionKey, FusionPrefetchCache, FusionStatus};
use fusebox_core::orchestrator::{
    FusionDisplay, Orchestrator, OrchestratorPhase, PreloadObserver, SessionContext,
};
use fusebox_core::series::{RegistrationId, SeriesId};
use fusebox_core::synthetic::SyntheticArchive;
use fusebox_core::sync::{SyncPatch, SyncState, UpdateOptions};
use fusebox_core::viewport::{LayoutPreset, ViewportId, ViewportPhase};

use common::*;

fn pt_key() -> FusionKey {
    FusionKey::new(PRIMARY, PT, RegistrationId::Explicit("REG-PT".into()))
}

// ---------------------------------------------------------------------------
// Primary loading
// ---------------------------------------------------------------------------

#[test]
fn test_primary_slices_are_sorted() {
    let archive = Arc::new(archive(6));
    let (mut viewer, _) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();

    let primary = viewer.primary().unwrap();
    let positions: Vec<f64> = primary.slices.iter().map(|s| s.position).collect();
    assert_eq!(positions, vec![0.0, 2.5, 5.0, 7.5, 10.0, 12.5]);
    assert_eq!(viewer.phase(), &OrchestratorPhase::Ready);
    assert_eq!(viewer.secondary_candidates(), vec![PT, MR, NM]);
}

#[test]
fn test_primary_failure_is_fatal() {
    let archive = Arc::new(archive(6));
    archive.set_series_available(PRIMARY, false);
    let (mut viewer, recorder) = viewer(&archive, config(PreloadMode::Inline));

    let err = viewer.load_primary(PRIMARY).unwrap_err();
    assert!(matches!(err, FuseboxError::PrimarySeriesUnavailable { series, .. } if series == PRIMARY));
    assert!(matches!(viewer.phase(), OrchestratorPhase::Failed(_)));
    assert!(viewer.primary().is_none());
    assert!(viewer.fused_slice(ViewportId::PRIMARY, 0).is_none());
    assert!(recorder.events().is_empty());
    assert!(viewer.cache().is_empty());
}

#[test]
fn test_layout_is_frozen_after_primary_failure() {
    let archive = Arc::new(archive(6));
    archive.set_series_available(PRIMARY, false);
    let (mut viewer, recorder) = viewer(&archive, config(PreloadMode::Inline));
    assert!(viewer.load_primary(PRIMARY).is_err());
    let slots = viewer.viewports().len();

    viewer.apply_layout(LayoutPreset::Quad);
    assert_eq!(viewer.viewports().len(), slots);
    assert_eq!(viewer.layout(), LayoutPreset::Single);
    assert!(viewer.add_viewport().is_none());
    assert!(viewer.add_viewport_with_secondary(PT).is_none());
    assert!(!viewer.swap());
    assert!(!viewer.change_secondary(ViewportId::PRIMARY, Some(MR)).unwrap());

    assert_eq!(viewer.viewports().len(), slots);
    assert!(recorder.events().is_empty());
    assert!(viewer.cache().is_empty());
}

#[test]
fn test_invalid_config_is_rejected() {
    let archive = Arc::new(archive(2));
    let mut config = config(PreloadMode::Inline);
    config.layout.max_viewports = 6;
    assert!(matches!(
        SessionContext::new(config, archive.clone()),
        Err(FuseboxError::Config(_))
    ));
}

// ---------------------------------------------------------------------------
// Layout and preloading
// ---------------------------------------------------------------------------

#[test]
fn test_quad_layout_preloads_each_secondary_once() {
    let archive = Arc::new(archive(8));
    let (mut viewer, recorder) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();
    viewer.apply_layout(LayoutPreset::Quad);

    let assignments = recorder.last_assignments().unwrap();
    assert_eq!(assignments.get(1), Some(None));
    assert_eq!(assignments.get(2), Some(Some(PT)));
    assert_eq!(assignments.get(3), Some(Some(MR)));
    assert_eq!(assignments.get(4), Some(Some(NM)));

    let finished = viewer.wait_for_preloads();
    assert_eq!(finished.len(), 3);
    assert!(finished.iter().all(|(_, s)| *s == FusionStatus::Ready));
    assert_eq!(viewer.cache().stats().preloads_started, 3);

    // Mutations that keep the same pairs on screen start nothing new.
    viewer.swap();
    viewer.apply_layout(LayoutPreset::Quad);
    assert_eq!(viewer.cache().stats().preloads_started, 3);
    assert_eq!(archive.slices_fused(), 24);
}

#[test]
fn test_fused_slice_and_display_follow_cache() {
    let archive = Arc::new(archive(5));
    let (mut viewer, _) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();
    assert_eq!(
        viewer.viewport_fusion(ViewportId::PRIMARY),
        Some(FusionDisplay::PrimaryOnly)
    );

    let id = viewer.add_viewport().unwrap();
    viewer.wait_for_preloads();

    assert_eq!(viewer.viewport_fusion(id), Some(FusionDisplay::Fused));
    assert!(viewer.fused_slice(id, 4).is_some());
    assert_eq!(viewer.fusion_key_for(PT), Some(pt_key()));
    assert_eq!(viewer.cache().status(&pt_key()), FusionStatus::Ready);
    assert_eq!(viewer.layout(), LayoutPreset::Dual);
}

#[test]
fn test_secondary_fusion_failure_degrades_one_viewport() {
    let archive = Arc::new(archive(5));
    archive.set_metadata_available(MR, false);
    let (mut viewer, _) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();
    viewer.apply_layout(LayoutPreset::Triple);
    viewer.wait_for_preloads();

    let slots: Vec<ViewportId> = viewer.viewports().iter().map(|v| v.id).collect();
    assert_eq!(viewer.viewport_fusion(slots[1]), Some(FusionDisplay::Fused));
    assert!(matches!(
        viewer.viewport_fusion(slots[2]),
        Some(FusionDisplay::Degraded(_))
    ));
    assert!(viewer.fused_slice(slots[2], 0).is_none());
}

#[test]
fn test_removed_viewport_preload_runs_to_completion() {
    let archive = Arc::new(archive(6));
    let (mut viewer, _) = viewer(&archive, config(PreloadMode::Background));
    viewer.load_primary(PRIMARY).unwrap();

    archive.pause();
    let id = viewer.add_viewport_with_secondary(MR).unwrap();
    assert!(viewer.cache().is_preloading(PRIMARY, MR));
    assert!(viewer.remove_viewport(id));

    archive.resume();
    let finished = viewer.wait_for_preloads();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].1, FusionStatus::Ready);
    assert!(viewer.cache().get(PRIMARY, MR, 5).is_some());
}

#[test]
fn test_preload_observer_sees_progress() {
    let archive = Arc::new(archive(4));
    let (mut viewer, _) = viewer(&archive, config(PreloadMode::Inline));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let observer: PreloadObserver = Arc::new(move |key: &FusionKey, loaded: usize, total: usize| {
        sink.lock().unwrap().push((key.secondary, loaded, total));
    });
    viewer.set_preload_observer(Some(observer));

    viewer.load_primary(PRIMARY).unwrap();
    viewer.add_viewport_with_secondary(NM);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen.last(), Some(&(NM, 4, 4)));
}

#[test]
fn test_layout_follows_slot_count() {
    let archive = Arc::new(archive(2));
    let (mut viewer, _) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();
    viewer.apply_layout(LayoutPreset::Triple);

    let last = viewer.viewports()[2].id;
    viewer.remove_viewport(last);
    assert_eq!(viewer.layout(), LayoutPreset::Dual);
    assert!(!viewer.remove_viewport(ViewportId::PRIMARY));
}

#[test]
fn test_add_with_assigned_secondary_changes_nothing() {
    let archive = Arc::new(archive(2));
    let (mut viewer, recorder) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();
    viewer.apply_layout(LayoutPreset::Dual);
    let before = recorder.events().len();

    assert!(viewer.add_viewport_with_secondary(PT).is_none());
    assert_eq!(viewer.viewports().len(), 2);
    assert_eq!(recorder.events().len(), before);
}

// ---------------------------------------------------------------------------
// Load errors
// ---------------------------------------------------------------------------

#[test]
fn test_load_error_is_isolated_and_retryable() {
    let archive = Arc::new(archive(3));
    let (mut viewer, recorder) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();
    viewer.apply_layout(LayoutPreset::Triple);
    let slots: Vec<ViewportId> = viewer.viewports().iter().map(|v| v.id).collect();

    archive.set_series_available(MR, false);
    for &id in &slots {
        viewer.load_viewport_images(id).unwrap();
    }

    let broken = viewer.viewport(slots[2]).unwrap();
    assert!(broken.load_error.is_some());
    assert!(matches!(broken.phase, ViewportPhase::Error(_)));
    assert_eq!(viewer.viewport(slots[1]).unwrap().phase, ViewportPhase::Ready);
    assert_eq!(viewer.viewport(slots[0]).unwrap().phase, ViewportPhase::Ready);
    assert_eq!(viewer.cache().status(&pt_key()), FusionStatus::Ready);

    archive.set_series_available(MR, true);
    viewer.retry(slots[2]).unwrap();

    let retried = viewer.viewport(slots[2]).unwrap();
    assert_eq!(retried.phase, ViewportPhase::Ready);
    assert_eq!(retried.retry_count, 1);
    assert!(retried.load_error.is_none());

    let errors = recorder.load_errors();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].0, slots[2]);
    assert!(errors[0].1.is_some());
    assert_eq!(errors[1], (slots[2], None));
}

#[test]
fn test_reassign_clears_load_error() {
    let archive = Arc::new(archive(3));
    let (mut viewer, recorder) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();
    let id = viewer.add_viewport().unwrap();

    viewer.report_load_error(id, "decode failed").unwrap();
    assert!(viewer.change_secondary(id, Some(NM)).unwrap());

    assert!(viewer.viewport(id).unwrap().load_error.is_none());
    assert_eq!(recorder.load_errors().last(), Some(&(id, None)));
}

#[test]
fn test_unknown_viewport_operations_fail() {
    let archive = Arc::new(archive(3));
    let (mut viewer, _) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();
    let ghost = ViewportId(99);

    assert!(matches!(
        viewer.retry(ghost),
        Err(FuseboxError::UnknownViewport(_))
    ));
    assert!(viewer.toggle_mpr(ghost).is_err());
    assert!(viewer
        .interact(ghost, SyncPatch::default().with_index(1), UpdateOptions::discrete())
        .is_err());
}

#[test]
fn test_toggles_are_per_viewport() {
    let archive = Arc::new(archive(3));
    let (mut viewer, _) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();
    let id = viewer.add_viewport().unwrap();

    assert!(!viewer.toggle_structures(id).unwrap());
    assert!(viewer.toggle_mpr(id).unwrap());
    let primary = viewer.viewport(ViewportId::PRIMARY).unwrap();
    assert!(primary.show_structures);
    assert!(!primary.show_mpr);
}

// ---------------------------------------------------------------------------
// Sync routing and outward hooks
// ---------------------------------------------------------------------------

#[test]
fn test_opacity_is_clamped_and_reported_on_change() {
    let archive = Arc::new(archive(2));
    let (mut viewer, recorder) = viewer(&archive, config(PreloadMode::Inline));

    assert_abs_diff_eq!(viewer.set_fusion_opacity(1.7), 1.0);
    assert_abs_diff_eq!(viewer.set_fusion_opacity(1.0), 1.0);
    assert_abs_diff_eq!(viewer.set_fusion_opacity(f32::NAN), 1.0);
    assert_abs_diff_eq!(viewer.set_fusion_opacity(0.25), 0.25);

    let opacities: Vec<f32> = recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Opacity(o) => Some(o),
            _ => None,
        })
        .collect();
    assert_eq!(opacities, vec![1.0, 0.25]);
}

#[test]
fn test_reconciled_zoom_is_relayed_once() {
    let archive = Arc::new(archive(10));
    let (mut viewer, recorder) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();

    let t0 = Instant::now();
    let skip = UpdateOptions::continuous().skipping_source();
    viewer
        .interact_at(ViewportId::PRIMARY, SyncPatch::default().with_zoom(2.0), skip, t0)
        .unwrap();
    viewer
        .interact_at(
            ViewportId::PRIMARY,
            SyncPatch::default().with_zoom(1.5),
            skip,
            t0 + Duration::from_millis(10),
        )
        .unwrap();
    assert!(recorder.zooms().is_empty());

    viewer.tick(t0 + Duration::from_secs(1));
    assert_eq!(recorder.zooms(), vec![1.5]);
    assert_abs_diff_eq!(viewer.sync().snapshot().zoom, 1.5);

    // Index-only changes do not re-report zoom.
    viewer
        .interact(ViewportId::PRIMARY, SyncPatch::default().with_index(3), UpdateOptions::discrete())
        .unwrap();
    assert_eq!(recorder.zooms(), vec![1.5]);
}

#[test]
fn test_toolbar_zoom_is_applied_but_not_echoed() {
    let archive = Arc::new(archive(10));
    let (mut viewer, recorder) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();
    let id = viewer.add_viewport().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    viewer
        .sync_mut()
        .subscribe(id, Box::new(move |s: &SyncState| sink.lock().unwrap().push(s.zoom)));

    viewer.set_zoom_from_toolbar(50.0).unwrap();
    assert_abs_diff_eq!(viewer.sync().state().zoom, 20.0);
    assert_eq!(seen.lock().unwrap().last(), Some(&20.0));
    assert!(recorder.zooms().is_empty());

    // A later discrete interaction carrying the same zoom is not echoed either.
    viewer
        .interact(ViewportId::PRIMARY, SyncPatch::default().with_index(2), UpdateOptions::discrete())
        .unwrap();
    assert!(recorder.zooms().is_empty());
    assert!(viewer.set_zoom_from_toolbar(f32::INFINITY).is_err());
}

#[test]
fn test_scroll_index_is_clamped_to_primary() {
    let archive = Arc::new(archive(10));
    let (mut viewer, _) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();
    viewer
        .interact(ViewportId::PRIMARY, SyncPatch::default().with_index(500), UpdateOptions::discrete())
        .unwrap();
    assert_eq!(viewer.sync().state().current_index, 9);
}

#[test]
fn test_removed_viewport_is_unsubscribed() {
    let archive = Arc::new(archive(3));
    let (mut viewer, _) = viewer(&archive, config(PreloadMode::Inline));
    viewer.load_primary(PRIMARY).unwrap();
    let id = viewer.add_viewport().unwrap();
    viewer.sync_mut().subscribe(id, Box::new(|_: &SyncState| {}));
    assert!(viewer.sync().is_subscribed(id));

    viewer.remove_viewport(id);
    assert!(!viewer.sync().is_subscribed(id));
}

#[test]
fn test_sessions_can_share_a_cache() {
    let archive = Arc::new(archive(4));
    let config = config(PreloadMode::Inline);
    let shared = cache(&archive, &config);

    for _ in 0..2 {
        let session = SessionContext::with_cache(config.clone(), Arc::clone(&shared)).unwrap();
        let mut viewer = fusebox_core::orchestrator::Orchestrator::new(
            session,
            archive.clone(),
            archive.clone(),
        );
        viewer.load_primary(PRIMARY).unwrap();
        viewer.add_viewport_with_secondary(SeriesId(20));
        viewer.wait_for_preloads();
    }

    assert_eq!(shared.stats().preloads_started, 1);
    assert_eq!(archive.slices_fused(), 4);
}

fn shared_viewer(
    archive: &Arc<SyntheticArchive>,
    config: &ViewerConfig,
    shared: &Arc<FusionPrefetchCache>,
) -> Orchestrator {
    let session = SessionContext::with_cache(config.clone(), Arc::clone(shared)).unwrap();
    let mut viewer = Orchestrator::new(session, archive.clone(), archive.clone());
    viewer.load_primary(PRIMARY).unwrap();
    viewer
}

#[test]
fn test_shared_cache_keeps_pins_of_every_session() {
    let archive = Arc::new(archive(4));
    let mut config = config(PreloadMode::Inline);
    config.fusion.memory_budget_bytes = Some(1);
    let shared = cache(&archive, &config);

    let mut first = shared_viewer(&archive, &config, &shared);
    let shown = first.add_viewport_with_secondary(PT).unwrap();
    first.wait_for_preloads();
    assert!(first.fused_slice(shown, 0).is_some());

    let mut second = shared_viewer(&archive, &config, &shared);
    second.add_viewport_with_secondary(MR).unwrap();
    second.wait_for_preloads();

    assert!(first.fused_slice(shown, 0).is_some());
    assert_eq!(first.viewport_fusion(shown), Some(FusionDisplay::Fused));
    assert!(shared.contains(&pt_key()));
    assert_eq!(shared.stats().evictions, 0);

    // Dropping a session releases its pins; the other session's stay.
    drop(second);
    let mr_key = FusionKey::new(PRIMARY, MR, RegistrationId::Explicit("REG-MR".into()));
    assert!(!shared.contains(&mr_key));
    assert_eq!(shared.stats().evictions, 1);
    assert!(shared.contains(&pt_key()));
    assert!(first.fused_slice(shown, 3).is_some());
}

#[test]
fn test_fused_slice_uses_the_viewer_registration() {
    let archive = Arc::new(archive(4));
    let config = config(PreloadMode::Inline);
    let shared = cache(&archive, &config);

    let mut viewer = shared_viewer(&archive, &config, &shared);
    let id = viewer.add_viewport_with_secondary(PT).unwrap();
    viewer.wait_for_preloads();

    // Another requester asks for a different registration of the same pair.
    archive.set_metadata_available(PT, false);
    let other = RegistrationId::Explicit("OTHER".into());
    shared
        .preload_fusion_pair(request(PT, 4).with_registration(other), None)
        .wait();
    assert!(shared.get(PRIMARY, PT, 0).is_none());

    assert_eq!(viewer.viewport_fusion(id), Some(FusionDisplay::Fused));
    let slice = viewer.fused_slice(id, 2).expect("own registration is fused");
    assert_eq!(slice.slice_index, 2);
}
