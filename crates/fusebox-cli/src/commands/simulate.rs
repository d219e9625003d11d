use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use fusebox_core::config::{PreloadMode, ViewerConfig};
use fusebox_core::fusion::FusionKey;
use fusebox_core::orchestrator::{
    Orchestrator, PreloadObserver, SessionContext, ViewerListener,
};
use fusebox_core::series::{RegistrationId, SeriesId};
use fusebox_core::sync::{SyncPatch, SyncState, UpdateOptions};
use fusebox_core::synthetic::SyntheticArchive;
use fusebox_core::viewport::{LayoutPreset, ViewportAssignments, ViewportId};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::info;

use crate::summary::{print_session_summary, SessionReport};

/// Interval between simulated scroll events.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

const PRIMARY_SERIES: SeriesId = SeriesId(1);
const FIRST_SECONDARY: u64 = 101;

#[derive(Clone, Copy, ValueEnum)]
pub enum LayoutArg {
    Single,
    Dual,
    Triple,
    Quad,
}

impl From<LayoutArg> for LayoutPreset {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Single => LayoutPreset::Single,
            LayoutArg::Dual => LayoutPreset::Dual,
            LayoutArg::Triple => LayoutPreset::Triple,
            LayoutArg::Quad => LayoutPreset::Quad,
        }
    }
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Viewer config file (TOML). Defaults are used when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Layout to switch to once the primary is loaded
    #[arg(long, value_enum, default_value = "quad")]
    pub layout: LayoutArg,

    /// Number of slices in the primary CT
    #[arg(long, default_value = "120")]
    pub slices: usize,

    /// Modalities of the registered secondaries, in catalog order
    #[arg(long, value_delimiter = ',', default_value = "PT,MR,NM")]
    pub secondaries: Vec<String>,

    /// Number of slices that fail to fuse for the first secondary
    #[arg(long, default_value = "0")]
    pub fail_slices: usize,

    /// 1-based catalog position of a secondary whose metadata is unavailable
    #[arg(long)]
    pub unavailable: Option<usize>,

    /// 1-based catalog position of a secondary whose images fail to load
    #[arg(long)]
    pub broken_images: Option<usize>,

    /// Artificial fusion latency per slice in milliseconds
    #[arg(long, default_value = "2")]
    pub delay_ms: u64,

    /// Fuse on the calling thread instead of background workers
    #[arg(long)]
    pub inline: bool,

    /// Scroll events in the simulated navigation burst
    #[arg(long, default_value = "40")]
    pub scroll_steps: usize,

    /// Zoom pushed from the toolbar after the burst
    #[arg(long, default_value = "1.5")]
    pub zoom: f32,
}

/// Logs outward notifications and keeps a tally for the summary.
struct EventLog {
    counts: Arc<EventCounts>,
}

#[derive(Default)]
pub struct EventCounts {
    pub assignment_changes: AtomicUsize,
    pub zoom_changes: AtomicUsize,
    pub load_errors: AtomicUsize,
}

impl ViewerListener for EventLog {
    fn on_viewport_assignments_change(&mut self, assignments: &ViewportAssignments) {
        self.counts.assignment_changes.fetch_add(1, Ordering::Relaxed);
        info!(slots = assignments.len(), "Assignments changed");
    }

    fn on_zoom_change(&mut self, zoom: f32) {
        self.counts.zoom_changes.fetch_add(1, Ordering::Relaxed);
        info!(zoom, "Zoom relayed to toolbar");
    }

    fn on_load_error(&mut self, viewport: ViewportId, message: Option<&str>) {
        if let Some(message) = message {
            self.counts.load_errors.fetch_add(1, Ordering::Relaxed);
            info!(%viewport, error = message, "Viewport load error");
        }
    }
}

pub fn run(args: &SimulateArgs) -> Result<()> {
    let mut config = match args.config {
        Some(ref path) => super::config::load(path)?,
        None => ViewerConfig::default(),
    };
    if args.inline {
        config.fusion.preload_mode = PreloadMode::Inline;
    }

    let secondaries: Vec<SeriesId> = (0..args.secondaries.len() as u64)
        .map(|i| SeriesId(FIRST_SECONDARY + i))
        .collect();

    let mut archive = SyntheticArchive::new()
        .with_series(PRIMARY_SERIES, "CT", args.slices)
        .with_fuse_delay(Duration::from_millis(args.delay_ms));
    for (&id, modality) in secondaries.iter().zip(&args.secondaries) {
        archive = archive
            .with_series(id, modality.as_str(), args.slices)
            .with_association(
                PRIMARY_SERIES,
                id,
                RegistrationId::Explicit(format!("REG-{}", id.0)),
            );
    }
    let archive = Arc::new(archive);

    if let Some(&first) = secondaries.first() {
        for index in (0..args.fail_slices.min(args.slices)).map(|i| i * 3 % args.slices) {
            archive.fail_slice(first, index);
        }
    }
    if let Some(pos) = args.unavailable {
        let series = catalog_entry(&secondaries, pos)?;
        archive.set_metadata_available(series, false);
    }
    if let Some(pos) = args.broken_images {
        let series = catalog_entry(&secondaries, pos)?;
        archive.set_series_available(series, false);
    }

    let session = SessionContext::new(config, archive.clone())
        .context("Invalid viewer config")?;
    let mut viewer = Orchestrator::new(session, archive.clone(), archive.clone());

    let counts = Arc::new(EventCounts::default());
    viewer.add_listener(Box::new(EventLog {
        counts: Arc::clone(&counts),
    }));

    let multi = MultiProgress::new();
    let style = ProgressStyle::default_bar().template("{msg:24} [{bar:40}] {pos}/{len}")?;
    let bars: HashMap<SeriesId, ProgressBar> = secondaries
        .iter()
        .zip(&args.secondaries)
        .map(|(&id, modality)| {
            let pb = multi.add(ProgressBar::new(args.slices as u64));
            pb.set_style(style.clone());
            pb.set_message(format!("{modality} ({})", id.0));
            (id, pb)
        })
        .collect();
    let bars = Arc::new(bars);
    let observer_bars = Arc::clone(&bars);
    let observer: PreloadObserver = Arc::new(move |key: &FusionKey, loaded: usize, total: usize| {
        if let Some(pb) = observer_bars.get(&key.secondary) {
            pb.set_length(total as u64);
            pb.set_position(loaded as u64);
        }
    });
    viewer.set_preload_observer(Some(observer));

    viewer.load_primary(PRIMARY_SERIES)?;
    viewer.apply_layout(args.layout.into());

    let ids: Vec<ViewportId> = viewer.viewports().iter().map(|v| v.id).collect();
    let deliveries: Vec<(ViewportId, Arc<AtomicUsize>)> = ids
        .iter()
        .map(|&id| (id, Arc::new(AtomicUsize::new(0))))
        .collect();
    for (id, counter) in &deliveries {
        let counter = Arc::clone(counter);
        viewer.sync_mut().subscribe(
            *id,
            Box::new(move |_: &SyncState| {
                counter.fetch_add(1, Ordering::Relaxed);
            }),
        );
    }
    for &id in &ids {
        viewer.load_viewport_images(id)?;
    }

    // Scroll burst from the primary pane, then let it settle.
    let start = Instant::now();
    let mut now = start;
    for step in 0..args.scroll_steps {
        now = start + FRAME_INTERVAL * step as u32;
        viewer.interact_at(
            ViewportId::PRIMARY,
            SyncPatch::default().with_index(step),
            UpdateOptions::continuous().skipping_source(),
            now,
        )?;
        viewer.tick(now);
    }
    viewer.tick(now + viewer.sync().settle_window());
    viewer.interact(
        ViewportId::PRIMARY,
        SyncPatch::default().with_zoom(2.0).with_window_level(350.0, 50.0),
        UpdateOptions::discrete(),
    )?;
    viewer.set_zoom_from_toolbar(args.zoom)?;

    let finished = viewer.wait_for_preloads();
    for (key, status) in &finished {
        if let Some(pb) = bars.get(&key.secondary) {
            pb.finish_with_message(format!("{} {}", key.secondary.0, status));
        }
    }
    for pb in bars.values() {
        if !pb.is_finished() {
            pb.finish();
        }
    }

    let report = SessionReport {
        finished,
        deliveries: deliveries
            .iter()
            .map(|(id, c)| (*id, c.load(Ordering::Relaxed)))
            .collect(),
        assignment_changes: counts.assignment_changes.load(Ordering::Relaxed),
        zoom_changes: counts.zoom_changes.load(Ordering::Relaxed),
        load_errors: counts.load_errors.load(Ordering::Relaxed),
    };
    print_session_summary(&viewer, &report);

    Ok(())
}

fn catalog_entry(secondaries: &[SeriesId], position: usize) -> Result<SeriesId> {
    position
        .checked_sub(1)
        .and_then(|i| secondaries.get(i).copied())
        .with_context(|| {
            format!(
                "No secondary at catalog position {position} (have {})",
                secondaries.len()
            )
        })
}
