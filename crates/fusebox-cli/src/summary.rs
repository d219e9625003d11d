use console::Style;
use fusebox_core::fusion::{FusionKey, FusionStatus};
use fusebox_core::orchestrator::{FusionDisplay, Orchestrator};
use fusebox_core::viewport::ViewportId;

/// Outcome of a simulated session, collected by the `simulate` command.
pub struct SessionReport {
    pub finished: Vec<(FusionKey, FusionStatus)>,
    /// Hot-path state deliveries per viewport.
    pub deliveries: Vec<(ViewportId, usize)>,
    pub assignment_changes: usize,
    pub zoom_changes: usize,
    pub load_errors: usize,
}

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    good: Style,
    warn: Style,
    bad: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            good: Style::new().green(),
            warn: Style::new().yellow(),
            bad: Style::new().red().bold(),
        }
    }

    fn status(&self, status: &FusionStatus) -> &Style {
        match status {
            FusionStatus::Ready => &self.good,
            FusionStatus::Error(_) => &self.bad,
            _ => &self.warn,
        }
    }

    fn display(&self, display: &FusionDisplay) -> &Style {
        match display {
            FusionDisplay::Fused => &self.good,
            FusionDisplay::Degraded(_) => &self.bad,
            FusionDisplay::PrimaryOnly => &self.label,
            FusionDisplay::Loading { .. } => &self.warn,
        }
    }
}

pub fn print_session_summary(viewer: &Orchestrator, report: &SessionReport) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Fusebox Session"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(15)));
    println!();

    let primary = viewer
        .primary()
        .map_or_else(|| "none".to_string(), |p| format!("{} ({} slices)", p.id, p.slices.len()));
    println!("  {:<14}{}", s.label.apply_to("Primary"), s.value.apply_to(primary));
    println!("  {:<14}{}", s.label.apply_to("Phase"), s.value.apply_to(viewer.phase()));
    println!("  {:<14}{}", s.label.apply_to("Layout"), s.value.apply_to(viewer.layout()));
    println!(
        "  {:<14}{:.0}%",
        s.label.apply_to("Opacity"),
        viewer.fusion_opacity() * 100.0
    );
    println!();

    // Viewports
    println!("  {}", s.header.apply_to("Viewports"));
    for (ordinal, slot) in viewer.viewports().iter().enumerate() {
        let secondary = slot
            .secondary_series_id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let display = viewer
            .viewport_fusion(slot.id)
            .unwrap_or(FusionDisplay::PrimaryOnly);
        let delivered = report
            .deliveries
            .iter()
            .find(|(id, _)| *id == slot.id)
            .map_or(0, |(_, n)| *n);
        println!(
            "    {:<4}{:<13}{:<12}{:<18}{}  {}",
            s.label.apply_to(ordinal + 1),
            s.value.apply_to(slot.id.to_string()),
            secondary,
            slot.phase.to_string(),
            s.display(&display).apply_to(&display),
            s.label.apply_to(format!("{delivered} updates")),
        );
    }
    println!();

    // Fusion
    println!("  {}", s.header.apply_to("Fusion"));
    if report.finished.is_empty() {
        println!("    {}", s.label.apply_to("no preloads ran"));
    }
    for (key, status) in &report.finished {
        let counts = viewer.cache().summary(key).map_or_else(String::new, |summary| {
            format!(
                "{}/{} fused, {} failed",
                summary.fused, summary.total, summary.failed
            )
        });
        println!(
            "    {:<28}{:<24}{}",
            s.value.apply_to(key.to_string()),
            s.status(status).apply_to(status.to_string()),
            s.label.apply_to(counts),
        );
    }
    println!();

    // Cache
    let stats = viewer.cache().stats();
    println!("  {}", s.header.apply_to("Cache"));
    println!(
        "    {:<12}{} ({:.1} MiB)",
        s.label.apply_to("Entries"),
        s.value.apply_to(viewer.cache().len()),
        viewer.cache().total_bytes() as f64 / (1024.0 * 1024.0)
    );
    println!(
        "    {:<12}{} started, {} attached, {} skipped",
        s.label.apply_to("Preloads"),
        stats.preloads_started,
        stats.preloads_attached,
        stats.preloads_skipped
    );
    println!(
        "    {:<12}{} fused, {} failed, {} evicted",
        s.label.apply_to("Slices"),
        stats.slices_fused,
        stats.slices_failed,
        stats.evictions
    );
    println!();

    // Sync
    let snapshot = viewer.sync().snapshot();
    println!("  {}", s.header.apply_to("Sync"));
    println!(
        "    {:<12}slice {}, zoom {:.2}, W/L {}/{}",
        s.label.apply_to("Snapshot"),
        s.value.apply_to(snapshot.current_index),
        snapshot.zoom,
        snapshot.window_level.width,
        snapshot.window_level.center
    );
    println!(
        "    {:<12}{} assignment, {} zoom, {} load error",
        s.label.apply_to("Events"),
        report.assignment_changes,
        report.zoom_changes,
        report.load_errors
    );
    println!();
}
