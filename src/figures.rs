//! Renders the checkpoint statistics as PNG line charts.
//!
//! One figure per group of checkpoints (24 by default), one line series per
//! checkpoint labeled by the number of IPs inserted. The last series of a
//! group is repeated as the first series of the next figure so consecutive
//! figures share a reference curve. A separate single-series figure plots
//! IPs inserted against total trie node count.

use crate::checkpoints::{prefixes, Checkpoint, CheckpointSeries, LevelStats};
use crate::config::PlotConfig;
use crate::error::{HarnessError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use plotters::prelude::*;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    NodeCount,
    AvgChildren,
}

impl Metric {
    fn value(self, level: &LevelStats) -> f64 {
        match self {
            Metric::NodeCount => level.num_nodes as f64,
            Metric::AvgChildren => level.avg_children,
        }
    }

    fn y_desc(self) -> &'static str {
        match self {
            Metric::NodeCount => "# of Nodes at the Level",
            Metric::AvgChildren => "Avg. # of Children at the Level",
        }
    }

    fn file_tag(self) -> &'static str {
        match self {
            Metric::NodeCount => "nodes",
            Metric::AvgChildren => "avg",
        }
    }
}

/// Humanize a count: 47_000_000 -> "~47.00 Million".
pub fn millify(n: f64) -> String {
    const NAMES: [&str; 5] = ["", " Thousand", " Million", " Billion", " Trillion"];
    let millidx = if n == 0.0 {
        0
    } else {
        (n.abs().log10() / 3.0)
            .floor()
            .clamp(0.0, (NAMES.len() - 1) as f64) as usize
    };
    format!("~{:.2}{}", n / 1000f64.powi(millidx as i32), NAMES[millidx])
}

/// Split checkpoints into figure groups of `group_size`, carrying the last
/// series of each group over as the first series of the next.
fn figure_groups(checkpoints: &[Checkpoint], group_size: usize) -> Vec<Vec<&Checkpoint>> {
    let mut groups: Vec<Vec<&Checkpoint>> = Vec::new();
    let mut carried: Option<&Checkpoint> = None;
    for chunk in checkpoints.chunks(group_size) {
        let mut group = Vec::with_capacity(chunk.len() + 1);
        if let Some(prev) = carried {
            group.push(prev);
        }
        group.extend(chunk.iter());
        carried = chunk.last();
        groups.push(group);
    }
    groups
}

fn plot_err<E: std::fmt::Display>(e: E) -> HarnessError {
    HarnessError::Plot(e.to_string())
}

/// Render every figure for the loaded series. Returns the written paths.
pub fn render_all(config: &PlotConfig, verbose: bool) -> Result<Vec<PathBuf>> {
    let series = CheckpointSeries::load(config)?;
    std::fs::create_dir_all(&config.figures_dir)?;

    let spinner = if !verbose {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.cyan} {msg}")
                .map_err(plot_err)?,
        );
        pb.set_message("Rendering figures...");
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        Some(pb)
    } else {
        None
    };

    let mut written = Vec::new();
    for metric in [Metric::NodeCount, Metric::AvgChildren] {
        written.extend(render_level_figures(&series, config, metric)?);
    }
    written.push(render_total_nodes(&series, config)?);

    if let Some(pb) = spinner {
        pb.finish_with_message(format!("Rendered {} figures", written.len()));
    }
    for path in &written {
        info!("Wrote {}", path.display());
    }
    Ok(written)
}

/// One figure per checkpoint group: prefix length on the x axis, the chosen
/// metric on the y axis, one series per checkpoint.
fn render_level_figures(
    series: &CheckpointSeries,
    config: &PlotConfig,
    metric: Metric,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for group in figure_groups(&series.checkpoints, config.group_size) {
        let from = group.first().map(|c| c.label).unwrap_or_default();
        let to = group.last().map(|c| c.label).unwrap_or_default();
        let path = config
            .figures_dir
            .join(format!("[{from}-{to}]IPs-{}.png", metric.file_tag()));

        let mut curves = Vec::with_capacity(group.len());
        for checkpoint in &group {
            let mut points = Vec::new();
            for prefix in prefixes() {
                points.push((prefix, metric.value(checkpoint.level(prefix)?)));
            }
            curves.push((checkpoint.label, points));
        }

        let title = format!(
            "Prefix (Level) vs. {} [{from} - {to}]IPs",
            metric.y_desc()
        );
        draw_level_figure(&path, &title, metric.y_desc(), &curves)?;
        written.push(path);
    }
    Ok(written)
}

fn draw_level_figure(
    path: &std::path::Path,
    title: &str,
    y_desc: &str,
    curves: &[(u64, Vec<(u32, f64)>)],
) -> Result<()> {
    let root = BitMapBackend::new(path, (1500, 1500)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let y_max = curves
        .iter()
        .flat_map(|(_, points)| points.iter().map(|p| p.1))
        .fold(0.0f64, f64::max)
        .max(1.0);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 36))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .build_cartesian_2d(0u32..128u32, 0f64..y_max * 1.05)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc("Prefix (Level)")
        .y_desc(y_desc)
        .x_labels(33)
        .draw()
        .map_err(plot_err)?;

    for (idx, (label, points)) in curves.iter().enumerate() {
        let style = ShapeStyle::from(&Palette99::pick(idx)).stroke_width(2);
        chart
            .draw_series(LineSeries::new(points.iter().copied(), style))
            .map_err(plot_err)?
            .label(format!("{label} IPs"))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], style));
        chart
            .draw_series(
                points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 3, style.filled())),
            )
            .map_err(plot_err)?;
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_err)?;
    root.present().map_err(plot_err)?;
    Ok(())
}

/// Single-series figure: IPs inserted vs. total trie node count, with the
/// final count annotated in humanized form.
fn render_total_nodes(series: &CheckpointSeries, config: &PlotConfig) -> Result<PathBuf> {
    let path = config
        .figures_dir
        .join(format!("totalNodes-{}.png", config.prefix));
    let points: Vec<(f64, f64)> = series
        .checkpoints
        .iter()
        .map(|c| (c.label as f64, c.total_nodes as f64))
        .collect();
    let last = points.last().copied().ok_or_else(|| {
        HarnessError::Checkpoint("no checkpoints to plot".to_string())
    })?;

    let backend_path = path.clone();
    let root = BitMapBackend::new(&backend_path, (1500, 1500)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let x_max = last.0.max(1.0);
    let y_max = points.iter().map(|p| p.1).fold(0.0f64, f64::max).max(1.0);
    let mut chart = ChartBuilder::on(&root)
        .caption(
            "# of IPs Inserted vs. # of Nodes on Trie",
            ("sans-serif", 36),
        )
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(90)
        .build_cartesian_2d(0f64..x_max * 1.05, 0f64..y_max * 1.1)
        .map_err(plot_err)?;
    chart
        .configure_mesh()
        .x_desc("# of IPs Inserted")
        .y_desc("# of Nodes on Trie")
        .draw()
        .map_err(plot_err)?;

    let style = ShapeStyle::from(&Palette99::pick(0)).stroke_width(2);
    chart
        .draw_series(LineSeries::new(points.iter().copied(), style))
        .map_err(plot_err)?;
    chart
        .draw_series(
            points
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 3, style.filled())),
        )
        .map_err(plot_err)?;
    chart
        .draw_series(std::iter::once(Text::new(
            millify(last.1),
            last,
            ("sans-serif", 24),
        )))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(path)
}
