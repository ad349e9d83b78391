/// Visualization module: one cumulative-availability chart per partition.
///
/// Produces a self-contained SVG document per non-empty series:
/// - Step line through every bin (value holds until the next bin closes)
/// - One marker per bin with a hover tooltip (`bin end: value`)
/// - Bin-end dates along the x-axis, cumulative availability on the y-axis,
///   with a zero line
///
/// Empty series produce no chart.
use std::collections::HashSet;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};

use crate::aggregation::{AggregatedSeries, AggregationReport};
use crate::error::PlannerError;

const MAX_X_LABELS: usize = 8;
const Y_TICKS: usize = 5;

// ── Config ──────────────────────────────────────────────────────────────────

/// Configuration for the per-partition charts.
#[derive(Debug, Clone)]
pub struct ChartConfig {
    /// Total SVG width in pixels
    pub width_px: u32,
    /// Total SVG height in pixels
    pub height_px: u32,
    /// Space reserved around the plot area for title and axis labels
    pub margin_px: u32,
    /// Prepended to the partition label in the chart title
    pub title_prefix: Option<String>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width_px: 800,
            height_px: 400,
            margin_px: 48,
            title_prefix: None,
        }
    }
}

// ── Layout ──────────────────────────────────────────────────────────────────

struct PlotArea {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
    y_min: f64,
    y_max: f64,
    count: usize,
}

impl PlotArea {
    fn new(series: &AggregatedSeries, config: &ChartConfig) -> Self {
        let margin = config.margin_px as f64;
        let (mut y_min, mut y_max) = series
            .points
            .iter()
            .fold((0.0f64, 0.0f64), |(lo, hi), p| (lo.min(p.value), hi.max(p.value)));
        if y_max - y_min < f64::EPSILON {
            y_min -= 1.0;
            y_max += 1.0;
        }
        Self {
            // Extra room on the left for y-axis labels.
            left: margin * 1.5,
            right: config.width_px as f64 - margin,
            top: margin,
            bottom: config.height_px as f64 - margin,
            y_min,
            y_max,
            count: series.points.len(),
        }
    }

    fn x(&self, index: usize) -> f64 {
        if self.count <= 1 {
            return (self.left + self.right) / 2.0;
        }
        self.left + (self.right - self.left) * index as f64 / (self.count - 1) as f64
    }

    fn y(&self, value: f64) -> f64 {
        self.bottom - (self.bottom - self.top) * (value - self.y_min) / (self.y_max - self.y_min)
    }
}

// ── SVG generation ──────────────────────────────────────────────────────────

/// Render one series as a standalone SVG document.
///
/// Returns `Ok(None)` for an empty series: there is nothing to chart.
pub fn render_series_svg(
    series: &AggregatedSeries,
    config: &ChartConfig,
) -> Result<Option<String>, PlannerError> {
    if series.is_empty() {
        return Ok(None);
    }

    let area = PlotArea::new(series, config);
    let title = match &config.title_prefix {
        Some(prefix) => format!("{prefix}{}", series.label),
        None => series.label.clone(),
    };

    let mut s = String::new();
    write!(
        s,
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">
  <style>
    .title {{ font-family: sans-serif; font-size: 16px; font-weight: 600; fill: #212529; text-anchor: middle; }}
    .axis-label {{ font-family: sans-serif; font-size: 10px; fill: #868e96; }}
    .axis {{ stroke: #adb5bd; stroke-width: 1; }}
    .zero {{ stroke: #495057; stroke-width: 1; stroke-dasharray: 4 3; }}
    .grid {{ stroke: #f1f3f5; stroke-width: 1; }}
    .line {{ fill: none; stroke: #339af0; stroke-width: 2; }}
    .point {{ fill: #4dabf7; stroke: #228be6; stroke-width: 1; }}
  </style>
  <rect width="100%" height="100%" fill="#fff"/>
  <text class="title" x="{cx}" y="{ty}">{title}</text>
"##,
        w = config.width_px,
        h = config.height_px,
        cx = config.width_px as f64 / 2.0,
        ty = area.top / 2.0 + 6.0,
        title = escape_xml(&title),
    )?;

    write_y_axis(&mut s, &area)?;
    write_x_axis(&mut s, series, &area)?;

    // Step line: hold each value until the next bin closes.
    let mut path = String::new();
    for (i, p) in series.points.iter().enumerate() {
        if i == 0 {
            write!(path, "M{:.1},{:.1}", area.x(i), area.y(p.value))?;
        } else {
            write!(path, " H{:.1} V{:.1}", area.x(i), area.y(p.value))?;
        }
    }
    writeln!(s, r##"  <path class="line" d="{path}"/>"##)?;

    for (i, p) in series.points.iter().enumerate() {
        writeln!(
            s,
            r##"  <circle class="point" cx="{:.1}" cy="{:.1}" r="3"><title>{}: {}</title></circle>"##,
            area.x(i),
            area.y(p.value),
            p.bin_end.format("%Y-%m-%d"),
            format_value(p.value),
        )?;
    }

    s.push_str("</svg>\n");
    Ok(Some(s))
}

fn write_y_axis(s: &mut String, area: &PlotArea) -> Result<(), std::fmt::Error> {
    writeln!(
        s,
        r##"  <line class="axis" x1="{l:.1}" y1="{t:.1}" x2="{l:.1}" y2="{b:.1}"/>"##,
        l = area.left,
        t = area.top,
        b = area.bottom,
    )?;
    for tick in 0..=Y_TICKS {
        let value = area.y_min + (area.y_max - area.y_min) * tick as f64 / Y_TICKS as f64;
        let y = area.y(value);
        writeln!(
            s,
            r##"  <line class="grid" x1="{l:.1}" y1="{y:.1}" x2="{r:.1}" y2="{y:.1}"/>
  <text class="axis-label" x="{lx:.1}" y="{ly:.1}" text-anchor="end">{label}</text>"##,
            l = area.left,
            r = area.right,
            lx = area.left - 6.0,
            ly = y + 3.0,
            label = format_value(value),
        )?;
    }
    writeln!(
        s,
        r##"  <line class="zero" x1="{l:.1}" y1="{y:.1}" x2="{r:.1}" y2="{y:.1}"/>"##,
        l = area.left,
        r = area.right,
        y = area.y(0.0),
    )
}

fn write_x_axis(
    s: &mut String,
    series: &AggregatedSeries,
    area: &PlotArea,
) -> Result<(), std::fmt::Error> {
    writeln!(
        s,
        r##"  <line class="axis" x1="{l:.1}" y1="{b:.1}" x2="{r:.1}" y2="{b:.1}"/>"##,
        l = area.left,
        r = area.right,
        b = area.bottom,
    )?;
    let step = series.points.len().div_ceil(MAX_X_LABELS).max(1);
    for (i, p) in series.points.iter().enumerate().step_by(step) {
        writeln!(
            s,
            r##"  <text class="axis-label" x="{x:.1}" y="{y:.1}" text-anchor="middle">{date}</text>"##,
            x = area.x(i),
            y = area.bottom + 16.0,
            date = p.bin_end.format("%Y-%m-%d"),
        )?;
    }
    Ok(())
}

// ── Persistence ─────────────────────────────────────────────────────────────

/// Write one `<label>.svg` per non-empty series into `dir`.
///
/// Returns the written paths in label order.
pub fn write_charts(
    dir: &Path,
    report: &AggregationReport,
    config: &ChartConfig,
) -> Result<Vec<PathBuf>, PlannerError> {
    fs::create_dir_all(dir)?;

    let mut used: HashSet<String> = HashSet::new();
    let mut written = Vec::new();
    for series in report.non_empty() {
        let Some(svg) = render_series_svg(series, config)? else {
            continue;
        };

        let stem = chart_file_stem(&series.label);
        let mut file_name = format!("{stem}.svg");
        let mut n = 1;
        // Names must stay unique ignoring case.
        while !used.insert(file_name.to_lowercase()) {
            n += 1;
            file_name = format!("{stem}_{n}.svg");
        }

        let path = dir.join(file_name);
        fs::write(&path, svg)?;
        log::info!("wrote chart '{}' to {}", series.label, path.display());
        written.push(path);
    }
    Ok(written)
}

/// File-system-safe stem for a partition label.
pub fn chart_file_stem(label: &str) -> String {
    let stem: String = label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_start_matches('.');
    if stem.is_empty() {
        "partition".to_string()
    } else {
        stem.to_string()
    }
}

// ── Formatting helpers ──────────────────────────────────────────────────────

fn format_value(v: f64) -> String {
    if v.fract().abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        format!("{v:.2}")
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
