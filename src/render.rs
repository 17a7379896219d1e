//! HTML for the dashboard: the static index shell and the per-tick stats
//! fragment pushed over `/stats`.

use crate::config::{ColorThresholds, ThresholdsConfig};
use crate::snapshot::Snapshot;
use std::fmt::Write;
use thiserror::Error;

const INDEX_HTML: &str = include_str!("../assets/index.html");

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to assemble stats markup: {0}")]
    Format(#[from] std::fmt::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Green,
    Orange,
    Red,
}

impl Color {
    pub fn as_str(self) -> &'static str {
        match self {
            Color::Green => "green",
            Color::Orange => "orange",
            Color::Red => "red",
        }
    }
}

pub fn index_page() -> &'static str {
    INDEX_HTML
}

pub fn cpu_color(load_percent: f64, thresholds: &ColorThresholds) -> Color {
    band(load_percent, thresholds)
}

pub fn temperature_color(celsius: f64, thresholds: &ColorThresholds) -> Color {
    band(celsius, thresholds)
}

/// One-based label for the sensor or core at `index`.
pub fn sensor_number(index: usize) -> usize {
    index + 1
}

fn band(value: f64, thresholds: &ColorThresholds) -> Color {
    if value <= thresholds.warn {
        Color::Green
    } else if value <= thresholds.critical {
        Color::Orange
    } else {
        Color::Red
    }
}

/// Renders the stats cards for one snapshot. The output spans several lines;
/// callers that need a single line collapse it themselves.
pub fn render_stats(
    snapshot: &Snapshot,
    thresholds: &ThresholdsConfig,
) -> Result<String, RenderError> {
    let mut out = String::with_capacity(2048);

    writeln!(out, r#"<section class="card" id="host">"#)?;
    writeln!(out, "  <h2>Host</h2>")?;
    writeln!(out, "  <dl>")?;
    writeln!(
        out,
        "    <dt>Hostname</dt><dd>{}</dd>",
        escape_html(&snapshot.hostname)
    )?;
    writeln!(out, "    <dt>OS</dt><dd>{}</dd>", escape_html(&snapshot.os_name))?;
    writeln!(out, "    <dt>Uptime</dt><dd>{}</dd>", snapshot.uptime)?;
    writeln!(out, "  </dl>")?;
    writeln!(out, "</section>")?;

    writeln!(out, r#"<section class="card" id="cpu">"#)?;
    writeln!(out, "  <h2>CPU</h2>")?;
    writeln!(out, "  <ul>")?;
    for (i, load) in snapshot.cpu_loads.iter().enumerate() {
        writeln!(
            out,
            r#"    <li><span class="label">Core {}</span> <span class="value" style="color: {}">{:.2}%</span></li>"#,
            sensor_number(i),
            cpu_color(*load, &thresholds.cpu).as_str(),
            load
        )?;
    }
    writeln!(out, "  </ul>")?;
    writeln!(out, "</section>")?;

    write_usage_card(
        &mut out,
        "memory",
        "Memory",
        snapshot.used_memory_gb,
        snapshot.total_memory_gb,
        snapshot.memory_used_percent,
    )?;
    write_usage_card(
        &mut out,
        "disk",
        "Disk",
        snapshot.used_disk_gb,
        snapshot.total_disk_gb,
        snapshot.disk_used_percent,
    )?;

    writeln!(out, r#"<section class="card" id="temperatures">"#)?;
    writeln!(out, "  <h2>Temperatures</h2>")?;
    if snapshot.temperatures.is_empty() {
        writeln!(out, r#"  <p class="empty">No sensors detected</p>"#)?;
    } else {
        writeln!(out, "  <ul>")?;
        for (i, t) in snapshot.temperatures.iter().enumerate() {
            writeln!(
                out,
                r#"    <li><span class="label">#{} {}</span> <span class="value" style="color: {}">{:.1}&deg;C</span></li>"#,
                sensor_number(i),
                escape_html(&t.label),
                temperature_color(t.celsius, &thresholds.temperature).as_str(),
                t.celsius
            )?;
        }
        writeln!(out, "  </ul>")?;
    }
    writeln!(out, "</section>")?;

    Ok(out)
}

fn write_usage_card(
    out: &mut String,
    id: &str,
    title: &str,
    used_gb: f64,
    total_gb: f64,
    used_percent: f64,
) -> Result<(), RenderError> {
    writeln!(out, r#"<section class="card" id="{id}">"#)?;
    writeln!(out, "  <h2>{title}</h2>")?;
    writeln!(
        out,
        r#"  <p><span class="value">{used_gb:.2} GB</span> of {total_gb:.2} GB</p>"#
    )?;
    writeln!(
        out,
        r#"  <progress max="100" value="{used_percent:.2}"></progress> <span>{used_percent:.2}%</span>"#
    )?;
    writeln!(out, "</section>")?;
    Ok(())
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
