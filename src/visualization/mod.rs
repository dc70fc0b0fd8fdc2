//! Visualization tools for electrode depth histories.
//!
//! This module provides functions to render depth-vs-date charts of movement
//! logs and heatmaps of extended block tables using the plotters library.

use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::loaders::{CrossReferencedSession, Hemisphere, MovementRecord};
use crate::processors::intervals::{derive_channel_intervals, group_by_channel, sort_movements, ChannelKey};

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Nothing to plot")]
    EmptyInput,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1600;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 1600;

/// Line colors, cycled per channel.
const CHANNEL_COLORS: &[(u8, u8, u8)] = &[
    (228, 26, 28),   // Red
    (55, 126, 184),  // Blue
    (77, 175, 74),   // Green
    (152, 78, 163),  // Purple
    (255, 127, 0),   // Orange
    (166, 86, 40),   // Brown
    (247, 129, 191), // Pink
    (153, 153, 153), // Gray
    (0, 206, 209),   // Turquoise
    (138, 43, 226),  // Blue Violet
];

fn channel_color(index: usize) -> RGBColor {
    let (r, g, b) = CHANNEL_COLORS[index % CHANNEL_COLORS.len()];
    RGBColor(r, g, b)
}

/// Days since 0001-01-01, used as the chart's x coordinate.
fn day_number(ts: &NaiveDateTime) -> f64 {
    ts.date().num_days_from_ce() as f64
}

fn year_label(day: &f64) -> String {
    NaiveDate::from_num_days_from_ce_opt(day.round() as i32)
        .map(|d| d.format("%Y").to_string())
        .unwrap_or_default()
}

/// Depth-vs-date polyline per channel, movements in date order.
pub fn depth_lines(records: &[MovementRecord]) -> Vec<(ChannelKey, Vec<(f64, f64)>)> {
    group_by_channel(records)
        .into_iter()
        .map(|(key, mut events)| {
            sort_movements(&mut events);
            let points = events
                .iter()
                .map(|r| (day_number(&r.timestamp), r.depth()))
                .collect();
            (key, points)
        })
        .collect()
}

/// Days each bounded depth was held, channel by channel.
pub fn duration_bars(records: &[MovementRecord]) -> Vec<i64> {
    group_by_channel(records)
        .into_values()
        .flat_map(derive_channel_intervals)
        .filter(|iv| iv.end.is_some())
        .map(|iv| iv.duration_days())
        .collect()
}

/// Compute padded bounds for a set of (x, y) points.
fn compute_bounds<'a>(points: impl Iterator<Item = &'a (f64, f64)>) -> (f64, f64, f64, f64) {
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;

    for (x, y) in points {
        x_min = x_min.min(*x);
        x_max = x_max.max(*x);
        y_min = y_min.min(*y);
        y_max = y_max.max(*y);
    }

    if (x_max - x_min).abs() < f64::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if (y_max - y_min).abs() < f64::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;
    (x_min - x_padding, x_max + x_padding, y_min - y_padding, y_max + y_padding)
}

/// Plot electrode depth history and save as PNG.
///
/// Left panel: depth against date, one line per channel. Right panel: one
/// horizontal bar per bounded depth, length in days.
pub fn plot_depth_history(output_path: &Path, records: &[MovementRecord]) -> Result<()> {
    if records.is_empty() {
        return Err(VisualizationError::EmptyInput);
    }

    let lines = depth_lines(records);
    let bars = duration_bars(records);
    let (x_min, x_max, y_min, y_max) = compute_bounds(lines.iter().flat_map(|(_, pts)| pts.iter()));

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;
    let panels = root.split_evenly((1, 2));

    let mut depth_chart = ChartBuilder::on(&panels[0])
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    depth_chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_label_formatter(&year_label)
        .x_desc("Date")
        .y_desc("Depth (mm)")
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    for (i, (_, points)) in lines.iter().enumerate() {
        depth_chart
            .draw_series(LineSeries::new(
                points.iter().copied(),
                channel_color(i).stroke_width(2),
            ))
            .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;
    }

    let max_days = bars.iter().copied().max().unwrap_or(1).max(1) as f64;
    let mut bar_chart = ChartBuilder::on(&panels[1])
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..max_days * 1.05, 0f64..(bars.len() as f64 + 1.0))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    bar_chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc("Days")
        .y_desc("Site")
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    bar_chart
        .draw_series(bars.iter().enumerate().map(|(i, &days)| {
            let y = i as f64 + 1.0;
            Rectangle::new([(0.0, y - 0.4), (days as f64, y + 0.4)], channel_color(i).filled())
        }))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;
    log::info!("Depth history -> {}", output_path.display());

    Ok(())
}

/// Fill style for one heatmap cell; unset channels are white.
fn heat_style(depth: Option<f64>, max_depth: f64) -> ShapeStyle {
    match depth {
        Some(d) if max_depth > 0.0 => {
            let t = (d / max_depth).clamp(0.0, 1.0);
            HSLColor(0.66 * (1.0 - t), 0.85, 0.5).filled()
        }
        Some(_) => HSLColor(0.66, 0.85, 0.5).filled(),
        None => WHITE.filled(),
    }
}

/// Depth matrix: one row per session, columns `L0..L{n-1}` then `R0..R{n-1}`.
pub fn heatmap_cells(sessions: &[CrossReferencedSession], num_channels: usize) -> Vec<Vec<Option<f64>>> {
    sessions
        .iter()
        .map(|row| {
            Hemisphere::ALL
                .iter()
                .flat_map(|&h| (0..num_channels).map(move |c| row.depth(h, c)))
                .collect()
        })
        .collect()
}

/// Plot the channel depths of every block as a heatmap and save as PNG.
pub fn plot_depth_heatmap(
    output_path: &Path,
    sessions: &[CrossReferencedSession],
    num_channels: usize,
) -> Result<()> {
    if sessions.is_empty() || num_channels == 0 {
        return Err(VisualizationError::EmptyInput);
    }

    let cells = heatmap_cells(sessions, num_channels);
    let max_depth = cells
        .iter()
        .flatten()
        .flatten()
        .fold(0.0f64, |acc, &d| acc.max(d));
    let rows = cells.len() as f64;
    let cols = (2 * num_channels) as f64;

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..cols, 0f64..rows)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc("Channel (L0..R)")
        .y_desc("Block")
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(cells.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().map(move |(c, depth)| {
                // First block at the top.
                let (x, y) = (c as f64, rows - r as f64 - 1.0);
                Rectangle::new([(x, y), (x + 1.0, y + 1.0)], heat_style(*depth, max_depth))
            })
        }))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;
    log::info!("Depth heatmap -> {}", output_path.display());

    Ok(())
}
