use std::collections::HashSet;

use clap::ValueEnum;
use log::warn;
use serde::Serialize;

use super::Tree;
use crate::metadata::{JoinReport, MetadataCapabilities, DEFAULT_SECONDARY_COLUMN};
use crate::palette::DEFAULT_QUALITATIVE;

mod radial;
mod rectangular;

pub use radial::layout_radial;
pub use rectangular::layout_rectangular;

pub type Point = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerShape {
    Circle,
    Square,
    Diamond,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub position: Point,
    pub color: String,
    pub label: Option<String>,
    pub legend_group: Option<String>,
    pub show_in_legend: bool,
    pub shape: MarkerShape,
}

/// One item handed to the chart renderer. Later primitives draw on top.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawPrimitive {
    LineSegment { start: Point, end: Point },
    Marker(Marker),
}

impl DrawPrimitive {
    pub fn line(start: Point, end: Point) -> Self {
        Self::LineSegment { start, end }
    }

    pub fn as_marker(&self) -> Option<&Marker> {
        match self {
            Self::Marker(marker) => Some(marker),
            Self::LineSegment { .. } => None,
        }
    }
}

/// How primitive coordinates are to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// `(x, y)` with y growing downward, one unit per tip row.
    Cartesian,
    /// `(theta, r)` with theta in radians.
    Polar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub group: String,
    pub color: String,
}

/// Legend entries in the order the renderer will list them.
pub fn legend(primitives: &[DrawPrimitive]) -> Vec<LegendEntry> {
    primitives
        .iter()
        .filter_map(DrawPrimitive::as_marker)
        .filter(|marker| marker.show_in_legend)
        .filter_map(|marker| {
            marker.legend_group.as_ref().map(|group| LegendEntry {
                group: group.clone(),
                color: marker.color.clone(),
            })
        })
        .collect()
}

/// Tracks which legend groups have been shown already.
#[derive(Debug, Default)]
pub(crate) struct LegendTracker {
    seen: HashSet<String>,
}

impl LegendTracker {
    /// True the first time `group` is offered.
    pub(crate) fn first_sighting(&mut self, group: &str) -> bool {
        self.seen.insert(group.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleBar {
    pub start: Point,
    pub end: Point,
    pub length: f64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SupportUnit {
    /// Confidences recorded as percentages, e.g. bootstrap 0-100.
    #[default]
    Percent,
    /// Confidences recorded as fractions, e.g. posterior 0-1.
    Fraction,
}

/// Support level above which an internal node gets a support marker.
///
/// The value is compared against node confidences as-is; the unit only
/// documents what the tree is expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SupportThreshold {
    pub value: f64,
    pub unit: SupportUnit,
}

impl Default for SupportThreshold {
    fn default() -> Self {
        Self {
            value: 90.0,
            unit: SupportUnit::Percent,
        }
    }
}

impl SupportThreshold {
    pub fn is_supported(&self, confidence: Option<f64>) -> bool {
        confidence.is_some_and(|value| value > self.value)
    }

    /// Warn when the tree's confidences look like the other unit. Nothing is
    /// rescaled.
    pub fn check_unit(&self, confidences: &[f64]) {
        if confidences.is_empty() {
            return;
        }
        let largest = confidences.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        match self.unit {
            SupportUnit::Percent if largest <= 1.0 => warn!(
                "Support threshold {} is in percent but every confidence is at most 1; no node will be marked",
                self.value
            ),
            SupportUnit::Fraction if largest > 1.0 => warn!(
                "Support threshold {} is a fraction but confidences reach {}",
                self.value, largest
            ),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RectangularOptions {
    pub show_labels: bool,
    pub location_palette: String,
    pub secondary_palette: String,
    pub secondary_field: String,
    pub support: SupportThreshold,
    pub midpoint_root: bool,
    pub min_width: u32,
    pub min_height: u32,
    pub row_pitch: u32,
    pub char_width: u32,
    pub label_wrap: usize,
    /// Distance of the secondary strip beyond the rightmost tip, as a share
    /// of the tree width.
    pub strip_offset: f64,
}

impl Default for RectangularOptions {
    fn default() -> Self {
        Self {
            show_labels: false,
            location_palette: DEFAULT_QUALITATIVE.to_owned(),
            secondary_palette: DEFAULT_QUALITATIVE.to_owned(),
            secondary_field: DEFAULT_SECONDARY_COLUMN.to_owned(),
            support: SupportThreshold::default(),
            midpoint_root: true,
            min_width: 1200,
            min_height: 1000,
            row_pitch: 25,
            char_width: 10,
            label_wrap: 75,
            strip_offset: 0.08,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadialOptions {
    /// Column colouring the outer ring; `region` then `location` otherwise.
    pub color_by: Option<String>,
    pub palette: String,
    pub midpoint_root: bool,
    pub radial_scale: f64,
    pub ring_offset: f64,
}

impl Default for RadialOptions {
    fn default() -> Self {
        Self {
            color_by: None,
            palette: DEFAULT_QUALITATIVE.to_owned(),
            midpoint_root: true,
            radial_scale: 15.0,
            ring_offset: 1.2,
        }
    }
}

/// Output of the rectangular engine.
#[derive(Debug, Clone, Serialize)]
pub struct RectangularFigure {
    pub space: CoordinateSpace,
    pub primitives: Vec<DrawPrimitive>,
    pub canvas: CanvasSize,
    /// `(x, y)` per node id of `tree`.
    pub coordinates: Vec<Point>,
    pub scale_bar: Option<ScaleBar>,
    pub capabilities: MetadataCapabilities,
    /// Tips and rows that found no partner in the metadata join.
    pub join_report: JoinReport,
    /// The midpoint-rooted tree the coordinates refer to.
    #[serde(skip)]
    pub tree: Tree,
}

/// Output of the radial engine.
#[derive(Debug, Clone, Serialize)]
pub struct RadialFigure {
    pub space: CoordinateSpace,
    pub primitives: Vec<DrawPrimitive>,
    pub ring_radius: f64,
    /// `(theta, r)` per node id of `tree`.
    pub coordinates: Vec<Point>,
    pub color_field: Option<String>,
    pub join_report: JoinReport,
    #[serde(skip)]
    pub tree: Tree,
}

/// Rounded scale bar length close to a tenth of `total`.
pub fn nice_tick_span(total: f64) -> Option<f64> {
    if !total.is_finite() || total <= f64::EPSILON {
        return None;
    }

    let target = total * 0.1;
    let magnitude = 10.0f64.powf(target.log10().floor());
    let normalized = target / magnitude;

    let nice = if normalized < 2.0 {
        1.0
    } else if normalized < 5.0 {
        2.0
    } else {
        5.0
    };

    Some(nice * magnitude)
}

/// Break `label` into lines of at most `width` characters.
pub fn wrap_label(label: &str, width: usize) -> String {
    if width == 0 {
        return label.to_owned();
    }
    let chars: Vec<char> = label.chars().collect();
    chars
        .chunks(width)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}
