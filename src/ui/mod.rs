//! Render boundary: turns raw inputs into a figure or a message for the user.
//! Nothing raised below this point escapes it.

use std::fmt;

use clap::ValueEnum;
use log::{error, warn};
use serde::Serialize;

use crate::io;
use crate::markers::{self, MapFigure, MarkerStore};
use crate::matrix::{self, DistanceTable, HeatmapFigure};
use crate::metadata::{MetadataLayout, MetadataTable};
use crate::palette::ColorScale;
use crate::tree::layout::{
    layout_radial, layout_rectangular, RadialFigure, RadialOptions, RectangularFigure,
    RectangularOptions,
};
use crate::tree::Tree;

pub const MISSING_TREE_INPUTS: &str = "Please upload both a tree file and metadata file.";
pub const MISSING_MATRIX_INPUT: &str = "Please upload a SNP distance matrix file.";

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Rectangular,
    Radial,
    Heatmap,
    Map,
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Rectangular => write!(f, "rectangular"),
            View::Radial => write!(f, "radial"),
            View::Heatmap => write!(f, "heatmap"),
            View::Map => write!(f, "map"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum Figure {
    Rectangular(RectangularFigure),
    Radial(RadialFigure),
    Heatmap(HeatmapFigure),
    Map(MapFigure),
}

impl Figure {
    /// The tree a tree view was laid out from, after any rerooting.
    pub fn tree(&self) -> Option<&Tree> {
        match self {
            Figure::Rectangular(figure) => Some(&figure.tree),
            Figure::Radial(figure) => Some(&figure.tree),
            Figure::Heatmap(_) | Figure::Map(_) => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Message shown in place of a figure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineMessage {
    pub severity: Severity,
    pub text: String,
}

impl InlineMessage {
    fn warning(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            text: text.into(),
        }
    }

    fn error(context: &str, err: impl fmt::Display) -> Self {
        let text = format!("Error processing {context}: {err}");
        error!("{}", text);
        Self {
            severity: Severity::Error,
            text,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for InlineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Warning => write!(f, "warning: {}", self.text),
            Severity::Error => write!(f, "error: {}", self.text),
        }
    }
}

/// Everything one render needs. Inputs are raw text as uploaded.
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    pub view: View,
    pub tree_text: Option<String>,
    pub metadata_text: Option<String>,
    pub metadata_layout: MetadataLayout,
    pub matrix_text: Option<String>,
    pub markers: MarkerStore,
    pub rectangular: RectangularOptions,
    pub radial: RadialOptions,
    pub heatmap_scale: ColorScale,
}

/// Render the requested view. Each call starts from scratch.
pub fn render(request: &RenderRequest) -> Result<Figure, InlineMessage> {
    match request.view {
        View::Rectangular => {
            let (tree, metadata) = tree_inputs(request)?;
            layout_rectangular(&tree, &metadata, &request.rectangular)
                .map(Figure::Rectangular)
                .map_err(|err| InlineMessage::error("tree file", err))
        }
        View::Radial => {
            let (tree, metadata) = tree_inputs(request)?;
            layout_radial(&tree, &metadata, &request.radial)
                .map(Figure::Radial)
                .map_err(|err| InlineMessage::error("tree file", err))
        }
        View::Heatmap => {
            let Some(raw) = request.matrix_text.as_deref() else {
                warn!("Heatmap requested without a distance matrix");
                return Err(InlineMessage::warning(MISSING_MATRIX_INPUT));
            };
            DistanceTable::parse_tsv(raw)
                .and_then(|table| matrix::pivot(&table.melt()))
                .map(|matrix| Figure::Heatmap(HeatmapFigure::new(matrix, request.heatmap_scale)))
                .map_err(|err| InlineMessage::error("SNP distance file", err))
        }
        View::Map => Ok(Figure::Map(markers::render_map(&request.markers))),
    }
}

fn tree_inputs(request: &RenderRequest) -> Result<(Tree, MetadataTable), InlineMessage> {
    let (Some(tree_text), Some(metadata_text)) =
        (request.tree_text.as_deref(), request.metadata_text.as_deref())
    else {
        warn!("Tree view requested without both inputs");
        return Err(InlineMessage::warning(MISSING_TREE_INPUTS));
    };

    let tree =
        io::parse_tree_text(tree_text).map_err(|err| InlineMessage::error("tree file", err))?;
    let metadata = MetadataTable::parse(metadata_text, request.metadata_layout)
        .map_err(|err| InlineMessage::error("metadata file", err))?;
    Ok((tree, metadata))
}

/// Short text summary of a tree for headless runs.
pub fn preview_lines(tree: &Tree) -> Vec<String> {
    let tips = tree.tips();
    let mut lines = vec![
        format!(
            "Loaded tree{} with {} tip(s) and {} internal node(s).",
            tree.label
                .as_deref()
                .map(|label| format!(" '{label}'"))
                .unwrap_or_default(),
            tips.len(),
            tree.len() - tips.len()
        ),
        format!("Deepest tip lies {:.6} from the root.", tree.max_tip_depth()),
    ];

    for tip in tips.iter().take(3) {
        lines.push(format!("- {}", tree.node(*tip).display_name()));
    }
    if tips.len() > 3 {
        lines.push(format!("... ({} more tip(s) omitted)", tips.len() - 3));
    }
    lines
}

pub fn render_preview(tree: &Tree) {
    for line in preview_lines(tree) {
        println!("{line}");
    }
}
