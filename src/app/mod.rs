use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{info, warn};

use crate::markers::{MapMarker, MarkerStore};
use crate::metadata::{MetadataLayout, DEFAULT_SECONDARY_COLUMN};
use crate::palette::{ColorScale, DEFAULT_QUALITATIVE};
use crate::tree::layout::{RadialOptions, RectangularOptions, SupportThreshold, SupportUnit};
use crate::ui::{self, RenderRequest, View};
use crate::{export, io};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "phylodash",
    about = "Lays out phylogenetic trees, SNP distance heatmaps and marker maps as draw primitives."
)]
pub struct AppConfig {
    /// View to render.
    #[arg(long, value_enum, default_value_t = View::Rectangular)]
    pub view: View,

    /// Tree file (Newick or Nexus).
    #[arg(long, value_name = "TREE_FILE")]
    pub tree: Option<PathBuf>,

    /// Tab-separated metadata keyed by a `taxa` column.
    #[arg(long, value_name = "METADATA_FILE")]
    pub metadata: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = MetadataLayout::Header)]
    pub metadata_layout: MetadataLayout,

    /// Tab-separated SNP distance matrix for the heatmap view.
    #[arg(long, value_name = "MATRIX_FILE")]
    pub matrix: Option<PathBuf>,

    /// Output path; stdout when omitted.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
    pub format: ExportFormat,

    /// Print tip labels next to the tip markers.
    #[arg(long)]
    pub show_labels: bool,

    /// Qualitative palette for the location column.
    #[arg(long, env = "PHYLODASH_LOCATION_PALETTE", default_value = DEFAULT_QUALITATIVE)]
    pub location_palette: String,

    /// Qualitative palette for the secondary strip.
    #[arg(long, env = "PHYLODASH_MLST_PALETTE", default_value = DEFAULT_QUALITATIVE)]
    pub mlst_palette: String,

    /// Column drawn as the secondary strip when present.
    #[arg(long, default_value = DEFAULT_SECONDARY_COLUMN)]
    pub secondary_field: String,

    /// Column colouring the radial ring; falls back to `region`, then `location`.
    #[arg(long)]
    pub color_by: Option<String>,

    /// Confidence above which a clade gets a support marker.
    #[arg(long, default_value_t = 90.0)]
    pub support_threshold: f64,

    /// Unit the tree's confidences are recorded in.
    #[arg(long, value_enum, default_value_t = SupportUnit::Percent)]
    pub support_unit: SupportUnit,

    /// Heatmap colour scale (viridis, plasma, inferno, ...); unknown names use viridis.
    #[arg(long, default_value = "viridis")]
    pub heatmap_scale: String,

    /// Map marker as NAME,LAT,LON. Repeatable.
    #[arg(long = "marker", value_name = "NAME,LAT,LON")]
    pub markers: Vec<MapMarker>,

    /// Lay out the tree with its input root instead of midpoint rooting.
    #[arg(long)]
    pub no_midpoint: bool,

    /// Print a short summary of the laid-out tree to stdout as well.
    #[arg(long)]
    pub preview: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Svg,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Svg => write!(f, "svg"),
        }
    }
}

/// Process outcome: inline warnings still exit successfully.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Outcome {
    Rendered,
    Warned,
    Failed,
}

pub struct PhyloDashApp;

impl PhyloDashApp {
    pub fn run(config: &AppConfig) -> Result<Outcome> {
        let request = Self::build_request(config)?;

        info!("Rendering {} view", config.view);
        match ui::render(&request) {
            Ok(figure) => {
                if config.preview {
                    match figure.tree() {
                        Some(tree) => ui::render_preview(tree),
                        None => warn!("Preview skipped: the {} view has no tree", config.view),
                    }
                }
                export::write_figure(&figure, config.format, config.output.as_deref())?;
                Ok(Outcome::Rendered)
            }
            Err(message) => {
                eprintln!("{message}");
                if message.is_error() {
                    Ok(Outcome::Failed)
                } else {
                    Ok(Outcome::Warned)
                }
            }
        }
    }

    pub fn build_request(config: &AppConfig) -> Result<RenderRequest> {
        let tree_text = config
            .tree
            .as_deref()
            .map(|path| io::read_upload(path, "tree"))
            .transpose()?;
        let metadata_text = config
            .metadata
            .as_deref()
            .map(|path| io::read_upload(path, "metadata"))
            .transpose()?;
        let matrix_text = config
            .matrix
            .as_deref()
            .map(|path| io::read_upload(path, "SNP distance"))
            .transpose()?;

        Ok(RenderRequest {
            view: config.view,
            tree_text,
            metadata_text,
            metadata_layout: config.metadata_layout,
            matrix_text,
            markers: config.markers.iter().cloned().collect::<MarkerStore>(),
            rectangular: RectangularOptions {
                show_labels: config.show_labels,
                location_palette: config.location_palette.clone(),
                secondary_palette: config.mlst_palette.clone(),
                secondary_field: config.secondary_field.clone(),
                support: SupportThreshold {
                    value: config.support_threshold,
                    unit: config.support_unit,
                },
                midpoint_root: !config.no_midpoint,
                ..RectangularOptions::default()
            },
            radial: RadialOptions {
                color_by: config.color_by.clone(),
                palette: config.location_palette.clone(),
                midpoint_root: !config.no_midpoint,
                ..RadialOptions::default()
            },
            heatmap_scale: ColorScale::from_name(&config.heatmap_scale),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn config(args: &[&str]) -> AppConfig {
        let mut argv = vec!["phylodash"];
        argv.extend_from_slice(args);
        AppConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_the_dashboard() {
        let config = config(&[]);
        assert_eq!(config.view, View::Rectangular);
        assert_eq!(config.format, ExportFormat::Json);
        assert!(!config.show_labels);
        assert_eq!(config.secondary_field, "MLST");
        assert_eq!(config.support_threshold, 90.0);
        assert!(config.markers.is_empty());
    }

    #[test]
    fn builds_request_from_flags_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree.nwk");
        fs::write(&tree, "(A:1,B:2);").unwrap();

        let config = config(&[
            "--view",
            "radial",
            "--tree",
            tree.to_str().unwrap(),
            "--heatmap-scale",
            "sunset",
            "--support-unit",
            "fraction",
            "--support-threshold",
            "0.9",
            "--marker",
            "lab,1.5,2.5",
            "--no-midpoint",
        ]);
        let request = PhyloDashApp::build_request(&config).unwrap();

        assert_eq!(request.view, View::Radial);
        assert_eq!(request.tree_text.as_deref(), Some("(A:1,B:2);"));
        assert!(request.metadata_text.is_none());
        assert_eq!(request.heatmap_scale, ColorScale::Viridis);
        assert_eq!(request.rectangular.support.unit, SupportUnit::Fraction);
        assert!(!request.radial.midpoint_root);
        assert_eq!(request.markers.len(), 1);
    }

    #[test]
    fn rejects_malformed_marker() {
        let argv = ["phylodash", "--marker", "lab,north,2"];
        assert!(AppConfig::try_parse_from(argv).is_err());
    }

    #[test]
    fn run_reports_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree.nwk");
        let metadata = dir.path().join("meta.tsv");
        let output = dir.path().join("out.svg");
        fs::write(&tree, "(A:1,(B:1,(C:1,D:1):1):1);").unwrap();
        fs::write(&metadata, "taxa\tlocation\nA\tx\nB\ty\n").unwrap();

        let only_tree = config(&["--tree", tree.to_str().unwrap()]);
        assert_eq!(PhyloDashApp::run(&only_tree).unwrap(), Outcome::Warned);

        let full = config(&[
            "--tree",
            tree.to_str().unwrap(),
            "--metadata",
            metadata.to_str().unwrap(),
            "--format",
            "svg",
            "--output",
            output.to_str().unwrap(),
            "--preview",
        ]);
        assert_eq!(PhyloDashApp::run(&full).unwrap(), Outcome::Rendered);
        assert!(fs::read_to_string(&output).unwrap().contains("<svg"));

        fs::write(&tree, "((A,B);").unwrap();
        assert_eq!(PhyloDashApp::run(&full).unwrap(), Outcome::Failed);

        let missing = config(&["--tree", dir.path().join("nope").to_str().unwrap()]);
        assert!(PhyloDashApp::run(&missing).is_err());
    }
}
