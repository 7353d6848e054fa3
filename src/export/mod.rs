use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::app::ExportFormat;
use crate::ui::Figure;

pub mod json;
pub mod svg;

/// Write `figure` to `output`, or to stdout when no path is given.
pub fn write_figure(figure: &Figure, format: ExportFormat, output: Option<&Path>) -> Result<()> {
    match (format, output) {
        (ExportFormat::Svg, Some(path)) => svg::export_svg(figure, path)?,
        (ExportFormat::Svg, None) => {
            let bytes = svg::render_svg_bytes(figure)?;
            io::stdout()
                .lock()
                .write_all(&bytes)
                .context("failed to write SVG to stdout")?;
        }
        (ExportFormat::Json, Some(path)) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            json::write_json(figure, &mut writer)?;
            writer.flush().context("failed to flush JSON output")?;
        }
        (ExportFormat::Json, None) => {
            let text = json::to_json(figure)?;
            writeln!(io::stdout().lock(), "{text}").context("failed to write JSON to stdout")?;
        }
    }

    match output {
        Some(path) => info!("Wrote {} figure to {}", format, path.display()),
        None => info!("Wrote {} figure to stdout", format),
    }
    Ok(())
}
