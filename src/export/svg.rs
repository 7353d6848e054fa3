use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use svg::node::element::{Circle, Group, Line, Polygon, Rectangle, Text};
use svg::Document;
use tempfile::NamedTempFile;

use crate::markers::MapFigure;
use crate::matrix::HeatmapFigure;
use crate::tree::layout::{
    legend, DrawPrimitive, Marker, MarkerShape, Point, RadialFigure, RectangularFigure,
};
use crate::ui::Figure;

const BRANCH_COLOR: &str = "#000000";
const BRANCH_WIDTH: f64 = 1.5;
const MARKER_STROKE: &str = "#000000";
const LABEL_COLOR: &str = "#1e1e1e";
const LABEL_FONT_SIZE: f64 = 11.0;
const LABEL_CHAR_WIDTH: f64 = 6.5;
const RADIAL_SIZE: u32 = 1000;
const MAP_SIZE: (u32, u32) = (1000, 500);
const HEATMAP_CELL: f64 = 22.0;
const HEATMAP_LABEL_ROOM: f64 = 120.0;

/// Write the figure as an SVG document at `path`.
pub fn export_svg(figure: &Figure, path: &Path) -> Result<()> {
    svg::save(path, &render_document(figure))
        .with_context(|| format!("failed to save SVG to {}", path.display()))
}

/// Render into a temporary file and return its bytes; the file is removed
/// when this returns.
pub fn render_svg_bytes(figure: &Figure) -> Result<Vec<u8>> {
    let file = NamedTempFile::new().context("failed to create temporary SVG file")?;
    export_svg(figure, file.path())?;
    fs::read(file.path()).context("failed to read back temporary SVG file")
}

pub fn render_document(figure: &Figure) -> Document {
    match figure {
        Figure::Rectangular(figure) => rectangular_document(figure),
        Figure::Radial(figure) => radial_document(figure),
        Figure::Heatmap(figure) => heatmap_document(figure),
        Figure::Map(figure) => map_document(figure),
    }
}

fn blank_document(width: u32, height: u32) -> Document {
    let background = Rectangle::new()
        .set("width", "100%")
        .set("height", "100%")
        .set("fill", "white");
    Document::new()
        .set("width", width)
        .set("height", height)
        .set("viewBox", (0, 0, width as i32, height as i32))
        .add(background)
}

/// Affine map from layout units to pixels.
struct CartesianTransform {
    origin: Point,
    min: Point,
    scale: Point,
}

impl CartesianTransform {
    fn map(&self, pos: Point) -> Point {
        (
            self.origin.0 + (pos.0 - self.min.0) * self.scale.0,
            self.origin.1 + (pos.1 - self.min.1) * self.scale.1,
        )
    }
}

fn extent(primitives: &[DrawPrimitive]) -> Option<(Point, Point)> {
    let mut points = primitives.iter().flat_map(|primitive| match primitive {
        DrawPrimitive::LineSegment { start, end } => vec![*start, *end],
        DrawPrimitive::Marker(marker) => vec![marker.position],
    });
    let first = points.next()?;
    Some(points.fold((first, first), |(low, high), (x, y)| {
        ((low.0.min(x), low.1.min(y)), (high.0.max(x), high.1.max(y)))
    }))
}

fn rectangular_document(figure: &RectangularFigure) -> Document {
    let width = figure.canvas.width;
    let height = figure.canvas.height;
    let margin_x = (width as f64 * 0.05).clamp(20.0, 60.0);
    let margin_y = (height as f64 * 0.05).clamp(20.0, 40.0);

    let longest_label = figure
        .primitives
        .iter()
        .filter_map(DrawPrimitive::as_marker)
        .filter_map(|marker| marker.label.as_deref())
        .flat_map(str::lines)
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0);
    let inner_width = width as f64 - 2.0 * margin_x;
    let label_room = (longest_label as f64 * LABEL_CHAR_WIDTH + 12.0).min(inner_width * 0.5);
    let plot_width = (inner_width - label_room).max(1.0);
    let plot_height = (height as f64 - 2.0 * margin_y).max(1.0);

    let ((min_x, mut min_y), (max_x, max_y)) =
        extent(&figure.primitives).unwrap_or(((0.0, 0.0), (1.0, 1.0)));
    if figure.scale_bar.is_some() {
        min_y = min_y.min(-1.0);
    }
    let transform = CartesianTransform {
        origin: (margin_x, margin_y),
        min: (min_x, min_y),
        scale: (
            plot_width / (max_x - min_x).max(f64::EPSILON),
            plot_height / (max_y - min_y).max(1.0),
        ),
    };

    let mut tree_group = Group::new().set("id", "tree");
    tree_group = add_primitives(tree_group, &figure.primitives, |pos| transform.map(pos), 6.0);

    let mut document = blank_document(width, height).add(tree_group);

    if let Some(bar) = &figure.scale_bar {
        let start = transform.map(bar.start);
        let end = transform.map(bar.end);
        let mut scale_bar_group = Group::new().set("id", "scale_bar");
        scale_bar_group = scale_bar_group.add(
            Line::new()
                .set("x1", start.0)
                .set("y1", start.1)
                .set("x2", end.0)
                .set("y2", end.1)
                .set("stroke", BRANCH_COLOR)
                .set("stroke-width", 2.0),
        );
        scale_bar_group = scale_bar_group.add(
            Text::new("")
                .set("x", (start.0 + end.0) * 0.5)
                .set("y", start.1 - 6.0)
                .set("font-size", LABEL_FONT_SIZE)
                .set("fill", LABEL_COLOR)
                .set("text-anchor", "middle")
                .add(svg::node::Text::new(format!("{}", bar.length))),
        );
        document = document.add(scale_bar_group);
    }

    document.add(legend_group(&figure.primitives, width as f64 - margin_x, margin_y))
}

fn radial_document(figure: &RadialFigure) -> Document {
    let size = RADIAL_SIZE as f64;
    let center = size * 0.5;
    let radius_px = size * 0.5 - 60.0;
    let scale = radius_px / figure.ring_radius.max(f64::EPSILON);
    let to_svg = |(theta, r): Point| {
        (
            center + r * scale * theta.cos(),
            center + r * scale * theta.sin(),
        )
    };

    let mut tree_group = Group::new().set("id", "tree");
    tree_group = add_primitives(tree_group, &figure.primitives, to_svg, 5.0);

    blank_document(RADIAL_SIZE, RADIAL_SIZE)
        .add(tree_group)
        .add(legend_group(&figure.primitives, size - 20.0, 20.0))
}

fn heatmap_document(figure: &HeatmapFigure) -> Document {
    let samples = &figure.matrix.samples;
    let side = samples.len() as f64 * HEATMAP_CELL;
    let total = (side + HEATMAP_LABEL_ROOM + 20.0).ceil() as u32;

    let mut cells = Group::new().set("id", "heatmap");
    for (row, sample) in samples.iter().enumerate() {
        let y = HEATMAP_LABEL_ROOM + row as f64 * HEATMAP_CELL;
        cells = cells.add(
            Text::new("")
                .set("x", HEATMAP_LABEL_ROOM - 6.0)
                .set("y", y + HEATMAP_CELL * 0.5)
                .set("font-size", LABEL_FONT_SIZE)
                .set("text-anchor", "end")
                .set("dominant-baseline", "middle")
                .add(svg::node::Text::new(sample.clone())),
        );
        let x = HEATMAP_LABEL_ROOM + row as f64 * HEATMAP_CELL + HEATMAP_CELL * 0.5;
        cells = cells.add(
            Text::new("")
                .set("x", x)
                .set("y", HEATMAP_LABEL_ROOM - 6.0)
                .set("font-size", LABEL_FONT_SIZE)
                .set("transform", format!("rotate(-90 {x} {})", HEATMAP_LABEL_ROOM - 6.0))
                .add(svg::node::Text::new(sample.clone())),
        );

        for column in 0..samples.len() {
            let Some(color) = figure.cell_color(row, column) else {
                continue;
            };
            cells = cells.add(
                Rectangle::new()
                    .set("x", HEATMAP_LABEL_ROOM + column as f64 * HEATMAP_CELL)
                    .set("y", y)
                    .set("width", HEATMAP_CELL)
                    .set("height", HEATMAP_CELL)
                    .set("fill", color),
            );
        }
    }

    blank_document(total, total).add(cells)
}

fn map_document(figure: &MapFigure) -> Document {
    let (width, height) = MAP_SIZE;
    let to_svg = |(lon, lat): Point| {
        (
            (lon + 180.0) / 360.0 * width as f64,
            (90.0 - lat) / 180.0 * height as f64,
        )
    };

    let mut markers = Group::new().set("id", "markers");
    markers = add_primitives(markers, &figure.primitives, to_svg, 6.0);
    blank_document(width, height).add(markers)
}

fn add_primitives(
    mut group: Group,
    primitives: &[DrawPrimitive],
    to_svg: impl Fn(Point) -> Point,
    marker_radius: f64,
) -> Group {
    for primitive in primitives {
        match primitive {
            DrawPrimitive::LineSegment { start, end } => {
                let (x1, y1) = to_svg(*start);
                let (x2, y2) = to_svg(*end);
                group = group.add(
                    Line::new()
                        .set("x1", x1)
                        .set("y1", y1)
                        .set("x2", x2)
                        .set("y2", y2)
                        .set("stroke", BRANCH_COLOR)
                        .set("stroke-width", BRANCH_WIDTH),
                );
            }
            DrawPrimitive::Marker(marker) => {
                let at = to_svg(marker.position);
                group = add_marker(group, marker, at, marker_radius);
                if let Some(label) = &marker.label {
                    group = add_label(group, label, at, marker_radius);
                }
            }
        }
    }
    group
}

fn add_marker(group: Group, marker: &Marker, (x, y): Point, radius: f64) -> Group {
    match marker.shape {
        MarkerShape::Circle => group.add(
            Circle::new()
                .set("cx", x)
                .set("cy", y)
                .set("r", radius)
                .set("fill", marker.color.as_str())
                .set("stroke", MARKER_STROKE)
                .set("stroke-width", 1.0),
        ),
        MarkerShape::Square => group.add(
            Rectangle::new()
                .set("x", x - radius)
                .set("y", y - radius)
                .set("width", radius * 2.0)
                .set("height", radius * 2.0)
                .set("fill", marker.color.as_str()),
        ),
        MarkerShape::Diamond => {
            let points = format!(
                "{},{} {},{} {},{} {},{}",
                x,
                y - radius,
                x + radius,
                y,
                x,
                y + radius,
                x - radius,
                y
            );
            group.add(
                Polygon::new()
                    .set("points", points)
                    .set("fill", marker.color.as_str()),
            )
        }
    }
}

fn add_label(mut group: Group, label: &str, (x, y): Point, offset: f64) -> Group {
    let line_height = LABEL_FONT_SIZE * 1.2;
    for (index, line) in label.lines().enumerate() {
        group = group.add(
            Text::new("")
                .set("x", x + offset + 4.0)
                .set("y", y + index as f64 * line_height)
                .set("font-size", LABEL_FONT_SIZE)
                .set("fill", LABEL_COLOR)
                .set("dominant-baseline", "middle")
                .set("text-anchor", "start")
                .add(svg::node::Text::new(line.to_owned())),
        );
    }
    group
}

fn legend_group(primitives: &[DrawPrimitive], right: f64, top: f64) -> Group {
    let mut group = Group::new().set("id", "legend");
    for (index, entry) in legend(primitives).iter().enumerate() {
        let y = top + index as f64 * 18.0;
        group = group.add(
            Rectangle::new()
                .set("x", right - 12.0)
                .set("y", y)
                .set("width", 12.0)
                .set("height", 12.0)
                .set("fill", entry.color.as_str()),
        );
        group = group.add(
            Text::new("")
                .set("x", right - 18.0)
                .set("y", y + 6.0)
                .set("font-size", LABEL_FONT_SIZE)
                .set("fill", LABEL_COLOR)
                .set("dominant-baseline", "middle")
                .set("text-anchor", "end")
                .add(svg::node::Text::new(entry.group.clone())),
        );
    }
    group
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::{render_map, MapMarker, MarkerStore};
    use crate::matrix::{pivot, DistanceTable};
    use crate::metadata::MetadataTable;
    use crate::palette::ColorScale;
    use crate::tree::layout::{layout_radial, layout_rectangular, RadialOptions, RectangularOptions};
    use crate::tree::test_support::parse;

    fn metadata() -> MetadataTable {
        MetadataTable::parse_with_header("taxa\tlocation\tMLST\nA\tloc1\tST1\nB\tloc2\tST2\n")
            .unwrap()
    }

    fn rectangular() -> Figure {
        let tree = parse("((A:1,B:1)95:1,(C:1,D:1):1);");
        Figure::Rectangular(
            layout_rectangular(&tree, &metadata(), &RectangularOptions::default()).unwrap(),
        )
    }

    #[test]
    fn rectangular_svg_has_branches_markers_and_labels() {
        let text = render_document(&rectangular()).to_string();
        assert!(text.contains("<line"));
        assert!(text.contains("<circle"));
        assert!(text.contains("<polygon"));
        assert!(text.contains("id=\"scale_bar\""));
        assert!(text.matches("<text").count() >= 4);
        assert!(text.contains("MLST: ST1"));
    }

    #[test]
    fn streaming_export_round_trips_through_a_temp_file() {
        let figure = rectangular();
        let bytes = render_svg_bytes(&figure).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("<svg"));
        assert_eq!(text.trim_end(), render_document(&figure).to_string().trim_end());
    }

    #[test]
    fn other_views_render() {
        let tree = parse("(A:1,(B:1,(C:1,D:1):1):1);");
        let radial = layout_radial(&tree, &metadata(), &RadialOptions::default()).unwrap();
        let text = render_document(&Figure::Radial(radial)).to_string();
        // Background, four ring squares, legend swatches for loc1, loc2 and Unknown.
        assert_eq!(text.matches("<rect").count(), 1 + 4 + 3);

        let table = DistanceTable::parse_tsv("id\tS1\tS2\nS1\t0\t5\nS2\t5\t0\n").unwrap();
        let heatmap = HeatmapFigure::new(pivot(&table.melt()).unwrap(), ColorScale::Viridis);
        let text = render_document(&Figure::Heatmap(heatmap)).to_string();
        assert_eq!(text.matches("<rect").count(), 1 + 4);

        let store = MarkerStore::new().with_marker(MapMarker {
            name: "lab".into(),
            lat: 0.0,
            lon: 0.0,
        });
        let text = render_document(&Figure::Map(render_map(&store))).to_string();
        assert!(text.contains("cx=\"500\""));
    }
}
