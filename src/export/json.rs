use std::io::Write;

use anyhow::{Context, Result};

use crate::ui::Figure;

/// Pretty-printed JSON of the figure's primitives for the chart renderer.
pub fn write_json<W: Write>(figure: &Figure, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, figure).context("failed to serialise figure as JSON")
}

pub fn to_json(figure: &Figure) -> Result<String> {
    serde_json::to_string_pretty(figure).context("failed to serialise figure as JSON")
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::markers::{render_map, MarkerStore};
    use crate::metadata::MetadataTable;
    use crate::tree::layout::{layout_rectangular, RectangularOptions};
    use crate::tree::test_support::parse;

    #[test]
    fn rectangular_figure_serialises_primitives() {
        let tree = parse("(A:1,(B:1,(C:1,D:1):1):1);");
        let metadata =
            MetadataTable::parse_with_header("taxa\tlocation\nA\tloc1\nB\tloc2\n").unwrap();
        let figure = Figure::Rectangular(
            layout_rectangular(
                &tree,
                &metadata,
                &RectangularOptions {
                    show_labels: true,
                    ..RectangularOptions::default()
                },
            )
            .unwrap(),
        );

        let value: Value = serde_json::from_str(&to_json(&figure).unwrap()).unwrap();
        assert_eq!(value["view"], "rectangular");
        assert_eq!(value["space"], "cartesian");
        assert_eq!(value["canvas"]["width"], 1200);
        assert_eq!(value["capabilities"]["has_location"], true);
        assert_eq!(value["join_report"]["matched_tips"], 2);
        assert_eq!(value["join_report"]["unmatched_tips"], Value::from(vec!["C", "D"]));

        let primitives = value["primitives"].as_array().unwrap();
        assert_eq!(primitives[0]["kind"], "line_segment");
        let marker = primitives
            .iter()
            .find(|primitive| primitive["kind"] == "marker")
            .unwrap();
        assert_eq!(marker["shape"], "circle");
        assert_eq!(marker["legend_group"], "loc1");
        assert_eq!(marker["label"], "A");
    }

    #[test]
    fn writes_to_any_writer() {
        let mut buffer = Vec::new();
        write_json(&Figure::Map(render_map(&MarkerStore::new())), &mut buffer).unwrap();
        let value: Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value["view"], "map");
        assert_eq!(value["zoom"], 6);
        assert!(value["primitives"].as_array().unwrap().is_empty());
    }
}
