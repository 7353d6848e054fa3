use log::{debug, info};

use super::{
    nice_tick_span, wrap_label, CanvasSize, CoordinateSpace, DrawPrimitive, LegendTracker, Marker,
    MarkerShape, Point, RectangularFigure, RectangularOptions, ScaleBar,
};
use crate::error::SchemaError;
use crate::metadata::{self, MetadataTable, LOCATION_COLUMN};
use crate::palette;
use crate::tree::{NodeId, Tree, DRAWN_MIN_BRANCH_LENGTH};

const SUPPORT_COLOR: &str = "#000000";

/// Left-to-right cladogram of `tree` with tips coloured by `location`.
///
/// The tree is midpoint-rooted first unless disabled in `options`. Fails when
/// the metadata has no `taxa` or `location` column; a missing secondary
/// column only drops the secondary strip.
pub fn layout_rectangular(
    tree: &Tree,
    metadata: &MetadataTable,
    options: &RectangularOptions,
) -> Result<RectangularFigure, SchemaError> {
    metadata.require(&[LOCATION_COLUMN])?;
    let capabilities = metadata.capabilities(&options.secondary_field);

    let tree = if options.midpoint_root {
        tree.midpoint_rooted()
    } else {
        tree.clone()
    };
    let joined = metadata::join(metadata, &tree, &[LOCATION_COLUMN])?;

    let coordinates = compute_coordinates(&tree);
    let tips = tree.tips();

    let mut primitives = Vec::with_capacity(tree.len() * 3);
    push_branch_segments(&tree, &coordinates, &mut primitives);

    let location_colors =
        palette::resolve(&metadata.categories(LOCATION_COLUMN), &options.location_palette);
    let mut legend = LegendTracker::default();
    for &tip in &tips {
        let category = joined.category(tip, LOCATION_COLUMN);
        let label = options
            .show_labels
            .then(|| wrap_label(tree.node(tip).display_name(), options.label_wrap));
        primitives.push(DrawPrimitive::Marker(Marker {
            position: coordinates[tip],
            color: location_colors.color(category).to_owned(),
            label,
            legend_group: Some(category.to_owned()),
            show_in_legend: legend.first_sighting(category),
            shape: MarkerShape::Circle,
        }));
    }

    options.support.check_unit(&tree.confidences());
    for id in tree.internal_nodes() {
        if options.support.is_supported(tree.node(id).confidence) {
            primitives.push(DrawPrimitive::Marker(Marker {
                position: coordinates[id],
                color: SUPPORT_COLOR.to_owned(),
                label: None,
                legend_group: None,
                show_in_legend: false,
                shape: MarkerShape::Diamond,
            }));
        }
    }

    let max_tip_x = tips
        .iter()
        .map(|tip| coordinates[*tip].0)
        .fold(0.0f64, f64::max);

    if let Some(field) = capabilities.secondary_field.as_deref() {
        let strip_x = max_tip_x + (max_tip_x * options.strip_offset).max(DRAWN_MIN_BRANCH_LENGTH);
        let colors = palette::resolve(&metadata.categories(field), &options.secondary_palette);
        let mut strip_legend = LegendTracker::default();
        for &tip in &tips {
            let category = joined.category(tip, field);
            let group = format!("{field}: {category}");
            primitives.push(DrawPrimitive::Marker(Marker {
                position: (strip_x, coordinates[tip].1),
                color: colors.color(category).to_owned(),
                label: None,
                show_in_legend: strip_legend.first_sighting(&group),
                legend_group: Some(group),
                shape: MarkerShape::Square,
            }));
        }
    } else {
        debug!(
            "No '{}' column in metadata; secondary strip omitted",
            options.secondary_field
        );
    }

    let canvas = canvas_size(&tree, &tips, options);
    let scale_bar = nice_tick_span(max_tip_x).map(|length| ScaleBar {
        start: (0.0, -1.0),
        end: (length, -1.0),
        length,
    });

    info!(
        "Rectangular layout: {} tips, {} primitives, canvas {}x{}",
        tips.len(),
        primitives.len(),
        canvas.width,
        canvas.height
    );

    Ok(RectangularFigure {
        space: CoordinateSpace::Cartesian,
        primitives,
        canvas,
        coordinates,
        scale_bar,
        capabilities,
        join_report: joined.report().clone(),
        tree,
    })
}

/// `x` accumulates drawn branch lengths from the root. Tips take rows
/// `0, 1, 2, ...` in input order; an internal node sits halfway between its
/// first and last child.
fn compute_coordinates(tree: &Tree) -> Vec<Point> {
    let mut positions = vec![(0.0f64, 0.0f64); tree.len()];

    for id in tree.pre_order() {
        let node = tree.node(id);
        if let Some(parent) = node.parent {
            positions[id].0 = positions[parent].0 + node.drawn_length();
        }
    }

    let mut next_row = 0usize;
    for id in tree.post_order() {
        let node = tree.node(id);
        positions[id].1 = match (node.children.first(), node.children.last()) {
            (Some(first), Some(last)) => (positions[*first].1 + positions[*last].1) / 2.0,
            _ => {
                let row = next_row as f64;
                next_row += 1;
                row
            }
        };
    }

    positions
}

fn push_branch_segments(tree: &Tree, positions: &[Point], primitives: &mut Vec<DrawPrimitive>) {
    for id in tree.internal_nodes() {
        let node = tree.node(id);
        let (x, _) = positions[id];

        let (low, high) = node
            .children
            .iter()
            .map(|child: &NodeId| positions[*child].1)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), y| {
                (low.min(y), high.max(y))
            });
        primitives.push(DrawPrimitive::line((x, low), (x, high)));

        for &child in &node.children {
            let (child_x, child_y) = positions[child];
            primitives.push(DrawPrimitive::line((x, child_y), (child_x, child_y)));
        }
    }
}

fn canvas_size(tree: &Tree, tips: &[NodeId], options: &RectangularOptions) -> CanvasSize {
    let longest_label = tips
        .iter()
        .map(|tip| tree.node(*tip).display_name().chars().count())
        .max()
        .unwrap_or(0);

    let rows = u32::try_from(tips.len()).unwrap_or(u32::MAX);
    let chars = u32::try_from(longest_label).unwrap_or(u32::MAX);

    CanvasSize {
        width: options.min_width.max(chars.saturating_mul(options.char_width)),
        height: options.min_height.max(rows.saturating_mul(options.row_pitch)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;
    use crate::metadata::{MetadataTable, UNKNOWN_CATEGORY};
    use crate::palette::FALLBACK_COLOR;
    use crate::tree::layout::{legend, SupportThreshold, SupportUnit};
    use crate::tree::test_support::parse;

    const LADDER: &str = "(A:1,(B:1,(C:1,D:1):1):1);";

    fn table(raw: &str) -> MetadataTable {
        MetadataTable::parse_with_header(raw).unwrap()
    }

    fn locations() -> MetadataTable {
        table("taxa\tlocation\nA\tloc1\nB\tloc2\nC\tloc1\nD\tloc2\n")
    }

    fn markers(figure: &RectangularFigure, shape: MarkerShape) -> Vec<&Marker> {
        figure
            .primitives
            .iter()
            .filter_map(DrawPrimitive::as_marker)
            .filter(|marker| marker.shape == shape)
            .collect()
    }

    fn vertical_segments(figure: &RectangularFigure) -> usize {
        figure
            .primitives
            .iter()
            .filter(|primitive| {
                matches!(primitive, DrawPrimitive::LineSegment { start, end } if start.0 == end.0 && start.1 != end.1)
            })
            .count()
    }

    #[test]
    fn four_tip_ladder_scenario() {
        let figure =
            layout_rectangular(&parse(LADDER), &locations(), &RectangularOptions::default())
                .unwrap();

        let tips = markers(&figure, MarkerShape::Circle);
        assert_eq!(tips.len(), 4);
        let colors: HashSet<_> = tips.iter().map(|marker| marker.color.as_str()).collect();
        assert_eq!(colors.len(), 2);
        assert_eq!(legend(&figure.primitives).len(), 2);
        assert_eq!(vertical_segments(&figure), 3);
        assert!(markers(&figure, MarkerShape::Square).is_empty());
    }

    #[test]
    fn internal_node_sits_between_first_and_last_child() {
        let tree = parse("(A:1,B:1,C:1,(D:1,E:1):1);");
        let options = RectangularOptions {
            midpoint_root: false,
            ..RectangularOptions::default()
        };
        let metadata = table("taxa\tlocation\nA\tx\n");
        let figure = layout_rectangular(&tree, &metadata, &options).unwrap();

        let root = figure.tree.root();
        let first = figure.coordinates[root.children[0]].1;
        let last = figure.coordinates[*root.children.last().unwrap()].1;
        let y = figure.coordinates[figure.tree.root_id()].1;
        assert_eq!(y, (first + last) / 2.0);

        let centroid: f64 = root
            .children
            .iter()
            .map(|child| figure.coordinates[*child].1)
            .sum::<f64>()
            / root.children.len() as f64;
        assert_ne!(y, centroid);
    }

    #[test]
    fn tips_take_consecutive_rows_in_input_order() {
        let tree = parse("((A:0.2,B:0.1):0.3,(C:0.4,(D:0.1,E:0.2):0.1):0.2,F:0.9);");
        let options = RectangularOptions {
            midpoint_root: false,
            ..RectangularOptions::default()
        };
        let figure = layout_rectangular(&tree, &table("taxa\tlocation\n"), &options).unwrap();

        let rows: Vec<f64> = figure
            .tree
            .tips()
            .iter()
            .map(|tip| figure.coordinates[*tip].1)
            .collect();
        assert_eq!(rows, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn missing_location_column_is_named() {
        let metadata = table("taxa\tcountry\nA\tx\n");
        let err = layout_rectangular(&parse(LADDER), &metadata, &RectangularOptions::default())
            .unwrap_err();
        assert_eq!(err, SchemaError::missing(["location"]));
        assert!(err.to_string().contains("location"));
    }

    #[test]
    fn renamed_secondary_column_is_skipped() {
        let metadata = table("taxa\tlocation\tST_type\nA\tl\tST1\nB\tl\tST2\n");
        let figure =
            layout_rectangular(&parse(LADDER), &metadata, &RectangularOptions::default())
                .unwrap();
        assert!(markers(&figure, MarkerShape::Square).is_empty());
        assert!(figure.capabilities.secondary_field.is_none());
    }

    #[test]
    fn secondary_strip_sits_beyond_the_tips() {
        let metadata = table("taxa\tlocation\tMLST\nA\tl\tST1\nB\tl\tST2\nC\tl\tST1\n");
        let figure =
            layout_rectangular(&parse(LADDER), &metadata, &RectangularOptions::default())
                .unwrap();

        let strip = markers(&figure, MarkerShape::Square);
        assert_eq!(strip.len(), 4);
        let max_tip_x = markers(&figure, MarkerShape::Circle)
            .iter()
            .map(|marker| marker.position.0)
            .fold(0.0, f64::max);
        assert!(strip.iter().all(|marker| marker.position.0 > max_tip_x));

        let groups: Vec<_> = strip
            .iter()
            .filter(|marker| marker.show_in_legend)
            .filter_map(|marker| marker.legend_group.clone())
            .collect();
        assert_eq!(
            groups,
            vec![
                "MLST: ST1".to_string(),
                "MLST: ST2".to_string(),
                format!("MLST: {UNKNOWN_CATEGORY}")
            ]
        );
    }

    #[test]
    fn unmatched_tips_are_unknown_and_gray() {
        let metadata = table("taxa\tlocation\nA\tloc1\n");
        let figure =
            layout_rectangular(&parse(LADDER), &metadata, &RectangularOptions::default())
                .unwrap();
        let unknown: Vec<_> = markers(&figure, MarkerShape::Circle)
            .into_iter()
            .filter(|marker| marker.legend_group.as_deref() == Some(UNKNOWN_CATEGORY))
            .collect();
        assert_eq!(unknown.len(), 3);
        assert!(unknown.iter().all(|marker| marker.color == FALLBACK_COLOR));
        assert_eq!(unknown.iter().filter(|m| m.show_in_legend).count(), 1);
    }

    #[test]
    fn supported_clades_get_unlabelled_diamonds() {
        let tree = parse("((A:1,B:1)95:1,(C:1,D:1)40:1);");
        let figure =
            layout_rectangular(&tree, &locations(), &RectangularOptions::default()).unwrap();
        let diamonds = markers(&figure, MarkerShape::Diamond);
        assert_eq!(diamonds.len(), 1);
        assert!(diamonds[0].label.is_none());
        assert!(!diamonds[0].show_in_legend);

        let fraction = RectangularOptions {
            support: SupportThreshold {
                value: 0.9,
                unit: SupportUnit::Fraction,
            },
            ..RectangularOptions::default()
        };
        let tree = parse("((A:1,B:1)0.95:1,(C:1,D:1)0.4:1);");
        let figure = layout_rectangular(&tree, &locations(), &fraction).unwrap();
        assert_eq!(markers(&figure, MarkerShape::Diamond).len(), 1);
    }

    #[test]
    fn canvas_grows_with_tips_and_labels() {
        let figure =
            layout_rectangular(&parse(LADDER), &locations(), &RectangularOptions::default())
                .unwrap();
        assert_eq!(figure.canvas, CanvasSize { width: 1200, height: 1000 });

        let names: Vec<String> = (0..50).map(|i| format!("T{i}")).collect();
        let long = "X".repeat(150);
        let newick = format!("({},{long}:1);", names.join(","));
        let options = RectangularOptions {
            show_labels: true,
            ..RectangularOptions::default()
        };
        let figure = layout_rectangular(&parse(&newick), &locations(), &options).unwrap();
        assert_eq!(figure.canvas.height, 51 * 25);
        assert_eq!(figure.canvas.width, 1500);

        let wrapped = markers(&figure, MarkerShape::Circle)
            .into_iter()
            .find_map(|marker| marker.label.clone().filter(|label| label.starts_with('X')))
            .unwrap();
        assert_eq!(wrapped.lines().count(), 2);
    }

    #[test]
    fn labels_are_hidden_unless_requested() {
        let figure =
            layout_rectangular(&parse(LADDER), &locations(), &RectangularOptions::default())
                .unwrap();
        assert!(markers(&figure, MarkerShape::Circle)
            .iter()
            .all(|marker| marker.label.is_none()));

        let options = RectangularOptions {
            show_labels: true,
            ..RectangularOptions::default()
        };
        let figure = layout_rectangular(&parse(LADDER), &locations(), &options).unwrap();
        let labels: Vec<_> = markers(&figure, MarkerShape::Circle)
            .iter()
            .filter_map(|marker| marker.label.clone())
            .collect();
        assert_eq!(labels, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn single_child_root_keeps_one_marker_per_tip() {
        let metadata = table("taxa\tlocation\nA\tloc1\nB\tloc2\n");
        let figure = layout_rectangular(
            &parse("((A:1,B:5):1);"),
            &metadata,
            &RectangularOptions::default(),
        )
        .unwrap();

        let tips = markers(&figure, MarkerShape::Circle);
        assert_eq!(tips.len(), 2);
        assert!(tips.iter().all(|marker| marker.color != FALLBACK_COLOR));
        assert_eq!(figure.join_report.matched_tips, 2);
        assert!(figure.join_report.unmatched_tips.is_empty());
    }

    #[test]
    fn join_report_lists_unmatched_tips_and_rows() {
        let metadata = table("taxa\tlocation\nA\tloc1\nB\tloc2\nZ\tloc3\n");
        let figure =
            layout_rectangular(&parse(LADDER), &metadata, &RectangularOptions::default())
                .unwrap();
        assert_eq!(figure.join_report.matched_tips, 2);
        assert_eq!(figure.join_report.unmatched_tips, vec!["C", "D"]);
        assert_eq!(figure.join_report.unused_rows, vec!["Z"]);
    }

    #[test]
    fn lines_come_before_markers() {
        let figure =
            layout_rectangular(&parse(LADDER), &locations(), &RectangularOptions::default())
                .unwrap();
        let first_marker = figure
            .primitives
            .iter()
            .position(|primitive| primitive.as_marker().is_some())
            .unwrap();
        assert!(figure.primitives[first_marker..]
            .iter()
            .all(|primitive| primitive.as_marker().is_some()));
    }

    fn arb_newick() -> impl Strategy<Value = String> {
        let leaf = (0.0f64..3.0).prop_map(|length| format!("t:{length:.3}"));
        leaf.prop_recursive(4, 32, 4, |inner| {
            (prop::collection::vec(inner, 2..4), 0.0f64..2.0)
                .prop_map(|(children, length)| format!("({}):{length:.3}", children.join(",")))
        })
        .prop_map(|body| format!("({body},z:1);"))
    }

    proptest! {
        #[test]
        fn every_tip_gets_its_own_integer_row(newick in arb_newick()) {
            let tree = parse(&newick);
            let figure = layout_rectangular(&tree, &table("taxa\tlocation\n"), &RectangularOptions::default()).unwrap();

            let mut rows: Vec<f64> = figure.tree.tips().iter().map(|tip| figure.coordinates[*tip].1).collect();
            let expected: Vec<f64> = (0..rows.len()).map(|row| row as f64).collect();
            prop_assert_eq!(&rows, &expected);
            rows.dedup();
            prop_assert_eq!(rows.len(), tree.leaf_count());

            for id in figure.tree.internal_nodes() {
                let node = figure.tree.node(id);
                let first = figure.coordinates[node.children[0]].1;
                let last = figure.coordinates[*node.children.last().unwrap()].1;
                prop_assert_eq!(figure.coordinates[id].1, (first + last) / 2.0);
                for child in &node.children {
                    prop_assert!(figure.coordinates[*child].0 > figure.coordinates[id].0);
                }
            }
        }
    }
}
