use std::f64::consts::TAU;

use log::{debug, info};

use super::{
    CoordinateSpace, DrawPrimitive, LegendTracker, Marker, MarkerShape, Point, RadialFigure,
    RadialOptions,
};
use crate::error::SchemaError;
use crate::metadata::{self, MetadataTable, LOCATION_COLUMN, REGION_COLUMN, UNKNOWN_CATEGORY};
use crate::palette::{self, FALLBACK_COLOR};
use crate::tree::Tree;

/// Circular dendrogram of `tree` with a metadata ring outside the deepest node.
///
/// Radii are `log1p(depth) / log1p(max_depth) * radial_scale` over drawn
/// branch lengths, so they compress deep trees and are not proportional to
/// evolutionary distance. Tips are spread evenly around the circle; an
/// internal node takes the arithmetic mean of its children's angles, which
/// misplaces clades that straddle angle zero.
pub fn layout_radial(
    tree: &Tree,
    metadata: &MetadataTable,
    options: &RadialOptions,
) -> Result<RadialFigure, SchemaError> {
    let tree = if options.midpoint_root {
        tree.midpoint_rooted()
    } else {
        tree.clone()
    };
    let joined = metadata::join(metadata, &tree, &[])?;

    let coordinates = compute_coordinates(&tree, options.radial_scale);
    let max_radius = coordinates.iter().map(|(_, r)| *r).fold(0.0f64, f64::max);
    let ring_radius = max_radius + options.ring_offset;

    let mut primitives = Vec::with_capacity(tree.len() * 2);
    for id in tree.pre_order() {
        if let Some(parent) = tree.node(id).parent {
            primitives.push(DrawPrimitive::line(coordinates[parent], coordinates[id]));
        }
    }

    let color_field = ring_field(metadata, options);
    match color_field.as_deref() {
        Some(field) => debug!("Radial ring coloured by '{}'", field),
        None => debug!("No colouring column found; ring drawn as '{}'", UNKNOWN_CATEGORY),
    }
    let colors = color_field
        .as_deref()
        .map(|field| palette::resolve(&metadata.categories(field), &options.palette))
        .unwrap_or_default();

    let mut legend = LegendTracker::default();
    for tip in tree.tips() {
        let category = color_field
            .as_deref()
            .map(|field| joined.category(tip, field))
            .unwrap_or(UNKNOWN_CATEGORY);
        let color = if colors.is_empty() {
            FALLBACK_COLOR
        } else {
            colors.color(category)
        };
        primitives.push(DrawPrimitive::Marker(Marker {
            position: (coordinates[tip].0, ring_radius),
            color: color.to_owned(),
            label: None,
            legend_group: Some(category.to_owned()),
            show_in_legend: legend.first_sighting(category),
            shape: MarkerShape::Square,
        }));
    }

    info!(
        "Radial layout: {} tips, ring radius {:.3}",
        tree.leaf_count(),
        ring_radius
    );

    Ok(RadialFigure {
        space: CoordinateSpace::Polar,
        primitives,
        ring_radius,
        coordinates,
        color_field,
        join_report: joined.report().clone(),
        tree,
    })
}

/// `--color-by` when present, then `region`, then `location`.
fn ring_field(metadata: &MetadataTable, options: &RadialOptions) -> Option<String> {
    let mut preferred: Vec<&str> = Vec::with_capacity(3);
    if let Some(field) = options.color_by.as_deref() {
        preferred.push(field);
    }
    preferred.extend([REGION_COLUMN, LOCATION_COLUMN]);
    metadata.first_available(&preferred).map(str::to_owned)
}

fn compute_coordinates(tree: &Tree, radial_scale: f64) -> Vec<Point> {
    let mut depths = vec![0.0f64; tree.len()];
    for id in tree.pre_order() {
        if let Some(parent) = tree.node(id).parent {
            depths[id] = depths[parent] + tree.node(id).drawn_length();
        }
    }

    let max_depth = depths.iter().copied().fold(0.0f64, f64::max);
    let denominator = max_depth.ln_1p();

    let mut coordinates: Vec<Point> = depths
        .iter()
        .map(|depth| {
            let r = if denominator > 0.0 {
                depth.ln_1p() / denominator * radial_scale
            } else {
                0.0
            };
            (0.0, r)
        })
        .collect();

    let tips = tree.tips();
    let tip_count = tips.len().max(1) as f64;
    for (index, tip) in tips.iter().enumerate() {
        coordinates[*tip].0 = TAU * index as f64 / tip_count;
    }

    for id in tree.post_order() {
        let children = &tree.node(id).children;
        if children.is_empty() {
            continue;
        }
        let sum: f64 = children.iter().map(|child| coordinates[*child].0).sum();
        coordinates[id].0 = sum / children.len() as f64;
    }

    coordinates
}
