//! User-placed map markers, held per request rather than globally.

use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::tree::layout::{CoordinateSpace, DrawPrimitive, Marker, MarkerShape};

pub const DEFAULT_CENTER: (f64, f64) = (40.650002, -73.949997);
pub const DEFAULT_ZOOM: u8 = 6;
const MARKER_COLOR: &str = "green";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MarkerParseError(String);

/// `NAME,LAT,LON`; the name may itself contain commas.
impl FromStr for MapMarker {
    type Err = MarkerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, ',');
        let (Some(lon), Some(lat), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(MarkerParseError(format!("expected NAME,LAT,LON, got `{s}`")));
        };
        let coordinate = |text: &str, what: &str, limit: f64| {
            text.trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.abs() <= limit)
                .ok_or_else(|| MarkerParseError(format!("invalid {what} `{}`", text.trim())))
        };
        Ok(Self {
            name: name.trim().to_owned(),
            lat: coordinate(lat, "latitude", 90.0)?,
            lon: coordinate(lon, "longitude", 180.0)?,
        })
    }
}

/// Ordered markers for one request. Operations return a new store.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MarkerStore {
    markers: Vec<MapMarker>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_marker(&self, marker: MapMarker) -> Self {
        let mut markers = self.markers.clone();
        markers.push(marker);
        Self { markers }
    }

    #[must_use]
    pub fn cleared(&self) -> Self {
        Self::default()
    }

    pub fn markers(&self) -> &[MapMarker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

impl FromIterator<MapMarker> for MarkerStore {
    fn from_iter<I: IntoIterator<Item = MapMarker>>(iter: I) -> Self {
        Self {
            markers: iter.into_iter().collect(),
        }
    }
}

/// Map view: markers as primitives in `(lon, lat)` space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapFigure {
    pub space: CoordinateSpace,
    pub center: (f64, f64),
    pub zoom: u8,
    pub primitives: Vec<DrawPrimitive>,
}

pub fn render_map(store: &MarkerStore) -> MapFigure {
    let primitives = store
        .markers()
        .iter()
        .map(|marker| {
            DrawPrimitive::Marker(Marker {
                position: (marker.lon, marker.lat),
                color: MARKER_COLOR.to_owned(),
                label: Some(marker.name.clone()),
                legend_group: None,
                show_in_legend: false,
                shape: MarkerShape::Circle,
            })
        })
        .collect();

    MapFigure {
        space: CoordinateSpace::Cartesian,
        center: DEFAULT_CENTER,
        zoom: DEFAULT_ZOOM,
        primitives,
    }
}
