//! SNP distance tables: wide file format, long-form entries and the square
//! matrix the heatmap is drawn from.

use std::collections::{HashMap, HashSet};

use log::{debug, info};
use serde::Serialize;

use crate::error::SchemaError;
use crate::palette::ColorScale;

/// Name given to the first column of a distance table, whatever its header.
pub const SAMPLE_COLUMN: &str = "Sample";

const MISSING_MARKERS: [&str; 5] = ["", "NA", "N/A", "NaN", "nan"];

/// Distance table as read from disk: one row per sample, one column per
/// other sample.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DistanceTable {
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<Option<f64>>)>,
}

/// One `(sample, other_sample, distance)` triple.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceEntry {
    pub sample: String,
    pub other_sample: String,
    pub distance: Option<f64>,
}

impl DistanceTable {
    pub fn parse_tsv(raw: &str) -> Result<Self, SchemaError> {
        let mut lines = raw.lines().filter(|line| !line.trim().is_empty());
        let header = lines.next().ok_or(SchemaError::Empty)?;
        let columns: Vec<String> = header
            .split('\t')
            .skip(1)
            .map(|cell| cell.trim().to_owned())
            .collect();

        let mut rows = Vec::new();
        for line in lines {
            let mut cells = line.split('\t').map(str::trim);
            let sample = cells.next().unwrap_or_default().to_owned();
            let mut values = Vec::with_capacity(columns.len());
            for (column, cell) in columns.iter().zip(cells.chain(std::iter::repeat(""))) {
                values.push(parse_distance(&sample, column, cell)?);
            }
            rows.push((sample, values));
        }

        debug!(
            "Distance table with {} row(s) and {} column(s)",
            rows.len(),
            columns.len()
        );
        Ok(Self { columns, rows })
    }

    /// Long form, row by row.
    pub fn melt(&self) -> Vec<DistanceEntry> {
        self.rows
            .iter()
            .flat_map(|(sample, values)| {
                self.columns
                    .iter()
                    .zip(values)
                    .map(move |(other, distance)| DistanceEntry {
                        sample: sample.clone(),
                        other_sample: other.clone(),
                        distance: *distance,
                    })
            })
            .collect()
    }
}

fn parse_distance(sample: &str, other: &str, cell: &str) -> Result<Option<f64>, SchemaError> {
    if MISSING_MARKERS.contains(&cell) {
        return Ok(None);
    }
    cell.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(Some)
        .ok_or_else(|| SchemaError::InvalidValue {
            sample: sample.to_owned(),
            other: other.to_owned(),
            value: cell.to_owned(),
        })
}

/// Square sample-by-sample matrix; both axes share `samples` order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceMatrix {
    pub samples: Vec<String>,
    pub cells: Vec<Vec<Option<f64>>>,
}

/// Arrange long-form entries into a square matrix.
///
/// Samples keep the order in which they first appear as `sample`. Every
/// `other_sample` must also appear as a `sample`; pairs never given stay
/// empty.
pub fn pivot(entries: &[DistanceEntry]) -> Result<DistanceMatrix, SchemaError> {
    let mut samples: Vec<String> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        if !index.contains_key(entry.sample.as_str()) {
            index.insert(entry.sample.as_str(), samples.len());
            samples.push(entry.sample.clone());
        }
    }

    let mut unknown: Vec<String> = Vec::new();
    for entry in entries {
        let other = entry.other_sample.as_str();
        if !index.contains_key(other) && !unknown.iter().any(|name| name == other) {
            unknown.push(other.to_owned());
        }
    }
    if !unknown.is_empty() {
        return Err(SchemaError::UnknownSamples { samples: unknown });
    }

    let mut cells = vec![vec![None; samples.len()]; samples.len()];
    let mut filled = HashSet::new();
    for entry in entries {
        let row = index[entry.sample.as_str()];
        let column = index[entry.other_sample.as_str()];
        if !filled.insert((row, column)) {
            return Err(SchemaError::DuplicateEntry {
                sample: entry.sample.clone(),
                other: entry.other_sample.clone(),
            });
        }
        cells[row][column] = entry.distance;
    }

    info!("Pivoted {} entries into a {}x{} matrix", entries.len(), samples.len(), samples.len());
    Ok(DistanceMatrix { samples, cells })
}

impl DistanceMatrix {
    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        self.cells.get(row)?.get(column).copied().flatten()
    }

    /// Smallest and largest distance present.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.cells
            .iter()
            .flatten()
            .flatten()
            .fold(None, |range, value| match range {
                None => Some((*value, *value)),
                Some((low, high)) => Some((f64::min(low, *value), f64::max(high, *value))),
            })
    }

    /// Wide table with a leading `Sample` column, empty strings for gaps.
    pub fn table_view(&self) -> TableView {
        let mut columns = Vec::with_capacity(self.samples.len() + 1);
        columns.push(SAMPLE_COLUMN.to_owned());
        columns.extend(self.samples.iter().cloned());

        let rows = self
            .samples
            .iter()
            .zip(&self.cells)
            .map(|(sample, values)| {
                std::iter::once(sample.clone())
                    .chain(
                        values
                            .iter()
                            .map(|value| value.map(|v| v.to_string()).unwrap_or_default()),
                    )
                    .collect()
            })
            .collect();

        TableView { columns, rows }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableView {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Matrix plus the colour scale it is drawn with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapFigure {
    pub matrix: DistanceMatrix,
    pub scale: ColorScale,
    pub range: Option<(f64, f64)>,
    pub table: TableView,
}

impl HeatmapFigure {
    pub fn new(matrix: DistanceMatrix, scale: ColorScale) -> Self {
        let range = matrix.value_range();
        let table = matrix.table_view();
        Self {
            matrix,
            scale,
            range,
            table,
        }
    }

    /// Fill colour of a cell, `None` for gaps.
    pub fn cell_color(&self, row: usize, column: usize) -> Option<String> {
        let value = self.matrix.get(row, column)?;
        let (low, high) = self.range?;
        let t = if high > low {
            (value - low) / (high - low)
        } else {
            0.0
        };
        Some(self.scale.sample(t))
    }
}
