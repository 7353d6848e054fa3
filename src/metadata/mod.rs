use std::collections::{BTreeMap, HashMap, HashSet};

use clap::ValueEnum;
use log::{debug, warn};
use serde::Serialize;

use crate::error::SchemaError;
use crate::tree::{NodeId, Tree};

pub const TAXA_COLUMN: &str = "taxa";
pub const LOCATION_COLUMN: &str = "location";
pub const REGION_COLUMN: &str = "region";
pub const DEFAULT_SECONDARY_COLUMN: &str = "MLST";

/// Category given to missing values and to tips without a metadata row.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

const MISSING_MARKERS: [&str; 8] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];
const COLOR_STRIP_COLUMNS: [&str; 4] = ["taxa", "type", "color", "region"];
const COLOR_STRIP_SKIPPED_LINES: usize = 3;

/// How a metadata file lays out its columns.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum, Default)]
pub enum MetadataLayout {
    /// Tab-separated with a header row.
    #[default]
    Header,
    /// Headerless colour-strip annotation: three preamble lines, then
    /// `taxa`, `type`, `color`, `region` columns.
    ColorStrip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub taxa: String,
    pub fields: BTreeMap<String, String>,
}

impl MetadataRow {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Parsed metadata with missing categorical values already replaced by
/// [`UNKNOWN_CATEGORY`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataTable {
    pub columns: Vec<String>,
    pub rows: Vec<MetadataRow>,
}

impl MetadataTable {
    pub fn parse(raw: &str, layout: MetadataLayout) -> Result<Self, SchemaError> {
        match layout {
            MetadataLayout::Header => Self::parse_with_header(raw),
            MetadataLayout::ColorStrip => Ok(Self::parse_color_strip(raw)),
        }
    }

    pub fn parse_with_header(raw: &str) -> Result<Self, SchemaError> {
        let mut lines = raw.lines().filter(|line| !line.trim().is_empty());
        let header = lines.next().ok_or(SchemaError::Empty)?;

        // A repeated header keeps its first position; later copies are ignored.
        let mut seen = HashSet::new();
        let layout: Vec<(usize, String)> = header
            .split('\t')
            .map(|cell| cell.trim().to_owned())
            .enumerate()
            .filter(|(_, cell)| seen.insert(cell.clone()))
            .collect();

        let rows = lines.map(|line| Self::row_from_cells(&layout, line)).collect();
        let columns = layout.into_iter().map(|(_, column)| column).collect();

        Ok(Self { columns, rows })
    }

    pub fn parse_color_strip(raw: &str) -> Self {
        let layout: Vec<(usize, String)> = COLOR_STRIP_COLUMNS
            .iter()
            .map(|column| column.to_string())
            .enumerate()
            .collect();
        let rows = raw
            .lines()
            .skip(COLOR_STRIP_SKIPPED_LINES)
            .filter(|line| !line.trim().is_empty())
            .map(|line| Self::row_from_cells(&layout, line))
            .collect();
        let columns = layout.into_iter().map(|(_, column)| column).collect();
        Self { columns, rows }
    }

    /// Pick each column's cell by its position in the source line.
    fn row_from_cells(layout: &[(usize, String)], line: &str) -> MetadataRow {
        let cells: Vec<&str> = line.split('\t').map(str::trim).collect();

        let mut taxa = String::new();
        let mut fields = BTreeMap::new();
        for (position, column) in layout {
            let cell = cells.get(*position).copied().unwrap_or("");
            if column == TAXA_COLUMN {
                taxa = cell.to_owned();
                continue;
            }
            let value = if MISSING_MARKERS.contains(&cell) {
                UNKNOWN_CATEGORY
            } else {
                cell
            };
            fields.insert(column.clone(), value.to_owned());
        }
        MetadataRow { taxa, fields }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Fail with every missing column named, `taxa` always included in the check.
    pub fn require(&self, columns: &[&str]) -> Result<(), SchemaError> {
        let mut missing: Vec<&str> = Vec::new();
        for column in std::iter::once(TAXA_COLUMN).chain(columns.iter().copied()) {
            if !self.has_column(column) && !missing.contains(&column) {
                missing.push(column);
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::missing(missing))
        }
    }

    /// Which optional columns are present, detected by exact name.
    pub fn capabilities(&self, secondary_field: &str) -> MetadataCapabilities {
        MetadataCapabilities {
            has_taxa: self.has_column(TAXA_COLUMN),
            has_location: self.has_column(LOCATION_COLUMN),
            secondary_field: self
                .has_column(secondary_field)
                .then(|| secondary_field.to_owned()),
            categorical_fields: self
                .columns
                .iter()
                .filter(|column| column.as_str() != TAXA_COLUMN)
                .cloned()
                .collect(),
        }
    }

    /// First categorical column of `preferred` present in the table.
    pub fn first_available<'a>(&self, preferred: &[&'a str]) -> Option<&'a str> {
        preferred
            .iter()
            .copied()
            .find(|field| *field != TAXA_COLUMN && self.has_column(field))
    }

    /// Distinct values of `field` in order of first appearance.
    pub fn categories(&self, field: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter_map(|row| row.get(field))
            .filter(|value| seen.insert(*value))
            .map(str::to_owned)
            .collect()
    }
}

/// Optional metadata features available for a render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataCapabilities {
    pub has_taxa: bool,
    pub has_location: bool,
    pub secondary_field: Option<String>,
    pub categorical_fields: Vec<String>,
}

/// Outcome of matching metadata rows against tree tips. Mismatches are not
/// errors; they are counted here and logged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct JoinReport {
    pub matched_tips: usize,
    pub unmatched_tips: Vec<String>,
    pub unused_rows: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinedMetadata {
    by_tip: HashMap<NodeId, BTreeMap<String, String>>,
    report: JoinReport,
}

impl JoinedMetadata {
    /// Category of `field` for a tip, [`UNKNOWN_CATEGORY`] when absent.
    pub fn category(&self, node: NodeId, field: &str) -> &str {
        self.by_tip
            .get(&node)
            .and_then(|fields| fields.get(field))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_CATEGORY)
    }

    pub fn report(&self) -> &JoinReport {
        &self.report
    }
}

/// Attach metadata rows to tree tips by `taxa`.
///
/// `required` lists the caller's mandatory columns in addition to `taxa`.
/// The first row for a taxon wins; rows naming no tip are ignored and tips
/// without a row get [`UNKNOWN_CATEGORY`] for every field.
pub fn join(
    table: &MetadataTable,
    tree: &Tree,
    required: &[&str],
) -> Result<JoinedMetadata, SchemaError> {
    table.require(required)?;

    let mut first_rows: HashMap<&str, &MetadataRow> = HashMap::new();
    for row in &table.rows {
        first_rows.entry(row.taxa.as_str()).or_insert(row);
    }

    let fields: Vec<String> = table
        .columns
        .iter()
        .filter(|column| column.as_str() != TAXA_COLUMN)
        .cloned()
        .collect();

    let mut report = JoinReport::default();
    let mut tip_names = HashSet::new();
    let mut by_tip = HashMap::new();

    for tip in tree.tips() {
        let name = tree.node(tip).display_name();
        tip_names.insert(name);

        let values = match first_rows.get(name) {
            Some(row) => {
                report.matched_tips += 1;
                row.fields.clone()
            }
            None => {
                report.unmatched_tips.push(name.to_owned());
                fields
                    .iter()
                    .map(|field| (field.clone(), UNKNOWN_CATEGORY.to_owned()))
                    .collect()
            }
        };
        by_tip.insert(tip, values);
    }

    let mut reported = HashSet::new();
    for row in &table.rows {
        if !tip_names.contains(row.taxa.as_str()) && reported.insert(row.taxa.as_str()) {
            report.unused_rows.push(row.taxa.clone());
        }
    }

    if !report.unmatched_tips.is_empty() || !report.unused_rows.is_empty() {
        warn!(
            "Metadata join: {} tip(s) without a row, {} row(s) naming no tip",
            report.unmatched_tips.len(),
            report.unused_rows.len()
        );
    }
    debug!("Metadata join matched {} tip(s)", report.matched_tips);

    Ok(JoinedMetadata {
        by_tip,
        report,
    })
}
