//! Named colour palettes.
//!
//! Qualitative palettes colour categorical metadata; continuous colour scales
//! colour the distance heatmap. Both registries fall back to a default instead
//! of failing on an unknown name.

use std::collections::{HashMap, HashSet};
use std::fmt;

use clap::ValueEnum;
use log::warn;
use serde::Serialize;

pub const DEFAULT_QUALITATIVE: &str = "plotly";

/// Colour for categories that were not part of the resolved set.
pub const FALLBACK_COLOR: &str = "#808080";

const QUALITATIVE: &[(&str, &[&str])] = &[
    (
        "plotly",
        &[
            "#636EFA", "#EF553B", "#00CC96", "#AB63FA", "#FFA15A", "#19D3F3", "#FF6692", "#B6E880",
            "#FF97FF", "#FECB52",
        ],
    ),
    (
        "d3",
        &[
            "#1F77B4", "#FF7F0E", "#2CA02C", "#D62728", "#9467BD", "#8C564B", "#E377C2", "#7F7F7F",
            "#BCBD22", "#17BECF",
        ],
    ),
    (
        "g10",
        &[
            "#3366CC", "#DC3912", "#FF9900", "#109618", "#990099", "#0099C6", "#DD4477", "#66AA00",
            "#B82E2E", "#316395",
        ],
    ),
    (
        "t10",
        &[
            "#4C78A8", "#F58518", "#E45756", "#72B7B2", "#54A24B", "#EECA3B", "#B279A2", "#FF9DA6",
            "#9D755D", "#BAB0AC",
        ],
    ),
    (
        "set1",
        &[
            "#E41A1C", "#377EB8", "#4DAF4A", "#984EA3", "#FF7F00", "#FFFF33", "#A65628", "#F781BF",
            "#999999",
        ],
    ),
    (
        "set2",
        &[
            "#66C2A5", "#FC8D62", "#8DA0CB", "#E78AC3", "#A6D854", "#FFD92F", "#E5C494", "#B3B3B3",
        ],
    ),
    (
        "dark2",
        &[
            "#1B9E77", "#D95F02", "#7570B3", "#E7298A", "#66A61E", "#E6AB02", "#A6761D", "#666666",
        ],
    ),
    (
        "pastel1",
        &[
            "#FBB4AE", "#B3CDE3", "#CCEBC5", "#DECBE4", "#FED9A6", "#FFFFCC", "#E5D8BD", "#FDDAEC",
            "#F2F2F2",
        ],
    ),
    (
        "pastel2",
        &[
            "#B3E2CD", "#FDCDAC", "#CBD5E8", "#F4CAE4", "#E6F5C9", "#FFF2AE", "#F1E2CC", "#CCCCCC",
        ],
    ),
    (
        "safe",
        &[
            "#88CCEE", "#CC6677", "#DDCC77", "#117733", "#332288", "#AA4499", "#44AA99", "#999933",
            "#882255", "#661100", "#6699CC", "#888888",
        ],
    ),
    (
        "vivid",
        &[
            "#E58606", "#5D69B1", "#52BCA3", "#99C945", "#CC61B0", "#24796C", "#DAA51B", "#2F8AC4",
            "#764E9F", "#ED645A", "#CC3A8E", "#A5AA99",
        ],
    ),
    (
        "bold",
        &[
            "#7F3C8D", "#11A579", "#3969AC", "#F2B701", "#E73F74", "#80BA5A", "#E68310", "#008695",
            "#CF1C90", "#F97B72", "#4B4B8F", "#A5AA99",
        ],
    ),
];

/// Names accepted by [`qualitative_palette`].
pub fn qualitative_names() -> impl Iterator<Item = &'static str> {
    QUALITATIVE.iter().map(|(name, _)| *name)
}

/// Colours of a named qualitative palette, case-insensitive, falling back to
/// [`DEFAULT_QUALITATIVE`].
pub fn qualitative_palette(name: &str) -> &'static [&'static str] {
    let wanted = name.trim().to_ascii_lowercase();
    if let Some((_, colors)) = QUALITATIVE.iter().find(|(key, _)| *key == wanted) {
        return colors;
    }
    warn!(
        "Unknown palette '{}', using '{}' (known: {})",
        name,
        DEFAULT_QUALITATIVE,
        qualitative_names().collect::<Vec<_>>().join(", ")
    );
    QUALITATIVE[0].1
}

/// Category to colour assignment, keeping the order categories were given in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ColorMap {
    entries: Vec<(String, String)>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ColorMap {
    pub fn color(&self, category: &str) -> &str {
        self.index
            .get(category)
            .map(|slot| self.entries[*slot].1.as_str())
            .unwrap_or(FALLBACK_COLOR)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Give the i-th distinct category `colors[i % len]` of the named palette.
///
/// Duplicates in `categories` keep their first position. Colours wrap when
/// there are more categories than palette entries.
pub fn resolve<S: AsRef<str>>(categories: &[S], palette_name: &str) -> ColorMap {
    let colors = qualitative_palette(palette_name);
    let mut map = ColorMap::default();
    let mut seen = HashSet::new();

    for category in categories.iter().map(AsRef::as_ref) {
        if !seen.insert(category) {
            continue;
        }
        let slot = map.entries.len();
        map.entries
            .push((category.to_owned(), colors[slot % colors.len()].to_owned()));
        map.index.insert(category.to_owned(), slot);
    }

    map
}

/// Continuous colour scale for the distance heatmap.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorScale {
    #[default]
    Viridis,
    Plasma,
    Inferno,
    Magma,
    Cividis,
    Turbo,
    Blues,
    Greens,
    Oranges,
    Reds,
    Blackbody,
    Rainbow,
    Electric,
    Hot,
}

impl ColorScale {
    /// Case-insensitive lookup, unknown names giving [`ColorScale::Viridis`].
    pub fn from_name(name: &str) -> Self {
        match <Self as ValueEnum>::from_str(name.trim(), true) {
            Ok(scale) => scale,
            Err(_) => {
                warn!("Unknown colour scale '{}', using viridis", name);
                Self::Viridis
            }
        }
    }

    /// Perceptual and sequential scales come from `colorous`.
    fn gradient(self) -> Option<colorous::Gradient> {
        Some(match self {
            Self::Viridis => colorous::VIRIDIS,
            Self::Plasma => colorous::PLASMA,
            Self::Inferno => colorous::INFERNO,
            Self::Magma => colorous::MAGMA,
            Self::Cividis => colorous::CIVIDIS,
            Self::Turbo => colorous::TURBO,
            Self::Blues => colorous::BLUES,
            Self::Greens => colorous::GREENS,
            Self::Oranges => colorous::ORANGES,
            Self::Reds => colorous::REDS,
            Self::Blackbody | Self::Rainbow | Self::Electric | Self::Hot => return None,
        })
    }

    /// Stops for the plotly scales `colorous` lacks.
    fn stops(self) -> &'static [&'static str] {
        match self {
            Self::Blackbody => &["#000000", "#e60000", "#e6d200", "#ffffff", "#a0c8ff"],
            Self::Rainbow => &[
                "#96005a", "#0000c8", "#0019ff", "#0098ff", "#2cff96", "#97ff00", "#ffea00",
                "#ff6f00", "#ff0000",
            ],
            Self::Electric => &[
                "#000000", "#1e0064", "#780064", "#a05a00", "#e6c800", "#fffadc",
            ],
            Self::Hot => &["#000000", "#e60000", "#ffd200", "#ffffff"],
            _ => &[],
        }
    }

    /// Colour at `t` in `[0, 1]`.
    pub fn sample(self, t: f64) -> String {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        if let Some(gradient) = self.gradient() {
            let color = gradient.eval_continuous(t);
            return color_to_hex([color.r, color.g, color.b]);
        }

        let stops = self.stops();
        if stops.is_empty() {
            return FALLBACK_COLOR.to_owned();
        }
        let position = t * (stops.len() - 1) as f64;
        let lower = position.floor() as usize;
        let upper = (lower + 1).min(stops.len() - 1);
        let fraction = position - lower as f64;

        let (Some(a), Some(b)) = (parse_hex(stops[lower]), parse_hex(stops[upper])) else {
            return FALLBACK_COLOR.to_owned();
        };
        let mix = |from: u8, to: u8| -> u8 {
            (from as f64 + (to as f64 - from as f64) * fraction).round() as u8
        };
        color_to_hex([mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])])
    }
}

impl fmt::Display for ColorScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => write!(f, "{}", value.get_name()),
            None => write!(f, "{:?}", self),
        }
    }
}

fn parse_hex(hex: &str) -> Option<[u8; 3]> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(digits.get(range)?, 16).ok();
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

pub fn color_to_hex([r, g, b]: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}
