use thiserror::Error;

/// Malformed tree text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("tree text is empty")]
    Empty,

    #[error("unbalanced parentheses: {message}")]
    Unbalanced { message: String },

    #[error("invalid branch length `{token}` at byte {offset}")]
    InvalidBranchLength { token: String, offset: usize },

    #[error("unterminated {what} starting at byte {offset}")]
    Unterminated { what: &'static str, offset: usize },

    #[error("nexus file does not contain a tree definition")]
    NoNexusTree,

    #[error("newick parser rejected the tree: {message}")]
    Newick { message: String },
}

/// Missing or inconsistent columns in a tab-separated input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("missing required column(s): {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    #[error("table has no header row")]
    Empty,

    #[error("non-numeric distance `{value}` for {sample} / {other}")]
    InvalidValue {
        sample: String,
        other: String,
        value: String,
    },

    #[error("duplicate distance entry for {sample} / {other}")]
    DuplicateEntry { sample: String, other: String },

    #[error("matrix column(s) not present as sample rows: {}", .samples.join(", "))]
    UnknownSamples { samples: Vec<String> },
}

impl SchemaError {
    pub fn missing<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::MissingColumns {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}
