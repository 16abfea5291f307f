use thiserror::Error;

use crate::normalize::Scheme;

/// Errors surfaced by the query, merge and normalization engines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewError {
    /// An order column or filter criterion names a field the record schema
    /// does not know.
    #[error("invalid field path `{path}`")]
    InvalidFieldPath { path: String },

    /// A guide statistics row has no entry in the count matrix.
    #[error("no counts found for guide `{guide}`")]
    IncompleteRecord { guide: String },

    /// Total-count normalization would divide by a zero column total.
    #[error("sample `{sample}` (column {index}) has a zero total count")]
    ZeroSampleTotal { sample: String, index: usize },

    #[error("`{id}` has {actual} counts, expected one per sample ({expected})")]
    CountLengthMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("unknown normalization scheme `{0}`")]
    UnknownScheme(String),

    #[error("unknown value scale `{0}`")]
    UnknownScale(String),

    #[error("normalization scheme `{scheme}` is unavailable: {reason}")]
    SchemeUnavailable { scheme: Scheme, reason: String },

    #[error("colour palette must not be empty")]
    EmptyPalette,

    #[error("dataset is not ready: {0}")]
    NotReady(&'static str),
}

pub type Result<T> = std::result::Result<T, ViewError>;
