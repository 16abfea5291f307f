//! MAGeCK output file parsers.
//!
//! Every parser takes the full text of one tab-separated file:
//!
//! - `*.gene_summary.txt` ([`parse_gene_summary`])
//! - `*.sgrna_summary.txt` ([`parse_guide_summary`])
//! - `*.count.txt` ([`parse_count_table`])
//! - library files, one guide id per line ([`parse_library`])
//!
//! Line numbers in errors are 1-based and count the header.

pub mod counts;
pub mod gene_summary;
pub mod guide_summary;

use mageckview_core::ViewError;
use thiserror::Error;

pub use counts::{parse_count_table, parse_library};
pub use gene_summary::{parse_gene_summary, GeneSummary};
pub use guide_summary::{parse_guide_summary, GuideSummary};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("input is empty")]
    Empty,

    #[error("not a MAGeCK gene summary: {reason}")]
    GeneSummaryHeader { reason: String },

    #[error("not a MAGeCK sgRNA summary: missing column `{column}`")]
    MissingColumn { column: &'static str },

    #[error("not a MAGeCK count table: {reason}")]
    CountHeader { reason: String },

    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: `{value}` in column `{column}` is not a number")]
    BadNumber {
        line: usize,
        column: String,
        value: String,
    },

    #[error("line {line}: guide `{guide}` appears twice")]
    DuplicateGuide { line: usize, guide: String },

    #[error("line {line}: {source}")]
    Dataset {
        line: usize,
        #[source]
        source: ViewError,
    },
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Non-blank lines with their 1-based line numbers, `\r` stripped.
pub(crate) fn lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty())
}

/// Lenient float: malformed text reads as NaN.
pub(crate) fn float(field: &str) -> f64 {
    field.trim().parse().unwrap_or(f64::NAN)
}

pub(crate) fn strict_float(line: usize, column: &str, field: &str) -> Result<f64> {
    field.trim().parse().map_err(|_| ParseError::BadNumber {
        line,
        column: column.to_string(),
        value: field.to_string(),
    })
}

pub(crate) fn integer(line: usize, column: &str, field: &str) -> Result<i64> {
    field.trim().parse().map_err(|_| ParseError::BadNumber {
        line,
        column: column.to_string(),
        value: field.to_string(),
    })
}
