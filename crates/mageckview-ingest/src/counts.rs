//! Count tables and library files.

use std::collections::HashSet;

use mageckview_core::{CountTable, Library, Sample};

use crate::{lines, strict_float, ParseError, Result};

/// Parse a `sgRNA  Gene  <sample…>` count table.
///
/// Samples are ordered by column. Every count must be a number.
pub fn parse_count_table(text: &str) -> Result<CountTable> {
    let mut rows = lines(text);
    let (_, first) = rows.next().ok_or(ParseError::Empty)?;
    let header: Vec<&str> = first.split('\t').collect();
    if header.len() < 3 {
        return Err(ParseError::CountHeader {
            reason: format!(
                "expected at least one sample column, found {} columns",
                header.len()
            ),
        });
    }
    if header[0] != "sgRNA" || header[1] != "Gene" {
        return Err(ParseError::CountHeader {
            reason: format!("header starts with `{}\t{}`", header[0], header[1]),
        });
    }
    let samples: Vec<Sample> = header[2..]
        .iter()
        .enumerate()
        .map(|(order, name)| Sample::new(*name, order))
        .collect();

    let mut table = CountTable::new(samples);
    for (line, text) in rows {
        let fields: Vec<&str> = text.split('\t').collect();
        if fields.len() != header.len() {
            return Err(ParseError::FieldCount {
                line,
                expected: header.len(),
                found: fields.len(),
            });
        }
        let guide = fields[0];
        if table.get(guide).is_some() {
            return Err(ParseError::DuplicateGuide {
                line,
                guide: guide.to_string(),
            });
        }
        let counts = fields[2..]
            .iter()
            .zip(&header[2..])
            .map(|(value, column)| strict_float(line, column, value))
            .collect::<Result<Vec<f64>>>()?;
        table
            .insert(guide, counts)
            .map_err(|source| ParseError::Dataset { line, source })?;
    }

    tracing::debug!(
        guides = table.len(),
        samples = table.samples.len(),
        "count table parsed"
    );
    Ok(table)
}

/// A library file: the first tab-separated column of each non-blank line is a
/// guide id.
pub fn parse_library(text: &str, name: &str) -> Library {
    let guides: HashSet<String> = lines(text)
        .filter_map(|(_, l)| l.split('\t').next())
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    tracing::debug!(library = name, guides = guides.len(), "library parsed");
    Library {
        name: name.to_string(),
        guides,
    }
}
