//! `*.sgrna_summary.txt`: per-guide statistics, columns located by name.

use std::collections::HashMap;

use mageckview_core::GuideStats;

use crate::{float, lines, ParseError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct GuideSummary {
    pub header: Vec<String>,
    pub guides: Vec<GuideStats>,
}

struct Columns(HashMap<String, usize>);

impl Columns {
    fn required(&self, name: &'static str) -> Result<usize> {
        self.0
            .get(name)
            .copied()
            .ok_or(ParseError::MissingColumn { column: name })
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.0.get(name).copied()
    }
}

/// Parse a guide summary.
///
/// `sgrna` and `Gene` are required; any other missing column leaves its
/// statistic unset (NaN, empty text, or `false`). Rows shorter than the
/// header are rejected.
pub fn parse_guide_summary(text: &str) -> Result<GuideSummary> {
    let mut rows = lines(text);
    let (_, first) = rows.next().ok_or(ParseError::Empty)?;
    let header: Vec<String> = first.split('\t').map(str::to_string).collect();
    let columns = Columns(
        header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect(),
    );
    let sgrna = columns.required("sgrna")?;
    let gene = columns.required("Gene")?;
    let number = |name: &str, fields: &[&str]| {
        columns
            .optional(name)
            .map_or(f64::NAN, |i| float(fields[i]))
    };
    let text_field = |name: &str, fields: &[&str]| {
        columns
            .optional(name)
            .map_or_else(String::new, |i| fields[i].to_string())
    };

    let mut guides = Vec::new();
    for (line, text) in rows {
        let fields: Vec<&str> = text.split('\t').collect();
        if fields.len() < header.len() {
            return Err(ParseError::FieldCount {
                line,
                expected: header.len(),
                found: fields.len(),
            });
        }
        guides.push(GuideStats {
            sgrna: fields[sgrna].to_string(),
            gene: fields[gene].to_string(),
            control_count: text_field("control_count", &fields),
            treatment_count: text_field("treatment_count", &fields),
            control_mean: number("control_mean", &fields),
            treat_mean: number("treat_mean", &fields),
            lfc: number("LFC", &fields),
            control_var: number("control_var", &fields),
            adj_var: number("adj_var", &fields),
            score: number("score", &fields),
            p_low: number("p.low", &fields),
            p_high: number("p.high", &fields),
            pvalue: number("p.twosided", &fields),
            fdr: number("FDR", &fields),
            high_in_treatment: text_field("high_in_treatment", &fields).trim() == "True",
        });
    }

    tracing::debug!(guides = guides.len(), "sgRNA summary parsed");
    Ok(GuideSummary { header, guides })
}
