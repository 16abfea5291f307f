//! `*.gene_summary.txt`: one row per gene with negative and positive
//! selection statistics.

use mageckview_core::record::rank_by_lfc;
use mageckview_core::{DirectionStats, GeneRecord};

use crate::{float, integer, lines, ParseError, Result};

pub const GENE_SUMMARY_FIELDS: usize = 14;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneSummary {
    pub header: Vec<String>,
    /// Genes in file order, ranked by best-direction LFC.
    pub genes: Vec<GeneRecord>,
}

fn direction(line: usize, header: &[String], fields: &[&str]) -> Result<DirectionStats> {
    Ok(DirectionStats {
        score: float(fields[0]),
        pvalue: float(fields[1]),
        fdr: float(fields[2]),
        rank: float(fields[3]),
        good: integer(line, &header[4], fields[4])?,
        lfc: float(fields[5]),
    })
}

/// Parse a gene summary.
///
/// The header must start with `id` and `num` and have exactly
/// [`GENE_SUMMARY_FIELDS`] columns; every other non-blank line must have the
/// same field count.
pub fn parse_gene_summary(text: &str) -> Result<GeneSummary> {
    let mut rows = lines(text);
    let (_, first) = rows.next().ok_or(ParseError::Empty)?;
    let header: Vec<String> = first.split('\t').map(str::to_string).collect();
    if header.len() != GENE_SUMMARY_FIELDS {
        return Err(ParseError::GeneSummaryHeader {
            reason: format!(
                "expected {GENE_SUMMARY_FIELDS} columns, found {}",
                header.len()
            ),
        });
    }
    if header[0] != "id" || header[1] != "num" {
        return Err(ParseError::GeneSummaryHeader {
            reason: format!("header starts with `{}\t{}`", header[0], header[1]),
        });
    }

    let mut genes = Vec::new();
    for (line, text) in rows {
        let fields: Vec<&str> = text.split('\t').collect();
        if fields.len() != GENE_SUMMARY_FIELDS {
            return Err(ParseError::FieldCount {
                line,
                expected: GENE_SUMMARY_FIELDS,
                found: fields.len(),
            });
        }
        let num = integer(line, &header[1], fields[1])?;
        let neg = direction(line, &header[2..8], &fields[2..8])?;
        let pos = direction(line, &header[8..14], &fields[8..14])?;
        genes.push(GeneRecord::new(fields[0], num, neg, pos));
    }
    rank_by_lfc(&mut genes);

    tracing::debug!(genes = genes.len(), "gene summary parsed");
    Ok(GeneSummary { header, genes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mageckview_core::Direction;

    const HEADER: &str = "id\tnum\tneg|score\tneg|p-value\tneg|fdr\tneg|rank\tneg|goodsgrna\t\
                          neg|lfc\tpos|score\tpos|p-value\tpos|fdr\tpos|rank\tpos|goodsgrna\tpos|lfc";

    #[test]
    fn parses_rows_and_ranks_by_lfc() {
        let text = format!(
            "{HEADER}\n\
             A\t4\t0.01\t0.001\t0.02\t1\t3\t-2.5\t0.9\t0.95\t1\t50\t0\t0.1\n\
             B\t4\t0.8\t0.7\t1\t40\t0\t0.2\t0.01\t0.002\t0.03\t2\t4\t1.8\n\
             \n"
        );
        let summary = parse_gene_summary(&text).unwrap();
        assert_eq!(summary.header.len(), GENE_SUMMARY_FIELDS);
        let [a, b] = &summary.genes[..] else {
            panic!("expected two genes");
        };
        assert_eq!(a.best, Direction::Neg);
        assert_eq!(a.lfc, -2.5);
        assert_eq!(a.neg.good, 3);
        assert_eq!(b.best, Direction::Pos);
        assert_eq!(b.pvalue, 0.002);
        assert_eq!((a.rank, b.rank), (1, 0));
    }

    #[test]
    fn rejects_foreign_headers() {
        let err = parse_gene_summary("sgrna\tGene\n").unwrap_err();
        assert!(matches!(err, ParseError::GeneSummaryHeader { .. }));

        let shifted = HEADER.replacen("id", "gene", 1);
        let err = parse_gene_summary(&shifted).unwrap_err();
        assert!(matches!(err, ParseError::GeneSummaryHeader { .. }));
    }

    #[test]
    fn short_rows_report_their_line() {
        let text = format!("{HEADER}\nA\t4\t0.1\n");
        assert_eq!(
            parse_gene_summary(&text).unwrap_err(),
            ParseError::FieldCount {
                line: 2,
                expected: 14,
                found: 3
            }
        );
    }

    #[test]
    fn malformed_statistics_read_as_nan() {
        let text = format!("{HEADER}\nA\t4\tNA\t0.1\t0.1\t1\t1\t0.5\t0.1\t0.1\t0.1\t1\t1\t0.5\n");
        let summary = parse_gene_summary(&text).unwrap();
        assert!(summary.genes[0].neg.score.is_nan());
    }
}
