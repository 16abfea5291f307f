//! Tab-separated exports of guide records.

use crate::record::{GuideRecord, Sample};
use crate::schema::ScreenRecord;

/// Column names of a MAGeCK `*.sgrna_summary.txt` table.
pub const GUIDE_SUMMARY_HEADER: [&str; 15] = [
    "sgrna",
    "Gene",
    "control_count",
    "treatment_count",
    "control_mean",
    "treat_mean",
    "LFC",
    "control_var",
    "adj_var",
    "score",
    "p.low",
    "p.high",
    "p.twosided",
    "FDR",
    "high_in_treatment",
];

fn push_row<I, S>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push('\t');
        }
        out.push_str(field.as_ref());
    }
    out.push('\n');
}

fn display_values<'a>(
    record: &'a GuideRecord,
    samples: &'a [Sample],
) -> impl Iterator<Item = String> + 'a {
    samples.iter().map(move |s| match record.sample_value(s.order) {
        Some(v) => v.to_string(),
        None => String::new(),
    })
}

/// Guide statistics in summary-table layout, one row per record in the given
/// order. With `with_counts`, the display value of every sample follows.
///
/// `header` is the header of the imported summary table; an empty header
/// falls back to [`GUIDE_SUMMARY_HEADER`].
pub fn export_guides_tsv<'a, H>(
    header: &[H],
    records: impl IntoIterator<Item = &'a GuideRecord>,
    samples: &[Sample],
    with_counts: bool,
) -> String
where
    H: AsRef<str>,
{
    let mut out = String::new();
    let mut columns: Vec<&str> = if header.is_empty() {
        GUIDE_SUMMARY_HEADER.to_vec()
    } else {
        header.iter().map(|h| h.as_ref()).collect()
    };
    if with_counts {
        columns.extend(samples.iter().map(|s| s.name.as_str()));
    }
    push_row(&mut out, columns);

    for record in records {
        let s = &record.stats;
        let mut row = vec![
            s.sgrna.clone(),
            s.gene.clone(),
            s.control_count.clone(),
            s.treatment_count.clone(),
            s.control_mean.to_string(),
            s.treat_mean.to_string(),
            s.lfc.to_string(),
            s.control_var.to_string(),
            s.adj_var.to_string(),
            s.score.to_string(),
            s.p_low.to_string(),
            s.p_high.to_string(),
            s.pvalue.to_string(),
            s.fdr.to_string(),
            if s.high_in_treatment { "True" } else { "False" }.to_string(),
        ];
        if with_counts {
            row.extend(display_values(record, samples));
        }
        push_row(&mut out, row);
    }
    out
}

/// `sgRNA Gene <samples…>` count table of the display values.
pub fn export_count_table<'a>(
    records: impl IntoIterator<Item = &'a GuideRecord>,
    samples: &[Sample],
) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        ["sgRNA", "Gene"]
            .into_iter()
            .chain(samples.iter().map(|s| s.name.as_str())),
    );
    for record in records {
        push_row(
            &mut out,
            [record.id().to_string(), record.gene().to_string()]
                .into_iter()
                .chain(display_values(record, samples)),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::GuideStats;

    fn guide() -> GuideRecord {
        let mut stats = GuideStats::bare("g1", "TP53");
        stats.control_count = "10/12".to_string();
        stats.treatment_count = "3/4".to_string();
        stats.lfc = -1.5;
        stats.pvalue = 0.01;
        stats.high_in_treatment = true;
        let mut g = GuideRecord::new(stats, Some("libB".to_string()), vec![10.0, 20.0]);
        g.normalized = vec![5.5, 20.0];
        g
    }

    #[test]
    fn guide_rows_follow_summary_layout() {
        let samples = vec![Sample::new("plasmid", 0), Sample::new("day14", 1)];
        let g = guide();
        let no_header: [&str; 0] = [];
        let text = export_guides_tsv(&no_header, [&g], &samples, false);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(GUIDE_SUMMARY_HEADER.join("\t").as_str()));
        let row: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(row.len(), 15);
        assert_eq!(row[0], "g1");
        assert_eq!(row[2], "10/12");
        assert_eq!(row[6], "-1.5");
        assert_eq!(row[12], "0.01");
        assert_eq!(row[14], "True");
    }

    #[test]
    fn counts_use_display_values() {
        let samples = vec![Sample::new("plasmid", 0), Sample::new("day14", 1)];
        let g = guide();
        let text = export_guides_tsv(&["sgrna", "Gene"], [&g], &samples, true);
        let header: Vec<&str> = text.lines().next().unwrap().split('\t').collect();
        assert_eq!(header, ["sgrna", "Gene", "plasmid", "day14"]);
        assert!(text.lines().nth(1).unwrap().ends_with("\t5.5\t20"));
    }

    #[test]
    fn count_table_layout() {
        let samples = vec![Sample::new("plasmid", 0), Sample::new("day14", 1)];
        let g = guide();
        let text = export_count_table([&g], &samples);
        assert_eq!(text, "sgRNA\tGene\tplasmid\tday14\ng1\tTP53\t5.5\t20\n");
    }
}
