//! Plot-ready series: per-sample count distributions and volcano points.
//!
//! These builders return plain data. Chart construction belongs to whatever
//! renders them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewError};
use crate::record::{Direction, GeneRecord, GuideRecord, Sample};
use crate::selection::GeneSelection;

// ============================================================================
// Sample distributions
// ============================================================================

/// Value scale of plotted counts. Zero stays zero under every scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Linear,
    #[default]
    Log10,
    Log2,
}

impl Scale {
    pub const ALL: [Scale; 3] = [Scale::Linear, Scale::Log10, Scale::Log2];

    pub fn as_str(self) -> &'static str {
        match self {
            Scale::Linear => "linear",
            Scale::Log10 => "log10",
            Scale::Log2 => "log2",
        }
    }

    pub fn apply(self, value: f64) -> f64 {
        if value == 0.0 {
            return 0.0;
        }
        match self {
            Scale::Linear => value,
            Scale::Log10 => value.log10(),
            Scale::Log2 => value.log2(),
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scale {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self> {
        Scale::ALL
            .into_iter()
            .find(|scale| scale.as_str() == s)
            .ok_or_else(|| ViewError::UnknownScale(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSeries {
    pub sample: String,
    pub order: usize,
    pub values: Vec<f64>,
}

/// One series per sample, in `Sample::order`, holding `factor * count` of
/// every record under `scale`.
pub fn sample_distributions(
    records: &[GuideRecord],
    samples: &[Sample],
    factors: &[f64],
    scale: Scale,
) -> Result<Vec<SampleSeries>> {
    if factors.len() != samples.len() {
        return Err(ViewError::CountLengthMismatch {
            id: "normalization factors".to_string(),
            expected: samples.len(),
            actual: factors.len(),
        });
    }
    let mut ordered: Vec<&Sample> = samples.iter().collect();
    ordered.sort_by_key(|s| s.order);

    let mut out = Vec::with_capacity(ordered.len());
    for sample in ordered {
        let factor = factors
            .get(sample.order)
            .copied()
            .ok_or_else(|| ViewError::CountLengthMismatch {
                id: sample.name.clone(),
                expected: sample.order + 1,
                actual: factors.len(),
            })?;
        let values = records
            .iter()
            .filter_map(|r| r.counts.get(sample.order))
            .map(|&c| scale.apply(factor * c))
            .collect();
        out.push(SampleSeries {
            sample: sample.name.clone(),
            order: sample.order,
            values,
        });
    }
    Ok(out)
}

// ============================================================================
// Volcano
// ============================================================================

/// Which statistics of a gene record are plotted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneGroup {
    #[default]
    Best,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneMetric {
    #[default]
    #[serde(rename = "pvalue")]
    Pvalue,
    #[serde(rename = "FDR")]
    Fdr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuideMetric {
    #[default]
    #[serde(rename = "pvalue")]
    Pvalue,
    #[serde(rename = "FDR")]
    Fdr,
    #[serde(rename = "pLow")]
    PLow,
    #[serde(rename = "pHigh")]
    PHigh,
}

/// An unclassified point: LFC against a significance value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPoint<'a> {
    pub label: &'a str,
    pub gene: &'a str,
    pub lfc: f64,
    pub significance: f64,
}

pub fn gene_points(
    genes: &[GeneRecord],
    group: GeneGroup,
    metric: GeneMetric,
) -> Vec<RawPoint<'_>> {
    genes
        .iter()
        .map(|g| {
            let (lfc, pvalue, fdr) = match group {
                GeneGroup::Best => (g.lfc, g.pvalue, g.fdr),
                GeneGroup::Neg => side(g, Direction::Neg),
                GeneGroup::Pos => side(g, Direction::Pos),
            };
            RawPoint {
                label: &g.gene,
                gene: &g.gene,
                lfc,
                significance: match metric {
                    GeneMetric::Pvalue => pvalue,
                    GeneMetric::Fdr => fdr,
                },
            }
        })
        .collect()
}

fn side(gene: &GeneRecord, direction: Direction) -> (f64, f64, f64) {
    let stats = gene.direction(direction);
    (stats.lfc, stats.pvalue, stats.fdr)
}

pub fn guide_points(guides: &[GuideRecord], metric: GuideMetric) -> Vec<RawPoint<'_>> {
    guides
        .iter()
        .map(|g| RawPoint {
            label: g.id(),
            gene: g.gene(),
            lfc: g.stats.lfc,
            significance: match metric {
                GuideMetric::Pvalue => g.stats.pvalue,
                GuideMetric::Fdr => g.stats.fdr,
                GuideMetric::PLow => g.stats.p_low,
                GuideMetric::PHigh => g.stats.p_high,
            },
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolcanoThresholds {
    /// Points above this significance value are never called.
    pub pvalue: f64,
    /// Absolute LFC a called point must exceed.
    pub lfc: f64,
}

impl Default for VolcanoThresholds {
    fn default() -> Self {
        Self {
            pvalue: 0.05,
            lfc: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolcanoClass {
    Neg,
    Const,
    Pos,
    /// Gene at this position of the selection.
    Selected(usize),
}

impl VolcanoClass {
    pub fn classify(lfc: f64, significance: f64, thresholds: &VolcanoThresholds) -> Self {
        if significance > thresholds.pvalue {
            VolcanoClass::Const
        } else if lfc < -thresholds.lfc {
            VolcanoClass::Neg
        } else if lfc > thresholds.lfc {
            VolcanoClass::Pos
        } else {
            VolcanoClass::Const
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolcanoPoint {
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub class: VolcanoClass,
}

/// Classify points and map significance to `-log10`.
///
/// A significance of exactly zero plots at `-log10` of the smallest positive
/// significance (capped at 1), i.e. on top of the most significant point.
pub fn volcano_points(
    points: &[RawPoint<'_>],
    selection: &GeneSelection,
    thresholds: &VolcanoThresholds,
) -> Vec<VolcanoPoint> {
    let min_positive = points
        .iter()
        .map(|p| p.significance)
        .filter(|&s| s != 0.0)
        .fold(1.0_f64, |min, s| if s < min { s } else { min });
    let ceiling = -min_positive.log10();

    points
        .iter()
        .map(|p| {
            let class = match selection.position(p.gene) {
                Some(i) => VolcanoClass::Selected(i),
                None => VolcanoClass::classify(p.lfc, p.significance, thresholds),
            };
            VolcanoPoint {
                label: p.label.to_string(),
                x: p.lfc,
                y: if p.significance == 0.0 {
                    ceiling
                } else {
                    -p.significance.log10()
                },
                class,
            }
        })
        .collect()
}

pub const GRID_COLUMNS: f64 = 300.0;
pub const GRID_ROWS: f64 = 100.0;
/// Unselected points kept per grid cell.
pub const GRID_CELL_CAPACITY: usize = 101;

/// Drop unselected points from crowded regions.
///
/// The plane spanned by x (always including 0) and y in `[0, max y]` is cut
/// into a 300×100 grid; each cell keeps its first `GRID_CELL_CAPACITY`
/// unselected points. Selected points are always kept. Input order is kept.
pub fn thin_grid(points: Vec<VolcanoPoint>) -> Vec<VolcanoPoint> {
    let (min_x, max_x, max_y) = points.iter().fold((0.0_f64, 0.0_f64, 0.0_f64), |acc, p| {
        (acc.0.min(p.x), acc.1.max(p.x), acc.2.max(p.y))
    });
    let cell = |value: f64, span: f64, cells: f64| -> i64 {
        if span > 0.0 {
            (value * cells / span).round() as i64
        } else {
            0
        }
    };

    let before = points.len();
    let mut occupancy: HashMap<(i64, i64), usize> = HashMap::new();
    let kept: Vec<VolcanoPoint> = points
        .into_iter()
        .filter(|p| {
            if matches!(p.class, VolcanoClass::Selected(_)) {
                return true;
            }
            let key = (
                cell(p.x - min_x, max_x - min_x, GRID_COLUMNS),
                cell(p.y, max_y, GRID_ROWS),
            );
            let count = occupancy.entry(key).or_insert(0);
            if *count < GRID_CELL_CAPACITY {
                *count += 1;
                true
            } else {
                false
            }
        })
        .collect();
    tracing::debug!(before, kept = kept.len(), "volcano points thinned");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn raw<'a>(label: &'a str, lfc: f64, significance: f64) -> RawPoint<'a> {
        RawPoint {
            label,
            gene: label,
            lfc,
            significance,
        }
    }

    #[test]
    fn classification_follows_thresholds() {
        let t = VolcanoThresholds::default();
        assert_eq!(VolcanoClass::classify(-2.0, 0.01, &t), VolcanoClass::Neg);
        assert_eq!(VolcanoClass::classify(2.0, 0.01, &t), VolcanoClass::Pos);
        assert_eq!(VolcanoClass::classify(0.5, 0.01, &t), VolcanoClass::Const);
        assert_eq!(VolcanoClass::classify(-2.0, 0.5, &t), VolcanoClass::Const);
        assert_eq!(VolcanoClass::classify(-2.0, 0.05, &t), VolcanoClass::Neg);
    }

    #[test]
    fn zero_significance_plots_at_the_top() {
        let points = [raw("a", 1.0, 0.0), raw("b", 1.0, 0.001), raw("c", 1.0, 0.5)];
        let selection = GeneSelection::default();
        let out = volcano_points(&points, &selection, &VolcanoThresholds::default());
        assert_relative_eq!(out[0].y, 3.0, epsilon = 1e-12);
        assert_relative_eq!(out[1].y, 3.0, epsilon = 1e-12);
        assert_relative_eq!(out[2].y, -(0.5_f64.log10()), epsilon = 1e-12);
    }

    #[test]
    fn selected_genes_get_their_selection_slot() {
        let mut selection = GeneSelection::default();
        selection.toggle("x");
        selection.toggle("b");
        let points = [raw("a", -3.0, 0.001), raw("b", -3.0, 0.001)];
        let out = volcano_points(&points, &selection, &VolcanoThresholds::default());
        assert_eq!(out[0].class, VolcanoClass::Neg);
        assert_eq!(out[1].class, VolcanoClass::Selected(1));
    }

    #[test]
    fn thinning_caps_crowded_cells() {
        let mut points: Vec<VolcanoPoint> = (0..250)
            .map(|i| VolcanoPoint {
                label: format!("p{i}"),
                x: 0.0,
                y: 0.0,
                class: VolcanoClass::Const,
            })
            .collect();
        points.push(VolcanoPoint {
            label: "sel".to_string(),
            x: 0.0,
            y: 0.0,
            class: VolcanoClass::Selected(0),
        });
        let kept = thin_grid(points);
        assert_eq!(kept.len(), GRID_CELL_CAPACITY + 1);
        assert_eq!(kept[0].label, "p0");
        assert_eq!(kept.last().map(|p| p.label.as_str()), Some("sel"));
    }

    #[test]
    fn scales_keep_zero() {
        assert_eq!(Scale::Log10.apply(0.0), 0.0);
        assert_eq!(Scale::Log2.apply(8.0), 3.0);
        assert_eq!(Scale::Linear.apply(7.5), 7.5);
        assert_eq!("log2".parse::<Scale>().unwrap(), Scale::Log2);
        assert!("ln".parse::<Scale>().is_err());
    }

    #[test]
    fn distributions_follow_sample_order() {
        let guides = vec![
            GuideRecord::new(crate::record::GuideStats::bare("g1", "A"), None, vec![10.0, 0.0]),
            GuideRecord::new(crate::record::GuideStats::bare("g2", "A"), None, vec![100.0, 4.0]),
        ];
        let samples = vec![Sample::new("late", 1), Sample::new("early", 0)];
        let series =
            sample_distributions(&guides, &samples, &[1.0, 0.5], Scale::Linear).unwrap();
        assert_eq!(series[0].sample, "early");
        assert_eq!(series[0].values, vec![10.0, 100.0]);
        assert_eq!(series[1].values, vec![0.0, 2.0]);

        assert!(sample_distributions(&guides, &samples, &[1.0], Scale::Log10).is_err());
    }
}
