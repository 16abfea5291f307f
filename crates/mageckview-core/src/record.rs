//! Gene- and guide-level records.
//!
//! Gene records come straight from a `*.gene_summary.txt` table. Guide records
//! are built by [`crate::merge`] from a `*.sgrna_summary.txt` table joined with
//! the raw count matrix.

use serde::{Deserialize, Serialize};

/// A sequenced column of the count matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub name: String,
    pub order: usize,
}

impl Sample {
    pub fn new(name: impl Into<String>, order: usize) -> Self {
        Self {
            name: name.into(),
            order,
        }
    }
}

// ============================================================================
// Gene level
// ============================================================================

/// Selection direction of a gene-level test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Neg,
    Pos,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Neg => "neg",
            Direction::Pos => "pos",
        }
    }
}

/// Statistics of one selection direction (negative or positive) for a gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionStats {
    pub score: f64,
    pub pvalue: f64,
    #[serde(rename = "FDR")]
    pub fdr: f64,
    pub rank: f64,
    pub good: i64,
    #[serde(rename = "LFC")]
    pub lfc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneRecord {
    pub gene: String,
    #[serde(rename = "numSgRNA")]
    pub num_sgrna: i64,
    pub neg: DirectionStats,
    pub pos: DirectionStats,
    pub best: Direction,
    #[serde(rename = "LFC")]
    pub lfc: f64,
    pub pvalue: f64,
    #[serde(rename = "FDR")]
    pub fdr: f64,
    /// Position of the gene when sorted by best-direction LFC, descending.
    pub rank: usize,
}

impl GeneRecord {
    /// Build a gene record, picking the best direction.
    ///
    /// With equal p-values the negative direction wins only when its absolute
    /// LFC exceeds the positive LFC; otherwise the smaller p-value wins.
    pub fn new(
        gene: impl Into<String>,
        num_sgrna: i64,
        neg: DirectionStats,
        pos: DirectionStats,
    ) -> Self {
        let best = if neg.pvalue == pos.pvalue {
            if neg.lfc.abs() > pos.lfc {
                Direction::Neg
            } else {
                Direction::Pos
            }
        } else if neg.pvalue < pos.pvalue {
            Direction::Neg
        } else {
            Direction::Pos
        };
        let chosen = match best {
            Direction::Neg => &neg,
            Direction::Pos => &pos,
        };
        let (lfc, pvalue, fdr) = (chosen.lfc, chosen.pvalue, chosen.fdr);
        Self {
            gene: gene.into(),
            num_sgrna,
            neg,
            pos,
            best,
            lfc,
            pvalue,
            fdr,
            rank: 0,
        }
    }

    pub fn direction(&self, direction: Direction) -> &DirectionStats {
        match direction {
            Direction::Neg => &self.neg,
            Direction::Pos => &self.pos,
        }
    }
}

/// Assign `rank` by best-direction LFC, highest first.
pub fn rank_by_lfc(genes: &mut [GeneRecord]) {
    let mut order: Vec<usize> = (0..genes.len()).collect();
    order.sort_by(|&a, &b| genes[b].lfc.total_cmp(&genes[a].lfc));
    for (rank, idx) in order.into_iter().enumerate() {
        genes[idx].rank = rank;
    }
}

// ============================================================================
// Guide level
// ============================================================================

/// One row of a `*.sgrna_summary.txt` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideStats {
    pub sgrna: String,
    pub gene: String,
    pub control_count: String,
    pub treatment_count: String,
    pub control_mean: f64,
    pub treat_mean: f64,
    #[serde(rename = "LFC")]
    pub lfc: f64,
    pub control_var: f64,
    pub adj_var: f64,
    pub score: f64,
    #[serde(rename = "pLow")]
    pub p_low: f64,
    #[serde(rename = "pHigh")]
    pub p_high: f64,
    pub pvalue: f64,
    #[serde(rename = "FDR")]
    pub fdr: f64,
    #[serde(rename = "highInTreatment")]
    pub high_in_treatment: bool,
}

impl GuideStats {
    /// Stats row with every statistic unset, for callers that only carry ids.
    pub fn bare(sgrna: impl Into<String>, gene: impl Into<String>) -> Self {
        Self {
            sgrna: sgrna.into(),
            gene: gene.into(),
            control_count: String::new(),
            treatment_count: String::new(),
            control_mean: f64::NAN,
            treat_mean: f64::NAN,
            lfc: f64::NAN,
            control_var: f64::NAN,
            adj_var: f64::NAN,
            score: f64::NAN,
            p_low: f64::NAN,
            p_high: f64::NAN,
            pvalue: f64::NAN,
            fdr: f64::NAN,
            high_in_treatment: false,
        }
    }
}

/// A guide (sgRNA) joined with its raw counts and library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideRecord {
    #[serde(flatten)]
    pub stats: GuideStats,
    pub library: Option<String>,
    /// Raw counts, one per sample, aligned to `Sample::order`.
    pub counts: Vec<f64>,
    /// Counts scaled by the currently displayed normalization scheme.
    pub normalized: Vec<f64>,
}

impl GuideRecord {
    pub fn new(stats: GuideStats, library: Option<String>, counts: Vec<f64>) -> Self {
        let normalized = counts.clone();
        Self {
            stats,
            library,
            counts,
            normalized,
        }
    }

    pub fn id(&self) -> &str {
        &self.stats.sgrna
    }

    pub fn gene(&self) -> &str {
        &self.stats.gene
    }
}
