//! Per-sample count normalization factors.
//!
//! Factors follow the MAGeCK count normalization schemes:
//!
//! - `raw`: every factor is 1;
//! - `total`: mean column total divided by the column total;
//! - `median`: median-of-ratios against each row's geometric mean
//!   (`exp(mean(ln(count + 1)))`), rows with a zero total excluded;
//! - `control`: `median` restricted to the rows of the control gene, or `raw`
//!   when the control gene has no rows.
//!
//! Factors are computed once per dataset. A scheme that cannot be computed
//! (e.g. `total` with an empty sample) records its error; the other schemes
//! stay usable.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::config::DEFAULT_CONTROL_GENE;
use crate::error::{Result, ViewError};
use crate::record::{GuideRecord, Sample};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Raw,
    Total,
    Median,
    Control,
}

impl Scheme {
    pub const ALL: [Scheme; 4] = [Scheme::Raw, Scheme::Total, Scheme::Median, Scheme::Control];

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Raw => "raw",
            Scheme::Total => "total",
            Scheme::Median => "median",
            Scheme::Control => "control",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self> {
        Scheme::ALL
            .into_iter()
            .find(|scheme| scheme.as_str() == s)
            .ok_or_else(|| ViewError::UnknownScheme(s.to_string()))
    }
}

/// A row of the raw count matrix.
pub trait CountRow {
    fn row_id(&self) -> &str;
    fn row_gene(&self) -> &str;
    fn row_counts(&self) -> &[f64];
}

impl CountRow for GuideRecord {
    fn row_id(&self) -> &str {
        self.id()
    }

    fn row_gene(&self) -> &str {
        self.gene()
    }

    fn row_counts(&self) -> &[f64] {
        &self.counts
    }
}

/// Scheme name → per-sample factors, aligned to `Sample::order`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizationFactorSet {
    factors: BTreeMap<Scheme, Vec<f64>>,
    #[serde(serialize_with = "errors_as_text", skip_serializing_if = "BTreeMap::is_empty")]
    failures: BTreeMap<Scheme, ViewError>,
}

fn errors_as_text<S: Serializer>(
    errors: &BTreeMap<Scheme, ViewError>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(errors.iter().map(|(k, v)| (k, v.to_string())))
}

impl NormalizationFactorSet {
    pub fn get(&self, scheme: Scheme) -> Result<&[f64]> {
        if let Some(factors) = self.factors.get(&scheme) {
            return Ok(factors);
        }
        Err(match self.failures.get(&scheme) {
            Some(err) => err.clone(),
            None => ViewError::SchemeUnavailable {
                scheme,
                reason: "factors were not computed".to_string(),
            },
        })
    }

    pub fn failure(&self, scheme: Scheme) -> Option<&ViewError> {
        self.failures.get(&scheme)
    }

    /// Schemes with usable factors.
    pub fn available(&self) -> impl Iterator<Item = Scheme> + '_ {
        self.factors.keys().copied()
    }

    fn record(&mut self, scheme: Scheme, factors: Result<Vec<f64>>) {
        match factors {
            Ok(f) => {
                self.factors.insert(scheme, f);
            }
            Err(err) => {
                tracing::warn!(
                    scheme = %scheme,
                    error = %err,
                    "normalization scheme unavailable"
                );
                self.failures.insert(scheme, err);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizationEngine {
    control_gene: String,
}

impl Default for NormalizationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CONTROL_GENE)
    }
}

impl NormalizationEngine {
    pub fn new(control_gene: impl Into<String>) -> Self {
        Self {
            control_gene: control_gene.into(),
        }
    }

    pub fn control_gene(&self) -> &str {
        &self.control_gene
    }

    /// Compute the factors of every scheme.
    ///
    /// Fails only when a row's count vector does not have one entry per sample.
    pub fn compute_factors<T: CountRow>(
        &self,
        rows: &[T],
        samples: &[Sample],
    ) -> Result<NormalizationFactorSet> {
        let n = samples.len();
        for row in rows {
            let actual = row.row_counts().len();
            if actual != n {
                return Err(ViewError::CountLengthMismatch {
                    id: row.row_id().to_string(),
                    expected: n,
                    actual,
                });
            }
        }

        let all: Vec<&[f64]> = rows.iter().map(|r| r.row_counts()).collect();
        let control: Vec<&[f64]> = rows
            .iter()
            .filter(|r| r.row_gene() == self.control_gene)
            .map(|r| r.row_counts())
            .collect();

        let mut set = NormalizationFactorSet::default();
        set.record(Scheme::Raw, Ok(vec![1.0; n]));
        set.record(Scheme::Total, total_count_factors(&all, samples));
        set.record(Scheme::Median, Ok(median_of_ratios(&all, n)));
        let control_factors = if control.is_empty() {
            tracing::debug!(
                control_gene = %self.control_gene,
                "no control rows; using raw factors"
            );
            vec![1.0; n]
        } else {
            median_of_ratios(&control, n)
        };
        set.record(Scheme::Control, Ok(control_factors));

        tracing::debug!(
            rows = rows.len(),
            control_rows = control.len(),
            samples = n,
            "normalization factors computed"
        );
        Ok(set)
    }
}

/// `mean(column totals) / column total` per sample.
pub fn total_count_factors(rows: &[&[f64]], samples: &[Sample]) -> Result<Vec<f64>> {
    let n = samples.len();
    let mut sums = vec![0.0; n];
    for counts in rows {
        for (sum, c) in sums.iter_mut().zip(counts.iter()) {
            *sum += c;
        }
    }
    if let Some(index) = sums.iter().position(|&s| s == 0.0) {
        let sample = samples
            .iter()
            .find(|s| s.order == index)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        return Err(ViewError::ZeroSampleTotal { sample, index });
    }
    let mean = sums.iter().sum::<f64>() / n as f64;
    Ok(sums.iter().map(|s| mean / s).collect())
}

/// Median-of-ratios factors over `rows`, each with `n` counts.
///
/// Rows whose length is not `n` are ignored.
pub fn median_of_ratios(rows: &[&[f64]], n: usize) -> Vec<f64> {
    // None marks rows with a zero total or the wrong length; they take no part
    // in the ratios.
    let geo_means: Vec<Option<f64>> = rows
        .iter()
        .map(|counts| {
            if counts.len() != n || counts.iter().sum::<f64>() <= 0.0 {
                return None;
            }
            let mean_log = counts.iter().map(|c| (c + 1.0).ln()).sum::<f64>() / n as f64;
            let g = mean_log.exp();
            Some(if g <= 0.0 { 1.0 } else { g })
        })
        .collect();

    (0..n)
        .map(|i| {
            let mut ratios: Vec<f64> = rows
                .iter()
                .zip(&geo_means)
                .filter_map(|(counts, g)| g.and_then(|g| counts.get(i).map(|c| c / g)))
                .collect();
            ratios.sort_by(f64::total_cmp);
            match ratios.get(ratios.len() / 2) {
                Some(&median) if median > 0.0 => 1.0 / median,
                _ => 0.0,
            }
        })
        .collect()
}

/// Display value of a raw count: scaled, rounded to two decimals.
pub fn normalized_value(raw: f64, factor: f64) -> f64 {
    (raw * factor * 100.0).round() / 100.0
}

pub fn normalize_counts(counts: &[f64], factors: &[f64]) -> Vec<f64> {
    counts
        .iter()
        .zip(factors)
        .map(|(&c, &f)| normalized_value(c, f))
        .collect()
}
