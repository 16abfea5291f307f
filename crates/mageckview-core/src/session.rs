//! One loaded screen: gene and guide tables, factors, selection.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ViewerConfig;
use crate::error::{Result, ViewError};
use crate::merge::{merge, CountTable, LibraryAssignment};
use crate::normalize::{normalize_counts, NormalizationEngine, NormalizationFactorSet, Scheme};
use crate::query::{DumpKind, Page, QueryEngine, QueryRequest};
use crate::record::{GeneRecord, GuideRecord, GuideStats, Sample};
use crate::schema::ScreenRecord;
use crate::selection::GeneSelection;
use crate::series::{
    gene_points, guide_points, sample_distributions, thin_grid, volcano_points, GeneGroup,
    GeneMetric, GuideMetric, SampleSeries, Scale, VolcanoPoint, VolcanoThresholds,
};

/// Parsed inputs of one screen.
#[derive(Debug, Clone, Default)]
pub struct ScreenDataset {
    pub genes: Vec<GeneRecord>,
    pub guide_stats: Vec<GuideStats>,
    pub counts: CountTable,
    pub libraries: Option<LibraryAssignment>,
}

/// A record with its selection state, as shown in the gene table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectableRow<'a, R> {
    #[serde(flatten)]
    pub record: &'a R,
    pub selected: bool,
}

/// A guide as shown in the guide table: the record plus its display value
/// under every sample name, so sample columns can be rendered by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuideRow<'a> {
    #[serde(flatten)]
    pub record: &'a GuideRecord,
    #[serde(flatten)]
    pub samples: BTreeMap<&'a str, f64>,
}

impl<'a> GuideRow<'a> {
    pub fn new(record: &'a GuideRecord, samples: &'a [Sample]) -> Self {
        let samples = samples
            .iter()
            .filter_map(|s| record.sample_value(s.order).map(|v| (s.name.as_str(), v)))
            .collect();
        Self { record, samples }
    }
}

#[derive(Debug)]
pub struct ScreenSession {
    config: ViewerConfig,
    genes: QueryEngine<GeneRecord>,
    guides: QueryEngine<GuideRecord>,
    samples: Vec<Sample>,
    factors: Option<NormalizationFactorSet>,
    selection: GeneSelection,
    /// Scheme currently materialized in `GuideRecord::normalized`.
    displayed: Option<Scheme>,
    genes_loaded: bool,
}

impl ScreenSession {
    pub fn new(config: ViewerConfig) -> Result<Self> {
        let selection = GeneSelection::with_palette(config.palette.clone())?;
        Ok(Self {
            genes: QueryEngine::new(config.search_mode),
            guides: QueryEngine::new(config.search_mode),
            config,
            samples: Vec::new(),
            factors: None,
            selection,
            displayed: None,
            genes_loaded: false,
        })
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Load gene- and guide-level data of a screen, replacing any previous one.
    pub fn import(&mut self, dataset: ScreenDataset) -> Result<()> {
        self.load_guides(dataset.guide_stats, dataset.counts, dataset.libraries.as_ref())?;
        self.load_genes(dataset.genes);
        Ok(())
    }

    pub fn load_genes(&mut self, genes: Vec<GeneRecord>) {
        self.genes.configure(genes, &[]);
        self.genes_loaded = true;
        tracing::info!(genes = self.genes.len(), "gene summary loaded");
    }

    /// Merge guide statistics with counts, compute normalization factors and
    /// apply the configured default scheme.
    ///
    /// When the default scheme is unavailable the display falls back to `raw`.
    pub fn load_guides(
        &mut self,
        stats: Vec<GuideStats>,
        counts: CountTable,
        libraries: Option<&LibraryAssignment>,
    ) -> Result<()> {
        let records = merge(&counts, stats, libraries)?;
        let engine = NormalizationEngine::new(self.config.control_gene.clone());
        let factors = engine.compute_factors(&records, &counts.samples)?;

        self.samples = counts.samples;
        self.guides.configure(records, &self.samples);
        self.factors = Some(factors);
        self.displayed = None;
        self.selection.clear();

        let scheme = self.config.default_scheme;
        if let Err(err) = self.apply_scheme(scheme) {
            tracing::warn!(
                scheme = %scheme,
                error = %err,
                "default display scheme unavailable; showing raw counts"
            );
            self.apply_scheme(Scheme::Raw)?;
        }
        tracing::info!(
            guides = self.guides.len(),
            samples = self.samples.len(),
            "guide data loaded"
        );
        Ok(())
    }

    /// Gene and guide data are both loaded.
    pub fn ready(&self) -> bool {
        self.genes_loaded && self.factors.is_some()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn factors(&self) -> Option<&NormalizationFactorSet> {
        self.factors.as_ref()
    }

    pub fn selection(&self) -> &GeneSelection {
        &self.selection
    }

    pub fn displayed_scheme(&self) -> Option<Scheme> {
        self.displayed
    }

    pub fn genes(&self) -> &[GeneRecord] {
        self.genes.records()
    }

    pub fn guides(&self) -> &[GuideRecord] {
        self.guides.records()
    }

    pub fn toggle_gene(&mut self, gene: &str) -> bool {
        self.selection.toggle(gene)
    }

    fn require_genes(&self) -> Result<()> {
        if self.genes_loaded {
            Ok(())
        } else {
            Err(ViewError::NotReady("gene summary not loaded"))
        }
    }

    fn require_factors(&self) -> Result<&NormalizationFactorSet> {
        self.factors
            .as_ref()
            .ok_or(ViewError::NotReady("guide data not loaded"))
    }

    /// Materialize `scheme` into the guides' display values. Returns `false`
    /// when `scheme` is already displayed.
    pub fn apply_scheme(&mut self, scheme: Scheme) -> Result<bool> {
        if self.displayed == Some(scheme) {
            return Ok(false);
        }
        let factors = self.require_factors()?.get(scheme)?.to_vec();
        self.guides
            .rederive(|g| g.normalized = normalize_counts(&g.counts, &factors));
        self.displayed = Some(scheme);
        tracing::debug!(scheme = %scheme, "display scheme applied");
        Ok(true)
    }

    pub fn gene_page(
        &mut self,
        request: &QueryRequest,
    ) -> Result<Page<SelectableRow<'_, GeneRecord>>> {
        self.require_genes()?;
        let selection = &self.selection;
        let page = self.genes.query(request)?;
        Ok(page.map(|record| SelectableRow {
            selected: selection.is_selected(&record.gene),
            record,
        }))
    }

    /// Query the guide table under `scheme`. Structured requests are
    /// restricted to the guides of the selected genes.
    pub fn guide_page(
        &mut self,
        request: &QueryRequest,
        scheme: Scheme,
    ) -> Result<Page<GuideRow<'_>>> {
        self.apply_scheme(scheme)?;
        let samples = &self.samples;
        let page = match request {
            QueryRequest::Dump(kind) => self.guides.dump(*kind, 0),
            QueryRequest::Page(page) => {
                let mut page = page.clone();
                page.selected_subset = self.selection.names().into_iter().collect();
                self.guides.page(&page)?
            }
        };
        Ok(page.map(|record| GuideRow::new(record, samples)))
    }

    /// Guides of the last guide query, in display order.
    pub fn filtered_guides(&self) -> Vec<&GuideRecord> {
        self.guides.dump(DumpKind::Filtered, 0).data
    }

    pub fn distributions(&self, scheme: Scheme, scale: Scale) -> Result<Vec<SampleSeries>> {
        let factors = self.require_factors()?.get(scheme)?;
        sample_distributions(self.guides.records(), &self.samples, factors, scale)
    }

    pub fn gene_volcano(
        &self,
        group: GeneGroup,
        metric: GeneMetric,
        thresholds: &VolcanoThresholds,
    ) -> Result<Vec<VolcanoPoint>> {
        self.require_genes()?;
        let points = gene_points(self.genes.records(), group, metric);
        Ok(volcano_points(&points, &self.selection, thresholds))
    }

    /// Guide volcano, grid-thinned.
    pub fn guide_volcano(
        &self,
        metric: GuideMetric,
        thresholds: &VolcanoThresholds,
    ) -> Result<Vec<VolcanoPoint>> {
        self.require_factors()?;
        let points = guide_points(self.guides.records(), metric);
        Ok(thin_grid(volcano_points(&points, &self.selection, thresholds)))
    }
}
