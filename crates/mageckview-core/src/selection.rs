//! The user's gene selection.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::DEFAULT_PALETTE;
use crate::error::{Result, ViewError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedGene {
    pub name: String,
    pub color: String,
}

/// Selected genes in selection order, each with a display colour.
///
/// The selection doubles as the inclusion set of guide queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneSelection {
    genes: Vec<SelectedGene>,
    palette: Vec<String>,
}

impl Default for GeneSelection {
    fn default() -> Self {
        Self {
            genes: Vec::new(),
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl GeneSelection {
    pub fn with_palette(palette: Vec<String>) -> Result<Self> {
        let mut selection = Self::default();
        selection.set_palette(palette)?;
        Ok(selection)
    }

    /// Replace the palette. Colours of already selected genes are kept.
    pub fn set_palette(&mut self, palette: Vec<String>) -> Result<()> {
        if palette.is_empty() {
            return Err(ViewError::EmptyPalette);
        }
        self.palette = palette;
        Ok(())
    }

    /// Select `gene` if unselected, otherwise drop it. Returns whether the
    /// gene is selected afterwards.
    pub fn toggle(&mut self, gene: &str) -> bool {
        if let Some(pos) = self.position(gene) {
            self.genes.remove(pos);
            tracing::debug!(gene, selected = self.genes.len(), "gene deselected");
            return false;
        }
        let color = self.palette[self.genes.len() % self.palette.len()].clone();
        self.genes.push(SelectedGene {
            name: gene.to_string(),
            color,
        });
        tracing::debug!(gene, selected = self.genes.len(), "gene selected");
        true
    }

    pub fn is_selected(&self, gene: &str) -> bool {
        self.position(gene).is_some()
    }

    /// Position of `gene` in selection order.
    pub fn position(&self, gene: &str) -> Option<usize> {
        self.genes.iter().position(|g| g.name == gene)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.genes.iter().map(|g| g.name.clone()).collect()
    }

    pub fn selected(&self) -> &[SelectedGene] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn clear(&mut self) {
        self.genes.clear();
    }
}
