//! Viewer configuration.

use serde::{Deserialize, Serialize};

use crate::normalize::Scheme;

/// Guides of this gene anchor the `control` normalization by default.
pub const DEFAULT_CONTROL_GENE: &str = "NO-TARGET";

/// Colours handed out to selected genes, in order.
pub const DEFAULT_PALETTE: [&str; 5] = ["#04AF54", "#AFAA05", "#5D05AF", "#AF0585", "#68DE3D"];

/// How the free-text search box matches gene, guide and library names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Case-sensitive substring match.
    #[default]
    Substring,
    /// The search text is a regular expression.
    Regex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Gene id of the non-targeting control guides.
    pub control_gene: String,
    /// Palette for selected genes (must not be empty).
    pub palette: Vec<String>,
    pub search_mode: SearchMode,
    /// Scheme applied to guide display values right after import.
    pub default_scheme: Scheme,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            control_gene: DEFAULT_CONTROL_GENE.to_string(),
            palette: DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect(),
            search_mode: SearchMode::Substring,
            default_scheme: Scheme::Raw,
        }
    }
}

impl ViewerConfig {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
