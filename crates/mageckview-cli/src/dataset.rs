//! Loading screen files into a session.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Args;
use mageckview_core::{LibraryAssignment, ScreenSession, ViewerConfig};
use mageckview_ingest::{parse_count_table, parse_gene_summary, parse_guide_summary, parse_library};

#[derive(Args, Debug, Clone, Default)]
pub struct DatasetArgs {
    /// `*.gene_summary.txt` produced by `mageck test`
    #[arg(long)]
    pub genes: Option<PathBuf>,

    /// `*.sgrna_summary.txt` produced by `mageck test`
    #[arg(long)]
    pub guides: Option<PathBuf>,

    /// `*.count.txt` produced by `mageck count`
    #[arg(long)]
    pub counts: Option<PathBuf>,

    /// Library file as NAME=PATH (repeatable; first match wins)
    #[arg(long = "library", value_name = "NAME=PATH")]
    pub libraries: Vec<String>,
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn libraries(specs: &[String]) -> Result<Option<LibraryAssignment>> {
    if specs.is_empty() {
        return Ok(None);
    }
    let mut assignment = LibraryAssignment::new();
    for spec in specs {
        let (name, path) = spec
            .split_once('=')
            .ok_or_else(|| anyhow!("library must be NAME=PATH, got `{spec}`"))?;
        let text = read(Path::new(path))?;
        assignment.push(parse_library(&text, name));
    }
    Ok(Some(assignment))
}

pub struct Loaded {
    pub session: ScreenSession,
    /// Header of the guide summary; empty without `--guides`.
    pub guide_header: Vec<String>,
}

impl DatasetArgs {
    /// Build a session from whichever files were given. Guide data needs both
    /// `--guides` and `--counts`.
    pub fn load(&self, config: ViewerConfig) -> Result<Loaded> {
        let mut session = ScreenSession::new(config)?;
        let mut guide_header = Vec::new();

        if let Some(path) = &self.genes {
            let summary = parse_gene_summary(&read(path)?)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            session.load_genes(summary.genes);
        }

        match (&self.guides, &self.counts) {
            (Some(guides), Some(counts)) => {
                let summary = parse_guide_summary(&read(guides)?)
                    .with_context(|| format!("failed to parse {}", guides.display()))?;
                let table = parse_count_table(&read(counts)?)
                    .with_context(|| format!("failed to parse {}", counts.display()))?;
                let libraries = libraries(&self.libraries)?;
                guide_header = summary.header;
                session
                    .load_guides(summary.guides, table, libraries.as_ref())
                    .context("failed to merge guide statistics with counts")?;
            }
            (None, None) => {}
            _ => return Err(anyhow!("--guides and --counts must be given together")),
        }
        Ok(Loaded {
            session,
            guide_header,
        })
    }
}
