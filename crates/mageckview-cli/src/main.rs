//! MAGeCKView CLI
//!
//! Serves the viewer's data layer from the command line:
//! - normalization factors of a count table
//! - gene and guide table pages (DataTables request in, page JSON out)
//! - TSV exports, sample count distributions and volcano series

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use mageckview_core::export::{export_count_table, export_guides_tsv};
use mageckview_core::series::{GeneGroup, GeneMetric, GuideMetric, VolcanoThresholds};
use mageckview_core::{
    NormalizationFactorSet, QueryRequest, Sample, Scale, Scheme, SearchMode, ViewerConfig,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod dataset;

use dataset::DatasetArgs;

#[derive(Parser)]
#[command(name = "mageckview")]
#[command(author, version, about = "MAGeCKView: browse MAGeCK screen results")]
struct Cli {
    /// Viewer configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gene whose guides anchor `control` normalization
    #[arg(long, global = true)]
    control_gene: Option<String>,

    /// Treat search text as a regular expression
    #[arg(long, global = true)]
    regex: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the normalization factors of every scheme.
    Factors {
        #[command(flatten)]
        data: DatasetArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Answer a gene table request.
    Genes {
        #[command(flatten)]
        data: DatasetArgs,

        /// Request JSON, `@file`, or `"filtered"`/`"all"`
        #[arg(long, default_value = "{}")]
        request: String,

        /// Genes to select before the query (repeatable)
        #[arg(long = "select")]
        select: Vec<String>,
    },

    /// Answer a guide table request, restricted to the selected genes.
    Guides {
        #[command(flatten)]
        data: DatasetArgs,

        #[arg(long, default_value = "{}")]
        request: String,

        #[arg(long = "select")]
        select: Vec<String>,

        /// Normalization scheme of the displayed counts
        #[arg(long, default_value = "raw")]
        scheme: Scheme,
    },

    /// Write the guides of a request as TSV.
    Export {
        #[command(flatten)]
        data: DatasetArgs,

        #[arg(long, default_value = "{}")]
        request: String,

        #[arg(long = "select")]
        select: Vec<String>,

        #[arg(long, default_value = "raw")]
        scheme: Scheme,

        /// Append the display counts of every sample
        #[arg(long)]
        with_counts: bool,

        /// Write only `sgRNA Gene <samples>` counts
        #[arg(long, conflicts_with = "with_counts")]
        count_table: bool,

        /// Output file (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Per-sample distributions of normalized counts.
    Distributions {
        #[command(flatten)]
        data: DatasetArgs,

        #[arg(long, default_value = "raw")]
        scheme: Scheme,

        #[arg(long, default_value = "log10")]
        scale: Scale,
    },

    /// Volcano series of genes or guides.
    Volcano {
        #[command(subcommand)]
        target: VolcanoTarget,
    },
}

#[derive(Subcommand)]
enum VolcanoTarget {
    Genes {
        #[command(flatten)]
        data: DatasetArgs,

        #[arg(long = "select")]
        select: Vec<String>,

        /// `best`, `neg` or `pos`
        #[arg(long, default_value = "best", value_parser = parse_name::<GeneGroup>)]
        group: GeneGroup,

        /// `pvalue` or `FDR`
        #[arg(long, default_value = "pvalue", value_parser = parse_name::<GeneMetric>)]
        metric: GeneMetric,

        #[arg(long, default_value_t = 0.05)]
        pvalue: f64,

        #[arg(long, default_value_t = 1.0)]
        lfc: f64,
    },
    Guides {
        #[command(flatten)]
        data: DatasetArgs,

        #[arg(long = "select")]
        select: Vec<String>,

        /// `pvalue`, `FDR`, `pLow` or `pHigh`
        #[arg(long, default_value = "pvalue", value_parser = parse_name::<GuideMetric>)]
        metric: GuideMetric,

        #[arg(long, default_value_t = 0.05)]
        pvalue: f64,

        #[arg(long, default_value_t = 1.0)]
        lfc: f64,
    },
}

/// Parse a unit enum by its serialized name.
fn parse_name<T: DeserializeOwned>(s: &str) -> std::result::Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|e| e.to_string())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<ViewerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ViewerConfig::from_json(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => ViewerConfig::default(),
    };
    if let Some(gene) = &cli.control_gene {
        config.control_gene = gene.clone();
    }
    if cli.regex {
        config.search_mode = SearchMode::Regex;
    }
    Ok(config)
}

fn parse_request(arg: &str) -> Result<QueryRequest> {
    let text = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).context("invalid table request")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_factors_table(samples: &[Sample], factors: &NormalizationFactorSet) {
    print!("{:<20}", "sample".bold());
    for scheme in Scheme::ALL {
        print!("{:>12}", scheme.as_str().bold());
    }
    println!();
    for sample in samples {
        print!("{:<20}", sample.name);
        for scheme in Scheme::ALL {
            match factors.get(scheme) {
                Ok(values) => print!("{:>12.4}", values[sample.order]),
                Err(_) => print!("{:>12}", "n/a".yellow()),
            }
        }
        println!();
    }
    for scheme in Scheme::ALL {
        if let Some(err) = factors.failure(scheme) {
            eprintln!("{} {scheme}: {err}", "warning:".yellow().bold());
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Factors { data, json } => {
            let session = data.load(config)?.session;
            let factors = session
                .factors()
                .context("`factors` needs --guides and --counts")?;
            if json {
                print_json(factors)?;
            } else {
                print_factors_table(session.samples(), factors);
            }
        }
        Commands::Genes {
            data,
            request,
            select,
        } => {
            let mut session = data.load(config)?.session;
            for gene in &select {
                session.toggle_gene(gene);
            }
            let request = parse_request(&request)?;
            print_json(&session.gene_page(&request)?)?;
        }
        Commands::Guides {
            data,
            request,
            select,
            scheme,
        } => {
            let mut session = data.load(config)?.session;
            for gene in &select {
                session.toggle_gene(gene);
            }
            let request = parse_request(&request)?;
            print_json(&session.guide_page(&request, scheme)?)?;
        }
        Commands::Export {
            data,
            request,
            select,
            scheme,
            with_counts,
            count_table,
            out,
        } => {
            let loaded = data.load(config)?;
            let mut session = loaded.session;
            for gene in &select {
                session.toggle_gene(gene);
            }
            // Exports cover the whole filtered set, not one page of it.
            let mut request = parse_request(&request)?;
            if let QueryRequest::Page(page) = &mut request {
                page.start = 0;
                page.length = -1;
            }
            let samples = session.samples().to_vec();
            let guides = session.guide_page(&request, scheme)?.data;
            let text = if count_table {
                export_count_table(guides.iter().map(|row| row.record), &samples)
            } else {
                export_guides_tsv(
                    &loaded.guide_header,
                    guides.iter().map(|row| row.record),
                    &samples,
                    with_counts,
                )
            };
            match out {
                Some(path) => {
                    fs::write(&path, text)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!(
                        "{} {} guides to {}",
                        "wrote".green().bold(),
                        guides.len(),
                        path.display()
                    );
                }
                None => print!("{text}"),
            }
        }
        Commands::Distributions {
            data,
            scheme,
            scale,
        } => {
            let session = data.load(config)?.session;
            print_json(&session.distributions(scheme, scale)?)?;
        }
        Commands::Volcano { target } => match target {
            VolcanoTarget::Genes {
                data,
                select,
                group,
                metric,
                pvalue,
                lfc,
            } => {
                let mut session = data.load(config)?.session;
                for gene in &select {
                    session.toggle_gene(gene);
                }
                let thresholds = VolcanoThresholds { pvalue, lfc };
                print_json(&session.gene_volcano(group, metric, &thresholds)?)?;
            }
            VolcanoTarget::Guides {
                data,
                select,
                metric,
                pvalue,
                lfc,
            } => {
                let mut session = data.load(config)?.session;
                for gene in &select {
                    session.toggle_gene(gene);
                }
                let thresholds = VolcanoThresholds { pvalue, lfc };
                print_json(&session.guide_volcano(metric, &thresholds)?)?;
            }
        },
    }
    Ok(())
}
