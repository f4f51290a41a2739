//! End-to-end runs.
//!
//! [`run`] takes seeds through aggregation, co-citation analysis and output
//! writing; [`run_network`] builds a network from a previously written
//! detailed document.

use crate::aggregator::{Aggregator, FetchPlan};
use crate::analyzer::{analyze, Analysis};
use crate::config::Config;
use crate::error::{CociteError, Result};
use crate::identifier::Identifier;
use crate::network::{build_network, label_network, NetworkDocument, NetworkOptions};
use crate::output::{self, BACKWARD_COLUMNS, BACKWARD_FILE, DETAILED_FILE, FORWARD_COLUMNS, FORWARD_FILE, SUMMARY_FILE};
use crate::record::{DetailedDocument, SeedRecord};
use crate::source::SourceAdapter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Options for one expansion run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Backward threshold; 0 disables the direction
    pub n: usize,
    /// Forward threshold; 0 disables the direction
    pub m: usize,
    /// Collect references and citations without analysis
    pub base_only: bool,
    pub output_dir: PathBuf,
    /// Also build a network from the collected data
    pub network: Option<NetworkOptions>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            n: 2,
            m: 2,
            base_only: false,
            output_dir: PathBuf::from("./output"),
            network: None,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.base_only && self.n == 0 && self.m == 0 {
            return Err(CociteError::Validation(
                "both thresholds are 0; set N or M, or use base-only mode".into(),
            ));
        }
        Ok(())
    }
}

/// What a run produced
#[derive(Debug)]
pub struct RunReport {
    pub records: Vec<SeedRecord>,
    pub analysis: Analysis,
    pub files: Vec<PathBuf>,
}

impl RunReport {
    pub fn failed_seeds(&self) -> usize {
        self.records.iter().filter(|r| r.fetch_error.is_some()).count()
    }
}

/// Run aggregation and analysis for `seeds` and write every output file.
pub async fn run(
    config: &Config,
    sources: Vec<Arc<dyn SourceAdapter>>,
    seeds: &[Identifier],
    options: &RunOptions,
) -> Result<RunReport> {
    if seeds.is_empty() {
        return Err(CociteError::NoSeeds);
    }
    options.validate()?;
    output::prepare_output_dir(&options.output_dir)?;

    let aggregator = Aggregator::new(sources, config)?;
    let multi_source = aggregator.source_count() > 1;
    let mut plan = FetchPlan::for_thresholds(options.n, options.m, options.base_only);
    if let Some(network) = &options.network {
        plan.include(network.mode.direction());
    }
    let records = aggregator.aggregate(seeds, plan).await?;

    let analysis = if options.base_only {
        info!("Base-only mode, skipping co-citation analysis");
        Analysis::default()
    } else {
        analyze(&records, options.n, options.m)
    };

    let dir = options.output_dir.as_path();
    let mut files = Vec::new();

    let summary = dir.join(SUMMARY_FILE);
    output::write_summary(&summary, &records)?;
    files.push(summary);

    if let Some(results) = &analysis.backward {
        let path = dir.join(BACKWARD_FILE);
        output::save_csv(&path, &output::backward_rows(results), BACKWARD_COLUMNS)?;
        files.push(path);
    }
    if let Some(results) = &analysis.forward {
        let path = dir.join(FORWARD_FILE);
        output::save_csv(&path, &output::forward_rows(results), FORWARD_COLUMNS)?;
        files.push(path);
    }

    let document = DetailedDocument::from_records(&records, multi_source);
    let detailed = dir.join(DETAILED_FILE);
    output::write_detailed(&detailed, &document)?;
    files.push(detailed);

    if let Some(network) = &options.network {
        let Some(label_source) = aggregator.primary_source() else {
            return Err(CociteError::Config("no source available for labels".into()));
        };
        let path = dir.join(network.mode.file_name());
        write_network_document(&document, network, label_source.as_ref(), config, &path).await?;
        files.push(path);
    }

    Ok(RunReport {
        records,
        analysis,
        files,
    })
}

/// Build a network from a detailed document on disk.
///
/// `output` defaults to `network_<mode>.json` next to the input.
pub async fn run_network(
    config: &Config,
    input: &Path,
    output: Option<&Path>,
    options: &NetworkOptions,
    source: &dyn SourceAdapter,
) -> Result<(PathBuf, NetworkDocument)> {
    let document = output::read_detailed(input)?;
    if document.is_empty() {
        warn!(path = %input.display(), "Detailed document has no seeds");
    }

    let path = match output {
        Some(p) => p.to_path_buf(),
        None => input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(options.mode.file_name()),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        output::prepare_output_dir(parent)?;
    }

    let network = write_network_document(&document, options, source, config, &path).await?;
    Ok((path, network))
}

async fn write_network_document(
    document: &DetailedDocument,
    options: &NetworkOptions,
    source: &dyn SourceAdapter,
    config: &Config,
    path: &Path,
) -> Result<NetworkDocument> {
    let graph = build_network(document, options);
    info!(
        mode = %options.mode,
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "Built network"
    );
    let network = label_network(&graph, source, config).await;
    output::write_network(path, &network)?;
    Ok(network)
}
