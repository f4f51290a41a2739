//! rustcocite - co-citation expansion CLI
//!
//! Expands a seed set of papers into the papers most often referenced by, or
//! citing, several seeds, and builds link networks between the seeds.
//!
//! ## Usage
//!
//! ```bash
//! rustcocite run --doi 10.1038/nature14539 --doi 10.1126/science.1127647 -n 2 -m 2
//! rustcocite run --input seeds.txt --api openalex --network bibliographic_coupling
//! rustcocite network output/detailed_references_citations.json --mode co_citation
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustcocite::config::{ApiMode, Config};
use rustcocite::identifier::parse_seeds;
use rustcocite::network::{NetworkMode, NetworkOptions};
use rustcocite::output::LOG_FILE;
use rustcocite::pipeline::{self, RunOptions};
use rustcocite::source;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Co-citation expansion over OpenAlex and Semantic Scholar
#[derive(Parser)]
#[command(name = "rustcocite")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit console logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Contact email for the OpenAlex polite pool
    #[arg(long, global = true, env = "OPENALEX_EMAIL")]
    email: Option<String>,

    /// Semantic Scholar API key
    #[arg(long, global = true, env = "SEMANTIC_SCHOLAR_API_KEY", hide_env_values = true)]
    s2_key: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long, global = true, default_value_t = 300)]
    timeout: u64,

    /// Seeds (or network nodes) fetched concurrently
    #[arg(long, global = true, default_value_t = 4)]
    concurrency: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect references/citations for seeds and run co-citation analysis
    Run {
        /// Seed DOI or MAG id (repeatable)
        #[arg(long = "doi")]
        dois: Vec<String>,

        /// Text file with one identifier per line (`#` starts a comment)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Backward threshold: papers referenced by at least N seeds (0 disables)
        #[arg(short = 'n', default_value_t = 2)]
        n: usize,

        /// Forward threshold: papers citing at least M seeds (0 disables)
        #[arg(short = 'm', default_value_t = 2)]
        m: usize,

        /// Only collect references and citations, skip analysis
        #[arg(long)]
        base_only: bool,

        /// Data source
        #[arg(long, default_value = "composite", value_parser = ["openalex", "semantic_scholar", "composite"])]
        api: String,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Also build a network after collection
        #[arg(long, value_parser = ["bibliographic_coupling", "co_citation"])]
        network: Option<String>,

        /// Minimum edge weight for --network
        #[arg(long, default_value_t = 1)]
        min_strength: usize,

        /// Node cap for --network
        #[arg(long)]
        max_nodes: Option<usize>,
    },

    /// Build a network from a detailed_references_citations.json file
    Network {
        /// Detailed JSON written by `run`
        input: PathBuf,

        /// Link type
        #[arg(long, default_value = "bibliographic_coupling", value_parser = ["bibliographic_coupling", "co_citation"])]
        mode: String,

        /// Minimum edge weight (values below 1 behave as 1)
        #[arg(long, default_value_t = 1)]
        min_strength: usize,

        /// Keep at most this many nodes, strongest first
        #[arg(long)]
        max_nodes: Option<usize>,

        /// Output file (default: network_<mode>.json next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Metadata source for node labels
        #[arg(long, default_value = "openalex", value_parser = ["openalex", "semantic_scholar"])]
        api: String,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Run { output, .. } => {
            rustcocite::output::prepare_output_dir(output)?;
            let path = output.join(LOG_FILE);
            Some(File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?)
        }
        Commands::Network { .. } => None,
    };
    init_logging(cli.debug, cli.log_json, log_file);

    let config = Config {
        call_timeout: Duration::from_secs(cli.timeout),
        max_concurrency: cli.concurrency,
        ..Config::default()
    }
    .with_openalex_email(cli.email.as_deref())
    .with_semantic_scholar_key(cli.s2_key);

    match cli.command {
        Commands::Run {
            dois,
            input,
            n,
            m,
            base_only,
            api,
            output,
            network,
            min_strength,
            max_nodes,
        } => {
            let network = network
                .map(|mode| -> Result<NetworkOptions> {
                    Ok(NetworkOptions {
                        mode: mode.parse()?,
                        min_strength,
                        max_nodes,
                    })
                })
                .transpose()?;
            let options = RunOptions {
                n,
                m,
                base_only,
                output_dir: output,
                network,
            };
            let config = Config {
                api_mode: api.parse()?,
                ..config
            };
            run_expansion(config, dois, input, options).await
        }
        Commands::Network {
            input,
            mode,
            min_strength,
            max_nodes,
            output,
            api,
        } => {
            let options = NetworkOptions {
                mode: mode.parse::<NetworkMode>()?,
                min_strength,
                max_nodes,
            };
            let config = Config {
                api_mode: api.parse()?,
                ..config
            };
            run_network(config, input, output, options).await
        }
    }
}

/// Console layer on stderr, plus a plain-text copy in `cli.log` for runs
fn init_logging(debug: bool, json: bool, log_file: Option<File>) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let plain_layer = (!json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_writer(std::io::stderr)
    });
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer)
        .init();
}

// ============================================================================
// Run Command
// ============================================================================

async fn run_expansion(
    config: Config,
    dois: Vec<String>,
    input: Option<PathBuf>,
    options: RunOptions,
) -> Result<()> {
    config.validate()?;

    let mut raw = dois;
    if let Some(path) = &input {
        raw.extend(read_seed_file(path)?);
    }
    let (seeds, rejected) = parse_seeds(&raw);
    for entry in &rejected {
        warn!(input = %entry, "Skipping invalid identifier");
    }

    println!("\n--- Seeds ---");
    println!(
        "{} valid seed(s), {} skipped, source: {}",
        seeds.len(),
        rejected.len(),
        config.api_mode
    );
    println!("Output folder: {}", options.output_dir.display());

    let sources = source::build_sources(&config)?;
    let report = pipeline::run(&config, sources, &seeds, &options).await?;

    println!("\n--- Collection ---");
    let references: usize = report.records.iter().map(|r| r.references_found()).sum();
    let citations: usize = report.records.iter().map(|r| r.citations_found()).sum();
    println!(
        "References: {} | Citations: {} | Seeds with errors: {}",
        references,
        citations,
        report.failed_seeds()
    );

    if !options.base_only {
        println!("\n--- Co-citation ---");
        if let Some(backward) = &report.analysis.backward {
            println!("Backward (N >= {}): {} novel paper(s)", options.n, backward.len());
        }
        if let Some(forward) = &report.analysis.forward {
            println!("Forward (M >= {}): {} novel paper(s)", options.m, forward.len());
        }
    }

    println!("\n--- Files ---");
    for file in &report.files {
        println!("Saved: {}", file.display());
    }
    println!("Log: {}", options.output_dir.join(LOG_FILE).display());

    info!(seeds = report.records.len(), "Run complete");
    Ok(())
}

/// One identifier per line; blank lines and `#` comments are ignored
fn read_seed_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;

    Ok(content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

// ============================================================================
// Network Command
// ============================================================================

async fn run_network(
    config: Config,
    input: PathBuf,
    output: Option<PathBuf>,
    options: NetworkOptions,
) -> Result<()> {
    config.validate()?;
    let sources = source::build_sources(&config)?;
    let label_source = sources
        .first()
        .context("No metadata source configured")?;

    println!("\n--- Network: {} ---", options.mode);
    let (path, network) = pipeline::run_network(
        &config,
        &input,
        output.as_deref(),
        &options,
        label_source.as_ref(),
    )
    .await
    .with_context(|| format!("Failed to build network from {}", input.display()))?;

    println!("Nodes: {} | Edges: {}", network.nodes.len(), network.edges.len());
    println!("Saved: {}", path.display());
    Ok(())
}
