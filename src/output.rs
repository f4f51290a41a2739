//! Output artifacts.
//!
//! - `summary.csv`: one row per seed, input order
//! - `backward.csv` / `forward.csv`: one row per (novel paper, linking seed)
//! - `detailed_references_citations.json`: the [`DetailedDocument`]
//! - `network_<mode>.json`: the [`NetworkDocument`]
//!
//! CSV files for an enabled direction are always written with their header,
//! even when no row qualifies.

use crate::analyzer::CoCitationResult;
use crate::error::{CociteError, Result};
use crate::network::NetworkDocument;
use crate::record::{DetailedDocument, SeedRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const SUMMARY_FILE: &str = "summary.csv";
pub const BACKWARD_FILE: &str = "backward.csv";
pub const FORWARD_FILE: &str = "forward.csv";
pub const DETAILED_FILE: &str = "detailed_references_citations.json";
pub const LOG_FILE: &str = "cli.log";

/// CSV column order for summary output
pub const SUMMARY_COLUMNS: &[&str] = &[
    "doi",
    "references_found",
    "citations_found",
    "api",
    "retrieval_timestamp",
    "fetch_error",
];
pub const BACKWARD_COLUMNS: &[&str] = &["novel_doi", "initial_citing_doi"];
pub const FORWARD_COLUMNS: &[&str] = &["novel_doi", "initial_cited_doi"];

/// Row of `summary.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub doi: String,
    pub references_found: usize,
    pub citations_found: usize,
    /// Contributing adapter tags joined with `;`
    pub api: String,
    pub retrieval_timestamp: String,
    /// Empty when every requested direction succeeded
    pub fetch_error: String,
}

impl From<&SeedRecord> for SummaryRow {
    fn from(record: &SeedRecord) -> Self {
        Self {
            doi: record.id.to_string(),
            references_found: record.references_found(),
            citations_found: record.citations_found(),
            api: record
                .source_tags
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(";"),
            retrieval_timestamp: record.retrieval_timestamp(),
            fetch_error: record
                .fetch_error
                .map(|k| k.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Row of `backward.csv`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackwardRow {
    pub novel_doi: String,
    pub initial_citing_doi: String,
}

/// Row of `forward.csv`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRow {
    pub novel_doi: String,
    pub initial_cited_doi: String,
}

/// Expand results into one row per linking seed, sorted by novel id then seed.
pub fn backward_rows(results: &[CoCitationResult]) -> Vec<BackwardRow> {
    expand(results)
        .map(|(novel, seed)| BackwardRow {
            novel_doi: novel,
            initial_citing_doi: seed,
        })
        .collect()
}

pub fn forward_rows(results: &[CoCitationResult]) -> Vec<ForwardRow> {
    expand(results)
        .map(|(novel, seed)| ForwardRow {
            novel_doi: novel,
            initial_cited_doi: seed,
        })
        .collect()
}

fn expand(results: &[CoCitationResult]) -> impl Iterator<Item = (String, String)> + '_ {
    // Results arrive sorted by novel id and linking sets are ordered
    results.iter().flat_map(|r| {
        r.linking_seed_ids
            .iter()
            .map(move |seed| (r.novel_id.to_string(), seed.to_string()))
    })
}

/// Save rows to a CSV file with an explicit header row
pub fn save_csv<T: Serialize>(path: &Path, rows: &[T], columns: &[&str]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    wtr.write_record(columns)?;
    for row in rows {
        wtr.serialize(row)?;
    }

    wtr.flush()?;
    info!(path = %path.display(), rows = rows.len(), "Saved CSV");
    Ok(())
}

pub fn write_summary(path: &Path, records: &[SeedRecord]) -> Result<()> {
    let rows: Vec<SummaryRow> = records.iter().map(SummaryRow::from).collect();
    save_csv(path, &rows, SUMMARY_COLUMNS)
}

/// Pretty-printed JSON
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    info!(path = %path.display(), "Saved JSON");
    Ok(())
}

pub fn write_detailed(path: &Path, document: &DetailedDocument) -> Result<()> {
    write_json(path, document)
}

pub fn write_network(path: &Path, document: &NetworkDocument) -> Result<()> {
    write_json(path, document)
}

/// Load a detailed document written by an earlier run
pub fn read_detailed(path: &Path) -> Result<DetailedDocument> {
    let reader = BufReader::new(File::open(path)?);
    let document: DetailedDocument = serde_json::from_reader(reader)?;
    info!(path = %path.display(), seeds = document.len(), "Loaded detailed document");
    Ok(document)
}

/// Create the output directory and check that it accepts files
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    let to_err = |source: std::io::Error| CociteError::OutputDir {
        path: dir.display().to_string(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(to_err)?;
    let check_file = dir.join(".rustcocite-write-check");
    File::create(&check_file).map_err(to_err)?;
    std::fs::remove_file(&check_file).map_err(to_err)?;
    Ok(())
}
