//! # rustcocite
//!
//! Co-citation expansion of a seed set of papers over OpenAlex and Semantic
//! Scholar.
//!
//! ## Modules
//!
//! - [`identifier`] - DOI / MAG identifier normalization
//! - [`source`] - Source adapter trait and shared HTTP plumbing
//! - [`openalex`] - OpenAlex adapter
//! - [`semanticscholar`] - Semantic Scholar adapter
//! - [`aggregator`] - Composite aggregation across adapters
//! - [`analyzer`] - Backward / forward co-citation thresholds
//! - [`network`] - Bibliographic coupling and co-citation networks
//! - [`output`] - CSV and JSON artifacts
//! - [`pipeline`] - End-to-end runs
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustcocite::{config::Config, identifier::parse_seeds, pipeline, source};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let (seeds, _) = parse_seeds(["10.1038/nature14539", "10.1126/science.1127647"]);
//!     let sources = source::build_sources(&config)?;
//!     let report = pipeline::run(&config, sources, &seeds, &Default::default()).await?;
//!     println!("Processed {} seeds", report.records.len());
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod analyzer;
pub mod config;
pub mod error;
pub mod identifier;
pub mod network;
pub mod openalex;
pub mod output;
pub mod pipeline;
pub mod record;
pub mod semanticscholar;
pub mod source;

pub use error::{CociteError, ErrorKind, Result};
pub use identifier::Identifier;
