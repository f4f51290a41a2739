//! Composite aggregation.
//!
//! Queries every active source adapter for each seed and requested direction,
//! unions the returned identifiers and records which adapters contributed.
//! Seeds are fetched concurrently on a bounded pool; results come back in
//! input order regardless of completion order. No thresholding happens here.

use crate::config::Config;
use crate::error::{CociteError, ErrorKind, FetchResult, Result};
use crate::identifier::Identifier;
use crate::record::{MergeStats, SeedRecord};
use crate::source::{Direction, SourceAdapter};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which directions to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPlan {
    pub references: bool,
    pub citations: bool,
}

impl FetchPlan {
    /// References are needed when `n > 0`, citations when `m > 0`; base-only
    /// collection fetches both.
    pub fn for_thresholds(n: usize, m: usize, base_only: bool) -> Self {
        Self {
            references: base_only || n > 0,
            citations: base_only || m > 0,
        }
    }

    /// Also fetch `direction`, e.g. the side a network is built from
    pub fn include(&mut self, direction: Direction) {
        match direction {
            Direction::Backward => self.references = true,
            Direction::Forward => self.citations = true,
        }
    }

    fn directions(&self) -> Vec<Direction> {
        let mut dirs = Vec::with_capacity(2);
        if self.references {
            dirs.push(Direction::Backward);
        }
        if self.citations {
            dirs.push(Direction::Forward);
        }
        dirs
    }
}

/// Merged result of one seed/direction across adapters
#[derive(Debug, Clone, PartialEq)]
pub struct MergedLookup {
    /// `None` when every adapter failed
    pub ids: Option<Vec<Identifier>>,
    /// Tags of adapters that answered without error
    pub contributors: Vec<String>,
    pub error: Option<ErrorKind>,
    /// Present when two or more adapters answered
    pub stats: Option<MergeStats>,
}

/// Merge per-adapter outcomes into one list.
///
/// The union is order-independent: permuting `outcomes` yields the same ids,
/// contributors and stats.
pub fn merge_lookups(outcomes: Vec<(String, FetchResult<Vec<Identifier>>)>) -> MergedLookup {
    let mut sets: BTreeMap<String, BTreeSet<Identifier>> = BTreeMap::new();
    let mut error: Option<ErrorKind> = None;

    for (tag, outcome) in outcomes {
        match outcome {
            Ok(ids) => {
                sets.entry(tag).or_default().extend(ids);
            }
            Err(kind) => {
                error = Some(match error {
                    Some(prev) => prev.combine(kind),
                    None => kind,
                });
            }
        }
    }

    if sets.is_empty() {
        return MergedLookup {
            ids: None,
            contributors: Vec::new(),
            error,
            stats: None,
        };
    }

    let stats = (sets.len() >= 2).then(|| MergeStats::compute(&sets));
    let union: BTreeSet<Identifier> = sets.values().flatten().cloned().collect();

    MergedLookup {
        ids: Some(union.into_iter().collect()),
        contributors: sets.into_keys().collect(),
        error: None,
        stats,
    }
}

/// Fans seed lookups out over a set of source adapters
pub struct Aggregator {
    sources: Vec<Arc<dyn SourceAdapter>>,
    call_timeout: Duration,
    max_concurrency: usize,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn SourceAdapter>>, config: &Config) -> Result<Self> {
        if sources.is_empty() {
            return Err(CociteError::Config("at least one source adapter is required".into()));
        }
        Ok(Self {
            sources,
            call_timeout: config.call_timeout,
            max_concurrency: config.max_concurrency.max(1),
        })
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// First configured adapter, used for metadata lookups
    pub fn primary_source(&self) -> Option<&Arc<dyn SourceAdapter>> {
        self.sources.first()
    }

    /// Produce one [`SeedRecord`] per seed, in input order.
    ///
    /// Per-seed failures are recorded on the record; only an empty seed list
    /// is an error.
    pub async fn aggregate(&self, seeds: &[Identifier], plan: FetchPlan) -> Result<Vec<SeedRecord>> {
        if seeds.is_empty() {
            return Err(CociteError::NoSeeds);
        }

        let total = seeds.len();
        info!(
            seeds = total,
            sources = self.sources.len(),
            references = plan.references,
            citations = plan.citations,
            "Starting aggregation"
        );

        let mut results: Vec<(usize, SeedRecord)> = stream::iter(seeds.iter().enumerate())
            .map(|(idx, seed)| async move {
                info!(seed = %seed, "Processing ({}/{})", idx + 1, total);
                (idx, self.collect_seed(seed, plan).await)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        results.sort_by_key(|(idx, _)| *idx);
        let records: Vec<SeedRecord> = results.into_iter().map(|(_, r)| r).collect();

        let failed = records.iter().filter(|r| r.fetch_error.is_some()).count();
        info!(seeds = total, failed = failed, "Aggregation complete");
        Ok(records)
    }

    async fn collect_seed(&self, seed: &Identifier, plan: FetchPlan) -> SeedRecord {
        let mut record = SeedRecord::new(seed.clone());

        for direction in plan.directions() {
            let merged = self.collect_direction(seed, direction).await;

            record.source_tags.extend(merged.contributors.iter().cloned());
            if let Some(kind) = merged.error {
                warn!(
                    seed = %seed,
                    direction = %direction,
                    error = %kind,
                    "All sources failed, {} unavailable",
                    direction.noun()
                );
                record.fetch_error = Some(match record.fetch_error {
                    Some(prev) => prev.combine(kind),
                    None => kind,
                });
            }
            if let Some(stats) = &merged.stats {
                info!(
                    seed = %seed,
                    direction = %direction,
                    per_source = ?stats.per_source,
                    overlap = stats.overlap,
                    total_unique = stats.total_unique,
                    jaccard = stats.jaccard,
                    "Merged {}",
                    direction.noun()
                );
            }

            match direction {
                Direction::Backward => {
                    record.references = merged.ids;
                    record.reference_stats = merged.stats;
                }
                Direction::Forward => {
                    record.citations = merged.ids;
                    record.citation_stats = merged.stats;
                }
            }
        }

        record
    }

    /// Query every adapter for one direction, concurrently
    async fn collect_direction(&self, seed: &Identifier, direction: Direction) -> MergedLookup {
        let calls = self.sources.iter().map(|source| async move {
            let tag = source.tag().to_string();
            let outcome = match tokio::time::timeout(
                self.call_timeout,
                direction.fetch(source.as_ref(), seed),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ErrorKind::Timeout),
            };

            match &outcome {
                Ok(ids) => debug!(
                    source = %tag,
                    seed = %seed,
                    count = ids.len(),
                    "Fetched {}",
                    direction.noun()
                ),
                Err(kind) => warn!(
                    source = %tag,
                    seed = %seed,
                    error = %kind,
                    "Failed to fetch {}",
                    direction.noun()
                ),
            }
            (tag, outcome)
        });

        merge_lookups(join_all(calls).await)
    }
}
