//! Per-seed records and the detailed JSON document.
//!
//! A [`SeedRecord`] is produced by the aggregator for every seed and is not
//! modified afterwards. The [`DetailedDocument`] is the one schema used to
//! persist and reload records (`detailed_references_citations.json`).

use crate::error::ErrorKind;
use crate::identifier::Identifier;
use crate::source::Direction;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

/// Aggregated lookup results for one seed
#[derive(Debug, Clone, PartialEq)]
pub struct SeedRecord {
    pub id: Identifier,
    /// Sorted, deduplicated; `None` when not requested or every source failed
    pub references: Option<Vec<Identifier>>,
    pub citations: Option<Vec<Identifier>>,
    /// Adapters that answered without error for at least one direction
    pub source_tags: BTreeSet<String>,
    pub fetch_error: Option<ErrorKind>,
    pub timestamp: DateTime<Utc>,
    pub reference_stats: Option<MergeStats>,
    pub citation_stats: Option<MergeStats>,
}

impl SeedRecord {
    pub fn new(id: Identifier) -> Self {
        Self {
            id,
            references: None,
            citations: None,
            source_tags: BTreeSet::new(),
            fetch_error: None,
            timestamp: Utc::now(),
            reference_stats: None,
            citation_stats: None,
        }
    }

    pub fn list(&self, direction: Direction) -> Option<&[Identifier]> {
        match direction {
            Direction::Backward => self.references.as_deref(),
            Direction::Forward => self.citations.as_deref(),
        }
    }

    pub fn references_found(&self) -> usize {
        self.references.as_ref().map_or(0, Vec::len)
    }

    pub fn citations_found(&self) -> usize {
        self.citations.as_ref().map_or(0, Vec::len)
    }

    /// RFC 3339 retrieval time, UTC
    pub fn retrieval_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Overlap between adapters that answered for one seed/direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Distinct identifiers returned per adapter
    pub per_source: BTreeMap<String, usize>,
    /// Identifiers only that adapter returned
    pub unique_per_source: BTreeMap<String, usize>,
    /// Identifiers every answering adapter returned
    pub overlap: usize,
    pub total_unique: usize,
    /// `overlap / total_unique`, 0 for an empty union
    pub jaccard: f64,
}

impl MergeStats {
    /// Compute statistics over the per-adapter sets.
    pub fn compute(sets: &BTreeMap<String, BTreeSet<Identifier>>) -> Self {
        let union: BTreeSet<&Identifier> = sets.values().flatten().collect();

        let overlap = union
            .iter()
            .filter(|id| sets.values().all(|s| s.contains(**id)))
            .count();

        let unique_per_source = sets
            .iter()
            .map(|(tag, set)| {
                let unique = set
                    .iter()
                    .filter(|id| {
                        sets.iter()
                            .filter(|(other, _)| *other != tag)
                            .all(|(_, s)| !s.contains(*id))
                    })
                    .count();
                (tag.clone(), unique)
            })
            .collect();

        let total_unique = union.len();
        let jaccard = if total_unique == 0 {
            0.0
        } else {
            overlap as f64 / total_unique as f64
        };

        Self {
            per_source: sets.iter().map(|(t, s)| (t.clone(), s.len())).collect(),
            unique_per_source,
            overlap,
            total_unique,
            jaccard,
        }
    }
}

/// Where a seed's data came from, written only for multi-source runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub sources: Vec<String>,
    #[serde(default)]
    pub fetch_error: Option<ErrorKind>,
    pub retrieval_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<MergeStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<MergeStats>,
}

/// One seed in the detailed JSON document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedEntry {
    #[serde(default)]
    pub references: Option<Vec<Identifier>>,
    #[serde(default)]
    pub citations: Option<Vec<Identifier>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl DetailedEntry {
    pub fn list(&self, direction: Direction) -> Option<&[Identifier]> {
        match direction {
            Direction::Backward => self.references.as_deref(),
            Direction::Forward => self.citations.as_deref(),
        }
    }

    /// Union another entry for the same seed into this one
    pub fn merge(&mut self, other: DetailedEntry) {
        self.references = union_lists(self.references.take(), other.references);
        self.citations = union_lists(self.citations.take(), other.citations);
        if self.provenance.is_none() {
            self.provenance = other.provenance;
        }
    }
}

fn union_lists(a: Option<Vec<Identifier>>, b: Option<Vec<Identifier>>) -> Option<Vec<Identifier>> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let merged: BTreeSet<Identifier> = a.into_iter().chain(b).collect();
            Some(merged.into_iter().collect())
        }
        (a, b) => a.or(b),
    }
}

/// Seed identifier -> references/citations, keys sorted
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DetailedDocument {
    pub entries: BTreeMap<Identifier, DetailedEntry>,
}

impl DetailedDocument {
    /// Convert aggregated records; provenance is attached when `with_provenance`.
    pub fn from_records(records: &[SeedRecord], with_provenance: bool) -> Self {
        let entries = records
            .iter()
            .map(|r| {
                let provenance = with_provenance.then(|| Provenance {
                    sources: r.source_tags.iter().cloned().collect(),
                    fetch_error: r.fetch_error,
                    retrieval_timestamp: r.retrieval_timestamp(),
                    references: r.reference_stats.clone(),
                    citations: r.citation_stats.clone(),
                });
                let entry = DetailedEntry {
                    references: r.references.clone(),
                    citations: r.citations.clone(),
                    provenance,
                };
                (r.id.clone(), entry)
            })
            .collect();

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Keys are normalized while loading, so distinct raw keys may collide.
impl<'de> Deserialize<'de> for DetailedDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = DetailedDocument;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of seed identifiers to reference/citation entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries: BTreeMap<Identifier, DetailedEntry> = BTreeMap::new();
                while let Some((id, entry)) = map.next_entry::<Identifier, DetailedEntry>()? {
                    match entries.entry(id) {
                        Entry::Vacant(slot) => {
                            slot.insert(entry);
                        }
                        Entry::Occupied(mut slot) => {
                            warn!(seed = %slot.key(), "Duplicate seed after normalization, merging entries");
                            slot.get_mut().merge(entry);
                        }
                    }
                }
                Ok(DetailedDocument { entries })
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}
