//! Co-citation analysis.
//!
//! Backward: a paper referenced by at least N seeds. Forward: a paper citing
//! at least M seeds. A seed never discovers itself, and seeds whose list is
//! unavailable contribute nothing to that direction.

use crate::identifier::Identifier;
use crate::record::SeedRecord;
use crate::source::Direction;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// A novel paper that met the threshold in one direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoCitationResult {
    pub novel_id: Identifier,
    pub direction: Direction,
    /// Seeds that reference it (backward) or that it cites (forward)
    pub linking_seed_ids: BTreeSet<Identifier>,
}

impl CoCitationResult {
    pub fn count(&self) -> usize {
        self.linking_seed_ids.len()
    }
}

/// Results of both directions; `None` means the direction was skipped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    pub backward: Option<Vec<CoCitationResult>>,
    pub forward: Option<Vec<CoCitationResult>>,
}

/// Run backward (threshold `n`) and forward (threshold `m`) analysis.
///
/// A zero threshold skips its direction entirely.
pub fn analyze(records: &[SeedRecord], n: usize, m: usize) -> Analysis {
    Analysis {
        backward: (n > 0).then(|| analyze_direction(records, Direction::Backward, n)),
        forward: (m > 0).then(|| analyze_direction(records, Direction::Forward, m)),
    }
}

/// Frequency-threshold one direction, sorted by novel identifier.
pub fn analyze_direction(
    records: &[SeedRecord],
    direction: Direction,
    threshold: usize,
) -> Vec<CoCitationResult> {
    info!(direction = %direction, threshold = threshold, "Calculating co-citation results");

    let seeds: HashSet<&Identifier> = records.iter().map(|r| &r.id).collect();
    let mut linked: BTreeMap<&Identifier, BTreeSet<Identifier>> = BTreeMap::new();

    for record in records {
        let Some(list) = record.list(direction) else {
            debug!(seed = %record.id, direction = %direction, "No data, skipping seed");
            continue;
        };
        for other in list.iter().filter(|id| !seeds.contains(id)) {
            linked.entry(other).or_default().insert(record.id.clone());
        }
    }

    let results: Vec<CoCitationResult> = linked
        .into_iter()
        .filter(|(_, linking)| linking.len() >= threshold)
        .map(|(novel, linking)| CoCitationResult {
            novel_id: novel.clone(),
            direction,
            linking_seed_ids: linking,
        })
        .collect();

    info!(
        direction = %direction,
        threshold = threshold,
        novel = results.len(),
        "Co-citation analysis complete"
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixture::{id, ids};

    fn record(seed: &str, refs: Option<&[&str]>, cites: Option<&[&str]>) -> SeedRecord {
        let mut r = SeedRecord::new(id(seed));
        r.references = refs.map(ids);
        r.citations = cites.map(ids);
        r
    }

    #[test]
    fn test_backward_threshold_three_seeds() {
        let records = vec![
            record("10.1/a", Some(&["10.9/x", "10.9/y"]), None),
            record("10.1/b", Some(&["10.9/x", "10.9/z"]), None),
            record("10.1/c", Some(&["10.9/x"]), None),
        ];

        let results = analyze_direction(&records, Direction::Backward, 2);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].novel_id, id("10.9/x"));
        assert_eq!(results[0].count(), 3);
        assert_eq!(
            results[0].linking_seed_ids,
            ids(&["10.1/a", "10.1/b", "10.1/c"]).into_iter().collect()
        );
    }

    #[test]
    fn test_every_result_meets_threshold() {
        let records = vec![
            record("10.1/a", Some(&["10.9/x", "10.9/y", "10.9/w"]), None),
            record("10.1/b", Some(&["10.9/x", "10.9/y"]), None),
            record("10.1/c", Some(&["10.9/x", "10.9/w"]), None),
            record("10.1/d", Some(&["10.9/x"]), None),
        ];
        for threshold in 1..=4 {
            let results = analyze_direction(&records, Direction::Backward, threshold);
            assert!(results.iter().all(|r| r.count() >= threshold));
        }
        assert_eq!(analyze_direction(&records, Direction::Backward, 4).len(), 1);
        assert_eq!(analyze_direction(&records, Direction::Backward, 5).len(), 0);
    }

    #[test]
    fn test_seed_cannot_discover_itself() {
        let records = vec![
            record("10.1/a", Some(&["10.1/b", "10.9/x"]), None),
            record("10.1/b", Some(&["10.9/x"]), None),
            record("10.1/c", Some(&["10.1/b"]), None),
        ];
        let results = analyze_direction(&records, Direction::Backward, 2);
        let novel: Vec<&str> = results.iter().map(|r| r.novel_id.as_str()).collect();
        assert_eq!(novel, vec!["10.9/x"]);
    }

    #[test]
    fn test_null_list_contributes_nothing() {
        let records = vec![
            record("10.1/a", Some(&["10.9/x"]), None),
            record("10.1/b", None, None),
        ];
        let results = analyze_direction(&records, Direction::Backward, 1);
        assert_eq!(results[0].linking_seed_ids.len(), 1);
    }

    #[test]
    fn test_forward_uses_citations() {
        let records = vec![
            record("10.1/a", None, Some(&["10.9/p", "10.9/q"])),
            record("10.1/b", None, Some(&["10.9/p"])),
        ];
        let analysis = analyze(&records, 0, 2);
        assert!(analysis.backward.is_none());
        let forward = analysis.forward.unwrap();
        assert_eq!(forward.len(), 1);
        assert_eq!(forward[0].novel_id, id("10.9/p"));
        assert_eq!(forward[0].direction, Direction::Forward);
    }
}
