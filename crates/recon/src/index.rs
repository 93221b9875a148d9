use std::collections::HashMap;

use concord_core::{MatchKey, ReferenceRecord};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub eligible_records: usize,
    pub excluded_incomplete: usize,
    pub keys: usize,
    pub single_candidate_keys: usize,
    pub collision_keys: usize,
}

/// Read-only lookup from match key to every completed reference record carrying it.
///
/// Records sharing a key are all kept, in input order.
#[derive(Debug)]
pub struct ReferenceIndex<'a> {
    by_key: HashMap<&'a MatchKey, Vec<&'a ReferenceRecord>>,
    stats: IndexStats,
}

impl<'a> ReferenceIndex<'a> {
    pub fn build(records: &'a [ReferenceRecord]) -> Self {
        let mut by_key: HashMap<&'a MatchKey, Vec<&'a ReferenceRecord>> = HashMap::new();
        let mut stats = IndexStats::default();

        for record in records {
            if !record.completed {
                stats.excluded_incomplete += 1;
                continue;
            }
            stats.eligible_records += 1;
            by_key.entry(&record.match_key).or_default().push(record);
        }

        stats.keys = by_key.len();
        stats.single_candidate_keys = by_key.values().filter(|v| v.len() == 1).count();
        stats.collision_keys = by_key.values().filter(|v| v.len() > 1).count();

        Self { by_key, stats }
    }

    pub fn candidates_for(&self, key: &MatchKey) -> Vec<&'a ReferenceRecord> {
        self.by_key.get(key).cloned().unwrap_or_default()
    }

    pub fn stats(&self) -> IndexStats {
        self.stats
    }

    /// Keys with more than one eligible record.
    pub fn collisions(&self) -> impl Iterator<Item = (&'a MatchKey, usize)> + '_ {
        self.by_key
            .iter()
            .filter(|(_, v)| v.len() > 1)
            .map(|(k, v)| (*k, v.len()))
    }
}
