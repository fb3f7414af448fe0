use std::collections::BTreeMap;

use tracker_shared::TelemetryRow;

use super::viewport::RowRange;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub existing: usize,
    pub skipped: usize,
}

/// Sparse id -> row map. Rows are immutable once cached: merges never
/// overwrite, only eviction and `clear` remove.
#[derive(Debug, Default)]
pub struct RowCache {
    rows: BTreeMap<u64, TelemetryRow>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&TelemetryRow> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn min_id(&self) -> Option<u64> {
        self.rows.keys().next().copied()
    }

    pub fn max_id(&self) -> Option<u64> {
        self.rows.keys().next_back().copied()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn merge<'a, I>(&mut self, rows: I) -> MergeStats
    where
        I: IntoIterator<Item = &'a TelemetryRow>,
    {
        let mut stats = MergeStats::default();
        for row in rows {
            if row.id == 0 {
                tracing::warn!(module_id = %row.module_id, "skipping row without id");
                stats.skipped += 1;
                continue;
            }
            if self.rows.contains_key(&row.id) {
                stats.existing += 1;
            } else {
                self.rows.insert(row.id, row.clone());
                stats.inserted += 1;
            }
        }
        stats
    }

    pub fn count_in(&self, range: RowRange) -> usize {
        if range.is_empty() {
            return 0;
        }
        self.rows.range(range.start..=range.end).count()
    }

    pub fn missing_in(&self, range: RowRange) -> Vec<u64> {
        range.ids().filter(|id| !self.rows.contains_key(id)).collect()
    }

    /// True when `id` is cached and at least half of the `id ± buffer` window
    /// (clamped to `1..=total`) is cached.
    pub fn is_available_around(&self, id: u64, buffer: u64, total: u64) -> bool {
        if id == 0 || !self.contains(id) {
            return false;
        }
        let window = RowRange::new(id, id).expand(buffer, total.max(id));
        let available = self.count_in(window) as u64;
        available * 2 >= window.len()
    }

    /// Removes up to `max` ids outside `keep`, farthest from it first.
    /// Returns the evicted ids.
    pub fn evict_outside(&mut self, keep: RowRange, max: usize) -> Vec<u64> {
        let distance = |id: u64| {
            if id < keep.start {
                keep.start - id
            } else {
                id.saturating_sub(keep.end)
            }
        };

        let mut candidates: Vec<u64> = self
            .rows
            .keys()
            .copied()
            .filter(|&id| !keep.contains(id))
            .collect();
        candidates.sort_by_key(|&id| std::cmp::Reverse(distance(id)));
        candidates.truncate(max);

        for id in &candidates {
            self.rows.remove(id);
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn row(id: u64) -> TelemetryRow {
        TelemetryRow {
            id,
            module_id: "1A".into(),
            module_name: None,
            datetime_unix: Some(1_700_000_000 + id as i64),
            lat: None,
            lon: None,
            alt: None,
            rssi: None,
            snr: None,
            source: None,
            jumps: None,
        }
    }

    #[test]
    fn merge_never_overwrites() {
        let mut cache = RowCache::new();
        let mut first = row(5);
        first.rssi = Some(-70);
        cache.merge([&first]);

        let mut second = row(5);
        second.rssi = Some(-10);
        let stats = cache.merge([&second, &row(6), &row(0)]);

        assert_eq!(
            stats,
            MergeStats {
                inserted: 1,
                existing: 1,
                skipped: 1
            }
        );
        assert_eq!(cache.get(5).and_then(|r| r.rssi), Some(-70));
        assert_eq!((cache.min_id(), cache.max_id()), (Some(5), Some(6)));
    }

    #[test]
    fn availability_needs_the_id_and_half_the_window() {
        let mut cache = RowCache::new();
        let rows: Vec<_> = (10..=20).map(row).collect();
        cache.merge(&rows);

        // 10..=30 holds 11 of 21 ids
        assert!(cache.is_available_around(20, 10, 100));
        assert!(cache.is_available_around(15, 10, 100));
        assert!(!cache.is_available_around(21, 10, 100));

        let mut sparse = RowCache::new();
        let rows: Vec<_> = (18..=22).map(row).collect();
        sparse.merge(&rows);
        assert!(!sparse.is_available_around(20, 10, 100));
        // clamped to 10..=25: 5 of 16 ids
        assert!(!sparse.is_available_around(20, 10, 25));
        // clamped to 15..=22: 5 of 8 ids
        assert!(sparse.is_available_around(20, 5, 22));
    }

    #[test]
    fn eviction_is_farthest_first_and_capped() {
        let mut cache = RowCache::new();
        let rows: Vec<_> = (1..=30).map(row).collect();
        cache.merge(&rows);

        let evicted = cache.evict_outside(RowRange::new(11, 20), 5);
        assert_eq!(evicted.len(), 5);
        assert!(evicted.contains(&1) && evicted.contains(&30));
        assert!((11..=20).all(|id| cache.contains(id)));
        assert_eq!(cache.len(), 25);

        let evicted = cache.evict_outside(RowRange::new(11, 20), 100);
        assert_eq!(evicted.len(), 15);
        assert_eq!(cache.len(), 10);
        assert_eq!(cache.missing_in(RowRange::new(9, 12)), vec![9, 10]);
    }
}
