use std::collections::{BTreeMap, HashMap};

use tracker_shared::TelemetryRow;

/// `datetime_unix -> smallest id` with that timestamp, plus the reverse map.
///
/// Only a hint for "jump to time": entries survive cache eviction and are
/// never authoritative. The server lookup is the fallback.
///
/// Unbounded: the index only shrinks on [`DatetimeIndex::clear`], so it grows
/// with every distinct row seen during a session.
#[derive(Debug, Default)]
pub struct DatetimeIndex {
    by_time: BTreeMap<i64, u64>,
    by_id: HashMap<u64, i64>,
}

impl DatetimeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_time.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_time.clear();
        self.by_id.clear();
    }

    pub fn record(&mut self, id: u64, datetime_unix: i64) {
        if id == 0 {
            return;
        }
        match self.by_time.get(&datetime_unix).copied() {
            Some(existing) if existing <= id => {}
            Some(existing) => {
                self.by_id.remove(&existing);
                self.by_time.insert(datetime_unix, id);
                self.by_id.insert(id, datetime_unix);
            }
            None => {
                self.by_time.insert(datetime_unix, id);
                self.by_id.insert(id, datetime_unix);
            }
        }
    }

    /// Rows without a timestamp are skipped.
    pub fn record_rows<'a, I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = &'a TelemetryRow>,
    {
        for row in rows {
            if let Some(datetime_unix) = row.datetime_unix {
                self.record(row.id, datetime_unix);
            }
        }
    }

    pub fn exact(&self, datetime_unix: i64) -> Option<u64> {
        self.by_time.get(&datetime_unix).copied()
    }

    pub fn datetime_of(&self, id: u64) -> Option<i64> {
        self.by_id.get(&id).copied()
    }

    /// Exact hit, else the latest entry at or before `target`, else the entry
    /// nearest to it.
    pub fn find_closest(&self, target: i64) -> Option<u64> {
        if let Some(id) = self.exact(target) {
            return Some(id);
        }
        if let Some((_, id)) = self.by_time.range(..=target).next_back() {
            return Some(*id);
        }
        self.by_time.range(target..).next().map(|(_, id)| *id)
    }

    /// Picks the scroll target after a server lookup whose `rows` were already
    /// recorded: an exact index hit, else the returned row closest to `target`
    /// without passing it, else `server_target`.
    pub fn best_target(&self, target: i64, server_target: u64, rows: &[TelemetryRow]) -> u64 {
        if let Some(id) = self.exact(target) {
            return id;
        }

        let mut best: Option<(i64, u64)> = self
            .datetime_of(server_target)
            .map(|dt| target - dt)
            .filter(|diff| *diff >= 0)
            .map(|diff| (diff, server_target));

        for row in rows {
            let Some(datetime_unix) = row.datetime_unix else {
                continue;
            };
            if row.id == 0 {
                continue;
            }
            let diff = target - datetime_unix;
            if diff >= 0 && best.is_none_or(|(best_diff, _)| diff < best_diff) {
                best = Some((diff, row.id));
            }
        }

        best.map_or(server_target, |(_, id)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped(id: u64, datetime_unix: i64) -> TelemetryRow {
        let mut row: TelemetryRow =
            serde_json::from_value(serde_json::json!({ "id": id })).expect("row");
        row.datetime_unix = Some(datetime_unix);
        row
    }

    #[test]
    fn keeps_smallest_id_per_timestamp() {
        let mut index = DatetimeIndex::new();
        index.record(12, 500);
        index.record(10, 500);
        index.record(11, 500);
        assert_eq!(index.exact(500), Some(10));
        assert_eq!(index.datetime_of(10), Some(500));
        assert_eq!(index.datetime_of(12), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn closest_prefers_earlier_entries() {
        let mut index = DatetimeIndex::new();
        index.record_rows(&[stamped(42, 1_756_281_900), stamped(60, 1_756_282_000)]);

        assert_eq!(index.find_closest(1_756_281_900), Some(42));
        assert_eq!(index.find_closest(1_756_281_949), Some(42));
        assert_eq!(index.find_closest(1_756_281_999), Some(42));
        assert_eq!(index.find_closest(1_756_282_500), Some(60));
        // nothing at or before: nearest above
        assert_eq!(index.find_closest(1_756_000_000), Some(42));
        assert_eq!(DatetimeIndex::new().find_closest(1), None);
    }

    #[test]
    fn best_target_after_lookup() {
        let mut index = DatetimeIndex::new();
        let rows = vec![stamped(300, 1_000), stamped(301, 1_010), stamped(302, 1_020)];
        index.record_rows(&rows);

        assert_eq!(index.best_target(1_010, 999, &rows), 301);
        assert_eq!(index.best_target(1_015, 300, &rows), 301);
        // every returned row is after the target
        assert_eq!(index.best_target(900, 300, &rows), 300);
        assert_eq!(index.best_target(900, 77, &[]), 77);
    }
}
