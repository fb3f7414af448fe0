use tokio::time::Instant;
use tracker_shared::{Direction, PageResponse};

use super::requests::{Rejection, RequestKey};
use super::source::PageQuery;
use super::viewport::RowRange;
use super::{LoadOutcome, VirtualTable};

/// Scans of the visible range load at most one window when no more than this
/// many ids are missing.
const AGGRESSIVE_MISSING_MIN: usize = 5;

/// A reserved fetch window.
#[derive(Debug)]
pub(crate) struct LoadTicket {
    key: RequestKey,
    epoch: u64,
    query: PageQuery,
}

impl VirtualTable {
    pub async fn load_initial_data(&self) -> LoadOutcome {
        let outcome = self.load_data(1, Direction::Down).await;
        self.render_visible_rows(true);
        outcome
    }

    /// Fetches the `limit`-sized window starting at `start_id` and merges it.
    pub async fn load_data(&self, start_id: u64, direction: Direction) -> LoadOutcome {
        match self.reserve(start_id, direction) {
            Ok(ticket) => self.run_load(ticket).await,
            Err(rejection) => {
                tracing::trace!(start_id, %direction, ?rejection, "load skipped");
                LoadOutcome::Skipped(rejection)
            }
        }
    }

    /// Reserves synchronously, then fetches on a tracked task.
    pub(crate) fn spawn_load(&self, start_id: u64, direction: Direction) -> Result<(), Rejection> {
        let ticket = self.reserve(start_id, direction)?;
        let table = self.clone();
        self.spawn_tracked(async move {
            table.run_load(ticket).await;
        });
        Ok(())
    }

    fn reserve(&self, start_id: u64, direction: Direction) -> Result<LoadTicket, Rejection> {
        let options = &self.inner.options;
        let key = RequestKey::new(start_id, direction);
        let (ticket, first) = {
            let mut st = self.lock();
            if st.destroyed {
                return Err(Rejection::Destroyed);
            }
            let now = Instant::now();
            st.ledger
                .check(key, now, options.timings.load_coalesce())?;

            // boundaries are fixed ids; eviction does not move them
            let past_boundary = match direction {
                Direction::Down => st.exhausted_down_from.is_some_and(|from| start_id >= from),
                Direction::Up => st.exhausted_up_from.is_some_and(|from| start_id <= from),
            };
            if past_boundary {
                return Err(Rejection::Exhausted);
            }

            st.ledger.reserve(key, now);
            let query = PageQuery::window(
                st.session.session_id(),
                st.session.module_ids(),
                start_id,
                options.limit,
                direction,
            );
            let ticket = LoadTicket {
                key,
                epoch: st.epoch,
                query,
            };
            (ticket, st.ledger.in_flight() == 1)
        };

        tracing::debug!(key = %ticket.key, offset = ticket.query.offset, "loading rows");
        if first {
            self.inner.sink.loading_changed(true);
        }
        Ok(ticket)
    }

    async fn run_load(&self, ticket: LoadTicket) -> LoadOutcome {
        match self.inner.source.fetch_page(ticket.query.clone()).await {
            Ok(page) => self.process_loaded_data(ticket, page),
            Err(e) => {
                tracing::warn!(key = %ticket.key, error = %e, "failed to load rows");
                self.finish_failed(ticket)
            }
        }
    }

    fn finish_failed(&self, ticket: LoadTicket) -> LoadOutcome {
        let loading = {
            let mut st = self.lock();
            if st.epoch != ticket.epoch {
                return LoadOutcome::Stale;
            }
            st.ledger.fail(ticket.key);
            st.ledger.is_loading()
        };
        if !loading {
            self.inner.sink.loading_changed(false);
        }
        LoadOutcome::Failed
    }

    fn process_loaded_data(&self, ticket: LoadTicket, page: PageResponse) -> LoadOutcome {
        let direction = ticket.key.direction;
        let (outcome, loading) = {
            let mut st = self.lock();
            if st.epoch != ticket.epoch {
                tracing::debug!(key = %ticket.key, "dropping response from a previous session");
                return LoadOutcome::Stale;
            }
            st.ledger.resolve(ticket.key);

            if let Some(total) = page.total_count.filter(|total| *total > 0) {
                st.total_count = total;
                st.total_visible_count = page.total_visible_count.unwrap_or(total);
            }

            let outcome = if page.data.is_empty() {
                match direction {
                    Direction::Down => {
                        let from = ticket.key.start_id;
                        st.exhausted_down_from =
                            Some(st.exhausted_down_from.map_or(from, |f| f.min(from)));
                        st.has_more_down = false;
                    }
                    Direction::Up => {
                        let from = ticket.key.start_id;
                        st.exhausted_up_from =
                            Some(st.exhausted_up_from.map_or(from, |f| f.max(from)));
                        st.has_more_up = false;
                    }
                }
                tracing::info!(%direction, start_id = ticket.key.start_id, "no more rows");
                LoadOutcome::Exhausted
            } else {
                if let Some(more) = page.has_more {
                    match direction {
                        Direction::Down => {
                            st.has_more_down = more && st.exhausted_down_from.is_none()
                        }
                        Direction::Up => st.has_more_up = more && st.exhausted_up_from.is_none(),
                    }
                }
                st.index.record_rows(&page.data);
                let merged = st.cache.merge(&page.data);
                tracing::debug!(
                    key = %ticket.key,
                    inserted = merged.inserted,
                    existing = merged.existing,
                    cached = st.cache.len(),
                    "rows merged"
                );
                LoadOutcome::Loaded {
                    inserted: merged.inserted,
                    existing: merged.existing,
                }
            };
            (outcome, st.ledger.is_loading())
        };

        if !loading {
            self.inner.sink.loading_changed(false);
        }

        if let LoadOutcome::Loaded { inserted, .. } = outcome {
            if inserted > 0 {
                self.render_visible_rows(true);
            } else {
                self.publish_stats();
            }
            self.schedule_follow_up();
        } else {
            self.publish_stats();
        }
        outcome
    }

    fn schedule_follow_up(&self) {
        let table = self.clone();
        let delay = self.inner.options.timings.follow_up_check();
        self.lock().timers.follow_up.schedule(delay, async move {
            if !table.is_loading() {
                table.check_for_more_data();
            }
        });
    }

    /// Boundary prefetch around the visible range, then eviction.
    pub fn check_for_more_data(&self) {
        let options = &self.inner.options;
        let preload = options.preload_threshold as i128;
        let rh = self.row_height();

        let (loads, over_threshold) = {
            let st = self.lock();
            let mut loads = Vec::new();
            let visible = st.visible(rh).filter(|_| !st.ledger.is_loading());
            if let Some(visible) = visible {
                match (st.cache.min_id(), st.cache.max_id()) {
                    (Some(min), Some(max)) => {
                        if st.has_more_down && (max as i128 - visible.end as i128) < preload {
                            let next = max + 1;
                            if next <= st.total_visible_count && !st.ledger.is_requested(next) {
                                loads.push((next, Direction::Down));
                            }
                        }
                        if st.has_more_up && (visible.start as i128 - min as i128) < preload {
                            let next = min.saturating_sub(options.limit).max(1);
                            if next < min && !st.ledger.is_requested(next) {
                                loads.push((next, Direction::Up));
                            }
                        }
                    }
                    _ => {
                        if st.has_more_down && !st.ledger.is_requested(visible.start) {
                            loads.push((visible.start, Direction::Down));
                        }
                    }
                }
            }
            (loads, st.cache.len() > options.cleanup_threshold)
        };

        for (start_id, direction) in loads {
            if let Err(rejection) = self.spawn_load(start_id, direction) {
                tracing::trace!(start_id, %direction, ?rejection, "prefetch skipped");
            }
        }
        if over_threshold {
            self.cleanup_old_data();
        }
    }

    /// Evicts rows far from the viewport, farthest first, up to
    /// `max_removed_per_cleanup` per pass. Returns the number evicted.
    pub fn cleanup_old_data(&self) -> usize {
        let options = &self.inner.options;
        let rh = self.row_height();
        let evicted = {
            let mut st = self.lock();
            if st.cache.len() <= options.cleanup_threshold {
                return 0;
            }
            let Some(visible) = st.visible(rh) else {
                return 0;
            };
            let keep_buffer = (options.cleanup_threshold / 2) as u64;
            let keep = visible.expand(keep_buffer, st.total_visible_count);
            let evicted = st.cache.evict_outside(keep, options.max_removed_per_cleanup);
            st.ledger.release_ids(&evicted);
            tracing::debug!(
                evicted = evicted.len(),
                keep_start = keep.start,
                keep_end = keep.end,
                cached = st.cache.len(),
                "evicted rows"
            );
            evicted.len()
        };
        self.publish_stats();
        evicted
    }

    /// Debounced full re-render and scan after a jump scroll.
    pub fn force_check_data(&self) {
        let table = self.clone();
        let delay = self.inner.options.timings.jump_check();
        self.lock().timers.jump_check.schedule(delay, async move {
            table.render_visible_rows(true);
            table.aggressive_data_check();
        });
    }

    /// Loads one window at the first missing visible id when more than a
    /// handful are missing, then checks the loaded boundaries.
    pub fn aggressive_data_check(&self) {
        let rh = self.row_height();
        let (load, visible) = {
            let st = self.lock();
            let Some(visible) = st.visible(rh) else {
                return;
            };
            let missing: Vec<u64> = visible
                .ids()
                .filter(|id| !st.cache.contains(*id) && !st.ledger.is_requested(*id))
                .collect();
            let load = (missing.len() > AGGRESSIVE_MISSING_MIN)
                .then(|| missing.first().copied())
                .flatten()
                .map(|first| {
                    let below = st.cache.min_id().is_some_and(|min| first < min);
                    (first, if below { Direction::Up } else { Direction::Down })
                });
            (load, visible)
        };

        if let Some((start_id, direction)) = load {
            tracing::debug!(start_id, %direction, "loading jumped-to rows");
            if let Err(rejection) = self.spawn_load(start_id, direction) {
                tracing::trace!(start_id, ?rejection, "jump load skipped");
            }
        }
        self.check_boundaries_conservatively(visible);
    }

    /// Boundary loads when the visible range lies well outside the loaded one.
    pub fn check_boundaries_conservatively(&self, visible: RowRange) {
        let options = &self.inner.options;
        let margin = options.preload_threshold.saturating_mul(2);
        let loads = {
            let st = self.lock();
            let (Some(min), Some(max)) = (st.cache.min_id(), st.cache.max_id()) else {
                return;
            };
            if st.ledger.is_loading() {
                return;
            }
            let mut loads = Vec::new();
            if visible.start < min && st.has_more_up && min - visible.start > margin {
                let next = min.saturating_sub(options.limit).max(1);
                if !st.ledger.is_requested(next) {
                    loads.push((next, Direction::Up));
                }
            }
            if visible.end > max && st.has_more_down && visible.end - max > margin {
                let next = max + 1;
                if !st.ledger.is_requested(next) {
                    loads.push((next, Direction::Down));
                }
            }
            loads
        };
        for (start_id, direction) in loads {
            if let Err(rejection) = self.spawn_load(start_id, direction) {
                tracing::trace!(start_id, %direction, ?rejection, "boundary load skipped");
            }
        }
    }

    /// Loads data behind fresh placeholders once the current fetches settle.
    pub(crate) fn heal_placeholders(&self, ids: Vec<u64>) {
        if !self.inner.options.placeholder_self_heal || self.is_loading() {
            return;
        }
        let table = self.clone();
        let delay = self.inner.options.timings.placeholder_heal();
        self.lock().timers.placeholder_heal.schedule(delay, async move {
            let load = {
                let st = table.lock();
                ids.iter()
                    .copied()
                    .find(|id| !st.cache.contains(*id) && !st.ledger.is_requested(*id))
                    .map(|id| {
                        let past_max = st.cache.max_id().is_none_or(|max| id > max);
                        (id, if past_max { Direction::Down } else { Direction::Up })
                    })
            };
            if let Some((start_id, direction)) = load {
                tracing::debug!(start_id, %direction, "loading placeholder rows");
                if let Err(rejection) = table.spawn_load(start_id, direction) {
                    tracing::trace!(start_id, %direction, ?rejection, "placeholder load skipped");
                }
            }
        });
    }
}
