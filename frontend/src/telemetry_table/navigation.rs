use std::collections::HashSet;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracker_shared::Direction;

use super::VirtualTable;
use super::source::{DatetimeQuery, SearchQuery};
use super::viewport::Viewport;

/// Neighbourhood checked before trusting a cached datetime hit.
pub const AVAILABILITY_BUFFER: u64 = 10;

struct PendingDatetime {
    datetime_unix: i64,
    reply: oneshot::Sender<bool>,
}

/// Throttle bookkeeping for both navigation paths.
#[derive(Default)]
pub(crate) struct NavigationState {
    last_datetime_at: Option<Instant>,
    last_datetime_target: Option<i64>,
    pending_datetime: Option<PendingDatetime>,
    last_scroll_at: Option<Instant>,
    pending_scroll: Option<(u64, bool)>,
    scrolls_in_progress: HashSet<u64>,
}

impl VirtualTable {
    /// Scrolls to the row closest to `datetime_unix` without passing it.
    ///
    /// At most one navigation runs per throttle window. A call inside the
    /// window replaces the deferred one; the replaced caller gets `false`.
    pub async fn navigate_to_datetime_unix(&self, datetime_unix: i64) -> bool {
        if datetime_unix == 0 {
            tracing::warn!("datetime navigation needs a timestamp");
            return false;
        }

        let throttle = self.inner.options.timings.datetime_throttle();
        let deferred = {
            let mut st = self.lock();
            let now = Instant::now();
            if let Some(previous) = st.nav.pending_datetime.take() {
                tracing::debug!(
                    superseded = previous.datetime_unix,
                    datetime_unix,
                    "replacing deferred datetime navigation"
                );
                let _ = previous.reply.send(false);
            }

            let elapsed = st.nav.last_datetime_at.map(|last| now.duration_since(last));
            match elapsed {
                Some(elapsed) if elapsed < throttle => {
                    let (reply, rx) = oneshot::channel();
                    st.nav.pending_datetime = Some(PendingDatetime {
                        datetime_unix,
                        reply,
                    });
                    let table = self.clone();
                    st.timers
                        .datetime_throttle
                        .schedule(throttle - elapsed, async move {
                            table.run_deferred_datetime();
                        });
                    Some(rx)
                }
                _ => {
                    st.nav.last_datetime_at = Some(now);
                    st.nav.last_datetime_target = Some(datetime_unix);
                    None
                }
            }
        };

        match deferred {
            Some(rx) => rx.await.unwrap_or(false),
            None => self.execute_datetime_navigation(datetime_unix).await,
        }
    }

    fn run_deferred_datetime(&self) {
        let (pending, repeat) = {
            let mut st = self.lock();
            let Some(pending) = st.nav.pending_datetime.take() else {
                return;
            };
            let repeat = st.nav.last_datetime_target == Some(pending.datetime_unix);
            st.nav.last_datetime_at = Some(Instant::now());
            st.nav.last_datetime_target = Some(pending.datetime_unix);
            (pending, repeat)
        };

        if repeat {
            tracing::debug!(datetime_unix = pending.datetime_unix, "already navigated");
            let _ = pending.reply.send(true);
            return;
        }

        let table = self.clone();
        self.spawn_tracked(async move {
            let found = table
                .execute_datetime_navigation(pending.datetime_unix)
                .await;
            let _ = pending.reply.send(found);
        });
    }

    async fn execute_datetime_navigation(&self, datetime_unix: i64) -> bool {
        let (cached, query, epoch) = {
            let st = self.lock();
            let cached = st.index.find_closest(datetime_unix).filter(|id| {
                st.cache
                    .is_available_around(*id, AVAILABILITY_BUFFER, st.total_visible_count)
            });
            let query = DatetimeQuery {
                session_id: st.session.session_id(),
                modules: st.session.module_ids(),
                limit: self.inner.options.limit,
                datetime_unix,
            };
            (cached, query, st.epoch)
        };

        if let Some(target) = cached {
            tracing::debug!(datetime_unix, target, "datetime resolved from cache");
            self.scroll_to_id(target, false).await;
            return true;
        }

        let response = match self.inner.source.lookup_datetime(query).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(datetime_unix, error = %e, "datetime lookup failed");
                return false;
            }
        };
        let Some(server_target) = response.target_id.filter(|id| response.success && *id > 0) else {
            tracing::info!(datetime_unix, "no row for datetime");
            return false;
        };

        let target = {
            let mut st = self.lock();
            if st.epoch != epoch {
                return false;
            }
            st.index.record_rows(&response.data);
            st.cache.merge(&response.data);
            st.index
                .best_target(datetime_unix, server_target, &response.data)
        };
        tracing::debug!(datetime_unix, server_target, target, "datetime resolved by server");
        self.scroll_to_id(target, true).await;
        true
    }

    /// Scrolls to the row matching a field search on the server.
    pub async fn navigate_to_value(&self, field: &str, value: &str) -> bool {
        if field.is_empty() || value.is_empty() {
            tracing::warn!("search needs a field and a value");
            return false;
        }
        let query = SearchQuery {
            field: field.to_string(),
            value: value.to_string(),
        };
        match self.inner.source.search(query).await {
            Ok(response) => match response.target_id.filter(|id| response.success && *id > 0) {
                Some(target) => {
                    self.scroll_to_id(target, true).await;
                    true
                }
                None => {
                    tracing::info!(
                        field,
                        value,
                        message = response.message.as_deref().unwrap_or(""),
                        "value not found"
                    );
                    false
                }
            },
            Err(e) => {
                tracing::warn!(field, value, error = %e, "search failed");
                false
            }
        }
    }

    pub fn is_data_available_around(&self, id: u64, buffer: u64) -> bool {
        let st = self.lock();
        st.cache.is_available_around(id, buffer, st.total_visible_count)
    }

    /// Scrolls so `target` is the top row, loading its neighbourhood first
    /// when `needs_load` is set.
    ///
    /// Calls inside the throttle window return `false`; the last of them runs
    /// once the window ends.
    pub async fn scroll_to_id(&self, target: u64, needs_load: bool) -> bool {
        let throttle = self.inner.options.timings.scroll_throttle();
        {
            let mut st = self.lock();
            if target < 1 || target > st.total_visible_count {
                tracing::warn!(target, total = st.total_visible_count, "scroll target out of range");
                return false;
            }
            let now = Instant::now();
            let throttled = st
                .nav
                .last_scroll_at
                .is_some_and(|last| now.duration_since(last) < throttle);
            if throttled {
                st.nav.pending_scroll = Some((target, needs_load));
                let table = self.clone();
                st.timers
                    .scroll_throttle
                    .schedule_if_idle(throttle, async move {
                        table.run_deferred_scroll();
                    });
                tracing::trace!(target, "scroll throttled");
                return false;
            }
            st.nav.last_scroll_at = Some(now);
        }
        self.execute_scroll_to_id(target, needs_load).await
    }

    fn run_deferred_scroll(&self) {
        let pending = {
            let mut st = self.lock();
            let pending = st.nav.pending_scroll.take();
            if pending.is_some() {
                st.nav.last_scroll_at = Some(Instant::now());
            }
            pending
        };
        if let Some((target, needs_load)) = pending {
            let table = self.clone();
            self.spawn_tracked(async move {
                table.execute_scroll_to_id(target, needs_load).await;
            });
        }
    }

    async fn execute_scroll_to_id(&self, target: u64, needs_load: bool) -> bool {
        if !self.lock().nav.scrolls_in_progress.insert(target) {
            tracing::debug!(target, "scroll already in progress");
            return false;
        }

        self.scroll_into_place(target, needs_load).await;

        let table = self.clone();
        let release = self.inner.options.timings.scroll_release();
        self.spawn_tracked(async move {
            tokio::time::sleep(release).await;
            table.lock().nav.scrolls_in_progress.remove(&target);
        });
        true
    }

    async fn scroll_into_place(&self, target: u64, needs_load: bool) {
        let options = &self.inner.options;
        let rh = options.row_height;
        let target_top = Viewport::scroll_top_for(target, rh);

        let (in_view, critical, load_start) = {
            let st = self.lock();
            let total = st.total_visible_count;
            let in_view = st.viewport.contains_row(target, rh);
            let critical: Vec<u64> = [
                target,
                target.saturating_sub(1),
                target + 1,
                target.saturating_sub(5).max(1),
                (target + 5).min(total),
            ]
            .into_iter()
            .filter(|id| *id >= 1 && *id <= total)
            .collect();

            let load_start = if in_view || !needs_load {
                None
            } else {
                let gaps = critical
                    .iter()
                    .any(|id| !st.cache.contains(*id) && !st.ledger.is_requested(*id));
                let start = target.saturating_sub(options.limit / 3).max(1);
                (gaps && !st.ledger.is_requested(start)).then_some(start)
            };
            (in_view, critical, load_start)
        };

        if in_view {
            self.set_scroll_top(target_top);
            self.schedule_deferred_render();
            return;
        }

        if let Some(start_id) = load_start {
            let outcome = self.load_data(start_id, Direction::Down).await;
            tracing::debug!(target, start_id, ?outcome, "loaded rows around scroll target");

            let poll = options.timings.scroll_poll();
            for _ in 0..options.timings.scroll_poll_attempts {
                let settled = {
                    let st = self.lock();
                    !st.ledger.is_loading() || critical.iter().all(|id| st.cache.contains(*id))
                };
                if settled {
                    break;
                }
                tokio::time::sleep(poll).await;
            }
        }

        self.set_scroll_top(target_top);
        self.schedule_deferred_render();
    }

    pub async fn scroll_to_top(&self) -> bool {
        self.scroll_to_id(1, true).await
    }

    pub async fn scroll_to_bottom(&self) -> bool {
        let total = self.lock().total_visible_count;
        self.scroll_to_id(total, true).await
    }
}
