//! Virtualized telemetry table.
//!
//! A sparse row cache over a remote, paginated row store. Scrolling maps the
//! viewport to a range of row ids; missing ids are fetched in `limit`-sized
//! windows, far-away rows are evicted, and the datetime index lets the time
//! slider jump to a row without a server round trip when the neighbourhood is
//! already cached.
//!
//! All state lives behind one `std::sync::Mutex`. It is never held across an
//! `.await`; fetches run on tokio tasks and merge their results synchronously.

pub mod cache;
pub mod columns;
pub mod config;
pub mod controls;
pub mod datetime_index;
pub mod error;
mod navigation;
pub mod render;
pub mod requests;
mod scheduler;
pub mod source;
pub mod timers;
pub mod viewport;

#[cfg(test)]
mod testing;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::task::AbortHandle;
use tracker_shared::{Session, SessionModule, TelemetryRow};

use crate::events::{BusEvent, EventBus, Subscription};
use crate::session::SessionContext;

use cache::RowCache;
use datetime_index::DatetimeIndex;
use error::ConfigError;
use navigation::NavigationState;
use render::{RenderPatch, RenderState};
use requests::{Rejection, RequestLedger};
use timers::TableTimers;
use viewport::{RowRange, Viewport};

pub use config::{TableOptions, TableTimings};
pub use source::{DataSource, HttpDataSource};

/// Row count assumed until the first page reports the real one.
pub const DEFAULT_TOTAL_ROWS: u64 = 10_000;

/// Host side of the table: applies render patches and mirrors UI state.
pub trait RowSink: Send + Sync {
    fn apply(&self, patch: &RenderPatch);

    fn scroll_to(&self, _scroll_top: f64) {}

    fn loading_changed(&self, _loading: bool) {}

    fn stats_changed(&self, _stats: &TableStats) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RowSink for NullSink {
    fn apply(&self, _patch: &RenderPatch) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TableStats {
    pub loaded_rows: usize,
    pub total_count: u64,
    pub total_visible_count: u64,
    pub visible_loaded: usize,
    pub rendered_range: Option<RowRange>,
    pub loading: bool,
    pub has_more_up: bool,
    pub has_more_down: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Primary,
    Middle,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { inserted: usize, existing: usize },
    /// The page was empty; the direction is done for this session.
    Exhausted,
    Skipped(Rejection),
    Failed,
    /// The table was cleared while the request was in flight.
    Stale,
}

pub(crate) struct TableState {
    session: SessionContext,
    epoch: u64,
    destroyed: bool,
    cache: RowCache,
    index: DatetimeIndex,
    ledger: RequestLedger,
    total_count: u64,
    total_visible_count: u64,
    has_more_up: bool,
    has_more_down: bool,
    /// Start id of the up page that came back empty; nothing at or below it.
    exhausted_up_from: Option<u64>,
    /// Start id of the down page that came back empty; nothing at or past it.
    exhausted_down_from: Option<u64>,
    viewport: Viewport,
    last_scroll_top: f64,
    render: RenderState,
    visible_loaded: usize,
    nav: NavigationState,
    tasks: Vec<AbortHandle>,
    timers: TableTimers,
}

impl TableState {
    fn new(options: &TableOptions) -> Self {
        Self {
            session: SessionContext::new(options.session_id),
            epoch: 0,
            destroyed: false,
            cache: RowCache::new(),
            index: DatetimeIndex::new(),
            ledger: RequestLedger::new(),
            total_count: DEFAULT_TOTAL_ROWS,
            total_visible_count: DEFAULT_TOTAL_ROWS,
            has_more_up: true,
            has_more_down: true,
            exhausted_up_from: None,
            exhausted_down_from: None,
            viewport: Viewport::new(options.viewport_height),
            last_scroll_top: 0.0,
            render: RenderState::new(),
            visible_loaded: 0,
            nav: NavigationState::default(),
            tasks: Vec::new(),
            timers: TableTimers::default(),
        }
    }

    fn visible(&self, row_height: f64) -> Option<RowRange> {
        self.viewport.visible(row_height, self.total_visible_count)
    }
}

struct Inner {
    options: TableOptions,
    source: Arc<dyn DataSource>,
    sink: Arc<dyn RowSink>,
    state: Mutex<TableState>,
    bus: Mutex<Option<EventBus>>,
    subscription: Mutex<Option<Subscription>>,
}

/// Cheap to clone; clones share one table.
#[derive(Clone)]
pub struct VirtualTable {
    inner: Arc<Inner>,
}

impl VirtualTable {
    /// Fails when `options` do not pass [`TableOptions::validate`].
    pub fn new(
        options: TableOptions,
        source: Arc<dyn DataSource>,
        sink: Arc<dyn RowSink>,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        let state = TableState::new(&options);
        Ok(Self {
            inner: Arc::new(Inner {
                options,
                source,
                sink,
                state: Mutex::new(state),
                bus: Mutex::new(None),
                subscription: Mutex::new(None),
            }),
        })
    }

    pub fn options(&self) -> &TableOptions {
        &self.inner.options
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_height(&self) -> f64 {
        self.inner.options.row_height
    }

    /// Runs `fut` on the runtime; `clear_table_data` and `destroy` abort it.
    pub(crate) fn spawn_tracked<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let mut st = self.lock();
        st.tasks.retain(|task| !task.is_finished());
        st.tasks.push(handle.abort_handle());
    }

    pub fn stats(&self) -> TableStats {
        let st = self.lock();
        TableStats {
            loaded_rows: st.cache.len(),
            total_count: st.total_count,
            total_visible_count: st.total_visible_count,
            visible_loaded: st.visible_loaded,
            rendered_range: st.render.last_range(),
            loading: st.ledger.is_loading(),
            has_more_up: st.has_more_up,
            has_more_down: st.has_more_down,
        }
    }

    fn publish_stats(&self) {
        let stats = self.stats();
        self.inner.sink.stats_changed(&stats);
    }

    pub fn cached_row(&self, id: u64) -> Option<TelemetryRow> {
        self.lock().cache.get(id).cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().ledger.is_loading()
    }

    pub fn session_id(&self) -> Option<i64> {
        self.lock().session.session_id()
    }

    pub fn scroll_top(&self) -> f64 {
        self.lock().viewport.scroll_top
    }

    pub fn visible_range(&self) -> Option<RowRange> {
        let rh = self.row_height();
        self.lock().visible(rh)
    }

    /// The scroll container changed height.
    pub fn resize(&self, height: f64) {
        self.lock().viewport.height = height.max(0.0);
        self.render_visible_rows(false);
        self.check_for_more_data();
    }

    /// Scroll event from the host.
    pub fn handle_scroll(&self, scroll_top: f64) {
        let rh = self.row_height();
        let jump_px = rh * self.inner.options.jump_scroll_rows as f64;
        let jumped = {
            let mut st = self.lock();
            let scroll_top = st
                .viewport
                .clamp_scroll_top(scroll_top, rh, st.total_visible_count);
            let delta = (scroll_top - st.last_scroll_top).abs();
            st.viewport.scroll_top = scroll_top;
            st.last_scroll_top = scroll_top;
            delta > jump_px
        };
        if jumped {
            tracing::debug!(scroll_top, "jump scroll");
            self.force_check_data();
        }

        let table = self.clone();
        let delay = self.inner.options.timings.scroll_render();
        self.lock().timers.scroll_render.schedule(delay, async move {
            table.render_visible_rows(false);
            table.check_for_more_data();
        });
    }

    /// Diffs the needed row range against what the host shows and sends the
    /// patch. Unchanged ranges are skipped unless `force` is set.
    pub fn render_visible_rows(&self, force: bool) {
        let rh = self.row_height();
        let buffer = self.inner.options.buffer;
        let patch = {
            let mut st = self.lock();
            let st = &mut *st;
            let total = st.total_visible_count;
            let needed = st.viewport.buffered(rh, total, buffer);
            let patch = st.render.plan(needed, force, &st.cache, total, rh);
            if let Some(patch) = &patch {
                st.visible_loaded = patch.visible_loaded;
            }
            patch
        };
        let Some(patch) = patch else {
            return;
        };

        self.inner.sink.apply(&patch);
        let placeholders = patch.new_placeholders();
        if !placeholders.is_empty() {
            self.heal_placeholders(placeholders);
        }
        self.publish_stats();
    }

    fn schedule_deferred_render(&self) {
        let table = self.clone();
        let delay = self.inner.options.timings.deferred_render();
        self.lock().timers.deferred_render.schedule(delay, async move {
            table.render_visible_rows(true);
        });
    }

    fn set_scroll_top(&self, scroll_top: f64) {
        let rh = self.row_height();
        let scroll_top = {
            let mut st = self.lock();
            let clamped = st
                .viewport
                .clamp_scroll_top(scroll_top, rh, st.total_visible_count);
            st.viewport.scroll_top = clamped;
            clamped
        };
        self.inner.sink.scroll_to(scroll_top);
    }

    /// Drops every cached row, pending request and timer. The session and its
    /// module filter are kept.
    pub fn clear_table_data(&self) {
        let rh = self.row_height();
        let (tasks, patch) = {
            let mut st = self.lock();
            let st = &mut *st;
            st.epoch += 1;
            st.timers.cancel_all();
            st.cache.clear();
            st.index.clear();
            st.ledger.clear();
            st.nav = NavigationState::default();
            st.has_more_up = true;
            st.has_more_down = true;
            st.exhausted_up_from = None;
            st.exhausted_down_from = None;
            st.total_count = DEFAULT_TOTAL_ROWS;
            st.total_visible_count = DEFAULT_TOTAL_ROWS;
            st.viewport.scroll_top = 0.0;
            st.last_scroll_top = 0.0;
            st.visible_loaded = 0;
            let patch = st
                .render
                .plan(None, true, &st.cache, st.total_visible_count, rh);
            st.render.reset();
            (std::mem::take(&mut st.tasks), patch)
        };
        for task in tasks {
            task.abort();
        }

        if let Some(patch) = patch {
            self.inner.sink.apply(&patch);
        }
        self.inner.sink.scroll_to(0.0);
        self.inner.sink.loading_changed(false);
        self.publish_stats();
        tracing::info!("table data cleared");
    }

    /// Switches to `session` and reloads from the first row.
    pub fn select_session(&self, session: &Session) {
        self.clear_table_data();
        self.lock().session.select(session);
        tracing::info!(session_id = session.id, "session selected");

        let table = self.clone();
        self.spawn_tracked(async move {
            table.load_initial_data().await;
        });
    }

    /// A changed module filter invalidates the cache.
    pub fn set_session_modules(&self, modules: Vec<SessionModule>) {
        let (changed, selected) = {
            let mut st = self.lock();
            let changed = st.session.set_modules(modules);
            (changed, st.session.is_selected())
        };
        if !changed {
            return;
        }
        tracing::debug!("module filter changed");
        self.clear_table_data();
        if selected {
            let table = self.clone();
            self.spawn_tracked(async move {
                table.load_initial_data().await;
            });
        }
    }

    /// Primary clicks on a loaded row move the time slider to its timestamp.
    pub fn row_clicked(&self, id: u64, button: MouseButton) -> bool {
        if button != MouseButton::Primary {
            return false;
        }
        let Some(datetime_unix) = self.lock().cache.get(id).and_then(|row| row.datetime_unix) else {
            return false;
        };
        let bus = self
            .inner
            .bus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match bus {
            Some(bus) => {
                bus.emit(BusEvent::TimeSliderSet(datetime_unix));
                true
            }
            None => false,
        }
    }

    /// Subscribes to `bus`. The listener only holds a weak reference, so the
    /// table can still be dropped while bound.
    pub fn bind(&self, bus: &EventBus) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let subscription = bus.listen(move |event| {
            if let Some(inner) = weak.upgrade() {
                VirtualTable { inner }.handle_event(event);
            }
        });
        *self.inner.bus.lock().unwrap_or_else(PoisonError::into_inner) = Some(bus.clone());
        *self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(subscription);
    }

    pub fn unbind(&self) {
        self.inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner
            .bus
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_bound(&self) -> bool {
        self.inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    pub fn handle_event(&self, event: BusEvent) {
        tracing::debug!(event = event.name(), "table event");
        match event {
            BusEvent::SessionSelected(session) => self.select_session(&session),
            BusEvent::SessionLoadData(modules) => self.set_session_modules(modules),
            BusEvent::TableClear => self.clear_table_data(),
            BusEvent::TimeSliderChanged(datetime_unix) => {
                let table = self.clone();
                self.spawn_tracked(async move {
                    table.navigate_to_datetime_unix(datetime_unix).await;
                });
            }
            BusEvent::TimeSliderSet(_) => {}
        }
    }

    /// Unbinds, cancels everything and refuses further loads.
    pub fn destroy(&self) {
        self.unbind();
        self.clear_table_data();
        self.lock().destroyed = true;
        tracing::info!("table destroyed");
    }
}
