//! In-memory data source and sink for engine tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use tracker_shared::{
    DatetimeLookupResponse, Direction, PageResponse, SearchResponse, TelemetryRow,
};

use super::error::SourceError;
use super::render::RenderPatch;
use super::source::{DataSource, DatetimeQuery, PageQuery, SearchQuery};
use super::{RowSink, TableStats};

/// What the next page request returns.
pub(crate) enum PageScript {
    /// Rows generated from the synthetic dataset.
    Dataset,
    Empty,
    Fail,
    Rows(Vec<TelemetryRow>),
}

#[derive(Default)]
struct ScriptState {
    script: VecDeque<PageScript>,
    hold: bool,
    gates: Vec<Arc<Notify>>,
    pages: Vec<PageQuery>,
    lookups: Vec<DatetimeQuery>,
    lookup_response: Option<DatetimeLookupResponse>,
    searches: Vec<SearchQuery>,
    search_response: Option<SearchResponse>,
}

/// Dataset of `total` rows; row `id` is stamped `base + (id - 1) * step`.
pub(crate) struct ScriptedSource {
    total: u64,
    base: i64,
    step: i64,
    state: Mutex<ScriptState>,
}

impl ScriptedSource {
    pub(crate) fn new(total: u64) -> Arc<Self> {
        Self::with_clock(total, 1_756_000_000, 10)
    }

    pub(crate) fn with_clock(total: u64, base: i64, step: i64) -> Arc<Self> {
        Arc::new(Self {
            total,
            base,
            step,
            state: Mutex::new(ScriptState::default()),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn datetime_of(&self, id: u64) -> i64 {
        self.base + (id as i64 - 1) * self.step
    }

    pub(crate) fn row(&self, id: u64) -> TelemetryRow {
        TelemetryRow {
            id,
            module_id: format!("{:04X}", id % 4),
            module_name: Some(format!("module-{}", id % 4)),
            datetime_unix: Some(self.datetime_of(id)),
            lat: Some(42.0 + id as f64 * 1e-4),
            lon: Some(-78.0),
            alt: Some(180.0),
            rssi: Some(-70),
            snr: Some(9),
            source: Some(1),
            jumps: Some(0),
        }
    }

    pub(crate) fn rows(&self, ids: impl IntoIterator<Item = u64>) -> Vec<TelemetryRow> {
        ids.into_iter().map(|id| self.row(id)).collect()
    }

    pub(crate) fn script(&self, step: PageScript) {
        self.state().script.push_back(step);
    }

    /// Page requests wait until released with [`ScriptedSource::release`].
    pub(crate) fn hold_pages(&self) {
        self.state().hold = true;
    }

    pub(crate) fn release(&self, call: usize) {
        let gate = self.state().gates.get(call).cloned();
        if let Some(gate) = gate {
            gate.notify_one();
        }
    }

    pub(crate) fn set_lookup(&self, response: DatetimeLookupResponse) {
        self.state().lookup_response = Some(response);
    }

    pub(crate) fn set_search(&self, response: SearchResponse) {
        self.state().search_response = Some(response);
    }

    pub(crate) fn pages(&self) -> Vec<PageQuery> {
        self.state().pages.clone()
    }

    /// `(start_id, direction)` of every page request so far.
    pub(crate) fn page_starts(&self) -> Vec<(u64, Direction)> {
        self.pages()
            .iter()
            .map(|q| (q.start_id(), q.direction))
            .collect()
    }

    pub(crate) fn lookups(&self) -> Vec<DatetimeQuery> {
        self.state().lookups.clone()
    }

    pub(crate) fn searches(&self) -> Vec<SearchQuery> {
        self.state().searches.clone()
    }

    fn dataset_page(&self, query: &PageQuery) -> PageResponse {
        let start = query.start_id();
        let end = (start + query.limit - 1).min(self.total);
        let data = if start > self.total {
            Vec::new()
        } else {
            self.rows(start..=end)
        };
        let has_more = match query.direction {
            Direction::Down => end < self.total,
            Direction::Up => start > 1,
        };
        PageResponse {
            data,
            total_count: Some(self.total),
            total_visible_count: Some(self.total),
            has_more: Some(has_more),
        }
    }

    fn default_lookup(&self, query: &DatetimeQuery) -> DatetimeLookupResponse {
        if query.datetime_unix < self.base {
            return DatetimeLookupResponse::default();
        }
        let target = ((query.datetime_unix - self.base) / self.step) as u64 + 1;
        if target > self.total {
            return DatetimeLookupResponse::default();
        }
        let end = (target + query.limit - 1).min(self.total);
        DatetimeLookupResponse {
            success: true,
            target_id: Some(target),
            data: self.rows(target..=end),
        }
    }
}

impl DataSource for ScriptedSource {
    fn fetch_page(&self, query: PageQuery) -> BoxFuture<'_, Result<PageResponse, SourceError>> {
        Box::pin(async move {
            let (step, gate) = {
                let mut st = self.state();
                st.pages.push(query.clone());
                let gate = if st.hold {
                    let gate = Arc::new(Notify::new());
                    st.gates.push(gate.clone());
                    Some(gate)
                } else {
                    None
                };
                (st.script.pop_front().unwrap_or(PageScript::Dataset), gate)
            };
            if let Some(gate) = gate {
                gate.notified().await;
            }
            match step {
                PageScript::Dataset => Ok(self.dataset_page(&query)),
                PageScript::Empty => Ok(PageResponse {
                    data: Vec::new(),
                    total_count: Some(self.total),
                    total_visible_count: Some(self.total),
                    has_more: Some(false),
                }),
                PageScript::Fail => Err(SourceError::Status(503)),
                PageScript::Rows(data) => Ok(PageResponse {
                    data,
                    total_count: Some(self.total),
                    total_visible_count: Some(self.total),
                    has_more: Some(true),
                }),
            }
        })
    }

    fn lookup_datetime(
        &self,
        query: DatetimeQuery,
    ) -> BoxFuture<'_, Result<DatetimeLookupResponse, SourceError>> {
        Box::pin(async move {
            let scripted = {
                let mut st = self.state();
                st.lookups.push(query.clone());
                st.lookup_response.clone()
            };
            Ok(scripted.unwrap_or_else(|| self.default_lookup(&query)))
        })
    }

    fn search(&self, query: SearchQuery) -> BoxFuture<'_, Result<SearchResponse, SourceError>> {
        Box::pin(async move {
            let mut st = self.state();
            st.searches.push(query);
            Ok(st.search_response.clone().unwrap_or_default())
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    patches: Mutex<Vec<RenderPatch>>,
    scrolls: Mutex<Vec<f64>>,
    loading: Mutex<Vec<bool>>,
    stats: Mutex<Vec<TableStats>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn patches(&self) -> Vec<RenderPatch> {
        self.patches.lock().unwrap().clone()
    }

    pub(crate) fn scrolls(&self) -> Vec<f64> {
        self.scrolls.lock().unwrap().clone()
    }

    pub(crate) fn last_scroll(&self) -> Option<f64> {
        self.scrolls.lock().unwrap().last().copied()
    }

    pub(crate) fn loading(&self) -> Vec<bool> {
        self.loading.lock().unwrap().clone()
    }

    pub(crate) fn last_stats(&self) -> Option<TableStats> {
        self.stats.lock().unwrap().last().copied()
    }
}

impl RowSink for RecordingSink {
    fn apply(&self, patch: &RenderPatch) {
        self.patches.lock().unwrap().push(patch.clone());
    }

    fn scroll_to(&self, scroll_top: f64) {
        self.scrolls.lock().unwrap().push(scroll_top);
    }

    fn loading_changed(&self, loading: bool) {
        self.loading.lock().unwrap().push(loading);
    }

    fn stats_changed(&self, stats: &TableStats) {
        self.stats.lock().unwrap().push(*stats);
    }
}
