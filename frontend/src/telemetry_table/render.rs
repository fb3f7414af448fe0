use std::collections::BTreeMap;

use tracker_shared::TelemetryRow;

use super::cache::RowCache;
use super::viewport::RowRange;

#[derive(Debug, Clone, PartialEq)]
pub enum RowContent {
    Loaded(TelemetryRow),
    /// Loading placeholder.
    Loading,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub id: u64,
    /// Offset from the top of the scroll content, in pixels.
    pub top: f64,
    /// Striping follows the absolute id, not the render position.
    pub even: bool,
    pub content: RowContent,
}

impl RowView {
    pub fn is_placeholder(&self) -> bool {
        matches!(self.content, RowContent::Loading)
    }
}

/// Minimal set of row element changes between two renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPatch {
    pub range: Option<RowRange>,
    pub removed: Vec<u64>,
    pub created: Vec<RowView>,
    /// Placeholders whose data arrived; the host drops the old element and
    /// builds a fresh one.
    pub replaced: Vec<RowView>,
    pub moved: Vec<(u64, f64)>,
    /// Cached rows inside `range`.
    pub visible_loaded: usize,
    pub content_height: f64,
}

impl RenderPatch {
    pub fn new_placeholders(&self) -> Vec<u64> {
        self.created
            .iter()
            .filter(|view| view.is_placeholder())
            .map(|view| view.id)
            .collect()
    }

    pub fn is_noop(&self) -> bool {
        self.removed.is_empty()
            && self.created.is_empty()
            && self.replaced.is_empty()
            && self.moved.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Rendered {
    top: f64,
    placeholder: bool,
}

/// What the host currently has on screen.
#[derive(Debug, Default)]
pub struct RenderState {
    rows: BTreeMap<u64, Rendered>,
    last_range: Option<RowRange>,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_range(&self) -> Option<RowRange> {
        self.last_range
    }

    pub fn rendered_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_placeholder(&self, id: u64) -> Option<bool> {
        self.rows.get(&id).map(|r| r.placeholder)
    }

    pub fn reset(&mut self) {
        self.rows.clear();
        self.last_range = None;
    }

    /// Diffs `needed` against the rendered rows. Returns `None` when the range
    /// is unchanged and `force` is off.
    pub fn plan(
        &mut self,
        needed: Option<RowRange>,
        force: bool,
        cache: &RowCache,
        total: u64,
        row_height: f64,
    ) -> Option<RenderPatch> {
        if !force && self.last_range == needed {
            return None;
        }
        self.last_range = needed;

        let mut patch = RenderPatch {
            range: needed,
            content_height: total as f64 * row_height,
            ..RenderPatch::default()
        };

        let keep = |id: u64| needed.is_some_and(|range| range.contains(id));
        patch.removed = self.rows.keys().copied().filter(|&id| !keep(id)).collect();
        for id in &patch.removed {
            self.rows.remove(id);
        }

        let Some(range) = needed else {
            return Some(patch);
        };

        for id in range.ids() {
            let top = id.saturating_sub(1) as f64 * row_height;
            let row = cache.get(id);
            if row.is_some() {
                patch.visible_loaded += 1;
            }
            let view = || RowView {
                id,
                top,
                even: id % 2 == 0,
                content: row.map_or(RowContent::Loading, |r| RowContent::Loaded(r.clone())),
            };

            match self.rows.get(&id).copied() {
                Some(existing) if existing.placeholder && row.is_some() => {
                    self.rows.insert(
                        id,
                        Rendered {
                            top,
                            placeholder: false,
                        },
                    );
                    patch.replaced.push(view());
                }
                Some(existing) => {
                    if existing.top != top {
                        self.rows.insert(id, Rendered { top, ..existing });
                        patch.moved.push((id, top));
                    }
                }
                None => {
                    self.rows.insert(
                        id,
                        Rendered {
                            top,
                            placeholder: row.is_none(),
                        },
                    );
                    patch.created.push(view());
                }
            }
        }

        Some(patch)
    }
}
