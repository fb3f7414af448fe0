/// Inclusive range of 1-based row ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub start: u64,
    pub end: u64,
}

impl RowRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, id: u64) -> bool {
        id >= self.start && id <= self.end
    }

    pub fn len(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> std::ops::RangeInclusive<u64> {
        self.start..=self.end
    }

    /// Grows the range by `by` rows on both sides, staying within `1..=total`.
    pub fn expand(&self, by: u64, total: u64) -> RowRange {
        RowRange {
            start: self.start.saturating_sub(by).max(1),
            end: self.end.saturating_add(by).min(total),
        }
    }
}

/// 1-based row under pixel offset `y`. Saturates instead of overflowing.
fn row_at(y: f64, row_height: f64) -> u64 {
    if row_height.is_nan() || row_height <= 0.0 {
        return 1;
    }
    ((y / row_height).floor() as u64).saturating_add(1)
}

/// Scroll position and height of the scroll container, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub scroll_top: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(height: f64) -> Self {
        Self {
            scroll_top: 0.0,
            height: height.max(0.0),
        }
    }

    fn first_row(&self, row_height: f64) -> u64 {
        row_at(self.scroll_top.max(0.0), row_height)
    }

    fn last_row(&self, row_height: f64) -> u64 {
        row_at(self.scroll_top.max(0.0) + self.height, row_height)
    }

    /// Largest scroll offset that still shows a full viewport of rows.
    pub fn max_scroll_top(&self, row_height: f64, total: u64) -> f64 {
        (total as f64 * row_height - self.height).max(0.0)
    }

    /// `scroll_top` limited to `0..=max_scroll_top`. NaN maps to 0.
    pub fn clamp_scroll_top(&self, scroll_top: f64, row_height: f64, total: u64) -> f64 {
        scroll_top
            .max(0.0)
            .min(self.max_scroll_top(row_height, total))
    }

    /// Row ids intersecting the viewport. `None` when the table has no rows or
    /// the viewport lies below the last row.
    pub fn visible(&self, row_height: f64, total: u64) -> Option<RowRange> {
        if total == 0 {
            return None;
        }
        let start = self.first_row(row_height).max(1);
        let end = self.last_row(row_height).min(total);
        (start <= end).then(|| RowRange::new(start, end))
    }

    /// Visible ids plus `buffer` rows on each side.
    pub fn buffered(&self, row_height: f64, total: u64, buffer: u64) -> Option<RowRange> {
        self.visible(row_height, total)
            .map(|range| range.expand(buffer, total))
    }

    /// Scroll offset that puts `id` at the top of the viewport.
    pub fn scroll_top_for(id: u64, row_height: f64) -> f64 {
        id.saturating_sub(1) as f64 * row_height
    }

    pub fn contains_row(&self, id: u64, row_height: f64) -> bool {
        id >= self.first_row(row_height) && id <= self.last_row(row_height)
    }
}
