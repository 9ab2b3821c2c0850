//! Virtual scrolling: which item indices should be materialized for a given
//! scroll position.

use foundation::PanoramaId;
use foundation::time::Time;
use runtime::SettleTimer;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{GalleryConfig, WindowPolicy};
use crate::gallery::Gallery;
use crate::manifest::GalleryItem;
use crate::platform::Platform;

/// Inclusive index range `[start, end]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct VisibleWindow {
    pub start: usize,
    pub end: usize,
}

impl VisibleWindow {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }

    pub fn indices(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

/// Index window for a scroll position, padded by `buffer` items on each side.
///
/// Returns `None` for degenerate input (non-positive heights, no items, or a
/// negative or non-finite scroll offset).
///
/// The window never holds more than `ceil(container / item) + 2 * buffer`
/// items. When the viewport straddles an item boundary that bound is one
/// short of the rows on screen, so with `buffer == 0` the trailing partially
/// visible item is left out. Any `buffer >= 1` covers it.
pub fn compute_window(
    scroll_top: f64,
    container_height: f64,
    item_height: f64,
    buffer: usize,
    total: usize,
) -> Option<VisibleWindow> {
    let valid = item_height > 0.0
        && container_height > 0.0
        && total > 0
        && scroll_top.is_finite()
        && scroll_top >= 0.0
        && item_height.is_finite()
        && container_height.is_finite();
    if !valid {
        return None;
    }
    let last = total - 1;
    let first_visible = (scroll_top / item_height).floor() as usize;
    let last_visible = ((scroll_top + container_height) / item_height).ceil() as usize;
    let per_screen = (container_height / item_height).ceil() as usize;

    let start = first_visible.saturating_sub(buffer);
    let mut end = last_visible.saturating_add(buffer).min(last);
    // Rounding at both edges can add up to two extra rows.
    let max_len = per_screen.saturating_add(buffer.saturating_mul(2)).max(1);
    end = end.min(start.saturating_add(max_len - 1));
    let start = start.min(end);
    Some(VisibleWindow { start, end })
}

/// Result of a window recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WindowChange {
    pub window: Option<VisibleWindow>,
    pub entered: Vec<usize>,
    pub left: Vec<usize>,
}

impl WindowChange {
    fn between(old: Option<VisibleWindow>, new: Option<VisibleWindow>) -> Self {
        let inside = |w: Option<VisibleWindow>, i: usize| w.is_some_and(|w| w.contains(i));
        let entered = new
            .map(|w| w.indices().filter(|&i| !inside(old, i)).collect())
            .unwrap_or_default();
        let left = old
            .map(|w| w.indices().filter(|&i| !inside(new, i)).collect())
            .unwrap_or_default();
        Self {
            window: new,
            entered,
            left,
        }
    }
}

/// Scroll-driven windowing with a settle delay.
#[derive(Debug, Clone)]
pub struct ScrollWindower {
    item_height: f64,
    buffer: usize,
    total: usize,
    scroll_top: f64,
    container_height: f64,
    settle: SettleTimer,
    scroll_to_hold_ms: f64,
    hold_until: Option<Time>,
    window: Option<VisibleWindow>,
}

impl ScrollWindower {
    pub fn new(cfg: &GalleryConfig, total: usize, container_height: f64) -> Self {
        Self {
            item_height: cfg.item_height_px,
            buffer: cfg.buffer_size,
            total,
            scroll_top: 0.0,
            container_height,
            settle: SettleTimer::new(cfg.scroll_settle_ms as f64),
            scroll_to_hold_ms: cfg.scroll_to_settle_ms as f64,
            hold_until: None,
            window: None,
        }
    }

    pub fn window(&self) -> Option<VisibleWindow> {
        self.window
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn is_item_visible(&self, index: usize) -> bool {
        self.window.is_some_and(|w| w.contains(index))
    }

    pub fn is_scrolling(&self, now: Time) -> bool {
        self.settle.is_pending() || self.hold_until.is_some_and(|t| now < t)
    }

    pub fn on_scroll(&mut self, scroll_top: f64, now: Time) {
        self.scroll_top = scroll_top;
        self.settle.arm(now);
    }

    /// Recomputes once scrolling has been quiet for the settle delay.
    pub fn poll(&mut self, now: Time) -> Option<WindowChange> {
        if self.settle.poll(now) {
            self.recompute()
        } else {
            None
        }
    }

    pub fn on_resize(&mut self, container_height: f64) -> Option<WindowChange> {
        self.container_height = container_height;
        self.recompute()
    }

    pub fn set_total(&mut self, total: usize) -> Option<WindowChange> {
        self.total = total;
        self.recompute()
    }

    /// Scroll offset that brings `index` to the top; scrolling is reported
    /// for a while so the smooth scroll is not mistaken for user input.
    pub fn scroll_to_index(&mut self, index: usize, now: Time) -> f64 {
        self.hold_until = Some(now.add_millis(self.scroll_to_hold_ms));
        index.min(self.total.saturating_sub(1)) as f64 * self.item_height
    }

    /// Recomputes now; `None` when the window did not change.
    pub fn recompute(&mut self) -> Option<WindowChange> {
        let next = compute_window(
            self.scroll_top,
            self.container_height,
            self.item_height,
            self.buffer,
            self.total,
        );
        if next == self.window {
            return None;
        }
        let change = WindowChange::between(self.window, next);
        self.window = next;
        Some(change)
    }
}

impl<P: Platform> Gallery<P> {
    /// Materializes items that entered the window and, under
    /// [`WindowPolicy::Release`], destroys those that left it.
    pub fn apply_window(&self, change: &WindowChange, items: &[GalleryItem]) {
        let platform = self.platform();
        for &index in &change.entered {
            let Some(item) = items.get(index) else {
                continue;
            };
            let id = PanoramaId::for_index(index);
            if self.contains(&id) || platform.container_rect(&id).is_none() {
                continue;
            }
            let gallery = self.clone();
            let urls = item.urls();
            platform.spawn_local(Box::pin(async move {
                if let Err(err) = gallery.create_panorama(id.clone(), urls).await {
                    warn!(panorama = %id, "create from window failed: {err}");
                }
            }));
        }
        if self.config().window_policy == WindowPolicy::Release {
            for &index in &change.left {
                let id = PanoramaId::for_index(index);
                if self.contains(&id) {
                    debug!(panorama = %id, "left window, releasing");
                    self.destroy_panorama(&id);
                }
            }
        }
    }
}
