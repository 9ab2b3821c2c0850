use foundation::{PanoramaId, Rect};
use tracing::{debug, warn};

use crate::gallery::Gallery;
use crate::platform::{IntersectionEntry, ObserverKind, Platform};

/// An item is centered when its vertical center lies within half its own
/// height of the container's vertical center.
pub fn is_centered(item: &Rect, container: &Rect) -> bool {
    (item.center_y() - container.center_y()).abs() < item.height / 2.0
}

impl<P: Platform> Gallery<P> {
    /// Geometric centering test against the scrolling viewport.
    pub fn is_panorama_centered(&self, id: &PanoramaId) -> bool {
        let platform = self.platform();
        match platform.container_rect(id) {
            Some(rect) => is_centered(&rect, &platform.viewport_rect()),
            None => false,
        }
    }

    /// Entry point for intersection observer callbacks.
    pub fn handle_intersection(&self, id: &PanoramaId, kind: ObserverKind, entry: IntersectionEntry) {
        match kind {
            ObserverKind::NearViewport => self.on_near_viewport(id, entry),
            ObserverKind::Centering => self.on_centering(id, entry),
        }
    }

    fn on_near_viewport(&self, id: &PanoramaId, entry: IntersectionEntry) {
        if !entry.is_intersecting {
            return;
        }
        let start = {
            let mut state = self.state();
            let Some(res) = state.registry.get_mut(id) else {
                return;
            };
            if !res.observers.contains(&ObserverKind::NearViewport) {
                return;
            }
            self.platform().unobserve(id, ObserverKind::NearViewport);
            res.observers.retain(|k| *k != ObserverKind::NearViewport);
            if res.high_requested {
                None
            } else {
                res.high_requested = true;
                Some(res.generation)
            }
        };
        if let Some(generation) = start {
            debug!(panorama = %id, "near viewport, loading high-res texture");
            self.spawn_high_load(id, generation);
        }
    }

    fn on_centering(&self, id: &PanoramaId, entry: IntersectionEntry) {
        let centered = entry.is_intersecting && entry.ratio >= self.config().center_threshold;
        {
            let mut state = self.state();
            let Some(res) = state.registry.get_mut(id) else {
                return;
            };
            res.centered = centered;
        }
        if centered {
            if let Err(err) = self.set_active_panorama(id) {
                warn!(panorama = %id, "activation on centering failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::is_centered;
    use crate::platform::ObserverKind;
    use crate::testing::Harness;
    use foundation::{PanoramaId, Rect};

    #[test]
    fn centered_within_half_height() {
        let container = Rect::new(0.0, 0.0, 800.0, 1000.0);
        assert!(is_centered(&Rect::new(0.0, 300.0, 800.0, 400.0), &container));
        assert!(is_centered(&Rect::new(0.0, 499.0, 800.0, 400.0), &container));
        assert!(!is_centered(&Rect::new(0.0, 500.0, 800.0, 400.0), &container));
        assert!(!is_centered(&Rect::new(0.0, -100.0, 800.0, 400.0), &container));
    }

    #[test]
    fn centering_uses_viewport_geometry() {
        let h = Harness::new(3);
        // Viewport center 520; p1 spans 420..820.
        assert!(h.gallery.is_panorama_centered(&PanoramaId::from("p1")));
        assert!(!h.gallery.is_panorama_centered(&PanoramaId::from("p0")));
        assert!(!h.gallery.is_panorama_centered(&PanoramaId::from("missing")));
    }

    #[test]
    fn high_ratio_activates_low_ratio_does_not() {
        let h = Harness::new(3);
        h.create_all(3);
        let p1 = PanoramaId::from("p1");
        h.gallery
            .handle_intersection(&p1, ObserverKind::Centering, h.entry(true, 0.5));
        assert_eq!(h.gallery.active_id(), None);

        h.gallery
            .handle_intersection(&p1, ObserverKind::Centering, h.entry(true, 0.85));
        assert_eq!(h.gallery.active_id(), Some(p1.clone()));
        assert_eq!(h.gallery.running_loops(), 1);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let h = Harness::new(1);
        let ghost = PanoramaId::from("ghost");
        h.gallery
            .handle_intersection(&ghost, ObserverKind::Centering, h.entry(true, 1.0));
        h.gallery
            .handle_intersection(&ghost, ObserverKind::NearViewport, h.entry(true, 1.0));
        h.run();
        assert_eq!(h.gallery.active_id(), None);
    }
}
