//! Single-active-item state machine and the per-item render loop.

use foundation::PanoramaId;
use foundation::time::Time;
use runtime::{Frame, FrameRequest};
use tracing::{debug, info, warn};

use crate::error::{GalleryError, ResourcePart};
use crate::gallery::Gallery;
use crate::orbit::OrbitController;
use crate::platform::Platform;
use crate::resource::PanoramaResource;

/// Stops the loop and puts the hint back over the last rendered frame.
fn deactivate<P: Platform>(res: &mut PanoramaResource<P>, platform: &P, emphasize_until: Time) {
    if let Some(req) = res.frame_loop.cancel() {
        platform.cancel_frame(&res.id, req);
    }
    res.hovered = false;
    res.frame = None;
    if let Some(controls) = res.controls.as_mut() {
        controls.pointer_up();
    }
    res.hint.visible = true;
    res.hint.emphasized_until = Some(emphasize_until);
    res.refresh_hint(platform);
}

impl<P: Platform> Gallery<P> {
    /// Makes `id` the single interactive item, deactivating the previous one.
    ///
    /// Fails with [`GalleryError::MissingResource`] when `id` is unknown or
    /// not fully initialized; no other item is touched in that case.
    pub fn set_active_panorama(&self, id: &PanoramaId) -> Result<(), GalleryError> {
        let platform = self.platform();
        let emphasis_ms = self.config().overlay_emphasis_ms;

        let (generation, deactivated) = {
            let mut guard = self.state();
            let state = &mut *guard;
            let Some(res) = state.registry.get_mut(id) else {
                warn!(panorama = %id, "activation of unknown panorama");
                return Err(GalleryError::MissingResource {
                    id: id.clone(),
                    part: ResourcePart::Resource,
                });
            };
            if let Some(part) = res.missing_part() {
                warn!(panorama = %id, "activation aborted, missing {part}");
                return Err(GalleryError::MissingResource {
                    id: id.clone(),
                    part,
                });
            }
            if state.active.as_ref() == Some(id) && res.is_running() {
                res.hovered = true;
                return Ok(());
            }

            let now = platform.now();
            let mut deactivated = None;
            if let Some(prev) = state.active.take().filter(|prev| prev != id) {
                if let Some(prev_res) = state.registry.get_mut(&prev) {
                    deactivate(prev_res, platform, now.add_millis(emphasis_ms as f64));
                    deactivated = Some((prev.clone(), prev_res.generation));
                }
                state.events.emit("deactivate", Some(prev.as_str()), "superseded");
                debug!(panorama = %prev, "deactivated");
            }

            let Some(res) = state.registry.get_mut(id) else {
                return Ok(());
            };
            res.hovered = true;
            res.hint.visible = false;
            res.refresh_hint(platform);
            if let Some(req) = res.frame_loop.cancel() {
                platform.cancel_frame(id, req);
            }
            let req = res.frame_loop.request();
            platform.request_frame(id, req);
            let generation = res.generation;

            state.active = Some(id.clone());
            state.events.emit("activate", Some(id.as_str()), "render loop started");
            (generation, deactivated)
        };
        info!(panorama = %id, "activated");

        if let Some((prev, prev_generation)) = deactivated {
            self.schedule_hint_refresh(&prev, prev_generation, emphasis_ms);
        }
        self.schedule_capture(id, generation);
        Ok(())
    }

    /// Activates the first item in registration order, if any.
    pub fn activate_first(&self) -> Result<(), GalleryError> {
        let first = self.state().registry.ids().first().cloned();
        match first {
            Some(id) => self.set_active_panorama(&id),
            None => Ok(()),
        }
    }

    /// Render-loop tick delivered by the platform.
    pub fn handle_frame(&self, id: &PanoramaId, req: FrameRequest, time: Time) {
        let platform = self.platform();
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(res) = state.registry.get_mut(id) else {
            return;
        };
        if !res.frame_loop.accept(req) {
            debug!(panorama = %id, "stale frame ignored");
            return;
        }

        if !res.hovered && !res.centered {
            res.frame = None;
            res.hint.visible = true;
            res.refresh_hint(platform);
            if state.active.as_ref() == Some(id) {
                state.active = None;
            }
            state
                .events
                .emit("loop_stop", Some(id.as_str()), "neither hovered nor centered");
            debug!(panorama = %id, "render loop stopped");
            return;
        }

        let frame = match res.frame {
            Some(prev) => prev.advance(time),
            None => Frame::first(time),
        };
        res.frame = Some(frame);
        if let (Some(controls), Some(camera)) = (res.controls.as_mut(), res.camera.as_mut()) {
            controls.update(frame.dt_s);
            controls.apply_to(camera);
        }
        res.present();

        let next = res.frame_loop.request();
        platform.request_frame(id, next);
    }

    /// Drag or touch start on an item's surface: activates it and starts a drag.
    pub fn pointer_down(&self, id: &PanoramaId, pos_px: [f64; 2]) -> Result<(), GalleryError> {
        self.set_active_panorama(id)?;
        if let Some(controls) = self.state().registry.get_mut(id).and_then(|r| r.controls.as_mut()) {
            controls.pointer_down(pos_px);
        }
        Ok(())
    }

    pub fn pointer_move(&self, id: &PanoramaId, pos_px: [f64; 2]) {
        if let Some(controls) = self.state().registry.get_mut(id).and_then(|r| r.controls.as_mut()) {
            controls.pointer_move(pos_px);
        }
    }

    /// End of pointer engagement. The item keeps running while it is still
    /// centered in the viewport.
    pub fn pointer_up(&self, id: &PanoramaId) {
        let centered = self.is_panorama_centered(id);
        let mut state = self.state();
        let Some(res) = state.registry.get_mut(id) else {
            return;
        };
        if let Some(controls) = res.controls.as_mut() {
            controls.pointer_up();
        }
        res.hovered = false;
        res.centered = centered;
    }

    pub fn wheel(&self, id: &PanoramaId, delta: f64) {
        if let Some(controls) = self.state().registry.get_mut(id).and_then(|r| r.controls.as_mut()) {
            controls.wheel(delta);
        }
    }

    /// Redraws the hint of `id` once its emphasis has expired.
    pub(crate) fn schedule_hint_refresh(&self, id: &PanoramaId, generation: u64, after_ms: u32) {
        let gallery = self.clone();
        let id = id.clone();
        let sleep = self.platform().sleep(after_ms);
        self.platform().spawn_local(Box::pin(async move {
            sleep.await;
            let mut state = gallery.state();
            if let Some(res) = state.registry.get_live_mut(&id, generation) {
                res.refresh_hint(gallery.platform());
            }
        }));
    }

    /// Captures the neighbors of `id` once it has stayed active for a while.
    fn schedule_capture(&self, id: &PanoramaId, generation: u64) {
        let gallery = self.clone();
        let id = id.clone();
        let sleep = self.platform().sleep(self.config().capture_delay_ms);
        self.platform().spawn_local(Box::pin(async move {
            sleep.await;
            let still_active = {
                let state = gallery.state();
                state.active.as_ref() == Some(&id) && state.registry.is_live(&id, generation)
            };
            if still_active {
                gallery.capture_next(&id).await;
            } else {
                debug!(panorama = %id, "no longer active, capture skipped");
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use crate::config::GalleryConfig;
    use crate::error::{GalleryError, ResourcePart};
    use crate::platform::{OverlayKind, Platform};
    use crate::testing::Harness;
    use foundation::PanoramaId;
    use pretty_assertions::assert_eq;

    fn ids() -> (PanoramaId, PanoramaId, PanoramaId) {
        (
            PanoramaId::from("p0"),
            PanoramaId::from("p1"),
            PanoramaId::from("p2"),
        )
    }

    #[test]
    fn at_most_one_loop_runs() {
        let h = Harness::new(3);
        h.create_all(3);
        let (a, b, c) = ids();

        h.gallery.set_active_panorama(&a).expect("activate a");
        h.gallery.set_active_panorama(&b).expect("activate b");
        assert_eq!(h.gallery.running_loops(), 1);
        assert_eq!(h.gallery.active_id(), Some(b.clone()));
        assert!(!h.gallery.is_hovered(&a));
        assert_eq!(h.platform.log().pending_frames(&a), 0);

        h.gallery.set_active_panorama(&c).expect("activate c");
        assert_eq!(h.gallery.running_loops(), 1);
        assert_eq!(h.gallery.active_id(), Some(c));
        assert!(!h.gallery.is_hovered(&b));
    }

    #[test]
    fn reactivating_running_item_is_a_no_op() {
        let h = Harness::new(1);
        h.create_all(1);
        let (a, _, _) = ids();
        h.gallery.set_active_panorama(&a).expect("activate");
        h.gallery.set_active_panorama(&a).expect("again");
        assert_eq!(h.platform.log().pending_frames(&a), 1);
        assert_eq!(h.gallery.events().iter().filter(|e| e.kind == "activate").count(), 1);
    }

    #[test]
    fn deactivation_shows_emphasized_hint_then_relaxes() {
        let config = GalleryConfig {
            capture_delay_ms: 10_000,
            ..GalleryConfig::default()
        };
        let h = Harness::with_config(2, config);
        h.create_all(2);
        let (a, b, _) = ids();
        h.gallery.set_active_panorama(&a).expect("activate a");
        assert_eq!(h.platform.log().overlay_visible(&a, OverlayKind::Hint), Some(false));

        h.gallery.set_active_panorama(&b).expect("activate b");
        {
            let log = h.platform.log();
            assert_eq!(log.overlay_visible(&a, OverlayKind::Hint), Some(true));
            assert_eq!(log.overlay_emphasized(&a, OverlayKind::Hint), Some(true));
        }
        h.advance(1001.0);
        assert_eq!(h.platform.log().overlay_emphasized(&a, OverlayKind::Hint), Some(false));
    }

    #[test]
    fn missing_context_aborts_without_side_effects() {
        let h = Harness::new(2);
        h.create_all(1);
        let (a, b, _) = ids();
        h.gallery.set_active_panorama(&a).expect("activate a");

        h.platform.log_mut().hold_contexts = true;
        let pending = h.spawn_create("p1");
        h.run();
        assert!(pending.borrow().is_none());

        let err = h.gallery.set_active_panorama(&b).unwrap_err();
        assert_eq!(
            err,
            GalleryError::MissingResource {
                id: b.clone(),
                part: ResourcePart::Context
            }
        );
        assert_eq!(h.gallery.active_id(), Some(a.clone()));
        assert_eq!(h.gallery.running_loops(), 1);

        h.platform.release_contexts();
        h.run();
        assert_eq!(*pending.borrow(), Some(Ok(())));
        h.gallery.set_active_panorama(&b).expect("activate b once ready");
    }

    #[test]
    fn unknown_id_is_missing_resource() {
        let h = Harness::new(1);
        let err = h
            .gallery
            .set_active_panorama(&PanoramaId::from("nope"))
            .unwrap_err();
        assert!(matches!(
            err,
            GalleryError::MissingResource {
                part: ResourcePart::Resource,
                ..
            }
        ));
    }

    #[test]
    fn loop_stops_when_neither_hovered_nor_centered() {
        let h = Harness::new(2);
        h.create_all(2);
        let (a, _, _) = ids();
        h.gallery.set_active_panorama(&a).expect("activate");
        h.tick(16.0);
        assert_eq!(h.gallery.running_loops(), 1);

        // p0 is not centered in the viewport.
        h.gallery.pointer_up(&a);
        h.tick(16.0);
        assert_eq!(h.gallery.running_loops(), 0);
        assert_eq!(h.gallery.active_id(), None);
        assert_eq!(h.platform.log().overlay_visible(&a, OverlayKind::Hint), Some(true));
    }

    #[test]
    fn pointer_leave_keeps_centered_item_running() {
        let h = Harness::new(3);
        h.create_all(3);
        let (_, b, _) = ids();
        h.gallery.pointer_down(&b, [100.0, 100.0]).expect("activate");
        h.gallery.pointer_up(&b);
        h.tick(16.0);
        h.tick(16.0);
        assert_eq!(h.gallery.running_loops(), 1);
        assert_eq!(h.gallery.active_id(), Some(b));
    }

    #[test]
    fn stale_tick_is_ignored() {
        let h = Harness::new(2);
        h.create_all(2);
        let (a, b, _) = ids();
        h.gallery.set_active_panorama(&a).expect("activate a");
        let stale = h.platform.take_frames();
        h.gallery.set_active_panorama(&b).expect("activate b");
        let renders = h.platform.log().gpu.renders;

        let now = h.platform.now();
        for (id, req) in stale {
            h.gallery.handle_frame(&id, req, now);
        }
        assert_eq!(h.platform.log().gpu.renders, renders);
        assert_eq!(h.platform.log().pending_frames(&a), 0);
        assert_eq!(h.gallery.running_loops(), 1);
    }

    #[test]
    fn drag_rotates_camera_between_ticks() {
        let h = Harness::new(2);
        h.create_all(2);
        let (_, b, _) = ids();
        h.gallery.pointer_down(&b, [400.0, 200.0]).expect("activate");
        h.gallery.pointer_move(&b, [300.0, 200.0]);
        h.gallery.wheel(&b, 500.0);
        h.tick(16.0);

        let state = h.gallery.state();
        let res = state.registry.get(&b).expect("registered");
        let camera = res.camera.expect("camera");
        assert!(camera.position.x.abs() > 1e-6);
        assert!((camera.position.length() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn activate_first_picks_registration_order() {
        let h = Harness::new(3);
        h.create_blocking("p2").expect("create p2");
        h.create_blocking("p0").expect("create p0");
        h.gallery.activate_first().expect("activate first");
        assert_eq!(h.gallery.active_id(), Some(PanoramaId::from("p2")));
    }
}
