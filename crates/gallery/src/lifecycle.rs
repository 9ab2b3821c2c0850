use foundation::{PanoramaId, Rect};
use streaming::LoadPhase;
use tracing::{debug, error, info, warn};

use crate::error::{GalleryError, PlatformError, ResourcePart};
use crate::gallery::Gallery;
use crate::manifest::PanoramaUrls;
use crate::orbit::{OrbitControls, OrbitController};
use crate::platform::{
    ObserverKind, ObserverOptions, OverlayKind, OverlayView, Platform, RenderContext,
};
use crate::resource::{CAPTURE_OVERLAY_TEXT, ERROR_OVERLAY_TEXT, InteractionHint, PanoramaResource};
use crate::scene::{Camera, Scene, SphereGeometry};

/// DOM nodes created for one item, removed again if setup fails halfway.
struct Nodes<N> {
    surface: N,
    hint: N,
    capture: N,
    error: N,
}

enum ContextOutcome {
    Ready,
    Destroyed,
    Failed(PlatformError),
}

impl<P: Platform> Gallery<P> {
    /// Creates the full resource bundle for `id` and shows its first frame.
    ///
    /// Resolves once the low-resolution texture has settled: either it is on
    /// screen or the flat fallback sphere is. Texture failures are reported
    /// through [`Gallery::error_state`], not as an error here.
    pub async fn create_panorama(
        &self,
        id: PanoramaId,
        urls: PanoramaUrls,
    ) -> Result<(), GalleryError> {
        let platform = self.platform();
        if !platform.is_rendering_environment() {
            debug!(panorama = %id, "not a rendering environment, skipping create");
            return Ok(());
        }
        let Some(rect) = platform.container_rect(&id) else {
            error!(panorama = %id, "container not found");
            return Err(GalleryError::NotFound { id });
        };
        if self.contains(&id) {
            debug!(panorama = %id, "already registered, recreating");
            self.destroy_panorama(&id);
        }

        let generation = self.register(&id, urls, rect)?;

        let context = {
            let state = self.state();
            let surface = state
                .registry
                .get(&id)
                .and_then(|r| r.surface.clone())
                .ok_or_else(|| GalleryError::MissingResource {
                    id: id.clone(),
                    part: ResourcePart::Surface,
                })?;
            let (w, h) = rect.pixel_size();
            platform.create_context(&surface, w, h)
        };
        let context = context.await;

        let outcome = {
            let mut state = self.state();
            match (state.registry.get_live_mut(&id, generation), context) {
                (Some(res), Ok(ctx)) => {
                    res.context = Some(ctx);
                    ContextOutcome::Ready
                }
                (None, Ok(mut ctx)) => {
                    ctx.dispose();
                    ContextOutcome::Destroyed
                }
                (None, Err(_)) => ContextOutcome::Destroyed,
                (Some(_), Err(err)) => ContextOutcome::Failed(err),
            }
        };
        match outcome {
            ContextOutcome::Ready => {}
            ContextOutcome::Destroyed => {
                debug!(panorama = %id, "destroyed while its context was initializing");
                return Ok(());
            }
            ContextOutcome::Failed(err) => {
                error!(panorama = %id, "render context creation failed: {err}");
                self.destroy_panorama(&id);
                return Err(GalleryError::MissingResource {
                    id,
                    part: ResourcePart::Context,
                });
            }
        }

        self.load_texture(&id, generation, LoadPhase::Tiny).await;
        self.watch_near_viewport(&id, generation);
        info!(panorama = %id, "created");
        Ok(())
    }

    /// Releases everything held for `id`. Unknown ids are ignored.
    pub fn destroy_panorama(&self, id: &PanoramaId) {
        let released = {
            let mut state = self.state();
            let Some(mut res) = state.registry.remove(id) else {
                debug!(panorama = %id, "destroy: not registered");
                return;
            };
            if state.active.as_ref() == Some(id) {
                state.active = None;
            }
            res.release(self.platform());
            state.events.emit("destroy", Some(id.as_str()), "released");
            res
        };
        if released.loading.get() {
            released.loading.set(false);
        }
        info!(panorama = %id, "destroyed");
    }

    /// Synchronous part of creation: DOM nodes, scene, camera, controls,
    /// centering observer. Returns the new resource's generation.
    fn register(&self, id: &PanoramaId, urls: PanoramaUrls, rect: Rect) -> Result<u64, GalleryError> {
        let platform = self.platform();
        let cfg = self.config();
        let hint = InteractionHint::new(self.interaction_mode());

        let nodes = self.create_nodes(id, &hint).map_err(|err| {
            warn!(panorama = %id, "could not attach to container: {err}");
            GalleryError::NotFound { id: id.clone() }
        })?;

        let camera = Camera::perspective(&cfg.camera, rect.aspect());
        let mut controls = OrbitControls::new(&camera, &cfg.controls);
        controls.set_zoom_enabled(cfg.controls.enable_zoom);
        controls.set_pan_enabled(cfg.controls.enable_pan);
        controls.set_rotate_speed(cfg.controls.rotate_speed);
        controls.set_viewport(rect.width, rect.height);

        let mut state = self.state();
        let generation = state.registry.next_generation();
        let mut res = PanoramaResource::new(
            id.clone(),
            generation,
            urls,
            SphereGeometry::inverted(&cfg.sphere),
            hint.mode,
        );
        res.hint = hint;
        res.scene = Some(Scene::new());
        res.camera = Some(camera);
        res.controls = Some(controls);
        res.surface = Some(nodes.surface);
        res.hint_node = Some(nodes.hint);
        res.capture_node = Some(nodes.capture);
        res.error_node = Some(nodes.error);

        platform.observe(
            id,
            ObserverKind::Centering,
            ObserverOptions {
                threshold: cfg.center_threshold,
                root_margin_px: 0.0,
            },
        );
        res.observers.push(ObserverKind::Centering);

        state.registry.insert(res);
        state
            .events
            .emit("create", Some(id.as_str()), format!("generation {generation}"));
        Ok(generation)
    }

    fn create_nodes(&self, id: &PanoramaId, hint: &InteractionHint) -> Result<Nodes<P::Node>, PlatformError> {
        let mut created = Vec::new();
        let result = self.try_create_nodes(id, hint, &mut created);
        if result.is_err() {
            for node in &created {
                self.platform().remove_node(node);
            }
        }
        result
    }

    fn try_create_nodes(
        &self,
        id: &PanoramaId,
        hint: &InteractionHint,
        created: &mut Vec<P::Node>,
    ) -> Result<Nodes<P::Node>, PlatformError> {
        let platform = self.platform();
        let surface = platform.create_surface(id)?;
        created.push(surface.clone());
        let hint = platform.create_overlay(id, OverlayKind::Hint, &hint.view(platform.now()))?;
        created.push(hint.clone());
        let capture = platform.create_overlay(
            id,
            OverlayKind::Capture,
            &OverlayView::hidden(CAPTURE_OVERLAY_TEXT),
        )?;
        created.push(capture.clone());
        let error = platform.create_overlay(
            id,
            OverlayKind::Error,
            &OverlayView::hidden(ERROR_OVERLAY_TEXT),
        )?;
        Ok(Nodes {
            surface,
            hint,
            capture,
            error,
        })
    }

    /// Registers the one-shot observer that starts the high-res load.
    fn watch_near_viewport(&self, id: &PanoramaId, generation: u64) {
        let cfg = self.config();
        let mut state = self.state();
        let Some(res) = state.registry.get_live_mut(id, generation) else {
            return;
        };
        if res.high_requested || res.observers.contains(&ObserverKind::NearViewport) {
            return;
        }
        self.platform().observe(
            id,
            ObserverKind::NearViewport,
            ObserverOptions {
                threshold: cfg.near_threshold,
                root_margin_px: cfg.near_margin_px,
            },
        );
        res.observers.push(ObserverKind::NearViewport);
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{GalleryError, ResourcePart};
    use crate::platform::{ObserverKind, OverlayKind};
    use crate::testing::{FetchMode, Harness};
    use foundation::PanoramaId;
    use pretty_assertions::assert_eq;
    use streaming::TextureState;

    #[test]
    fn create_shows_tiny_texture_before_resolving() {
        let h = Harness::new(3);
        let id = PanoramaId::from("p0");
        h.create_blocking("p0").expect("create");

        assert_eq!(h.gallery.texture_state(&id), Some(TextureState::TinyLoaded));
        let log = h.platform.log();
        assert_eq!(log.gpu.uploads, 1);
        assert!(log.gpu.renders >= 1);
        assert!(log.observing(&id, ObserverKind::Centering));
        assert!(log.observing(&id, ObserverKind::NearViewport));
        assert_eq!(log.overlay_text(&id, OverlayKind::Hint).as_deref(), Some("Drag to interact"));
    }

    #[test]
    fn missing_container_is_not_found_and_registers_nothing() {
        let h = Harness::new(1);
        let err = h.create_blocking("ghost").unwrap_err();
        assert_eq!(
            err,
            GalleryError::NotFound {
                id: PanoramaId::from("ghost")
            }
        );
        assert!(h.gallery.is_empty());
        assert_eq!(h.platform.log().live_nodes(), 0);
    }

    #[test]
    fn non_rendering_environment_is_a_silent_no_op() {
        let h = Harness::new(1);
        h.platform.log_mut().rendering = false;
        h.create_blocking("p0").expect("no-op");
        assert!(h.gallery.is_empty());
        assert_eq!(h.platform.log().live_nodes(), 0);
    }

    #[test]
    fn destroy_during_tiny_load_ignores_late_result() {
        let h = Harness::new(1);
        let id = PanoramaId::from("p0");
        h.platform.set_fetch("tiny-0", FetchMode::Hold);
        let result = h.spawn_create("p0");
        h.run();
        assert!(result.borrow().is_none());

        h.gallery.destroy_panorama(&id);
        h.gallery.destroy_panorama(&id);
        h.platform.release_fetch("tiny-0");
        h.run();

        assert_eq!(*result.borrow(), Some(Ok(())));
        assert!(!h.gallery.contains(&id));
        let log = h.platform.log();
        let gpu = &log.gpu;
        assert_eq!(gpu.uploads, 0);
        assert_eq!(gpu.disposed, 1);
        assert_eq!(log.live_nodes(), 0);
        assert!(!log.observing(&id, ObserverKind::Centering));
    }

    #[test]
    fn double_destroy_disposes_once() {
        let h = Harness::new(2);
        let id = PanoramaId::from("p1");
        h.create_blocking("p1").expect("create");
        h.gallery.destroy_panorama(&id);
        h.gallery.destroy_panorama(&id);
        let log = h.platform.log();
        let gpu = &log.gpu;
        assert_eq!(gpu.disposed, 1);
        assert_eq!(gpu.released, 1);
        assert_eq!(gpu.live_textures, 0);
        assert_eq!(log.live_nodes(), 0);
    }

    #[test]
    fn destroying_active_item_cancels_its_loop_and_capture() {
        let h = Harness::new(3);
        h.create_all(3);
        let id = PanoramaId::from("p0");
        h.gallery.set_active_panorama(&id).expect("activate");
        assert_eq!(h.platform.log().pending_frames(&id), 1);

        h.gallery.destroy_panorama(&id);
        assert_eq!(h.platform.log().pending_frames(&id), 0);
        assert_eq!(h.gallery.active_id(), None);
        assert_eq!(h.gallery.running_loops(), 0);

        h.tick(16.0);
        h.advance(2000.0);
        assert_eq!(h.platform.log().gpu.captures, 0);
        assert!(!h.gallery.contains(&id));
    }

    #[test]
    fn destroy_during_high_load_drops_the_late_texture() {
        let h = Harness::new(1);
        let id = PanoramaId::from("p0");
        h.platform.set_fetch("high-0", FetchMode::Hold);
        h.create_blocking("p0").expect("create");
        h.gallery
            .handle_intersection(&id, ObserverKind::NearViewport, h.entry(true, 0.2));
        h.run();
        assert_eq!(h.gallery.texture_state(&id), Some(TextureState::HighLoading));

        h.gallery.destroy_panorama(&id);
        h.platform.release_fetch("high-0");
        h.run();

        let log = h.platform.log();
        assert_eq!(log.gpu.uploads, 1);
        assert_eq!(log.gpu.live_textures, 0);
        assert_eq!(log.live_nodes(), 0);
    }

    #[test]
    fn bad_tiny_url_falls_back_to_flat_sphere() {
        let h = Harness::new(3);
        let id = PanoramaId::from("p2");
        h.platform.set_fetch("tiny-2", FetchMode::Fail);
        h.platform.set_fetch("high-2", FetchMode::Fail);
        h.create_blocking("p2").expect("create resolves despite texture failure");

        assert!(h.gallery.error_state(&id).get());
        assert_eq!(h.gallery.texture_state(&id), Some(TextureState::TinyFallback));
        assert_eq!(h.platform.log().gpu.last_render_color, Some(0xff0000));
        assert_eq!(h.platform.log().overlay_visible(&id, OverlayKind::Error), Some(true));

        h.gallery.handle_intersection(&id, ObserverKind::NearViewport, h.entry(true, 0.5));
        h.run();
        assert_eq!(h.gallery.texture_state(&id), Some(TextureState::HighFailed));
        // Still the fallback, never blank.
        assert_eq!(h.platform.log().gpu.last_render_color, Some(0xff0000));
    }

    #[test]
    fn recreate_resets_capture_state_and_generation() {
        let h = Harness::new(2);
        let id = PanoramaId::from("p0");
        h.create_blocking("p0").expect("create");
        if let Some(res) = h.gallery.state().registry.get_mut(&id) {
            res.captured = true;
        }
        h.create_blocking("p0").expect("recreate");
        assert!(!h.gallery.is_captured(&id));
        assert_eq!(h.gallery.len(), 1);
        assert_eq!(h.platform.log().gpu.disposed, 1);
    }

    #[test]
    fn context_failure_reports_missing_context_and_cleans_up() {
        let h = Harness::new(1);
        h.platform.log_mut().fail_contexts = true;
        let err = h.create_blocking("p0").unwrap_err();
        assert_eq!(
            err,
            GalleryError::MissingResource {
                id: PanoramaId::from("p0"),
                part: ResourcePart::Context
            }
        );
        assert!(h.gallery.is_empty());
        assert_eq!(h.platform.log().live_nodes(), 0);
    }
}
