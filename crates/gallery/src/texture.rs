//! Progressive texture loading: a low-resolution image first, the full one
//! once the item comes near the viewport.

use foundation::PanoramaId;
use image::RgbaImage;
use streaming::{LoadPhase, TextureState};
use tracing::{debug, warn};

use crate::error::TextureLoadError;
use crate::gallery::Gallery;
use crate::platform::{Platform, RenderContext};
use crate::resource::PanoramaResource;
use crate::scene::Scene;

fn loaded_state(phase: LoadPhase) -> TextureState {
    match phase {
        LoadPhase::Tiny => TextureState::TinyLoaded,
        LoadPhase::High => TextureState::HighLoaded,
    }
}

fn failed_state(phase: LoadPhase) -> TextureState {
    match phase {
        LoadPhase::Tiny => TextureState::TinyFallback,
        LoadPhase::High => TextureState::HighFailed,
    }
}

fn phase_name(phase: LoadPhase) -> &'static str {
    match phase {
        LoadPhase::Tiny => "tiny",
        LoadPhase::High => "high",
    }
}

enum Applied {
    Shown,
    /// A better texture is already on screen.
    Superseded,
    Failed(TextureLoadError),
}

/// Uploads `image` and maps it onto the sphere, releasing the texture it replaces.
fn apply_texture<P: Platform>(
    res: &mut PanoramaResource<P>,
    image: &RgbaImage,
    phase: LoadPhase,
    url: &str,
) -> Applied {
    let target = loaded_state(phase);
    if target.rank() <= res.residency.state().rank() {
        return Applied::Superseded;
    }
    let failed = |reason: String| {
        Applied::Failed(TextureLoadError {
            url: url.to_string(),
            reason,
        })
    };
    let Some(ctx) = res.context.as_mut() else {
        return failed("render context not ready".into());
    };
    let handle = match ctx.upload_texture(image) {
        Ok(handle) => handle,
        Err(err) => return failed(err.message),
    };
    let scene = res.scene.get_or_insert_with(Scene::new);
    if let Some(old) = scene.set_texture(handle, res.geometry) {
        ctx.release_texture(old);
    }
    if let Err(err) = res.residency.advance(target) {
        debug!(panorama = %res.id, "{err}");
    }
    res.present();
    Applied::Shown
}

/// Keeps something visible after a failed load: the texture already shown,
/// or the flat fallback sphere if there is none.
fn apply_failure<P: Platform>(
    res: &mut PanoramaResource<P>,
    platform: &P,
    err: TextureLoadError,
    phase: LoadPhase,
    fallback_color: u32,
) {
    warn!(panorama = %res.id, "{err}");
    if let Err(regression) = res.residency.advance(failed_state(phase)) {
        debug!(panorama = %res.id, "{regression}");
    }
    let geometry = res.geometry;
    if let Some(scene) = res.scene.as_mut() {
        if scene.ensure_fallback(fallback_color, geometry) {
            debug!(panorama = %res.id, "showing fallback sphere");
        }
    }
    res.last_error = Some(err);
    res.set_error_overlay(platform, true);
    res.present();
}

impl<P: Platform> Gallery<P> {
    /// Fetches and applies one texture phase for the resource instance
    /// `(id, generation)`. Always settles; results for a destroyed or
    /// recreated instance are dropped.
    pub(crate) async fn load_texture(&self, id: &PanoramaId, generation: u64, phase: LoadPhase) {
        let platform = self.platform();
        let (req, url, fetch) = {
            let mut state = self.state();
            let Some(res) = state.registry.get_live_mut(id, generation) else {
                return;
            };
            if phase == LoadPhase::High && res.residency.advance(TextureState::HighLoading).is_err() {
                debug!(panorama = %id, "high-res load already started");
                return;
            }
            let url = match phase {
                LoadPhase::Tiny => res.urls.tiny.clone(),
                LoadPhase::High => res.urls.high.clone(),
            };
            let req = state.registry.loads.issue(id.clone(), phase);
            let fetch = platform.fetch_image(&url);
            (req, url, fetch)
        };
        debug!(panorama = %id, phase = phase_name(phase), url = %url, "texture requested");

        let fetched = fetch.await;

        let error_cell = {
            let mut state = self.state();
            if state.registry.loads.complete(req).is_none() {
                debug!(panorama = %id, phase = phase_name(phase), "stale texture dropped");
                return;
            }
            let fallback_color = self.config().fallback_color;
            let gallery_state = &mut *state;
            let Some(res) = gallery_state.registry.get_live_mut(id, generation) else {
                return;
            };
            let outcome = match fetched {
                Ok(image) => apply_texture(res, &image, phase, &url),
                Err(err) => Applied::Failed(TextureLoadError {
                    url: url.clone(),
                    reason: err.message,
                }),
            };
            match outcome {
                Applied::Shown => {
                    gallery_state
                        .events
                        .emit("texture", Some(id.as_str()), phase_name(phase));
                    None
                }
                Applied::Superseded => {
                    debug!(panorama = %id, phase = phase_name(phase), "texture superseded");
                    None
                }
                Applied::Failed(err) => {
                    let message = err.to_string();
                    apply_failure(res, platform, err, phase, fallback_color);
                    let cell = res.error.clone();
                    gallery_state
                        .events
                        .emit("texture_error", Some(id.as_str()), message);
                    Some(cell)
                }
            }
        };
        // Subscribers may call back into the gallery.
        if let Some(cell) = error_cell {
            cell.set(true);
        }
    }

    /// Starts the high-res load for `id` in the background.
    pub(crate) fn spawn_high_load(&self, id: &PanoramaId, generation: u64) {
        let gallery = self.clone();
        let id = id.clone();
        self.platform().spawn_local(Box::pin(async move {
            gallery.load_texture(&id, generation, LoadPhase::High).await;
        }));
    }
}
