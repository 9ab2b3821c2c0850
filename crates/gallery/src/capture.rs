//! Snapshot capture for inactive items next to the active one.
//!
//! Each capture renders one frame, reads it back, encodes it as JPEG and then
//! shrinks it to a small placeholder. Items are handled one at a time.

use foundation::PanoramaId;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageFormat, RgbaImage};
use tracing::{debug, info, warn};

use crate::error::{PlatformError, ResourcePart};
use crate::gallery::Gallery;
use crate::platform::{Platform, RenderContext};
use crate::resource::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    MissingResource(ResourcePart),
    Render(PlatformError),
    Readback(PlatformError),
    Encode(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::MissingResource(part) => write!(f, "missing {part}"),
            CaptureError::Render(err) => write!(f, "render failed: {err}"),
            CaptureError::Readback(err) => write!(f, "readback failed: {err}"),
            CaptureError::Encode(reason) => write!(f, "encode failed: {reason}"),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Largest size with the aspect of `width x height` that fits the bounds.
/// Never upscales.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let scale = (max_width as f64 / width as f64)
        .min(max_height as f64 / height as f64)
        .min(1.0);
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|err| CaptureError::Encode(err.to_string()))?;
    Ok(out)
}

/// Decodes `jpeg`, downscales it to fit the bounds and re-encodes it.
pub fn compress_snapshot(
    jpeg: &[u8],
    max_width: u32,
    max_height: u32,
    quality: u8,
) -> Result<Snapshot, CaptureError> {
    let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
        .map_err(|err| CaptureError::Encode(format!("re-decode: {err}")))?
        .into_rgba8();
    let (w, h) = fit_within(decoded.width(), decoded.height(), max_width, max_height);
    let resized = if (w, h) == decoded.dimensions() {
        decoded
    } else {
        imageops::resize(&decoded, w, h, FilterType::Triangle)
    };
    Ok(Snapshot {
        jpeg: encode_jpeg(&resized, quality)?,
        width: w,
        height: h,
    })
}

impl<P: Platform> Gallery<P> {
    /// Captures up to `capture_before` preceding and `capture_after`
    /// following items of `active`, skipping those already captured.
    /// Failures are logged per item and do not stop the batch.
    pub async fn capture_next(&self, active: &PanoramaId) {
        let cfg = self.config();
        let targets = self
            .state()
            .registry
            .neighbors(active, cfg.capture_before, cfg.capture_after);
        debug!(panorama = %active, targets = targets.len(), "capturing neighbors");
        for id in targets {
            if &id == active {
                continue;
            }
            match self.capture_one(&id).await {
                Ok(true) => info!(panorama = %id, "captured"),
                Ok(false) => {}
                Err(err) => warn!(panorama = %id, "capture failed: {err}"),
            }
        }
    }

    /// Returns `Ok(false)` when the item was skipped or vanished mid-capture.
    async fn capture_one(&self, id: &PanoramaId) -> Result<bool, CaptureError> {
        let platform = self.platform();
        let cfg = self.config();

        let (generation, loading, readback) = {
            let mut state = self.state();
            let Some(res) = state.registry.get_mut(id) else {
                return Ok(false);
            };
            if res.captured || res.capturing {
                return Ok(false);
            }
            if let Some(part) = res.missing_part() {
                return Err(CaptureError::MissingResource(part));
            }
            let readback = match (res.context.as_mut(), res.scene.as_ref(), res.camera.as_ref()) {
                (Some(ctx), Some(scene), Some(camera)) => {
                    ctx.render(scene, camera).map_err(CaptureError::Render)?;
                    ctx.capture_frame(scene, camera)
                }
                _ => return Err(CaptureError::MissingResource(ResourcePart::Context)),
            };
            res.capturing = true;
            res.set_capture_overlay(platform, true);
            (res.generation, res.loading.clone(), readback)
        };
        loading.set(true);

        let result = match readback.await {
            Ok(frame) => encode_jpeg(&frame, cfg.capture_quality).map(|jpeg| {
                compress_snapshot(
                    &jpeg,
                    cfg.thumbnail_max_width,
                    cfg.thumbnail_max_height,
                    cfg.thumbnail_quality,
                )
                .unwrap_or_else(|err| {
                    debug!(panorama = %id, "keeping first-pass snapshot: {err}");
                    Snapshot {
                        jpeg,
                        width: frame.width(),
                        height: frame.height(),
                    }
                })
            }),
            Err(err) => Err(CaptureError::Readback(err)),
        };

        // Cleanup runs whatever the outcome.
        let captured = {
            let mut guard = self.state();
            let state = &mut *guard;
            match state.registry.get_live_mut(id, generation) {
                None => {
                    debug!(panorama = %id, "destroyed during capture, snapshot dropped");
                    false
                }
                Some(res) => {
                    res.capturing = false;
                    res.set_capture_overlay(platform, false);
                    match &result {
                        Ok(snapshot) => {
                            res.captured = true;
                            res.snapshot = Some(snapshot.clone());
                            res.hint.captured = true;
                            res.hint.emphasized_until = Some(
                                platform
                                    .now()
                                    .add_millis(cfg.overlay_emphasis_ms as f64),
                            );
                            res.refresh_hint(platform);
                            state.events.emit(
                                "capture",
                                Some(id.as_str()),
                                format!(
                                    "{}x{}, {} bytes",
                                    snapshot.width,
                                    snapshot.height,
                                    snapshot.jpeg.len()
                                ),
                            );
                            true
                        }
                        Err(_) => false,
                    }
                }
            }
        };
        if loading.get() {
            loading.set(false);
        }
        if captured {
            self.schedule_hint_refresh(id, generation, cfg.overlay_emphasis_ms);
        }
        result.map(|_| captured)
    }
}
