use foundation::time::Time;
use foundation::PanoramaId;
use runtime::{Frame, FrameLoop, ReplayCell};
use streaming::TextureResidency;
use tracing::debug;

use crate::error::{ResourcePart, TextureLoadError};
use crate::manifest::PanoramaUrls;
use crate::orbit::{OrbitControls, OrbitController};
use crate::platform::{ObserverKind, OverlayView, Platform, RenderContext};
use crate::scene::{Camera, Scene, SphereGeometry};

pub const CAPTURE_OVERLAY_TEXT: &str = "Capturing panorama...";
pub const ERROR_OVERLAY_TEXT: &str = "Error loading panorama";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InteractionMode {
    Pointer,
    Touch,
}

impl InteractionMode {
    pub fn for_width(width_px: f64, breakpoint_px: f64) -> Self {
        if width_px >= breakpoint_px {
            InteractionMode::Pointer
        } else {
            InteractionMode::Touch
        }
    }

    pub fn hint_text(self) -> &'static str {
        match self {
            InteractionMode::Pointer => "Drag to interact",
            InteractionMode::Touch => "Touch to interact",
        }
    }
}

/// Model of the hint overlay shown over items that are not interactive.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionHint {
    pub mode: InteractionMode,
    pub captured: bool,
    pub visible: bool,
    pub emphasized_until: Option<Time>,
}

impl InteractionHint {
    pub fn new(mode: InteractionMode) -> Self {
        Self {
            mode,
            captured: false,
            visible: true,
            emphasized_until: None,
        }
    }

    pub fn text(&self) -> String {
        if self.captured {
            format!("Static view - {}", self.mode.hint_text())
        } else {
            self.mode.hint_text().to_string()
        }
    }

    pub fn view(&self, now: Time) -> OverlayView {
        OverlayView {
            text: self.text(),
            visible: self.visible,
            emphasized: self.emphasized_until.is_some_and(|t| now < t),
        }
    }
}

/// Compressed still image of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Everything the gallery owns for one item.
///
/// Optional parts are filled during `create` (the context only after its
/// asynchronous initialization) and emptied one by one in [`release`].
///
/// [`release`]: PanoramaResource::release
pub struct PanoramaResource<P: Platform> {
    pub id: PanoramaId,
    /// Distinguishes this resource from an earlier one with the same id.
    pub generation: u64,
    pub urls: PanoramaUrls,
    pub geometry: SphereGeometry,

    pub scene: Option<Scene>,
    pub camera: Option<Camera>,
    pub context: Option<P::Context>,
    pub controls: Option<OrbitControls>,
    pub surface: Option<P::Node>,
    pub hint_node: Option<P::Node>,
    pub capture_node: Option<P::Node>,
    pub error_node: Option<P::Node>,

    pub residency: TextureResidency,
    pub high_requested: bool,
    pub observers: Vec<ObserverKind>,

    pub frame_loop: FrameLoop,
    pub frame: Option<Frame>,
    pub hovered: bool,
    pub centered: bool,

    pub captured: bool,
    pub capturing: bool,
    pub snapshot: Option<Snapshot>,
    pub loading: ReplayCell<bool>,
    pub error: ReplayCell<bool>,
    pub last_error: Option<TextureLoadError>,
    pub hint: InteractionHint,
}

impl<P: Platform> PanoramaResource<P> {
    pub fn new(
        id: PanoramaId,
        generation: u64,
        urls: PanoramaUrls,
        geometry: SphereGeometry,
        mode: InteractionMode,
    ) -> Self {
        Self {
            id,
            generation,
            urls,
            geometry,
            scene: None,
            camera: None,
            context: None,
            controls: None,
            surface: None,
            hint_node: None,
            capture_node: None,
            error_node: None,
            residency: TextureResidency::new(),
            high_requested: false,
            observers: Vec::new(),
            frame_loop: FrameLoop::new(),
            frame: None,
            hovered: false,
            centered: false,
            captured: false,
            capturing: false,
            snapshot: None,
            loading: ReplayCell::new(false),
            error: ReplayCell::new(false),
            last_error: None,
            hint: InteractionHint::new(mode),
        }
    }

    /// First part needed for rendering that is absent, if any.
    pub fn missing_part(&self) -> Option<ResourcePart> {
        if self.scene.is_none() {
            Some(ResourcePart::Scene)
        } else if self.camera.is_none() {
            Some(ResourcePart::Camera)
        } else if self.context.is_none() {
            Some(ResourcePart::Context)
        } else if self.controls.is_none() {
            Some(ResourcePart::Controls)
        } else if self.surface.is_none() {
            Some(ResourcePart::Surface)
        } else {
            None
        }
    }

    pub fn is_running(&self) -> bool {
        self.frame_loop.is_running()
    }

    pub fn refresh_hint(&self, platform: &P) {
        if let Some(node) = &self.hint_node {
            platform.update_overlay(node, &self.hint.view(platform.now()));
        }
    }

    pub fn set_capture_overlay(&self, platform: &P, visible: bool) {
        if let Some(node) = &self.capture_node {
            let mut view = OverlayView::hidden(CAPTURE_OVERLAY_TEXT);
            view.visible = visible;
            platform.update_overlay(node, &view);
        }
    }

    pub fn set_error_overlay(&self, platform: &P, visible: bool) {
        if let Some(node) = &self.error_node {
            let mut view = OverlayView::hidden(ERROR_OVERLAY_TEXT);
            view.visible = visible;
            platform.update_overlay(node, &view);
        }
    }

    /// Renders one frame outside the render loop, e.g. after a texture change.
    pub fn present(&mut self) {
        if let (Some(ctx), Some(scene), Some(camera)) =
            (self.context.as_mut(), self.scene.as_ref(), self.camera.as_ref())
        {
            if let Err(err) = ctx.render(scene, camera) {
                debug!(panorama = %self.id, "present failed: {err}");
            }
        }
    }

    /// Releases every platform and GPU object this resource holds.
    ///
    /// Each part is taken out of its slot before it is released, so calling
    /// this twice releases nothing the second time.
    pub fn release(&mut self, platform: &P) {
        if let Some(req) = self.frame_loop.cancel() {
            platform.cancel_frame(&self.id, req);
        }
        for kind in self.observers.drain(..) {
            platform.unobserve(&self.id, kind);
        }

        if let Some(mut ctx) = self.context.take() {
            if let Some(texture) = self.scene.as_ref().and_then(Scene::texture) {
                ctx.release_texture(texture);
            }
            ctx.dispose();
        }
        self.scene = None;
        self.camera = None;
        if let Some(mut controls) = self.controls.take() {
            controls.dispose();
        }

        for node in [
            self.surface.take(),
            self.hint_node.take(),
            self.capture_node.take(),
            self.error_node.take(),
        ]
        .into_iter()
        .flatten()
        {
            platform.remove_node(&node);
        }

        self.hovered = false;
        self.centered = false;
        self.frame = None;
        self.snapshot = None;
    }
}
