//! Outbound seams: everything the gallery needs from the host environment.
//!
//! Platform callbacks (intersection changes, animation frames, pointer input)
//! flow back in through the `Gallery::handle_*` methods; implementations must
//! not call into the gallery synchronously from inside one of these methods.

use foundation::time::Time;
use foundation::{PanoramaId, Rect};
use image::RgbaImage;
use runtime::FrameRequest;

pub use futures_util::future::LocalBoxFuture;

use crate::error::PlatformError;
use crate::scene::{Camera, Scene, TextureHandle};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObserverKind {
    /// One-shot; fires the high-res texture load.
    NearViewport,
    /// Long-lived; drives activation of centered items.
    Centering,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ObserverOptions {
    pub threshold: f64,
    pub root_margin_px: f64,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IntersectionEntry {
    pub is_intersecting: bool,
    pub ratio: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OverlayKind {
    /// "Drag to interact" hint shown over inactive items.
    Hint,
    /// "Capturing panorama..." shown while a snapshot is taken.
    Capture,
    /// Shown once a texture failed to load.
    Error,
}

/// Desired presentation of an overlay element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayView {
    pub text: String,
    pub visible: bool,
    /// Briefly darker background to draw attention.
    pub emphasized: bool,
}

impl OverlayView {
    pub fn hidden(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visible: false,
            emphasized: false,
        }
    }
}

/// Host environment: DOM, observers, scheduling, network and GPU creation.
pub trait Platform: 'static {
    /// Handle of a DOM node the gallery created.
    type Node: Clone + 'static;
    type Context: RenderContext;

    /// False during server-side or headless rendering; creation becomes a no-op.
    fn is_rendering_environment(&self) -> bool;
    /// Layout rect of the item container, `None` if it is not in the document.
    fn container_rect(&self, id: &PanoramaId) -> Option<Rect>;
    /// Layout rect of the scrolling viewport the items are centered in.
    fn viewport_rect(&self) -> Rect;
    fn window_width(&self) -> f64;

    /// Creates a rendering surface filling the container.
    fn create_surface(&self, id: &PanoramaId) -> Result<Self::Node, PlatformError>;
    fn create_overlay(
        &self,
        id: &PanoramaId,
        kind: OverlayKind,
        view: &OverlayView,
    ) -> Result<Self::Node, PlatformError>;
    fn update_overlay(&self, node: &Self::Node, view: &OverlayView);
    fn remove_node(&self, node: &Self::Node);

    fn create_context(
        &self,
        surface: &Self::Node,
        width: u32,
        height: u32,
    ) -> LocalBoxFuture<'static, Result<Self::Context, PlatformError>>;
    /// Fetches and decodes an image.
    fn fetch_image(&self, url: &str) -> LocalBoxFuture<'static, Result<RgbaImage, PlatformError>>;

    fn observe(&self, id: &PanoramaId, kind: ObserverKind, options: ObserverOptions);
    fn unobserve(&self, id: &PanoramaId, kind: ObserverKind);

    /// Schedules `Gallery::handle_frame(id, req, ..)` for the next display refresh.
    fn request_frame(&self, id: &PanoramaId, req: FrameRequest);
    fn cancel_frame(&self, id: &PanoramaId, req: FrameRequest);

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
    fn sleep(&self, ms: u32) -> LocalBoxFuture<'static, ()>;
    fn now(&self) -> Time;
}

/// Per-item GPU state bound to one rendering surface.
pub trait RenderContext: 'static {
    fn resize(&mut self, width: u32, height: u32);
    fn upload_texture(&mut self, image: &RgbaImage) -> Result<TextureHandle, PlatformError>;
    fn release_texture(&mut self, texture: TextureHandle);
    fn render(&mut self, scene: &Scene, camera: &Camera) -> Result<(), PlatformError>;
    /// Renders one frame off-screen and reads it back.
    fn capture_frame(
        &mut self,
        scene: &Scene,
        camera: &Camera,
    ) -> LocalBoxFuture<'static, Result<RgbaImage, PlatformError>>;
    /// Releases every GPU object. Further calls must be harmless.
    fn dispose(&mut self);
}
