//! Headless platform and a small harness driving it, for unit tests.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::Rc;

use foundation::time::Time;
use foundation::{HandleSlots, PanoramaId, Rect};
use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use image::{Rgba, RgbaImage};
use runtime::FrameRequest;

use crate::config::GalleryConfig;
use crate::error::{GalleryError, PlatformError};
use crate::gallery::Gallery;
use crate::manifest::PanoramaUrls;
use crate::platform::{
    IntersectionEntry, LocalBoxFuture, ObserverKind, ObserverOptions, OverlayKind, OverlayView,
    Platform, RenderContext,
};
use crate::scene::{Camera, Material, Scene, TextureHandle};

pub(crate) const ITEM_HEIGHT: f64 = 400.0;
pub(crate) const ITEM_STRIDE: f64 = 420.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum FetchMode {
    Image,
    Fail,
    /// Parked until [`HeadlessPlatform::release_fetch`].
    Hold,
}

#[derive(Debug, Default)]
pub(crate) struct GpuLog {
    pub contexts: usize,
    pub uploads: usize,
    pub released: usize,
    pub live_textures: usize,
    pub renders: usize,
    pub disposed: usize,
    pub captures: usize,
    /// Flat color of the last rendered mesh; `None` when textured or empty.
    pub last_render_color: Option<u32>,
    pub last_render_texture: Option<TextureHandle>,
}

#[derive(Debug)]
pub(crate) struct NodeRecord {
    pub owner: PanoramaId,
    pub kind: Option<OverlayKind>,
    pub view: Option<OverlayView>,
}

type HeldFetch = (String, oneshot::Sender<Result<RgbaImage, PlatformError>>);
type HeldContext = oneshot::Sender<Result<HeadlessContext, PlatformError>>;

pub(crate) struct HeadlessLog {
    pub containers: BTreeMap<PanoramaId, Rect>,
    pub viewport: Rect,
    pub window_width: f64,
    pub rendering: bool,
    pub fail_contexts: bool,
    pub hold_contexts: bool,
    pub fail_captures: bool,
    pub nodes: BTreeMap<u32, NodeRecord>,
    next_node: u32,
    pub observers: BTreeMap<(PanoramaId, ObserverKind), ObserverOptions>,
    pub frames: Vec<(PanoramaId, FrameRequest)>,
    pub cancelled: Vec<(PanoramaId, FrameRequest)>,
    fetch: BTreeMap<String, FetchMode>,
    held_fetches: Vec<HeldFetch>,
    held_contexts: Vec<HeldContext>,
    timers: Vec<(Time, oneshot::Sender<()>)>,
    pub now: Time,
    pub gpu: GpuLog,
}

impl HeadlessLog {
    fn new() -> Self {
        Self {
            containers: BTreeMap::new(),
            viewport: Rect::new(0.0, 0.0, 800.0, 1040.0),
            window_width: 1280.0,
            rendering: true,
            fail_contexts: false,
            hold_contexts: false,
            fail_captures: false,
            nodes: BTreeMap::new(),
            next_node: 1,
            observers: BTreeMap::new(),
            frames: Vec::new(),
            cancelled: Vec::new(),
            fetch: BTreeMap::new(),
            held_fetches: Vec::new(),
            held_contexts: Vec::new(),
            timers: Vec::new(),
            now: Time::ZERO,
            gpu: GpuLog::default(),
        }
    }

    pub fn observing(&self, id: &PanoramaId, kind: ObserverKind) -> bool {
        self.observers.contains_key(&(id.clone(), kind))
    }

    fn overlay(&self, id: &PanoramaId, kind: OverlayKind) -> Option<&OverlayView> {
        self.nodes
            .values()
            .find(|n| &n.owner == id && n.kind == Some(kind))
            .and_then(|n| n.view.as_ref())
    }

    pub fn overlay_text(&self, id: &PanoramaId, kind: OverlayKind) -> Option<String> {
        self.overlay(id, kind).map(|v| v.text.clone())
    }

    pub fn overlay_visible(&self, id: &PanoramaId, kind: OverlayKind) -> Option<bool> {
        self.overlay(id, kind).map(|v| v.visible)
    }

    pub fn overlay_emphasized(&self, id: &PanoramaId, kind: OverlayKind) -> Option<bool> {
        self.overlay(id, kind).map(|v| v.emphasized)
    }

    pub fn live_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn pending_frames(&self, id: &PanoramaId) -> usize {
        self.frames.iter().filter(|(owner, _)| owner == id).count()
    }

    fn add_node(&mut self, owner: &PanoramaId, kind: Option<OverlayKind>, view: Option<OverlayView>) -> u32 {
        let node = self.next_node;
        self.next_node += 1;
        self.nodes.insert(
            node,
            NodeRecord {
                owner: owner.clone(),
                kind,
                view,
            },
        );
        node
    }
}

fn test_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 7) as u8, (y * 11) as u8, 180, 255])
    })
}

#[derive(Clone)]
pub(crate) struct HeadlessPlatform {
    log: Rc<RefCell<HeadlessLog>>,
    spawner: LocalSpawner,
}

impl HeadlessPlatform {
    pub fn new(spawner: LocalSpawner) -> Self {
        Self {
            log: Rc::new(RefCell::new(HeadlessLog::new())),
            spawner,
        }
    }

    pub fn log(&self) -> Ref<'_, HeadlessLog> {
        self.log.borrow()
    }

    pub fn log_mut(&self) -> RefMut<'_, HeadlessLog> {
        self.log.borrow_mut()
    }

    pub fn set_fetch(&self, url: &str, mode: FetchMode) {
        self.log_mut().fetch.insert(url.to_string(), mode);
    }

    /// Completes every parked fetch of `url` with an image.
    pub fn release_fetch(&self, url: &str) {
        let held = {
            let mut log = self.log_mut();
            log.fetch.remove(url);
            let (matching, rest): (Vec<_>, Vec<_>) =
                log.held_fetches.drain(..).partition(|(u, _)| u == url);
            log.held_fetches = rest;
            matching
        };
        for (_, tx) in held {
            let _ = tx.send(Ok(test_image(8, 4)));
        }
    }

    /// Completes every parked context creation.
    pub fn release_contexts(&self) {
        let held: Vec<_> = {
            let mut log = self.log_mut();
            log.hold_contexts = false;
            log.held_contexts.drain(..).collect()
        };
        for tx in held {
            let _ = tx.send(Ok(HeadlessContext::new(Rc::clone(&self.log))));
        }
    }

    /// Moves the virtual clock forward, firing due timers.
    pub fn advance(&self, ms: f64) {
        let due = {
            let mut log = self.log_mut();
            log.now = log.now.add_millis(ms);
            let now = log.now;
            let (due, rest): (Vec<_>, Vec<_>) =
                log.timers.drain(..).partition(|(deadline, _)| *deadline <= now);
            log.timers = rest;
            due
        };
        for (_, tx) in due {
            let _ = tx.send(());
        }
    }

    pub fn take_frames(&self) -> Vec<(PanoramaId, FrameRequest)> {
        std::mem::take(&mut self.log_mut().frames)
    }
}

impl Platform for HeadlessPlatform {
    type Node = u32;
    type Context = HeadlessContext;

    fn is_rendering_environment(&self) -> bool {
        self.log().rendering
    }

    fn container_rect(&self, id: &PanoramaId) -> Option<Rect> {
        self.log().containers.get(id).copied()
    }

    fn viewport_rect(&self) -> Rect {
        self.log().viewport
    }

    fn window_width(&self) -> f64 {
        self.log().window_width
    }

    fn create_surface(&self, id: &PanoramaId) -> Result<u32, PlatformError> {
        Ok(self.log_mut().add_node(id, None, None))
    }

    fn create_overlay(
        &self,
        id: &PanoramaId,
        kind: OverlayKind,
        view: &OverlayView,
    ) -> Result<u32, PlatformError> {
        Ok(self.log_mut().add_node(id, Some(kind), Some(view.clone())))
    }

    fn update_overlay(&self, node: &u32, view: &OverlayView) {
        if let Some(record) = self.log_mut().nodes.get_mut(node) {
            record.view = Some(view.clone());
        }
    }

    fn remove_node(&self, node: &u32) {
        self.log_mut().nodes.remove(node);
    }

    fn create_context(
        &self,
        _surface: &u32,
        _width: u32,
        _height: u32,
    ) -> LocalBoxFuture<'static, Result<HeadlessContext, PlatformError>> {
        let mut log = self.log_mut();
        if log.fail_contexts {
            return Box::pin(futures::future::ready(Err(PlatformError::new(
                "context creation refused",
            ))));
        }
        if log.hold_contexts {
            let (tx, rx) = oneshot::channel();
            log.held_contexts.push(tx);
            return Box::pin(async move {
                rx.await
                    .unwrap_or_else(|_| Err(PlatformError::new("context dropped")))
            });
        }
        drop(log);
        let ctx = HeadlessContext::new(Rc::clone(&self.log));
        Box::pin(futures::future::ready(Ok(ctx)))
    }

    fn fetch_image(&self, url: &str) -> LocalBoxFuture<'static, Result<RgbaImage, PlatformError>> {
        let mut log = self.log_mut();
        match log.fetch.get(url).copied().unwrap_or(FetchMode::Image) {
            FetchMode::Image => Box::pin(futures::future::ready(Ok(test_image(8, 4)))),
            FetchMode::Fail => Box::pin(futures::future::ready(Err(PlatformError::new(
                "HTTP 404",
            )))),
            FetchMode::Hold => {
                let (tx, rx) = oneshot::channel();
                log.held_fetches.push((url.to_string(), tx));
                Box::pin(async move {
                    rx.await
                        .unwrap_or_else(|_| Err(PlatformError::new("fetch dropped")))
                })
            }
        }
    }

    fn observe(&self, id: &PanoramaId, kind: ObserverKind, options: ObserverOptions) {
        self.log_mut().observers.insert((id.clone(), kind), options);
    }

    fn unobserve(&self, id: &PanoramaId, kind: ObserverKind) {
        self.log_mut().observers.remove(&(id.clone(), kind));
    }

    fn request_frame(&self, id: &PanoramaId, req: FrameRequest) {
        self.log_mut().frames.push((id.clone(), req));
    }

    fn cancel_frame(&self, id: &PanoramaId, req: FrameRequest) {
        let mut log = self.log_mut();
        log.frames.retain(|(owner, r)| !(owner == id && *r == req));
        log.cancelled.push((id.clone(), req));
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        self.spawner
            .spawn_local(task)
            .expect("headless executor shut down");
    }

    fn sleep(&self, ms: u32) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        let mut log = self.log_mut();
        let deadline = log.now.add_millis(ms as f64);
        log.timers.push((deadline, tx));
        Box::pin(async move {
            let _ = rx.await;
        })
    }

    fn now(&self) -> Time {
        self.log().now
    }
}

pub(crate) struct HeadlessContext {
    log: Rc<RefCell<HeadlessLog>>,
    textures: HandleSlots<(u32, u32)>,
    disposed: bool,
}

impl HeadlessContext {
    fn new(log: Rc<RefCell<HeadlessLog>>) -> Self {
        log.borrow_mut().gpu.contexts += 1;
        Self {
            log,
            textures: HandleSlots::new(),
            disposed: false,
        }
    }
}

impl RenderContext for HeadlessContext {
    fn resize(&mut self, _width: u32, _height: u32) {}

    fn upload_texture(&mut self, image: &RgbaImage) -> Result<TextureHandle, PlatformError> {
        if self.disposed {
            return Err(PlatformError::new("context disposed"));
        }
        let handle = self.textures.insert(image.dimensions());
        let mut log = self.log.borrow_mut();
        log.gpu.uploads += 1;
        log.gpu.live_textures += 1;
        Ok(handle)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(texture).is_some() {
            let mut log = self.log.borrow_mut();
            log.gpu.released += 1;
            log.gpu.live_textures -= 1;
        }
    }

    fn render(&mut self, scene: &Scene, _camera: &Camera) -> Result<(), PlatformError> {
        if self.disposed {
            return Err(PlatformError::new("context disposed"));
        }
        let mut log = self.log.borrow_mut();
        log.gpu.renders += 1;
        let material = scene.mesh.map(|m| m.material);
        log.gpu.last_render_color = match material {
            Some(Material::Flat { color }) => Some(color),
            _ => None,
        };
        log.gpu.last_render_texture = scene.texture();
        Ok(())
    }

    fn capture_frame(
        &mut self,
        _scene: &Scene,
        _camera: &Camera,
    ) -> LocalBoxFuture<'static, Result<RgbaImage, PlatformError>> {
        let mut log = self.log.borrow_mut();
        log.gpu.captures += 1;
        if log.fail_captures || self.disposed {
            return Box::pin(futures::future::ready(Err(PlatformError::new(
                "readback failed",
            ))));
        }
        Box::pin(futures::future::ready(Ok(test_image(1000, 500))))
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        let leaked = self.textures.len();
        let mut log = self.log.borrow_mut();
        log.gpu.disposed += 1;
        log.gpu.live_textures -= leaked;
    }
}

pub(crate) type SettleSlot = Rc<RefCell<Option<Result<(), GalleryError>>>>;

/// Gallery over a headless platform with `n` stacked containers `p0..pn`.
pub(crate) struct Harness {
    pool: RefCell<LocalPool>,
    pub platform: HeadlessPlatform,
    pub gallery: Gallery<HeadlessPlatform>,
}

impl Harness {
    pub fn new(n: usize) -> Self {
        Self::with_config(n, GalleryConfig::default())
    }

    pub fn with_config(n: usize, config: GalleryConfig) -> Self {
        let pool = LocalPool::new();
        let platform = HeadlessPlatform::new(pool.spawner());
        {
            let mut log = platform.log_mut();
            for i in 0..n {
                log.containers.insert(
                    PanoramaId::new(format!("p{i}")),
                    Rect::new(0.0, i as f64 * ITEM_STRIDE, 800.0, ITEM_HEIGHT),
                );
            }
        }
        let gallery = Gallery::new(platform.clone(), config);
        Self {
            pool: RefCell::new(pool),
            platform,
            gallery,
        }
    }

    /// `tiny-<i>` / `high-<i>` for `p<i>`.
    pub fn urls(id: &str) -> PanoramaUrls {
        let suffix = id.trim_start_matches('p');
        PanoramaUrls {
            tiny: format!("tiny-{suffix}"),
            high: format!("high-{suffix}"),
        }
    }

    pub fn run(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    pub fn spawn_create(&self, id: &str) -> SettleSlot {
        let slot: SettleSlot = Rc::new(RefCell::new(None));
        let gallery = self.gallery.clone();
        let out = Rc::clone(&slot);
        let id = PanoramaId::from(id);
        let urls = Self::urls(id.as_str());
        self.platform.spawn_local(Box::pin(async move {
            let result = gallery.create_panorama(id, urls).await;
            *out.borrow_mut() = Some(result);
        }));
        slot
    }

    pub fn create_blocking(&self, id: &str) -> Result<(), GalleryError> {
        let slot = self.spawn_create(id);
        self.run();
        let result = slot.borrow_mut().take();
        result.expect("create did not settle")
    }

    pub fn create_all(&self, n: usize) {
        for i in 0..n {
            self.create_blocking(&format!("p{i}")).expect("create");
        }
    }

    /// Advances the clock and lets woken tasks run.
    pub fn advance(&self, ms: f64) {
        self.platform.advance(ms);
        self.run();
    }

    /// Delivers every pending animation frame once, `ms` after the last tick.
    pub fn tick(&self, ms: f64) {
        self.platform.advance(ms);
        let now = self.platform.now();
        for (id, req) in self.platform.take_frames() {
            self.gallery.handle_frame(&id, req, now);
        }
        self.run();
    }

    pub fn entry(&self, is_intersecting: bool, ratio: f64) -> IntersectionEntry {
        IntersectionEntry {
            is_intersecting,
            ratio,
        }
    }
}
