//! Browser implementation of the gallery's host seam.

use std::cell::RefCell;
use std::collections::HashMap;

use foundation::time::Time;
use foundation::{PanoramaId, Rect};
use gallery::{
    IntersectionEntry, LocalBoxFuture, ObserverKind, ObserverOptions, OverlayKind, OverlayView,
    Platform, PlatformError,
};
use gloo_net::http::Request;
use image::RgbaImage;
use runtime::FrameRequest;
use tracing::{debug, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Document, Element, EventTarget, HtmlCanvasElement, HtmlElement, IntersectionObserver,
    IntersectionObserverEntry, IntersectionObserverInit, Window,
};

use crate::wgpu::{WgpuContext, create_context};

const SURFACE_ATTR: &str = "data-panorama-surface";

fn js_err(err: JsValue) -> PlatformError {
    PlatformError::new(format!("{err:?}"))
}

/// DOM listener removed from its target when dropped.
struct Listener {
    target: EventTarget,
    kind: &'static str,
    callback: Closure<dyn FnMut(web_sys::Event)>,
}

impl Listener {
    fn attach(
        target: &EventTarget,
        kind: &'static str,
        f: impl FnMut(web_sys::Event) + 'static,
    ) -> Result<Self, PlatformError> {
        let callback = Closure::wrap(Box::new(f) as Box<dyn FnMut(web_sys::Event)>);
        target
            .add_event_listener_with_callback(kind, callback.as_ref().unchecked_ref())
            .map_err(js_err)?;
        Ok(Self {
            target: target.clone(),
            kind,
            callback,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.kind, self.callback.as_ref().unchecked_ref());
    }
}

struct Observer {
    observer: IntersectionObserver,
    _callback: Closure<dyn FnMut(js_sys::Array, IntersectionObserver)>,
}

#[derive(Default)]
struct WebState {
    observers: HashMap<(PanoramaId, ObserverKind), Observer>,
    frames: HashMap<PanoramaId, (FrameRequest, i32)>,
    listeners: HashMap<PanoramaId, Vec<Listener>>,
}

/// Platform backed by `web-sys`. Items live in elements whose DOM id is the
/// panorama id.
pub struct WebPlatform {
    window: Window,
    document: Document,
    scroll_root: Option<HtmlElement>,
    state: RefCell<WebState>,
}

impl WebPlatform {
    pub fn new(scroll_root_id: Option<&str>) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("window missing"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("document missing"))?;
        let scroll_root = match scroll_root_id {
            Some(id) => Some(
                document
                    .get_element_by_id(id)
                    .ok_or_else(|| JsValue::from_str(&format!("scroll root {id} missing")))?
                    .dyn_into::<HtmlElement>()?,
            ),
            None => None,
        };
        Ok(Self {
            window,
            document,
            scroll_root,
            state: RefCell::new(WebState::default()),
        })
    }

    pub fn scroll_root(&self) -> Option<&HtmlElement> {
        self.scroll_root.as_ref()
    }

    /// Height of the scrolling viewport in CSS pixels.
    pub fn viewport_height(&self) -> f64 {
        self.viewport_rect().height
    }

    /// Smooth-scrolls the viewport to `top`.
    pub fn scroll_to(&self, top: f64) {
        let opts = web_sys::ScrollToOptions::new();
        opts.set_top(top);
        opts.set_behavior(web_sys::ScrollBehavior::Smooth);
        match &self.scroll_root {
            Some(root) => root.scroll_to_with_scroll_to_options(&opts),
            None => self.window.scroll_to_with_scroll_to_options(&opts),
        }
    }

    fn element(&self, id: &PanoramaId) -> Option<Element> {
        self.document.get_element_by_id(id.as_str())
    }

    fn inner_width(&self) -> f64 {
        self.window
            .inner_width()
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    fn inner_height(&self) -> f64 {
        self.window
            .inner_height()
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    /// Forgets the pending frame once the browser delivered it.
    pub(crate) fn frame_fired(&self, id: &PanoramaId, req: FrameRequest) {
        let mut state = self.state.borrow_mut();
        if state.frames.get(id).is_some_and(|(r, _)| *r == req) {
            state.frames.remove(id);
        }
    }

    fn attach_input(&self, id: &PanoramaId, canvas: &HtmlCanvasElement) -> Result<(), PlatformError> {
        let target: &EventTarget = canvas.as_ref();
        let mut listeners = Vec::with_capacity(6);

        let down_id = id.clone();
        listeners.push(Listener::attach(target, "pointerdown", move |ev| {
            let Some(ev) = ev.dyn_ref::<web_sys::PointerEvent>() else {
                return;
            };
            if let Some(el) = ev.target().and_then(|t| t.dyn_into::<Element>().ok()) {
                let _ = el.set_pointer_capture(ev.pointer_id());
            }
            if let Some(g) = crate::gallery() {
                let pos = [ev.offset_x() as f64, ev.offset_y() as f64];
                if let Err(err) = g.pointer_down(&down_id, pos) {
                    warn!(panorama = %down_id, "pointer activation failed: {err}");
                }
            }
        })?);

        let move_id = id.clone();
        listeners.push(Listener::attach(target, "pointermove", move |ev| {
            let Some(ev) = ev.dyn_ref::<web_sys::MouseEvent>() else {
                return;
            };
            if let Some(g) = crate::gallery() {
                g.pointer_move(&move_id, [ev.offset_x() as f64, ev.offset_y() as f64]);
            }
        })?);

        for kind in ["pointerup", "pointercancel", "pointerleave"] {
            let up_id = id.clone();
            listeners.push(Listener::attach(target, kind, move |_| {
                if let Some(g) = crate::gallery() {
                    g.pointer_up(&up_id);
                }
            })?);
        }

        let wheel_id = id.clone();
        listeners.push(Listener::attach(target, "wheel", move |ev| {
            let Some(ev) = ev.dyn_ref::<web_sys::WheelEvent>() else {
                return;
            };
            if let Some(g) = crate::gallery() {
                // The page keeps scrolling unless zoom consumes the wheel.
                if g.config().controls.enable_zoom {
                    ev.prevent_default();
                }
                g.wheel(&wheel_id, ev.delta_y());
            }
        })?);

        self.state
            .borrow_mut()
            .listeners
            .insert(id.clone(), listeners);
        Ok(())
    }

    fn apply_view(node: &HtmlElement, view: &OverlayView) {
        node.set_text_content(Some(&view.text));
        let style = node.style();
        for (key, value) in overlay_style(view) {
            let _ = style.set_property(key, value);
        }
        let _ = node
            .class_list()
            .toggle_with_force("emphasized", view.emphasized);
    }
}

/// Drops `value` on a later task; the value may be the callback currently
/// running.
fn defer_drop<T: 'static>(value: T) {
    wasm_bindgen_futures::spawn_local(async move {
        drop(value);
    });
}

/// Overlays sit above the canvas; they never take pointer input from it.
fn overlay_style(view: &OverlayView) -> [(&'static str, &'static str); 2] {
    [
        ("display", if view.visible { "flex" } else { "none" }),
        ("pointer-events", "none"),
    ]
}

fn overlay_class(kind: OverlayKind) -> &'static str {
    match kind {
        OverlayKind::Hint => "panorama-overlay panorama-hint",
        OverlayKind::Capture => "panorama-overlay panorama-capture",
        OverlayKind::Error => "panorama-overlay panorama-error",
    }
}

impl Platform for WebPlatform {
    type Node = HtmlElement;
    type Context = WgpuContext;

    fn is_rendering_environment(&self) -> bool {
        true
    }

    fn container_rect(&self, id: &PanoramaId) -> Option<Rect> {
        let r = self.element(id)?.get_bounding_client_rect();
        Some(Rect::new(r.x(), r.y(), r.width(), r.height()))
    }

    fn viewport_rect(&self) -> Rect {
        match &self.scroll_root {
            Some(root) => {
                let r = root.get_bounding_client_rect();
                Rect::new(r.x(), r.y(), r.width(), r.height())
            }
            None => Rect::new(0.0, 0.0, self.inner_width(), self.inner_height()),
        }
    }

    fn window_width(&self) -> f64 {
        self.inner_width()
    }

    fn create_surface(&self, id: &PanoramaId) -> Result<HtmlElement, PlatformError> {
        let container = self
            .element(id)
            .ok_or_else(|| PlatformError::new(format!("container {id} missing")))?;
        let canvas = self
            .document
            .create_element("canvas")
            .map_err(js_err)?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| PlatformError::new("created element is not a canvas"))?;
        canvas.set_class_name("panorama-surface");
        canvas.set_attribute(SURFACE_ATTR, id.as_str()).map_err(js_err)?;
        let style = canvas.style();
        for (key, value) in [("width", "100%"), ("height", "100%"), ("touch-action", "pan-y")] {
            style.set_property(key, value).map_err(js_err)?;
        }
        container.append_child(&canvas).map_err(js_err)?;
        if let Err(err) = self.attach_input(id, &canvas) {
            canvas.remove();
            return Err(err);
        }
        Ok(canvas.unchecked_into())
    }

    fn create_overlay(
        &self,
        id: &PanoramaId,
        kind: OverlayKind,
        view: &OverlayView,
    ) -> Result<HtmlElement, PlatformError> {
        let container = self
            .element(id)
            .ok_or_else(|| PlatformError::new(format!("container {id} missing")))?;
        let node = self
            .document
            .create_element("div")
            .map_err(js_err)?
            .dyn_into::<HtmlElement>()
            .map_err(|_| PlatformError::new("created element is not an HtmlElement"))?;
        node.set_class_name(overlay_class(kind));
        Self::apply_view(&node, view);
        container.append_child(&node).map_err(js_err)?;
        Ok(node)
    }

    fn update_overlay(&self, node: &HtmlElement, view: &OverlayView) {
        Self::apply_view(node, view);
    }

    fn remove_node(&self, node: &HtmlElement) {
        if let Some(id) = node.get_attribute(SURFACE_ATTR) {
            let listeners = self
                .state
                .borrow_mut()
                .listeners
                .remove(&PanoramaId::new(id));
            if let Some(listeners) = listeners {
                defer_drop(listeners);
            }
        }
        node.remove();
    }

    fn create_context(
        &self,
        surface: &HtmlElement,
        width: u32,
        height: u32,
    ) -> LocalBoxFuture<'static, Result<WgpuContext, PlatformError>> {
        let canvas = surface.clone().dyn_into::<HtmlCanvasElement>();
        Box::pin(async move {
            let canvas = canvas.map_err(|_| PlatformError::new("surface is not a canvas"))?;
            canvas.set_width(width.max(1));
            canvas.set_height(height.max(1));
            create_context(canvas, width, height).await
        })
    }

    fn fetch_image(&self, url: &str) -> LocalBoxFuture<'static, Result<RgbaImage, PlatformError>> {
        let url = url.to_string();
        Box::pin(async move {
            let resp = Request::get(&url)
                .send()
                .await
                .map_err(|e| PlatformError::new(e.to_string()))?;
            if !resp.ok() {
                return Err(PlatformError::new(format!("HTTP {}", resp.status())));
            }
            let bytes = resp
                .binary()
                .await
                .map_err(|e| PlatformError::new(e.to_string()))?;
            let image = image::load_from_memory(&bytes)
                .map_err(|e| PlatformError::new(format!("decode: {e}")))?;
            debug!(url = %url, width = image.width(), height = image.height(), "image decoded");
            Ok(image.into_rgba8())
        })
    }

    fn observe(&self, id: &PanoramaId, kind: ObserverKind, options: ObserverOptions) {
        let Some(element) = self.element(id) else {
            warn!(panorama = %id, ?kind, "observe: container missing");
            return;
        };
        let cb_id = id.clone();
        let callback = Closure::wrap(Box::new(move |entries: js_sys::Array, _: IntersectionObserver| {
            let Some(g) = crate::gallery() else {
                return;
            };
            for entry in entries.iter() {
                let entry: IntersectionObserverEntry = entry.unchecked_into();
                g.handle_intersection(
                    &cb_id,
                    kind,
                    IntersectionEntry {
                        is_intersecting: entry.is_intersecting(),
                        ratio: entry.intersection_ratio(),
                    },
                );
            }
        }) as Box<dyn FnMut(js_sys::Array, IntersectionObserver)>);

        let init = IntersectionObserverInit::new();
        init.set_threshold(&JsValue::from_f64(options.threshold));
        init.set_root_margin(&format!("{}px", options.root_margin_px));
        if let Some(root) = &self.scroll_root {
            // `root` is an (Element or Document) union; set it untyped.
            let _ = js_sys::Reflect::set(&init, &JsValue::from_str("root"), root);
        }
        let observer =
            match IntersectionObserver::new_with_options(callback.as_ref().unchecked_ref(), &init) {
                Ok(observer) => observer,
                Err(err) => {
                    warn!(panorama = %id, ?kind, "observer creation failed: {err:?}");
                    return;
                }
            };
        observer.observe(&element);

        let previous = self.state.borrow_mut().observers.insert(
            (id.clone(), kind),
            Observer {
                observer,
                _callback: callback,
            },
        );
        if let Some(previous) = previous {
            previous.observer.disconnect();
            defer_drop(previous);
        }
    }

    fn unobserve(&self, id: &PanoramaId, kind: ObserverKind) {
        let removed = self
            .state
            .borrow_mut()
            .observers
            .remove(&(id.clone(), kind));
        if let Some(observer) = removed {
            observer.observer.disconnect();
            // Unobserving from inside the observer's own callback is common.
            defer_drop(observer);
        }
    }

    fn request_frame(&self, id: &PanoramaId, req: FrameRequest) {
        let cb_id = id.clone();
        let callback = Closure::once_into_js(move |ts: f64| {
            if let Some(g) = crate::gallery() {
                g.platform().frame_fired(&cb_id, req);
                g.handle_frame(&cb_id, req, Time::from_millis(ts));
            }
        });
        match self
            .window
            .request_animation_frame(callback.unchecked_ref())
        {
            Ok(handle) => {
                self.state
                    .borrow_mut()
                    .frames
                    .insert(id.clone(), (req, handle));
            }
            Err(err) => warn!(panorama = %id, "requestAnimationFrame failed: {err:?}"),
        }
    }

    fn cancel_frame(&self, id: &PanoramaId, req: FrameRequest) {
        let mut state = self.state.borrow_mut();
        if let Some(&(pending, handle)) = state.frames.get(id) {
            if pending == req {
                let _ = self.window.cancel_animation_frame(handle);
                state.frames.remove(id);
            }
        }
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }

    fn sleep(&self, ms: u32) -> LocalBoxFuture<'static, ()> {
        let window = self.window.clone();
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            let _ = window
                .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms as i32);
        });
        Box::pin(async move {
            let _ = JsFuture::from(promise).await;
        })
    }

    fn now(&self) -> Time {
        Time::from_millis(
            self.window
                .performance()
                .map(|p| p.now())
                .unwrap_or(0.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::overlay_style;
    use gallery::OverlayView;
    use pretty_assertions::assert_eq;

    #[test]
    fn overlays_let_pointer_input_reach_the_canvas() {
        let mut view = OverlayView::hidden("Drag to interact");
        assert_eq!(overlay_style(&view), [("display", "none"), ("pointer-events", "none")]);

        view.visible = true;
        view.emphasized = true;
        assert_eq!(overlay_style(&view), [("display", "flex"), ("pointer-events", "none")]);
    }
}
