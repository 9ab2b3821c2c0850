use console_error_panic_hook::set_once;
use futures::future::join_all;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

use foundation::PanoramaId;
use gallery::{
    Gallery, GalleryConfig, GalleryItem, Manifest, PanoramaUrls, Platform, ScrollWindower,
    WindowChange,
};
use runtime::ReplayCell;
use tracing::{info, warn};

mod logging;
mod platform;
mod wgpu;

pub use platform::WebPlatform;

struct FrontEnd {
    gallery: Gallery<WebPlatform>,
    windower: ScrollWindower,
    items: Rc<Vec<GalleryItem>>,
    /// JS callback told about index changes before items are created.
    window_listener: Option<js_sys::Function>,
}

thread_local! {
    static FRONT: RefCell<Option<FrontEnd>> = const { RefCell::new(None) };
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Shared handle to the gallery, if `initGallery` ran.
pub(crate) fn gallery() -> Option<Gallery<WebPlatform>> {
    FRONT.with(|front| front.borrow().as_ref().map(|f| f.gallery.clone()))
}

fn with_front<R>(f: impl FnOnce(&mut FrontEnd) -> R) -> Result<R, JsValue> {
    FRONT.with(|front| {
        let mut front = front.borrow_mut();
        let front = front
            .as_mut()
            .ok_or_else(|| JsValue::from_str("gallery not initialized"))?;
        Ok(f(front))
    })
}

/// Tells JS which containers to mount, then creates/destroys the matching items.
fn publish_window(change: WindowChange) {
    let Ok((gallery, items, listener)) = with_front(|front| {
        (
            front.gallery.clone(),
            Rc::clone(&front.items),
            front.window_listener.clone(),
        )
    }) else {
        return;
    };
    notify_listener(listener.as_ref(), &change);
    gallery.apply_window(&change, &items);
}

fn notify_listener(listener: Option<&js_sys::Function>, change: &WindowChange) {
    let Some(listener) = listener else {
        return;
    };
    match serde_json::to_string(change) {
        Ok(json) => {
            if let Err(err) = listener.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
                warn!("window listener threw: {err:?}");
            }
        }
        Err(err) => warn!("window change not serializable: {err}"),
    }
}

fn subscribe_js(cell: ReplayCell<bool>, callback: js_sys::Function) -> JsValue {
    let subscription = cell.subscribe(move |value| {
        let _ = callback.call1(&JsValue::NULL, &JsValue::from_bool(*value));
    });
    Closure::once_into_js(move || drop(subscription))
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    set_once();
    logging::init("info");
    Ok(())
}

/// Sets up the gallery. `config_json` may be empty for defaults;
/// `scroll_root_id` names the scrolling element (the window otherwise).
#[wasm_bindgen(js_name = initGallery)]
pub fn init_gallery(config_json: &str, scroll_root_id: Option<String>) -> Result<(), JsValue> {
    let config = if config_json.trim().is_empty() {
        GalleryConfig::default()
    } else {
        GalleryConfig::from_json_str(config_json).map_err(to_js)?
    };
    let platform = WebPlatform::new(scroll_root_id.as_deref())?;
    let windower = ScrollWindower::new(&config, 0, platform.viewport_height());

    let previous = FRONT.with(|front| {
        front.borrow_mut().replace(FrontEnd {
            gallery: Gallery::new(platform, config),
            windower,
            items: Rc::new(Vec::new()),
            window_listener: None,
        })
    });
    if let Some(previous) = previous {
        for id in previous.gallery.ids() {
            previous.gallery.destroy_panorama(&id);
        }
    }
    info!("gallery initialized");
    Ok(())
}

/// Registers `callback(changeJson)`, called before items enter or leave.
#[wasm_bindgen(js_name = onWindowChange)]
pub fn on_window_change(callback: js_sys::Function) -> Result<(), JsValue> {
    with_front(|front| front.window_listener = Some(callback))
}

/// Loads the item listing. On first load the visible items are created and
/// the first one is activated; the promise resolves with the item count.
#[wasm_bindgen(js_name = setGalleryItems)]
pub fn set_gallery_items(manifest_json: &str) -> Result<js_sys::Promise, JsValue> {
    let manifest = Manifest::from_json_str(manifest_json).map_err(to_js)?;
    let (gallery, change, items, listener) = with_front(|front| {
        front.items = Rc::new(manifest.items);
        let change = front.windower.set_total(front.items.len());
        (
            front.gallery.clone(),
            change.unwrap_or_default(),
            Rc::clone(&front.items),
            front.window_listener.clone(),
        )
    })?;
    notify_listener(listener.as_ref(), &change);

    let first_load = gallery.is_empty();
    Ok(future_to_promise(async move {
        if first_load {
            let creates = change.entered.iter().filter_map(|&index| {
                let item = items.get(index)?;
                Some(gallery.create_panorama(PanoramaId::for_index(index), item.urls()))
            });
            for result in join_all(creates).await {
                if let Err(err) = result {
                    warn!("initial create failed: {err}");
                }
            }
            gallery.activate_first().map_err(to_js)?;
        } else {
            gallery.apply_window(&change, &items);
        }
        Ok(JsValue::from_f64(items.len() as f64))
    }))
}

#[wasm_bindgen(js_name = createPanorama)]
pub fn create_panorama(id: String, urls: JsValue) -> Result<js_sys::Promise, JsValue> {
    let field = |name: &str| -> Result<String, JsValue> {
        js_sys::Reflect::get(&urls, &JsValue::from_str(name))?
            .as_string()
            .ok_or_else(|| JsValue::from_str(&format!("urls.{name} must be a string")))
    };
    let urls = PanoramaUrls {
        tiny: field("tiny")?,
        high: field("high")?,
    };
    let gallery = gallery().ok_or_else(|| JsValue::from_str("gallery not initialized"))?;
    Ok(future_to_promise(async move {
        gallery
            .create_panorama(PanoramaId::new(id), urls)
            .await
            .map_err(to_js)?;
        Ok(JsValue::UNDEFINED)
    }))
}

#[wasm_bindgen(js_name = destroyPanorama)]
pub fn destroy_panorama(id: &str) {
    if let Some(g) = gallery() {
        g.destroy_panorama(&PanoramaId::from(id));
    }
}

/// Subscribes `callback(bool)` to the capture-in-progress flag. The current
/// value is delivered immediately. Returns an unsubscribe function.
#[wasm_bindgen(js_name = getLoadingState)]
pub fn get_loading_state(id: &str, callback: js_sys::Function) -> Result<JsValue, JsValue> {
    let g = gallery().ok_or_else(|| JsValue::from_str("gallery not initialized"))?;
    Ok(subscribe_js(g.loading_state(&PanoramaId::from(id)), callback))
}

/// Like `getLoadingState`, for the texture error flag.
#[wasm_bindgen(js_name = getErrorState)]
pub fn get_error_state(id: &str, callback: js_sys::Function) -> Result<JsValue, JsValue> {
    let g = gallery().ok_or_else(|| JsValue::from_str("gallery not initialized"))?;
    Ok(subscribe_js(g.error_state(&PanoramaId::from(id)), callback))
}

#[wasm_bindgen(js_name = setActivePanorama)]
pub fn set_active_panorama(id: &str) -> Result<(), JsValue> {
    let g = gallery().ok_or_else(|| JsValue::from_str("gallery not initialized"))?;
    g.set_active_panorama(&PanoramaId::from(id)).map_err(to_js)
}

#[wasm_bindgen(js_name = isPanoramaCentered)]
pub fn is_panorama_centered(id: &str) -> bool {
    gallery().is_some_and(|g| g.is_panorama_centered(&PanoramaId::from(id)))
}

/// JPEG bytes of the captured snapshot, if one was taken.
#[wasm_bindgen(js_name = getSnapshot)]
pub fn get_snapshot(id: &str) -> Option<Vec<u8>> {
    gallery()?.snapshot(&PanoramaId::from(id)).map(|s| s.jpeg)
}

#[wasm_bindgen(js_name = onScroll)]
pub fn on_scroll(scroll_top: f64) -> Result<(), JsValue> {
    let gallery = with_front(|front| {
        let now = front.gallery.platform().now();
        front.windower.on_scroll(scroll_top, now);
        front.gallery.clone()
    })?;
    let settle_ms = gallery.config().scroll_settle_ms;
    let sleep = gallery.platform().sleep(settle_ms + 1);
    spawn_local(async move {
        sleep.await;
        let change = with_front(|front| {
            let now = front.gallery.platform().now();
            front.windower.poll(now)
        });
        if let Ok(Some(change)) = change {
            publish_window(change);
        }
    });
    Ok(())
}

#[wasm_bindgen(js_name = onResize)]
pub fn on_resize() -> Result<(), JsValue> {
    let (gallery, change) = with_front(|front| {
        let height = front.gallery.platform().viewport_height();
        (front.gallery.clone(), front.windower.on_resize(height))
    })?;
    gallery.resize();
    if let Some(change) = change {
        publish_window(change);
    }
    Ok(())
}

#[wasm_bindgen(js_name = isScrolling)]
pub fn is_scrolling() -> bool {
    with_front(|front| front.windower.is_scrolling(front.gallery.platform().now())).unwrap_or(false)
}

/// Smooth-scrolls so item `index` sits at the top of the viewport.
#[wasm_bindgen(js_name = scrollToPanorama)]
pub fn scroll_to_panorama(index: usize) -> Result<(), JsValue> {
    let (gallery, top) = with_front(|front| {
        let now = front.gallery.platform().now();
        (front.gallery.clone(), front.windower.scroll_to_index(index, now))
    })?;
    gallery.platform().scroll_to(top);
    Ok(())
}
