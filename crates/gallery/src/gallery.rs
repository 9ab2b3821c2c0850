use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use foundation::PanoramaId;
use runtime::{Event, EventBus, ReplayCell};
use streaming::TextureState;

use crate::config::GalleryConfig;
use crate::orbit::OrbitController;
use crate::platform::{Platform, RenderContext};
use crate::registry::Registry;
use crate::resource::{InteractionMode, Snapshot};

pub(crate) struct GalleryState<P: Platform> {
    pub registry: Registry<P>,
    pub active: Option<PanoramaId>,
    pub events: EventBus,
}

struct Shared<P: Platform> {
    platform: P,
    config: GalleryConfig,
    state: RefCell<GalleryState<P>>,
}

/// Handle to the panorama gallery core.
///
/// Cheap to clone; all clones drive the same gallery. Everything runs on one
/// thread: async operations are spawned on the platform's local executor and
/// never hold the internal state borrowed across a suspension point.
pub struct Gallery<P: Platform> {
    shared: Rc<Shared<P>>,
}

impl<P: Platform> Clone for Gallery<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<P: Platform> Gallery<P> {
    pub fn new(platform: P, config: GalleryConfig) -> Self {
        Self {
            shared: Rc::new(Shared {
                platform,
                config,
                state: RefCell::new(GalleryState {
                    registry: Registry::new(),
                    active: None,
                    events: EventBus::new(),
                }),
            }),
        }
    }

    pub fn platform(&self) -> &P {
        &self.shared.platform
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.shared.config
    }

    pub(crate) fn state(&self) -> RefMut<'_, GalleryState<P>> {
        self.shared.state.borrow_mut()
    }

    pub(crate) fn interaction_mode(&self) -> InteractionMode {
        InteractionMode::for_width(
            self.platform().window_width(),
            self.config().touch_breakpoint_px,
        )
    }

    /// Id of the item whose render loop currently owns the active slot.
    pub fn active_id(&self) -> Option<PanoramaId> {
        self.state().active.clone()
    }

    pub fn contains(&self, id: &PanoramaId) -> bool {
        self.state().registry.contains(id)
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<PanoramaId> {
        self.state().registry.ids().to_vec()
    }

    pub fn len(&self) -> usize {
        self.state().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().registry.is_empty()
    }

    /// Number of items with a scheduled render-loop tick (0 or 1).
    pub fn running_loops(&self) -> usize {
        self.state()
            .registry
            .iter()
            .filter(|r| r.is_running())
            .count()
    }

    pub fn texture_state(&self, id: &PanoramaId) -> Option<TextureState> {
        self.state().registry.get(id).map(|r| r.residency.state())
    }

    pub fn is_captured(&self, id: &PanoramaId) -> bool {
        self.state().registry.get(id).is_some_and(|r| r.captured)
    }

    pub fn is_hovered(&self, id: &PanoramaId) -> bool {
        self.state().registry.get(id).is_some_and(|r| r.hovered)
    }

    pub fn snapshot(&self, id: &PanoramaId) -> Option<Snapshot> {
        self.state()
            .registry
            .get(id)
            .and_then(|r| r.snapshot.clone())
    }

    /// Capture-in-progress flag. Unknown ids get a detached cell holding `false`.
    pub fn loading_state(&self, id: &PanoramaId) -> ReplayCell<bool> {
        self.state()
            .registry
            .get(id)
            .map(|r| r.loading.clone())
            .unwrap_or_else(|| ReplayCell::new(false))
    }

    /// Texture error flag. Unknown ids get a detached cell holding `false`.
    pub fn error_state(&self, id: &PanoramaId) -> ReplayCell<bool> {
        self.state()
            .registry
            .get(id)
            .map(|r| r.error.clone())
            .unwrap_or_else(|| ReplayCell::new(false))
    }

    /// Trace events recorded so far, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.state().events.events().to_vec()
    }

    /// Re-reads container sizes and resizes every viewport and camera.
    pub fn resize(&self) {
        let platform = self.platform();
        let mut state = self.state();
        for res in state.registry.iter_mut() {
            let Some(rect) = platform.container_rect(&res.id) else {
                continue;
            };
            let (w, h) = rect.pixel_size();
            if let Some(ctx) = res.context.as_mut() {
                ctx.resize(w, h);
            }
            if let Some(camera) = res.camera.as_mut() {
                camera.set_aspect(rect.aspect());
            }
            if let Some(controls) = res.controls.as_mut() {
                controls.set_viewport(rect.width, rect.height);
            }
            res.present();
        }
    }
}
