use serde::{Deserialize, Serialize};

use crate::scene::MAX_SPHERE_VERTICES;

/// What happens to resources whose index scrolls out of the virtual window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Destroy them; GPU memory stays bounded by the window size.
    #[default]
    Release,
    /// Keep them alive; scrolling back costs nothing.
    Retain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Negative values invert drag direction (look-around feel from inside the sphere).
    pub rotate_speed: f64,
    pub enable_zoom: bool,
    pub enable_pan: bool,
    /// Fraction of the remaining rotation dropped per 60 Hz frame; 0 disables inertia.
    pub damping: f64,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            rotate_speed: -0.5,
            enable_zoom: false,
            enable_pan: false,
            damping: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y_deg: f64,
    pub near: f64,
    pub far: f64,
    /// Distance from the sphere center along +z.
    pub distance: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_deg: 75.0,
            near: 1.0,
            far: 1100.0,
            distance: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphereConfig {
    pub radius: f64,
    pub width_segments: u32,
    pub height_segments: u32,
}

impl Default for SphereConfig {
    fn default() -> Self {
        Self {
            radius: 500.0,
            width_segments: 60,
            height_segments: 40,
        }
    }
}

/// Gallery tuning. Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    /// Intersection ratio at which an item counts as centered and activates.
    pub center_threshold: f64,
    /// Intersection ratio that triggers the high-res texture load.
    pub near_threshold: f64,
    pub near_margin_px: f64,
    pub capture_before: usize,
    pub capture_after: usize,
    /// JPEG quality (1-100) of the first capture encode.
    pub capture_quality: u8,
    pub thumbnail_max_width: u32,
    pub thumbnail_max_height: u32,
    pub thumbnail_quality: u8,
    pub capture_delay_ms: u32,
    pub overlay_emphasis_ms: u32,
    pub scroll_settle_ms: u32,
    pub scroll_to_settle_ms: u32,
    pub item_height_px: f64,
    pub buffer_size: usize,
    pub window_policy: WindowPolicy,
    /// Viewports at least this wide are treated as pointer (desktop) devices.
    pub touch_breakpoint_px: f64,
    pub controls: ControlsConfig,
    pub camera: CameraConfig,
    pub sphere: SphereConfig,
    /// 0xRRGGBB color of the material shown when no texture could be loaded.
    pub fallback_color: u32,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            center_threshold: 0.8,
            near_threshold: 0.1,
            near_margin_px: 50.0,
            capture_before: 3,
            capture_after: 5,
            capture_quality: 60,
            thumbnail_max_width: 800,
            thumbnail_max_height: 600,
            thumbnail_quality: 20,
            capture_delay_ms: 1000,
            overlay_emphasis_ms: 1000,
            scroll_settle_ms: 150,
            scroll_to_settle_ms: 500,
            item_height_px: 700.0,
            buffer_size: 2,
            window_policy: WindowPolicy::Release,
            touch_breakpoint_px: 768.0,
            controls: ControlsConfig::default(),
            camera: CameraConfig::default(),
            sphere: SphereConfig::default(),
            fallback_color: 0xff0000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Parse(String),
    Invalid { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "config parse error: {msg}"),
            ConfigError::Invalid { field, reason } => write!(f, "invalid config {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_ratio(field: &'static str, v: f64) -> Result<(), ConfigError> {
    if v.is_finite() && v > 0.0 && v <= 1.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{v} is outside (0, 1]")))
    }
}

fn check_quality(field: &'static str, q: u8) -> Result<(), ConfigError> {
    if (1..=100).contains(&q) {
        Ok(())
    } else {
        Err(invalid(field, format!("{q} is outside 1..=100")))
    }
}

impl GalleryConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: GalleryConfig =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ratio("center_threshold", self.center_threshold)?;
        check_ratio("near_threshold", self.near_threshold)?;
        check_quality("capture_quality", self.capture_quality)?;
        check_quality("thumbnail_quality", self.thumbnail_quality)?;
        if !(self.item_height_px.is_finite() && self.item_height_px > 0.0) {
            return Err(invalid("item_height_px", "must be positive"));
        }
        if self.thumbnail_max_width == 0 || self.thumbnail_max_height == 0 {
            return Err(invalid("thumbnail_max_*", "must be non-zero"));
        }
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            return Err(invalid("camera", "require 0 < near < far"));
        }
        if !(0.0..1.0).contains(&self.controls.damping) {
            return Err(invalid("controls.damping", "must be in [0, 1)"));
        }
        if self.sphere.width_segments < 3 || self.sphere.height_segments < 2 {
            return Err(invalid("sphere", "too few segments"));
        }
        let vertices = (self.sphere.width_segments as u64 + 1) * (self.sphere.height_segments as u64 + 1);
        if vertices > MAX_SPHERE_VERTICES as u64 {
            return Err(invalid(
                "sphere",
                format!("{vertices} vertices exceed the 16-bit index limit of {MAX_SPHERE_VERTICES}"),
            ));
        }
        Ok(())
    }
}
