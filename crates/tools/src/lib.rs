//! Offline helpers behind the `panogallery` binary.

use std::fmt;
use std::fs;
use std::path::Path;

use foundation::PanoramaId;
use gallery::{
    CaptureError, ConfigError, GalleryConfig, Manifest, ManifestError, Snapshot, VisibleWindow,
    compress_snapshot, compute_window, encode_jpeg,
};
use image::ImageFormat;
use tracing::debug;

/// Environment fallback for `--config`.
pub const CONFIG_ENV: &str = "PANOGALLERY_CONFIG";

#[derive(Debug)]
pub enum ToolError {
    Io { path: String, reason: String },
    Config(ConfigError),
    Manifest(ManifestError),
    Capture(CaptureError),
    Decode(String),
    Json(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::Io { path, reason } => write!(f, "{path}: {reason}"),
            ToolError::Config(err) => err.fmt(f),
            ToolError::Manifest(err) => err.fmt(f),
            ToolError::Capture(err) => err.fmt(f),
            ToolError::Decode(reason) => write!(f, "decode failed: {reason}"),
            ToolError::Json(reason) => write!(f, "json: {reason}"),
        }
    }
}

impl std::error::Error for ToolError {}

impl From<ConfigError> for ToolError {
    fn from(err: ConfigError) -> Self {
        ToolError::Config(err)
    }
}

impl From<ManifestError> for ToolError {
    fn from(err: ManifestError) -> Self {
        ToolError::Manifest(err)
    }
}

impl From<CaptureError> for ToolError {
    fn from(err: CaptureError) -> Self {
        ToolError::Capture(err)
    }
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, ToolError> {
    fs::read(path).map_err(|e| ToolError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ToolError> {
    fs::write(path, bytes).map_err(|e| ToolError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Reads the config at `path`; defaults when there is none.
pub fn load_config(path: Option<&Path>) -> Result<GalleryConfig, ToolError> {
    let Some(path) = path else {
        return Ok(GalleryConfig::default());
    };
    let bytes = read_file(path)?;
    let text = String::from_utf8_lossy(&bytes);
    debug!(path = %path.display(), "loading config");
    Ok(GalleryConfig::from_json_str(&text)?)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowArgs {
    pub scroll_top: f64,
    pub container_height: f64,
    pub item_height: f64,
    pub buffer: usize,
    pub total: usize,
}

/// Window as pretty JSON; `null` when the input has no window.
pub fn window_json(args: &WindowArgs) -> Result<String, ToolError> {
    let window: Option<VisibleWindow> = compute_window(
        args.scroll_top,
        args.container_height,
        args.item_height,
        args.buffer,
        args.total,
    );
    serde_json::to_string_pretty(&window).map_err(|e| ToolError::Json(e.to_string()))
}

/// Runs the snapshot shrink step on an image file's bytes.
///
/// Non-JPEG input is first encoded at `first_pass_quality`, the way a
/// captured frame is.
pub fn thumbnail(
    input: &[u8],
    max_width: u32,
    max_height: u32,
    quality: u8,
    first_pass_quality: u8,
) -> Result<Snapshot, ToolError> {
    let format = image::guess_format(input).map_err(|e| ToolError::Decode(e.to_string()))?;
    if format == ImageFormat::Jpeg {
        return Ok(compress_snapshot(input, max_width, max_height, quality)?);
    }
    let frame = image::load_from_memory_with_format(input, format)
        .map_err(|e| ToolError::Decode(e.to_string()))?
        .into_rgba8();
    let jpeg = encode_jpeg(&frame, first_pass_quality)?;
    Ok(compress_snapshot(&jpeg, max_width, max_height, quality)?)
}

/// Validates a manifest and returns its container ids in listing order.
pub fn manifest_ids(json: &str) -> Result<Vec<PanoramaId>, ToolError> {
    Ok(Manifest::from_json_str(json)?.ids())
}

#[cfg(test)]
mod tests {
    use super::{ToolError, WindowArgs, manifest_ids, thumbnail, window_json};
    use image::{ImageFormat, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).expect("png encode");
        out.into_inner()
    }

    #[test]
    fn window_prints_inclusive_range() {
        let json = window_json(&WindowArgs {
            scroll_top: 0.0,
            container_height: 800.0,
            item_height: 420.0,
            buffer: 8,
            total: 16,
        })
        .expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["start"], 0);
        assert_eq!(value["end"], 10);
    }

    #[test]
    fn degenerate_window_is_null() {
        let json = window_json(&WindowArgs {
            scroll_top: 0.0,
            container_height: 800.0,
            item_height: 420.0,
            buffer: 2,
            total: 0,
        })
        .expect("json");
        assert_eq!(json, "null");
    }

    #[test]
    fn png_input_is_encoded_then_shrunk() {
        let snap = thumbnail(&png(1000, 500), 800, 600, 20, 60).expect("thumbnail");
        assert_eq!((snap.width, snap.height), (800, 400));
        assert_eq!(&snap.jpeg[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn unknown_bytes_are_a_decode_error() {
        let err = thumbnail(b"plain text", 800, 600, 20, 60).expect_err("not an image");
        assert!(matches!(err, ToolError::Decode(_)), "{err:?}");
    }

    #[test]
    fn manifest_lists_container_ids() {
        let ids = manifest_ids(r#"[{"high":"a.jpg","tiny":"a-t.jpg"},{"high":"b.jpg","tiny":"b-t.jpg"}]"#)
            .expect("valid");
        let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["panorama-container-0", "panorama-container-1"]);
    }

    #[test]
    fn manifest_with_empty_url_is_rejected() {
        let err = manifest_ids(r#"[{"high":"","tiny":"a-t.jpg"}]"#).expect_err("empty high");
        assert!(matches!(err, ToolError::Manifest(_)), "{err:?}");
    }
}
