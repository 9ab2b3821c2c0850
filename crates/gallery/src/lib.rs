//! Panorama gallery core: per-item resource lifecycle, single active render
//! loop, progressive textures, neighbor snapshots and scroll windowing.
//!
//! Host access (DOM, GPU, network, scheduling) goes through [`Platform`] and
//! [`RenderContext`]; everything else is plain single-threaded Rust.

pub mod activation;
pub mod capture;
pub mod config;
pub mod error;
pub mod gallery;
pub mod lifecycle;
pub mod manifest;
pub mod orbit;
pub mod platform;
pub mod registry;
pub mod resource;
pub mod scene;
pub mod texture;
pub mod visibility;
pub mod windower;

#[cfg(test)]
pub(crate) mod testing;

pub use capture::{CaptureError, compress_snapshot, encode_jpeg, fit_within};
pub use config::*;
pub use error::*;
pub use gallery::Gallery;
pub use manifest::*;
pub use orbit::{OrbitControls, OrbitController};
pub use platform::*;
pub use resource::{InteractionMode, Snapshot};
pub use scene::{Camera, Material, Mesh, Scene, SphereGeometry, SphereMesh, TextureHandle};
pub use visibility::is_centered;
pub use windower::*;
