//! Minimal scene graph for one panorama: an optional inverted sphere and a
//! perspective camera sitting near its center.

use foundation::Handle;
use foundation::math::{Mat4, Vec3, mat4_look_at_rh, mat4_mul, mat4_perspective_rh_z0};

use crate::config::{CameraConfig, SphereConfig};

/// Texture owned by a render context.
pub type TextureHandle = Handle;

/// Sphere meshes are indexed with `u16`.
pub const MAX_SPHERE_VERTICES: usize = u16::MAX as usize + 1;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SphereGeometry {
    pub radius: f64,
    pub width_segments: u32,
    pub height_segments: u32,
    /// Mirrored on X so the texture reads correctly from inside.
    pub inverted: bool,
}

impl SphereGeometry {
    pub fn inverted(cfg: &SphereConfig) -> Self {
        Self {
            radius: cfg.radius,
            width_segments: cfg.width_segments.max(3),
            height_segments: cfg.height_segments.max(2),
            inverted: true,
        }
    }

    pub fn vertex_count(&self) -> usize {
        ((self.width_segments + 1) * (self.height_segments + 1)) as usize
    }

    /// Equirectangular UV sphere; `uv.v` is 0 at the top.
    pub fn build(&self) -> SphereMesh {
        let ws = self.width_segments;
        let hs = self.height_segments;
        let r = self.radius as f32;
        let sx = if self.inverted { -1.0f32 } else { 1.0 };

        let mut positions = Vec::with_capacity(self.vertex_count());
        let mut uvs = Vec::with_capacity(self.vertex_count());
        for iy in 0..=hs {
            let v = iy as f32 / hs as f32;
            let theta = v * std::f32::consts::PI;
            for ix in 0..=ws {
                let u = ix as f32 / ws as f32;
                let phi = u * std::f32::consts::TAU;
                let x = -r * phi.cos() * theta.sin();
                let y = r * theta.cos();
                let z = r * phi.sin() * theta.sin();
                positions.push([x * sx, y, z]);
                uvs.push([u, v]);
            }
        }

        let stride = ws + 1;
        let mut indices = Vec::with_capacity((ws * hs * 6) as usize);
        for iy in 0..hs {
            for ix in 0..ws {
                let a = iy * stride + ix + 1;
                let b = iy * stride + ix;
                let c = (iy + 1) * stride + ix;
                let d = (iy + 1) * stride + ix + 1;
                if iy != 0 {
                    indices.extend_from_slice(&[a as u16, b as u16, d as u16]);
                }
                if iy != hs - 1 {
                    indices.extend_from_slice(&[b as u16, c as u16, d as u16]);
                }
            }
        }

        SphereMesh {
            positions,
            uvs,
            indices,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SphereMesh {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u16>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Material {
    Textured(TextureHandle),
    /// 0xRRGGBB
    Flat { color: u32 },
}

impl Material {
    pub fn color_rgba(color: u32) -> [f32; 4] {
        [
            ((color >> 16) & 0xff) as f32 / 255.0,
            ((color >> 8) & 0xff) as f32 / 255.0,
            (color & 0xff) as f32 / 255.0,
            1.0,
        ]
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mesh {
    pub geometry: SphereGeometry,
    pub material: Material,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scene {
    pub mesh: Option<Mesh>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.mesh.is_none()
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        match self.mesh {
            Some(Mesh {
                material: Material::Textured(t),
                ..
            }) => Some(t),
            _ => None,
        }
    }

    /// Maps `texture` onto the sphere, building it on first use.
    ///
    /// Returns the texture it replaced, which the caller must release.
    pub fn set_texture(
        &mut self,
        texture: TextureHandle,
        geometry: SphereGeometry,
    ) -> Option<TextureHandle> {
        let previous = self.texture();
        match &mut self.mesh {
            Some(mesh) => mesh.material = Material::Textured(texture),
            None => {
                self.mesh = Some(Mesh {
                    geometry,
                    material: Material::Textured(texture),
                })
            }
        }
        previous
    }

    /// Adds a flat-colored sphere if nothing is shown yet. Returns whether it did.
    pub fn ensure_fallback(&mut self, color: u32, geometry: SphereGeometry) -> bool {
        if self.mesh.is_some() {
            return false;
        }
        self.mesh = Some(Mesh {
            geometry,
            material: Material::Flat { color },
        });
        true
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub fov_y_deg: f64,
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
    pub position: Vec3,
    pub target: Vec3,
}

impl Camera {
    pub fn perspective(cfg: &CameraConfig, aspect: f64) -> Self {
        Self {
            fov_y_deg: cfg.fov_y_deg,
            aspect,
            near: cfg.near,
            far: cfg.far,
            position: Vec3::new(0.0, 0.0, cfg.distance),
            target: Vec3::ZERO,
        }
    }

    pub fn set_aspect(&mut self, aspect: f64) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        let view = mat4_look_at_rh(self.position, self.target, Vec3::UP);
        let proj =
            mat4_perspective_rh_z0(self.fov_y_deg.to_radians(), self.aspect, self.near, self.far);
        mat4_mul(proj, view)
    }
}
