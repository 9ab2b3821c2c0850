//! Orbit camera controls for looking around inside a panorama sphere.
//!
//! The camera orbits a target at a small fixed distance on a sphere
//! parameterized by `theta` (azimuth around +Y) and `phi` (polar angle from +Y).
//! Dragging accumulates angular deltas that `update` applies; with damping
//! enabled the remaining delta decays over the following frames instead of
//! stopping dead.

use foundation::math::Vec3;

use crate::config::ControlsConfig;
use crate::scene::Camera;

/// Polar angle is kept this far away from the poles.
const PHI_EPS: f64 = 1e-6;

/// Remaining rotation below this (radians) is dropped.
const DELTA_EPS: f64 = 1e-6;

const MIN_DISTANCE: f64 = 0.01;
const MAX_DISTANCE: f64 = 400.0;

/// Camera controller capability used by the render loop.
pub trait OrbitController {
    /// Advances one frame; returns whether the camera moved.
    fn update(&mut self, dt_s: f64) -> bool;
    fn dispose(&mut self);
    fn set_zoom_enabled(&mut self, enabled: bool);
    fn set_pan_enabled(&mut self, enabled: bool);
    fn set_rotate_speed(&mut self, speed: f64);
    fn set_viewport(&mut self, width_px: f64, height_px: f64);
    fn pointer_down(&mut self, pos_px: [f64; 2]);
    fn pointer_move(&mut self, pos_px: [f64; 2]);
    fn pointer_up(&mut self);
    fn wheel(&mut self, delta: f64);
    fn is_dragging(&self) -> bool;
    /// Unit vector the camera looks along.
    fn eye_direction(&self) -> Vec3;
    /// Writes the controller pose into `camera`.
    fn apply_to(&self, camera: &mut Camera);
}

#[derive(Debug, Clone)]
pub struct OrbitControls {
    target: Vec3,
    distance: f64,
    target_distance: f64,
    theta: f64,
    phi: f64,
    delta_theta: f64,
    delta_phi: f64,
    rotate_speed: f64,
    damping: f64,
    zoom_enabled: bool,
    pan_enabled: bool,
    viewport_height: f64,
    dragging: bool,
    last_pos_px: [f64; 2],
    disposed: bool,
}

impl OrbitControls {
    /// Controls orbiting the camera's target from its current position.
    pub fn new(camera: &Camera, cfg: &ControlsConfig) -> Self {
        let offset = camera.position - camera.target;
        let distance = offset.length().max(MIN_DISTANCE);
        let theta = offset.x.atan2(offset.z);
        let phi = (offset.y / distance).clamp(-1.0, 1.0).acos();
        Self {
            target: camera.target,
            distance,
            target_distance: distance,
            theta,
            phi,
            delta_theta: 0.0,
            delta_phi: 0.0,
            rotate_speed: cfg.rotate_speed,
            damping: cfg.damping,
            zoom_enabled: cfg.enable_zoom,
            pan_enabled: cfg.enable_pan,
            viewport_height: 1.0,
            dragging: false,
            last_pos_px: [0.0, 0.0],
            disposed: false,
        }
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn phi(&self) -> f64 {
        self.phi
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn pan_enabled(&self) -> bool {
        self.pan_enabled
    }

    pub fn zoom_enabled(&self) -> bool {
        self.zoom_enabled
    }

    /// Unit vector from the camera towards where it looks.
    pub fn view_direction(&self) -> Vec3 {
        self.offset().normalize().scale(-1.0)
    }

    fn offset(&self) -> Vec3 {
        let sin_phi = self.phi.sin();
        Vec3::new(
            self.distance * sin_phi * self.theta.sin(),
            self.distance * self.phi.cos(),
            self.distance * sin_phi * self.theta.cos(),
        )
    }

    fn has_motion(&self) -> bool {
        self.delta_theta.abs() > DELTA_EPS || self.delta_phi.abs() > DELTA_EPS
    }
}

impl OrbitController for OrbitControls {
    fn update(&mut self, dt_s: f64) -> bool {
        if self.disposed {
            return false;
        }
        let mut moved = false;

        if self.has_motion() {
            // With damping only a frame's share of the pending delta is applied.
            let share = if self.damping > 0.0 && !self.dragging {
                let frames = (dt_s * 60.0).max(1.0);
                1.0 - (1.0 - self.damping).powf(frames)
            } else {
                1.0
            };
            self.theta += self.delta_theta * share;
            self.phi = (self.phi + self.delta_phi * share).clamp(PHI_EPS, std::f64::consts::PI - PHI_EPS);
            self.delta_theta *= 1.0 - share;
            self.delta_phi *= 1.0 - share;
            if !self.has_motion() {
                self.delta_theta = 0.0;
                self.delta_phi = 0.0;
            }
            moved = true;
        }

        if (self.target_distance - self.distance).abs() > 1e-9 {
            let alpha = 1.0 - (-8.0 * dt_s.clamp(0.0, 0.1)).exp();
            self.distance += (self.target_distance - self.distance) * alpha.max(0.1);
            moved = true;
        }
        moved
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.dragging = false;
        self.delta_theta = 0.0;
        self.delta_phi = 0.0;
    }

    fn set_zoom_enabled(&mut self, enabled: bool) {
        self.zoom_enabled = enabled;
    }

    fn set_pan_enabled(&mut self, enabled: bool) {
        self.pan_enabled = enabled;
    }

    fn set_rotate_speed(&mut self, speed: f64) {
        self.rotate_speed = speed;
    }

    fn set_viewport(&mut self, _width_px: f64, height_px: f64) {
        self.viewport_height = height_px.max(1.0);
    }

    fn pointer_down(&mut self, pos_px: [f64; 2]) {
        if self.disposed {
            return;
        }
        self.dragging = true;
        self.last_pos_px = pos_px;
    }

    fn pointer_move(&mut self, pos_px: [f64; 2]) {
        if !self.dragging || self.disposed {
            return;
        }
        let dx = pos_px[0] - self.last_pos_px[0];
        let dy = pos_px[1] - self.last_pos_px[1];
        self.last_pos_px = pos_px;

        // A drag across the full viewport height is one full turn at speed 1.
        let scale = std::f64::consts::TAU / self.viewport_height * self.rotate_speed;
        self.delta_theta -= dx * scale;
        self.delta_phi -= dy * scale;
    }

    fn pointer_up(&mut self) {
        self.dragging = false;
    }

    fn wheel(&mut self, delta: f64) {
        if !self.zoom_enabled || self.disposed {
            return;
        }
        self.target_distance =
            (self.target_distance * (delta * 0.002).exp()).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    fn is_dragging(&self) -> bool {
        self.dragging
    }

    fn eye_direction(&self) -> Vec3 {
        self.view_direction()
    }

    fn apply_to(&self, camera: &mut Camera) {
        camera.target = self.target;
        camera.position = self.target + self.offset();
    }
}

#[cfg(test)]
mod tests {
    use super::{OrbitControls, OrbitController};
    use crate::config::{CameraConfig, ControlsConfig};
    use crate::scene::Camera;

    fn controls(damping: f64) -> (Camera, OrbitControls) {
        let camera = Camera::perspective(&CameraConfig::default(), 1.0);
        let cfg = ControlsConfig {
            damping,
            ..ControlsConfig::default()
        };
        let mut c = OrbitControls::new(&camera, &cfg);
        c.set_viewport(800.0, 400.0);
        (camera, c)
    }

    #[test]
    fn initial_pose_matches_camera() {
        let (camera, c) = controls(0.0);
        let mut cam2 = camera;
        c.apply_to(&mut cam2);
        assert!((cam2.position - camera.position).length() < 1e-9);
        assert!((c.distance() - 0.1).abs() < 1e-12);
        assert!(c.view_direction().z < -0.99);
    }

    #[test]
    fn negative_speed_inverts_horizontal_drag() {
        let (_, mut c) = controls(0.0);
        let before = c.theta();
        c.pointer_down([100.0, 100.0]);
        c.pointer_move([140.0, 100.0]);
        assert!(c.update(1.0 / 60.0));
        // rotate_speed is -0.5: dragging right increases theta.
        assert!(c.theta() > before);
    }

    #[test]
    fn polar_angle_is_clamped() {
        let (_, mut c) = controls(0.0);
        c.pointer_down([0.0, 0.0]);
        c.pointer_move([0.0, 100_000.0]);
        c.update(1.0 / 60.0);
        assert!(c.phi() > 0.0 && c.phi() < std::f64::consts::PI);
    }

    #[test]
    fn damping_spreads_rotation_over_frames() {
        let (_, mut c) = controls(0.05);
        let start = c.theta();
        c.pointer_down([0.0, 0.0]);
        c.pointer_move([40.0, 0.0]);
        c.pointer_up();
        c.update(1.0 / 60.0);
        let after_one = c.theta() - start;
        for _ in 0..600 {
            c.update(1.0 / 60.0);
        }
        let total = c.theta() - start;
        assert!(after_one > 0.0 && after_one < total);
        assert!(!c.update(1.0 / 60.0));
    }

    #[test]
    fn wheel_is_ignored_while_zoom_disabled() {
        let (_, mut c) = controls(0.0);
        c.wheel(500.0);
        assert!(!c.update(1.0 / 60.0));
        c.set_zoom_enabled(true);
        c.wheel(500.0);
        assert!(c.update(1.0 / 60.0));
        assert!(c.distance() > 0.1);
    }

    #[test]
    fn disposed_controls_ignore_input() {
        let (_, mut c) = controls(0.0);
        c.dispose();
        c.pointer_down([0.0, 0.0]);
        c.pointer_move([50.0, 0.0]);
        assert!(!c.is_dragging());
        assert!(!c.update(1.0 / 60.0));
        assert!(c.is_disposed());
    }
}
