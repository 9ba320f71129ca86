use crate::scene::Aabb;
use glam::{Mat4, Vec3};

pub const FOV_Y_DEGREES: f32 = 45.0;
const NEAR: f32 = 0.01;
const FAR: f32 = 200.0;
/// Kept just short of straight up/down so the view basis never degenerates.
const MAX_PITCH: f32 = 1.569;
const DAMPING: f32 = 0.08;
const ROTATE_SPEED: f32 = 0.005;
const ZOOM_SPEED: f32 = 0.0015;
const PAN_SPEED: f32 = 0.0015;
const REST_EPSILON: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraPreset {
    Front,
    Side,
    Top,
    Detail,
    Isometric,
}

impl CameraPreset {
    pub const ALL: [CameraPreset; 5] = [
        CameraPreset::Front,
        CameraPreset::Side,
        CameraPreset::Top,
        CameraPreset::Detail,
        CameraPreset::Isometric,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CameraPreset::Front => "Front",
            CameraPreset::Side => "Side",
            CameraPreset::Top => "Top",
            CameraPreset::Detail => "Detail",
            CameraPreset::Isometric => "Isometric",
        }
    }

    /// Number-key shortcut (1-5).
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            1 => Some(CameraPreset::Front),
            2 => Some(CameraPreset::Side),
            3 => Some(CameraPreset::Top),
            4 => Some(CameraPreset::Detail),
            5 => Some(CameraPreset::Isometric),
            _ => None,
        }
    }
}

/// Named preset, or free after the user dragged/zoomed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    Preset(CameraPreset),
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Framing {
    pub position: Vec3,
    pub target: Vec3,
    pub min_distance: f32,
}

/// Camera placement for `preset` around `bounds`; pure and deterministic.
pub fn compute_framing(preset: CameraPreset, bounds: &Aabb) -> Framing {
    let target = bounds.center();
    let size = bounds.max_extent().max(1e-3);
    // Distance at which the largest extent exactly fills the vertical fov.
    let fit = (size * 0.5) / (FOV_Y_DEGREES.to_radians() * 0.5).tan();
    let distance = fit * 1.5;

    let (direction, distance, min_distance) = match preset {
        CameraPreset::Front => (Vec3::Z, distance, size * 0.5),
        CameraPreset::Side => (Vec3::X, distance, size * 0.5),
        // Slight z offset keeps look_at away from the +Y singularity.
        CameraPreset::Top => (Vec3::new(0.0, 1.0, 0.01), distance, size * 0.5),
        CameraPreset::Detail => (Vec3::new(0.35, 0.25, 1.0), distance * 0.55, size * 0.15),
        CameraPreset::Isometric => (Vec3::ONE, distance, size * 0.5),
    };
    Framing {
        position: target + direction.normalize() * distance,
        target,
        min_distance,
    }
}

/// View parameters handed to the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub fov_y: f32,
}

impl Camera {
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        let projection = Mat4::perspective_rh(self.fov_y, aspect.max(1e-3), NEAR, FAR);
        let view = Mat4::look_at_rh(self.position, self.target, Vec3::Y);
        projection * view
    }
}

/// Damped orbit around a target: yaw about +Y, pitch towards the poles.
#[derive(Debug, Clone, Copy)]
pub struct OrbitControls {
    pub target: Vec3,
    radius: f32,
    yaw: f32,
    pitch: f32,
    yaw_velocity: f32,
    pitch_velocity: f32,
    zoom_velocity: f32,
    pan_velocity: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
    pub auto_rotate: bool,
    /// Radians per second.
    pub auto_rotate_speed: f32,
}

impl OrbitControls {
    pub fn new(framing: Framing, auto_rotate_speed: f32) -> Self {
        let mut controls = Self {
            target: Vec3::ZERO,
            radius: 1.0,
            yaw: 0.0,
            pitch: 0.0,
            yaw_velocity: 0.0,
            pitch_velocity: 0.0,
            zoom_velocity: 0.0,
            pan_velocity: Vec3::ZERO,
            min_distance: 0.5,
            max_distance: 50.0,
            auto_rotate: false,
            auto_rotate_speed,
        };
        controls.set_framing(&framing);
        controls
    }

    /// Jumps to `framing` and drops any residual motion.
    pub fn set_framing(&mut self, framing: &Framing) {
        let offset = framing.position - framing.target;
        self.target = framing.target;
        self.radius = offset.length().max(1e-4);
        self.yaw = offset.x.atan2(offset.z);
        self.pitch = (offset.y / self.radius).clamp(-1.0, 1.0).asin().clamp(-MAX_PITCH, MAX_PITCH);
        self.min_distance = framing.min_distance;
        self.yaw_velocity = 0.0;
        self.pitch_velocity = 0.0;
        self.zoom_velocity = 0.0;
        self.pan_velocity = Vec3::ZERO;
    }

    pub fn position(&self) -> Vec3 {
        self.target + self.offset_direction() * self.radius
    }

    pub fn camera(&self) -> Camera {
        Camera {
            position: self.position(),
            target: self.target,
            fov_y: FOV_Y_DEGREES.to_radians(),
        }
    }

    /// Pointer drag in pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw_velocity -= dx * ROTATE_SPEED;
        self.pitch_velocity += dy * ROTATE_SPEED;
    }

    /// Scroll delta in points; positive zooms in.
    pub fn zoom(&mut self, delta: f32) {
        self.zoom_velocity += delta * ZOOM_SPEED;
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        let (right, up) = self.screen_axes();
        let scale = self.radius * PAN_SPEED;
        self.pan_velocity += (-right * dx + up * dy) * scale;
    }

    /// Advances one frame; returns whether the camera moved.
    pub fn update(&mut self, dt: f32) -> bool {
        let before = (self.target, self.radius, self.yaw, self.pitch);

        if self.auto_rotate {
            self.yaw += self.auto_rotate_speed * dt;
        }
        self.yaw += self.yaw_velocity;
        self.pitch = (self.pitch + self.pitch_velocity).clamp(-MAX_PITCH, MAX_PITCH);
        self.radius = (self.radius * (-self.zoom_velocity).exp())
            .clamp(self.min_distance, self.max_distance);
        self.target += self.pan_velocity;
        wrap_angle(&mut self.yaw);

        let keep = 1.0 - DAMPING;
        self.yaw_velocity = settle(self.yaw_velocity * keep);
        self.pitch_velocity = settle(self.pitch_velocity * keep);
        self.zoom_velocity = settle(self.zoom_velocity * keep);
        self.pan_velocity *= keep;
        if self.pan_velocity.length_squared() < REST_EPSILON * REST_EPSILON {
            self.pan_velocity = Vec3::ZERO;
        }

        before != (self.target, self.radius, self.yaw, self.pitch)
    }

    fn offset_direction(&self) -> Vec3 {
        let cos_pitch = self.pitch.cos();
        Vec3::new(
            cos_pitch * self.yaw.sin(),
            self.pitch.sin(),
            cos_pitch * self.yaw.cos(),
        )
    }

    fn screen_axes(&self) -> (Vec3, Vec3) {
        let forward = -self.offset_direction();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();
        (right, up)
    }
}

fn settle(value: f32) -> f32 {
    if value.abs() < REST_EPSILON {
        0.0
    } else {
        value
    }
}

fn wrap_angle(angle: &mut f32) {
    const TWO_PI: f32 = std::f32::consts::PI * 2.0;
    if angle.is_finite() {
        *angle = (*angle + std::f32::consts::PI).rem_euclid(TWO_PI) - std::f32::consts::PI;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_bounds() -> Aabb {
        Aabb::from_min_max(Vec3::new(-1.0, -1.0, -0.1), Vec3::new(1.0, 1.3, 0.1))
    }

    #[test]
    fn framing_is_idempotent_for_every_preset() {
        let bounds = ring_bounds();
        for preset in CameraPreset::ALL {
            assert_eq!(compute_framing(preset, &bounds), compute_framing(preset, &bounds));
        }
    }

    #[test]
    fn reapplying_a_preset_lands_on_the_same_pose() {
        let bounds = ring_bounds();
        let framing = compute_framing(CameraPreset::Isometric, &bounds);
        let mut controls = OrbitControls::new(compute_framing(CameraPreset::Front, &bounds), 0.5);
        controls.set_framing(&framing);
        let first = (controls.position(), controls.target);
        controls.rotate(40.0, -10.0);
        controls.update(1.0 / 60.0);
        controls.set_framing(&framing);
        let second = (controls.position(), controls.target);
        assert!((first.0 - second.0).length() < 1e-5);
        assert_eq!(first.1, second.1);
        assert!((controls.position() - framing.position).length() < 1e-4);
    }

    #[test]
    fn front_looks_down_negative_z_at_the_centre() {
        let bounds = Aabb::from_min_max(Vec3::splat(-1.0), Vec3::splat(1.0));
        let framing = compute_framing(CameraPreset::Front, &bounds);
        assert_eq!(framing.target, Vec3::ZERO);
        assert!(framing.position.x.abs() < 1e-6 && framing.position.y.abs() < 1e-6);
        assert!(framing.position.z > 2.0);
    }

    #[test]
    fn detail_is_closer_and_allows_closer_zoom() {
        let bounds = ring_bounds();
        let front = compute_framing(CameraPreset::Front, &bounds);
        let detail = compute_framing(CameraPreset::Detail, &bounds);
        let front_distance = (front.position - front.target).length();
        let detail_distance = (detail.position - detail.target).length();
        assert!(detail_distance < front_distance);
        assert!(detail.min_distance < front.min_distance);
    }

    #[test]
    fn framing_follows_the_bounds_centre() {
        let bounds = Aabb::from_min_max(Vec3::new(4.0, 4.0, 4.0), Vec3::new(6.0, 6.0, 6.0));
        let top = compute_framing(CameraPreset::Top, &bounds);
        assert_eq!(top.target, Vec3::splat(5.0));
        assert!(top.position.y > 5.0);
    }

    #[test]
    fn damping_brings_motion_to_rest() {
        let bounds = ring_bounds();
        let mut controls = OrbitControls::new(compute_framing(CameraPreset::Front, &bounds), 0.5);
        controls.rotate(100.0, 20.0);
        controls.zoom(120.0);
        controls.pan(10.0, 5.0);
        assert!(controls.update(1.0 / 60.0));
        for _ in 0..600 {
            controls.update(1.0 / 60.0);
        }
        assert_eq!(controls.yaw_velocity, 0.0);
        assert_eq!(controls.pitch_velocity, 0.0);
        assert_eq!(controls.zoom_velocity, 0.0);
        assert_eq!(controls.pan_velocity, Vec3::ZERO);
        assert!(!controls.update(1.0 / 60.0));
        assert!(controls.position().is_finite());
    }

    #[test]
    fn zoom_respects_min_distance() {
        let bounds = ring_bounds();
        let framing = compute_framing(CameraPreset::Front, &bounds);
        let mut controls = OrbitControls::new(framing, 0.5);
        for _ in 0..100 {
            controls.zoom(10_000.0);
            controls.update(1.0 / 60.0);
        }
        assert!(controls.radius >= framing.min_distance - 1e-5);
    }

    #[test]
    fn auto_rotate_spins_at_rest() {
        let bounds = ring_bounds();
        let mut controls = OrbitControls::new(compute_framing(CameraPreset::Front, &bounds), 1.0);
        controls.auto_rotate = true;
        let before = controls.position();
        assert!(controls.update(0.5));
        assert!((controls.position() - before).length() > 0.1);
        assert!((controls.radius - (before - controls.target).length()).abs() < 1e-4);
    }

    #[test]
    fn view_projection_maps_target_to_screen_centre() {
        let camera = Camera {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            fov_y: FOV_Y_DEGREES.to_radians(),
        };
        let clip = camera.view_projection(1.5) * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-6 && ndc.y.abs() < 1e-6);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn digits_map_to_presets() {
        assert_eq!(CameraPreset::from_digit(1), Some(CameraPreset::Front));
        assert_eq!(CameraPreset::from_digit(5), Some(CameraPreset::Isometric));
        assert_eq!(CameraPreset::from_digit(6), None);
    }
}
