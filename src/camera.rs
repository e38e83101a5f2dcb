// ============================================================================
// camera.rs — Luxtree
// Camera rig that drifts with the hand position, plus the GPU uniform.
// ============================================================================

use glam::{Mat4, Vec2, Vec3};

use crate::control::PositionSignal;
use crate::morph::approach_factor;

pub const FOV_Y_DEGREES: f32 = 50.0;
pub const CAMERA_LOCAL: Vec3 = Vec3::new(0.0, 4.0, 20.0);
/// The whole tree sits this far below the rig origin.
pub const TREE_OFFSET_Y: f32 = -2.0;
pub const FOLLOW_RATE: f32 = 2.0;
/// Particle size factors are pixels at this view depth.
pub const POINT_REFERENCE_DEPTH: f32 = 20.0;

const HAND_SPAN_X: f32 = 5.0;
const HAND_SPAN_Y: f32 = 2.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 200.0;

/// GPU-side camera uniforms uploaded every frame.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub right: [f32; 4],
    pub up: [f32; 4],
    /// Eye position in tree space, for specular lighting.
    pub eye: [f32; 4],
    /// x: world units per size factor, y: elapsed seconds.
    pub params: [f32; 4],
}

/// CPU-side rig state smoothed between frames.
#[derive(Clone, Debug)]
pub struct CameraRig {
    pub offset: Vec2,
    pub yaw: f32,
    pub aspect: f32,
    pub viewport_height: f32,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            yaw: 0.0,
            aspect: 16.0 / 9.0,
            viewport_height: 720.0,
        }
    }
}

impl CameraRig {
    pub fn resize(&mut self, width: u32, height: u32) {
        let height = height.max(1);
        self.aspect = width.max(1) as f32 / height as f32;
        self.viewport_height = height as f32;
    }

    /// Where the rig wants to be for a given hand position. X is inverted so
    /// moving the hand right drags the scene left.
    pub fn target_for(position: PositionSignal) -> Vec2 {
        Vec2::new(-position.x * HAND_SPAN_X, position.y * HAND_SPAN_Y)
    }

    pub fn update(&mut self, position: PositionSignal, elapsed: f32, dt: f32) {
        let target = Self::target_for(position);
        self.offset += (target - self.offset) * approach_factor(FOLLOW_RATE, dt);
        self.yaw = (elapsed * 0.1).sin() * 0.1;
    }

    fn rig_transform(&self) -> Mat4 {
        Mat4::from_translation(self.offset.extend(0.0)) * Mat4::from_rotation_y(self.yaw)
    }

    pub fn eye(&self) -> Vec3 {
        self.rig_transform().transform_point3(CAMERA_LOCAL)
    }

    pub fn view(&self) -> Mat4 {
        (self.rig_transform() * Mat4::from_translation(CAMERA_LOCAL)).inverse()
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), self.aspect, Z_NEAR, Z_FAR)
    }

    /// World-space billboard size per unit size factor. A billboard of this
    /// size covers `factor * 20 / depth` pixels at any depth.
    pub fn point_world_scale(&self) -> f32 {
        let half_fov = FOV_Y_DEGREES.to_radians() * 0.5;
        POINT_REFERENCE_DEPTH * 2.0 * half_fov.tan() / self.viewport_height
    }

    pub fn uniforms(&self, elapsed: f32) -> CameraUniforms {
        let tree_offset = Vec3::new(0.0, TREE_OFFSET_Y, 0.0);
        let model = Mat4::from_translation(tree_offset);
        let view = self.view();
        let rotation = Mat4::from_rotation_y(self.yaw);
        let right = rotation.transform_vector3(Vec3::X);
        let up = rotation.transform_vector3(Vec3::Y);

        CameraUniforms {
            view_proj: (self.projection() * view * model).to_cols_array_2d(),
            right: right.extend(0.0).to_array(),
            up: up.extend(0.0).to_array(),
            eye: (self.eye() - tree_offset).extend(1.0).to_array(),
            params: [self.point_world_scale(), elapsed, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_hand_with_inverted_x() {
        let mut rig = CameraRig::default();
        let hand = PositionSignal { x: 0.5, y: -0.5 };
        for i in 0..600 {
            rig.update(hand, i as f32 / 60.0, 1.0 / 60.0);
        }
        assert!((rig.offset - Vec2::new(-2.5, -1.0)).length() < 1e-3);
    }

    #[test]
    fn follow_is_refresh_rate_independent() {
        let hand = PositionSignal { x: -1.0, y: 1.0 };
        let mut slow = CameraRig::default();
        let mut fast = CameraRig::default();
        for _ in 0..30 {
            slow.update(hand, 0.0, 1.0 / 30.0);
        }
        for _ in 0..120 {
            fast.update(hand, 0.0, 1.0 / 120.0);
        }
        assert!((slow.offset - fast.offset).length() < 1e-4);
    }

    #[test]
    fn yaw_sways_gently() {
        let mut rig = CameraRig::default();
        for t in [0.0f32, 3.0, 15.7, 100.0] {
            rig.update(PositionSignal::default(), t, 0.016);
            assert!(rig.yaw.abs() <= 0.1 + 1e-6);
            assert!((rig.yaw - (0.1 * t).sin() * 0.1).abs() < 1e-6);
        }
    }

    #[test]
    fn rest_eye_and_view() {
        let rig = CameraRig::default();
        assert!((rig.eye() - CAMERA_LOCAL).length() < 1e-5);
        // A point straight ahead of the camera lands on the view axis
        let p = rig.view().transform_point3(Vec3::new(0.0, 4.0, 0.0));
        assert!(p.x.abs() < 1e-5 && p.y.abs() < 1e-5);
        assert!((p.z + 20.0).abs() < 1e-5);
    }

    #[test]
    fn point_scale_follows_viewport() {
        let mut rig = CameraRig::default();
        rig.resize(1280, 720);
        let small = rig.point_world_scale();
        rig.resize(2560, 1440);
        assert!((small - 2.0 * rig.point_world_scale()).abs() < 1e-7);
        assert!((rig.aspect - 16.0 / 9.0).abs() < 1e-6);

        rig.resize(0, 0);
        assert!(rig.aspect.is_finite());
    }
}
