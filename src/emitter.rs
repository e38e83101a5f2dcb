// ============================================================================
// emitter.rs — Luxtree
// Per-tick transform emission: recomputes every entity from its immutable
// endpoints and the group's progress, writing GPU-layout instance records.
// ============================================================================

use bytemuck::{Pod, Zeroable};
use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::distribution::EntitySample;
use crate::morph::ease;

/// Fine particles only breathe once the group is nearly formed.
pub const BREATHING_THRESHOLD: f32 = 0.8;
/// Ornaments tumble until progress settles past this value.
pub const ROTATION_SETTLE_THRESHOLD: f32 = 0.99;

const BREATHING_AMPLITUDE: f32 = 0.05;

// ======================== Instance Records ========================

/// One billboarded fine particle.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleInstance {
    pub position: [f32; 3],
    /// Size factor in screen pixels at a view depth of 20 units.
    pub size: f32,
    pub alpha: f32,
    pub _pad: [f32; 3],
}

/// One instanced ornament; the model matrix is stored column-major.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct OrnamentInstance {
    pub model: [[f32; 4]; 4],
}

impl Default for OrnamentInstance {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY.to_cols_array_2d(),
        }
    }
}

#[cfg(test)]
impl OrnamentInstance {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}

// ======================== Emission ========================

pub fn lerp3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

/// Rewrite every particle record. `out` is resized to match `samples`.
pub fn emit_particles(
    samples: &[EntitySample],
    progress: f32,
    elapsed: f32,
    out: &mut Vec<ParticleInstance>,
) {
    out.resize(samples.len(), ParticleInstance::default());
    if samples.is_empty() {
        return;
    }

    let eased = ease(progress);
    let breathing = progress > BREATHING_THRESHOLD;

    for (sample, slot) in samples.iter().zip(out.iter_mut()) {
        let mut pos = lerp3(sample.chaos_position, sample.target_position, eased);
        if breathing {
            pos[0] += (elapsed * 2.0 + pos[1]).sin() * BREATHING_AMPLITUDE * eased;
            pos[2] += (elapsed * 1.5 + pos[1]).cos() * BREATHING_AMPLITUDE * eased;
        }

        *slot = ParticleInstance {
            position: pos,
            size: 4.0 * sample.random + 2.0,
            alpha: 0.6 + 0.4 * (elapsed * 3.0 + sample.random * 10.0).sin(),
            _pad: [0.0; 3],
        };
    }
}

/// Rewrite every ornament record. `out` is resized to match `samples`.
pub fn emit_ornaments(
    samples: &[EntitySample],
    progress: f32,
    elapsed: f32,
    base_scale: f32,
    out: &mut Vec<OrnamentInstance>,
) {
    out.resize(samples.len(), OrnamentInstance::default());
    if samples.is_empty() {
        return;
    }

    let eased = ease(progress);
    let tumbling = progress < ROTATION_SETTLE_THRESHOLD;
    // Grow slightly while assembling
    let scale = Vec3::splat(base_scale * (0.8 + 0.4 * eased));

    for (sample, slot) in samples.iter().zip(out.iter_mut()) {
        let position = Vec3::from(lerp3(sample.chaos_position, sample.target_position, eased));
        let [rx, ry, rz] = sample.rotation_seed;
        let rotation = if tumbling {
            Quat::from_euler(EulerRot::XYZ, rx + elapsed, ry + elapsed, rz)
        } else {
            Quat::from_euler(EulerRot::XYZ, rx, ry, rz)
        };

        slot.model = Mat4::from_scale_rotation_translation(scale, rotation, position)
            .to_cols_array_2d();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::{generate, ShapeKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample() -> EntitySample {
        EntitySample {
            chaos_position: [10.0, -4.0, 6.0],
            target_position: [1.0, 3.0, -1.0],
            random: 0.5,
            rotation_seed: [0.3, 0.6, 0.9],
        }
    }

    fn close(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn empty_group_is_noop() {
        let mut particles = vec![ParticleInstance::default(); 3];
        emit_particles(&[], 0.5, 1.0, &mut particles);
        assert!(particles.is_empty());

        let mut ornaments = Vec::new();
        emit_ornaments(&[], 0.5, 1.0, 0.25, &mut ornaments);
        assert!(ornaments.is_empty());
    }

    #[test]
    fn particles_sit_on_endpoints_without_breathing() {
        let samples = [sample()];
        let mut out = Vec::new();

        emit_particles(&samples, 0.0, 3.0, &mut out);
        assert!(close(out[0].position, samples[0].chaos_position));

        // Below the threshold there is no breathing offset
        emit_particles(&samples, 0.5, 3.0, &mut out);
        let mid = lerp3(samples[0].chaos_position, samples[0].target_position, ease(0.5));
        assert!(close(out[0].position, mid));
    }

    #[test]
    fn formed_particles_breathe_around_target() {
        let samples = [sample()];
        let mut out = Vec::new();
        emit_particles(&samples, 1.0, 0.7, &mut out);

        let target = samples[0].target_position;
        let p = out[0].position;
        assert_eq!(p[1], target[1]);
        let expected_x = target[0] + (0.7f32 * 2.0 + target[1]).sin() * 0.05;
        let expected_z = target[2] + (0.7f32 * 1.5 + target[1]).cos() * 0.05;
        assert!((p[0] - expected_x).abs() < 1e-5);
        assert!((p[2] - expected_z).abs() < 1e-5);
    }

    #[test]
    fn particle_size_and_alpha() {
        let samples = [sample()];
        let mut out = Vec::new();
        emit_particles(&samples, 1.0, 0.0, &mut out);
        assert_eq!(out[0].size, 4.0);
        assert!((out[0].alpha - (0.6 + 0.4 * 5.0f32.sin())).abs() < 1e-5);
    }

    #[test]
    fn ornament_scale_grows_with_progress() {
        let samples = [sample()];
        let mut out = Vec::new();

        emit_ornaments(&samples, 0.0, 0.0, 0.25, &mut out);
        let (chaos_scale, _, chaos_pos) = out[0].matrix().to_scale_rotation_translation();
        assert!((chaos_scale.x - 0.2).abs() < 1e-5);
        assert!(close(chaos_pos.into(), samples[0].chaos_position));

        emit_ornaments(&samples, 1.0, 0.0, 0.25, &mut out);
        let (formed_scale, _, formed_pos) = out[0].matrix().to_scale_rotation_translation();
        assert!((formed_scale.x - 0.3).abs() < 1e-5);
        assert!(close(formed_pos.into(), samples[0].target_position));
    }

    #[test]
    fn ornament_rotation_tumbles_then_freezes() {
        let samples = [sample()];
        let mut at_1 = Vec::new();
        let mut at_2 = Vec::new();

        emit_ornaments(&samples, 0.5, 1.0, 0.25, &mut at_1);
        emit_ornaments(&samples, 0.5, 2.0, 0.25, &mut at_2);
        assert_ne!(at_1[0], at_2[0], "mid-transition rotation follows time");

        emit_ornaments(&samples, 0.995, 1.0, 0.25, &mut at_1);
        emit_ornaments(&samples, 0.995, 2.0, 0.25, &mut at_2);
        assert_eq!(at_1[0], at_2[0], "settled rotation is frozen to the seed");

        let (_, rotation, _) = at_1[0].matrix().to_scale_rotation_translation();
        let seed = Quat::from_euler(EulerRot::XYZ, 0.3, 0.6, 0.9);
        assert!(rotation.dot(seed).abs() > 0.9999);
    }

    #[test]
    fn recompute_is_stateless() {
        // Emission depends only on (samples, progress, time): replaying the
        // same inputs reproduces the same buffer regardless of history.
        let mut rng = StdRng::seed_from_u64(11);
        let samples = generate(64, ShapeKind::OrnamentBall, &mut rng);
        let mut fresh = Vec::new();
        emit_ornaments(&samples, 0.42, 5.0, 0.2, &mut fresh);

        let mut reused = Vec::new();
        for p in [0.0, 1.0, 0.7, 0.1] {
            emit_ornaments(&samples, p, p * 9.0, 0.2, &mut reused);
        }
        emit_ornaments(&samples, 0.42, 5.0, 0.2, &mut reused);
        assert_eq!(fresh, reused);
    }
}
