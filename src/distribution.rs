// ============================================================================
// distribution.rs — Luxtree
// Procedural generation of per-entity chaos (sphere shell) and formed (cone)
// endpoints. Endpoints are generated once per group and never mutated.
// ============================================================================

use std::f32::consts::{PI, TAU};

use rand::Rng;
use serde::Deserialize;

/// Vertical shift applied to every formed position so the cone is recentered.
pub const TARGET_SHIFT_Y: f32 = -2.0;

// ======================== Shape Kinds ========================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShapeKind {
    FineParticle,
    OrnamentBall,
    OrnamentGift,
}

/// How formed positions are placed relative to the cone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConePlacement {
    /// Uniform radius in `[0, cone radius]`: fills the cone.
    Volume,
    /// On the cone surface, pushed outward (positive) or inward (negative).
    Surface { offset: f32 },
}

/// Geometric bounds of both distributions for one shape kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeProfile {
    pub chaos_inner_radius: f32,
    pub chaos_thickness: f32,
    /// Heights are sampled in `[0, fill_height)`.
    pub fill_height: f32,
    pub cone_height: f32,
    pub cone_base_radius: f32,
    pub placement: ConePlacement,
}

impl ShapeKind {
    pub fn profile(self) -> ShapeProfile {
        match self {
            ShapeKind::FineParticle => ShapeProfile {
                chaos_inner_radius: 10.0,
                chaos_thickness: 10.0,
                fill_height: 12.0,
                cone_height: 12.0,
                cone_base_radius: 4.5,
                placement: ConePlacement::Volume,
            },
            ShapeKind::OrnamentBall => ShapeProfile {
                chaos_inner_radius: 15.0,
                chaos_thickness: 10.0,
                fill_height: 11.0,
                cone_height: 12.0,
                cone_base_radius: 4.0,
                placement: ConePlacement::Surface { offset: -0.1 },
            },
            ShapeKind::OrnamentGift => ShapeProfile {
                chaos_inner_radius: 15.0,
                chaos_thickness: 10.0,
                fill_height: 11.0,
                cone_height: 12.0,
                cone_base_radius: 4.0,
                placement: ConePlacement::Surface { offset: 0.2 },
            },
        }
    }

    pub fn is_particle(self) -> bool {
        self == ShapeKind::FineParticle
    }

    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::FineParticle => "fine particle",
            ShapeKind::OrnamentBall => "ornament ball",
            ShapeKind::OrnamentGift => "ornament gift",
        }
    }
}

// ======================== Entity Samples ========================

/// Immutable per-entity endpoints and random scalars.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntitySample {
    pub chaos_position: [f32; 3],
    pub target_position: [f32; 3],
    pub random: f32,
    pub rotation_seed: [f32; 3],
}

/// Generate `count` samples for a shape kind. `count == 0` yields an empty vec.
pub fn generate<R: Rng + ?Sized>(count: usize, kind: ShapeKind, rng: &mut R) -> Vec<EntitySample> {
    let profile = kind.profile();
    (0..count).map(|_| sample_entity(&profile, rng)).collect()
}

fn sample_entity<R: Rng + ?Sized>(profile: &ShapeProfile, rng: &mut R) -> EntitySample {
    let random = rng.gen::<f32>();
    let chaos_position = sample_sphere_shell(
        profile.chaos_inner_radius,
        profile.chaos_thickness,
        rng,
    );
    let target_position = sample_cone(profile, rng);
    let rotation_seed = [
        rng.gen::<f32>() * PI,
        rng.gen::<f32>() * PI,
        rng.gen::<f32>() * PI,
    ];

    EntitySample {
        chaos_position,
        target_position,
        random,
        rotation_seed,
    }
}

/// Uniform direction on the sphere: polar angle through `acos(2u - 1)` so
/// samples do not bunch up at the poles.
fn sample_sphere_shell<R: Rng + ?Sized>(inner: f32, thickness: f32, rng: &mut R) -> [f32; 3] {
    let theta = rng.gen::<f32>() * TAU;
    let phi = (rng.gen::<f32>() * 2.0 - 1.0).clamp(-1.0, 1.0).acos();
    let r = inner + rng.gen::<f32>() * thickness;
    [
        r * phi.sin() * theta.cos(),
        r * phi.sin() * theta.sin(),
        r * phi.cos(),
    ]
}

fn sample_cone<R: Rng + ?Sized>(profile: &ShapeProfile, rng: &mut R) -> [f32; 3] {
    let h = rng.gen::<f32>() * profile.fill_height;
    let cone_radius = profile.cone_base_radius * (1.0 - h / profile.cone_height);
    let radius = match profile.placement {
        ConePlacement::Volume => rng.gen::<f32>() * cone_radius,
        ConePlacement::Surface { offset } => cone_radius + offset,
    };
    let angle = rng.gen::<f32>() * TAU;
    [
        radius * angle.cos(),
        h + TARGET_SHIFT_Y,
        radius * angle.sin(),
    ]
}
