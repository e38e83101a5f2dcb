// ============================================================================
// scene.rs — Luxtree
// Entity groups: immutable samples, a morph driver, and the CPU instance
// buffers rewritten every tick. GPU resources live in pipeline.rs.
// ============================================================================

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{GroupConfig, SceneConfig};
use crate::control::ControlSnapshot;
use crate::distribution::{generate, EntitySample, ShapeKind};
use crate::emitter::{emit_ornaments, emit_particles, OrnamentInstance, ParticleInstance};
use crate::morph::{DiscreteState, MorphDriver};

/// Per-kind instance records of one group.
#[derive(Clone, Debug)]
pub enum Instances {
    Particles(Vec<ParticleInstance>),
    Ornaments(Vec<OrnamentInstance>),
}

impl Instances {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Instances::Particles(v) => bytemuck::cast_slice(v),
            Instances::Ornaments(v) => bytemuck::cast_slice(v),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Instances::Particles(v) => v.len(),
            Instances::Ornaments(v) => v.len(),
        }
    }
}

pub struct EntityGroup {
    pub config: GroupConfig,
    samples: Vec<EntitySample>,
    driver: MorphDriver,
    instances: Instances,
}

impl EntityGroup {
    pub fn new<R: Rng + ?Sized>(config: GroupConfig, rng: &mut R) -> Self {
        let samples = generate(config.count, config.kind, rng);
        let instances = if config.kind.is_particle() {
            Instances::Particles(Vec::with_capacity(samples.len()))
        } else {
            Instances::Ornaments(Vec::with_capacity(samples.len()))
        };
        let driver = MorphDriver::new(config.rate);
        let mut group = Self {
            config,
            samples,
            driver,
            instances,
        };
        group.emit(0.0);
        group
    }

    pub fn kind(&self) -> ShapeKind {
        self.config.kind
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn progress(&self) -> f32 {
        self.driver.progress()
    }

    #[cfg(test)]
    pub fn samples(&self) -> &[EntitySample] {
        &self.samples
    }

    pub fn instances(&self) -> &Instances {
        &self.instances
    }

    /// Advance the driver toward `state`, then rewrite every instance.
    pub fn tick(&mut self, state: DiscreteState, elapsed: f32, dt: f32) {
        self.driver.advance(state, dt);
        self.emit(elapsed);
    }

    fn emit(&mut self, elapsed: f32) {
        let progress = self.driver.progress();
        match &mut self.instances {
            Instances::Particles(out) => emit_particles(&self.samples, progress, elapsed, out),
            Instances::Ornaments(out) => {
                emit_ornaments(&self.samples, progress, elapsed, self.config.base_scale, out)
            }
        }
    }
}

// ======================== Scene ========================

pub struct Scene {
    pub groups: Vec<EntityGroup>,
    elapsed: f32,
}

impl Scene {
    pub fn new(config: &SceneConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let groups: Vec<_> = config
            .groups
            .iter()
            .cloned()
            .map(|g| EntityGroup::new(g, &mut rng))
            .collect();

        for g in &groups {
            log::info!("Group {}: {} x {}", g.name(), g.len(), g.kind().name());
        }

        Self {
            groups,
            elapsed: 0.0,
        }
    }

    /// One render tick. The snapshot is read once so every group sees the
    /// same state.
    pub fn tick(&mut self, snapshot: &ControlSnapshot, dt: f32) {
        let dt = dt.max(0.0);
        self.elapsed += dt;
        for group in &mut self.groups {
            group.tick(snapshot.state, self.elapsed, dt);
        }
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn entity_count(&self) -> usize {
        self.groups.iter().map(EntityGroup::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_groups;
    use crate::control::PositionSignal;

    fn small_scene() -> Scene {
        let mut groups = default_groups();
        for g in &mut groups {
            g.count = g.count.min(40);
        }
        Scene::new(&SceneConfig {
            groups,
            seed: Some(7),
            ..SceneConfig::default()
        })
    }

    fn snapshot(state: DiscreteState) -> ControlSnapshot {
        ControlSnapshot {
            state,
            position: PositionSignal::default(),
        }
    }

    #[test]
    fn starts_formed_and_emitted() {
        let scene = small_scene();
        assert_eq!(scene.groups.len(), 4);
        for g in &scene.groups {
            assert_eq!(g.progress(), 1.0);
            assert_eq!(g.instances().len(), g.len());
        }
        assert!(matches!(scene.groups[0].instances(), Instances::Particles(_)));
        assert!(matches!(scene.groups[3].instances(), Instances::Ornaments(_)));
    }

    #[test]
    fn groups_diverge_by_rate() {
        let mut scene = small_scene();
        for _ in 0..60 {
            scene.tick(&snapshot(DiscreteState::Chaos), 1.0 / 60.0);
        }
        let p: Vec<f32> = scene.groups.iter().map(EntityGroup::progress).collect();
        // foliage 1.5 > baubles 1.2 > gifts 0.8
        assert!(p[0] < p[1]);
        assert_eq!(p[1], p[2]);
        assert!(p[2] < p[3]);
        assert!((p[1] - (-1.2f32).exp()).abs() < 1e-3);
        assert!((scene.elapsed() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn reversal_mid_transition_is_continuous() {
        let mut scene = small_scene();
        for _ in 0..30 {
            scene.tick(&snapshot(DiscreteState::Chaos), 1.0 / 60.0);
        }
        let before = scene.groups[1].progress();
        scene.tick(&snapshot(DiscreteState::Formed), 1.0 / 60.0);
        let after = scene.groups[1].progress();
        assert!(after > before);
        assert!(after - before < 0.05);
    }

    #[test]
    fn open_hand_sends_every_ornament_back_toward_chaos() {
        use crate::analyzer::{Gesture, HandReading};
        use crate::control::ControlContext;
        use crate::mapper::apply_reading;

        let mut scene = small_scene();
        let control = ControlContext::default();
        apply_reading(
            &control,
            &HandReading {
                gesture: Gesture::Open,
                position: PositionSignal { x: 0.1, y: 0.2 },
            },
        );
        assert_eq!(control.discrete_state(), DiscreteState::Chaos);

        // Distance of each emitted ornament translation from its chaos endpoint
        let distances = |scene: &Scene| -> Vec<f32> {
            scene
                .groups
                .iter()
                .filter_map(|g| match g.instances() {
                    Instances::Ornaments(out) => Some((g, out)),
                    Instances::Particles(_) => None,
                })
                .flat_map(|(g, out)| {
                    out.iter().zip(g.samples()).map(|(inst, s)| {
                        let (_, _, translation) = inst.matrix().to_scale_rotation_translation();
                        translation.distance(glam::Vec3::from(s.chaos_position))
                    })
                })
                .collect()
        };

        let mut last = distances(&scene);
        assert!(!last.is_empty());
        for _ in 0..5 {
            scene.tick(&control.snapshot(), 0.1);
            let now = distances(&scene);
            assert!(now.iter().zip(&last).all(|(n, l)| n < l || *l < 1e-4));
            last = now;
        }
    }

    #[test]
    fn same_seed_same_samples() {
        let a = small_scene();
        let b = small_scene();
        assert_eq!(a.groups[2].samples(), b.groups[2].samples());
    }

    #[test]
    fn empty_group_renders_nothing() {
        let mut groups = default_groups();
        groups[1].count = 0;
        groups[0].count = 10;
        let mut scene = Scene::new(&SceneConfig {
            groups,
            seed: Some(1),
            ..SceneConfig::default()
        });
        scene.tick(&snapshot(DiscreteState::Chaos), 0.5);
        assert_eq!(scene.groups[1].len(), 0);
        assert!(scene.groups[1].instances().as_bytes().is_empty());
    }
}
