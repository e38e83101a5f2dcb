// ============================================================================
// morph.rs — Luxtree
// Discrete tree state and the per-group progress driver that approaches the
// state's extreme with framerate-independent exponential smoothing.
// ============================================================================

/// The two configurations the tree morphs between.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiscreteState {
    #[default]
    Formed,
    Chaos,
}

impl DiscreteState {
    /// Progress value this state pulls every group toward.
    pub fn target_progress(self) -> f32 {
        match self {
            DiscreteState::Formed => 1.0,
            DiscreteState::Chaos => 0.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DiscreteState::Formed => "FORMED",
            DiscreteState::Chaos => "CHAOS",
        }
    }
}

/// Quadratic ease-in-out.
pub fn ease(t: f32) -> f32 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        let u = 1.0 - t;
        1.0 - 2.0 * u * u
    }
}

/// Fraction of the remaining distance covered in `dt` seconds at `rate`.
pub fn approach_factor(rate: f32, dt: f32) -> f32 {
    1.0 - (-rate * dt.max(0.0)).exp()
}

/// Per-group morph progress: 1 = fully formed, 0 = fully chaotic.
#[derive(Clone, Debug)]
pub struct MorphDriver {
    progress: f32,
    rate: f32,
}

impl MorphDriver {
    /// Groups start fully formed.
    pub fn new(rate: f32) -> Self {
        Self::with_progress(rate, 1.0)
    }

    pub fn with_progress(rate: f32, progress: f32) -> Self {
        Self {
            progress: progress.clamp(0.0, 1.0),
            rate,
        }
    }

    /// Advance one tick toward the state's target and return the new progress.
    pub fn advance(&mut self, state: DiscreteState, dt: f32) -> f32 {
        let target = state.target_progress();
        let k = approach_factor(self.rate, dt);
        self.progress += (target - self.progress) * k;
        self.progress
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ease_endpoints_and_midpoint() {
        assert_eq!(ease(0.0), 0.0);
        assert_eq!(ease(1.0), 1.0);
        assert!((ease(0.5) - 0.5).abs() < 1e-6);
        assert!((ease(0.25) - 0.125).abs() < 1e-6);
        assert!((ease(0.75) - 0.875).abs() < 1e-6);
    }

    #[test]
    fn ease_is_monotonic() {
        let mut last = ease(0.0);
        for i in 1..=1000 {
            let v = ease(i as f32 / 1000.0);
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn one_second_of_chaos_at_rate_1_2() {
        let mut driver = MorphDriver::new(1.2);
        let p = driver.advance(DiscreteState::Chaos, 1.0);
        let expected = (-1.2f32).exp();
        assert!((p - expected).abs() < 1e-5, "progress {p}");
        assert!((p - 0.301).abs() < 1e-3);
    }

    #[test]
    fn zero_dt_does_not_move() {
        let mut driver = MorphDriver::with_progress(1.5, 0.4);
        assert_eq!(driver.advance(DiscreteState::Formed, 0.0), 0.4);
    }

    #[test]
    fn refresh_rate_independent() {
        let mut slow = MorphDriver::new(0.8);
        let mut fast = MorphDriver::new(0.8);
        for _ in 0..30 {
            slow.advance(DiscreteState::Chaos, 1.0 / 30.0);
        }
        for _ in 0..144 {
            fast.advance(DiscreteState::Chaos, 1.0 / 144.0);
        }
        assert!((slow.progress() - fast.progress()).abs() < 1e-4);
    }

    #[test]
    fn stays_in_unit_interval_and_moves_toward_latest_state() {
        let mut driver = MorphDriver::new(1.5);
        let schedule = [
            (DiscreteState::Chaos, 40),
            (DiscreteState::Formed, 7),
            (DiscreteState::Chaos, 3),
            (DiscreteState::Formed, 200),
            (DiscreteState::Chaos, 500),
        ];
        for (state, ticks) in schedule {
            let target = state.target_progress();
            let mut distance = (target - driver.progress()).abs();
            for i in 0..ticks {
                let dt = 0.005 + (i % 7) as f32 * 0.01;
                let p = driver.advance(state, dt);
                assert!((0.0..=1.0).contains(&p), "progress {p}");
                let next = (target - p).abs();
                assert!(next <= distance, "moved away from target");
                distance = next;
            }
        }
    }

    #[test]
    fn repeated_formed_converges_without_overshoot() {
        let mut driver = MorphDriver::with_progress(1.2, 0.0);
        for _ in 0..10_000 {
            let p = driver.advance(DiscreteState::Formed, 0.1);
            assert!(p <= 1.0);
        }
        assert!((driver.progress() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn huge_dt_lands_on_target() {
        let mut driver = MorphDriver::new(1.2);
        assert_eq!(driver.advance(DiscreteState::Chaos, 1e6), 0.0);
    }
}
