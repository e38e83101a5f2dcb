// ============================================================================
// control.rs — Luxtree
// Shared control cells written by the sensing loop and the UI override, read
// once per render tick as a snapshot.
// ============================================================================

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::morph::DiscreteState;

/// Last known hand position, each axis in `[-1, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct PositionSignal {
    pub x: f32,
    pub y: f32,
}

impl PositionSignal {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: clamp_axis(x),
            y: clamp_axis(y),
        }
    }
}

fn clamp_axis(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Human-readable sensing status with the wall-clock time it was set.
#[derive(Clone, Debug)]
pub struct SensingStatus {
    pub text: String,
    pub updated_at: DateTime<Local>,
}

/// Values read by one render tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlSnapshot {
    pub state: DiscreteState,
    pub position: PositionSignal,
}

// ======================== Control Context ========================

/// Process-wide control cells. Each field is an idempotent overwrite, last
/// write wins.
pub struct ControlContext {
    state: AtomicU8,
    /// x in the high 32 bits, y in the low 32 bits.
    position: AtomicU64,
    status: Mutex<SensingStatus>,
}

const STATE_FORMED: u8 = 0;
const STATE_CHAOS: u8 = 1;

impl Default for ControlContext {
    fn default() -> Self {
        Self::new(DiscreteState::Formed)
    }
}

impl ControlContext {
    pub fn new(initial: DiscreteState) -> Self {
        Self {
            state: AtomicU8::new(encode_state(initial)),
            position: AtomicU64::new(pack_position(PositionSignal::default())),
            status: Mutex::new(SensingStatus {
                text: String::from("Initializing camera..."),
                updated_at: Local::now(),
            }),
        }
    }

    pub fn set_discrete_state(&self, state: DiscreteState) {
        let previous = self.state.swap(encode_state(state), Ordering::AcqRel);
        if previous != encode_state(state) {
            log::info!("Tree state -> {}", state.name());
        }
    }

    pub fn discrete_state(&self) -> DiscreteState {
        decode_state(self.state.load(Ordering::Acquire))
    }

    /// Overwrite the position wholesale (clamped into `[-1, 1]`).
    pub fn set_position(&self, position: PositionSignal) {
        let position = PositionSignal::new(position.x, position.y);
        self.position.store(pack_position(position), Ordering::Release);
    }

    pub fn position(&self) -> PositionSignal {
        unpack_position(self.position.load(Ordering::Acquire))
    }

    /// Read both cells once at the start of a tick.
    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            state: self.discrete_state(),
            position: self.position(),
        }
    }

    pub fn set_status(&self, text: impl Into<String>) {
        let status = SensingStatus {
            text: text.into(),
            updated_at: Local::now(),
        };
        match self.status.lock() {
            Ok(mut guard) => *guard = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }

    pub fn status(&self) -> SensingStatus {
        match self.status.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

fn pack_position(position: PositionSignal) -> u64 {
    ((position.x.to_bits() as u64) << 32) | position.y.to_bits() as u64
}

fn unpack_position(raw: u64) -> PositionSignal {
    PositionSignal {
        x: f32::from_bits((raw >> 32) as u32),
        y: f32::from_bits(raw as u32),
    }
}

fn encode_state(state: DiscreteState) -> u8 {
    match state {
        DiscreteState::Formed => STATE_FORMED,
        DiscreteState::Chaos => STATE_CHAOS,
    }
}

fn decode_state(raw: u8) -> DiscreteState {
    if raw == STATE_CHAOS {
        DiscreteState::Chaos
    } else {
        DiscreteState::Formed
    }
}
