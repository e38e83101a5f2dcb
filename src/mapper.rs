// ============================================================================
// mapper.rs — Luxtree
// Gesture-to-state mapping: the only place analyzer output reaches the
// control cells.
// ============================================================================

use crate::analyzer::{Gesture, HandReading};
use crate::control::ControlContext;
use crate::morph::DiscreteState;

/// State implied by a gesture; `None` leaves the current state untouched.
pub fn state_for(gesture: Gesture) -> Option<DiscreteState> {
    match gesture {
        Gesture::Open => Some(DiscreteState::Chaos),
        Gesture::Closed => Some(DiscreteState::Formed),
        Gesture::Unknown => None,
    }
}

/// Apply one successful reading and return the status line describing it.
/// The position is forwarded for every reading, UNKNOWN included.
pub fn apply_reading(control: &ControlContext, reading: &HandReading) -> &'static str {
    if let Some(state) = state_for(reading.gesture) {
        control.set_discrete_state(state);
    }
    control.set_position(reading.position);

    match reading.gesture {
        Gesture::Open => "Detected: OPEN HAND (Chaos)",
        Gesture::Closed => "Detected: CLOSED HAND (Form)",
        Gesture::Unknown => "No clear hand detected...",
    }
}
