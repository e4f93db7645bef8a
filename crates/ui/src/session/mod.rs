pub mod gate;

pub use gate::{GateOutcome, GateState, GateTransitionRejection, SessionGate, check_session};
