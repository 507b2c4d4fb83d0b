mod coordinator;
mod engine;
mod phase;

pub use coordinator::{Coordinator, CoordinatorHandle, TICK_PERIOD};
pub use engine::{TimerEngine, TimerState, ABORT_THRESHOLD_MS};
pub use phase::{minutes_to_ms, next_phase, Phase, MS_PER_MINUTE};
