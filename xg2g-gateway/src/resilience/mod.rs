//! Failure-aware protection of the transcoder process pool.

pub mod breaker;
pub mod clock;
pub mod registry;
pub mod window;

pub use breaker::{
    BreakerConfig, BreakerError, BreakerSnapshot, BreakerState, CircuitBreaker, Outcome, TripReason,
};
pub use clock::{Clock, SystemClock};
pub use registry::{BreakerRegistry, TRANSCODER_BREAKER};
