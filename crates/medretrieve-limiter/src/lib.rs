//! medretrieve-limiter — concurrency limiting and circuit breaking (C8):
//! non-blocking per-tool/global semaphores, and a breaker state machine per
//! external dependency.

pub mod breaker;
pub mod concurrency;
pub mod registry;

pub use breaker::CircuitBreaker;
pub use concurrency::{ConcurrencyLimiter, ConcurrencyPermit};
pub use registry::BreakerRegistry;
