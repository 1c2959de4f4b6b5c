//! Shared primitives used by the application layer: priority scoring,
//! circuit breaking, and pub-sub fan-out. Domain-agnostic building blocks,
//! not owners of any lifecycle themselves.

pub mod circuit_breaker;
pub mod event_bus;
pub mod priority_calculator;
pub mod ring_buffer;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use event_bus::{Envelope, EventBus, EventBusConfig, SequenceNumber};
pub use priority_calculator::PriorityCalculator;
pub use ring_buffer::RingBuffer;
