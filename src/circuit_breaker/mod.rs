pub mod breaker;
pub mod service;
pub mod state;
pub mod types;

pub use breaker::{CircuitBreaker, CircuitBreakerBuilder};
pub use service::CircuitBreakerService;
pub use state::BreakerState;
pub use types::{BreakerSnapshot, CircuitBreakerConfig, CircuitState};
