//! tripwire - async circuit breaker
//!
//! This crate guards one fallible async operation per breaker:
//! - Consecutive-failure threshold (any success resets the count)
//! - State machine for the breaker lifecycle (Closed → Open → HalfOpen)
//! - Exactly one trial call admitted while half-open, even under parallel callers
//! - Monotonic cooldown tracking via `tokio::time::Instant`
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use tripwire::{CircuitBreaker, CircuitError, CircuitState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let circuit = CircuitBreaker::builder("inventory")
//!     .failure_threshold(2)
//!     .cooldown(Duration::from_secs(2))
//!     .on_open(|name, cooldown| println!("Circuit {name} opened for {cooldown:?}"))
//!     .build(|sku: u32| async move {
//!         if sku == 0 {
//!             Err("unknown sku")
//!         } else {
//!             Ok(sku * 10)
//!         }
//!     })
//!     .expect("valid configuration");
//!
//! assert_eq!(circuit.execute(7).await.unwrap(), 70);
//!
//! let _ = circuit.execute(0).await;
//! let _ = circuit.execute(0).await;
//! assert_eq!(circuit.state(), CircuitState::Open);
//!
//! // Refused without calling the operation
//! assert!(matches!(circuit.execute(7).await, Err(CircuitError::Open { .. })));
//! # }
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod errors;
pub mod tally;

pub use builder::CircuitBuilder;
pub use circuit::{CircuitBreaker, Config, FallbackContext};
pub use errors::{CircuitError, ConfigError};
pub use tally::CircuitStats;

use serde::{Deserialize, Serialize};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls flow to the operation
    Closed,
    /// Calls are refused until the cooldown elapses
    Open,
    /// One trial call decides between Closed and Open
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }

    pub(crate) fn from_name(name: &str) -> Self {
        match name {
            "Open" => CircuitState::Open,
            "HalfOpen" => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
