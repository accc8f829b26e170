//! Error types for circuit breaker operations

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`CircuitBreaker::execute`](crate::CircuitBreaker::execute)
///
/// Implements [`std::error::Error`] when `E` does, with the operation's error
/// as its `source()`.
#[derive(Debug)]
pub enum CircuitError<E> {
    /// Circuit is open, the protected operation was not invoked
    Open { circuit: String, remaining: Duration },
    /// The protected operation was invoked and failed; the error is forwarded as-is
    Execution(E),
}

impl<E: fmt::Display> fmt::Display for CircuitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitError::Open { circuit, remaining } => {
                write!(f, "Circuit '{}' is open (trial allowed in {:?})", circuit, remaining)
            }
            CircuitError::Execution(e) => write!(f, "{}", e),
        }
    }
}

impl<E: StdError + 'static> StdError for CircuitError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CircuitError::Execution(e) => Some(e),
            CircuitError::Open { .. } => None,
        }
    }
}

impl<E> CircuitError<E> {
    /// True when the breaker refused the call without invoking the operation
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    /// Borrow the operation's own error, if the call was attempted
    pub fn execution(&self) -> Option<&E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            CircuitError::Open { .. } => None,
        }
    }

    /// Recover the operation's own error, if the call was attempted
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            CircuitError::Open { .. } => None,
        }
    }
}

/// Invalid breaker configuration, reported at construction time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failure_threshold must be at least 1")]
    ZeroFailureThreshold,
    #[error("jitter_factor must be within 0.0..=1.0, got {0}")]
    InvalidJitter(f64),
}
