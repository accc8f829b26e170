//! Builder API for ergonomic circuit breaker configuration

use crate::{
    callbacks::Callbacks,
    circuit::{CircuitBreaker, CircuitContext, Config},
    errors::ConfigError,
    tally::Tally,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Builder for creating circuit breakers with fluent API
///
/// Nothing is validated until [`build`](Self::build), which returns a
/// [`ConfigError`] for a zero threshold or an out-of-range jitter factor.
#[derive(Debug)]
pub struct CircuitBuilder {
    name: String,
    config: Config,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            callbacks: Callbacks::new(),
        }
    }

    /// Replace the whole configuration, e.g. one loaded with serde
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the number of consecutive failures that opens the circuit
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open before admitting a trial call
    ///
    /// The cooldown is stored in whole milliseconds, so sub-millisecond parts
    /// are dropped (1.5ms becomes 1ms, 500µs becomes 0). A cooldown too large
    /// for the monotonic clock is enforced as a one-year window, while
    /// [`Config::cooldown`] keeps reporting the configured value.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        let cooldown_ms = u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX);
        if u128::from(cooldown_ms) * 1_000_000 != cooldown.as_nanos() {
            debug!(
                circuit = %self.name,
                requested = ?cooldown,
                applied_ms = cooldown_ms,
                "Cooldown truncated to whole milliseconds"
            );
        }
        self.config.cooldown_ms = cooldown_ms;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Set callback for when circuit opens; receives the cooldown applied
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker around `operation`
    pub fn build<F>(self, operation: F) -> Result<CircuitBreaker<F>, ConfigError> {
        let context = CircuitContext {
            name: self.name,
            config: self.config,
            tally: Arc::new(Tally::new()),
        };

        CircuitBreaker::with_context_and_callbacks(context, self.callbacks, operation)
    }
}
