//! Circuit breaker implementation using state machines
//!
//! Every call goes through [`CircuitBreaker::execute`]. Admission and
//! resolution each take the breaker's lock briefly. The protected operation
//! runs with the lock released, so a slow downstream never serializes callers.
//!
//! ```text
//! Closed ──(failures >= threshold)──► Open ──(cooldown elapsed)──► HalfOpen
//!   ▲                                  ▲                              │
//!   │                                  └────────(trial fails)─────────┤
//!   └──────────────────────────────────(trial succeeds)───────────────┘
//! ```

use crate::{
    callbacks::{Callbacks, Transition},
    errors::{CircuitError, ConfigError},
    tally::{CircuitStats, Tally},
};
use serde::{Deserialize, Serialize};
use state_machines::state_machine;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Consecutive failures required to open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Milliseconds the circuit stays Open before a trial call is admitted
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Jitter factor for the cooldown (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: cooldown * (1 - jitter + rand * jitter)
    #[serde(default)]
    pub jitter_factor: f64,
}

fn default_failure_threshold() -> u32 {
    2
}

fn default_cooldown_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            jitter_factor: 0.0,
        }
    }
}

impl Config {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidJitter(self.jitter_factor));
        }
        Ok(())
    }

    /// Cooldown for the next Open window, jittered when configured
    fn next_cooldown(&self) -> Duration {
        if self.jitter_factor > 0.0 {
            let policy = chrono_machines::Policy {
                max_attempts: 1,
                base_delay_ms: self.cooldown_ms,
                multiplier: 1.0,
                max_delay_ms: self.cooldown_ms,
            };
            Duration::from_millis(policy.calculate_delay(1, self.jitter_factor) as u64)
        } else {
            self.cooldown()
        }
    }
}

/// Context handed to a fallback when the breaker refuses a call
#[derive(Debug, Clone)]
pub struct FallbackContext {
    /// Circuit name
    pub circuit_name: String,
    /// State at the time of the rejection
    pub state: crate::CircuitState,
    /// Time left until a trial call is admitted (zero while a trial is in flight)
    pub remaining: Duration,
}

/// Circuit breaker context - shared data across all states
#[derive(Debug, Clone, Default)]
pub struct CircuitContext {
    pub name: String,
    pub config: Config,
    pub tally: Arc<Tally>,
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    /// Earliest instant a trial call is admitted
    pub opened_until: Option<Instant>,
}

state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen,
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [cooldown_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [streak_cleared],
            transition: { from: [HalfOpen, Open], to: Closed }
        }
    }
}

impl Circuit<Closed> {
    /// Open once the consecutive failure streak reaches the threshold
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        ctx.tally.consecutive_failures() >= ctx.config.failure_threshold
    }
}

impl Circuit<HalfOpen> {
    /// A failed trial re-opens regardless of the threshold
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        ctx.tally.consecutive_failures() > 0
    }

    fn streak_cleared(&self, ctx: &CircuitContext) -> bool {
        ctx.tally.consecutive_failures() == 0
    }
}

impl Circuit<Open> {
    fn cooldown_elapsed(&self, _ctx: &CircuitContext) -> bool {
        self.state_data_open()
            .and_then(|data| data.opened_until)
            .is_none_or(|until| Instant::now() >= until)
    }

    /// A call admitted before the circuit opened may still succeed and close it
    fn streak_cleared(&self, ctx: &CircuitContext) -> bool {
        ctx.tally.consecutive_failures() == 0
    }
}

struct Inner {
    machine: DynamicCircuit,
    /// Ticket of the half-open trial currently in flight
    trial: Option<u64>,
    next_ticket: u64,
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Admission to invoke the operation; carries the half-open trial ticket if this call is the trial
struct Permit<'a> {
    inner: &'a Mutex<Inner>,
    ticket: Option<u64>,
}

impl Permit<'_> {
    fn release(mut self, inner: &mut Inner) {
        if let Some(ticket) = self.ticket.take()
            && inner.trial == Some(ticket)
        {
            inner.trial = None;
        }
    }
}

impl Drop for Permit<'_> {
    // The execute future was dropped before the operation resolved.
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            let mut inner = lock_inner(self.inner);
            if inner.trial == Some(ticket) {
                inner.trial = None;
            }
        }
    }
}

/// Circuit breaker guarding a single async operation
pub struct CircuitBreaker<F> {
    operation: F,
    inner: Mutex<Inner>,
    context: CircuitContext,
    callbacks: Callbacks,
}

impl CircuitBreaker<()> {
    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }
}

impl<F> CircuitBreaker<F> {
    /// Create a new circuit breaker (use builder() for callbacks)
    pub fn new(name: impl Into<String>, config: Config, operation: F) -> Result<Self, ConfigError> {
        let context = CircuitContext {
            name: name.into(),
            config,
            tally: Arc::new(Tally::new()),
        };

        Self::with_context_and_callbacks(context, Callbacks::new(), operation)
    }

    pub(crate) fn with_context_and_callbacks(
        context: CircuitContext,
        callbacks: Callbacks,
        operation: F,
    ) -> Result<Self, ConfigError> {
        context.config.validate()?;

        info!(
            circuit = %context.name,
            failure_threshold = context.config.failure_threshold,
            cooldown = ?context.config.cooldown(),
            "Creating circuit breaker"
        );

        let machine = DynamicCircuit::new(context.clone());

        Ok(Self {
            operation,
            inner: Mutex::new(Inner {
                machine,
                trial: None,
                next_ticket: 0,
            }),
            context,
            callbacks,
        })
    }

    /// Execute the protected operation with circuit breaker protection
    ///
    /// Returns [`CircuitError::Open`] without invoking the operation while the
    /// circuit is open, or while a half-open trial is already in flight. The
    /// operation's own failures come back untouched in
    /// [`CircuitError::Execution`].
    pub async fn execute<A, Fut, T, E>(&self, args: A) -> Result<T, CircuitError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.admit().map_err(|remaining| CircuitError::Open {
            circuit: self.context.name.clone(),
            remaining,
        })?;

        self.invoke(permit, args).await
    }

    /// Like [`execute`](Self::execute), but a refused call returns the fallback's value
    pub async fn execute_or_fallback<A, Fut, T, E, G>(
        &self,
        args: A,
        fallback: G,
    ) -> Result<T, CircuitError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce(&FallbackContext) -> T,
    {
        match self.admit() {
            Ok(permit) => self.invoke(permit, args).await,
            Err(remaining) => {
                let ctx = FallbackContext {
                    circuit_name: self.context.name.clone(),
                    state: self.state(),
                    remaining,
                };
                Ok(fallback(&ctx))
            }
        }
    }

    async fn invoke<A, Fut, T, E>(&self, permit: Permit<'_>, args: A) -> Result<T, CircuitError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match (self.operation)(args).await {
            Ok(value) => {
                self.on_success(permit);
                Ok(value)
            }
            Err(e) => {
                self.on_failure(permit);
                Err(CircuitError::Execution(e))
            }
        }
    }

    /// Current state
    pub fn state(&self) -> crate::CircuitState {
        crate::CircuitState::from_name(self.lock().machine.current_state())
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.lock().machine.current_state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == crate::CircuitState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == crate::CircuitState::Closed
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Consecutive failures since the last success
    pub fn failure_count(&self) -> u32 {
        self.context.tally.consecutive_failures()
    }

    pub fn stats(&self) -> CircuitStats {
        self.context.tally.snapshot()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    /// Admission check; on refusal returns the time left until a trial is allowed
    fn admit(&self) -> Result<Permit<'_>, Duration> {
        let mut inner = self.lock();
        let mut transition = None;

        if inner.machine.current_state() == "Open" {
            if inner.machine.handle(CircuitEvent::AttemptReset).is_err() {
                let remaining = inner
                    .machine
                    .open_data()
                    .and_then(|data| data.opened_until)
                    .map(|until| until.saturating_duration_since(Instant::now()))
                    .unwrap_or_default();
                self.context.tally.record_rejection();
                debug!(
                    circuit = %self.context.name,
                    remaining = ?remaining,
                    "Circuit breaker open, rejecting call"
                );
                return Err(remaining);
            }

            info!(circuit = %self.context.name, "Circuit breaker half-open, admitting trial call");
            transition = Some(Transition::HalfOpened);
        }

        let ticket = if inner.machine.current_state() == "HalfOpen" {
            if inner.trial.is_some() {
                self.context.tally.record_rejection();
                debug!(
                    circuit = %self.context.name,
                    "Half-open trial in flight, rejecting call"
                );
                return Err(Duration::ZERO);
            }
            let ticket = inner.next_ticket;
            inner.next_ticket = inner.next_ticket.wrapping_add(1);
            inner.trial = Some(ticket);
            Some(ticket)
        } else {
            None
        };

        drop(inner);
        if let Some(transition) = transition {
            self.callbacks.fire(&self.context.name, transition);
        }

        Ok(Permit {
            inner: &self.inner,
            ticket,
        })
    }

    fn on_success(&self, permit: Permit<'_>) {
        let mut inner = self.lock();
        permit.release(&mut inner);
        self.context.tally.record_success();

        let transition = if inner.machine.current_state() != "Closed"
            && inner.machine.handle(CircuitEvent::Close).is_ok()
        {
            inner.trial = None;
            info!(circuit = %self.context.name, "Circuit breaker closing");
            Some(Transition::Closed)
        } else {
            None
        };

        drop(inner);
        if let Some(transition) = transition {
            self.callbacks.fire(&self.context.name, transition);
        }
    }

    fn on_failure(&self, permit: Permit<'_>) {
        let was_trial = permit.ticket.is_some();
        let mut inner = self.lock();
        permit.release(&mut inner);
        let failures = self.context.tally.record_failure();
        let threshold = self.context.config.failure_threshold;

        let transition = match inner.machine.current_state() {
            "Open" => {
                // Admitted before the circuit opened; the streak is already past the threshold.
                if failures >= threshold {
                    let cooldown = self.arm_open_window(&mut inner);
                    debug!(
                        circuit = %self.context.name,
                        failure_count = failures,
                        cooldown = ?cooldown,
                        "Late failure while open, restarting cooldown"
                    );
                }
                None
            }
            _ => {
                if inner.machine.handle(CircuitEvent::Trip).is_ok() {
                    inner.trial = None;
                    let cooldown = self.arm_open_window(&mut inner);
                    self.context.tally.record_open();
                    if was_trial {
                        warn!(
                            circuit = %self.context.name,
                            cooldown = ?cooldown,
                            "Half-open trial failed, reopening circuit"
                        );
                    } else {
                        info!(
                            circuit = %self.context.name,
                            failure_count = failures,
                            threshold,
                            cooldown = ?cooldown,
                            "Circuit breaker opening"
                        );
                    }
                    Some(Transition::Opened(cooldown))
                } else {
                    debug!(
                        circuit = %self.context.name,
                        failure_count = failures,
                        threshold,
                        "Call failed, circuit remains closed"
                    );
                    None
                }
            }
        };

        drop(inner);
        if let Some(transition) = transition {
            self.callbacks.fire(&self.context.name, transition);
        }
    }

    /// Stamp the Open window, returning the cooldown applied
    fn arm_open_window(&self, inner: &mut Inner) -> Duration {
        let cooldown = self.context.config.next_cooldown();
        if let Some(data) = inner.machine.open_data_mut() {
            data.opened_until = Some(deadline_after(cooldown));
        }
        cooldown
    }
}

/// `now + cooldown`, saturating cooldowns that overflow `Instant` to a year
fn deadline_after(cooldown: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(cooldown).unwrap_or_else(|| {
        debug!(cooldown = ?cooldown, "Cooldown overflows the clock, capping the open window at one year");
        now + MAX_OPEN_WINDOW
    })
}

const MAX_OPEN_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

impl<F> std::fmt::Debug for CircuitBreaker<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.context.name)
            .field("config", &self.context.config)
            .field("state", &self.state())
            .field("failure_count", &self.failure_count())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
