//! Callback system for circuit breaker state transitions

use std::sync::Arc;
use std::time::Duration;

/// A state change produced while the breaker lock was held, delivered once it is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Entered Open with the given cooldown applied
    Opened(Duration),
    HalfOpened,
    Closed,
}

type OpenHook = Arc<dyn Fn(&str, Duration) + Send + Sync>;
type StateHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Callbacks for circuit breaker transitions
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<OpenHook>,
    pub on_close: Option<StateHook>,
    pub on_half_open: Option<StateHook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fire(&self, circuit: &str, transition: Transition) {
        match transition {
            Transition::Opened(cooldown) => {
                if let Some(ref callback) = self.on_open {
                    callback(circuit, cooldown);
                }
            }
            Transition::HalfOpened => {
                if let Some(ref callback) = self.on_half_open {
                    callback(circuit);
                }
            }
            Transition::Closed => {
                if let Some(ref callback) = self.on_close {
                    callback(circuit);
                }
            }
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_fire_routes_to_matching_hook() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let opened = seen.clone();
        let closed = seen.clone();
        let callbacks = Callbacks {
            on_open: Some(Arc::new(move |name: &str, cooldown: Duration| {
                opened
                    .lock()
                    .unwrap()
                    .push(format!("{name} open {}ms", cooldown.as_millis()));
            })),
            on_close: Some(Arc::new(move |name: &str| {
                closed.lock().unwrap().push(format!("{name} closed"));
            })),
            on_half_open: None,
        };

        callbacks.fire("db", Transition::Opened(Duration::from_millis(250)));
        callbacks.fire("db", Transition::HalfOpened);
        callbacks.fire("db", Transition::Closed);

        assert_eq!(*seen.lock().unwrap(), vec!["db open 250ms", "db closed"]);
    }
}
