//! Per-provider circuit breaker.
//!
//! - **Closed**: calls go through; consecutive penalized failures are counted.
//! - **Open**: calls are refused until the cool-down elapses.
//! - **HalfOpen**: probe calls go through; enough successes close the
//!   circuit, any failure reopens it.
//!
//! State is in-memory and resets on restart.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::models::ProviderId;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(30);
const DEFAULT_PROBE_SUCCESSES: u32 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
}

impl Circuit {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            probe_successes: 0,
            opened_at: None,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.probe_successes = 0;
        self.opened_at = Some(Instant::now());
    }
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive penalized failures that open a closed circuit.
    pub failure_threshold: u32,
    /// How long an open circuit refuses calls before probing.
    pub cool_down: Duration,
    /// Probe successes needed to close a half-open circuit.
    pub probe_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cool_down: DEFAULT_COOL_DOWN,
            probe_successes: DEFAULT_PROBE_SUCCESSES,
        }
    }
}

/// Thread-safe breaker keyed by provider id.
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether a call to `provider` may proceed.
    ///
    /// Moves an open circuit to half-open once the cool-down has elapsed.
    pub fn is_allowed(&self, provider: &ProviderId) -> bool {
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::closed);

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = circuit
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.cool_down)
                    .unwrap_or(true);
                if cooled {
                    info!("Circuit breaker: '{}' open -> half_open", provider);
                    circuit.state = CircuitState::HalfOpen;
                    circuit.probe_successes = 0;
                }
                cooled
            }
        }
    }

    pub fn record_success(&self, provider: &ProviderId) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::closed);

        match circuit.state {
            CircuitState::Closed => circuit.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                circuit.probe_successes += 1;
                if circuit.probe_successes >= self.config.probe_successes {
                    info!(
                        "Circuit breaker: '{}' half_open -> closed after {} probes",
                        provider, circuit.probe_successes
                    );
                    *circuit = Circuit::closed();
                }
            }
            CircuitState::Open => {
                debug!("Circuit breaker: late success for '{}' while open", provider);
            }
        }
    }

    pub fn record_failure(&self, provider: &ProviderId) {
        let mut circuits = self.lock_circuits();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::closed);

        circuit.consecutive_failures += 1;
        match circuit.state {
            CircuitState::Closed => {
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    info!(
                        "Circuit breaker: '{}' closed -> open after {} failures",
                        provider, circuit.consecutive_failures
                    );
                    circuit.open();
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        provider, circuit.consecutive_failures, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                info!("Circuit breaker: '{}' probe failed, reopening", provider);
                circuit.open();
            }
            CircuitState::Open => circuit.opened_at = Some(Instant::now()),
        }
    }

    pub fn state(&self, provider: &ProviderId) -> CircuitState {
        self.lock_circuits()
            .get(provider.as_ref())
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn failure_count(&self, provider: &ProviderId) -> u32 {
        self.lock_circuits()
            .get(provider.as_ref())
            .map(|c| c.consecutive_failures)
            .unwrap_or(0)
    }

    /// Force a provider's circuit closed.
    pub fn reset(&self, provider: &ProviderId) {
        if let Some(circuit) = self.lock_circuits().get_mut(provider.as_ref()) {
            info!("Circuit breaker: manual reset for '{}'", provider);
            *circuit = Circuit::closed();
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
