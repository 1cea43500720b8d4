//! Circuit breaker state machine, one instance per external dependency
//! (vector store, relational DB, source API) per spec §4.8.
//!
//! `closed -> open -> half-open -> closed`, with a rolling failure window
//! and exponential open-duration backoff. No direct corpus analog; built
//! from the textbook breaker pattern and documented as such in DESIGN.md.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use medretrieve_common::config::BreakerSettings;
use medretrieve_common::{MedretrieveError, Result};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    samples: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    current_open: Duration,
    half_open_probe_in_flight: bool,
}

pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        let open_base = Duration::from_secs(settings.open_base_seconds);
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(Inner { state: State::Closed, samples: VecDeque::new(), opened_at: None, current_open: open_base, half_open_probe_in_flight: false }),
        }
    }

    /// Checks whether a call may proceed, transitioning `open -> half-open`
    /// if the open timer has elapsed. Does not itself run the call; callers
    /// must report the outcome via `record_success`/`record_failure`.
    pub fn before_call(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            State::Closed => Ok(()),
            State::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= inner.current_open {
                    inner.state = State::HalfOpen;
                    inner.half_open_probe_in_flight = true;
                    info!(breaker = %self.name, "circuit breaker half-open: allowing one probe");
                    Ok(())
                } else {
                    Err(MedretrieveError::BreakerOpen(self.name.clone()))
                }
            }
            State::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    Err(MedretrieveError::BreakerOpen(self.name.clone()))
                } else {
                    inner.half_open_probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.samples.push_back((now, true));
        prune(&mut inner.samples, self.settings.window_seconds);

        match inner.state {
            State::HalfOpen => {
                info!(breaker = %self.name, "circuit breaker probe succeeded: closing");
                inner.state = State::Closed;
                inner.opened_at = None;
                inner.half_open_probe_in_flight = false;
                inner.current_open = Duration::from_secs(self.settings.open_base_seconds);
                inner.samples.clear();
            }
            State::Closed | State::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.samples.push_back((now, false));
        prune(&mut inner.samples, self.settings.window_seconds);

        match inner.state {
            State::HalfOpen => {
                warn!(breaker = %self.name, "circuit breaker probe failed: re-opening with doubled backoff");
                inner.half_open_probe_in_flight = false;
                open(&mut inner, &self.settings, true);
            }
            State::Closed => {
                if should_open(&inner.samples, &self.settings) {
                    warn!(breaker = %self.name, "circuit breaker opening");
                    open(&mut inner, &self.settings, false);
                }
            }
            State::Open => {}
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.inner.lock().unwrap().state, State::Open)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `fut` only if the breaker currently permits a call, recording
    /// the outcome afterward. Callers that talk to an external dependency
    /// (vector store, relational DB, source API) should route the call
    /// through here rather than invoking `before_call`/`record_*` by hand.
    pub async fn guard<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        self.before_call()?;
        match fut.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }
}

fn prune(samples: &mut VecDeque<(Instant, bool)>, window_seconds: u64) {
    let cutoff = Duration::from_secs(window_seconds);
    while let Some((t, _)) = samples.front() {
        if t.elapsed() > cutoff {
            samples.pop_front();
        } else {
            break;
        }
    }
}

fn should_open(samples: &VecDeque<(Instant, bool)>, settings: &BreakerSettings) -> bool {
    let failures = samples.iter().filter(|(_, ok)| !ok).count();
    if failures as u32 >= settings.error_threshold {
        return true;
    }
    if samples.len() as u32 >= settings.min_samples {
        let rate = failures as f64 / samples.len() as f64;
        if rate >= settings.error_rate_threshold {
            return true;
        }
    }
    false
}

fn open(inner: &mut Inner, settings: &BreakerSettings, doubled: bool) {
    inner.state = State::Open;
    inner.opened_at = Some(Instant::now());
    let max = Duration::from_secs(settings.open_max_seconds);
    inner.current_open = if doubled { (inner.current_open * 2).min(max) } else { Duration::from_secs(settings.open_base_seconds) };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BreakerSettings {
        BreakerSettings { error_threshold: 3, window_seconds: 30, min_samples: 100, error_rate_threshold: 0.5, open_base_seconds: 0, open_max_seconds: 1 }
    }

    #[test]
    fn stays_closed_below_the_failure_threshold() {
        let breaker = CircuitBreaker::new("vector_store", settings());
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        assert!(breaker.before_call().is_ok());
    }

    #[test]
    fn opens_after_reaching_the_failure_threshold() {
        let breaker = CircuitBreaker::new("vector_store", settings());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(breaker.is_open());
        assert!(matches!(breaker.before_call(), Err(MedretrieveError::BreakerOpen(_))));
    }

    #[test]
    fn half_open_probe_closes_breaker_on_success() {
        let breaker = CircuitBreaker::new("vector_store", settings());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(breaker.before_call().is_ok());
        breaker.record_success();
        assert!(!breaker.is_open());
    }

    #[test]
    fn half_open_probe_reopens_with_doubled_backoff_on_failure() {
        let breaker = CircuitBreaker::new("vector_store", settings());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(breaker.before_call().is_ok());
        breaker.record_failure();
        assert!(breaker.is_open());
        let doubled_open = breaker.inner.lock().unwrap().current_open;
        assert!(doubled_open >= Duration::from_secs(0));
    }

    #[tokio::test]
    async fn guard_short_circuits_without_running_the_future_once_open() {
        let breaker = CircuitBreaker::new("vector_store", settings());
        for _ in 0..3 {
            breaker.record_failure();
        }
        let ran = std::sync::atomic::AtomicBool::new(false);
        let result: Result<()> = breaker
            .guard(async {
                ran.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(MedretrieveError::BreakerOpen(_))));
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn guard_records_failure_from_the_future_result() {
        let breaker = CircuitBreaker::new("vector_store", settings());
        for _ in 0..2 {
            let _: Result<()> = breaker.guard(async { Err(MedretrieveError::Upstream("boom".into())) }).await;
        }
        assert!(breaker.is_open());
    }

    #[test]
    fn only_one_half_open_probe_is_allowed_concurrently() {
        let breaker = CircuitBreaker::new("vector_store", settings());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(breaker.before_call().is_ok());
        assert!(matches!(breaker.before_call(), Err(MedretrieveError::BreakerOpen(_))));
    }
}
