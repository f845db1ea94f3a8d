use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{duration_ms, ConfigValidator};
use crate::{OrchestratorError, OrchestratorResult};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Circuit is closed - normal operation
    Closed,
    /// Circuit is open - calls are blocked
    Open,
    /// Circuit is half-open - testing if the dependency has recovered
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of failures inside `failure_time_window` that opens the circuit
    pub failure_threshold: usize,
    /// Sliding window in which failures are counted
    #[serde(rename = "failure_time_window_ms", with = "duration_ms")]
    pub failure_time_window: Duration,
    /// Time spent open before a trial call is let through
    #[serde(rename = "recovery_timeout_ms", with = "duration_ms")]
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes needed to close the circuit
    pub success_threshold: usize,
    /// Per-call timeout; a timed out call counts as a failure
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_time_window: Duration::from_secs(60),
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ConfigValidator for CircuitBreakerConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        if self.failure_threshold == 0 {
            return Err(OrchestratorError::config_error(
                "failure_threshold must be greater than 0",
            ));
        }
        if self.success_threshold == 0 {
            return Err(OrchestratorError::config_error(
                "success_threshold must be greater than 0",
            ));
        }
        if self.failure_time_window.is_zero() {
            return Err(OrchestratorError::config_error(
                "failure_time_window must be greater than 0",
            ));
        }
        if self.recovery_timeout.is_zero() {
            return Err(OrchestratorError::config_error(
                "recovery_timeout must be greater than 0",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(OrchestratorError::config_error(
                "request_timeout must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Failures still inside the time window
    pub recent_failures: usize,
    /// Number of consecutive successes
    pub consecutive_successes: usize,
    /// Total calls made (rejected calls excluded)
    pub total_calls: u64,
    /// Total successful calls
    pub successful_calls: u64,
    /// Total failed calls
    pub failed_calls: u64,
    /// Calls rejected while open
    pub rejected_calls: u64,
    /// Last state change time
    pub last_state_change: Instant,
}

impl CircuitBreakerStats {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            recent_failures: 0,
            consecutive_successes: 0,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            rejected_calls: 0,
            last_state_change: Instant::now(),
        }
    }

    /// Calculate failure rate
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.failed_calls as f64 / self.total_calls as f64
        }
    }
}

struct BreakerState {
    stats: CircuitBreakerStats,
    failure_times: VecDeque<Instant>,
    trials_in_flight: usize,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            stats: CircuitBreakerStats::new(),
            failure_times: VecDeque::new(),
            trials_in_flight: 0,
        }
    }

    fn prune_failures(&mut self, window: Duration, now: Instant) {
        while let Some(oldest) = self.failure_times.front() {
            if now.duration_since(*oldest) > window {
                self.failure_times.pop_front();
            } else {
                break;
            }
        }
        self.stats.recent_failures = self.failure_times.len();
    }

    fn transition(&mut self, state: CircuitState) {
        self.stats.state = state;
        self.stats.last_state_change = Instant::now();
        self.stats.consecutive_successes = 0;
        self.trials_in_flight = 0;
        if state != CircuitState::Open {
            self.failure_times.clear();
            self.stats.recent_failures = 0;
        }
    }
}

/// Circuit breaker guarding calls to one named dependency
///
/// Closed → Open once `failure_threshold` failures fall inside the time window;
/// Open → HalfOpen after `recovery_timeout`; HalfOpen → Closed after
/// `success_threshold` consecutive successes, or back to Open on any failure. At most
/// `success_threshold` trial calls run concurrently while half-open.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<BreakerState>,
}

impl CircuitBreaker {
    /// Create new circuit breaker with default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// Create new circuit breaker with custom configuration
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute operation with circuit breaker protection
    pub async fn execute<F, Fut, T>(&self, operation: F) -> OrchestratorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = OrchestratorResult<T>>,
    {
        let Some(trial) = self.should_allow_call().await else {
            return Err(OrchestratorError::CircuitOpen {
                name: self.name.clone(),
            });
        };

        let result = tokio::time::timeout(self.config.request_timeout, operation()).await;

        match result {
            Ok(Ok(value)) => {
                self.record_success(trial).await;
                Ok(value)
            }
            Ok(Err(error)) => {
                self.record_failure(trial).await;
                Err(error)
            }
            Err(_) => {
                self.record_failure(trial).await;
                Err(OrchestratorError::Timeout(format!(
                    "call to {} exceeded {}ms",
                    self.name,
                    self.config.request_timeout.as_millis()
                )))
            }
        }
    }

    /// Check if call should be allowed based on circuit state
    ///
    /// Returns `None` when the call is rejected, otherwise whether it runs as a
    /// half-open trial. At most `success_threshold` trials are in flight at once.
    async fn should_allow_call(&self) -> Option<bool> {
        let mut state = self.state.write().await;
        let max_trials = self.config.success_threshold.max(1);

        match state.stats.state {
            CircuitState::Closed => Some(false),
            CircuitState::HalfOpen => {
                if state.trials_in_flight < max_trials {
                    state.trials_in_flight += 1;
                    Some(true)
                } else {
                    state.stats.rejected_calls += 1;
                    None
                }
            }
            CircuitState::Open => {
                if state.stats.last_state_change.elapsed() >= self.config.recovery_timeout {
                    debug!(breaker = %self.name, "Circuit half-open, allowing trial call");
                    state.transition(CircuitState::HalfOpen);
                    state.trials_in_flight = 1;
                    Some(true)
                } else {
                    state.stats.rejected_calls += 1;
                    None
                }
            }
        }
    }

    fn release_trial(&self, state: &mut BreakerState, trial: bool) {
        if trial && state.stats.state == CircuitState::HalfOpen {
            state.trials_in_flight = state.trials_in_flight.saturating_sub(1);
        }
    }

    /// Record successful call
    async fn record_success(&self, trial: bool) {
        let mut state = self.state.write().await;
        self.release_trial(&mut state, trial);

        state.stats.total_calls += 1;
        state.stats.successful_calls += 1;
        state.stats.consecutive_successes += 1;

        if state.stats.state == CircuitState::HalfOpen
            && state.stats.consecutive_successes >= self.config.success_threshold
        {
            debug!(breaker = %self.name, "Circuit closed after successful trial calls");
            state.transition(CircuitState::Closed);
        }
    }

    /// Record failed call
    async fn record_failure(&self, trial: bool) {
        let mut state = self.state.write().await;
        self.release_trial(&mut state, trial);
        let now = Instant::now();

        state.stats.total_calls += 1;
        state.stats.failed_calls += 1;
        state.stats.consecutive_successes = 0;

        match state.stats.state {
            CircuitState::Closed => {
                state.failure_times.push_back(now);
                state.prune_failures(self.config.failure_time_window, now);
                if state.stats.recent_failures >= self.config.failure_threshold {
                    warn!(
                        breaker = %self.name,
                        failures = state.stats.recent_failures,
                        "Circuit opened"
                    );
                    state.transition(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                // In half-open state, any failure immediately opens the circuit
                warn!(breaker = %self.name, "Trial call failed, circuit re-opened");
                state.transition(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Get current circuit state
    pub async fn get_state(&self) -> CircuitState {
        self.state.read().await.stats.state
    }

    /// Get circuit breaker statistics
    pub async fn get_stats(&self) -> CircuitBreakerStats {
        let mut state = self.state.write().await;
        state.prune_failures(self.config.failure_time_window, Instant::now());
        state.stats.clone()
    }

    /// Reset circuit breaker to closed state
    pub async fn reset(&self) {
        *self.state.write().await = BreakerState::new();
    }

    /// Force open circuit (for testing or maintenance)
    pub async fn force_open(&self) {
        self.state.write().await.transition(CircuitState::Open);
    }

    /// Force close circuit (for testing or recovery)
    pub async fn force_close(&self) {
        self.state.write().await.transition(CircuitState::Closed);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing() -> impl std::future::Future<Output = OrchestratorResult<()>> {
        async { Err(OrchestratorError::Internal("Test error".to_string())) }
    }

    #[tokio::test]
    async fn test_circuit_breaker_closed_state() {
        let cb = CircuitBreaker::new("db");

        assert_eq!(cb.get_state().await, CircuitState::Closed);

        let result = cb.execute(|| async { Ok::<(), OrchestratorError>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.get_state().await, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_open_state() {
        let config = CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let cb = CircuitBreaker::with_config("db", config);

        for _ in 0..3 {
            assert!(cb.execute(failing).await.is_err());
        }

        assert_eq!(cb.get_state().await, CircuitState::Open);

        let result = cb.execute(|| async { Ok::<(), OrchestratorError>(()) }).await;
        assert!(matches!(
            result,
            Err(OrchestratorError::CircuitOpen { ref name }) if name == "db"
        ));
        assert_eq!(cb.get_stats().await.rejected_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_are_forgotten() {
        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            failure_time_window: Duration::from_millis(500),
            ..Default::default()
        };
        let cb = CircuitBreaker::with_config("cache", config);

        let _ = cb.execute(failing).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        let _ = cb.execute(failing).await;

        assert_eq!(cb.get_state().await, CircuitState::Closed);
        assert_eq!(cb.get_stats().await.recent_failures, 1);

        let _ = cb.execute(failing).await;
        assert_eq!(cb.get_state().await, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_recovery() {
        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_millis(100),
            success_threshold: 2,
            ..Default::default()
        };
        let cb = CircuitBreaker::with_config("db", config);

        for _ in 0..2 {
            let _ = cb.execute(failing).await;
        }
        assert_eq!(cb.get_state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let result = cb.execute(|| async { Ok::<(), OrchestratorError>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.get_state().await, CircuitState::HalfOpen);

        let result = cb.execute(|| async { Ok::<(), OrchestratorError>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.get_state().await, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let cb = CircuitBreaker::with_config("db", config);

        let _ = cb.execute(failing).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        let _ = cb.execute(failing).await;

        assert_eq!(cb.get_state().await, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_limits_concurrent_trials() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_millis(100),
            success_threshold: 2,
            request_timeout: Duration::from_secs(10),
            ..Default::default()
        };
        let cb = std::sync::Arc::new(CircuitBreaker::with_config("db", config));

        let _ = cb.execute(failing).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let mut trials = Vec::new();
        for _ in 0..2 {
            let cb = cb.clone();
            trials.push(tokio::spawn(async move {
                cb.execute(|| async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok::<(), OrchestratorError>(())
                })
                .await
            }));
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(cb.get_state().await, CircuitState::HalfOpen);

        let extra = cb.execute(|| async { Ok::<(), OrchestratorError>(()) }).await;
        assert!(matches!(extra, Err(OrchestratorError::CircuitOpen { .. })));
        assert_eq!(cb.get_stats().await.rejected_calls, 1);

        for trial in trials {
            assert!(trial.await.unwrap().is_ok());
        }
        assert_eq!(cb.get_state().await, CircuitState::Closed);

        let after = cb.execute(|| async { Ok::<(), OrchestratorError>(()) }).await;
        assert!(after.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_timeout() {
        let config = CircuitBreakerConfig {
            request_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let cb = CircuitBreaker::with_config("slow", config);

        let result = cb
            .execute(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<(), OrchestratorError>(())
            })
            .await;

        assert!(matches!(result, Err(OrchestratorError::Timeout(_))));

        let stats = cb.get_stats().await;
        assert_eq!(stats.recent_failures, 1);
        assert_eq!(stats.failed_calls, 1);
    }

    #[tokio::test]
    async fn test_force_and_reset() {
        let cb = CircuitBreaker::new("db");
        cb.force_open().await;
        assert_eq!(cb.get_state().await, CircuitState::Open);
        cb.force_close().await;
        assert_eq!(cb.get_state().await, CircuitState::Closed);
        cb.force_open().await;
        cb.reset().await;
        assert_eq!(cb.get_state().await, CircuitState::Closed);
        assert_eq!(cb.get_stats().await.total_calls, 0);
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        let invalid = CircuitBreakerConfig {
            success_threshold: 0,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }
}
