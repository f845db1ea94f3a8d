use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use orchestrator_core::{CircuitBreaker, CircuitState, OrchestratorError, OrchestratorResult};

use crate::manager::RecoveryManager;

impl RecoveryManager {
    /// 获取或创建指定依赖的熔断器
    ///
    /// 同名熔断器已存在时直接返回它，保留其累计的失败状态。
    pub async fn create_circuit_breaker(&self, dependency: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().await.get(dependency) {
            return existing.clone();
        }

        let mut breakers = self.breakers.write().await;
        breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                debug!(service = %self.service_name, dependency = %dependency, "创建熔断器");
                Arc::new(CircuitBreaker::with_config(
                    dependency,
                    self.config.circuit_breaker.clone(),
                ))
            })
            .clone()
    }

    pub async fn get_circuit_breaker(&self, dependency: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().await.get(dependency).cloned()
    }

    /// 通过指定依赖的熔断器执行调用，熔断器不存在时先创建
    pub async fn execute_with_circuit_breaker<F, Fut, T>(
        &self,
        dependency: &str,
        operation: F,
    ) -> OrchestratorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OrchestratorResult<T>>,
    {
        let breaker = self.create_circuit_breaker(dependency).await;
        let result = breaker.execute(operation).await;

        if let Err(OrchestratorError::CircuitOpen { .. }) = &result {
            counter!("orchestrator_recovery_circuit_rejections_total", "dependency" => dependency.to_string())
                .increment(1);
            warn!(service = %self.service_name, dependency = %dependency, "熔断器打开，拒绝调用");
        }
        result
    }

    /// 全部熔断器的当前状态
    pub async fn circuit_breaker_states(&self) -> HashMap<String, CircuitState> {
        let breakers: Vec<(String, Arc<CircuitBreaker>)> = self
            .breakers
            .read()
            .await
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.clone()))
            .collect();

        let mut states = HashMap::with_capacity(breakers.len());
        for (name, breaker) in breakers {
            states.insert(name, breaker.get_state().await);
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::{CircuitBreakerConfig, RecoveryConfig};
    use std::time::Duration;

    fn manager(failure_threshold: usize) -> RecoveryManager {
        let config = RecoveryConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold,
                recovery_timeout: Duration::from_secs(30),
                ..CircuitBreakerConfig::default()
            },
            ..RecoveryConfig::default()
        };
        RecoveryManager::new("svc", config, None)
    }

    async fn fail(manager: &RecoveryManager, dependency: &str) -> OrchestratorResult<()> {
        manager
            .execute_with_circuit_breaker(dependency, || async {
                Err(OrchestratorError::Internal("connection refused".to_string()))
            })
            .await
    }

    #[tokio::test]
    async fn test_create_returns_existing_breaker() {
        let manager = manager(2);
        let first = manager.create_circuit_breaker("db").await;
        first.force_open().await;

        let second = manager.create_circuit_breaker("db").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.get_state().await, CircuitState::Open);
        assert_eq!(first.config().failure_threshold, 2);
    }

    #[tokio::test]
    async fn test_execute_trips_breaker_per_dependency() {
        let manager = manager(2);

        let _ = fail(&manager, "db").await;
        let _ = fail(&manager, "db").await;
        let rejected = manager
            .execute_with_circuit_breaker("db", || async { Ok(42) })
            .await;
        assert!(matches!(rejected, Err(OrchestratorError::CircuitOpen { ref name }) if name == "db"));

        let other = manager
            .execute_with_circuit_breaker("cache", || async { Ok(7) })
            .await;
        assert_eq!(other.unwrap(), 7);

        let states = manager.circuit_breaker_states().await;
        assert_eq!(states.get("db"), Some(&CircuitState::Open));
        assert_eq!(states.get("cache"), Some(&CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_get_unknown_breaker() {
        let manager = manager(5);
        assert!(manager.get_circuit_breaker("db").await.is_none());
        assert!(manager.circuit_breaker_states().await.is_empty());
    }
}
