use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{duration_ms, ConfigValidator};
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::models::RetryPolicy;
use crate::{OrchestratorError, OrchestratorResult};

/// 注册中心配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// 健康监控周期；`last_seen` 在两个周期内刷新过的服务被视为健康
    #[serde(rename = "health_check_interval_ms", with = "duration_ms")]
    pub health_check_interval: Duration,
    /// 超过该时长未出现的服务视为离线
    #[serde(rename = "offline_timeout_ms", with = "duration_ms")]
    pub offline_timeout: Duration,
    /// 是否自动注销离线服务
    pub enable_auto_cleanup: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            offline_timeout: Duration::from_secs(120),
            enable_auto_cleanup: true,
        }
    }
}

impl ConfigValidator for RegistryConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        if self.health_check_interval.is_zero() {
            return Err(OrchestratorError::config_error(
                "registry.health_check_interval_ms must be greater than 0",
            ));
        }
        if self.offline_timeout.is_zero() {
            return Err(OrchestratorError::config_error(
                "registry.offline_timeout_ms must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// 调度器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 健康轮询周期
    #[serde(rename = "health_check_interval_ms", with = "duration_ms")]
    pub health_check_interval: Duration,
    /// `start()` 时是否启动健康轮询（需要注入 HealthChecker）
    pub enable_health_monitoring: bool,
    /// 任务未指定重试策略时使用
    pub default_retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            enable_health_monitoring: true,
            default_retry: RetryPolicy::default(),
        }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        if self.health_check_interval.is_zero() {
            return Err(OrchestratorError::config_error(
                "scheduler.health_check_interval_ms must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// 恢复管理器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub max_restart_attempts: u32,
    /// 基础重启延迟
    #[serde(rename = "restart_delay_ms", with = "duration_ms")]
    pub restart_delay: Duration,
    pub exponential_backoff: bool,
    /// 指数退避上限
    #[serde(rename = "max_restart_delay_ms", with = "duration_ms")]
    pub max_restart_delay: Duration,
    pub enable_graceful_degradation: bool,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_restart_attempts: 3,
            restart_delay: Duration::from_secs(1),
            exponential_backoff: true,
            max_restart_delay: Duration::from_secs(30),
            enable_graceful_degradation: true,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ConfigValidator for RecoveryConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        if self.max_restart_delay < self.restart_delay {
            return Err(OrchestratorError::config_error(
                "recovery.max_restart_delay_ms must not be less than restart_delay_ms",
            ));
        }
        self.circuit_breaker.validate()
    }
}
