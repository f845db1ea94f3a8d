use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 定时任务类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskKind {
    /// 普通任务，可选健康门控
    #[serde(rename = "standard")]
    Standard,
    /// 条件任务，执行前评估调用方提供的谓词
    #[serde(rename = "conditional")]
    Conditional,
    /// 维护任务，强制关闭健康门控，降级时仍可运行
    #[serde(rename = "maintenance")]
    Maintenance,
}

/// 重试策略
///
/// 由 cron 执行器解释：任务返回错误后最多再重试 `max_retries` 次，
/// 第 n 次重试前等待 `retry_delay × 2^n`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(rename = "retry_delay_ms", with = "crate::config::duration_ms")]
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// 第 `retry` 次重试（从 0 开始）前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.retry_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// 定时任务元数据与执行统计
///
/// 不变量：`execution_count == 成功次数 + failure_count`，被健康门控或条件谓词跳过的
/// 触发不计入执行次数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub schedule: String,
    pub kind: TaskKind,
    pub health_check_enabled: bool,
    pub retry: RetryPolicy,
    pub execution_count: u64,
    pub failure_count: u64,
    pub last_execution: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn new(
        id: impl Into<String>,
        schedule: impl Into<String>,
        kind: TaskKind,
        health_check_enabled: bool,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            id: id.into(),
            schedule: schedule.into(),
            kind,
            health_check_enabled,
            retry,
            execution_count: 0,
            failure_count: 0,
            last_execution: None,
            last_error: None,
            last_duration_ms: None,
            created_at: Utc::now(),
        }
    }

    pub fn success_count(&self) -> u64 {
        self.execution_count - self.failure_count
    }

    pub fn record_success(&mut self, at: DateTime<Utc>, duration_ms: u64) {
        self.execution_count += 1;
        self.last_execution = Some(at);
        self.last_duration_ms = Some(duration_ms);
    }

    pub fn record_failure(&mut self, at: DateTime<Utc>, duration_ms: u64, error: String) {
        self.execution_count += 1;
        self.failure_count += 1;
        self.last_execution = Some(at);
        self.last_duration_ms = Some(duration_ms);
        self.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_doubles_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_execution_accounting() {
        let mut task = ScheduledTask::new(
            "cleanup",
            "0 * * * * *",
            TaskKind::Standard,
            true,
            RetryPolicy::none(),
        );
        let now = Utc::now();
        task.record_success(now, 5);
        task.record_failure(now, 7, "boom".to_string());
        task.record_success(now, 3);

        assert_eq!(task.execution_count, 3);
        assert_eq!(task.failure_count, 1);
        assert_eq!(task.success_count(), 2);
        assert_eq!(task.last_error.as_deref(), Some("boom"));
        assert_eq!(task.last_duration_ms, Some(3));
    }
}
