use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 服务健康状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    #[serde(rename = "healthy")]
    Healthy,
    #[serde(rename = "unhealthy")]
    Unhealthy,
    #[serde(rename = "unknown")]
    Unknown,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn from_bool(healthy: bool) -> Self {
        if healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// 健康检查结果，由 `HealthChecker` 返回，也作为注册中心健康更新的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: Option<String>,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }
}

/// 单个服务的最近一次健康记录。同一服务的 `timestamp` 严格递增。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
}

impl HealthRecord {
    /// 在上一条记录之后生成新记录；墙钟回拨或同一时刻重复写入时向后推进 1 微秒
    pub fn next(previous: Option<&HealthRecord>, status: HealthStatus, now: DateTime<Utc>) -> Self {
        let timestamp = match previous {
            Some(prev) if now <= prev.timestamp => {
                prev.timestamp + chrono::Duration::microseconds(1)
            }
            _ => now,
        };
        Self { status, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_record_timestamps_strictly_increase() {
        let now = Utc::now();
        let first = HealthRecord::next(None, HealthStatus::Healthy, now);
        let second = HealthRecord::next(Some(&first), HealthStatus::Unhealthy, now);
        let third = HealthRecord::next(
            Some(&second),
            HealthStatus::Healthy,
            now - chrono::Duration::seconds(5),
        );

        assert_eq!(first.timestamp, now);
        assert!(second.timestamp > first.timestamp);
        assert!(third.timestamp > second.timestamp);
    }

    #[test]
    fn test_health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(HealthStatus::from_bool(false), HealthStatus::Unhealthy);
        assert!(!HealthStatus::Unknown.is_healthy());
    }
}
