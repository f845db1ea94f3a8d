use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 恢复状态机的状态
///
/// ```text
/// Healthy ──失败──▶ Recovering ──重启成功──▶ Healthy
///                      │
///                      └─达到最大重启次数─▶ Degraded（启用优雅降级）/ Failed
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecoveryStatus {
    #[serde(rename = "healthy")]
    Healthy,
    #[serde(rename = "recovering")]
    Recovering,
    #[serde(rename = "degraded")]
    Degraded,
    #[serde(rename = "failed")]
    Failed,
}

impl fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryStatus::Healthy => write!(f, "healthy"),
            RecoveryStatus::Recovering => write!(f, "recovering"),
            RecoveryStatus::Degraded => write!(f, "degraded"),
            RecoveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// 单个受管服务的恢复状态。
///
/// 不变量：`in_graceful_degradation == true` 时 `status == Degraded`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryState {
    pub restart_attempts: u32,
    pub last_restart: Option<DateTime<Utc>>,
    pub in_graceful_degradation: bool,
    pub status: RecoveryStatus,
    pub last_error: Option<String>,
}

impl Default for RecoveryState {
    fn default() -> Self {
        Self {
            restart_attempts: 0,
            last_restart: None,
            in_graceful_degradation: false,
            status: RecoveryStatus::Healthy,
            last_error: None,
        }
    }
}

impl RecoveryState {
    pub fn enter_degradation(&mut self) {
        self.in_graceful_degradation = true;
        self.status = RecoveryStatus::Degraded;
    }

    pub fn exit_degradation(&mut self) {
        self.in_graceful_degradation = false;
        self.status = RecoveryStatus::Healthy;
        self.restart_attempts = 0;
    }

    /// 开始一轮重启；离开降级状态，因此同时清除降级标记
    pub fn mark_recovering(&mut self) {
        self.in_graceful_degradation = false;
        self.status = RecoveryStatus::Recovering;
    }

    pub fn mark_recovered(&mut self) {
        self.in_graceful_degradation = false;
        self.restart_attempts = 0;
        self.status = RecoveryStatus::Healthy;
        self.last_error = None;
    }
}
