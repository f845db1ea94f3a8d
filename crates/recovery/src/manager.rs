use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use orchestrator_core::{
    CircuitBreaker, NotificationDispatcher, Notifier, RecoveryConfig, RecoveryState,
    RecoveryStatus, TaskFn,
};

/// 重启函数，与定时任务闭包同形
pub type RestartFn = TaskFn;

/// 一次失败之后的处理决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestartPlan {
    /// 在给定延迟后再尝试一次重启
    Retry(Duration),
    /// 达到最大重启次数，进入降级或失败状态
    GiveUp(RecoveryStatus),
}

/// 服务恢复管理器
///
/// 以一个"失败上报"事件驱动的四状态机（healthy / recovering / degraded / failed）：
/// 失败后按退避延迟安排重启，重启失败继续退避直到达到最大次数，然后进入优雅降级
/// （启用时）或失败状态。同一时刻最多只有一个待执行的重启任务。
///
/// 另外按依赖名维护一组熔断器，用于保护对外部依赖的调用。
#[derive(Clone)]
pub struct RecoveryManager {
    pub(crate) service_name: String,
    pub(crate) config: RecoveryConfig,
    pub(crate) state: Arc<RwLock<RecoveryState>>,
    pub(crate) breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,
    pub(crate) notifications: NotificationDispatcher,
    restart_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RecoveryManager {
    pub fn new(
        service_name: impl Into<String>,
        config: RecoveryConfig,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            config,
            state: Arc::new(RwLock::new(RecoveryState::default())),
            breakers: Arc::new(RwLock::new(HashMap::new())),
            notifications: NotificationDispatcher::new(notifier, "recovery-manager"),
            restart_handle: Arc::new(Mutex::new(None)),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// 第 `attempts` 次失败之后的重启延迟
    ///
    /// 未启用指数退避时恒为基础延迟，否则为 `min(基础延迟 × 2^attempts, 最大延迟)`。
    pub fn calculate_restart_delay(&self, attempts: u32) -> Duration {
        if !self.config.exponential_backoff {
            return self.config.restart_delay;
        }
        self.config
            .restart_delay
            .saturating_mul(2u32.saturating_pow(attempts))
            .min(self.config.max_restart_delay)
    }

    /// 上报一次服务失败
    ///
    /// 返回 `true` 只表示已经安排了重启，并不代表恢复成功；恢复结果通过
    /// [`get_recovery_state`](Self::get_recovery_state) 与通知观察。达到最大重启次数时
    /// 进入降级或失败状态并返回 `false`。
    pub async fn handle_service_failure(&self, error: impl Display, restart: RestartFn) -> bool {
        let error = error.to_string();
        let (plan, attempts) = {
            let mut state = self.state.write().await;
            (self.plan_next(&mut state, error.clone()), state.restart_attempts)
        };

        match plan {
            RestartPlan::Retry(delay) => {
                self.arm_restart(delay, restart).await;
                self.notify_restart_scheduled(attempts, delay, &error).await;
                true
            }
            RestartPlan::GiveUp(status) => {
                self.cancel_pending_restart().await;
                self.notify_gave_up(status, attempts, &error).await;
                false
            }
        }
    }

    /// 记录错误并决定下一步；持有状态写锁时调用
    fn plan_next(&self, state: &mut RecoveryState, error: String) -> RestartPlan {
        state.last_error = Some(error);

        if state.restart_attempts >= self.config.max_restart_attempts {
            if self.config.enable_graceful_degradation {
                state.enter_degradation();
                RestartPlan::GiveUp(RecoveryStatus::Degraded)
            } else {
                state.status = RecoveryStatus::Failed;
                RestartPlan::GiveUp(RecoveryStatus::Failed)
            }
        } else {
            state.mark_recovering();
            RestartPlan::Retry(self.calculate_restart_delay(state.restart_attempts))
        }
    }

    /// 取消旧的重启任务并安排新的重启循环
    async fn arm_restart(&self, delay: Duration, restart: RestartFn) {
        let mut handle = self.restart_handle.lock().await;
        if let Some(previous) = handle.take() {
            previous.abort();
        }

        let manager = self.clone();
        *handle = Some(tokio::spawn(async move {
            manager.restart_cycle(delay, restart).await;
        }));
    }

    /// 重启循环：等待、尝试重启，失败时按同样的规则计算下一次延迟或放弃
    ///
    /// 每轮 `restart_attempts` 严格递增，因此循环必然结束。
    async fn restart_cycle(&self, initial_delay: Duration, restart: RestartFn) {
        let mut delay = initial_delay;

        loop {
            tokio::time::sleep(delay).await;

            let attempt = {
                let mut state = self.state.write().await;
                state.restart_attempts += 1;
                state.last_restart = Some(Utc::now());
                state.restart_attempts
            };
            counter!("orchestrator_recovery_restart_attempts_total", "service" => self.service_name.clone())
                .increment(1);
            info!(service = %self.service_name, attempt, "尝试重启服务");

            match restart().await {
                Ok(()) => {
                    self.state.write().await.mark_recovered();
                    info!(service = %self.service_name, attempt, "服务重启成功");
                    self.notifications
                        .info(
                            format!("服务重启成功: {}", self.service_name),
                            json!({ "service": self.service_name, "attempt": attempt }),
                        )
                        .await;
                    return;
                }
                Err(e) => {
                    let error = format!("{e:#}");
                    warn!(service = %self.service_name, attempt, error = %error, "服务重启失败");

                    let (plan, attempts) = {
                        let mut state = self.state.write().await;
                        (self.plan_next(&mut state, error.clone()), state.restart_attempts)
                    };
                    match plan {
                        RestartPlan::Retry(next) => {
                            self.notify_restart_scheduled(attempts, next, &error).await;
                            delay = next;
                        }
                        RestartPlan::GiveUp(status) => {
                            self.notify_gave_up(status, attempts, &error).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn notify_restart_scheduled(&self, attempts: u32, delay: Duration, error: &str) {
        let delay_ms = delay.as_millis() as u64;
        info!(
            service = %self.service_name,
            attempt = attempts + 1,
            delay_ms,
            "已安排服务重启"
        );
        self.notifications
            .warn(
                format!("服务故障，计划重启: {}", self.service_name),
                json!({
                    "service": self.service_name,
                    "attempt": attempts + 1,
                    "delay_ms": delay_ms,
                    "error": error,
                }),
            )
            .await;
    }

    async fn notify_gave_up(&self, status: RecoveryStatus, attempts: u32, error: &str) {
        counter!("orchestrator_recovery_gave_up_total", "service" => self.service_name.clone())
            .increment(1);
        error!(
            service = %self.service_name,
            attempts,
            status = %status,
            "达到最大重启次数，停止重启"
        );
        self.notifications
            .error(
                format!("服务重启次数耗尽，进入{status}状态: {}", self.service_name),
                json!({
                    "service": self.service_name,
                    "attempts": attempts,
                    "status": status,
                    "error": error,
                }),
            )
            .await;
    }

    async fn cancel_pending_restart(&self) -> bool {
        match self.restart_handle.lock().await.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    /// 是否有尚未结束的重启任务
    pub async fn has_pending_restart(&self) -> bool {
        self.restart_handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// 进入优雅降级
    pub async fn enter_graceful_degradation(&self) {
        self.state.write().await.enter_degradation();
        warn!(service = %self.service_name, "进入优雅降级模式");
        self.notifications
            .warn(
                format!("进入优雅降级模式: {}", self.service_name),
                json!({ "service": self.service_name }),
            )
            .await;
    }

    /// 退出优雅降级，同时清零重启次数
    pub async fn exit_graceful_degradation(&self) {
        self.state.write().await.exit_degradation();
        info!(service = %self.service_name, "退出优雅降级模式");
        self.notifications
            .info(
                format!("退出优雅降级模式: {}", self.service_name),
                json!({ "service": self.service_name }),
            )
            .await;
    }

    pub async fn should_operate_in_degraded_mode(&self) -> bool {
        self.state.read().await.in_graceful_degradation
    }

    /// 当前恢复状态的副本
    pub async fn get_recovery_state(&self) -> RecoveryState {
        self.state.read().await.clone()
    }

    /// 取消待执行的重启并回到初始状态
    pub async fn reset_recovery_state(&self) {
        self.cancel_pending_restart().await;
        *self.state.write().await = RecoveryState::default();
        info!(service = %self.service_name, "恢复状态已重置");
    }

    /// 取消待执行的重启并清空熔断器
    pub async fn cleanup(&self) {
        let cancelled = self.cancel_pending_restart().await;
        let breakers = {
            let mut breakers = self.breakers.write().await;
            let count = breakers.len();
            breakers.clear();
            count
        };
        info!(
            service = %self.service_name,
            cancelled_restart = cancelled,
            breakers,
            "恢复管理器已清理"
        );
    }
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("service_name", &self.service_name)
            .field("config", &self.config)
            .finish()
    }
}
