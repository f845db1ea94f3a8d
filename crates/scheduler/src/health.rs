use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::scheduler::ServiceScheduler;

/// 健康状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthChange {
    /// 不健康 → 健康，恢复全部任务
    Recovered,
    /// 健康 → 不健康，暂停全部任务
    Degraded,
}

impl ServiceScheduler {
    /// 执行一次健康检查并与上一次结果比较
    ///
    /// 变为健康时恢复全部任务，变为不健康时暂停全部任务（整体策略，不区分单个任务）。
    /// 调度器未运行时只记录状态，不启动任务。健康检查返回错误视为不健康。
    pub async fn check_health_transition(&self) -> Option<HealthChange> {
        let checker = self.health_checker.as_ref()?;

        let healthy = match checker.check().await {
            Ok(result) => result.is_healthy(),
            Err(e) => {
                debug!(error = %e, "健康检查失败，按不健康处理");
                false
            }
        };

        {
            let mut last = self.last_health.write().await;
            if *last == healthy {
                return None;
            }
            *last = healthy;
        }

        if healthy {
            if self.is_active().await {
                self.runner.start_all().await;
            }
            info!("服务恢复健康，恢复全部任务");
            self.notifications
                .info("服务恢复健康，已恢复全部定时任务", json!({ "healthy": true }))
                .await;
            Some(HealthChange::Recovered)
        } else {
            self.runner.stop_all().await;
            warn!("服务不健康，暂停全部任务");
            self.notifications
                .warn("服务不健康，已暂停全部定时任务", json!({ "healthy": false }))
                .await;
            Some(HealthChange::Degraded)
        }
    }

    pub(crate) async fn start_health_ticker(&self) {
        let mut ticker = self.health_ticker.lock().await;
        if let Some(previous) = ticker.take() {
            previous.abort();
        }

        let scheduler = self.clone();
        let period = self.config.health_check_interval;
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                interval.tick().await;
                if let Some(change) = scheduler.check_health_transition().await {
                    debug!(?change, "健康状态发生变化");
                }
            }
        }));

        info!(interval_ms = period.as_millis() as u64, "启动健康轮询");
    }

    pub(crate) async fn stop_health_ticker(&self) {
        if let Some(handle) = self.health_ticker.lock().await.take() {
            handle.abort();
            debug!("停止健康轮询");
        }
    }

    pub async fn is_health_monitoring(&self) -> bool {
        self.health_ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
