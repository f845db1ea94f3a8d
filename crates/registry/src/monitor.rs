use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use orchestrator_core::{HealthStatus, ServiceRegistration};

use crate::registry::ServiceRegistry;

/// 一次健康巡检的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSweepReport {
    /// 因离线超时被自动注销的服务
    pub removed: Vec<String>,
    pub healthy: usize,
    pub unhealthy: usize,
}

impl ServiceRegistry {
    /// 启动周期性健康巡检
    ///
    /// 同一时刻只存在一个巡检任务，重复调用会先取消旧任务。
    pub async fn start_health_monitor(&self) {
        let mut handle = self.monitor_handle.lock().await;
        if let Some(previous) = handle.take() {
            previous.abort();
        }

        let registry = self.clone();
        let period = self.config.health_check_interval;
        *handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval 的第一次 tick 立即完成
            interval.tick().await;

            loop {
                interval.tick().await;
                let report = registry.run_health_check(Utc::now()).await;
                debug!(
                    removed = report.removed.len(),
                    healthy = report.healthy,
                    unhealthy = report.unhealthy,
                    "健康巡检完成"
                );
            }
        }));

        info!(
            interval_ms = period.as_millis() as u64,
            "启动服务健康巡检"
        );
    }

    /// 停止健康巡检，未启动时返回 false
    pub async fn stop_health_monitor(&self) -> bool {
        match self.monitor_handle.lock().await.take() {
            Some(handle) => {
                handle.abort();
                info!("停止服务健康巡检");
                true
            }
            None => false,
        }
    }

    pub async fn is_monitoring(&self) -> bool {
        self.monitor_handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// 以 `now` 为当前时间执行一次健康巡检
    ///
    /// 启用自动清理时注销 `last_seen` 超过离线超时的服务；其余服务按最近出现时间推断
    /// 健康状态（两个巡检周期内出现过即健康），并走与 `update_service_health` 相同的
    /// 边沿触发通知。推断出的记录不刷新 `last_seen`。
    pub async fn run_health_check(&self, now: DateTime<Utc>) -> HealthSweepReport {
        let snapshot: Vec<(String, DateTime<Utc>)> = {
            let state = self.state.read().await;
            state
                .order
                .iter()
                .filter_map(|id| state.services.get(id))
                .map(|r| (r.service_id.clone(), r.last_seen))
                .collect()
        };

        let healthy_window = self.config.health_check_interval.saturating_mul(2);
        let mut report = HealthSweepReport::default();

        for (service_id, last_seen) in snapshot {
            let age = (now - last_seen).to_std().unwrap_or(Duration::ZERO);

            if self.config.enable_auto_cleanup && age > self.config.offline_timeout {
                info!(
                    service_id = %service_id,
                    age_ms = age.as_millis() as u64,
                    "服务离线超时，自动注销"
                );
                // 快照之后可能收到过心跳，按最新的 last_seen 再判断一次
                let offline_timeout = self.config.offline_timeout;
                let still_offline = |current: &ServiceRegistration| {
                    (now - current.last_seen)
                        .to_std()
                        .unwrap_or(Duration::ZERO)
                        > offline_timeout
                };
                if self.deregister_service_if(&service_id, still_offline).await {
                    report.removed.push(service_id);
                } else {
                    debug!(service_id = %service_id, "服务已恢复心跳，跳过注销");
                }
                continue;
            }

            let status = HealthStatus::from_bool(age < healthy_window);
            let transition = {
                let mut state = self.state.write().await;
                if !state.services.contains_key(&service_id) {
                    continue;
                }
                Self::record_health(&mut state, &service_id, status, now)
            };

            match status {
                HealthStatus::Healthy => report.healthy += 1,
                _ => report.unhealthy += 1,
            }
            if let Some(transition) = transition {
                self.notify_transition(&service_id, transition, Some("根据最近出现时间推断"))
                    .await;
            }
        }

        report
    }
}
