use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use metrics::{counter, histogram};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error};

use orchestrator_core::{
    HealthChecker, NotificationDispatcher, ScheduledTask, TaskFn, TaskKind,
};

use crate::options::{TaskOptions, TaskPredicate};

/// 包在用户任务外层的守卫
///
/// 依次执行：健康门控、条件谓词、计时执行、记账、通知，最后把任务原始的错误原样返回，
/// 让 cron 执行器的重试策略仍能观察到失败。被跳过的触发返回 `Ok(())` 且不计入执行次数。
pub(crate) struct TaskGuard {
    pub(crate) task_id: String,
    pub(crate) kind: TaskKind,
    pub(crate) options: TaskOptions,
    pub(crate) task: TaskFn,
    pub(crate) predicate: Option<TaskPredicate>,
    pub(crate) tasks: Arc<RwLock<HashMap<String, ScheduledTask>>>,
    pub(crate) health_checker: Option<Arc<dyn HealthChecker>>,
    pub(crate) notifications: NotificationDispatcher,
}

impl TaskGuard {
    pub(crate) fn into_task_fn(self) -> TaskFn {
        let guard = Arc::new(self);
        Arc::new(move || {
            let guard = guard.clone();
            async move { guard.run().await }.boxed()
        })
    }

    async fn should_skip(&self) -> bool {
        if self.options.health_check {
            if let Some(checker) = &self.health_checker {
                match checker.check().await {
                    Ok(result) if result.is_healthy() => {}
                    Ok(result) => {
                        debug!(
                            task_id = %self.task_id,
                            status = %result.status,
                            "服务不健康，跳过本次任务执行"
                        );
                        return true;
                    }
                    Err(e) => {
                        debug!(task_id = %self.task_id, error = %e, "健康检查失败，跳过本次任务执行");
                        return true;
                    }
                }
            }
        }

        if let Some(predicate) = &self.predicate {
            if !predicate() {
                debug!(task_id = %self.task_id, "条件不满足，跳过本次任务执行");
                return true;
            }
        }

        false
    }

    async fn run(&self) -> anyhow::Result<()> {
        if self.should_skip().await {
            counter!("orchestrator_scheduler_task_skipped_total", "task_id" => self.task_id.clone())
                .increment(1);
            return Ok(());
        }

        if self.options.notify_on_start {
            self.notifications
                .info(
                    format!("任务开始执行: {}", self.task_id),
                    json!({ "task_id": self.task_id, "kind": self.kind }),
                )
                .await;
        }

        let started_at = Utc::now();
        let started = Instant::now();
        let result = (self.task)().await;
        let duration = started.elapsed();
        let duration_ms = duration.as_millis() as u64;

        if let Some(task) = self.tasks.write().await.get_mut(&self.task_id) {
            match &result {
                Ok(()) => task.record_success(started_at, duration_ms),
                Err(e) => task.record_failure(started_at, duration_ms, format!("{e:#}")),
            }
        }

        histogram!("orchestrator_scheduler_task_duration_ms", "task_id" => self.task_id.clone())
            .record(duration.as_millis() as f64);

        match result {
            Ok(()) => {
                counter!(
                    "orchestrator_scheduler_task_executions_total",
                    "task_id" => self.task_id.clone(),
                    "outcome" => "success"
                )
                .increment(1);
                debug!(task_id = %self.task_id, duration_ms, "任务执行成功");
                if self.options.notify_on_success {
                    self.notifications
                        .info(
                            format!("任务执行成功: {}", self.task_id),
                            json!({ "task_id": self.task_id, "duration_ms": duration_ms }),
                        )
                        .await;
                }
                Ok(())
            }
            Err(e) => {
                counter!(
                    "orchestrator_scheduler_task_executions_total",
                    "task_id" => self.task_id.clone(),
                    "outcome" => "failure"
                )
                .increment(1);
                error!(task_id = %self.task_id, duration_ms, error = %e, "任务执行失败");
                if self.options.notify_on_failure {
                    self.notifications
                        .error(
                            format!("任务执行失败: {}", self.task_id),
                            json!({
                                "task_id": self.task_id,
                                "duration_ms": duration_ms,
                                "error": format!("{e:#}"),
                            }),
                        )
                        .await;
                }
                Err(e)
            }
        }
    }
}
