use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use orchestrator_core::{
    CronScheduler, CronTaskOptions, CronTaskRunner, HealthChecker, NotificationDispatcher,
    Notifier, OrchestratorError, OrchestratorResult, ScheduledTask, SchedulerConfig, TaskFn,
    TaskKind,
};

use crate::guard::TaskGuard;
use crate::options::{TaskOptions, TaskPredicate};

/// 调度器状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub active: bool,
    pub health_monitoring: bool,
    pub last_known_health: bool,
    pub tasks: Vec<ScheduledTask>,
}

/// 健康门控的任务调度器
///
/// 把用户任务包装成带守卫的闭包交给 [`CronTaskRunner`]，负责执行记账、通知以及
/// 根据健康检查结果整体暂停/恢复全部任务。
#[derive(Clone)]
pub struct ServiceScheduler {
    pub(crate) config: SchedulerConfig,
    pub(crate) runner: Arc<dyn CronTaskRunner>,
    pub(crate) health_checker: Option<Arc<dyn HealthChecker>>,
    pub(crate) notifications: NotificationDispatcher,
    pub(crate) tasks: Arc<RwLock<HashMap<String, ScheduledTask>>>,
    pub(crate) active: Arc<RwLock<bool>>,
    pub(crate) last_health: Arc<RwLock<bool>>,
    pub(crate) health_ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ServiceScheduler {
    pub fn new(
        config: SchedulerConfig,
        runner: Arc<dyn CronTaskRunner>,
        health_checker: Option<Arc<dyn HealthChecker>>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            config,
            runner,
            health_checker,
            notifications: NotificationDispatcher::new(notifier, "service-scheduler"),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            active: Arc::new(RwLock::new(false)),
            last_health: Arc::new(RwLock::new(true)),
            health_ticker: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub async fn is_active(&self) -> bool {
        *self.active.read().await
    }

    /// 运行中且最近一次健康检查为健康时，任务才应当处于启动状态
    async fn should_run_tasks(&self) -> bool {
        self.is_active().await && *self.last_health.read().await
    }

    /// 启动调度器：开启健康轮询（启用且注入了健康检查时）并启动全部任务
    pub async fn start(&self) {
        {
            let mut active = self.active.write().await;
            if *active {
                debug!("调度器已在运行，忽略重复启动");
                return;
            }
            *active = true;
        }

        if self.config.enable_health_monitoring && self.health_checker.is_some() {
            self.start_health_ticker().await;
        }
        if *self.last_health.read().await {
            self.runner.start_all().await;
        } else {
            debug!("最近一次健康检查为不健康，任务保持暂停");
        }

        let task_count = self.tasks.read().await.len();
        info!(tasks = task_count, "调度器已启动");
    }

    /// 停止调度器：停止健康轮询与全部任务，保留任务定义
    pub async fn stop(&self) {
        {
            let mut active = self.active.write().await;
            if !*active {
                debug!("调度器未运行，忽略停止请求");
                return;
            }
            *active = false;
        }

        self.stop_health_ticker().await;
        self.runner.stop_all().await;
        info!("调度器已停止");
    }

    /// 销毁调度器：停止后丢弃全部任务定义与元数据
    pub async fn destroy(&self) {
        self.stop().await;
        self.runner.destroy_all().await;
        self.tasks.write().await.clear();
        info!("调度器已销毁");
    }

    /// 调度普通任务
    ///
    /// 非法 cron 表达式返回 `InvalidCron`，不会注册任何东西。同 id 的已有任务被替换，
    /// 其执行统计重新开始。调度器运行中时新任务立即启动。
    pub async fn schedule_task(
        &self,
        task_id: &str,
        cron_expr: &str,
        task: TaskFn,
        options: TaskOptions,
    ) -> OrchestratorResult<()> {
        self.schedule_guarded(task_id, cron_expr, TaskKind::Standard, task, None, options)
            .await
    }

    /// 调度条件任务：每次触发时谓词为真才执行
    pub async fn schedule_conditional_task(
        &self,
        task_id: &str,
        cron_expr: &str,
        task: TaskFn,
        predicate: TaskPredicate,
        options: TaskOptions,
    ) -> OrchestratorResult<()> {
        self.schedule_guarded(
            task_id,
            cron_expr,
            TaskKind::Conditional,
            task,
            Some(predicate),
            options,
        )
        .await
    }

    /// 调度维护任务：不经过健康门控，开始/成功/失败均发送通知
    pub async fn schedule_maintenance_task(
        &self,
        task_id: &str,
        cron_expr: &str,
        task: TaskFn,
        options: TaskOptions,
    ) -> OrchestratorResult<()> {
        self.schedule_guarded(
            task_id,
            cron_expr,
            TaskKind::Maintenance,
            task,
            None,
            options.for_maintenance(),
        )
        .await
    }

    async fn schedule_guarded(
        &self,
        task_id: &str,
        cron_expr: &str,
        kind: TaskKind,
        task: TaskFn,
        predicate: Option<TaskPredicate>,
        options: TaskOptions,
    ) -> OrchestratorResult<()> {
        CronScheduler::validate_cron_expression(cron_expr)?;

        let retry = options
            .retry
            .clone()
            .unwrap_or_else(|| self.config.default_retry.clone());
        let metadata = ScheduledTask::new(
            task_id,
            cron_expr,
            kind,
            options.health_check,
            retry.clone(),
        );

        let guarded = TaskGuard {
            task_id: task_id.to_string(),
            kind,
            options,
            task,
            predicate,
            tasks: self.tasks.clone(),
            health_checker: self.health_checker.clone(),
            notifications: self.notifications.clone(),
        }
        .into_task_fn();

        self.runner
            .schedule(task_id, cron_expr, guarded, CronTaskOptions { retry })
            .await?;
        let replaced = self
            .tasks
            .write()
            .await
            .insert(task_id.to_string(), metadata)
            .is_some();

        if self.should_run_tasks().await {
            self.runner.start_task(task_id).await;
        }

        info!(task_id = %task_id, schedule = %cron_expr, ?kind, replaced, "任务已调度");
        self.notifications
            .info(
                format!("任务已调度: {task_id}"),
                json!({ "task_id": task_id, "schedule": cron_expr, "kind": kind }),
            )
            .await;
        Ok(())
    }

    /// 移除任务，重复调用返回 false
    pub async fn remove_task(&self, task_id: &str) -> bool {
        let removed_from_runner = self.runner.remove_task(task_id).await;
        let removed_metadata = self.tasks.write().await.remove(task_id).is_some();

        if removed_metadata {
            info!(task_id = %task_id, "任务已移除");
        }
        removed_from_runner || removed_metadata
    }

    /// 立即执行一次任务（经过同样的守卫与记账）
    pub async fn run_task_now(&self, task_id: &str) -> OrchestratorResult<()> {
        if !self.tasks.read().await.contains_key(task_id) {
            return Err(OrchestratorError::task_not_found(task_id));
        }
        self.runner.trigger(task_id).await
    }

    pub async fn get_task(&self, task_id: &str) -> Option<ScheduledTask> {
        self.tasks.read().await.get(task_id).cloned()
    }

    pub async fn get_status(&self) -> SchedulerStatus {
        let mut tasks: Vec<ScheduledTask> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));

        SchedulerStatus {
            active: self.is_active().await,
            health_monitoring: self.is_health_monitoring().await,
            last_known_health: *self.last_health.read().await,
            tasks,
        }
    }
}

impl std::fmt::Debug for ServiceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScheduler")
            .field("config", &self.config)
            .field("has_health_checker", &self.health_checker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::{task_fn, NotificationLevel, RetryPolicy};
    use orchestrator_testing_utils::{
        ManualCronRunner, RecordingNotifier, ScriptedHealthChecker, TestEnv,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Fixture {
        scheduler: ServiceScheduler,
        runner: ManualCronRunner,
        checker: ScriptedHealthChecker,
        notifier: RecordingNotifier,
    }

    fn fixture() -> Fixture {
        let runner = ManualCronRunner::new();
        let checker = ScriptedHealthChecker::healthy();
        let notifier = RecordingNotifier::new();
        let scheduler = ServiceScheduler::new(
            SchedulerConfig::default(),
            Arc::new(runner.clone()),
            Some(Arc::new(checker.clone())),
            Some(Arc::new(notifier.clone())),
        );
        Fixture {
            scheduler,
            runner,
            checker,
            notifier,
        }
    }

    fn counting(counter: Arc<AtomicU32>) -> TaskFn {
        task_fn(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_invalid_cron_is_rejected() {
        let f = fixture();
        let result = f
            .scheduler
            .schedule_task(
                "bad",
                "not-a-cron",
                counting(Arc::new(AtomicU32::new(0))),
                TaskOptions::default(),
            )
            .await;

        assert!(matches!(result, Err(OrchestratorError::InvalidCron { .. })));
        assert!(f.scheduler.get_task("bad").await.is_none());
        assert!(!f.runner.contains("bad"));
    }

    #[tokio::test]
    async fn test_unhealthy_service_skips_execution() {
        let f = fixture();
        let counter = Arc::new(AtomicU32::new(0));
        f.scheduler
            .schedule_task("job", "*/5 * * * *", counting(counter.clone()), TaskOptions::default())
            .await
            .unwrap();
        f.scheduler.start().await;

        f.checker.set_healthy(false);
        assert!(f.runner.fire("job").await.unwrap().is_ok());
        f.checker.fail_with("probe error");
        assert!(f.runner.fire("job").await.unwrap().is_ok());

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(f.scheduler.get_task("job").await.unwrap().execution_count, 0);

        f.checker.set_healthy(true);
        f.runner.fire("job").await.unwrap().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(f.scheduler.get_task("job").await.unwrap().execution_count, 1);
    }

    #[tokio::test]
    async fn test_health_gate_disabled_runs_anyway() {
        let f = fixture();
        let counter = Arc::new(AtomicU32::new(0));
        f.checker.set_healthy(false);
        f.scheduler
            .schedule_task(
                "job",
                "*/5 * * * *",
                counting(counter.clone()),
                TaskOptions::default().without_health_check(),
            )
            .await
            .unwrap();

        f.scheduler.run_task_now("job").await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(f.checker.calls(), 0);
    }

    #[tokio::test]
    async fn test_conditional_task_consults_predicate() {
        let f = fixture();
        let counter = Arc::new(AtomicU32::new(0));
        let gate = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let gate_clone = gate.clone();
        f.scheduler
            .schedule_conditional_task(
                "cond",
                "0 * * * *",
                counting(counter.clone()),
                crate::predicate(move || gate_clone.load(Ordering::SeqCst)),
                TaskOptions::default(),
            )
            .await
            .unwrap();

        f.scheduler.run_task_now("cond").await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        gate.store(true, Ordering::SeqCst);
        f.scheduler.run_task_now("cond").await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let task = f.scheduler.get_task("cond").await.unwrap();
        assert_eq!(task.kind, TaskKind::Conditional);
        assert_eq!(task.execution_count, 1);
    }

    #[tokio::test]
    async fn test_maintenance_task_ignores_health_and_notifies() {
        let f = fixture();
        f.checker.set_healthy(false);
        f.scheduler
            .schedule_maintenance_task(
                "vacuum",
                "0 3 * * *",
                task_fn(|| async { Ok(()) }),
                TaskOptions::default(),
            )
            .await
            .unwrap();
        TestEnv::settle().await;
        f.notifier.clear();

        f.scheduler.run_task_now("vacuum").await.unwrap();
        TestEnv::settle().await;

        let task = f.scheduler.get_task("vacuum").await.unwrap();
        assert!(!task.health_check_enabled);
        assert_eq!(task.execution_count, 1);
        assert_eq!(f.notifier.matching("任务开始执行").len(), 1);
        assert_eq!(f.notifier.matching("任务执行成功").len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_notified_and_rethrown() {
        let f = fixture();
        f.scheduler
            .schedule_task(
                "broken",
                "0 * * * *",
                task_fn(|| async { Err::<(), _>(anyhow::anyhow!("disk full")) }),
                TaskOptions::default(),
            )
            .await
            .unwrap();

        let result = f.scheduler.run_task_now("broken").await;
        assert!(matches!(result, Err(OrchestratorError::TaskExecution(ref m)) if m.contains("disk full")));

        let task = f.scheduler.get_task("broken").await.unwrap();
        assert_eq!(task.failure_count, 1);
        assert_eq!(task.last_error.as_deref(), Some("disk full"));
        TestEnv::settle().await;
        assert_eq!(f.notifier.count_level(NotificationLevel::Error), 1);
    }

    #[tokio::test]
    async fn test_rescheduling_replaces_task_and_uses_default_retry() {
        let f = fixture();
        let counter = Arc::new(AtomicU32::new(0));
        f.scheduler
            .schedule_task("job", "0 * * * *", counting(counter.clone()), TaskOptions::default())
            .await
            .unwrap();
        f.scheduler.run_task_now("job").await.unwrap();

        let retry = RetryPolicy::new(2, Duration::from_millis(50));
        f.scheduler
            .schedule_task(
                "job",
                "30 * * * *",
                counting(counter.clone()),
                TaskOptions::default().with_retry(retry.clone()),
            )
            .await
            .unwrap();

        let task = f.scheduler.get_task("job").await.unwrap();
        assert_eq!(task.schedule, "30 * * * *");
        assert_eq!(task.execution_count, 0);
        assert_eq!(task.retry, retry);
        assert_eq!(f.runner.options("job").unwrap().retry, retry);
        assert_eq!(f.runner.task_count(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_and_remove() {
        let f = fixture();
        f.scheduler
            .schedule_task("a", "0 * * * *", counting(Arc::new(AtomicU32::new(0))), TaskOptions::default())
            .await
            .unwrap();
        assert!(!f.runner.is_running("a"));

        f.scheduler.start().await;
        f.scheduler.start().await;
        assert!(f.scheduler.is_active().await);
        assert!(f.runner.is_running("a"));

        f.scheduler
            .schedule_task("b", "0 * * * *", counting(Arc::new(AtomicU32::new(0))), TaskOptions::default())
            .await
            .unwrap();
        assert!(f.runner.is_running("b"));

        f.scheduler.stop().await;
        assert!(!f.runner.is_running("a"));
        assert_eq!(f.scheduler.get_status().await.tasks.len(), 2);

        assert!(f.scheduler.remove_task("a").await);
        assert!(!f.scheduler.remove_task("a").await);

        f.scheduler.destroy().await;
        assert!(f.scheduler.get_status().await.tasks.is_empty());
        assert_eq!(f.runner.task_count(), 0);
        assert!(matches!(
            f.scheduler.run_task_now("b").await,
            Err(OrchestratorError::TaskNotFound { .. })
        ));
    }
}
