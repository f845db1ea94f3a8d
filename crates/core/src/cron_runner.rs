use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cron_utils::CronScheduler;
use crate::models::RetryPolicy;
use crate::traits::{CronTaskOptions, CronTaskRunner, CronTaskStatus, TaskFn};
use crate::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Default)]
struct RunStats {
    run_count: u64,
    failure_count: u64,
    last_run: Option<DateTime<Utc>>,
}

struct CronEntry {
    scheduler: CronScheduler,
    schedule: String,
    task: TaskFn,
    options: CronTaskOptions,
    stats: Arc<RwLock<RunStats>>,
    handle: Option<JoinHandle<()>>,
}

impl CronEntry {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

/// 基于 tokio 的 cron 执行器
///
/// 每个已启动的任务拥有一个触发循环；每次触发单独 spawn 执行，因此停止任务只会阻止
/// 后续触发，不会中断正在执行的那一次。执行失败后按任务的 [`RetryPolicy`] 重试。
#[derive(Clone, Default)]
pub struct TokioCronRunner {
    entries: Arc<RwLock<HashMap<String, CronEntry>>>,
}

impl TokioCronRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn_tick_loop(id: String, entry: &CronEntry) -> JoinHandle<()> {
        let scheduler = entry.scheduler.clone();
        let task = entry.task.clone();
        let retry = entry.options.retry.clone();
        let stats = entry.stats.clone();

        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = scheduler.next_execution_time(now) else {
                    debug!(task_id = %id, "No further executions for cron task");
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                let id = id.clone();
                let task = task.clone();
                let retry = retry.clone();
                let stats = stats.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_with_retry(&id, &task, &retry, &stats).await {
                        warn!(task_id = %id, error = %e, "Cron task failed after retries");
                    }
                });
            }
        })
    }
}

async fn run_with_retry(
    id: &str,
    task: &TaskFn,
    retry: &RetryPolicy,
    stats: &RwLock<RunStats>,
) -> anyhow::Result<()> {
    let mut attempt = 0;
    loop {
        let result = task().await;
        {
            let mut stats = stats.write().await;
            stats.run_count += 1;
            stats.last_run = Some(Utc::now());
            if result.is_err() {
                stats.failure_count += 1;
            }
        }

        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt < retry.max_retries => {
                let delay = retry.delay_for(attempt);
                attempt += 1;
                debug!(
                    task_id = %id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying cron task"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl CronTaskRunner for TokioCronRunner {
    async fn schedule(
        &self,
        id: &str,
        cron_expr: &str,
        task: TaskFn,
        options: CronTaskOptions,
    ) -> OrchestratorResult<()> {
        let scheduler = CronScheduler::new(cron_expr)?;
        let entry = CronEntry {
            scheduler,
            schedule: cron_expr.to_string(),
            task,
            options,
            stats: Arc::new(RwLock::new(RunStats::default())),
            handle: None,
        };

        let mut entries = self.entries.write().await;
        if let Some(mut previous) = entries.insert(id.to_string(), entry) {
            previous.stop();
            debug!(task_id = %id, "Replaced existing cron task");
        }
        Ok(())
    }

    async fn start_task(&self, id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };
        if !entry.is_running() {
            entry.handle = Some(Self::spawn_tick_loop(id.to_string(), entry));
        }
        true
    }

    async fn stop_task(&self, id: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(id) {
            Some(entry) => {
                entry.stop();
                true
            }
            None => false,
        }
    }

    async fn start_all(&self) {
        let mut entries = self.entries.write().await;
        for (id, entry) in entries.iter_mut() {
            if !entry.is_running() {
                entry.handle = Some(Self::spawn_tick_loop(id.clone(), entry));
            }
        }
        info!(tasks = entries.len(), "Started all cron tasks");
    }

    async fn stop_all(&self) {
        let mut entries = self.entries.write().await;
        for entry in entries.values_mut() {
            entry.stop();
        }
        info!(tasks = entries.len(), "Stopped all cron tasks");
    }

    async fn destroy_all(&self) {
        let mut entries = self.entries.write().await;
        for entry in entries.values_mut() {
            entry.stop();
        }
        entries.clear();
    }

    async fn remove_task(&self, id: &str) -> bool {
        match self.entries.write().await.remove(id) {
            Some(mut entry) => {
                entry.stop();
                true
            }
            None => false,
        }
    }

    async fn trigger(&self, id: &str) -> OrchestratorResult<()> {
        let (task, retry, stats) = {
            let entries = self.entries.read().await;
            let entry = entries
                .get(id)
                .ok_or_else(|| OrchestratorError::task_not_found(id))?;
            (
                entry.task.clone(),
                entry.options.retry.clone(),
                entry.stats.clone(),
            )
        };

        run_with_retry(id, &task, &retry, &stats)
            .await
            .map_err(|e| OrchestratorError::TaskExecution(format!("{e:#}")))
    }

    async fn status(&self) -> Vec<CronTaskStatus> {
        let entries = self.entries.read().await;
        let now = Utc::now();
        let mut statuses = Vec::with_capacity(entries.len());

        for (id, entry) in entries.iter() {
            let stats = entry.stats.read().await;
            let running = entry.is_running();
            statuses.push(CronTaskStatus {
                id: id.clone(),
                schedule: entry.schedule.clone(),
                running,
                run_count: stats.run_count,
                failure_count: stats.failure_count,
                last_run: stats.last_run,
                next_run: if running {
                    entry.scheduler.next_execution_time(now)
                } else {
                    None
                },
            });
        }

        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }
}
