//! Cron 执行器接口定义
//!
//! 调度器不直接计算触发时间，而是把带守卫的闭包交给一个 cron 执行器。执行器负责：
//! - 按 cron 表达式触发任务
//! - 单任务与全部任务的启动 / 停止 / 销毁
//! - 任务返回错误后按 `RetryPolicy` 自行重试
//!
//! 默认实现见 [`crate::cron_runner::TokioCronRunner`]，测试中可替换为手动触发的实现。

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::models::RetryPolicy;
use crate::OrchestratorResult;

/// 任务闭包返回的 future
pub type TaskFuture = BoxFuture<'static, anyhow::Result<()>>;

/// 可被重复调用的任务闭包
pub type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// 把普通异步闭包包装成 [`TaskFn`]
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// 注册到执行器时的任务选项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CronTaskOptions {
    pub retry: RetryPolicy,
}

/// 执行器内单个任务的状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronTaskStatus {
    pub id: String,
    pub schedule: String,
    pub running: bool,
    pub run_count: u64,
    pub failure_count: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

/// Cron 执行器接口
#[async_trait]
pub trait CronTaskRunner: Send + Sync {
    /// 注册任务（不自动启动）；同 id 的旧任务被替换
    async fn schedule(
        &self,
        id: &str,
        cron_expr: &str,
        task: TaskFn,
        options: CronTaskOptions,
    ) -> OrchestratorResult<()>;

    /// 启动单个任务，任务不存在时返回 false
    async fn start_task(&self, id: &str) -> bool;

    /// 停止单个任务，不会中断正在执行的那一次
    async fn stop_task(&self, id: &str) -> bool;

    async fn start_all(&self);

    async fn stop_all(&self);

    /// 停止并移除全部任务
    async fn destroy_all(&self);

    /// 停止并移除单个任务；重复调用返回 false
    async fn remove_task(&self, id: &str) -> bool;

    /// 立即执行一次任务（含重试），返回最终结果
    async fn trigger(&self, id: &str) -> OrchestratorResult<()>;

    async fn status(&self) -> Vec<CronTaskStatus>;
}
