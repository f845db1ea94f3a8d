use std::sync::Arc;

use orchestrator_core::RetryPolicy;

/// 条件任务的谓词，每次触发时求值
pub type TaskPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// 把闭包包装成 [`TaskPredicate`]
pub fn predicate<F>(f: F) -> TaskPredicate
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 调度任务选项
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOptions {
    /// 执行前是否调用注入的健康检查，不健康时跳过本次执行
    pub health_check: bool,
    pub notify_on_start: bool,
    pub notify_on_success: bool,
    pub notify_on_failure: bool,
    /// 未设置时使用调度器配置中的 `default_retry`
    pub retry: Option<RetryPolicy>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            health_check: true,
            notify_on_start: false,
            notify_on_success: false,
            notify_on_failure: true,
            retry: None,
        }
    }
}

impl TaskOptions {
    pub fn without_health_check(mut self) -> Self {
        self.health_check = false;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// 开启开始、成功、失败三类通知
    pub fn notify_all(mut self) -> Self {
        self.notify_on_start = true;
        self.notify_on_success = true;
        self.notify_on_failure = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.notify_on_start = false;
        self.notify_on_success = false;
        self.notify_on_failure = false;
        self
    }

    /// 维护任务：强制关闭健康门控并开启全部通知
    pub(crate) fn for_maintenance(self) -> Self {
        self.without_health_check().notify_all()
    }
}
