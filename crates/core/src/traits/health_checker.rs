use async_trait::async_trait;

use crate::models::HealthCheckResult;
use crate::OrchestratorResult;

/// 宿主服务自身的健康检查接口
///
/// 调度器在每次执行前（健康门控）以及周期性健康轮询时调用。它与注册中心基于
/// `last_seen` 推断的健康状态是两个不同的来源，两者互不影响。
#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(&self) -> OrchestratorResult<HealthCheckResult>;
}
