use async_trait::async_trait;

use crate::models::Notification;
use crate::OrchestratorResult;

/// 通知渠道接口
///
/// 投递机制由宿主服务实现（邮件、IM、Webhook 等）。编排核心只记录投递失败，从不向上传播。
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> OrchestratorResult<()>;
}
