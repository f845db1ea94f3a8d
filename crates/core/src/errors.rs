use thiserror::Error;

/// 编排核心错误类型定义
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("服务未找到: {id}")]
    ServiceNotFound { id: String },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("检测到循环依赖，涉及服务: {service_id}")]
    CircularDependency { service_id: String },

    #[error("熔断器已打开，拒绝调用依赖: {name}")]
    CircuitOpen { name: String },

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("健康检查失败: {0}")]
    HealthCheck(String),

    #[error("通知发送失败: {0}")]
    Notification(String),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

impl OrchestratorError {
    pub fn service_not_found<S: Into<String>>(id: S) -> Self {
        Self::ServiceNotFound { id: id.into() }
    }
    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }
    pub fn invalid_cron<E: Into<String>, M: Into<String>>(expr: E, message: M) -> Self {
        Self::InvalidCron {
            expr: expr.into(),
            message: message.into(),
        }
    }
    pub fn circular_dependency<S: Into<String>>(service_id: S) -> Self {
        Self::CircularDependency {
            service_id: service_id.into(),
        }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Timeout(_)
                | OrchestratorError::HealthCheck(_)
                | OrchestratorError::Notification(_)
                | OrchestratorError::CircuitOpen { .. }
        )
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}

impl From<::config::ConfigError> for OrchestratorError {
    fn from(err: ::config::ConfigError) -> Self {
        OrchestratorError::Configuration(err.to_string())
    }
}
