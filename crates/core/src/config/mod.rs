//! 编排核心配置
//!
//! 每个组件一份配置结构（注册中心、调度器、恢复管理器、熔断器），全部带默认值与校验。
//! `OrchestratorConfig` 聚合它们，可从 TOML 文件加载，并允许 `ORCHESTRATOR_` 前缀的
//! 环境变量覆盖（层级分隔符为 `__`，例如 `ORCHESTRATOR_REGISTRY__OFFLINE_TIMEOUT_MS`）。
//!
//! 所有时长字段以毫秒序列化。

pub mod models;

use std::path::Path;

use ::config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::{OrchestratorError, OrchestratorResult};

pub use crate::circuit_breaker::CircuitBreakerConfig;
pub use models::{RecoveryConfig, RegistryConfig, SchedulerConfig};

/// 配置校验接口
pub trait ConfigValidator {
    fn validate(&self) -> OrchestratorResult<()>;
}

/// 时长按毫秒整数序列化
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// 编排核心的完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub registry: RegistryConfig,
    pub scheduler: SchedulerConfig,
    pub recovery: RecoveryConfig,
}

impl OrchestratorConfig {
    /// 从 TOML 文件（可选）与环境变量加载配置
    ///
    /// 未给出路径时依次尝试默认位置，均不存在则只使用默认值与环境变量。
    pub fn load(config_path: Option<&str>) -> OrchestratorResult<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(OrchestratorError::config_error(format!(
                    "配置文件不存在: {path}"
                )));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = ["config/orchestrator.toml", "orchestrator.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ORCHESTRATOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: OrchestratorConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 字符串解析配置，未出现的字段取默认值
    pub fn from_toml_str(content: &str) -> OrchestratorResult<Self> {
        let config: OrchestratorConfig = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> OrchestratorResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| OrchestratorError::config_error(format!("TOML序列化失败: {e}")))
    }
}

impl ConfigValidator for OrchestratorConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        self.registry.validate()?;
        self.scheduler.validate()?;
        self.recovery.validate()?;
        Ok(())
    }
}
