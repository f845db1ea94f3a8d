//! 日志初始化
//!
//! 编排核心本身只使用 `tracing` 宏输出结构化字段（`service_id`、`task_id`、`dependency`、
//! `attempt`、`delay_ms` 等）。宿主进程可以调用 [`init_logging`] 安装订阅者。

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 支持的日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(format: &str) -> Result<Self> {
        match format.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(anyhow::anyhow!("不支持的日志格式: {format}")),
        }
    }
}

/// 初始化日志系统
///
/// `RUST_LOG` 存在时优先于 `log_level`。重复初始化返回错误。
pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let format: LogFormat = log_format.parse()?;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("初始化JSON日志格式失败")?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("初始化Pretty日志格式失败")?,
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()
            .context("初始化Compact日志格式失败")?,
    }

    Ok(())
}
