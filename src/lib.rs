//! 进程内服务编排
//!
//! [`ServiceHost`] 把注册中心、服务发现、健康门控调度器与恢复管理器组装在一起；
//! [`ShutdownManager`] 为宿主循环提供关闭信号。各组件也可以直接从对应的 crate 使用。

pub mod host;
pub mod shutdown;

pub use host::{ServiceHost, ServiceHostBuilder};
pub use shutdown::ShutdownManager;

pub use orchestrator_core as core;
pub use orchestrator_recovery as recovery;
pub use orchestrator_registry as registry;
pub use orchestrator_scheduler as scheduler;
