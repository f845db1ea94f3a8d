//! 故障恢复
//!
//! [`RecoveryManager`] 负责失败上报后的退避重启、优雅降级，以及按依赖划分的熔断器。

mod breakers;
pub mod manager;

pub use manager::{RecoveryManager, RestartFn};
