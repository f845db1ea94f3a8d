//! 服务注册中心
//!
//! - [`ServiceRegistry`]：服务注册、健康记录、依赖顺序解析与周期性健康巡检
//! - [`ServiceDiscovery`]：基于注册中心查询的发现模式
//! - [`compare_versions`]：点分数字版本比较

pub mod dependency;
pub mod discovery;
pub mod monitor;
pub mod registry;
pub mod version;

pub use discovery::{DependencyCheckReport, ServiceDiscovery};
pub use monitor::HealthSweepReport;
pub use registry::{RegistryStatus, ServiceRegistry, ServiceSummary};
pub use version::{compare_versions, satisfies_min_version};
