//! # 数据模型
//!
//! 编排核心共享的数据结构：服务注册信息、健康记录、定时任务统计、恢复状态与通知。
//!
//! ## 核心模型
//!
//! ### ServiceRegistration - 服务注册信息
//! 注册中心的主记录，携带能力、依赖与元数据；心跳与健康更新时刷新 `last_seen`。
//!
//! ### HealthRecord - 健康记录
//! 每个服务最近一次记录的健康状态，时间戳对同一服务严格递增。
//!
//! ### ScheduledTask - 定时任务
//! 调度器为每个任务维护的执行统计，`execution_count` 恒等于成功与失败次数之和。
//!
//! ### RecoveryState - 恢复状态
//! 恢复管理器的四状态机（healthy / recovering / degraded / failed）。
//!
//! ## 设计原则
//!
//! - 所有时间字段使用 `DateTime<Utc>`
//! - 状态字段使用枚举类型，避免无效状态
//! - 全部模型实现 `Serialize` / `Deserialize`，便于宿主服务直接输出

pub mod health;
pub mod notification;
pub mod recovery;
pub mod service;
pub mod task;

pub use health::*;
pub use notification::*;
pub use recovery::*;
pub use service::*;
pub use task::*;
