//! 健康门控的任务调度器
//!
//! [`ServiceScheduler`] 把任务交给可替换的 [`orchestrator_core::CronTaskRunner`] 执行，
//! 在每次执行外层加上健康门控、执行记账与通知。

mod guard;
pub mod health;
pub mod options;
pub mod scheduler;

pub use health::HealthChange;
pub use options::{predicate, TaskOptions, TaskPredicate};
pub use scheduler::{SchedulerStatus, ServiceScheduler};
