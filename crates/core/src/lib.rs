pub mod circuit_breaker;
pub mod config;
pub mod cron_runner;
pub mod cron_utils;
pub mod errors;
pub mod logging;
pub mod models;
pub mod notification;
pub mod traits;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use config::{
    ConfigValidator, OrchestratorConfig, RecoveryConfig, RegistryConfig, SchedulerConfig,
};
pub use cron_runner::TokioCronRunner;
pub use cron_utils::CronScheduler;
pub use errors::*;
pub use models::*;
pub use notification::NotificationDispatcher;
pub use traits::*;
