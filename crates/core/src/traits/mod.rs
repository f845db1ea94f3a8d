pub mod cron_runner;
pub mod health_checker;
pub mod notifier;

pub use cron_runner::*;
pub use health_checker::*;
pub use notifier::*;
