use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;

use crate::{OrchestratorError, OrchestratorResult};

/// CRON表达式解析和调度工具
///
/// 接受标准 5 字段语法（分 时 日 月 周），解析前补齐秒字段；
/// 6/7 字段表达式原样交给 `cron` 解析。
#[derive(Debug, Clone)]
pub struct CronScheduler {
    expression: String,
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> OrchestratorResult<Self> {
        let expression = Self::normalize(cron_expr);
        let schedule = Schedule::from_str(&expression)
            .map_err(|e| OrchestratorError::invalid_cron(cron_expr, e.to_string()))?;

        Ok(Self {
            expression,
            schedule,
        })
    }

    /// 5 字段表达式补齐秒字段，其余原样返回
    pub fn normalize(cron_expr: &str) -> String {
        let trimmed = cron_expr.trim();
        if trimmed.split_whitespace().count() == 5 {
            format!("0 {trimmed}")
        } else {
            trimmed.to_string()
        }
    }

    /// 解析后实际使用的表达式
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_execution_time(now).map(|next| next - now)
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> OrchestratorResult<()> {
        Self::new(cron_expr).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_five_field_expression_is_accepted() {
        let scheduler = CronScheduler::new("*/5 * * * *").unwrap();
        assert_eq!(scheduler.expression(), "0 */5 * * * *");

        let from = Utc.with_ymd_and_hms(2024, 1, 1, 10, 2, 30).unwrap();
        let next = scheduler.next_execution_time(from).unwrap();
        assert_eq!(next.minute(), 5);
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn test_six_field_expression_kept() {
        let scheduler = CronScheduler::new("30 0 * * * *").unwrap();
        assert_eq!(scheduler.expression(), "30 0 * * * *");
    }

    #[test]
    fn test_upcoming_times() {
        let scheduler = CronScheduler::new("0 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        let times = scheduler.upcoming_times(from, 3);

        assert_eq!(times.len(), 3);
        assert_eq!(times[0].hour(), 11);
        assert_eq!(times[1].hour(), 12);
        assert_eq!(times[2].hour(), 13);
    }

    #[test]
    fn test_invalid_expression() {
        let result = CronScheduler::validate_cron_expression("not a cron");
        assert!(matches!(
            result,
            Err(OrchestratorError::InvalidCron { ref expr, .. }) if expr == "not a cron"
        ));
        assert!(CronScheduler::validate_cron_expression("61 * * * *").is_err());
    }
}
