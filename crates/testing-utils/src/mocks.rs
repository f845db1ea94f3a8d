//! Mock implementations of the collaborator traits
//!
//! In-memory doubles for `Notifier`, `HealthChecker` and `CronTaskRunner`.
//! Every mock is a cheap `Clone` handle so a test can keep one copy for
//! assertions and inject the other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use orchestrator_core::{
    CronScheduler, CronTaskOptions, CronTaskRunner, CronTaskStatus, HealthCheckResult,
    HealthChecker, Notification, NotificationLevel, Notifier, OrchestratorError,
    OrchestratorResult, TaskFn,
};

/// Notifier that records every notification it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.message.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }

    pub fn count_level(&self, level: NotificationLevel) -> usize {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.level == level)
            .count()
    }

    /// Notifications whose message contains `needle`
    pub fn matching(&self, needle: &str) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.message.contains(needle))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.notifications.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> OrchestratorResult<()> {
        self.notifications.lock().unwrap().push(notification);
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum ScriptedHealth {
    Result(HealthCheckResult),
    Error(String),
}

/// Health checker whose answer is controlled by the test
#[derive(Debug, Clone)]
pub struct ScriptedHealthChecker {
    state: Arc<Mutex<ScriptedHealth>>,
    calls: Arc<Mutex<u32>>,
}

impl ScriptedHealthChecker {
    pub fn healthy() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptedHealth::Result(HealthCheckResult::healthy()))),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn unhealthy() -> Self {
        let checker = Self::healthy();
        checker.set_healthy(false);
        checker
    }

    pub fn set_healthy(&self, healthy: bool) {
        let result = if healthy {
            HealthCheckResult::healthy()
        } else {
            HealthCheckResult::unhealthy("scripted failure")
        };
        *self.state.lock().unwrap() = ScriptedHealth::Result(result);
    }

    /// Make every subsequent check return an error
    pub fn fail_with(&self, message: &str) {
        *self.state.lock().unwrap() = ScriptedHealth::Error(message.to_string());
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl Default for ScriptedHealthChecker {
    fn default() -> Self {
        Self::healthy()
    }
}

#[async_trait]
impl HealthChecker for ScriptedHealthChecker {
    async fn check(&self) -> OrchestratorResult<HealthCheckResult> {
        *self.calls.lock().unwrap() += 1;
        match self.state.lock().unwrap().clone() {
            ScriptedHealth::Result(result) => Ok(result),
            ScriptedHealth::Error(message) => Err(OrchestratorError::HealthCheck(message)),
        }
    }
}

struct ManualEntry {
    schedule: String,
    task: TaskFn,
    options: CronTaskOptions,
    running: bool,
    run_count: u64,
    failure_count: u64,
}

/// Cron runner that never fires on its own
///
/// `fire(id)` simulates a scheduled tick (skipped while the task is stopped);
/// `trigger(id)` runs the task regardless of its running flag. Neither retries.
#[derive(Clone, Default)]
pub struct ManualCronRunner {
    entries: Arc<Mutex<HashMap<String, ManualEntry>>>,
}

impl ManualCronRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a scheduled tick; `None` when the task is unknown or stopped
    pub async fn fire(&self, id: &str) -> Option<anyhow::Result<()>> {
        let task = {
            let entries = self.entries.lock().unwrap();
            let entry = entries.get(id)?;
            if !entry.running {
                return None;
            }
            entry.task.clone()
        };
        Some(self.run(id, task).await)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(id)
            .is_some_and(|e| e.running)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().unwrap().contains_key(id)
    }

    pub fn task_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn options(&self, id: &str) -> Option<CronTaskOptions> {
        self.entries
            .lock()
            .unwrap()
            .get(id)
            .map(|e| e.options.clone())
    }

    async fn run(&self, id: &str, task: TaskFn) -> anyhow::Result<()> {
        let result = task().await;
        if let Some(entry) = self.entries.lock().unwrap().get_mut(id) {
            entry.run_count += 1;
            if result.is_err() {
                entry.failure_count += 1;
            }
        }
        result
    }
}

#[async_trait]
impl CronTaskRunner for ManualCronRunner {
    async fn schedule(
        &self,
        id: &str,
        cron_expr: &str,
        task: TaskFn,
        options: CronTaskOptions,
    ) -> OrchestratorResult<()> {
        CronScheduler::validate_cron_expression(cron_expr)?;
        self.entries.lock().unwrap().insert(
            id.to_string(),
            ManualEntry {
                schedule: cron_expr.to_string(),
                task,
                options,
                running: false,
                run_count: 0,
                failure_count: 0,
            },
        );
        Ok(())
    }

    async fn start_task(&self, id: &str) -> bool {
        match self.entries.lock().unwrap().get_mut(id) {
            Some(entry) => {
                entry.running = true;
                true
            }
            None => false,
        }
    }

    async fn stop_task(&self, id: &str) -> bool {
        match self.entries.lock().unwrap().get_mut(id) {
            Some(entry) => {
                entry.running = false;
                true
            }
            None => false,
        }
    }

    async fn start_all(&self) {
        for entry in self.entries.lock().unwrap().values_mut() {
            entry.running = true;
        }
    }

    async fn stop_all(&self) {
        for entry in self.entries.lock().unwrap().values_mut() {
            entry.running = false;
        }
    }

    async fn destroy_all(&self) {
        self.entries.lock().unwrap().clear();
    }

    async fn remove_task(&self, id: &str) -> bool {
        self.entries.lock().unwrap().remove(id).is_some()
    }

    async fn trigger(&self, id: &str) -> OrchestratorResult<()> {
        let task = self
            .entries
            .lock()
            .unwrap()
            .get(id)
            .map(|e| e.task.clone())
            .ok_or_else(|| OrchestratorError::task_not_found(id))?;

        self.run(id, task)
            .await
            .map_err(|e| OrchestratorError::TaskExecution(format!("{e:#}")))
    }

    async fn status(&self) -> Vec<CronTaskStatus> {
        let entries = self.entries.lock().unwrap();
        let mut statuses: Vec<CronTaskStatus> = entries
            .iter()
            .map(|(id, e)| CronTaskStatus {
                id: id.clone(),
                schedule: e.schedule.clone(),
                running: e.running,
                run_count: e.run_count,
                failure_count: e.failure_count,
                last_run: None,
                next_run: e
                    .running
                    .then(|| CronScheduler::new(&e.schedule).ok())
                    .flatten()
                    .and_then(|s| s.next_execution_time(Utc::now())),
            })
            .collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }
}
