use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use orchestrator_core::{task_fn, RetryPolicy, SchedulerConfig, TaskFn, TokioCronRunner};
use orchestrator_scheduler::{ServiceScheduler, TaskOptions};
use orchestrator_testing_utils::{
    ManualCronRunner, RecordingNotifier, ScriptedHealthChecker, TestEnv,
};

#[derive(Debug)]
struct QuotaExceeded {
    used: u32,
}

impl std::fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "quota exceeded after {} units", self.used)
    }
}

impl std::error::Error for QuotaExceeded {}

/// Task whose outcomes follow `script`; `true` means success
fn scripted_task(script: &[bool]) -> TaskFn {
    let outcomes = Arc::new(Mutex::new(script.iter().copied().collect::<VecDeque<_>>()));
    task_fn(move || {
        let outcomes = outcomes.clone();
        async move {
            let succeed = outcomes.lock().unwrap().pop_front().unwrap_or(true);
            if succeed {
                Ok(())
            } else {
                Err(anyhow::Error::new(QuotaExceeded { used: 7 }))
            }
        }
    })
}

#[tokio::test]
async fn execution_count_is_successes_plus_failures() {
    let runner = ManualCronRunner::new();
    let notifier = RecordingNotifier::new();
    let scheduler = ServiceScheduler::new(
        SchedulerConfig::default(),
        Arc::new(runner.clone()),
        Some(Arc::new(ScriptedHealthChecker::healthy())),
        Some(Arc::new(notifier.clone())),
    );

    let script = [true, false, true, true, false, false, true];
    scheduler
        .schedule_task("job", "*/1 * * * *", scripted_task(&script), TaskOptions::default())
        .await
        .unwrap();
    scheduler.start().await;

    for _ in 0..script.len() {
        let _ = runner.fire("job").await;
    }

    let task = scheduler.get_task("job").await.unwrap();
    assert_eq!(task.execution_count, 7);
    assert_eq!(task.failure_count, 3);
    assert_eq!(task.success_count(), 4);
    assert!(task.last_execution.is_some());
    TestEnv::settle().await;
    assert_eq!(notifier.matching("任务执行失败").len(), 3);
}

#[tokio::test]
async fn guard_returns_the_original_error() {
    let runner = ManualCronRunner::new();
    let scheduler = ServiceScheduler::new(
        SchedulerConfig::default(),
        Arc::new(runner.clone()),
        None,
        None,
    );
    scheduler
        .schedule_task("job", "0 * * * *", scripted_task(&[false]), TaskOptions::default())
        .await
        .unwrap();
    scheduler.start().await;

    let error = runner.fire("job").await.unwrap().unwrap_err();
    let original = error.downcast_ref::<QuotaExceeded>().unwrap();
    assert_eq!(original.used, 7);

    let task = scheduler.get_task("job").await.unwrap();
    assert_eq!(task.last_error.as_deref(), Some("quota exceeded after 7 units"));
}

#[tokio::test(start_paused = true)]
async fn cron_runner_retry_observes_guard_failures() {
    let scheduler = ServiceScheduler::new(
        SchedulerConfig::default(),
        Arc::new(TokioCronRunner::new()),
        None,
        None,
    );
    let options =
        TaskOptions::default().with_retry(RetryPolicy::new(2, Duration::from_millis(100)));
    scheduler
        .schedule_task("job", "0 0 * * *", scripted_task(&[false, true]), options)
        .await
        .unwrap();

    scheduler.run_task_now("job").await.unwrap();

    let task = scheduler.get_task("job").await.unwrap();
    assert_eq!(task.execution_count, 2);
    assert_eq!(task.failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn stopping_scheduler_lets_in_flight_run_finish() {
    let scheduler = ServiceScheduler::new(
        SchedulerConfig::default(),
        Arc::new(TokioCronRunner::new()),
        None,
        None,
    );
    let started = Arc::new(AtomicU32::new(0));
    let signal = Arc::new(tokio::sync::Notify::new());
    let (task_started, task_signal) = (started.clone(), signal.clone());
    scheduler
        .schedule_task(
            "export",
            "* * * * * *",
            task_fn(move || {
                let started = task_started.clone();
                let signal = task_signal.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    signal.notify_one();
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(())
                }
            }),
            TaskOptions::default(),
        )
        .await
        .unwrap();
    scheduler.start().await;

    signal.notified().await;
    scheduler.stop().await;
    assert_eq!(scheduler.get_task("export").await.unwrap().execution_count, 0);

    tokio::time::sleep(Duration::from_secs(30)).await;

    let runs = started.load(Ordering::SeqCst) as u64;
    let task = scheduler.get_task("export").await.unwrap();
    assert!(runs >= 1);
    assert_eq!(task.execution_count, runs);
    assert_eq!(task.failure_count, 0);
    assert!(task.last_duration_ms.is_some());
}

#[tokio::test]
async fn skipped_runs_are_not_executions() {
    let runner = ManualCronRunner::new();
    let checker = ScriptedHealthChecker::unhealthy();
    let counter = Arc::new(AtomicU32::new(0));
    let scheduler = ServiceScheduler::new(
        SchedulerConfig::default(),
        Arc::new(runner.clone()),
        Some(Arc::new(checker.clone())),
        None,
    );
    let task_counter = counter.clone();
    scheduler
        .schedule_task(
            "job",
            "0 * * * *",
            task_fn(move || {
                let counter = task_counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
            TaskOptions::default(),
        )
        .await
        .unwrap();

    for _ in 0..3 {
        scheduler.run_task_now("job").await.unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    let status = scheduler.get_status().await;
    assert_eq!(status.tasks[0].execution_count, 0);
    assert_eq!(checker.calls(), 3);
}
