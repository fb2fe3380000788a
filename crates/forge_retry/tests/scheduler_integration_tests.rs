//! Timing and ordering tests for the retry scheduler.
//!
//! Most tests run on a paused clock, so backoff sleeps complete instantly
//! and measured gaps equal the scheduled delays.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forge_diagnostics::{classify, ClassifiedError, ErrorKind};
use forge_retry::{RetryScheduler, SchedulerConfig, TaskOverrides, TaskStatus};
use parking_lot::Mutex;
use tokio::time::Instant;

fn error_of(kind: ErrorKind) -> ClassifiedError {
    let raw = match kind {
        ErrorKind::ImportMissing => "ReferenceError: Btn is not defined",
        ErrorKind::Syntax => "Unterminated string literal",
        ErrorKind::TypeError => "TypeError: x is not a function",
        ErrorKind::Unknown => "something odd",
        _ => "RangeError: Maximum call stack size exceeded",
    };
    let error = classify(raw);
    assert_eq!(error.kind, kind);
    error
}

#[tokio::test(start_paused = true)]
async fn test_never_exceeds_max_attempts() {
    let scheduler = RetryScheduler::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let task = scheduler.enqueue(error_of(ErrorKind::ImportMissing), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(false) }
    });
    scheduler.wait_idle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let task = scheduler.get_task(&task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 3);

    // Terminal: nothing fires later.
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(scheduler.get_task(&task.id).unwrap().status, TaskStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_after_backoff() {
    let scheduler = RetryScheduler::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let task = scheduler.enqueue(error_of(ErrorKind::Syntax), move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(n >= 1) }
    });
    scheduler.wait_idle().await;

    let task = scheduler.get_task(&task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Succeeded);
    assert_eq!(task.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_fired_delays_stay_in_jitter_band() {
    let config = SchedulerConfig::default().with_max_attempts(5);
    let scheduler = RetryScheduler::new(config).unwrap();
    let starts = Arc::new(Mutex::new(Vec::<Instant>::new()));
    let recorder = starts.clone();

    let delays = Arc::new(Mutex::new(Vec::<Duration>::new()));
    let delay_log = delays.clone();
    scheduler.on_status_change(move |task| {
        if task.status == TaskStatus::Waiting {
            delay_log.lock().push(task.current_delay);
        }
    });

    scheduler.enqueue(error_of(ErrorKind::TypeError), move || {
        recorder.lock().push(Instant::now());
        async { Ok(false) }
    });
    scheduler.wait_idle().await;

    let starts = starts.lock().clone();
    assert_eq!(starts.len(), 5);

    // Scheduled backoff before each retry: 1s, 2s, 4s, 8s, each ±20%.
    let mut expected = Duration::from_secs(1);
    for pair in starts.windows(2) {
        let gap = pair[1] - pair[0];
        let low = expected.mul_f64(0.8);
        // Timers fire on millisecond ticks.
        let high = expected.mul_f64(1.2) + Duration::from_millis(1);
        assert!(gap >= low && gap <= high, "gap {gap:?} outside [{low:?}, {high:?}]");
        expected *= 2;
    }

    let delays = delays.lock().clone();
    assert_eq!(delays.len(), 4);
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    assert!(delays.iter().all(|d| *d <= Duration::from_secs(30)));
}

#[tokio::test(start_paused = true)]
async fn test_delay_saturates_at_max() {
    let config = SchedulerConfig::default()
        .with_max_attempts(6)
        .with_max_delay(Duration::from_secs(3))
        .with_jitter(0.0);
    let scheduler = RetryScheduler::new(config).unwrap();
    let starts = Arc::new(Mutex::new(Vec::<Instant>::new()));
    let recorder = starts.clone();

    scheduler.enqueue(error_of(ErrorKind::TypeError), move || {
        recorder.lock().push(Instant::now());
        async { Ok(false) }
    });
    scheduler.wait_idle().await;

    let starts = starts.lock().clone();
    let gaps: Vec<Duration> = starts.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3),
            Duration::from_secs(3),
            Duration::from_secs(3),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_priority_then_fifo_order() {
    let scheduler = RetryScheduler::default();
    let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));

    let enqueue = |name: &'static str, kind: ErrorKind| {
        let order = order.clone();
        scheduler.enqueue(error_of(kind), move || {
            let order = order.clone();
            async move {
                order.lock().push(name);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(true)
            }
        });
    };

    // The first task starts immediately and is not preempted.
    enqueue("unknown-first", ErrorKind::Unknown);
    enqueue("unknown-second", ErrorKind::Unknown);
    enqueue("syntax", ErrorKind::Syntax);
    enqueue("import-a", ErrorKind::ImportMissing);
    enqueue("import-b", ErrorKind::ImportMissing);

    scheduler.wait_idle().await;

    assert_eq!(
        *order.lock(),
        vec!["unknown-first", "import-a", "import-b", "syntax", "unknown-second"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_limit() {
    let scheduler = RetryScheduler::new(SchedulerConfig::default().with_concurrency(2)).unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let running = running.clone();
        let peak = peak.clone();
        scheduler.enqueue(error_of(ErrorKind::Syntax), move || {
            let running = running.clone();
            let peak = peak.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(true)
            }
        });
    }
    assert_eq!(scheduler.get_stats().in_progress, 2);

    scheduler.wait_idle().await;
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.get_stats().succeeded, 5);
}

#[tokio::test(start_paused = true)]
async fn test_drained_fires_once_per_idle_transition() {
    let scheduler = RetryScheduler::default();
    let drained = Arc::new(AtomicUsize::new(0));
    let counter = drained.clone();
    scheduler.on_queue_drained(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(scheduler.is_idle());
    scheduler.wait_idle().await;
    assert_eq!(drained.load(Ordering::SeqCst), 0);

    scheduler.enqueue(error_of(ErrorKind::Syntax), || async { Ok(true) });
    scheduler.enqueue(error_of(ErrorKind::Syntax), || async { Ok(true) });
    scheduler.wait_idle().await;
    assert_eq!(drained.load(Ordering::SeqCst), 1);

    scheduler.prune();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(drained.load(Ordering::SeqCst), 1);

    scheduler.enqueue(error_of(ErrorKind::Syntax), || async { Ok(false) });
    scheduler.wait_idle().await;
    assert_eq!(drained.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_drains() {
    let scheduler = RetryScheduler::default();
    let drained = Arc::new(AtomicUsize::new(0));
    let counter = drained.clone();
    scheduler.on_queue_drained(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let running = scheduler.enqueue(error_of(ErrorKind::Syntax), || async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(true)
    });
    scheduler.enqueue(error_of(ErrorKind::Syntax), || async { Ok(true) });
    scheduler.enqueue(error_of(ErrorKind::Syntax), || async { Ok(true) });

    assert_eq!(scheduler.cancel_all(), 2);
    assert_eq!(drained.load(Ordering::SeqCst), 0);

    scheduler.wait_idle().await;
    assert_eq!(drained.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.get_task(&running.id).unwrap().status, TaskStatus::Succeeded);
    assert_eq!(scheduler.get_tasks(Some(TaskStatus::Cancelled)).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_overrides() {
    let scheduler = RetryScheduler::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let task = scheduler.enqueue_with(
        error_of(ErrorKind::Unknown),
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(false) }
        },
        TaskOverrides::new()
            .max_attempts(5)
            .priority(99)
            .base_delay(Duration::from_millis(100)),
    );
    assert_eq!(task.priority, 99);
    assert_eq!(task.max_attempts, 5);
    assert_eq!(task.current_delay, Duration::from_millis(100));

    scheduler.wait_idle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_status_observer_sees_every_transition() {
    let scheduler = RetryScheduler::new(SchedulerConfig::default().with_max_attempts(2)).unwrap();
    let seen = Arc::new(Mutex::new(Vec::<TaskStatus>::new()));
    let log = seen.clone();
    scheduler.on_status_change(move |task| log.lock().push(task.status));

    scheduler.enqueue(error_of(ErrorKind::Syntax), || async { Ok(false) });
    scheduler.wait_idle().await;

    assert_eq!(
        *seen.lock(),
        vec![
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Waiting,
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Failed,
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_observers_see_changes_in_order_across_threads() {
    let config = SchedulerConfig::default()
        .with_base_delay(Duration::ZERO)
        .with_jitter(0.0)
        .with_max_attempts(4)
        .with_concurrency(4);
    let scheduler = RetryScheduler::new(config).unwrap();

    let seen = Arc::new(Mutex::new(HashMap::<String, Vec<TaskStatus>>::new()));
    let log = seen.clone();
    scheduler.on_status_change(move |task| {
        log.lock().entry(task.id.clone()).or_default().push(task.status);
    });
    let drained = Arc::new(tokio::sync::Notify::new());
    let signal = drained.clone();
    scheduler.on_queue_drained(move || signal.notify_one());

    // Hold every attempt until all tasks are queued.
    let gate = Arc::new(tokio::sync::RwLock::new(()));
    let closed = gate.write().await;
    let ids: Vec<String> = (0..8)
        .map(|_| {
            let gate = gate.clone();
            scheduler
                .enqueue(error_of(ErrorKind::Syntax), move || {
                    let gate = gate.clone();
                    async move {
                        let _open = gate.read().await;
                        Ok(false)
                    }
                })
                .id
        })
        .collect();
    drop(closed);
    drained.notified().await;

    let mut expected = Vec::new();
    for attempt in 1..=4 {
        expected.push(TaskStatus::Pending);
        expected.push(TaskStatus::InProgress);
        expected.push(if attempt < 4 { TaskStatus::Waiting } else { TaskStatus::Failed });
    }
    let seen = seen.lock();
    for id in &ids {
        assert_eq!(seen[id], expected, "task {id}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_observer_may_call_back_into_scheduler() {
    let scheduler = RetryScheduler::default();
    let handle = scheduler.clone();
    let seen = Arc::new(Mutex::new(Vec::<TaskStatus>::new()));
    let log = seen.clone();
    scheduler.on_status_change(move |task| {
        log.lock().push(task.status);
        if task.status == TaskStatus::Waiting {
            assert!(handle.cancel(&task.id));
        }
    });

    scheduler.enqueue(error_of(ErrorKind::Syntax), || async { Ok(false) });
    scheduler.wait_idle().await;

    assert_eq!(
        *seen.lock(),
        vec![
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Waiting,
            TaskStatus::Cancelled,
        ]
    );
}
