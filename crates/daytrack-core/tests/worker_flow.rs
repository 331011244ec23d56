use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use daytrack_core::clock::FixedClock;
use daytrack_core::store::TaskStore;
use daytrack_core::task::{NewTask, TaskId};
use daytrack_core::tracker::Tracker;
use daytrack_core::worker::{Command, Reply, TrackerWorker};
use daytrack_core::TrackerError;
use tempfile::tempdir;

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0)
        .single()
        .expect("valid time")
}

fn spawn_worker(path: &std::path::Path) -> (TrackerWorker, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(noon(), chrono_tz::UTC));
    let store = TaskStore::open(path).expect("open store");
    let tracker = Tracker::new(store, clock.clone()).expect("tracker");
    (TrackerWorker::spawn(tracker).expect("spawn"), clock)
}

fn task_id(reply: Reply) -> TaskId {
    match reply {
        Reply::Task(task) => task.id,
        other => panic!("expected a task reply, got {other:?}"),
    }
}

#[test]
fn queued_commands_apply_in_submission_order() {
    let dir = tempdir().expect("tempdir");
    let (worker, _) = spawn_worker(&dir.path().join("tasks.db"));
    let updates = worker.subscribe();

    let id = task_id(
        worker
            .call(Command::Create(NewTask::new("draft", "", noon(), 30)))
            .expect("create"),
    );

    // Fire-and-forget a burst of edits; the last one must win.
    let mut pending = Vec::new();
    for round in 0..20 {
        let mut task = match worker.call(Command::Get(id)).expect("get") {
            Reply::Task(task) => task,
            other => panic!("unexpected reply {other:?}"),
        };
        task.title = format!("draft {round}");
        pending.push(worker.submit(Command::Update(task)).expect("submit"));
    }
    for reply in pending {
        reply.recv().expect("reply").expect("update");
    }

    let final_snapshot = worker.snapshot();
    assert_eq!(final_snapshot.tasks.len(), 1);
    assert_eq!(final_snapshot.tasks[0].title, "draft 19");

    let versions: Vec<u64> = updates.try_iter().map(|snap| snap.version).collect();
    assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(versions.last().copied(), Some(final_snapshot.version));

    worker.shutdown();
}

#[test]
fn concurrent_immediate_requests_never_exceed_five() {
    let dir = tempdir().expect("tempdir");
    let (worker, _) = spawn_worker(&dir.path().join("tasks.db"));

    let ids: Vec<TaskId> = (0..12)
        .map(|i| {
            task_id(
                worker
                    .call(Command::Create(NewTask::new(format!("t{i}"), "", noon(), 30)))
                    .expect("create"),
            )
        })
        .collect();

    let worker = Arc::new(worker);
    let handles: Vec<_> = ids
        .iter()
        .map(|id| {
            let worker = Arc::clone(&worker);
            let id = *id;
            thread::spawn(move || worker.call(Command::SetImmediate(id, true)))
        })
        .collect();

    let mut granted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.join().expect("join") {
            Ok(_) => granted += 1,
            Err(TrackerError::ImmediateSlotsFull { limit: 5 }) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(granted, 5);
    assert_eq!(refused, 7);
    assert_eq!(worker.snapshot().immediate_count, 5);
}

#[test]
fn tracking_through_the_worker_uses_the_shared_clock() {
    let dir = tempdir().expect("tempdir");
    let (worker, clock) = spawn_worker(&dir.path().join("tasks.db"));

    let id = task_id(
        worker
            .call(Command::Create(NewTask::new("focus", "", noon(), 60)))
            .expect("create"),
    );
    worker.call(Command::StartTracking(id)).expect("start");
    clock.advance(Duration::minutes(25));
    let stopped = match worker.call(Command::StopTracking(id)).expect("stop") {
        Reply::Task(task) => task,
        other => panic!("unexpected reply {other:?}"),
    };
    assert_eq!(stopped.actual_minutes, 25);

    let effects = match worker.call(Command::DrainEffects).expect("drain") {
        Reply::Effects(effects) => effects,
        other => panic!("unexpected reply {other:?}"),
    };
    assert_eq!(effects.len(), 3);

    assert!(matches!(
        worker.call(Command::Delete(TaskId(999))),
        Err(TrackerError::NotFound(TaskId(999)))
    ));
}
