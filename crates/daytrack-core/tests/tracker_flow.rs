use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use daytrack_core::clock::{Clock, FixedClock};
use daytrack_core::datetime::parse_due_expr;
use daytrack_core::filter::{DateFilter, FilterState, PriorityFilter, StatusFilter};
use daytrack_core::state::UiEffect;
use daytrack_core::store::TaskStore;
use daytrack_core::task::{NewTask, Priority, Task};
use daytrack_core::tracker::Tracker;
use daytrack_core::TrackerError;
use tempfile::tempdir;

fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 8, 30, 0)
        .single()
        .expect("valid time")
}

fn open(path: &std::path::Path, clock: Arc<FixedClock>) -> Tracker {
    let store = TaskStore::open(path).expect("open store");
    Tracker::new(store, clock).expect("tracker")
}

fn assert_invariants(tasks: &[Task]) {
    for task in tasks {
        if task.completed {
            assert!(!task.immediate, "completed task {} holds a slot", task.id);
            assert!(!task.in_progress, "completed task {} is tracking", task.id);
        }
        if task.in_progress {
            assert!(task.start.is_some(), "tracking task {} has no start", task.id);
        }
    }
    let open_immediate = tasks.iter().filter(|t| t.immediate && !t.completed).count();
    assert!(open_immediate <= 5);
}

#[test]
fn write_report_round_trips_through_disk() {
    let dir = tempdir().expect("tempdir");
    let db = dir.path().join("tasks.db");
    let clock = Arc::new(FixedClock::new(morning(), chrono_tz::UTC));

    let due = parse_due_expr("tomorrow 9:00", morning(), chrono_tz::UTC).expect("due");
    let created = {
        let mut tracker = open(&db, clock.clone());
        tracker
            .create(NewTask::new("Write report", "", due, 60).with_priority(Priority::High))
            .expect("create")
    };

    let tracker = open(&db, clock);
    let loaded = tracker.get(created.id).expect("get");
    assert_eq!(loaded, created);
    assert_eq!(loaded.title, "Write report");
    assert_eq!(loaded.priority.value(), 3);
    assert!(!loaded.completed);
    assert_eq!(
        loaded.due,
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).single().expect("valid")
    );
}

#[test]
fn a_working_day() {
    let dir = tempdir().expect("tempdir");
    let clock = Arc::new(FixedClock::new(morning(), chrono_tz::UTC));
    let mut tracker = open(&dir.path().join("tasks.db"), clock.clone());

    let report = tracker
        .create(NewTask::new("Write report", "", morning() + Duration::hours(3), 60))
        .expect("create");
    let email = tracker
        .create(NewTask::new("Email", "", morning() + Duration::hours(1), 15).with_priority(Priority::Low))
        .expect("create");
    tracker
        .create(NewTask::new("Plan week", "", morning() + Duration::days(2), 45))
        .expect("create");

    tracker.toggle_immediate(report.id).expect("pin report");
    let today = tracker.snapshot();
    let titles: Vec<&str> = today.tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Write report", "Email"]);
    assert_eq!(today.immediate_count, 1);

    tracker.start_tracking(report.id).expect("start");
    clock.advance(Duration::minutes(37));
    let stopped = tracker.stop_tracking(report.id).expect("stop");
    assert_eq!(stopped.actual_minutes, 37);
    assert!(!stopped.in_progress);
    assert!(stopped.start.is_none());

    tracker.start_tracking(report.id).expect("restart");
    clock.advance(Duration::minutes(10));
    let done = tracker.set_completed(report.id, true).expect("complete");
    assert_eq!(done.actual_minutes, 47);
    assert!(done.completed && !done.in_progress && !done.immediate);
    assert_eq!(done.progress_percent(clock.now()), 100);

    let effects = tracker.drain_effects();
    assert!(effects.contains(&UiEffect::Message("Stopped: 37 min tracked".to_string())));
    assert_eq!(effects.last(), Some(&UiEffect::ShowCompletionSummary(done.clone())));

    let snap = tracker.snapshot();
    assert_eq!(snap.immediate_count, 0);
    assert_eq!(snap.completed_today, 1);
    assert_invariants(&snap.tasks);

    clock.advance(Duration::hours(1));
    let overdue = tracker
        .set_status_filter(StatusFilter::Overdue)
        .expect("overdue filter");
    assert_eq!(overdue.tasks.len(), 1);
    assert_eq!(overdue.tasks[0].id, email.id);

    let stats = tracker.statistics().expect("stats");
    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.completion_percent, 33);
    assert_eq!(stats.minutes_spent, 47);

    let overview = tracker.overview().expect("overview");
    assert_eq!(overview.overdue.count, 1);
    assert_eq!(overview.today.count, 2);
    assert_eq!(overview.recent_completed.len(), 1);
}

#[test]
fn immediate_slots_stay_capped_across_reopen() {
    let dir = tempdir().expect("tempdir");
    let clock = Arc::new(FixedClock::new(morning(), chrono_tz::UTC));
    let mut tracker = open(&dir.path().join("tasks.db"), clock);

    let tasks: Vec<Task> = (0..7)
        .map(|i| {
            tracker
                .create(NewTask::new(format!("task {i}"), "", morning(), 30))
                .expect("create")
        })
        .collect();

    for task in &tasks[..5] {
        tracker.toggle_immediate(task.id).expect("grant");
    }
    let err = tracker.toggle_immediate(tasks[5].id).expect_err("sixth refused");
    assert!(matches!(err, TrackerError::ImmediateSlotsFull { limit: 5 }));
    assert_eq!(err.to_string(), "Maximum 5 immediate tasks allowed");
    assert!(!tracker.get(tasks[5].id).expect("get").immediate);

    // Completing frees the slot permanently; reopening does not reclaim it.
    tracker.set_completed(tasks[0].id, true).expect("complete");
    tracker.toggle_immediate(tasks[5].id).expect("slot freed");
    let reopened = tracker.set_completed(tasks[0].id, false).expect("reopen");
    assert!(!reopened.immediate);
    assert!(tracker.toggle_immediate(tasks[6].id).is_err());

    tracker
        .set_filter(FilterState {
            date: DateFilter::All,
            status: StatusFilter::All,
            priority: PriorityFilter::Any,
        })
        .expect("all");
    let snap = tracker.snapshot();
    assert_eq!(snap.immediate_count, 5);
    assert_invariants(&snap.tasks);
}

#[test]
fn custom_day_filter_and_summary() {
    let dir = tempdir().expect("tempdir");
    let clock = Arc::new(FixedClock::new(morning(), chrono_tz::Europe::Berlin));
    let mut tracker = open(&dir.path().join("tasks.db"), clock);

    // 23:30 UTC on the 19th is already the 20th in Berlin.
    let late = Utc.with_ymd_and_hms(2026, 10, 19, 23, 30, 0).single().expect("valid");
    tracker.create(NewTask::new("late call", "", late, 30)).expect("create");

    let day = chrono::NaiveDate::from_ymd_opt(2026, 10, 20).expect("valid date");
    let snap = tracker.set_custom_date_filter(day).expect("custom");
    assert_eq!(snap.tasks.len(), 1);
    assert_eq!(snap.summary, "Oct 20");

    let snap = tracker.set_date_filter(DateFilter::Tomorrow).expect("tomorrow");
    assert!(snap.tasks.is_empty());

    let snap = tracker.clear_filters().expect("clear");
    assert_eq!(tracker.filter_summary(), "");
    assert!(snap.tasks.is_empty());
}
