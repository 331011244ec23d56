use std::sync::Arc;
use std::sync::mpsc::Receiver;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::datetime::{DueRange, format_due, local_date};
use crate::error::{Result, TrackerError};
use crate::filter::{DateFilter, FilterState, PriorityFilter, StatusFilter};
use crate::state::{EffectQueue, Snapshot, StateHub, UiEffect};
use crate::stats::{Overview, Statistics};
use crate::store::{IMMEDIATE_LIMIT, TaskStore};
use crate::task::{NewTask, Task, TaskId};

/// Presentation-facing operations. Every mutation is written to the store and
/// followed by a full refresh of the published snapshot.
pub struct Tracker {
    store: TaskStore,
    clock: Arc<dyn Clock>,
    filter: FilterState,
    hub: Arc<StateHub>,
    effects: EffectQueue,
    immediate_limit: u32,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("store", &self.store)
            .field("filter", &self.filter)
            .field("immediate_limit", &self.immediate_limit)
            .finish_non_exhaustive()
    }
}

impl Tracker {
    pub fn new(store: TaskStore, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_hub(store, clock, Arc::new(StateHub::new()))
    }

    /// Publishes an initial snapshot into `hub` before returning.
    pub fn with_hub(store: TaskStore, clock: Arc<dyn Clock>, hub: Arc<StateHub>) -> Result<Self> {
        let mut tracker = Self {
            store,
            clock,
            filter: FilterState::default(),
            hub,
            effects: EffectQueue::default(),
            immediate_limit: IMMEDIATE_LIMIT,
        };
        tracker.refresh()?;
        Ok(tracker)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn get(&self, id: TaskId) -> Result<Task> {
        self.store.get(id)
    }

    #[tracing::instrument(skip(self, new), fields(title = %new.title))]
    pub fn create(&mut self, new: NewTask) -> Result<Task> {
        new.validate()?;
        let task = self.store.insert(new, self.now())?;
        info!(id = %task.id, "created task");
        self.effects.message("Task created successfully!");
        self.refresh()?;
        Ok(task)
    }

    /// Replaces a task with an edited copy. A change to the immediate flag
    /// goes through the slot check in the same transaction as the write.
    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn update(&mut self, mut task: Task) -> Result<Task> {
        validate_edit(&task)?;
        let existing = self.store.get(task.id)?;

        if !task.in_progress {
            task.start = None;
        }
        if task.completed && (task.in_progress || task.immediate) {
            task.set_completed(true, self.now());
        }

        if task.immediate != existing.immediate {
            let outcome = self.store.update_checked(&task, self.immediate_limit);
            self.report_refusal(task.id, outcome)?;
        } else {
            self.store.update(&task)?;
        }
        self.queue_summary(&task);
        self.effects.message("Task updated successfully!");
        self.refresh()?;
        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, id: TaskId) -> Result<()> {
        self.store.delete(id)?;
        self.effects.message("Task deleted");
        self.refresh()?;
        Ok(())
    }

    /// Opening a session on a running or completed task changes nothing.
    #[tracing::instrument(skip(self))]
    pub fn start_tracking(&mut self, id: TaskId) -> Result<Task> {
        let mut task = self.store.get(id)?;
        if task.start(self.now()) {
            self.persist(&task)?;
            info!("started tracking");
            self.effects.message("Started tracking");
        }
        self.refresh()?;
        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    pub fn stop_tracking(&mut self, id: TaskId) -> Result<Task> {
        let mut task = self.store.get(id)?;
        if let Some(minutes) = task.stop(self.now()) {
            self.persist(&task)?;
            info!(minutes, total = task.actual_minutes, "stopped tracking");
            self.effects
                .message(format!("Stopped: {} tracked", task.formatted_actual()));
        }
        self.refresh()?;
        Ok(task)
    }

    pub fn toggle_tracking(&mut self, id: TaskId) -> Result<Task> {
        if self.store.get(id)?.in_progress {
            self.stop_tracking(id)
        } else {
            self.start_tracking(id)
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn set_completed(&mut self, id: TaskId, completed: bool) -> Result<Task> {
        let mut task = self.store.get(id)?;
        task.set_completed(completed, self.now());
        self.persist(&task)?;
        info!(completed, "changed completion");
        self.refresh()?;
        Ok(task)
    }

    pub fn toggle_completion(&mut self, id: TaskId) -> Result<Task> {
        let completed = self.store.get(id)?.completed;
        self.set_completed(id, !completed)
    }

    /// Flips the immediate flag. A refused grant is queued as a message and
    /// returned as the error.
    #[tracing::instrument(skip(self))]
    pub fn toggle_immediate(&mut self, id: TaskId) -> Result<Task> {
        let desired = !self.store.get(id)?.immediate;
        self.set_immediate(id, desired)
    }

    #[tracing::instrument(skip(self))]
    pub fn set_immediate(&mut self, id: TaskId, immediate: bool) -> Result<Task> {
        let outcome = self.grant_immediate(id, immediate);
        self.refresh()?;
        outcome
    }

    #[tracing::instrument(skip(self))]
    pub fn reschedule(&mut self, id: TaskId, due: DateTime<Utc>) -> Result<Task> {
        let mut task = self.store.get(id)?;
        task.reschedule(due);
        self.persist(&task)?;
        let when = format_due(task.due, self.clock.timezone());
        info!(due = %task.due, "rescheduled task");
        self.effects.message(format!("Rescheduled to {when}"));
        self.refresh()?;
        Ok(task)
    }

    pub fn filter(&self) -> FilterState {
        self.filter
    }

    pub fn filter_summary(&self) -> String {
        self.filter.summary()
    }

    pub fn set_filter(&mut self, filter: FilterState) -> Result<Arc<Snapshot>> {
        self.filter = filter;
        self.refresh()
    }

    pub fn set_date_filter(&mut self, date: DateFilter) -> Result<Arc<Snapshot>> {
        self.filter.date = date;
        self.refresh()
    }

    pub fn set_custom_date_filter(&mut self, day: NaiveDate) -> Result<Arc<Snapshot>> {
        self.set_date_filter(DateFilter::Custom(day))
    }

    pub fn set_status_filter(&mut self, status: StatusFilter) -> Result<Arc<Snapshot>> {
        self.filter.status = status;
        self.refresh()
    }

    pub fn set_priority_filter(&mut self, priority: PriorityFilter) -> Result<Arc<Snapshot>> {
        self.filter.priority = priority;
        self.refresh()
    }

    pub fn clear_filters(&mut self) -> Result<Arc<Snapshot>> {
        self.set_filter(FilterState::default())
    }

    /// Re-reads the filtered list and counters and publishes them.
    #[tracing::instrument(skip(self), fields(filter = ?self.filter))]
    pub fn refresh(&mut self) -> Result<Arc<Snapshot>> {
        let now = self.now();
        let tz = self.clock.timezone();
        let query = self
            .filter
            .resolve(now, tz)
            .map_err(|err| TrackerError::Validation(format!("{err:#}")))?;

        let snapshot = Snapshot {
            version: 0,
            filter: self.filter,
            summary: self.filter.summary(),
            tasks: self.store.query(query)?,
            immediate_count: self.store.count_open_immediate()?,
            completed_today: self.store.count_completed_between(self.today_window()?)?,
            completed_total: self.store.count_completed()?,
        };
        self.hub.publish(snapshot);
        Ok(self.hub.current())
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.hub.current()
    }

    pub fn subscribe(&self) -> Receiver<Arc<Snapshot>> {
        self.hub.subscribe()
    }

    pub fn hub(&self) -> Arc<StateHub> {
        Arc::clone(&self.hub)
    }

    pub fn drain_effects(&mut self) -> Vec<UiEffect> {
        self.effects.drain()
    }

    pub fn statistics(&self) -> Result<Statistics> {
        Ok(Statistics::compute(&self.store.all_tasks()?))
    }

    #[tracing::instrument(skip(self))]
    pub fn overview(&self) -> Result<Overview> {
        let now = self.now();
        let tz = self.clock.timezone();
        let today = local_date(now, tz);
        let tomorrow = today
            .succ_opt()
            .ok_or_else(|| TrackerError::Validation(format!("date out of range: {today}")))?;

        Ok(Overview::build(
            self.store.overdue_tasks(now)?,
            self.store.tasks_due_on(today, tz)?,
            self.store.tasks_due_on(tomorrow, tz)?,
            &self.store.all_tasks()?,
            self.store.completed_tasks()?,
        ))
    }

    fn today_window(&self) -> Result<DueRange> {
        let tz = self.clock.timezone();
        let today = local_date(self.now(), tz);
        DueRange::local_day(today, tz).map_err(|err| TrackerError::Validation(format!("{err:#}")))
    }

    /// Writes the row and queues the completion summary when a completed
    /// task has tracked time.
    fn persist(&mut self, task: &Task) -> Result<()> {
        self.store.update(task)?;
        self.queue_summary(task);
        Ok(())
    }

    fn queue_summary(&mut self, task: &Task) {
        if task.completed && task.actual_minutes > 0 {
            self.effects
                .push(UiEffect::ShowCompletionSummary(task.clone()));
        }
    }

    fn grant_immediate(&mut self, id: TaskId, immediate: bool) -> Result<Task> {
        let outcome = self
            .store
            .set_immediate_checked(id, immediate, self.immediate_limit);
        self.report_refusal(id, outcome)
    }

    /// Queues a user-facing refusal as a message; the error still propagates.
    fn report_refusal<T>(&mut self, id: TaskId, outcome: Result<T>) -> Result<T> {
        match outcome {
            Err(err) if err.is_user_facing() => {
                warn!(id = %id, error = %err, "immediate change refused");
                self.effects.message(err.to_string());
                Err(err)
            }
            other => other,
        }
    }
}

fn validate_edit(task: &Task) -> Result<()> {
    if task.title.trim().is_empty() {
        return Err(TrackerError::Validation(
            "task title must not be empty".to_string(),
        ));
    }
    if task.estimated_minutes == 0 {
        return Err(TrackerError::Validation(
            "estimated duration must be greater than zero".to_string(),
        ));
    }
    if task.in_progress && task.start.is_none() {
        return Err(TrackerError::Validation(
            "a running task needs a session start".to_string(),
        ));
    }
    Ok(())
}
