use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::error::{Result, TrackerError};
use crate::filter::{DateFilter, FilterState, PriorityFilter, StatusFilter};
use crate::state::{Snapshot, StateHub, UiEffect};
use crate::stats::{Overview, Statistics};
use crate::task::{NewTask, Task, TaskId};
use crate::tracker::Tracker;

/// A unit of work for the tracker thread. Mirrors the `Tracker` operations.
#[derive(Debug, Clone)]
pub enum Command {
    Create(NewTask),
    Update(Task),
    Delete(TaskId),
    Get(TaskId),
    StartTracking(TaskId),
    StopTracking(TaskId),
    ToggleTracking(TaskId),
    SetCompleted(TaskId, bool),
    ToggleCompletion(TaskId),
    ToggleImmediate(TaskId),
    SetImmediate(TaskId, bool),
    Reschedule(TaskId, DateTime<Utc>),
    SetFilter(FilterState),
    SetDateFilter(DateFilter),
    SetCustomDateFilter(NaiveDate),
    SetStatusFilter(StatusFilter),
    SetPriorityFilter(PriorityFilter),
    ClearFilters,
    Refresh,
    DrainEffects,
    Statistics,
    Overview,
}

#[derive(Debug, Clone)]
pub enum Reply {
    Task(Task),
    Deleted(TaskId),
    Snapshot(Arc<Snapshot>),
    Effects(Vec<UiEffect>),
    Statistics(Statistics),
    Overview(Box<Overview>),
}

type Job = (Command, Sender<Result<Reply>>);

/// Owns a [`Tracker`] on a dedicated thread. Commands run one at a time in
/// submission order, each followed by its refresh.
#[derive(Debug)]
pub struct TrackerWorker {
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    hub: Arc<StateHub>,
}

impl TrackerWorker {
    pub fn spawn(tracker: Tracker) -> Result<Self> {
        let hub = tracker.hub();
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name("daytrack-worker".to_string())
            .spawn(move || run_loop(tracker, receiver))?;

        info!("tracker worker started");
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            hub,
        })
    }

    /// Queues `command` and returns the channel its reply arrives on.
    pub fn submit(&self, command: Command) -> Result<Receiver<Result<Reply>>> {
        let sender = self.sender.as_ref().ok_or(TrackerError::WorkerStopped)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        sender
            .send((command, reply_tx))
            .map_err(|_| TrackerError::WorkerStopped)?;
        Ok(reply_rx)
    }

    /// Submits and blocks until the reply arrives.
    pub fn call(&self, command: Command) -> Result<Reply> {
        self.submit(command)?
            .recv()
            .map_err(|_| TrackerError::WorkerStopped)?
    }

    pub fn hub(&self) -> Arc<StateHub> {
        Arc::clone(&self.hub)
    }

    pub fn subscribe(&self) -> Receiver<Arc<Snapshot>> {
        self.hub.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.hub.current()
    }

    /// Closes the queue and waits for already queued commands to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("tracker worker panicked");
        }
    }
}

impl Drop for TrackerWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(mut tracker: Tracker, receiver: Receiver<Job>) {
    for (command, reply) in receiver {
        debug!(?command, "processing command");
        let outcome = execute(&mut tracker, command);
        if let Err(err) = &outcome {
            debug!(error = %err, "command failed");
        }
        // The caller may have dropped its receiver; the work is done either way.
        let _ = reply.send(outcome);
    }
    info!("tracker worker stopped");
}

fn execute(tracker: &mut Tracker, command: Command) -> Result<Reply> {
    let reply = match command {
        Command::Create(new) => Reply::Task(tracker.create(new)?),
        Command::Update(task) => Reply::Task(tracker.update(task)?),
        Command::Delete(id) => {
            tracker.delete(id)?;
            Reply::Deleted(id)
        }
        Command::Get(id) => Reply::Task(tracker.get(id)?),
        Command::StartTracking(id) => Reply::Task(tracker.start_tracking(id)?),
        Command::StopTracking(id) => Reply::Task(tracker.stop_tracking(id)?),
        Command::ToggleTracking(id) => Reply::Task(tracker.toggle_tracking(id)?),
        Command::SetCompleted(id, flag) => Reply::Task(tracker.set_completed(id, flag)?),
        Command::ToggleCompletion(id) => Reply::Task(tracker.toggle_completion(id)?),
        Command::ToggleImmediate(id) => Reply::Task(tracker.toggle_immediate(id)?),
        Command::SetImmediate(id, flag) => Reply::Task(tracker.set_immediate(id, flag)?),
        Command::Reschedule(id, due) => Reply::Task(tracker.reschedule(id, due)?),
        Command::SetFilter(filter) => Reply::Snapshot(tracker.set_filter(filter)?),
        Command::SetDateFilter(date) => Reply::Snapshot(tracker.set_date_filter(date)?),
        Command::SetCustomDateFilter(day) => {
            Reply::Snapshot(tracker.set_custom_date_filter(day)?)
        }
        Command::SetStatusFilter(status) => Reply::Snapshot(tracker.set_status_filter(status)?),
        Command::SetPriorityFilter(priority) => {
            Reply::Snapshot(tracker.set_priority_filter(priority)?)
        }
        Command::ClearFilters => Reply::Snapshot(tracker.clear_filters()?),
        Command::Refresh => Reply::Snapshot(tracker.refresh()?),
        Command::DrainEffects => Reply::Effects(tracker.drain_effects()),
        Command::Statistics => Reply::Statistics(tracker.statistics()?),
        Command::Overview => Reply::Overview(Box::new(tracker.overview()?)),
    };
    Ok(reply)
}
