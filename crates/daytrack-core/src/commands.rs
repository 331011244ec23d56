use anyhow::Context;
use tracing::{debug, info, instrument};

use crate::cli::{AddArgs, CliCommand, EditArgs, ListArgs};
use crate::config::Config;
use crate::datetime::parse_due_expr;
use crate::filter::{DateFilter, FilterState, PriorityFilter, StatusFilter};
use crate::render::Renderer;
use crate::task::{NewTask, Priority, TaskId};
use crate::tracker::Tracker;

/// Runs one CLI command. Pending messages are printed only when the command
/// succeeds; a failure carries its own message.
#[instrument(skip(tracker, cfg, renderer))]
pub fn dispatch(
    tracker: &mut Tracker,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Option<CliCommand>,
) -> anyhow::Result<()> {
    let command = command.unwrap_or_else(|| CliCommand::List(ListArgs::default()));
    debug!(?command, "dispatching command");

    let outcome = run_command(tracker, cfg, renderer, command);
    let effects = tracker.drain_effects();
    outcome?;
    renderer.print_effects(&effects)
}

fn run_command(
    tracker: &mut Tracker,
    cfg: &Config,
    renderer: &mut Renderer,
    command: CliCommand,
) -> anyhow::Result<()> {
    match command {
        CliCommand::Add(args) => cmd_add(tracker, cfg, args),
        CliCommand::List(args) => cmd_list(tracker, renderer, args),
        CliCommand::Info { id } => {
            let task = tracker.get(TaskId(id))?;
            renderer.print_task_info(&task, tracker.now())
        }
        CliCommand::Start { id } => {
            let task = tracker.start_tracking(TaskId(id))?;
            if !task.in_progress {
                println!("Task {id} cannot be tracked: it is completed.");
            }
            Ok(())
        }
        CliCommand::Stop { id } => {
            let before = tracker.get(TaskId(id))?;
            tracker.stop_tracking(TaskId(id))?;
            if !before.in_progress {
                println!("Task {id} is not being tracked.");
            }
            Ok(())
        }
        CliCommand::Done { id } => {
            let task = tracker.set_completed(TaskId(id), true)?;
            println!("Completed task {} '{}'.", task.id, task.title);
            Ok(())
        }
        CliCommand::Reopen { id } => {
            let task = tracker.set_completed(TaskId(id), false)?;
            println!("Reopened task {} '{}'.", task.id, task.title);
            Ok(())
        }
        CliCommand::Immediate { id, off } => {
            let task = if off {
                tracker.set_immediate(TaskId(id), false)?
            } else {
                tracker.toggle_immediate(TaskId(id))?
            };
            let state = if task.immediate { "now immediate" } else { "no longer immediate" };
            println!("Task {} is {state}.", task.id);
            Ok(())
        }
        CliCommand::Reschedule { id, due } => {
            let due = parse_due_expr(&due, tracker.now(), tracker.clock().timezone())?;
            tracker.reschedule(TaskId(id), due)?;
            Ok(())
        }
        CliCommand::Edit(args) => cmd_edit(tracker, args),
        CliCommand::Delete { id } => {
            tracker.delete(TaskId(id))?;
            Ok(())
        }
        CliCommand::Stats { json } => {
            let stats = tracker.statistics()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                Ok(())
            } else {
                renderer.print_statistics(&stats)
            }
        }
        CliCommand::Overview { json } => {
            let overview = tracker.overview()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&overview)?);
                Ok(())
            } else {
                renderer.print_overview(&overview)
            }
        }
    }
}

#[instrument(skip(tracker, cfg, args), fields(title = %args.title))]
fn cmd_add(tracker: &mut Tracker, cfg: &Config, args: AddArgs) -> anyhow::Result<()> {
    info!("command add");

    let now = tracker.now();
    let due = parse_due_expr(&args.due, now, tracker.clock().timezone())
        .with_context(|| format!("invalid --due value: {}", args.due))?;
    let estimate = match args.estimate {
        Some(minutes) => minutes,
        None => cfg.default_estimate()?,
    };
    let priority = match args.priority.as_deref() {
        Some(raw) => raw.parse::<Priority>()?,
        None => cfg.default_priority()?,
    };

    let mut new = NewTask::new(args.title, args.description.unwrap_or_default(), due, estimate)
        .with_priority(priority);
    if let Some(category) = args.category {
        new.category = category;
    }
    if let Some(color) = args.color {
        new.color_tag = color;
    }

    let task = tracker.create(new)?;
    println!("Created task {}.", task.id);
    Ok(())
}

fn filter_from_args(args: &ListArgs) -> anyhow::Result<FilterState> {
    let mut filter = FilterState::default();
    if let Some(raw) = args.date.as_deref() {
        filter.date = raw.parse::<DateFilter>()?;
    }
    if let Some(raw) = args.status.as_deref() {
        filter.status = raw.parse::<StatusFilter>()?;
    }
    if let Some(raw) = args.priority.as_deref() {
        filter.priority = raw.parse::<PriorityFilter>()?;
    }
    Ok(filter)
}

#[instrument(skip(tracker, renderer, args))]
fn cmd_list(tracker: &mut Tracker, renderer: &mut Renderer, args: ListArgs) -> anyhow::Result<()> {
    info!("command list");

    let filter = filter_from_args(&args)?;
    let snapshot = tracker.set_filter(filter)?;
    if args.json {
        println!("{}", serde_json::to_string(&snapshot.tasks)?);
        return Ok(());
    }
    renderer.print_snapshot(&snapshot, tracker.now())
}

#[instrument(skip(tracker, args), fields(id = args.id))]
fn cmd_edit(tracker: &mut Tracker, args: EditArgs) -> anyhow::Result<()> {
    info!("command edit");

    let mut task = tracker.get(TaskId(args.id))?;
    if let Some(title) = args.title {
        task.title = title;
    }
    if let Some(description) = args.description {
        task.description = description;
    }
    if let Some(raw) = args.due {
        let due = parse_due_expr(&raw, tracker.now(), tracker.clock().timezone())
            .with_context(|| format!("invalid --due value: {raw}"))?;
        task.reschedule(due);
    }
    if let Some(minutes) = args.estimate {
        task.estimated_minutes = minutes;
    }
    if let Some(minutes) = args.actual {
        task.actual_minutes = minutes;
    }
    if let Some(raw) = args.priority {
        task.priority = raw.parse::<Priority>()?;
    }
    if let Some(category) = args.category {
        task.category = category;
    }
    if let Some(color) = args.color {
        task.color_tag = color;
    }

    tracker.update(task)?;
    Ok(())
}
