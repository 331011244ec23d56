use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_due, format_minutes, format_minutes_compact};
use crate::state::{Snapshot, UiEffect};
use crate::stats::{Bucket, Overview, Statistics};
use crate::task::{Priority, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    tz: Tz,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.color_enabled(),
            tz: cfg.timezone(),
        }
    }

    #[tracing::instrument(skip(self, snapshot, now))]
    pub fn print_snapshot(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let heading = if snapshot.summary.is_empty() {
            "Today".to_string()
        } else {
            snapshot.summary.clone()
        };
        writeln!(
            out,
            "{}  ({} immediate, {} done today)",
            self.paint(&heading, "1"),
            snapshot.immediate_count,
            snapshot.completed_today
        )?;

        if snapshot.tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let rows = snapshot
            .tasks
            .iter()
            .map(|task| self.task_row(task, now))
            .collect();
        write_table(&mut out, task_headers(), rows)?;
        Ok(())
    }

    fn task_row(&self, task: &Task, now: DateTime<Utc>) -> Vec<String> {
        let due = format_due(task.due, self.tz);
        let due = if task.is_overdue(now) {
            self.paint(&due, "31")
        } else {
            due
        };

        let priority = match task.priority {
            Priority::High => self.paint(task.priority.label(), "31"),
            Priority::Medium => self.paint(task.priority.label(), "33"),
            Priority::Low => task.priority.label().to_string(),
        };

        let tracked = format_minutes_compact(task.total_tracked_minutes(now));
        let tracked = if task.is_over_estimate(now) {
            self.paint(&tracked, "31")
        } else {
            tracked
        };

        vec![
            self.paint(&task.id.to_string(), "33"),
            state_marker(task).to_string(),
            due,
            priority,
            task.title.clone(),
            format_minutes(task.estimated_minutes),
            tracked,
        ]
    }

    #[tracing::instrument(skip(self, task, now))]
    pub fn print_task_info(&mut self, task: &Task, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        if !task.description.is_empty() {
            writeln!(out, "description {}", task.description)?;
        }
        writeln!(out, "state       {}", state_label(task))?;
        writeln!(out, "priority    {}", task.priority)?;
        writeln!(out, "category    {}", task.category)?;
        writeln!(out, "color       {}", task.color_tag)?;
        writeln!(out, "created     {}", format_due(task.created, self.tz))?;
        writeln!(out, "due         {}", format_due(task.due, self.tz))?;
        writeln!(out, "estimate    {}", task.formatted_estimate())?;
        writeln!(out, "tracked     {}", task.formatted_actual())?;

        if let Some(start) = task.start {
            writeln!(
                out,
                "session     since {} ({} so far)",
                format_due(start, self.tz),
                format_minutes(task.current_session_minutes(now))
            )?;
        }
        if let Some(end) = task.end {
            writeln!(out, "last stop   {}", format_due(end, self.tz))?;
        }
        if !task.completed && task.in_progress {
            writeln!(out, "progress    {}%", task.progress_percent(now))?;
        }

        Ok(())
    }

    pub fn print_statistics(&mut self, stats: &Statistics) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "tasks       {}", stats.total)?;
        writeln!(out, "completed   {}", stats.completed)?;
        writeln!(out, "active      {}", stats.active)?;
        writeln!(out, "progress    {}%", stats.completion_percent)?;
        writeln!(out, "time spent  {}", stats.formatted_time_spent())?;

        let rows = Priority::ALL
            .iter()
            .rev()
            .map(|priority| {
                vec![
                    priority.label().to_string(),
                    format_minutes_compact(stats.minutes_by_priority.get(*priority)),
                ]
            })
            .collect();
        writeln!(out)?;
        write_table(&mut out, vec!["Priority".to_string(), "Time".to_string()], rows)?;
        Ok(())
    }

    pub fn print_overview(&mut self, overview: &Overview) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if overview.nothing_due() {
            writeln!(out, "Nothing overdue or due soon.")?;
        }
        for (title, code, bucket) in [
            ("Overdue", "31", &overview.overdue),
            ("Due today", "33", &overview.today),
            ("Due tomorrow", "36", &overview.tomorrow),
        ] {
            if bucket.is_empty() {
                continue;
            }
            writeln!(out, "{} ({})", self.paint(title, code), bucket.count)?;
            self.write_bucket(&mut out, bucket)?;
        }

        writeln!(out)?;
        writeln!(out, "Recent activity")?;
        if overview.recent_completed.is_empty() {
            writeln!(out, "  No recent activity")?;
        }
        for task in &overview.recent_completed {
            writeln!(out, "  ✓ {}", task.title)?;
        }

        writeln!(out)?;
        writeln!(
            out,
            "{} active, {} completed, {}% complete",
            overview.active, overview.completed, overview.completion_percent
        )?;
        Ok(())
    }

    fn write_bucket<W: Write>(&self, out: &mut W, bucket: &Bucket) -> anyhow::Result<()> {
        for task in &bucket.tasks {
            let time = task.due.with_timezone(&self.tz).format("%-I:%M %p");
            writeln!(out, "  • {} ({time})", task.title)?;
        }
        if bucket.hidden() > 0 {
            writeln!(out, "  ... and {} more", bucket.hidden())?;
        }
        Ok(())
    }

    /// Messages go to stdout; a completion summary prints the task's totals.
    pub fn print_effects(&mut self, effects: &[UiEffect]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for effect in effects {
            match effect {
                UiEffect::Message(text) => writeln!(out, "{text}")?,
                UiEffect::ShowCompletionSummary(task) => {
                    writeln!(
                        out,
                        "{} finished: {} tracked against {} estimated",
                        self.paint(&task.title, "32"),
                        task.formatted_actual(),
                        task.formatted_estimate()
                    )?;
                }
            }
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn task_headers() -> Vec<String> {
    ["ID", "", "Due", "Pri", "Title", "Est", "Tracked"]
        .iter()
        .map(|h| h.to_string())
        .collect()
}

fn state_marker(task: &Task) -> &'static str {
    if task.completed {
        "✓"
    } else if task.in_progress {
        "▶"
    } else if task.immediate {
        "!"
    } else {
        ""
    }
}

fn state_label(task: &Task) -> &'static str {
    if task.completed {
        "completed"
    } else if task.in_progress {
        "tracking"
    } else if task.immediate {
        "immediate"
    } else {
        "open"
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, &width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for &width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, &width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_by_display_width_ignoring_ansi() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["A".to_string(), "B".to_string()],
            vec![
                vec!["\x1b[31m1\x1b[0m".to_string(), "日本".to_string()],
                vec!["22".to_string(), "x".to_string()],
            ],
        )
        .expect("write table");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A  B    ");
        assert_eq!(lines[1], "-- ---- ");
        assert_eq!(lines[3], "22 x    ");
    }

    #[test]
    fn strip_ansi_removes_escape_sequences() {
        assert_eq!(strip_ansi("\x1b[1mbold\x1b[0m"), "bold");
    }
}
