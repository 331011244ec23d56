use serde::Serialize;

use crate::datetime::format_minutes_compact;
use crate::task::{Priority, Task};

/// Entries shown per overview bucket and in recent activity.
pub const OVERVIEW_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PriorityMinutes {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl PriorityMinutes {
    fn add(&mut self, priority: Priority, minutes: u32) {
        let slot = match priority {
            Priority::Low => &mut self.low,
            Priority::Medium => &mut self.medium,
            Priority::High => &mut self.high,
        };
        *slot = slot.saturating_add(minutes);
    }

    pub fn get(&self, priority: Priority) -> u32 {
        match priority {
            Priority::Low => self.low,
            Priority::Medium => self.medium,
            Priority::High => self.high,
        }
    }
}

/// Dashboard totals over every stored task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Statistics {
    pub total: u32,
    pub completed: u32,
    pub active: u32,
    pub completion_percent: u32,
    pub minutes_spent: u32,
    pub minutes_by_priority: PriorityMinutes,
}

impl Statistics {
    /// Tracked minutes count when present; an untracked completed task
    /// counts its estimate.
    pub fn compute(tasks: &[Task]) -> Self {
        let mut stats = Self::default();
        for task in tasks {
            stats.total += 1;
            if task.completed {
                stats.completed += 1;
            } else {
                stats.active += 1;
            }

            let minutes = if task.actual_minutes > 0 {
                task.actual_minutes
            } else if task.completed {
                task.estimated_minutes
            } else {
                0
            };
            if minutes > 0 {
                stats.minutes_spent = stats.minutes_spent.saturating_add(minutes);
                stats.minutes_by_priority.add(task.priority, minutes);
            }
        }
        stats.completion_percent = percent(stats.completed, stats.total);
        stats
    }

    pub fn formatted_time_spent(&self) -> String {
        format_minutes_compact(self.minutes_spent)
    }
}

/// A capped list of tasks plus the full count it was cut from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Bucket {
    pub count: usize,
    pub tasks: Vec<Task>,
}

impl Bucket {
    pub fn capped(mut tasks: Vec<Task>) -> Self {
        let count = tasks.len();
        tasks.truncate(OVERVIEW_LIMIT);
        Self { count, tasks }
    }

    pub fn hidden(&self) -> usize {
        self.count.saturating_sub(self.tasks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// What needs attention: overdue, due today, due tomorrow, and recent completions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Overview {
    pub overdue: Bucket,
    pub today: Bucket,
    pub tomorrow: Bucket,
    pub active: u32,
    pub completed: u32,
    pub completion_percent: u32,
    pub recent_completed: Vec<Task>,
}

impl Overview {
    pub fn build(
        overdue: Vec<Task>,
        today: Vec<Task>,
        tomorrow: Vec<Task>,
        all: &[Task],
        mut recent_completed: Vec<Task>,
    ) -> Self {
        let completed = all.iter().filter(|task| task.completed).count();
        let completed = u32::try_from(completed).unwrap_or(u32::MAX);
        let total = u32::try_from(all.len()).unwrap_or(u32::MAX);
        recent_completed.truncate(OVERVIEW_LIMIT);

        Self {
            overdue: Bucket::capped(overdue),
            today: Bucket::capped(today),
            tomorrow: Bucket::capped(tomorrow),
            active: total - completed,
            completed,
            completion_percent: percent(completed, total),
            recent_completed,
        }
    }

    pub fn nothing_due(&self) -> bool {
        self.overdue.is_empty() && self.today.is_empty() && self.tomorrow.is_empty()
    }
}

fn percent(part: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    u32::try_from(u64::from(part) * 100 / u64::from(total)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::task::{NewTask, TaskId};

    fn task(id: i64, priority: Priority, estimate: u32, actual: u32, completed: bool) -> Task {
        let now = Utc
            .with_ymd_and_hms(2026, 10, 18, 9, 0, 0)
            .single()
            .expect("valid time");
        let mut task = NewTask::new(format!("t{id}"), "", now, estimate)
            .with_priority(priority)
            .into_task(TaskId(id), now);
        task.actual_minutes = actual;
        task.completed = completed;
        task
    }

    #[test]
    fn empty_store_has_zero_percent() {
        let stats = Statistics::compute(&[]);
        assert_eq!(stats.completion_percent, 0);
        assert_eq!(stats.formatted_time_spent(), "0m");
    }

    #[test]
    fn minutes_prefer_tracked_then_estimate_for_completed() {
        let tasks = vec![
            task(1, Priority::High, 60, 45, false),
            task(2, Priority::Low, 30, 0, true),
            task(3, Priority::Medium, 90, 0, false),
            task(4, Priority::High, 20, 80, true),
        ];
        let stats = Statistics::compute(&tasks);

        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.completion_percent, 50);
        assert_eq!(stats.minutes_spent, 155);
        assert_eq!(stats.minutes_by_priority.get(Priority::High), 125);
        assert_eq!(stats.minutes_by_priority.get(Priority::Low), 30);
        assert_eq!(stats.minutes_by_priority.get(Priority::Medium), 0);
        assert_eq!(stats.formatted_time_spent(), "2h 35m");
    }

    #[test]
    fn completion_percent_floors() {
        let tasks = vec![
            task(1, Priority::Low, 30, 0, true),
            task(2, Priority::Low, 30, 0, false),
            task(3, Priority::Low, 30, 0, false),
        ];
        assert_eq!(Statistics::compute(&tasks).completion_percent, 33);
    }

    #[test]
    fn overview_buckets_cap_at_five_but_keep_counts() {
        let overdue: Vec<Task> = (1..=7).map(|i| task(i, Priority::Low, 30, 0, false)).collect();
        let all = overdue.clone();
        let overview = Overview::build(overdue, Vec::new(), Vec::new(), &all, Vec::new());

        assert_eq!(overview.overdue.count, 7);
        assert_eq!(overview.overdue.tasks.len(), 5);
        assert_eq!(overview.overdue.hidden(), 2);
        assert!(overview.today.is_empty());
        assert!(!overview.nothing_due());
        assert_eq!(overview.active, 7);
        assert_eq!(overview.completion_percent, 0);
    }
}
