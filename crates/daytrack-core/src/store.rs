use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter};
use tracing::{debug, info, warn};

use crate::datetime::DueRange;
use crate::error::{Result, TrackerError};
use crate::task::{NewTask, Priority, Task, TaskId};

pub const IMMEDIATE_LIMIT: u32 = 5;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    title             TEXT NOT NULL CHECK(length(title) > 0),
    description       TEXT NOT NULL DEFAULT '',
    created_at        INTEGER NOT NULL,
    due_at            INTEGER NOT NULL,
    scheduled_at      INTEGER NOT NULL,
    start_at          INTEGER,
    end_at            INTEGER,
    estimated_minutes INTEGER NOT NULL CHECK(estimated_minutes > 0),
    actual_minutes    INTEGER NOT NULL DEFAULT 0 CHECK(actual_minutes >= 0),
    is_completed      INTEGER NOT NULL DEFAULT 0,
    is_immediate      INTEGER NOT NULL DEFAULT 0,
    is_in_progress    INTEGER NOT NULL DEFAULT 0,
    priority          INTEGER NOT NULL DEFAULT 2 CHECK(priority IN (1, 2, 3)),
    category          TEXT NOT NULL DEFAULT 'General',
    color_tag         TEXT NOT NULL DEFAULT '#1E40AF'
);

CREATE INDEX IF NOT EXISTS tasks_due_at ON tasks (due_at);
CREATE INDEX IF NOT EXISTS tasks_open_immediate ON tasks (is_immediate, is_completed);
";

const COLUMNS: &str = "id, title, description, created_at, due_at, scheduled_at, start_at, end_at, \
     estimated_minutes, actual_minutes, is_completed, is_immediate, is_in_progress, priority, \
     category, color_tag";

/// One read of the task table. Every variant carries an optional exact-priority
/// filter, and each maps to a single SELECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskQuery {
    /// Incomplete first, then ascending due.
    All { priority: Option<Priority> },
    /// Due inside the range, immediate first, then ascending due.
    DueBetween {
        range: DueRange,
        priority: Option<Priority>,
    },
    /// Incomplete, immediate first, then ascending due.
    Active {
        range: Option<DueRange>,
        priority: Option<Priority>,
    },
    /// Completed, latest due first.
    Completed {
        range: Option<DueRange>,
        priority: Option<Priority>,
    },
    /// Incomplete and due before `now`, ascending due.
    Overdue {
        now: DateTime<Utc>,
        priority: Option<Priority>,
    },
}

impl TaskQuery {
    pub fn priority(&self) -> Option<Priority> {
        match self {
            Self::All { priority }
            | Self::DueBetween { priority, .. }
            | Self::Active { priority, .. }
            | Self::Completed { priority, .. }
            | Self::Overdue { priority, .. } => *priority,
        }
    }

    pub fn range(&self) -> Option<DueRange> {
        match self {
            Self::DueBetween { range, .. } => Some(*range),
            Self::Active { range, .. } | Self::Completed { range, .. } => *range,
            Self::All { .. } | Self::Overdue { .. } => None,
        }
    }

    fn to_sql(self) -> (String, Vec<Value>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        let order = match self {
            Self::All { .. } => "is_completed ASC, due_at ASC, id ASC",
            Self::DueBetween { .. } => "is_immediate DESC, due_at ASC, id ASC",
            Self::Active { .. } => {
                clauses.push("is_completed = 0");
                "is_immediate DESC, due_at ASC, id ASC"
            }
            Self::Completed { .. } => {
                clauses.push("is_completed = 1");
                "due_at DESC, id ASC"
            }
            Self::Overdue { now, .. } => {
                clauses.push("is_completed = 0");
                clauses.push("due_at < ?");
                args.push(Value::Integer(now.timestamp_millis()));
                "due_at ASC, id ASC"
            }
        };

        if let Some(range) = self.range() {
            clauses.push("due_at BETWEEN ? AND ?");
            args.push(Value::Integer(range.start.timestamp_millis()));
            args.push(Value::Integer(range.end.timestamp_millis()));
        }

        if let Some(priority) = self.priority() {
            clauses.push("priority = ?");
            args.push(Value::Integer(priority.value()));
        }

        let mut sql = format!("SELECT {COLUMNS} FROM tasks");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(order);
        (sql, args)
    }
}

#[derive(Debug)]
pub struct TaskStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl TaskStore {
    #[tracing::instrument(skip(path), fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        set_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "opened task store");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[tracing::instrument(skip(self, new), fields(title = %new.title))]
    pub fn insert(&self, new: NewTask, now: DateTime<Utc>) -> Result<Task> {
        let mut task = new.into_task(TaskId(0), now);
        self.conn.execute(
            "INSERT INTO tasks (title, description, created_at, due_at, scheduled_at, start_at, \
             end_at, estimated_minutes, actual_minutes, is_completed, is_immediate, \
             is_in_progress, priority, category, color_tag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                task.title,
                task.description,
                task.created.timestamp_millis(),
                task.due.timestamp_millis(),
                task.scheduled.timestamp_millis(),
                task.start.map(|dt| dt.timestamp_millis()),
                task.end.map(|dt| dt.timestamp_millis()),
                task.estimated_minutes,
                task.actual_minutes,
                task.completed,
                task.immediate,
                task.in_progress,
                task.priority.value(),
                task.category,
                task.color_tag,
            ],
        )?;
        task.id = TaskId(self.conn.last_insert_rowid());
        info!(id = %task.id, "inserted task");
        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    pub fn get(&self, id: TaskId) -> Result<Task> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
                [id.0],
                task_from_row,
            )
            .optional()?
            .ok_or(TrackerError::NotFound(id))
    }

    /// Replaces every column of the row with `task.id`.
    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn update(&self, task: &Task) -> Result<()> {
        write_row(&self.conn, task)?;
        debug!("updated task");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn delete(&self, id: TaskId) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", [id.0])?;
        if changed == 0 {
            return Err(TrackerError::NotFound(id));
        }
        info!("deleted task");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn query(&self, query: TaskQuery) -> Result<Vec<Task>> {
        let (sql, args) = query.to_sql();
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let tasks = stmt
            .query_map(params_from_iter(args), task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(count = tasks.len(), "query returned tasks");
        Ok(tasks)
    }

    pub fn all_tasks(&self) -> Result<Vec<Task>> {
        self.query(TaskQuery::All { priority: None })
    }

    pub fn tasks_due_between(&self, range: DueRange) -> Result<Vec<Task>> {
        self.query(TaskQuery::DueBetween {
            range,
            priority: None,
        })
    }

    pub fn tasks_due_on(&self, day: NaiveDate, tz: Tz) -> Result<Vec<Task>> {
        self.tasks_due_between(day_range(day, tz)?)
    }

    pub fn active_tasks(&self) -> Result<Vec<Task>> {
        self.query(TaskQuery::Active {
            range: None,
            priority: None,
        })
    }

    pub fn completed_tasks(&self) -> Result<Vec<Task>> {
        self.query(TaskQuery::Completed {
            range: None,
            priority: None,
        })
    }

    pub fn overdue_tasks(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        self.query(TaskQuery::Overdue {
            now,
            priority: None,
        })
    }

    pub fn count_open_immediate(&self) -> Result<u32> {
        count(
            &self.conn,
            "SELECT COUNT(*) FROM tasks WHERE is_immediate = 1 AND is_completed = 0",
            params![],
        )
    }

    pub fn count_completed(&self) -> Result<u32> {
        count(
            &self.conn,
            "SELECT COUNT(*) FROM tasks WHERE is_completed = 1",
            params![],
        )
    }

    pub fn count_completed_between(&self, range: DueRange) -> Result<u32> {
        count(
            &self.conn,
            "SELECT COUNT(*) FROM tasks WHERE is_completed = 1 AND due_at BETWEEN ?1 AND ?2",
            [range.start.timestamp_millis(), range.end.timestamp_millis()],
        )
    }

    /// Sets or clears the immediate flag. Granting a slot counts the open
    /// immediate tasks and writes inside one IMMEDIATE transaction, so two
    /// writers can never both take the last slot.
    #[tracing::instrument(skip(self))]
    pub fn set_immediate_checked(&mut self, id: TaskId, desired: bool, limit: u32) -> Result<Task> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut task = tx
            .query_row(
                &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
                [id.0],
                task_from_row,
            )
            .optional()?
            .ok_or(TrackerError::NotFound(id))?;

        if task.immediate == desired {
            tx.commit()?;
            return Ok(task);
        }

        if desired {
            if task.completed {
                return Err(TrackerError::Validation(
                    "completed tasks cannot be marked immediate".to_string(),
                ));
            }
            let open = count(
                &tx,
                "SELECT COUNT(*) FROM tasks WHERE is_immediate = 1 AND is_completed = 0",
                params![],
            )?;
            if open >= limit {
                warn!(open, limit, "immediate slots full");
                return Err(TrackerError::ImmediateSlotsFull { limit });
            }
        }

        tx.execute(
            "UPDATE tasks SET is_immediate = ?1 WHERE id = ?2",
            params![desired, id.0],
        )?;
        tx.commit()?;

        task.set_immediate(desired);
        info!(immediate = desired, "changed immediate flag");
        Ok(task)
    }

    /// Writes an edited row, claiming an immediate slot first when the edit
    /// turns an open task immediate. The slot is judged by the edited row, so
    /// reopening and pinning in one edit counts as a new claim.
    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn update_checked(&mut self, task: &Task, limit: u32) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(
                &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
                [task.id.0],
                task_from_row,
            )
            .optional()?
            .ok_or(TrackerError::NotFound(task.id))?;

        if task.immediate {
            if task.completed {
                return Err(TrackerError::Validation(
                    "completed tasks cannot be marked immediate".to_string(),
                ));
            }
            let holds_slot = existing.immediate && !existing.completed;
            if !holds_slot {
                let open = count(
                    &tx,
                    "SELECT COUNT(*) FROM tasks WHERE is_immediate = 1 AND is_completed = 0",
                    params![],
                )?;
                if open >= limit {
                    warn!(open, limit, "immediate slots full");
                    return Err(TrackerError::ImmediateSlotsFull { limit });
                }
            }
        }

        write_row(&tx, task)?;
        tx.commit()?;
        debug!("updated task");
        Ok(())
    }
}

fn write_row(conn: &Connection, task: &Task) -> Result<()> {
    let changed = conn.execute(
        "UPDATE tasks SET title = ?1, description = ?2, created_at = ?3, due_at = ?4,
             scheduled_at = ?5, start_at = ?6, end_at = ?7, estimated_minutes = ?8,
             actual_minutes = ?9, is_completed = ?10, is_immediate = ?11,
             is_in_progress = ?12, priority = ?13, category = ?14, color_tag = ?15
         WHERE id = ?16",
        params![
            task.title,
            task.description,
            task.created.timestamp_millis(),
            task.due.timestamp_millis(),
            task.scheduled.timestamp_millis(),
            task.start.map(|dt| dt.timestamp_millis()),
            task.end.map(|dt| dt.timestamp_millis()),
            task.estimated_minutes,
            task.actual_minutes,
            task.completed,
            task.immediate,
            task.in_progress,
            task.priority.value(),
            task.category,
            task.color_tag,
            task.id.0,
        ],
    )?;
    if changed == 0 {
        return Err(TrackerError::NotFound(task.id));
    }
    Ok(())
}

fn set_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn day_range(day: NaiveDate, tz: Tz) -> Result<DueRange> {
    DueRange::local_day(day, tz).map_err(|err| TrackerError::Validation(format!("{err:#}")))
}

fn count<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<u32> {
    Ok(conn.query_row(sql, params, |row| row.get::<_, u32>(0))?)
}

fn millis_to_utc(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

fn opt_millis_to_utc(idx: usize, millis: Option<i64>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    millis.map(|ms| millis_to_utc(idx, ms)).transpose()
}

/// Maps a row selected with [`COLUMNS`] in that order.
fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    let priority_raw: i64 = row.get(13)?;
    let priority = Priority::from_value(priority_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            13,
            Type::Integer,
            format!("invalid priority: {priority_raw}").into(),
        )
    })?;

    Ok(Task {
        id: TaskId(row.get(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        created: millis_to_utc(3, row.get(3)?)?,
        due: millis_to_utc(4, row.get(4)?)?,
        scheduled: millis_to_utc(5, row.get(5)?)?,
        start: opt_millis_to_utc(6, row.get(6)?)?,
        end: opt_millis_to_utc(7, row.get(7)?)?,
        estimated_minutes: row.get(8)?,
        actual_minutes: row.get(9)?,
        completed: row.get(10)?,
        immediate: row.get(11)?,
        in_progress: row.get(12)?,
        priority,
        category: row.get(14)?,
        color_tag: row.get(15)?,
    })
}
