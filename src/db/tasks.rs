use super::tags::DEFAULT_TAG_ID;
use super::{Database, StoreError, StoreResult, Table, is_unique_violation, queries};
use crate::timefmt::{format_date, format_storage};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub id: i64,
    pub name: String,
    pub total_time: i64,
    pub description: Option<String>,
    pub creation_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDetails {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub creation_date: String,
    pub spent_total: i64,
    pub spent_today: i64,
}

/// Returned when a timer started on one day is stopped on a later one: the
/// seconds past midnight now live in a new activity row for `current_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rollover {
    pub carried_over: i64,
    pub current_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub name: String,
    pub description: String,
    pub date: String,
    pub spent_time: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanCounts {
    pub activity: i64,
    pub tags: i64,
    pub timestamps: i64,
}

impl OrphanCounts {
    pub fn total(&self) -> i64 {
        self.activity + self.tags + self.timestamps
    }
}

impl Database {
    /// Creates a task with an empty activity row for today and the default tag.
    pub fn insert_task(&self, name: &str, now: NaiveDateTime) -> StoreResult<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }

        let task_id = self
            .insert(
                Table::Tasks,
                &["name", "creation_date"],
                &[&name, &format_storage(now)],
            )
            .map_err(|error| match error {
                StoreError::Sqlite(inner) if is_unique_violation(&inner) => {
                    StoreError::TaskNameExists(name.to_string())
                }
                other => other,
            })?;

        self.insert_task_activity(task_id, 0, now.date())?;
        self.insert(Table::TasksTags, &["task_id", "tag_id"], &[&task_id, &DEFAULT_TAG_ID])?;
        info!(task_id, name, "task created");

        Ok(task_id)
    }

    pub fn select_task(&self, task_id: i64, today: NaiveDate) -> StoreResult<TaskDetails> {
        let (name, description, creation_date) = self
            .conn
            .query_row(
                "SELECT name, description, creation_date FROM tasks WHERE id = ?1",
                params![task_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or(StoreError::TaskNotFound(task_id))?;

        let spent_total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(spent_time), 0) FROM activity WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;
        let spent_today: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(spent_time), 0) FROM activity WHERE task_id = ?1 AND date = ?2",
            params![task_id, format_date(today)],
            |row| row.get(0),
        )?;

        Ok(TaskDetails {
            id: task_id,
            name,
            description,
            creation_date: creation_date.unwrap_or_default(),
            spent_total,
            spent_today,
        })
    }

    /// Looks a task up by exact name first, then by numeric id.
    pub fn resolve_task(&self, reference: &str) -> StoreResult<Option<i64>> {
        let by_name = self
            .conn
            .query_row(
                "SELECT id FROM tasks WHERE name = ?1",
                params![reference.trim()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        if by_name.is_some() {
            return Ok(by_name);
        }

        let Ok(id) = reference.trim().parse::<i64>() else {
            return Ok(None);
        };
        let missing = self
            .find_by_clause(Table::Tasks, "id", &id, &["id"], None)?
            .is_empty();

        Ok((!missing).then_some(id))
    }

    pub fn rename_task(&self, task_id: i64, name: &str) -> StoreResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }

        let updated = self
            .update(Table::Tasks, "name", &name, "id", &task_id)
            .map_err(|error| match error {
                StoreError::Sqlite(inner) if is_unique_violation(&inner) => {
                    StoreError::TaskNameExists(name.to_string())
                }
                other => other,
            })?;

        if updated == 0 {
            return Err(StoreError::TaskNotFound(task_id));
        }
        Ok(())
    }

    pub fn set_description(&self, task_id: i64, description: Option<&str>) -> StoreResult<()> {
        let description = description.map(str::trim).filter(|text| !text.is_empty());
        let updated = self.update(Table::Tasks, "description", &description, "id", &task_id)?;

        if updated == 0 {
            return Err(StoreError::TaskNotFound(task_id));
        }
        Ok(())
    }

    pub fn all_tasks(&self) -> StoreResult<Vec<TaskRow>> {
        self.task_rows(queries::UNFILTERED_TASKS, Vec::new())
    }

    pub(super) fn task_rows(&self, sql: &str, values: Vec<Value>) -> StoreResult<Vec<TaskRow>> {
        let mut statement = self.conn.prepare(sql)?;
        let rows = statement
            .query_map(params_from_iter(values.iter()), |row| {
                Ok(TaskRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    total_time: row.get(2)?,
                    description: row.get(3)?,
                    creation_date: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Returns the rowid of the task's activity row for `date`, if any.
    pub fn activity_row(&self, task_id: i64, date: NaiveDate) -> StoreResult<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT rowid FROM activity WHERE task_id = ?1 AND date = ?2 LIMIT 1",
                params![task_id, format_date(date)],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn insert_task_activity(
        &self,
        task_id: i64,
        spent_time: i64,
        date: NaiveDate,
    ) -> StoreResult<i64> {
        self.insert(
            Table::Activity,
            &["date", "task_id", "spent_time"],
            &[&format_date(date), &task_id, &spent_time],
        )
    }

    /// Stores `value`, the running total for `prev_date`, the day the timer
    /// started. When the clock has passed midnight since then, the seconds
    /// elapsed today move to a row for today and the rest stays on `prev_date`.
    pub fn record_spent_time(
        &self,
        task_id: i64,
        value: i64,
        prev_date: NaiveDate,
        now: NaiveDateTime,
    ) -> StoreResult<Option<Rollover>> {
        let current_date = now.date();
        let prev_row = self.activity_row(task_id, prev_date)?;

        if current_date == prev_date {
            self.store_activity(task_id, prev_row, value, prev_date)?;
            return Ok(None);
        }

        let today_secs = i64::from(now.time().num_seconds_from_midnight()).min(value.max(0));
        self.store_activity(task_id, prev_row, value - today_secs, prev_date)?;

        match self.activity_row(task_id, current_date)? {
            Some(rowid) => {
                self.conn.execute(
                    "UPDATE activity SET spent_time = spent_time + ?1 WHERE rowid = ?2",
                    params![today_secs, rowid],
                )?;
            }
            None => {
                self.insert_task_activity(task_id, today_secs, current_date)?;
            }
        }
        info!(task_id, carried_over = today_secs, "timer crossed midnight");

        Ok(Some(Rollover {
            carried_over: today_secs,
            current_date,
        }))
    }

    fn store_activity(
        &self,
        task_id: i64,
        rowid: Option<i64>,
        value: i64,
        date: NaiveDate,
    ) -> StoreResult<()> {
        match rowid {
            Some(rowid) => {
                self.update(Table::Activity, "spent_time", &value, "rowid", &rowid)?;
            }
            None => {
                self.insert_task_activity(task_id, value, date)?;
            }
        }
        Ok(())
    }

    /// Removes the tasks and every row referring to them. The statements run
    /// independently, so an interrupted call can leave orphans behind.
    pub fn delete_tasks(&self, ids: &[i64]) -> StoreResult<()> {
        let ids = ids.iter().copied().map(Value::Integer).collect::<Vec<_>>();

        self.delete(Table::Tasks, &[("id", ids.as_slice())])?;
        self.delete(Table::Activity, &[("task_id", ids.as_slice())])?;
        self.delete(Table::Timestamps, &[("task_id", ids.as_slice())])?;
        self.delete(Table::TasksTags, &[("task_id", ids.as_slice())])?;
        info!(count = ids.len(), "tasks deleted");

        Ok(())
    }

    /// Dates and spent seconds recorded for one task, oldest first.
    pub fn task_activity(&self, task_id: i64) -> StoreResult<Vec<(String, i64)>> {
        let mut statement = self.conn.prepare(
            "SELECT date, spent_time FROM activity WHERE task_id = ?1 ORDER BY date",
        )?;
        let rows = statement
            .query_map(params![task_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Every date with recorded activity, newest first, without duplicates.
    pub fn activity_dates(&self) -> StoreResult<Vec<String>> {
        let mut statement = self
            .conn
            .prepare("SELECT DISTINCT date FROM activity ORDER BY date DESC")?;
        let rows = statement
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn export_rows(&self, ids: &[i64]) -> StoreResult<Vec<ExportRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{}{}{}",
            queries::EXPORT_ROWS_PREFIX,
            queries::placeholders(ids.len()),
            queries::EXPORT_ROWS_SUFFIX
        );
        let mut statement = self.conn.prepare(&sql)?;
        let rows = statement
            .query_map(params_from_iter(ids.iter()), |row| {
                Ok(ExportRow {
                    name: row.get(0)?,
                    description: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    date: row.get(2)?,
                    spent_time: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn orphan_counts(&self) -> StoreResult<OrphanCounts> {
        Ok(self.conn.query_row(queries::ORPHAN_COUNTS, [], |row| {
            Ok(OrphanCounts {
                activity: row.get(0)?,
                tags: row.get(1)?,
                timestamps: row.get(2)?,
            })
        })?)
    }

    pub fn prune_orphans(&self) -> StoreResult<usize> {
        queries::PRUNE_ORPHANS
            .iter()
            .try_fold(0, |removed, statement| -> StoreResult<usize> {
                Ok(removed + self.conn.execute(statement, [])?)
            })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, StoreError, Table};
    use chrono::{NaiveDate, NaiveDateTime};
    use rusqlite::types::Value;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S")
            .expect("datetime")
    }

    fn day(date: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn duplicate_task_name_fails() {
        let database = Database::open_in_memory().expect("database");
        let now = at("2026-01-05", "09:00:00");

        database.insert_task("write report", now).expect("first insert");
        let error = database
            .insert_task("write report", now)
            .expect_err("duplicate");

        assert!(matches!(error, StoreError::TaskNameExists(name) if name == "write report"));
        assert_eq!(database.all_tasks().expect("tasks").len(), 1);
    }

    #[test]
    fn new_task_gets_default_tag_and_today_row() {
        let database = Database::open_in_memory().expect("database");
        let now = at("2026-01-05", "09:00:00");

        let task_id = database.insert_task("  review  ", now).expect("insert");
        let details = database.select_task(task_id, now.date()).expect("details");

        assert_eq!(details.name, "review");
        assert_eq!(details.spent_total, 0);
        assert_eq!(
            database.task_activity(task_id).expect("activity"),
            vec![("2026-01-05".to_string(), 0)]
        );
        let tags = database
            .find_by_clause(Table::TasksTags, "task_id", &task_id, &["tag_id"], None)
            .expect("tags");
        assert_eq!(tags, vec![vec![Value::Integer(1)]]);
    }

    #[test]
    fn empty_names_are_rejected() {
        let database = Database::open_in_memory().expect("database");

        let error = database
            .insert_task("   ", at("2026-01-05", "09:00:00"))
            .expect_err("empty name");
        assert!(matches!(error, StoreError::EmptyName));
    }

    #[test]
    fn delete_cascades_to_dependent_rows() {
        let database = Database::open_in_memory().expect("database");
        let now = at("2026-01-05", "09:00:00");
        let doomed = database.insert_task("doomed", now).expect("insert");
        let kept = database.insert_task("kept", now).expect("insert");
        let tag = database.insert_tag("urgent").expect("tag");
        database.assign_tag(doomed, tag).expect("assign");
        database
            .insert_timestamp(doomed, 30, crate::db::EventType::Custom, None, now)
            .expect("timestamp");

        database.delete_tasks(&[doomed]).expect("delete");

        for table in [Table::Activity, Table::TasksTags, Table::Timestamps] {
            let rows = database
                .find_by_clause(table, "task_id", &doomed, &[], None)
                .expect("rows");
            assert!(rows.is_empty(), "{} still has rows", table.name());
        }
        assert!(matches!(
            database.select_task(doomed, now.date()),
            Err(StoreError::TaskNotFound(_))
        ));
        assert!(database.select_task(kept, now.date()).is_ok());
        assert_eq!(database.orphan_counts().expect("orphans").total(), 0);
    }

    #[test]
    fn records_time_on_the_same_day() {
        let database = Database::open_in_memory().expect("database");
        let start = at("2026-01-05", "09:00:00");
        let task_id = database.insert_task("coding", start).expect("insert");

        let rollover = database
            .record_spent_time(task_id, 1_800, day("2026-01-05"), at("2026-01-05", "09:30:00"))
            .expect("record");

        assert_eq!(rollover, None);
        assert_eq!(
            database.task_activity(task_id).expect("activity"),
            vec![("2026-01-05".to_string(), 1_800)]
        );
    }

    #[test]
    fn splits_time_across_midnight() {
        let database = Database::open_in_memory().expect("database");
        let task_id = database
            .insert_task("night shift", at("2026-01-05", "23:00:00"))
            .expect("insert");

        let rollover = database
            .record_spent_time(task_id, 5_400, day("2026-01-05"), at("2026-01-06", "00:30:00"))
            .expect("record")
            .expect("rollover");

        assert_eq!(rollover.carried_over, 1_800);
        assert_eq!(rollover.current_date, day("2026-01-06"));
        assert_eq!(
            database.task_activity(task_id).expect("activity"),
            vec![
                ("2026-01-05".to_string(), 3_600),
                ("2026-01-06".to_string(), 1_800)
            ]
        );
        assert_eq!(
            database.activity_dates().expect("dates"),
            vec!["2026-01-06".to_string(), "2026-01-05".to_string()]
        );
    }

    #[test]
    fn rename_and_describe() {
        let database = Database::open_in_memory().expect("database");
        let now = at("2026-01-05", "09:00:00");
        let first = database.insert_task("first", now).expect("insert");
        database.insert_task("second", now).expect("insert");

        assert!(matches!(
            database.rename_task(first, "second"),
            Err(StoreError::TaskNameExists(_))
        ));
        database.rename_task(first, "renamed").expect("rename");
        database
            .set_description(first, Some("draft notes"))
            .expect("describe");

        let details = database.select_task(first, now.date()).expect("details");
        assert_eq!(details.name, "renamed");
        assert_eq!(details.description.as_deref(), Some("draft notes"));
        assert!(matches!(
            database.rename_task(999, "ghost"),
            Err(StoreError::TaskNotFound(999))
        ));
    }

    #[test]
    fn resolves_tasks_by_name_then_id() {
        let database = Database::open_in_memory().expect("database");
        let now = at("2026-01-05", "09:00:00");
        let first = database.insert_task("alpha", now).expect("insert");
        let numeric = database.insert_task("1999", now).expect("insert");

        assert_eq!(database.resolve_task("alpha").expect("resolve"), Some(first));
        assert_eq!(
            database.resolve_task(&first.to_string()).expect("resolve"),
            Some(first)
        );
        assert_eq!(database.resolve_task("1999").expect("resolve"), Some(numeric));
        assert_eq!(database.resolve_task("missing").expect("resolve"), None);
        assert_eq!(database.resolve_task("404").expect("resolve"), None);
    }

    #[test]
    fn prunes_rows_left_by_interrupted_deletes() {
        let database = Database::open_in_memory().expect("database");
        let task_id = database
            .insert_task("half deleted", at("2026-01-05", "09:00:00"))
            .expect("insert");
        let ids = [Value::Integer(task_id)];
        database
            .delete(Table::Tasks, &[("id", &ids[..])])
            .expect("delete task only");

        let orphans = database.orphan_counts().expect("orphans");
        assert_eq!(orphans.activity, 1);
        assert_eq!(orphans.tags, 1);
        assert_eq!(database.prune_orphans().expect("prune"), 2);
        assert_eq!(database.orphan_counts().expect("orphans").total(), 0);
    }
}
