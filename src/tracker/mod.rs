use crate::db::{Database, EventType, Rollover};
use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

pub const OPEN_TASKS_OPTION: &str = "tasks";
pub const RUNNING_TIMERS_OPTION: &str = "running_timers";
pub const TIMERS_COUNT_OPTION: &str = "timers_count";
pub const PRESERVE_TASKS_OPTION: &str = "preserve_tasks";
const DEFAULT_TIMERS_COUNT: usize = 3;

/// A timer that keeps running between invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningTimer {
    pub started_at: NaiveDateTime,
    /// Day the session started on; its activity row receives the time.
    pub date: NaiveDate,
    /// Seconds already recorded for `date` when the session started.
    pub recorded: i64,
    /// Task total across all days when the session started.
    pub base_total: i64,
}

impl RunningTimer {
    pub fn session_seconds(&self, now: NaiveDateTime) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopSummary {
    pub task_id: i64,
    pub session_seconds: i64,
    pub total_seconds: i64,
    pub rollover: Option<Rollover>,
}

/// The tasks currently open in the tracker and their running timers,
/// persisted in the options table.
pub struct Tracker<'a> {
    database: &'a Database,
    open: Vec<i64>,
    running: BTreeMap<i64, RunningTimer>,
    capacity: usize,
}

impl<'a> Tracker<'a> {
    pub fn load(database: &'a Database) -> Result<Self> {
        let capacity = database
            .option(TIMERS_COUNT_OPTION)?
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|count| *count > 0)
            .unwrap_or(DEFAULT_TIMERS_COUNT);
        let running: BTreeMap<i64, RunningTimer> = match database.option(RUNNING_TIMERS_OPTION)? {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
                .context("Failed to parse running timers")?,
            _ => BTreeMap::new(),
        };

        let stored = database
            .option(OPEN_TASKS_OPTION)?
            .unwrap_or_default()
            .split(',')
            .filter_map(|part| part.trim().parse::<i64>().ok())
            .collect::<Vec<_>>();

        let mut open = Vec::new();
        for task_id in stored.into_iter().chain(running.keys().copied()) {
            if !open.contains(&task_id) {
                open.push(task_id);
            }
        }

        Ok(Self {
            database,
            open,
            running,
            capacity,
        })
    }

    pub fn open_tasks(&self) -> &[i64] {
        &self.open
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_running(&self, task_id: i64) -> bool {
        self.running.contains_key(&task_id)
    }

    pub fn open_task(&mut self, task_id: i64) -> Result<()> {
        if self.open.contains(&task_id) {
            return Ok(());
        }
        if self.open.len() >= self.capacity {
            bail!(
                "All {} timer slots are in use. Close a task first.",
                self.capacity
            );
        }

        self.open.push(task_id);
        self.save()
    }

    pub fn close_task(&mut self, task_id: i64) -> Result<()> {
        if self.is_running(task_id) {
            bail!("Task {task_id} has a running timer. Stop it first.");
        }

        self.open.retain(|open| *open != task_id);
        self.save()
    }

    /// Starts a new session: unless `preserve_tasks` is set, every open task
    /// without a running timer is closed.
    pub fn reset_session(&mut self) -> Result<()> {
        let preserve = self
            .database
            .option(PRESERVE_TASKS_OPTION)?
            .is_some_and(|raw| raw.trim() != "0" && !raw.trim().is_empty());
        if preserve {
            return Ok(());
        }

        let running = &self.running;
        self.open.retain(|task_id| running.contains_key(task_id));
        self.save()
    }

    /// Drops deleted tasks from the open set, discarding their timers.
    pub fn forget(&mut self, ids: &[i64]) -> Result<()> {
        self.open.retain(|task_id| !ids.contains(task_id));
        self.running.retain(|task_id, _| !ids.contains(task_id));
        self.save()
    }

    pub fn start(&mut self, task_id: i64, now: NaiveDateTime) -> Result<()> {
        if self.is_running(task_id) {
            bail!("Timer for task {task_id} is already running");
        }

        let details = self.database.select_task(task_id, now.date())?;
        self.open_task(task_id)?;
        self.database
            .insert_timestamp(task_id, details.spent_total, EventType::Start, None, now)?;
        self.running.insert(
            task_id,
            RunningTimer {
                started_at: now,
                date: now.date(),
                recorded: details.spent_today,
                base_total: details.spent_total,
            },
        );
        info!(task_id, "timer started");

        self.save()
    }

    /// Total seconds the task has accumulated, including the running session.
    pub fn elapsed_total(&self, task_id: i64, now: NaiveDateTime) -> Option<i64> {
        self.running
            .get(&task_id)
            .map(|timer| timer.base_total + timer.session_seconds(now))
    }

    pub fn stop(&mut self, task_id: i64, now: NaiveDateTime) -> Result<StopSummary> {
        let Some(timer) = self.running.remove(&task_id) else {
            bail!("Timer for task {task_id} is not running");
        };

        let session_seconds = timer.session_seconds(now);
        let rollover = self.database.record_spent_time(
            task_id,
            timer.recorded + session_seconds,
            timer.date,
            now,
        )?;
        let total_seconds = timer.base_total + session_seconds;
        self.database
            .insert_timestamp(task_id, total_seconds, EventType::Stop, None, now)?;
        self.save()?;
        info!(task_id, session_seconds, "timer stopped");

        Ok(StopSummary {
            task_id,
            session_seconds,
            total_seconds,
            rollover,
        })
    }

    /// Logs a custom marker at the running timer's current total.
    pub fn mark(&self, task_id: i64, now: NaiveDateTime, comment: Option<&str>) -> Result<i64> {
        let Some(elapsed) = self.elapsed_total(task_id, now) else {
            bail!("Timer for task {task_id} is not running");
        };

        self.database
            .insert_timestamp(task_id, elapsed, EventType::Custom, comment, now)?;
        Ok(elapsed)
    }

    fn save(&self) -> Result<()> {
        let open = self
            .open
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let running =
            serde_json::to_string(&self.running).context("Failed to serialize running timers")?;

        self.database.set_option(OPEN_TASKS_OPTION, &open)?;
        self.database.set_option(RUNNING_TIMERS_OPTION, &running)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Tracker;
    use crate::db::{Database, EventType};
    use chrono::NaiveDateTime;

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").expect("datetime")
    }

    #[test]
    fn start_and_stop_record_time_and_markers() {
        let database = Database::open_in_memory().expect("database");
        let task_id = database
            .insert_task("focus", at("2026-01-05 09:00:00"))
            .expect("task");

        let mut tracker = Tracker::load(&database).expect("tracker");
        tracker.start(task_id, at("2026-01-05 09:00:00")).expect("start");
        assert!(tracker.is_running(task_id));

        let elapsed = tracker
            .mark(task_id, at("2026-01-05 09:10:00"), Some("checkpoint"))
            .expect("mark");
        assert_eq!(elapsed, 600);

        let summary = tracker.stop(task_id, at("2026-01-05 09:30:00")).expect("stop");
        assert_eq!(summary.session_seconds, 1_800);
        assert_eq!(summary.total_seconds, 1_800);
        assert_eq!(summary.rollover, None);

        let details = database
            .select_task(task_id, at("2026-01-05 09:30:00").date())
            .expect("details");
        assert_eq!(details.spent_today, 1_800);

        let events = database
            .timestamps(task_id, details.spent_total)
            .expect("timestamps")
            .into_iter()
            .map(|entry| entry.event)
            .collect::<Vec<_>>();
        assert_eq!(
            events,
            vec![
                Some(EventType::Stop),
                Some(EventType::Custom),
                Some(EventType::Start)
            ]
        );
    }

    #[test]
    fn running_timers_survive_reload() {
        let database = Database::open_in_memory().expect("database");
        let task_id = database
            .insert_task("long job", at("2026-01-05 23:00:00"))
            .expect("task");

        {
            let mut tracker = Tracker::load(&database).expect("tracker");
            tracker.start(task_id, at("2026-01-05 23:00:00")).expect("start");
        }

        let mut tracker = Tracker::load(&database).expect("reload");
        assert_eq!(tracker.open_tasks(), &[task_id]);

        let summary = tracker.stop(task_id, at("2026-01-06 00:15:00")).expect("stop");
        let rollover = summary.rollover.expect("rollover");
        assert_eq!(rollover.carried_over, 900);
        assert_eq!(
            database.task_activity(task_id).expect("activity"),
            vec![
                ("2026-01-05".to_string(), 3_600),
                ("2026-01-06".to_string(), 900)
            ]
        );
    }

    #[test]
    fn open_tasks_survive_reload_with_default_options() {
        let database = Database::open_in_memory().expect("database");
        let task_id = database
            .insert_task("focus", at("2026-01-05 09:00:00"))
            .expect("task");

        Tracker::load(&database)
            .expect("tracker")
            .open_task(task_id)
            .expect("open");
        assert_eq!(Tracker::load(&database).expect("reload").open_tasks(), &[task_id]);

        let mut tracker = Tracker::load(&database).expect("reload");
        tracker.close_task(task_id).expect("close");
        assert!(Tracker::load(&database).expect("reload").open_tasks().is_empty());
    }

    #[test]
    fn open_slots_are_capped_and_preserved_on_request() {
        let database = Database::open_in_memory().expect("database");
        database.set_option("timers_count", "2").expect("option");
        database.set_option("preserve_tasks", "1").expect("option");
        let now = at("2026-01-05 09:00:00");
        let ids = ["a", "b", "c"]
            .iter()
            .map(|name| database.insert_task(name, now).expect("task"))
            .collect::<Vec<_>>();

        let mut tracker = Tracker::load(&database).expect("tracker");
        tracker.open_task(ids[0]).expect("open");
        tracker.open_task(ids[1]).expect("open");
        assert!(tracker.open_task(ids[2]).is_err());

        tracker.start(ids[1], now).expect("start");

        let mut reloaded = Tracker::load(&database).expect("reload");
        reloaded.reset_session().expect("reset");
        assert_eq!(reloaded.open_tasks(), &[ids[0], ids[1]]);

        database.set_option("preserve_tasks", "0").expect("option");
        let mut forgetful = Tracker::load(&database).expect("reload");
        forgetful.reset_session().expect("reset");
        assert_eq!(forgetful.open_tasks(), &[ids[1]]);
        assert_eq!(
            Tracker::load(&database).expect("reload").open_tasks(),
            &[ids[1]]
        );
    }

    #[test]
    fn rejects_double_start_and_idle_stop() {
        let database = Database::open_in_memory().expect("database");
        let now = at("2026-01-05 09:00:00");
        let task_id = database.insert_task("task", now).expect("task");

        let mut tracker = Tracker::load(&database).expect("tracker");
        assert!(tracker.stop(task_id, now).is_err());
        tracker.start(task_id, now).expect("start");
        assert!(tracker.start(task_id, now).is_err());
        assert!(tracker.close_task(task_id).is_err());

        tracker.forget(&[task_id]).expect("forget");
        assert!(!tracker.is_running(task_id));
        assert!(tracker.open_tasks().is_empty());
    }
}
