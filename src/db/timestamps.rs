use super::{Database, StoreResult, Table};
use crate::timefmt::{HUMAN_FORMAT, format_duration};
use chrono::NaiveDateTime;
use rusqlite::params;
use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Start,
    Stop,
    Pause,
    Resume,
    Custom,
}

impl EventType {
    pub fn code(self) -> i64 {
        match self {
            Self::Start => 0,
            Self::Stop => 1,
            Self::Pause => 2,
            Self::Resume => 3,
            Self::Custom => 9,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Start),
            1 => Some(Self::Stop),
            2 => Some(Self::Pause),
            3 => Some(Self::Resume),
            9 => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Custom => "mark",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampEntry {
    pub timestamp: i64,
    pub event: Option<EventType>,
    pub datetime: Option<String>,
    pub comment: Option<String>,
    pub label: String,
}

impl Database {
    /// Logs a marker at `elapsed` seconds of the task's total running time.
    pub fn insert_timestamp(
        &self,
        task_id: i64,
        elapsed: i64,
        event: EventType,
        comment: Option<&str>,
        at: NaiveDateTime,
    ) -> StoreResult<i64> {
        self.insert(
            Table::Timestamps,
            &["timestamp", "task_id", "event_type", "datetime", "comment"],
            &[
                &elapsed,
                &task_id,
                &event.code(),
                &at.format(HUMAN_FORMAT).to_string(),
                &comment,
            ],
        )
    }

    /// Markers for one task, newest first, labelled with the time spent since each.
    pub fn timestamps(&self, task_id: i64, total_spent: i64) -> StoreResult<Vec<TimestampEntry>> {
        let mut statement = self.conn.prepare(
            "SELECT timestamp, event_type, datetime, comment FROM timestamps
             WHERE task_id = ?1 ORDER BY timestamp DESC, rowid DESC",
        )?;
        let rows = statement
            .query_map(params![task_id], |row| {
                let timestamp: i64 = row.get(0)?;
                let event = match row.get::<_, Value>(1)? {
                    Value::Integer(code) => EventType::from_code(code),
                    _ => None,
                };

                Ok(TimestampEntry {
                    timestamp,
                    event,
                    datetime: row.get(2)?,
                    comment: row.get(3)?,
                    label: format!(
                        "{}; {} spent since that moment",
                        format_duration(timestamp),
                        format_duration(total_spent - timestamp)
                    ),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn delete_timestamp(&self, task_id: i64, timestamp: i64) -> StoreResult<usize> {
        self.delete(
            Table::Timestamps,
            &[
                ("task_id", &[Value::Integer(task_id)][..]),
                ("timestamp", &[Value::Integer(timestamp)][..]),
            ],
        )
    }
}
