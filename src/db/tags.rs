use super::{Database, StoreError, StoreResult, Table, is_unique_violation};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params};
use tracing::info;

/// Seeded with the schema and assigned to every new task.
pub const DEFAULT_TAG_ID: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagState {
    pub id: i64,
    pub name: String,
    pub assigned: bool,
}

impl Database {
    pub fn insert_tag(&self, name: &str) -> StoreResult<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }

        let tag_id = self
            .insert(Table::Tags, &["name"], &[&name])
            .map_err(|error| match error {
                StoreError::Sqlite(inner) if is_unique_violation(&inner) => {
                    StoreError::TagNameExists(name.to_string())
                }
                other => other,
            })?;
        info!(tag_id, name, "tag created");

        Ok(tag_id)
    }

    /// Removes tag names together with their task associations and drops
    /// them from the stored filter.
    pub fn delete_tags(&self, ids: &[i64]) -> StoreResult<()> {
        if ids.contains(&DEFAULT_TAG_ID) {
            return Err(StoreError::DefaultTagProtected);
        }

        let values = ids.iter().copied().map(Value::Integer).collect::<Vec<_>>();
        self.delete(Table::Tags, &[("id", values.as_slice())])?;
        self.delete(Table::TasksTags, &[("tag_id", values.as_slice())])?;

        let mut filter = self.load_filter()?;
        let before = filter.tags.len();
        filter.tags.retain(|tag_id| !ids.contains(tag_id));
        if filter.tags.len() != before {
            self.save_filter(&filter)?;
        }

        Ok(())
    }

    pub fn tags(&self) -> StoreResult<Vec<Tag>> {
        let mut statement = self.conn.prepare("SELECT id, name FROM tags ORDER BY name")?;
        let rows = statement
            .query_map([], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Looks a tag up by exact name first, then by numeric id.
    pub fn resolve_tag(&self, reference: &str) -> StoreResult<Option<i64>> {
        let reference = reference.trim();
        let by_name = self
            .conn
            .query_row(
                "SELECT id FROM tags WHERE name = ?1",
                params![reference],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        match (by_name, reference.parse::<i64>()) {
            (Some(id), _) => Ok(Some(id)),
            (None, Ok(id)) => Ok(self
                .conn
                .query_row("SELECT id FROM tags WHERE id = ?1", params![id], |row| {
                    row.get::<_, i64>(0)
                })
                .optional()?),
            (None, Err(_)) => Ok(None),
        }
    }

    /// Assigns a tag unless the task already carries it.
    pub fn assign_tag(&self, task_id: i64, tag_id: i64) -> StoreResult<bool> {
        if self.has_tag(task_id, tag_id)? {
            return Ok(false);
        }

        self.insert(Table::TasksTags, &["task_id", "tag_id"], &[&task_id, &tag_id])?;
        Ok(true)
    }

    pub fn unassign_tag(&self, task_id: i64, tag_id: i64) -> StoreResult<bool> {
        let removed = self.delete(
            Table::TasksTags,
            &[
                ("task_id", &[Value::Integer(task_id)][..]),
                ("tag_id", &[Value::Integer(tag_id)][..]),
            ],
        )?;

        Ok(removed > 0)
    }

    /// Every tag sorted by name, flagged with whether `task_id` carries it.
    pub fn tag_states(&self, task_id: i64) -> StoreResult<Vec<TagState>> {
        let mut statement = self.conn.prepare(
            "SELECT tags.id, tags.name, EXISTS(
               SELECT 1 FROM tasks_tags WHERE tasks_tags.tag_id = tags.id AND tasks_tags.task_id = ?1
             )
             FROM tags ORDER BY tags.name",
        )?;
        let rows = statement
            .query_map(params![task_id], |row| {
                Ok(TagState {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    assigned: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn has_tag(&self, task_id: i64, tag_id: i64) -> StoreResult<bool> {
        Ok(self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tasks_tags WHERE task_id = ?1 AND tag_id = ?2)",
            params![task_id, tag_id],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::TagState;
    use crate::db::{Database, FilterMode, FilterSelection, StoreError};
    use chrono::NaiveDateTime;

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2026-01-05 09:00:00", "%Y-%m-%d %H:%M:%S")
            .expect("datetime")
    }

    #[test]
    fn tag_names_are_unique() {
        let database = Database::open_in_memory().expect("database");

        database.insert_tag("work").expect("insert");
        assert!(matches!(
            database.insert_tag("work"),
            Err(StoreError::TagNameExists(_))
        ));
        assert!(matches!(
            database.insert_tag("default"),
            Err(StoreError::TagNameExists(_))
        ));
    }

    #[test]
    fn tag_states_flag_assigned_tags() {
        let database = Database::open_in_memory().expect("database");
        let task_id = database.insert_task("task", now()).expect("task");
        let work = database.insert_tag("work").expect("tag");
        let home = database.insert_tag("home").expect("tag");

        assert!(database.assign_tag(task_id, work).expect("assign"));
        assert!(!database.assign_tag(task_id, work).expect("assign twice"));

        let states = database.tag_states(task_id).expect("states");
        assert_eq!(
            states,
            vec![
                TagState {
                    id: 1,
                    name: "default".to_string(),
                    assigned: true
                },
                TagState {
                    id: home,
                    name: "home".to_string(),
                    assigned: false
                },
                TagState {
                    id: work,
                    name: "work".to_string(),
                    assigned: true
                },
            ]
        );

        assert!(database.unassign_tag(task_id, work).expect("unassign"));
        assert!(!database.unassign_tag(task_id, work).expect("unassign twice"));
    }

    #[test]
    fn deleting_tags_drops_associations() {
        let database = Database::open_in_memory().expect("database");
        let task_id = database.insert_task("task", now()).expect("task");
        let work = database.insert_tag("work").expect("tag");
        database.assign_tag(task_id, work).expect("assign");

        database.delete_tags(&[work]).expect("delete");

        assert_eq!(database.resolve_tag("work").expect("resolve"), None);
        assert!(
            database
                .tag_states(task_id)
                .expect("states")
                .iter()
                .all(|state| state.id != work)
        );
        assert!(matches!(
            database.delete_tags(&[1]),
            Err(StoreError::DefaultTagProtected)
        ));
    }

    #[test]
    fn deleting_tags_clears_them_from_the_stored_filter() {
        let database = Database::open_in_memory().expect("database");
        let task_id = database.insert_task("task", now()).expect("task");
        let x = database.insert_tag("x").expect("tag");
        let y = database.insert_tag("y").expect("tag");
        database.assign_tag(task_id, x).expect("assign");
        database.assign_tag(task_id, y).expect("assign");
        database
            .save_filter(&FilterSelection {
                tags: [x, y].into_iter().collect(),
                mode: FilterMode::And,
                ..FilterSelection::default()
            })
            .expect("save filter");

        database.delete_tags(&[y]).expect("delete");

        let filter = database.load_filter().expect("load filter");
        assert_eq!(filter.tags.into_iter().collect::<Vec<_>>(), vec![x]);
        let rows = database
            .filtered_tasks(&database.load_filter().expect("load filter"))
            .expect("filtered");
        assert_eq!(rows.iter().map(|row| row.id).collect::<Vec<_>>(), vec![task_id]);
    }
}
