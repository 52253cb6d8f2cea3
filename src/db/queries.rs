pub const CREATE_TASKS: &str = r#"
CREATE TABLE tasks (
  id            INTEGER PRIMARY KEY AUTOINCREMENT,
  name          TEXT UNIQUE,
  description   TEXT,
  creation_date TEXT
);
"#;

pub const CREATE_ACTIVITY: &str = r#"
CREATE TABLE activity (
  date       TEXT,
  task_id    INT,
  spent_time INT
);
"#;

pub const CREATE_TASKS_TAGS: &str = r#"
CREATE TABLE tasks_tags (
  task_id INT,
  tag_id  INT
);
"#;

pub const CREATE_TIMESTAMPS: &str = r#"
CREATE TABLE timestamps (
  timestamp  INT,
  task_id    INT,
  event_type INT,
  datetime   TEXT,
  comment    TEXT
);
"#;

pub const CREATE_TAGS: &str = r#"
CREATE TABLE tags (
  id   INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT UNIQUE
);
"#;

pub const CREATE_OPTIONS: &str = r#"
CREATE TABLE options (
  name  TEXT UNIQUE,
  value NUMERIC
);
"#;

pub const SEED_DEFAULTS: &str = r#"
INSERT INTO tags VALUES (1, 'default');
INSERT INTO options VALUES ('filter_tags', '');
INSERT INTO options VALUES ('filter_dates', '');
INSERT INTO options VALUES ('filter_operating_mode', 'AND');
INSERT INTO options VALUES ('patch_ver', 0);
INSERT INTO options VALUES ('timers_count', 3);
INSERT INTO options VALUES ('always_on_top', 0);
INSERT INTO options VALUES ('preserve_tasks', 0);
INSERT INTO options VALUES ('show_today', 0);
INSERT INTO options VALUES ('toggle_tasks', 0);
INSERT INTO options VALUES ('tasks', '');
INSERT INTO options VALUES ('compact_interface', 0);
INSERT INTO options VALUES ('install_time', datetime('now'));
"#;

pub const SEED_VERSION: &str = "INSERT INTO options VALUES ('version', ?1)";

pub const TASKS_TABLE_EXISTS: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'tasks'";

pub const UPSERT_OPTION: &str = "INSERT INTO options (name, value) VALUES (?1, ?2)
 ON CONFLICT(name) DO UPDATE SET value = excluded.value";

/// Every task with its overall spent time, used when no filter is active.
pub const UNFILTERED_TASKS: &str = r#"
SELECT tasks.id, tasks.name, COALESCE(act.total_time, 0), tasks.description, tasks.creation_date
FROM tasks
LEFT JOIN (SELECT task_id, SUM(spent_time) AS total_time FROM activity GROUP BY task_id) AS act
  ON act.task_id = tasks.id
ORDER BY tasks.id
"#;

pub const EXPORT_ROWS_PREFIX: &str = r#"
SELECT tasks.name, tasks.description, activity.date, activity.spent_time
FROM tasks JOIN activity ON tasks.id = activity.task_id
WHERE tasks.id IN "#;

pub const EXPORT_ROWS_SUFFIX: &str = " ORDER BY tasks.name, activity.date";

pub const ORPHAN_COUNTS: &str = r#"
SELECT
  (SELECT COUNT(*) FROM activity WHERE task_id NOT IN (SELECT id FROM tasks)),
  (SELECT COUNT(*) FROM tasks_tags WHERE task_id NOT IN (SELECT id FROM tasks)
     OR tag_id NOT IN (SELECT id FROM tags)),
  (SELECT COUNT(*) FROM timestamps WHERE task_id NOT IN (SELECT id FROM tasks))
"#;

pub const PRUNE_ORPHANS: [&str; 3] = [
    "DELETE FROM activity WHERE task_id NOT IN (SELECT id FROM tasks)",
    "DELETE FROM tasks_tags WHERE task_id NOT IN (SELECT id FROM tasks) OR tag_id NOT IN (SELECT id FROM tags)",
    "DELETE FROM timestamps WHERE task_id NOT IN (SELECT id FROM tasks)",
];

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_TASKS,
        CREATE_ACTIVITY,
        CREATE_TASKS_TAGS,
        CREATE_TIMESTAMPS,
        CREATE_TAGS,
        CREATE_OPTIONS,
        SEED_DEFAULTS,
    ]
}

/// Builds `(?, ?, ?)` for `count` bound values.
pub fn placeholders(count: usize) -> String {
    format!("({})", vec!["?"; count].join(", "))
}
