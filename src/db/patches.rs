use super::{StoreResult, queries, value_to_string};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

pub const PATCH_VERSION_OPTION: &str = "patch_ver";

/// A group of statements applied together once the stored patch version is
/// below `version`.
#[derive(Debug, Clone, Copy)]
pub struct Patch {
    pub version: i64,
    pub statements: &'static [&'static str],
}

pub const PATCHES: &[Patch] = &[
    Patch {
        version: 1,
        statements: &["INSERT OR IGNORE INTO options VALUES ('toggle_tasks', 0);"],
    },
    Patch {
        version: 2,
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_activity_task_date ON activity(task_id, date);",
            "CREATE INDEX IF NOT EXISTS idx_tasks_tags_task_tag ON tasks_tags(task_id, tag_id);",
        ],
    },
    Patch {
        version: 3,
        statements: &["CREATE INDEX IF NOT EXISTS idx_timestamps_task ON timestamps(task_id);"],
    },
    Patch {
        version: 4,
        statements: &["INSERT OR IGNORE INTO options VALUES ('running_timers', '{}');"],
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub from_version: Option<i64>,
    pub to_version: i64,
    pub applied: Vec<i64>,
    pub skipped_statements: usize,
}

pub fn latest_version(patches: &[Patch]) -> i64 {
    patches.iter().map(|patch| patch.version).max().unwrap_or(0)
}

pub fn stored_version(conn: &Connection) -> StoreResult<Option<i64>> {
    let value = conn
        .query_row(
            "SELECT value FROM options WHERE name = ?1",
            params![PATCH_VERSION_OPTION],
            |row| row.get::<_, Value>(0),
        )
        .optional()?;

    Ok(value.and_then(value_to_string).map(|raw| {
        raw.trim().parse::<i64>().unwrap_or_else(|_| {
            warn!(value = %raw, "unreadable patch version, treating as 0");
            0
        })
    }))
}

/// Applies every patch group newer than the stored version in ascending order.
/// Statements failing with a database error are skipped; the remaining
/// statements and groups still run. The stored version only moves forward.
pub fn apply_patches(conn: &Connection, patches: &[Patch]) -> StoreResult<PatchReport> {
    let from_version = stored_version(conn)?;
    let baseline = from_version.unwrap_or(0);

    let mut ordered = patches.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|patch| patch.version);

    let mut applied = Vec::new();
    let mut skipped_statements = 0;

    for patch in ordered.into_iter().filter(|patch| patch.version > baseline) {
        for statement in patch.statements {
            if let Err(error) = conn.execute_batch(statement) {
                warn!(
                    version = patch.version,
                    error = %error,
                    "patch statement failed, skipping"
                );
                skipped_statements += 1;
            }
        }
        info!(version = patch.version, "schema patch applied");
        applied.push(patch.version);
    }

    let to_version = latest_version(patches).max(baseline);
    if from_version != Some(to_version) {
        conn.execute(
            queries::UPSERT_OPTION,
            params![PATCH_VERSION_OPTION, to_version],
        )?;
    }

    Ok(PatchReport {
        from_version,
        to_version,
        applied,
        skipped_statements,
    })
}
