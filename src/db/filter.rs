use super::{Database, StoreError, StoreResult, queries};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub const FILTER_TAGS_OPTION: &str = "filter_tags";
pub const FILTER_DATES_OPTION: &str = "filter_dates";
pub const FILTER_MODE_OPTION: &str = "filter_operating_mode";

const SELECT_COLUMNS: &str =
    "SELECT tasks.id, tasks.name, act.total_time, tasks.description, tasks.creation_date";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterMode {
    /// Every selected date and every selected tag must match.
    #[default]
    And,
    /// Any selected date or any selected tag is enough.
    Or,
}

impl FromStr for FilterMode {
    type Err = StoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            _ => Err(StoreError::InvalidFilterMode(raw.to_string())),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "AND",
            Self::Or => "OR",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    pub tags: BTreeSet<i64>,
    pub dates: BTreeSet<String>,
    pub mode: FilterMode,
}

/// SQL text plus the values bound to its `?` placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl FilterSelection {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.dates.is_empty()
    }

    /// Builds the task list query for this selection, or `None` when nothing
    /// is selected and the plain task list applies.
    pub fn to_query(&self) -> Option<FilterQuery> {
        if self.is_empty() {
            return None;
        }

        Some(match self.mode {
            FilterMode::Or => self.any_query(),
            FilterMode::And => self.all_query(),
        })
    }

    fn any_query(&self) -> FilterQuery {
        let mut params = Vec::new();
        let mut predicates = Vec::new();

        if !self.dates.is_empty() {
            predicates.push(format!(
                "tasks.id IN (SELECT task_id FROM activity WHERE date IN {})",
                queries::placeholders(self.dates.len())
            ));
            params.extend(self.date_values());
        }
        if !self.tags.is_empty() {
            predicates.push(format!(
                "tasks.id IN (SELECT task_id FROM tasks_tags WHERE tag_id IN {})",
                queries::placeholders(self.tags.len())
            ));
            params.extend(self.tag_values());
        }

        let sql = format!(
            "{SELECT_COLUMNS} FROM tasks \
             JOIN (SELECT task_id, SUM(spent_time) AS total_time FROM activity GROUP BY task_id) AS act \
             ON act.task_id = tasks.id \
             WHERE {} ORDER BY tasks.id",
            predicates.join(" OR ")
        );

        FilterQuery { sql, params }
    }

    fn all_query(&self) -> FilterQuery {
        let mut params = Vec::new();

        // With dates selected, the total covers only those dates.
        let totals = if self.dates.is_empty() {
            "SELECT task_id, SUM(spent_time) AS total_time FROM activity GROUP BY task_id".to_string()
        } else {
            params.extend(self.date_values());
            format!(
                "SELECT task_id, SUM(spent_time) AS total_time FROM activity \
                 WHERE date IN {} GROUP BY task_id",
                queries::placeholders(self.dates.len())
            )
        };
        let mut sql = format!(
            "{SELECT_COLUMNS} FROM tasks JOIN ({totals}) AS act ON act.task_id = tasks.id"
        );

        if !self.tags.is_empty() {
            sql.push_str(&format!(
                " JOIN (SELECT task_id FROM tasks_tags WHERE tag_id IN {} \
                 GROUP BY task_id HAVING COUNT(DISTINCT tag_id) = ?) AS tagged \
                 ON tagged.task_id = tasks.id",
                queries::placeholders(self.tags.len())
            ));
            params.extend(self.tag_values());
            params.push(Value::Integer(self.tags.len() as i64));
        }
        if !self.dates.is_empty() {
            sql.push_str(&format!(
                " JOIN (SELECT task_id FROM activity WHERE date IN {} \
                 GROUP BY task_id HAVING COUNT(DISTINCT date) = ?) AS dated \
                 ON dated.task_id = tasks.id",
                queries::placeholders(self.dates.len())
            ));
            params.extend(self.date_values());
            params.push(Value::Integer(self.dates.len() as i64));
        }
        sql.push_str(" ORDER BY tasks.id");

        FilterQuery { sql, params }
    }

    fn date_values(&self) -> impl Iterator<Item = Value> + '_ {
        self.dates.iter().cloned().map(Value::Text)
    }

    fn tag_values(&self) -> impl Iterator<Item = Value> + '_ {
        self.tags.iter().copied().map(Value::Integer)
    }
}

impl Database {
    /// The task list under `selection`, or every task when it selects nothing.
    pub fn filtered_tasks(&self, selection: &FilterSelection) -> StoreResult<Vec<super::TaskRow>> {
        match selection.to_query() {
            Some(query) => self.task_rows(&query.sql, query.params),
            None => self.all_tasks(),
        }
    }

    pub fn load_filter(&self) -> StoreResult<FilterSelection> {
        let tags = self
            .option(FILTER_TAGS_OPTION)?
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter_map(|part| part.parse::<i64>().ok())
            .collect();
        let dates = self
            .option(FILTER_DATES_OPTION)?
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        let mode = self
            .option(FILTER_MODE_OPTION)?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();

        Ok(FilterSelection { tags, dates, mode })
    }

    pub fn save_filter(&self, selection: &FilterSelection) -> StoreResult<()> {
        let tags = selection
            .tags
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let dates = selection.dates.iter().cloned().collect::<Vec<_>>().join(",");

        self.set_option(FILTER_TAGS_OPTION, &tags)?;
        self.set_option(FILTER_DATES_OPTION, &dates)?;
        self.set_option(FILTER_MODE_OPTION, &selection.mode.to_string())
    }
}
