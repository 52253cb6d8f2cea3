use crate::db::ExportRow;
use crate::timefmt::format_duration;
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const TASKS_HEADER: &str = "Task,Description,Dates,Time,Total working time";
pub const DATES_HEADER: &str = "Date,Tasks,Descriptions,Time,Summarized working time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportLayout {
    /// One block per task listing its dates.
    ByTask,
    /// One block per date listing its tasks.
    ByDate,
}

struct Entry<'a> {
    key: &'a str,
    description: &'a str,
    spent_time: i64,
}

pub fn render(layout: ExportLayout, rows: &[ExportRow]) -> Vec<String> {
    match layout {
        ExportLayout::ByTask => tasks_to_export(rows),
        ExportLayout::ByDate => dates_to_export(rows),
    }
}

/// Groups rows per task: the first line of each group carries the name,
/// description and total, following lines only a date and its time.
pub fn tasks_to_export(rows: &[ExportRow]) -> Vec<String> {
    let grouped = rows.iter().fold(BTreeMap::new(), |mut acc, row| {
        acc.entry(row.name.as_str())
            .or_insert_with(Vec::new)
            .push(Entry {
                key: row.date.as_str(),
                description: row.description.as_str(),
                spent_time: row.spent_time,
            });
        acc
    });

    grouped
        .into_iter()
        .fold(vec![TASKS_HEADER.to_string()], |mut lines, (name, mut entries)| {
            entries.sort_by(|left, right| left.key.cmp(right.key));
            let total = entries.iter().map(|entry| entry.spent_time).sum::<i64>();

            lines.extend(entries.iter().enumerate().map(|(index, entry)| {
                if index == 0 {
                    csv_line(&[
                        name,
                        entry.description,
                        entry.key,
                        &format_duration(entry.spent_time),
                        &format_duration(total),
                    ])
                } else {
                    csv_line(&["", "", entry.key, &format_duration(entry.spent_time), ""])
                }
            }));
            lines
        })
}

/// Groups rows per date: the first line of each group carries the date and
/// the day's total, every line a task name, description and time.
pub fn dates_to_export(rows: &[ExportRow]) -> Vec<String> {
    let grouped = rows.iter().fold(BTreeMap::new(), |mut acc, row| {
        acc.entry(row.date.as_str())
            .or_insert_with(Vec::new)
            .push(Entry {
                key: row.name.as_str(),
                description: row.description.as_str(),
                spent_time: row.spent_time,
            });
        acc
    });

    grouped
        .into_iter()
        .fold(vec![DATES_HEADER.to_string()], |mut lines, (date, mut entries)| {
            entries.sort_by(|left, right| left.key.cmp(right.key));
            let total = entries.iter().map(|entry| entry.spent_time).sum::<i64>();

            lines.extend(entries.iter().enumerate().map(|(index, entry)| {
                let (date, total) = if index == 0 {
                    (date, format_duration(total))
                } else {
                    ("", String::new())
                };
                csv_line(&[
                    date,
                    entry.key,
                    entry.description,
                    &format_duration(entry.spent_time),
                    &total,
                ])
            }));
            lines
        })
}

pub fn write_export(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create export directory: {}", parent.display())
        })?;
    }

    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content)
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;

    Ok(())
}

fn csv_line(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|field| csv_field(field))
        .collect::<Vec<_>>()
        .join(",")
}

fn csv_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

#[cfg(test)]
mod tests {
    use super::{DATES_HEADER, TASKS_HEADER, dates_to_export, tasks_to_export, write_export};
    use crate::db::ExportRow;
    use std::fs;
    use tempfile::tempdir;

    fn row(name: &str, description: &str, date: &str, spent_time: i64) -> ExportRow {
        ExportRow {
            name: name.to_string(),
            description: description.to_string(),
            date: date.to_string(),
            spent_time,
        }
    }

    fn sample() -> Vec<ExportRow> {
        vec![
            row("alpha", "first, draft", "2026-01-05", 3_600),
            row("alpha", "first, draft", "2026-01-06", 90_000),
            row("beta", "", "2026-01-05", 61),
        ]
    }

    #[test]
    fn groups_by_task() {
        let lines = tasks_to_export(&sample());

        assert_eq!(
            lines,
            vec![
                TASKS_HEADER.to_string(),
                "alpha,\"first, draft\",2026-01-05,01:00:00,\"1 day, 02:00:00\"".to_string(),
                ",,2026-01-06,\"1 day, 01:00:00\",".to_string(),
                "beta,,2026-01-05,00:01:01,00:01:01".to_string(),
            ]
        );
    }

    #[test]
    fn groups_by_date() {
        let lines = dates_to_export(&sample());

        assert_eq!(
            lines,
            vec![
                DATES_HEADER.to_string(),
                "2026-01-05,alpha,\"first, draft\",01:00:00,01:01:01".to_string(),
                ",beta,,00:01:01,".to_string(),
                "2026-01-06,alpha,\"first, draft\",\"1 day, 01:00:00\",\"1 day, 01:00:00\""
                    .to_string(),
            ]
        );
    }

    #[test]
    fn empty_rows_give_only_header() {
        assert_eq!(tasks_to_export(&[]), vec![TASKS_HEADER.to_string()]);
        assert_eq!(dates_to_export(&[]), vec![DATES_HEADER.to_string()]);
    }

    #[test]
    fn writes_file_with_trailing_newline() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("out").join("export.csv");

        write_export(&path, &["a,b".to_string(), "c,d".to_string()]).expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "a,b\nc,d\n");
    }
}
