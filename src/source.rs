//! Task sources: one aggregate export file or a directory of per-task files.
//!
//! An unreadable root is fatal (nothing can proceed without input), but an
//! unparsable file inside a directory only fails that file: the iterator
//! yields the error and continues with the next file.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ConvertError;
use crate::model::{tasks_from_value, Task};

/// Lazy stream of tasks from an export root.
pub struct TaskStream {
    kind: StreamKind,
}

enum StreamKind {
    Memory(std::vec::IntoIter<Task>),
    Directory {
        files: std::vec::IntoIter<PathBuf>,
        pending: VecDeque<Task>,
        next_fallback_id: i64,
    },
}

/// Open `input` as a task source.
///
/// A file is treated as an aggregate export (task array or single record);
/// a directory is scanned recursively for `*.json` files in sorted path
/// order, so repeated runs see tasks in the same order.
pub fn iter_tasks(input: &Path) -> Result<TaskStream, ConvertError> {
    if input.is_dir() {
        let mut files = Vec::new();
        for entry in WalkDir::new(input).follow_links(true) {
            let entry = entry.map_err(|err| {
                std::io::Error::other(format!("failed to list {}: {err}", input.display()))
            })?;
            if entry.file_type().is_file() && has_json_extension(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
        files.sort();

        Ok(TaskStream {
            kind: StreamKind::Directory {
                files: files.into_iter(),
                pending: VecDeque::new(),
                next_fallback_id: 0,
            },
        })
    } else {
        Ok(TaskStream {
            kind: StreamKind::Memory(read_aggregate(input)?.into_iter()),
        })
    }
}

/// Read an aggregate export file eagerly.
pub fn read_aggregate(path: &Path) -> Result<Vec<Task>, ConvertError> {
    let bytes = fs::read(path)?;
    let root: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|source| ConvertError::TaskParse {
            path: path.to_path_buf(),
            source,
        })?;
    tasks_from_value(root, path)
}

impl Iterator for TaskStream {
    type Item = Result<Task, ConvertError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.kind {
            StreamKind::Memory(tasks) => tasks.next().map(Ok),
            StreamKind::Directory {
                files,
                pending,
                next_fallback_id,
            } => loop {
                if let Some(task) = pending.pop_front() {
                    return Some(Ok(task));
                }

                let path = files.next()?;
                match read_task_file(&path, next_fallback_id) {
                    Ok(tasks) => pending.extend(tasks),
                    Err(err) => return Some(Err(err)),
                }
            },
        }
    }
}

fn read_task_file(path: &Path, next_fallback_id: &mut i64) -> Result<Vec<Task>, ConvertError> {
    let bytes = fs::read(path)?;
    let root: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|source| ConvertError::TaskParse {
            path: path.to_path_buf(),
            source,
        })?;

    // Per-task files without an embedded id fall back to the numeric file
    // stem (the project layout names files `<task_id>.json`), then to a
    // running counter.
    let stem_id = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse::<i64>().ok());

    let fallback = stem_id.unwrap_or(*next_fallback_id);
    let tasks = tasks_from_value(root, path)?
        .into_iter()
        .enumerate()
        .map(|(offset, mut task)| {
            if task.raw.get("id").is_none() {
                task.id = fallback + offset as i64;
            }
            task
        })
        .collect::<Vec<_>>();

    *next_fallback_id += tasks.len() as i64;
    Ok(tasks)
}

fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aggregate_file_yields_tasks_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("export.json");
        fs::write(
            &path,
            json!([{"id": 2, "data": {}}, {"id": 1, "data": {}}]).to_string(),
        )
        .expect("write export");

        let ids: Vec<i64> = iter_tasks(&path)
            .expect("open stream")
            .map(|task| task.expect("task").id)
            .collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn directory_yields_sorted_files_and_stem_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("10.json"), json!({"data": {}}).to_string()).expect("write");
        fs::write(dir.path().join("2.json"), json!({"data": {}}).to_string()).expect("write");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let ids: Vec<i64> = iter_tasks(dir.path())
            .expect("open stream")
            .map(|task| task.expect("task").id)
            .collect();
        // Sorted path order: "10.json" < "2.json" lexicographically.
        assert_eq!(ids, vec![10, 2]);
    }

    #[test]
    fn broken_file_in_directory_is_isolated() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("1.json"), json!({"data": {}}).to_string()).expect("write");
        fs::write(dir.path().join("2.json"), "{not json").expect("write");
        fs::write(dir.path().join("3.json"), json!({"data": {}}).to_string()).expect("write");

        let results: Vec<_> = iter_tasks(dir.path()).expect("open stream").collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn unreadable_aggregate_is_fatal() {
        let err = iter_tasks(Path::new("/nonexistent/export.json"))
            .err()
            .expect("expected error");
        assert!(matches!(err, ConvertError::Io(_)));
    }
}
