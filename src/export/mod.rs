//! Format emitters.
//!
//! Each submodule turns a stream of normalized annotations into one target
//! format. They all share the same lifecycle: stream tasks one at a time
//! with per-task error isolation, then finalize aggregate structures
//! (category tables, CSV headers). A failing task is skipped with a logged
//! reason; only an unusable input root or an unwritable destination fails
//! the run.

pub mod coco;
pub mod conll;
pub mod csv;
pub mod json;
pub mod voc;

use std::path::Path;

use crate::error::ConvertError;
use crate::fetch::{ImageFetcher, ResolvedImage};
use crate::model::{image_basename, NormalizedAnnotation, Task};
use crate::normalize::{normalize, NormalizeOptions};
use crate::report::EmissionReport;
use crate::schema::SchemaIndex;

/// The image a task annotates, with resolved pixel dimensions.
pub(crate) struct TaskImage {
    /// Raw reference from the task data (URL or path).
    pub reference: String,
    /// Derived bare file name, unique enough for output naming.
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    /// Local resolution result, when the fetcher found the bytes.
    pub resolved: Option<ResolvedImage>,
}

/// Drive a task stream through `per_task` with the shared error policy.
///
/// Per-file read errors and per-task geometry/conflict errors become skips;
/// anything else is fatal and propagates.
pub(crate) fn drive<I, F>(
    stream: I,
    index: &SchemaIndex,
    options: &NormalizeOptions,
    report: &mut EmissionReport,
    mut per_task: F,
) -> Result<(), ConvertError>
where
    I: Iterator<Item = Result<Task, ConvertError>>,
    F: FnMut(&Task, &[NormalizedAnnotation], &mut EmissionReport) -> Result<(), ConvertError>,
{
    for task in stream {
        report.tasks_total += 1;

        let task = match task {
            Ok(task) => task,
            Err(err) => {
                report.tasks_skipped += 1;
                report.warn(format!("unreadable task record: {err}"));
                continue;
            }
        };

        let (annotations, warnings) = normalize(&task, index, options);
        for warning in warnings {
            report.warn(warning);
        }

        match per_task(&task, &annotations, report) {
            Ok(()) => {}
            Err(
                err @ (ConvertError::Geometry { .. }
                | ConvertError::Conflict { .. }
                | ConvertError::MaskDecode(_)),
            ) => report.skip_task(task.id, err),
            Err(fatal) => return Err(fatal),
        }
    }

    Ok(())
}

/// Resolve the image a task's geometry annotations refer to.
///
/// Dimensions come from the results' recorded `original_width`/`height` when
/// present, otherwise from the fetcher. Unresolvable dimensions are a
/// per-task [`ConvertError::Geometry`].
pub(crate) fn task_image<F: ImageFetcher>(
    task: &Task,
    annotations: &[NormalizedAnnotation],
    fetcher: &F,
) -> Result<TaskImage, ConvertError> {
    let reference = annotations
        .iter()
        .find_map(|ann| ann.data_key.as_deref())
        .and_then(|key| task.data_str(key))
        .or_else(|| task.first_string_field())
        .unwrap_or_default()
        .to_string();

    let file_name =
        image_basename(&reference).unwrap_or_else(|| format!("task-{}.jpg", task.id));

    let resolved = fetcher.resolve(&reference);

    let recorded = annotations.iter().find_map(|ann| ann.original_size);
    let (width, height) = match recorded.or_else(|| {
        resolved
            .as_ref()
            .map(|resolved| (resolved.width, resolved.height))
    }) {
        Some(size) => size,
        None => {
            return Err(ConvertError::Geometry {
                task_id: task.id,
                reference,
            })
        }
    };

    Ok(TaskImage {
        reference,
        file_name,
        width,
        height,
        resolved,
    })
}

pub(crate) fn create_parent_dirs(path: &Path) -> Result<(), ConvertError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
