//! Data model for raw task records and normalized annotations.
//!
//! Raw types ([`Task`], [`Annotation`], [`RawResult`]) are a read-only serde
//! view of the export JSON; every task also keeps its original
//! `serde_json::Value` so the JSON emitter can pass records through
//! unchanged. [`NormalizedAnnotation`] is the schema-resolved form produced
//! by the normalizer and consumed by exactly one emitter invocation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConvertError;

/// One unit of work: an image or text item with its data and annotations.
#[derive(Clone, Debug)]
pub struct Task {
    pub id: i64,
    /// Field name -> value (image URL/path, text, arbitrary metadata).
    pub data: BTreeMap<String, Value>,
    /// All submissions for this task, in export order.
    pub annotations: Vec<Annotation>,
    /// The unmodified record, kept for pass-through JSON output.
    pub raw: Value,
}

/// One annotator submission containing one or more results.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Annotation {
    #[serde(default, alias = "result")]
    pub result: Vec<RawResult>,
    #[serde(default)]
    pub was_cancelled: bool,
}

/// One typed judgment inside an annotation, still schema-unresolved.
#[derive(Clone, Debug, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub from_name: String,
    #[serde(default)]
    pub to_name: String,
    #[serde(default, rename = "type")]
    pub result_type: Option<String>,
    #[serde(default)]
    pub original_width: Option<u32>,
    #[serde(default)]
    pub original_height: Option<u32>,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    data: BTreeMap<String, Value>,
    #[serde(default)]
    annotations: Option<Vec<Annotation>>,
    /// Legacy key used by older exports; same shape as `annotations`.
    #[serde(default)]
    completions: Option<Vec<Annotation>>,
}

impl Task {
    /// Parse one raw record. `fallback_id` is used when the record carries no
    /// id of its own (common for per-file exports, where the file name is the
    /// only identity).
    pub fn from_value(raw: Value, fallback_id: i64) -> Result<Task, serde_json::Error> {
        let parsed: RawTask = serde_json::from_value(raw.clone())?;
        let annotations = parsed
            .annotations
            .or(parsed.completions)
            .unwrap_or_default();

        Ok(Task {
            id: parsed.id.unwrap_or(fallback_id),
            data: parsed.data,
            annotations,
            raw,
        })
    }

    /// The first string-valued data field, used when an emitter needs "the"
    /// subject of the task and the schema gave no data key.
    pub fn first_string_field(&self) -> Option<&str> {
        self.data.values().find_map(Value::as_str)
    }

    /// String value of a named data field.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// An axis-aligned box in absolute pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PixelBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl PixelBox {
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// The schema-resolved payload of one result.
#[derive(Clone, Debug, PartialEq)]
pub enum NormalizedValue {
    /// Classification choices.
    Choices { labels: BTreeSet<String> },
    /// Bounding box in percent of image size, top-left origin.
    Rectangle {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        rotation: f64,
        labels: BTreeSet<String>,
    },
    /// Closed polygon, vertices in percent of image size.
    Polygon {
        points: Vec<(f64, f64)>,
        labels: BTreeSet<String>,
    },
    /// RLE-compressed brush mask (see [`crate::brush`] for the wire format).
    BrushMask {
        rle: Vec<u8>,
        labels: BTreeSet<String>,
    },
    /// Labeled character span into the task text.
    Span {
        start: usize,
        end: usize,
        labels: BTreeSet<String>,
    },
}

/// One fully resolved annotation, ready for emission.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedAnnotation {
    /// Control tag that produced this result.
    pub from_name: String,
    /// Object tag the result annotates.
    pub to_name: String,
    /// Task-data field the annotated object reads from, when the schema knows it.
    pub data_key: Option<String>,
    /// Image dimensions recorded on the result, when present.
    pub original_size: Option<(u32, u32)>,
    pub value: NormalizedValue,
}

impl NormalizedAnnotation {
    /// All labels attached to this annotation, sorted.
    pub fn labels(&self) -> &BTreeSet<String> {
        match &self.value {
            NormalizedValue::Choices { labels }
            | NormalizedValue::Rectangle { labels, .. }
            | NormalizedValue::Polygon { labels, .. }
            | NormalizedValue::BrushMask { labels, .. }
            | NormalizedValue::Span { labels, .. } => labels,
        }
    }

    /// True for results whose emission needs absolute pixel coordinates.
    pub fn needs_geometry(&self) -> bool {
        matches!(
            self.value,
            NormalizedValue::Rectangle { .. }
                | NormalizedValue::Polygon { .. }
                | NormalizedValue::BrushMask { .. }
        )
    }
}

/// Derive a bare file name from an image reference (URL or path).
///
/// Query strings, fragments, and directory prefixes are stripped.
pub fn image_basename(reference: &str) -> Option<String> {
    let no_query = reference.split('?').next().unwrap_or(reference);
    let no_fragment = no_query.split('#').next().unwrap_or(no_query);
    let normalized = no_fragment.replace('\\', "/");
    let candidate = normalized.rsplit('/').next()?;
    if candidate.is_empty() {
        return None;
    }
    Some(candidate.to_string())
}

/// Parse tasks out of an aggregate export value (array of records or a
/// single record).
pub fn tasks_from_value(root: Value, path: &Path) -> Result<Vec<Task>, ConvertError> {
    let records = match root {
        Value::Array(records) => records,
        single @ Value::Object(_) => vec![single],
        other => {
            return Err(ConvertError::TaskParse {
                path: path.to_path_buf(),
                source: serde::de::Error::custom(format!(
                    "expected a task object or an array of tasks, got {}",
                    json_type_name(&other)
                )),
            })
        }
    };

    let mut tasks = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        let task =
            Task::from_value(record, idx as i64).map_err(|source| ConvertError::TaskParse {
                path: path.to_path_buf(),
                source,
            })?;
        tasks.push(task);
    }

    Ok(tasks)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_parses_annotations_key() {
        let raw = json!({
            "id": 3,
            "data": {"image": "img.jpg"},
            "annotations": [{"result": [], "was_cancelled": true}]
        });

        let task = Task::from_value(raw, 0).expect("parse task");
        assert_eq!(task.id, 3);
        assert_eq!(task.annotations.len(), 1);
        assert!(task.annotations[0].was_cancelled);
    }

    #[test]
    fn task_parses_legacy_completions_key() {
        let raw = json!({
            "data": {"text": "hello"},
            "completions": [{"result": [{"from_name": "ner", "to_name": "text",
                                          "value": {"start": 0, "end": 5, "labels": ["X"]}}]}]
        });

        let task = Task::from_value(raw, 42).expect("parse task");
        assert_eq!(task.id, 42);
        assert_eq!(task.annotations[0].result.len(), 1);
        assert_eq!(task.annotations[0].result[0].from_name, "ner");
    }

    #[test]
    fn image_basename_strips_url_parts() {
        assert_eq!(
            image_basename("https://host/a/b/img.jpg?sig=1#frag"),
            Some("img.jpg".to_string())
        );
        assert_eq!(image_basename("plain.png"), Some("plain.png".to_string()));
        assert_eq!(image_basename("dir/"), None);
    }

    #[test]
    fn tasks_from_value_accepts_single_object() {
        let tasks = tasks_from_value(json!({"data": {}}), Path::new("x.json")).expect("parse");
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn tasks_from_value_rejects_scalars() {
        let err = tasks_from_value(json!(5), Path::new("x.json")).expect_err("expected error");
        assert!(matches!(err, ConvertError::TaskParse { .. }));
    }
}
