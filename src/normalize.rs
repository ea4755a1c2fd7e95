//! Record normalizer: raw results -> typed annotations.
//!
//! Each raw result is resolved through the [`SchemaIndex`] exactly once;
//! emitters only ever see [`NormalizedAnnotation`] values and never inspect
//! result JSON themselves. Results that do not resolve, or whose value does
//! not match the schema-declared shape, are skipped with a soft warning --
//! partial schema mismatches are common with evolving configs.

use std::collections::BTreeSet;
use std::f64::consts::PI;

use serde::Deserialize;

use crate::model::{Annotation, NormalizedAnnotation, NormalizedValue, PixelBox, Task};
use crate::schema::{SchemaIndex, TagKind};

/// Which annotator submissions a run takes from each task.
///
/// The policy is named and stable on purpose: repeated runs over the same
/// input must produce the same output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnnotationPolicy {
    /// The first annotation in task order whose `was_cancelled` is false
    /// supplies all results for the task. Matches the behavior of exporting
    /// the submitted completion.
    #[default]
    FirstNonCancelled,
    /// Every non-cancelled annotation contributes results (one object per
    /// annotator in geometry formats).
    AllNonCancelled,
    /// Every annotation contributes, cancelled ones included.
    All,
}

/// Options for the normalizer.
#[derive(Clone, Copy, Debug, Default)]
pub struct NormalizeOptions {
    pub policy: AnnotationPolicy,
}

/// Resolve every selected result of `task` into normalized annotations.
///
/// Returns the annotations plus soft warnings for skipped results.
pub fn normalize(
    task: &Task,
    index: &SchemaIndex,
    options: &NormalizeOptions,
) -> (Vec<NormalizedAnnotation>, Vec<String>) {
    let mut normalized = Vec::new();
    let mut warnings = Vec::new();

    for annotation in select_annotations(&task.annotations, options.policy) {
        for result in &annotation.result {
            let Some(entry) = index.lookup(&result.from_name, &result.to_name) else {
                warnings.push(format!(
                    "task {}: result ({}, {}) matches no schema entry; skipped",
                    task.id, result.from_name, result.to_name
                ));
                continue;
            };

            let value = match parse_value(entry.kind, &result.value) {
                Ok(value) => value,
                Err(reason) => {
                    warnings.push(format!(
                        "task {}: {} result '{}' has invalid value ({reason}); skipped",
                        task.id,
                        entry.kind.name(),
                        entry.from_name
                    ));
                    continue;
                }
            };

            let original_size = match (result.original_width, result.original_height) {
                (Some(w), Some(h)) => Some((w, h)),
                _ => None,
            };

            normalized.push(NormalizedAnnotation {
                from_name: entry.from_name.clone(),
                to_name: entry.to_name.clone(),
                data_key: entry.data_key.clone(),
                original_size,
                value,
            });
        }
    }

    (normalized, warnings)
}

fn select_annotations(
    annotations: &[Annotation],
    policy: AnnotationPolicy,
) -> Vec<&Annotation> {
    match policy {
        AnnotationPolicy::FirstNonCancelled => annotations
            .iter()
            .find(|annotation| !annotation.was_cancelled)
            .into_iter()
            .collect(),
        AnnotationPolicy::AllNonCancelled => annotations
            .iter()
            .filter(|annotation| !annotation.was_cancelled)
            .collect(),
        AnnotationPolicy::All => annotations.iter().collect(),
    }
}

#[derive(Deserialize)]
struct ChoicesValue {
    choices: Vec<String>,
}

#[derive(Deserialize)]
struct RectangleValue {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    rotation: f64,
    #[serde(default)]
    rectanglelabels: Vec<String>,
}

#[derive(Deserialize)]
struct PolygonValue {
    points: Vec<[f64; 2]>,
    #[serde(default)]
    polygonlabels: Vec<String>,
}

#[derive(Deserialize)]
struct BrushValue {
    rle: Vec<u8>,
    #[serde(default)]
    brushlabels: Vec<String>,
}

#[derive(Deserialize)]
struct SpanValue {
    start: usize,
    end: usize,
    #[serde(default)]
    labels: Vec<String>,
}

fn parse_value(kind: TagKind, raw: &serde_json::Value) -> Result<NormalizedValue, String> {
    let value = match kind {
        TagKind::Choices => {
            let parsed: ChoicesValue = from_value(raw)?;
            NormalizedValue::Choices {
                labels: to_label_set(parsed.choices),
            }
        }
        TagKind::Rectangle => {
            let parsed: RectangleValue = from_value(raw)?;
            NormalizedValue::Rectangle {
                x: parsed.x,
                y: parsed.y,
                width: parsed.width,
                height: parsed.height,
                rotation: parsed.rotation,
                labels: to_label_set(parsed.rectanglelabels),
            }
        }
        TagKind::Polygon => {
            let parsed: PolygonValue = from_value(raw)?;
            NormalizedValue::Polygon {
                points: parsed.points.iter().map(|p| (p[0], p[1])).collect(),
                labels: to_label_set(parsed.polygonlabels),
            }
        }
        TagKind::BrushMask => {
            let parsed: BrushValue = from_value(raw)?;
            NormalizedValue::BrushMask {
                rle: parsed.rle,
                labels: to_label_set(parsed.brushlabels),
            }
        }
        TagKind::Labels => {
            let parsed: SpanValue = from_value(raw)?;
            if parsed.end < parsed.start {
                return Err(format!("span end {} before start {}", parsed.end, parsed.start));
            }
            NormalizedValue::Span {
                start: parsed.start,
                end: parsed.end,
                labels: to_label_set(parsed.labels),
            }
        }
    };

    Ok(value)
}

fn from_value<T: serde::de::DeserializeOwned>(raw: &serde_json::Value) -> Result<T, String> {
    serde_json::from_value(raw.clone()).map_err(|err| err.to_string())
}

fn to_label_set(labels: Vec<String>) -> BTreeSet<String> {
    labels.into_iter().collect()
}

/// Convert a percent-space rectangle to an absolute pixel box.
///
/// Rotated rectangles contribute the axis-aligned envelope of the box
/// rotated around its center.
pub fn rect_to_pixel_box(
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    rotation_deg: f64,
    image_width: u32,
    image_height: u32,
) -> PixelBox {
    let w = image_width as f64;
    let h = image_height as f64;

    let xmin = (x / 100.0) * w;
    let ymin = (y / 100.0) * h;
    let xmax = ((x + width) / 100.0) * w;
    let ymax = ((y + height) / 100.0) * h;

    if rotation_deg == 0.0 {
        return PixelBox {
            xmin,
            ymin,
            xmax,
            ymax,
        };
    }

    rotated_envelope(xmin, ymin, xmax, ymax, rotation_deg)
}

fn rotated_envelope(xmin: f64, ymin: f64, xmax: f64, ymax: f64, rotation_deg: f64) -> PixelBox {
    let theta = rotation_deg * (PI / 180.0);
    let cos_t = theta.cos();
    let sin_t = theta.sin();

    let cx = (xmin + xmax) / 2.0;
    let cy = (ymin + ymax) / 2.0;

    let corners = [(xmin, ymin), (xmax, ymin), (xmax, ymax), (xmin, ymax)];

    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for (x, y) in corners {
        let dx = x - cx;
        let dy = y - cy;
        let rx = cx + (dx * cos_t) - (dy * sin_t);
        let ry = cy + (dx * sin_t) + (dy * cos_t);

        min_x = min_x.min(rx);
        min_y = min_y.min(ry);
        max_x = max_x.max(rx);
        max_y = max_y.max(ry);
    }

    PixelBox {
        xmin: min_x,
        ymin: min_y,
        xmax: max_x,
        ymax: max_y,
    }
}

/// Convert percent-space polygon vertices to absolute pixels.
pub fn polygon_to_pixels(
    points: &[(f64, f64)],
    image_width: u32,
    image_height: u32,
) -> Vec<(f64, f64)> {
    let w = image_width as f64;
    let h = image_height as f64;
    points
        .iter()
        .map(|&(x, y)| ((x / 100.0) * w, (y / 100.0) * h))
        .collect()
}

/// Axis-aligned envelope of a pixel-space polygon.
pub fn polygon_envelope(points: &[(f64, f64)]) -> PixelBox {
    let mut bbox = PixelBox {
        xmin: f64::INFINITY,
        ymin: f64::INFINITY,
        xmax: f64::NEG_INFINITY,
        ymax: f64::NEG_INFINITY,
    };

    for &(x, y) in points {
        bbox.xmin = bbox.xmin.min(x);
        bbox.ymin = bbox.ymin.min(y);
        bbox.xmax = bbox.xmax.max(x);
        bbox.ymax = bbox.ymax.max(y);
    }

    bbox
}
