//! COCO JSON emitter.
//!
//! Builds the three COCO collections in one pass over the task stream.
//! All ids are monotonic counters owned by the emitter instance: image ids
//! follow task order, category ids follow first-seen label order, annotation
//! ids follow emission order. Re-running on identical input therefore yields
//! byte-identical id assignments.
//!
//! Rectangles and polygons become `bbox`/`segmentation` entries in absolute
//! pixels; brush masks are decoded and re-encoded as uncompressed COCO RLE
//! (column-major counts).

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use crate::brush::{self, MaskGrid};
use crate::error::ConvertError;
use crate::export::{create_parent_dirs, drive, task_image};
use crate::fetch::{export_image_bytes, ImageFetcher};
use crate::model::{NormalizedValue, PixelBox, Task};
use crate::normalize::{polygon_envelope, polygon_to_pixels, rect_to_pixel_box, NormalizeOptions};
use crate::report::EmissionReport;
use crate::schema::SchemaIndex;

#[derive(Serialize)]
struct CocoImage {
    id: u64,
    file_name: String,
    width: u32,
    height: u32,
}

#[derive(Serialize)]
struct CocoCategory {
    id: u64,
    name: String,
}

#[derive(Serialize)]
struct CocoAnnotation {
    id: u64,
    image_id: u64,
    category_id: u64,
    /// `[x, y, width, height]`, absolute pixels, top-left origin.
    bbox: [f64; 4],
    area: f64,
    iscrowd: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    segmentation: Option<Segmentation>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Segmentation {
    /// One or more flattened `[x1, y1, x2, y2, ...]` rings.
    Polygons(Vec<Vec<f64>>),
    /// Uncompressed COCO RLE: column-major counts, starting with unset.
    Rle { counts: Vec<u32>, size: [u32; 2] },
}

#[derive(Serialize)]
struct CocoOutput {
    images: Vec<CocoImage>,
    categories: Vec<CocoCategory>,
    annotations: Vec<CocoAnnotation>,
}

/// Per-run id assignment for categories, in first-seen order.
#[derive(Default)]
struct CategoryTable {
    names: Vec<String>,
    by_name: HashMap<String, u64>,
}

impl CategoryTable {
    fn id_for(&mut self, name: &str) -> u64 {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.names.len() as u64;
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    fn into_categories(self) -> Vec<CocoCategory> {
        self.names
            .into_iter()
            .enumerate()
            .map(|(id, name)| CocoCategory {
                id: id as u64,
                name,
            })
            .collect()
    }
}

/// Write the task stream as one COCO JSON file at `output`.
///
/// When `image_dir` is given, locally resolvable source images are copied
/// there (existing files are reused, not re-copied).
pub fn write_coco<I, F>(
    stream: I,
    index: &SchemaIndex,
    options: &NormalizeOptions,
    fetcher: &F,
    output: &Path,
    image_dir: Option<&Path>,
) -> Result<EmissionReport, ConvertError>
where
    I: Iterator<Item = Result<Task, ConvertError>>,
    F: ImageFetcher,
{
    let mut report = EmissionReport::default();
    let mut images: Vec<CocoImage> = Vec::new();
    let mut categories = CategoryTable::default();
    let mut annotations: Vec<CocoAnnotation> = Vec::new();

    drive(stream, index, options, &mut report, |task, normalized, report| {
        let image = task_image(task, normalized, fetcher)?;
        let image_id = images.len() as u64;

        if let (Some(dir), Some(resolved)) = (image_dir, &image.resolved) {
            export_image_bytes(resolved, dir, &image.file_name)?;
        }

        let mut task_annotations = Vec::new();

        for annotation in normalized {
            match &annotation.value {
                NormalizedValue::Rectangle {
                    x,
                    y,
                    width,
                    height,
                    rotation,
                    labels,
                } => {
                    let bbox = rect_to_pixel_box(
                        *x, *y, *width, *height, *rotation, image.width, image.height,
                    );
                    for label in labels {
                        task_annotations.push(box_annotation(
                            image_id,
                            categories.id_for(label),
                            bbox,
                            None,
                            0,
                            bbox.area(),
                        ));
                    }
                }
                NormalizedValue::Polygon { points, labels } => {
                    let pixels = polygon_to_pixels(points, image.width, image.height);
                    let bbox = polygon_envelope(&pixels);
                    let ring: Vec<f64> =
                        pixels.iter().flat_map(|&(x, y)| [x, y]).collect();
                    let area = polygon_area(&pixels);
                    for label in labels {
                        task_annotations.push(box_annotation(
                            image_id,
                            categories.id_for(label),
                            bbox,
                            Some(Segmentation::Polygons(vec![ring.clone()])),
                            0,
                            area,
                        ));
                    }
                }
                NormalizedValue::BrushMask { rle, labels } => {
                    let grid = match brush::decode(rle, image.width, image.height) {
                        Ok(grid) => grid,
                        Err(err) => {
                            report.warn(format!(
                                "task {}: brush result '{}': {err}; result skipped",
                                task.id, annotation.from_name
                            ));
                            continue;
                        }
                    };
                    let Some(bbox) = mask_envelope(&grid) else {
                        continue; // empty mask, nothing to emit
                    };
                    let counts = column_major_counts(&grid);
                    for label in labels {
                        task_annotations.push(box_annotation(
                            image_id,
                            categories.id_for(label),
                            bbox,
                            Some(Segmentation::Rle {
                                counts: counts.clone(),
                                size: [grid.height, grid.width],
                            }),
                            1,
                            grid.area() as f64,
                        ));
                    }
                }
                NormalizedValue::Choices { .. } | NormalizedValue::Span { .. } => {
                    // Not representable in COCO; ignored by design of the format.
                }
            }
        }

        images.push(CocoImage {
            id: image_id,
            file_name: image.file_name,
            width: image.width,
            height: image.height,
        });
        annotations.extend(task_annotations);
        Ok(())
    })?;

    // Assign annotation ids in final emission order.
    let annotations = annotations
        .into_iter()
        .enumerate()
        .map(|(id, annotation)| CocoAnnotation {
            id: id as u64,
            ..annotation
        })
        .collect();

    let coco = CocoOutput {
        images,
        categories: categories.into_categories(),
        annotations,
    };

    create_parent_dirs(output)?;
    let file = File::create(output)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &coco)
        .map_err(|source| ConvertError::write("coco", output, source.to_string()))?;

    Ok(report)
}

fn box_annotation(
    image_id: u64,
    category_id: u64,
    bbox: PixelBox,
    segmentation: Option<Segmentation>,
    iscrowd: u8,
    area: f64,
) -> CocoAnnotation {
    CocoAnnotation {
        id: 0, // assigned after streaming
        image_id,
        category_id,
        bbox: [bbox.xmin, bbox.ymin, bbox.width(), bbox.height()],
        area,
        iscrowd,
        segmentation,
    }
}

/// Shoelace area of a pixel-space polygon.
fn polygon_area(points: &[(f64, f64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for i in 0..points.len() {
        let (x1, y1) = points[i];
        let (x2, y2) = points[(i + 1) % points.len()];
        twice_area += x1 * y2 - x2 * y1;
    }
    (twice_area / 2.0).abs()
}

/// Tight pixel bounds of the set region, or `None` for an empty mask.
fn mask_envelope(grid: &MaskGrid) -> Option<PixelBox> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for y in 0..grid.height {
        for x in 0..grid.width {
            if grid.get(x, y) {
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
    }
    bounds.map(|(x0, y0, x1, y1)| PixelBox {
        xmin: x0 as f64,
        ymin: y0 as f64,
        xmax: (x1 + 1) as f64,
        ymax: (y1 + 1) as f64,
    })
}

/// COCO uncompressed RLE counts: column-major scan, first run counts unset
/// pixels.
fn column_major_counts(grid: &MaskGrid) -> Vec<u32> {
    let mut counts = Vec::new();
    let mut expect = false;
    let mut run = 0u32;

    for x in 0..grid.width {
        for y in 0..grid.height {
            if grid.get(x, y) == expect {
                run += 1;
            } else {
                counts.push(run);
                expect = !expect;
                run = 1;
            }
        }
    }
    counts.push(run);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_area_of_unit_right_triangle() {
        let area = polygon_area(&[(0.0, 0.0), (4.0, 0.0), (0.0, 3.0)]);
        assert!((area - 6.0).abs() < 1e-9);
    }

    #[test]
    fn column_major_counts_alternate_from_unset() {
        // 2x2 grid, only (x=0, y=1) set. Column-major order: (0,0) (0,1) (1,0) (1,1).
        let mut grid = MaskGrid::new(2, 2);
        grid.set(0, 1, true);
        assert_eq!(column_major_counts(&grid), vec![1, 1, 2]);
    }

    #[test]
    fn column_major_counts_sum_to_pixel_count() {
        let mut grid = MaskGrid::new(5, 3);
        grid.set(4, 2, true);
        let counts = column_major_counts(&grid);
        assert_eq!(counts.iter().sum::<u32>(), 15);
    }

    #[test]
    fn mask_envelope_is_tight() {
        let mut grid = MaskGrid::new(10, 10);
        grid.set(2, 3, true);
        grid.set(5, 7, true);
        let bbox = mask_envelope(&grid).expect("non-empty mask");
        assert_eq!((bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax), (2.0, 3.0, 6.0, 8.0));
    }

    #[test]
    fn empty_mask_has_no_envelope() {
        assert!(mask_envelope(&MaskGrid::new(4, 4)).is_none());
    }
}
