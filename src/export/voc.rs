//! Pascal VOC emitter.
//!
//! Writes one XML file per image task with the canonical `object`/`bndbox`
//! element schema in absolute pixels. When an image output directory is
//! configured, locally resolvable source images are copied there once;
//! already-exported files are reused on repeated runs.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::ConvertError;
use crate::export::{drive, task_image};
use crate::fetch::{export_image_bytes, ImageFetcher};
use crate::model::{NormalizedValue, PixelBox, Task};
use crate::normalize::{polygon_envelope, polygon_to_pixels, rect_to_pixel_box, NormalizeOptions};
use crate::report::EmissionReport;
use crate::schema::SchemaIndex;

struct VocObject {
    name: String,
    bbox: PixelBox,
}

/// Write the task stream as a directory of VOC XML files.
pub fn write_voc<I, F>(
    stream: I,
    index: &SchemaIndex,
    options: &NormalizeOptions,
    fetcher: &F,
    output_dir: &Path,
    image_dir: Option<&Path>,
) -> Result<EmissionReport, ConvertError>
where
    I: Iterator<Item = Result<Task, ConvertError>>,
    F: ImageFetcher,
{
    fs::create_dir_all(output_dir)?;
    let mut report = EmissionReport::default();

    let folder = image_dir
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .unwrap_or("images")
        .to_string();

    drive(stream, index, options, &mut report, |task, normalized, _| {
        let image = task_image(task, normalized, fetcher)?;

        if let (Some(dir), Some(resolved)) = (image_dir, &image.resolved) {
            export_image_bytes(resolved, dir, &image.file_name)?;
        }

        let mut objects = Vec::new();
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
                        objects.push(VocObject {
                            name: label.clone(),
                            bbox,
                        });
                    }
                }
                NormalizedValue::Polygon { points, labels } => {
                    let pixels = polygon_to_pixels(points, image.width, image.height);
                    let bbox = polygon_envelope(&pixels);
                    for label in labels {
                        objects.push(VocObject {
                            name: label.clone(),
                            bbox,
                        });
                    }
                }
                // Masks, choices, and spans have no VOC object representation.
                _ => {}
            }
        }

        let xml = render_voc_xml(&folder, &image.file_name, image.width, image.height, &objects);

        let stem = Path::new(&image.file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("task-{}", task.id));
        fs::write(output_dir.join(format!("{stem}.xml")), xml)?;
        Ok(())
    })?;

    Ok(report)
}

fn render_voc_xml(
    folder: &str,
    file_name: &str,
    width: u32,
    height: u32,
    objects: &[VocObject],
) -> String {
    let mut xml = String::new();

    writeln!(xml, "<?xml version=\"1.0\" encoding=\"utf-8\"?>").expect("write to string");
    writeln!(xml, "<annotation>").expect("write to string");
    writeln!(xml, "  <folder>{}</folder>", xml_escape(folder)).expect("write to string");
    writeln!(xml, "  <filename>{}</filename>", xml_escape(file_name)).expect("write to string");
    writeln!(xml, "  <size>").expect("write to string");
    writeln!(xml, "    <width>{width}</width>").expect("write to string");
    writeln!(xml, "    <height>{height}</height>").expect("write to string");
    writeln!(xml, "    <depth>3</depth>").expect("write to string");
    writeln!(xml, "  </size>").expect("write to string");

    for object in objects {
        writeln!(xml, "  <object>").expect("write to string");
        writeln!(xml, "    <name>{}</name>", xml_escape(&object.name)).expect("write to string");
        writeln!(xml, "    <pose>Unspecified</pose>").expect("write to string");
        writeln!(xml, "    <truncated>0</truncated>").expect("write to string");
        writeln!(xml, "    <difficult>0</difficult>").expect("write to string");
        writeln!(xml, "    <bndbox>").expect("write to string");
        writeln!(xml, "      <xmin>{}</xmin>", object.bbox.xmin.round() as i64)
            .expect("write to string");
        writeln!(xml, "      <ymin>{}</ymin>", object.bbox.ymin.round() as i64)
            .expect("write to string");
        writeln!(xml, "      <xmax>{}</xmax>", object.bbox.xmax.round() as i64)
            .expect("write to string");
        writeln!(xml, "      <ymax>{}</ymax>", object.bbox.ymax.round() as i64)
            .expect("write to string");
        writeln!(xml, "    </bndbox>").expect("write to string");
        writeln!(xml, "  </object>").expect("write to string");
    }

    writeln!(xml, "</annotation>").expect("write to string");
    xml
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_xml_has_canonical_layout() {
        let objects = vec![VocObject {
            name: "Car & Truck".to_string(),
            bbox: PixelBox {
                xmin: 20.0,
                ymin: 20.0,
                xmax: 80.0,
                ymax: 60.0,
            },
        }];
        let xml = render_voc_xml("images", "img.jpg", 200, 100, &objects);

        assert!(xml.contains("<filename>img.jpg</filename>"));
        assert!(xml.contains("<width>200</width>"));
        assert!(xml.contains("<name>Car &amp; Truck</name>"));
        assert!(xml.contains("<xmin>20</xmin>"));
        assert!(xml.contains("<ymax>60</ymax>"));

        // The result is well-formed XML.
        roxmltree::Document::parse(&xml).expect("well-formed output");
    }

    #[test]
    fn xml_without_objects_is_still_valid() {
        let xml = render_voc_xml("images", "empty.jpg", 10, 10, &[]);
        let doc = roxmltree::Document::parse(&xml).expect("well-formed output");
        assert_eq!(doc.root_element().tag_name().name(), "annotation");
    }
}
