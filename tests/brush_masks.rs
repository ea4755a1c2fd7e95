//! End-to-end brush mask PNG export.

use serde_json::json;

use lsconv::brush::{encode, label_color, MaskGrid};
use lsconv::{ConvertOptions, Converter};

const CONFIG: &str = r#"
<View>
  <Image name="image" value="$image"/>
  <BrushLabels name="mask" toName="image">
    <Label value="Tumor"/>
  </BrushLabels>
</View>"#;

#[test]
fn each_brush_result_becomes_one_png() {
    let mut grid = MaskGrid::new(8, 4);
    grid.set(2, 1, true);
    grid.set(3, 1, true);
    let rle = encode(&grid);

    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("export.json");
    let output = dir.path().join("masks");
    std::fs::write(
        &input,
        json!([
            {"id": 7, "data": {"image": "scan.jpg"},
             "annotations": [{"result": [
                {"from_name": "mask", "to_name": "image", "type": "brushlabels",
                 "original_width": 8, "original_height": 4,
                 "value": {"rle": rle, "brushlabels": ["Tumor"]}}]}]}
        ])
        .to_string(),
    )
    .expect("write export");

    let converter = Converter::new(CONFIG, ConvertOptions::default()).expect("converter");
    let report = converter
        .convert_to_brush_png(&input, &output)
        .expect("convert");

    assert_eq!(report.tasks_total, 1);
    assert_eq!(report.tasks_skipped, 0);

    let path = output.join("task-7-mask-0-Tumor.png");
    let raster = image::open(&path).expect("open png").to_rgba8();
    assert_eq!(raster.dimensions(), (8, 4));

    let [r, g, b] = label_color("Tumor");
    assert_eq!(raster.get_pixel(2, 1).0, [r, g, b, 255]);
    // Unset pixels are fully transparent.
    assert_eq!(raster.get_pixel(0, 0).0[3], 0);
}

#[test]
fn corrupt_rle_skips_the_result_with_a_warning() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("export.json");
    let output = dir.path().join("masks");
    std::fs::write(
        &input,
        json!([
            {"id": 1, "data": {"image": "scan.jpg"},
             "annotations": [{"result": [
                {"from_name": "mask", "to_name": "image", "type": "brushlabels",
                 "original_width": 8, "original_height": 4,
                 "value": {"rle": [0, 0], "brushlabels": ["Tumor"]}}]}]}
        ])
        .to_string(),
    )
    .expect("write export");

    let converter = Converter::new(CONFIG, ConvertOptions::default()).expect("converter");
    let report = converter
        .convert_to_brush_png(&input, &output)
        .expect("convert");

    assert_eq!(report.tasks_total, 1);
    assert_eq!(report.tasks_skipped, 1);
    assert!(!report.warnings.is_empty());
}
