//! Conversion facade.
//!
//! A [`Converter`] binds one parsed labeling config to the annotation policy
//! and image resolution settings for a run, then exposes one entry point per
//! target format. Every entry point streams tasks from the input root and
//! returns the run's [`EmissionReport`].

use std::path::{Path, PathBuf};

use crate::brush;
use crate::error::ConvertError;
use crate::export::csv::{write_csv, CsvOptions};
use crate::export::{coco::write_coco, conll::write_conll, json::write_json, voc::write_voc};
use crate::fetch::LocalImageFetcher;
use crate::normalize::{AnnotationPolicy, NormalizeOptions};
use crate::report::EmissionReport;
use crate::schema::SchemaIndex;
use crate::source::{iter_tasks, TaskStream};

/// Run-level settings shared by all target formats.
#[derive(Clone, Debug, Default)]
pub struct ConvertOptions {
    /// Which annotator submissions each task contributes.
    pub policy: AnnotationPolicy,
    /// Project root that local image references resolve against.
    pub project_dir: Option<PathBuf>,
}

/// One labeling config, ready to convert task streams.
pub struct Converter {
    index: SchemaIndex,
    normalize: NormalizeOptions,
    fetcher: LocalImageFetcher,
}

impl Converter {
    /// Parse `config_xml` and bind it to `options`.
    pub fn new(config_xml: &str, options: ConvertOptions) -> Result<Self, ConvertError> {
        Ok(Converter {
            index: SchemaIndex::build(config_xml)?,
            normalize: NormalizeOptions {
                policy: options.policy,
            },
            fetcher: LocalImageFetcher::new(options.project_dir),
        })
    }

    /// The parsed schema behind this converter.
    pub fn schema(&self) -> &SchemaIndex {
        &self.index
    }

    /// Stream the tasks under `input` without converting them.
    pub fn iter_from_json(&self, input: &Path) -> Result<TaskStream, ConvertError> {
        iter_tasks(input)
    }

    /// Re-emit the tasks under `input` as one aggregate JSON array.
    pub fn convert_to_json(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<EmissionReport, ConvertError> {
        write_json(iter_tasks(input)?, &self.index, &self.normalize, output)
    }

    /// Flatten the tasks under `input` into one CSV file.
    pub fn convert_to_csv(
        &self,
        input: &Path,
        output: &Path,
        csv_options: &CsvOptions,
    ) -> Result<EmissionReport, ConvertError> {
        write_csv(
            iter_tasks(input)?,
            &self.index,
            &self.normalize,
            csv_options,
            output,
        )
    }

    /// Write the labeled text spans under `input` as CoNLL-2003 BIO rows.
    pub fn convert_to_conll2003(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<EmissionReport, ConvertError> {
        write_conll(iter_tasks(input)?, &self.index, &self.normalize, output)
    }

    /// Write the geometry under `input` as one COCO JSON file.
    ///
    /// With `image_dir` set, locally resolvable source images are copied
    /// there as well.
    pub fn convert_to_coco(
        &self,
        input: &Path,
        output: &Path,
        image_dir: Option<&Path>,
    ) -> Result<EmissionReport, ConvertError> {
        write_coco(
            iter_tasks(input)?,
            &self.index,
            &self.normalize,
            &self.fetcher,
            output,
            image_dir,
        )
    }

    /// Write the geometry under `input` as a directory of Pascal VOC XML
    /// files, one per image.
    pub fn convert_to_voc(
        &self,
        input: &Path,
        output_dir: &Path,
        image_dir: Option<&Path>,
    ) -> Result<EmissionReport, ConvertError> {
        write_voc(
            iter_tasks(input)?,
            &self.index,
            &self.normalize,
            &self.fetcher,
            output_dir,
            image_dir,
        )
    }

    /// Decode every brush mask under `input` into a PNG raster per result.
    pub fn convert_to_brush_png(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<EmissionReport, ConvertError> {
        let mut unreadable = Vec::new();
        let tasks: Vec<_> = iter_tasks(input)?
            .filter_map(|task| match task {
                Ok(task) => Some(task),
                Err(err) => {
                    unreadable.push(err.to_string());
                    None
                }
            })
            .collect();

        let mut report = brush::export_masks(tasks, output_dir)?;
        for reason in unreadable {
            report.tasks_total += 1;
            report.skip_task(-1, format!("unreadable task record: {reason}"));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONFIG: &str = r#"
<View>
  <Image name="image" value="$image"/>
  <RectangleLabels name="bbox" toName="image">
    <Label value="Car"/>
  </RectangleLabels>
</View>"#;

    #[test]
    fn invalid_config_fails_construction() {
        let err = Converter::new("<View", ConvertOptions::default())
            .err()
            .expect("expected config error");
        assert!(matches!(err, ConvertError::Config(_)));
    }

    #[test]
    fn json_conversion_counts_tasks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("export.json");
        let output = dir.path().join("out.json");
        std::fs::write(
            &input,
            json!([
                {"id": 1, "data": {"image": "a.jpg"}, "annotations": []},
                {"id": 2, "data": {"image": "b.jpg"}, "annotations": []}
            ])
            .to_string(),
        )
        .expect("write export");

        let converter = Converter::new(CONFIG, ConvertOptions::default()).expect("converter");
        let report = converter.convert_to_json(&input, &output).expect("convert");
        assert_eq!(report.tasks_total, 2);
        assert_eq!(report.tasks_skipped, 0);
    }

    #[test]
    fn missing_input_root_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let converter = Converter::new(CONFIG, ConvertOptions::default()).expect("converter");
        let err = converter
            .convert_to_json(Path::new("/nonexistent/export.json"), &dir.path().join("o.json"))
            .err()
            .expect("expected error");
        assert!(matches!(err, ConvertError::Io(_)));
    }
}
