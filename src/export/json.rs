//! Pass-through JSON emitter.
//!
//! The lowest-complexity target: task records are written back out as one
//! aggregate array, unchanged in essence. Tasks still run through the
//! normalizer so schema mismatches surface as warnings, which makes this
//! format double as a validation pass over an export.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::ConvertError;
use crate::export::{create_parent_dirs, drive};
use crate::model::Task;
use crate::normalize::NormalizeOptions;
use crate::report::EmissionReport;
use crate::schema::SchemaIndex;

/// Write every task of `stream` into one aggregate JSON array at `output`.
pub fn write_json<I>(
    stream: I,
    index: &SchemaIndex,
    options: &NormalizeOptions,
    output: &Path,
) -> Result<EmissionReport, ConvertError>
where
    I: Iterator<Item = Result<Task, ConvertError>>,
{
    let mut report = EmissionReport::default();
    let mut records = Vec::new();

    drive(stream, index, options, &mut report, |task, _, _| {
        records.push(task.raw.clone());
        Ok(())
    })?;

    create_parent_dirs(output)?;
    let file = File::create(output)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &records)
        .map_err(|source| ConvertError::write("json", output, source.to_string()))?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tasks_from_value;
    use serde_json::json;

    #[test]
    fn json_output_preserves_raw_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out.json");

        let raw = json!([
            {"id": 1, "data": {"image": "a.jpg"}, "annotations": [],
             "meta": {"custom": true}},
            {"id": 2, "data": {"image": "b.jpg"}, "annotations": []}
        ]);
        let tasks = tasks_from_value(raw.clone(), Path::new("<test>")).expect("parse");
        let index = SchemaIndex::build("<View/>").expect("empty schema");

        let report = write_json(
            tasks.into_iter().map(Ok),
            &index,
            &NormalizeOptions::default(),
            &output,
        )
        .expect("write json");

        assert_eq!(report.tasks_total, 2);
        assert_eq!(report.tasks_skipped, 0);

        let restored: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).expect("read output"))
                .expect("parse output");
        assert_eq!(restored, raw);
    }
}
