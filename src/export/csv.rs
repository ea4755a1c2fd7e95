//! CSV emitter.
//!
//! Every data field and control tag seen anywhere in the task stream becomes
//! a column, ordered by first appearance across tasks so repeated runs
//! produce identical headers. Rows are buffered during streaming and written
//! in the finalize step, once the full column set is known; a task missing a
//! field gets an empty cell, never a dropped row.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde_json::Value;

use crate::error::ConvertError;
use crate::export::{create_parent_dirs, drive};
use crate::model::Task;
use crate::normalize::NormalizeOptions;
use crate::report::EmissionReport;
use crate::schema::SchemaIndex;

/// Output options for the CSV emitter.
#[derive(Clone, Copy, Debug)]
pub struct CsvOptions {
    /// Field separator byte.
    pub separator: u8,
    /// Whether to emit the header row.
    pub header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            separator: b',',
            header: true,
        }
    }
}

/// Flatten the task stream into one CSV file at `output`.
pub fn write_csv<I>(
    stream: I,
    index: &SchemaIndex,
    options: &NormalizeOptions,
    csv_options: &CsvOptions,
    output: &Path,
) -> Result<EmissionReport, ConvertError>
where
    I: Iterator<Item = Result<Task, ConvertError>>,
{
    let mut report = EmissionReport::default();
    let mut columns: Vec<String> = vec!["id".to_string()];
    let mut rows: Vec<BTreeMap<String, String>> = Vec::new();

    drive(stream, index, options, &mut report, |task, annotations, _| {
        let mut row = BTreeMap::new();
        row.insert("id".to_string(), task.id.to_string());

        for (key, value) in &task.data {
            note_column(&mut columns, key);
            row.insert(key.clone(), cell_text(value));
        }

        for annotation in annotations {
            note_column(&mut columns, &annotation.from_name);
            let joined = annotation
                .labels()
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(",");
            // Two results from the same control tag merge into one cell.
            row.entry(annotation.from_name.clone())
                .and_modify(|existing| {
                    if !joined.is_empty() {
                        if !existing.is_empty() {
                            existing.push(',');
                        }
                        existing.push_str(&joined);
                    }
                })
                .or_insert(joined);
        }

        rows.push(row);
        Ok(())
    })?;

    create_parent_dirs(output)?;
    let file = File::create(output)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(csv_options.separator)
        .has_headers(false)
        .from_writer(BufWriter::new(file));

    if csv_options.header {
        writer
            .write_record(&columns)
            .map_err(|err| ConvertError::write("csv", output, err.to_string()))?;
    }

    for row in rows {
        let record: Vec<&str> = columns
            .iter()
            .map(|column| row.get(column).map(String::as_str).unwrap_or(""))
            .collect();
        writer
            .write_record(&record)
            .map_err(|err| ConvertError::write("csv", output, err.to_string()))?;
    }

    writer
        .flush()
        .map_err(|err| ConvertError::write("csv", output, err.to_string()))?;

    Ok(report)
}

fn note_column(columns: &mut Vec<String>, name: &str) {
    if !columns.iter().any(|existing| existing == name) {
        columns.push(name.to_string());
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tasks_from_value;
    use serde_json::json;

    fn index() -> SchemaIndex {
        SchemaIndex::build(
            r#"
<View>
  <Image name="image" value="$image"/>
  <Choices name="sentiment" toName="image">
    <Choice value="pos"/><Choice value="neg"/>
  </Choices>
</View>"#,
        )
        .expect("schema")
    }

    fn run(tasks: serde_json::Value, csv_options: &CsvOptions) -> String {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out.csv");
        let tasks = tasks_from_value(tasks, Path::new("<test>")).expect("parse");

        write_csv(
            tasks.into_iter().map(Ok),
            &index(),
            &NormalizeOptions::default(),
            csv_options,
            &output,
        )
        .expect("write csv");

        std::fs::read_to_string(&output).expect("read csv")
    }

    #[test]
    fn columns_follow_first_seen_order_with_empty_cells() {
        let text = run(
            json!([
                {"id": 1, "data": {"image": "a.jpg"},
                 "annotations": [{"result": [
                    {"from_name": "sentiment", "to_name": "image",
                     "value": {"choices": ["pos"]}}]}]},
                {"id": 2, "data": {"image": "b.jpg", "note": "extra"},
                 "annotations": []}
            ]),
            &CsvOptions::default(),
        );

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id,image,sentiment,note"));
        assert_eq!(lines.next(), Some("1,a.jpg,pos,"));
        assert_eq!(lines.next(), Some("2,b.jpg,,extra"));
    }

    #[test]
    fn separator_and_header_are_configurable() {
        let text = run(
            json!([{"id": 1, "data": {"image": "a.jpg"}, "annotations": []}]),
            &CsvOptions {
                separator: b'\t',
                header: false,
            },
        );

        assert_eq!(text, "1\ta.jpg\n");
    }

    #[test]
    fn multiple_choices_join_sorted_in_one_cell() {
        let text = run(
            json!([
                {"id": 1, "data": {"image": "a.jpg"},
                 "annotations": [{"result": [
                    {"from_name": "sentiment", "to_name": "image",
                     "value": {"choices": ["neg", "pos"]}}]}]}
            ]),
            &CsvOptions::default(),
        );

        assert!(text.contains("\"neg,pos\"") || text.contains("neg,pos"));
    }
}
