//! CoNLL-2003 emitter for labeled text spans.
//!
//! Task text is tokenized into alphanumeric runs and single punctuation
//! characters, then each token gets a BIO tag: `B-<label>` for the first
//! token of a span, `I-<label>` inside, `O` outside. Tokens covered by two
//! overlapping spans are a conflict; the task is skipped with a warning
//! rather than silently letting the first writer win. One blank line
//! separates tasks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::ConvertError;
use crate::export::{create_parent_dirs, drive};
use crate::model::{NormalizedValue, Task};
use crate::normalize::NormalizeOptions;
use crate::report::EmissionReport;
use crate::schema::SchemaIndex;

/// A token with character offsets into the source text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// Character (not byte) offset of the first character.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
}

/// Split text into alphanumeric runs and single punctuation tokens.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current: Option<Token> = None;

    for (idx, ch) in text.chars().enumerate() {
        if ch.is_alphanumeric() {
            match &mut current {
                Some(token) => {
                    token.text.push(ch);
                    token.end = idx + 1;
                }
                None => {
                    current = Some(Token {
                        text: ch.to_string(),
                        start: idx,
                        end: idx + 1,
                    });
                }
            }
        } else {
            if let Some(token) = current.take() {
                tokens.push(token);
            }
            if !ch.is_whitespace() {
                tokens.push(Token {
                    text: ch.to_string(),
                    start: idx,
                    end: idx + 1,
                });
            }
        }
    }

    if let Some(token) = current {
        tokens.push(token);
    }

    tokens
}

struct LabeledSpan {
    start: usize,
    end: usize,
    label: String,
}

/// Assign one BIO tag per token.
///
/// Fails with [`ConvertError::Conflict`] when two spans cover the same token.
fn bio_tags(
    task_id: i64,
    tokens: &[Token],
    spans: &[LabeledSpan],
) -> Result<Vec<String>, ConvertError> {
    let mut tags = Vec::with_capacity(tokens.len());
    let mut began: Vec<bool> = vec![false; spans.len()];

    for token in tokens {
        let mut covering = spans
            .iter()
            .enumerate()
            .filter(|(_, span)| token.start >= span.start && token.end <= span.end);

        let tag = match covering.next() {
            None => "O".to_string(),
            Some((idx, span)) => {
                if let Some((_, other)) = covering.next() {
                    return Err(ConvertError::Conflict {
                        task_id,
                        token: token.text.clone(),
                        left: span.label.clone(),
                        right: other.label.clone(),
                    });
                }
                let prefix = if began[idx] { "I" } else { "B" };
                began[idx] = true;
                format!("{prefix}-{}", span.label)
            }
        };
        tags.push(tag);
    }

    Ok(tags)
}

/// Write the task stream as one CoNLL-2003 file at `output`.
pub fn write_conll<I>(
    stream: I,
    index: &SchemaIndex,
    options: &NormalizeOptions,
    output: &Path,
) -> Result<EmissionReport, ConvertError>
where
    I: Iterator<Item = Result<Task, ConvertError>>,
{
    let mut report = EmissionReport::default();

    create_parent_dirs(output)?;
    let file = File::create(output)?;
    let mut writer = BufWriter::new(file);
    let mut io_error: Option<std::io::Error> = None;

    drive(stream, index, options, &mut report, |task, annotations, report| {
        let spans: Vec<LabeledSpan> = annotations
            .iter()
            .filter_map(|ann| match &ann.value {
                NormalizedValue::Span { start, end, labels } => Some(LabeledSpan {
                    start: *start,
                    end: *end,
                    label: labels
                        .iter()
                        .next()
                        .cloned()
                        .unwrap_or_else(|| "MISC".to_string()),
                }),
                _ => None,
            })
            .collect();

        let text = annotations
            .iter()
            .find_map(|ann| ann.data_key.as_deref())
            .and_then(|key| task.data_str(key))
            .or_else(|| task.first_string_field());

        let Some(text) = text else {
            report.skip_task(task.id, "task has no text field");
            return Ok(());
        };

        let tokens = tokenize(text);
        let tags = bio_tags(task.id, &tokens, &spans)?;

        for (token, tag) in tokens.iter().zip(&tags) {
            if let Err(err) = writeln!(writer, "{} -X- _ {}", token.text, tag) {
                io_error = Some(err);
                break;
            }
        }
        if io_error.is_none() {
            if let Err(err) = writeln!(writer) {
                io_error = Some(err);
            }
        }
        match io_error.take() {
            Some(err) => Err(ConvertError::Io(err)),
            None => Ok(()),
        }
    })?;

    writer
        .flush()
        .map_err(|err| ConvertError::write("conll", output, err.to_string()))?;

    Ok(report)
}
