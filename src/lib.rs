//! lsconv: convert annotation exports into training-ready datasets.
//!
//! An export is a set of task records (JSON), each pairing raw data fields
//! with annotator results. Which result shapes exist is not fixed by the
//! export itself but by the project's labeling config, an XML tree of control
//! tags. lsconv parses that config once into a [`SchemaIndex`], resolves
//! every result against it, and emits one of several dataset formats:
//! aggregate JSON, flat CSV, CoNLL-2003 BIO rows, COCO JSON, Pascal VOC XML,
//! or per-result brush mask PNGs.
//!
//! # Modules
//!
//! - [`schema`]: labeling config parsing and the control tag index
//! - [`model`] / [`normalize`]: task records and their typed annotation forms
//! - [`source`]: task streams from aggregate files or directories
//! - [`export`]: one emitter per target format
//! - [`brush`]: RLE mask codec and PNG rasterization
//! - [`convert`]: the [`Converter`] facade tying the above together
//!
//! # Deterministic Output
//!
//! Repeated runs over identical input produce byte-identical output: task
//! order follows the source (sorted file paths for directories), ids and CSV
//! columns follow first appearance, label sets are sorted, and mask colors
//! are a pure function of the label text.

pub mod brush;
pub mod convert;
pub mod error;
pub mod export;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod report;
pub mod schema;
pub mod source;

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};

pub use convert::{ConvertOptions, Converter};
pub use error::ConvertError;
pub use export::csv::CsvOptions;
pub use normalize::AnnotationPolicy;
pub use report::EmissionReport;
pub use schema::SchemaIndex;

/// The lsconv CLI application.
#[derive(Parser)]
#[command(name = "lsconv")]
#[command(version, author, about)]
struct Cli {
    /// Export file or directory of per-task JSON files.
    #[arg(short, long)]
    input: PathBuf,

    /// Labeling config XML file.
    #[arg(short, long)]
    config: PathBuf,

    /// Output file, or output directory for directory-shaped formats.
    #[arg(short, long)]
    output: PathBuf,

    /// Target format.
    #[arg(short, long, value_enum)]
    format: Format,

    /// CSV field separator (single ASCII character, or '\t').
    #[arg(long, default_value = ",")]
    csv_separator: String,

    /// Omit the CSV header row.
    #[arg(long)]
    csv_no_header: bool,

    /// Copy locally resolvable source images into this directory (coco, voc).
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Project root that local image references resolve against.
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Which annotator submissions each task contributes.
    #[arg(long, value_enum, default_value = "first")]
    policy: Policy,
}

/// Supported target formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    /// Aggregate JSON array, records unchanged.
    Json,
    /// One flat CSV row per task.
    Csv,
    /// CoNLL-2003 BIO rows for labeled text spans.
    Conll2003,
    /// One COCO JSON file (plus optional image copies).
    Coco,
    /// One Pascal VOC XML file per image.
    Voc,
    /// One PNG raster per brush mask result.
    BrushPng,
}

impl Format {
    fn default_file_name(self) -> Option<&'static str> {
        match self {
            Format::Json => Some("result.json"),
            Format::Csv => Some("result.csv"),
            Format::Conll2003 => Some("result.conll"),
            Format::Coco => Some("result.json"),
            // Directory-shaped outputs.
            Format::Voc | Format::BrushPng => None,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    /// First non-cancelled annotation per task.
    First,
    /// Every non-cancelled annotation.
    AllNonCancelled,
    /// Every annotation, cancelled ones included.
    All,
}

impl From<Policy> for AnnotationPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::First => AnnotationPolicy::FirstNonCancelled,
            Policy::AllNonCancelled => AnnotationPolicy::AllNonCancelled,
            Policy::All => AnnotationPolicy::All,
        }
    }
}

/// Run the lsconv CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), ConvertError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let config_xml = std::fs::read_to_string(&cli.config)?;
    let converter = Converter::new(
        &config_xml,
        ConvertOptions {
            policy: cli.policy.into(),
            project_dir: cli.project_dir.clone(),
        },
    )?;

    let output = resolve_output(&cli.output, cli.format);
    let image_dir = cli.image_dir.as_deref();

    let report = match cli.format {
        Format::Json => converter.convert_to_json(&cli.input, &output)?,
        Format::Csv => {
            let csv_options = CsvOptions {
                separator: parse_separator(&cli.csv_separator)?,
                header: !cli.csv_no_header,
            };
            converter.convert_to_csv(&cli.input, &output, &csv_options)?
        }
        Format::Conll2003 => converter.convert_to_conll2003(&cli.input, &output)?,
        Format::Coco => converter.convert_to_coco(&cli.input, &output, image_dir)?,
        Format::Voc => converter.convert_to_voc(&cli.input, &output, image_dir)?,
        Format::BrushPng => converter.convert_to_brush_png(&cli.input, &output)?,
    };

    print!("{report}");
    Ok(())
}

/// File formats given an existing directory write to a default file inside it.
fn resolve_output(output: &Path, format: Format) -> PathBuf {
    match format.default_file_name() {
        Some(file_name) if output.is_dir() => output.join(file_name),
        _ => output.to_path_buf(),
    }
}

fn parse_separator(raw: &str) -> Result<u8, ConvertError> {
    match raw {
        "\\t" | "\t" => Ok(b'\t'),
        s if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        other => Err(ConvertError::Config(format!(
            "csv separator must be one ASCII character, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_accepts_escaped_tab() {
        assert_eq!(parse_separator("\\t").ok(), Some(b'\t'));
        assert_eq!(parse_separator(";").ok(), Some(b';'));
        assert!(parse_separator("abc").is_err());
    }

    #[test]
    fn existing_directory_gets_default_file_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolved = resolve_output(dir.path(), Format::Csv);
        assert_eq!(resolved, dir.path().join("result.csv"));

        let explicit = dir.path().join("custom.csv");
        assert_eq!(resolve_output(&explicit, Format::Csv), explicit);

        // Directory-shaped formats keep the directory itself.
        assert_eq!(resolve_output(dir.path(), Format::Voc), dir.path());
    }
}
