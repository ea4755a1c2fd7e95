//! Brush-mask codec: packed RLE bitstreams and PNG rasters.
//!
//! # Wire format
//!
//! A brush result stores its pixel mask as a compact run-length encoding so
//! the export JSON never carries a dense pixel grid. The byte stream is an
//! MSB-first bitstream:
//!
//! - a 32-bit header holding the total pixel count (`width * height`),
//! - then alternating runs, starting with an *unset* run (length 0 when the
//!   mask begins with a set pixel). Each run is a 2-bit width class selecting
//!   a 4-, 8-, 16-, or 32-bit run-length field, followed by that many bits.
//!
//! Runs freely span byte boundaries; the trailing partial byte is padded with
//! zero bits. Decoding must land exactly on the header's pixel count and the
//! header must match the caller's `width * height`, otherwise the stream is
//! rejected with [`ConvertError::MaskDecode`].
//!
//! # Rasters
//!
//! [`write_mask_png`] renders a decoded mask as an RGBA PNG. The mask color
//! is derived from a CRC-32C hash of the label name into a fixed palette, so
//! repeated runs color the same label identically.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConvertError;
use crate::model::Task;
use crate::report::EmissionReport;

const RUN_WIDTHS: [u32; 4] = [4, 8, 16, 32];

/// A dense boolean pixel grid in row-major order.
#[derive(Clone, PartialEq, Eq)]
pub struct MaskGrid {
    pub width: u32,
    pub height: u32,
    pixels: Vec<bool>,
}

impl MaskGrid {
    /// Create an all-unset grid.
    pub fn new(width: u32, height: u32) -> Self {
        MaskGrid {
            width,
            height,
            pixels: vec![false; (width as usize) * (height as usize)],
        }
    }

    /// Wrap an existing row-major pixel vector.
    ///
    /// Panics if the vector length does not match the dimensions; callers
    /// construct grids from data they already sized.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<bool>) -> Self {
        assert_eq!(pixels.len(), (width as usize) * (height as usize));
        MaskGrid {
            width,
            height,
            pixels,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.pixels[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.pixels[(y * self.width + x) as usize] = value;
    }

    /// Row-major pixel slice.
    pub fn pixels(&self) -> &[bool] {
        &self.pixels
    }

    /// Number of set pixels.
    pub fn area(&self) -> usize {
        self.pixels.iter().filter(|&&p| p).count()
    }
}

impl fmt::Debug for MaskGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskGrid")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("area", &self.area())
            .finish()
    }
}

struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        BitReader { bytes, pos: 0 }
    }

    fn read(&mut self, bits: u32) -> Result<u32, ConvertError> {
        let mut value = 0u32;
        for _ in 0..bits {
            let byte = self
                .bytes
                .get(self.pos / 8)
                .ok_or_else(|| ConvertError::MaskDecode("truncated RLE stream".to_string()))?;
            let bit = (byte >> (7 - (self.pos % 8))) & 1;
            value = (value << 1) | u32::from(bit);
            self.pos += 1;
        }
        Ok(value)
    }
}

struct BitWriter {
    bytes: Vec<u8>,
    bit: u8,
}

impl BitWriter {
    fn new() -> Self {
        BitWriter {
            bytes: Vec::new(),
            bit: 0,
        }
    }

    fn write(&mut self, value: u32, bits: u32) {
        for shift in (0..bits).rev() {
            if self.bit == 0 {
                self.bytes.push(0);
            }
            let bit = ((value >> shift) & 1) as u8;
            let last = self.bytes.len() - 1;
            self.bytes[last] |= bit << (7 - self.bit);
            self.bit = (self.bit + 1) % 8;
        }
    }

    fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Decode a packed RLE byte stream into a dense mask.
pub fn decode(rle: &[u8], width: u32, height: u32) -> Result<MaskGrid, ConvertError> {
    let expected = (width as u64) * (height as u64);
    let mut reader = BitReader::new(rle);

    let declared = u64::from(reader.read(32)?);
    if declared != expected {
        return Err(ConvertError::MaskDecode(format!(
            "RLE declares {declared} pixels but the mask is {width}x{height} = {expected}"
        )));
    }

    let mut pixels = Vec::with_capacity(expected as usize);
    let mut set = false;

    while (pixels.len() as u64) < expected {
        let class = reader.read(2)?;
        let run = u64::from(reader.read(RUN_WIDTHS[class as usize])?);

        if pixels.len() as u64 + run > expected {
            return Err(ConvertError::MaskDecode(format!(
                "run of {run} pixels overflows the {expected}-pixel mask"
            )));
        }

        pixels.extend(std::iter::repeat_n(set, run as usize));
        set = !set;
    }

    Ok(MaskGrid::from_pixels(width, height, pixels))
}

/// Encode a dense mask as a packed RLE byte stream.
pub fn encode(grid: &MaskGrid) -> Vec<u8> {
    let total = grid.pixels().len() as u32;
    let mut writer = BitWriter::new();
    writer.write(total, 32);

    let mut expect = false;
    let mut pixels = grid.pixels().iter();
    let mut run: u32 = 0;

    // The stream always starts with the unset run, so a leading set pixel
    // produces a zero-length first run.
    loop {
        match pixels.next() {
            Some(&pixel) if pixel == expect => run += 1,
            Some(_) => {
                write_run(&mut writer, run);
                expect = !expect;
                run = 1;
            }
            None => break,
        }
    }
    if run > 0 {
        write_run(&mut writer, run);
    }

    writer.finish()
}

fn write_run(writer: &mut BitWriter, run: u32) {
    let class = RUN_WIDTHS
        .iter()
        .position(|&bits| bits == 32 || run < (1 << bits))
        .unwrap_or(3) as u32;
    writer.write(class, 2);
    writer.write(run, RUN_WIDTHS[class as usize]);
}

/// Fixed palette for labeled masks. Indexed by CRC-32C of the label name.
const PALETTE: [[u8; 3]; 12] = [
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
    [240, 50, 230],
    [210, 245, 60],
    [250, 190, 190],
    [0, 128, 128],
    [128, 128, 0],
];

/// Deterministic RGB color for a label name.
pub fn label_color(label: &str) -> [u8; 3] {
    let hash = crc32c::crc32c(label.as_bytes());
    PALETTE[(hash as usize) % PALETTE.len()]
}

/// Write a mask as an RGBA PNG: label-colored where set, transparent elsewhere.
pub fn write_mask_png(path: &Path, grid: &MaskGrid, label: &str) -> Result<(), ConvertError> {
    let [r, g, b] = label_color(label);
    let mut raster = image::RgbaImage::new(grid.width, grid.height);

    for y in 0..grid.height {
        for x in 0..grid.width {
            if grid.get(x, y) {
                raster.put_pixel(x, y, image::Rgba([r, g, b, 255]));
            }
        }
    }

    raster
        .save(path)
        .map_err(|err| ConvertError::write("png", path, err.to_string()))
}

/// Export every brush result of every task as a PNG raster.
///
/// Masks are named `task-{id}-{from_name}-{index}-{label}.png`, so repeated
/// runs produce identical file sets. Results with a corrupt RLE stream or
/// without recorded dimensions are skipped with a warning; a task with no
/// decodable brush result counts as skipped.
pub fn export_masks<I>(tasks: I, output_dir: &Path) -> Result<EmissionReport, ConvertError>
where
    I: IntoIterator<Item = Task>,
{
    std::fs::create_dir_all(output_dir)?;
    let mut report = EmissionReport::default();

    for task in tasks {
        report.tasks_total += 1;
        let mut wrote_any = false;
        let mut saw_brush = false;

        for annotation in &task.annotations {
            for (idx, result) in annotation.result.iter().enumerate() {
                let Some(brush) = brush_payload(result) else {
                    continue;
                };
                saw_brush = true;

                let Some((width, height)) = result
                    .original_width
                    .zip(result.original_height)
                    .filter(|&(w, h)| w > 0 && h > 0)
                else {
                    report.warn(format!(
                        "task {}: brush result '{}' has no recorded dimensions; skipped",
                        task.id, result.from_name
                    ));
                    continue;
                };

                let grid = match decode(&brush.rle, width, height) {
                    Ok(grid) => grid,
                    Err(err) => {
                        report.warn(format!(
                            "task {}: brush result '{}': {err}; skipped",
                            task.id, result.from_name
                        ));
                        continue;
                    }
                };

                let label = brush
                    .labels
                    .first()
                    .map(String::as_str)
                    .unwrap_or("unlabeled");
                let path = mask_path(output_dir, task.id, &result.from_name, idx, label);
                write_mask_png(&path, &grid, label)?;
                wrote_any = true;
            }
        }

        if saw_brush && !wrote_any {
            report.tasks_skipped += 1;
        }
    }

    Ok(report)
}

struct BrushPayload {
    rle: Vec<u8>,
    labels: Vec<String>,
}

fn brush_payload(result: &crate::model::RawResult) -> Option<BrushPayload> {
    let value = result.value.as_object()?;
    let rle = value
        .get("rle")?
        .as_array()?
        .iter()
        .map(|byte| byte.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect::<Option<Vec<u8>>>()?;
    let labels = value
        .get("brushlabels")
        .and_then(|labels| labels.as_array())
        .map(|labels| {
            labels
                .iter()
                .filter_map(|label| label.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default();

    Some(BrushPayload { rle, labels })
}

fn mask_path(dir: &Path, task_id: i64, from_name: &str, idx: usize, label: &str) -> PathBuf {
    let sanitize = |s: &str| s.replace(['/', '\\', ' '], "_");
    dir.join(format!(
        "task-{task_id}-{}-{idx}-{}.png",
        sanitize(from_name),
        sanitize(label)
    ))
}
