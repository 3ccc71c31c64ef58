// ============================================================
// Layer 4 — Sample Materializer
// ============================================================
// Turns one index slot into a training Sample.
//
// Padding slot:
//   all-zero 64x64 bitmap, label "nothing"
//
// Record slot:
//   1. open the owning file, seek to the stored byte offset,
//      read exactly one line, parse it as a DrawingRecord
//   2. draw every stroke segment on a 256x256 canvas
//      (background 0, foreground 255, brush width 5)
//   3. downsample to 64x64 with a Lanczos filter
//   4. scale to [0,1] by dividing by 256
//   5. binarise: >= 0.1 → 1.0, otherwise 0.0
//
// Step 5 makes training data look like what the browser
// canvas delivers at inference time: two-colour jagged pixels.
//
// Every call opens its own file handle, so materialisation of
// different samples is independent and safe to run in parallel.
//
// Reference: image crate docs (imageops::resize)

use std::{
    fs::File,
    io::{BufRead, BufReader, Seek, SeekFrom},
    path::Path,
};

use image::{imageops, imageops::FilterType, GrayImage, Luma};

use crate::data::indexer::{CorpusIndex, IndexEntry};
use crate::domain::{
    drawing::DrawingRecord,
    sample::{Bitmap, Sample},
};
use crate::error::{PipelineError, PipelineResult};

/// Side length of the grid drawings are recorded on.
pub const CANVAS_SIZE: u32 = 256;
/// Brush width used for every stroke, in canvas pixels.
pub const BRUSH_WIDTH: f32 = 5.0;
/// Ink value for drawn pixels.
pub const FOREGROUND: u8 = 255;
/// Normalised intensity at or above which a pixel becomes 1.0.
pub const BINARIZE_THRESHOLD: f32 = 0.1;
/// Side length of the bitmaps fed to the model.
pub const SAMPLE_SIZE: u32 = 64;

/// What a logical dataset index resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSlot {
    Record(IndexEntry),
    Padding,
}

// ─── Rasterizer ───────────────────────────────────────────────────────────────
/// Deterministic strokes → binary bitmap conversion.
#[derive(Debug, Clone, Copy)]
pub struct Rasterizer {
    output_size: u32,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new(SAMPLE_SIZE)
    }
}

impl Rasterizer {
    pub fn new(output_size: u32) -> Self {
        Self { output_size }
    }

    pub fn output_size(&self) -> usize {
        self.output_size as usize
    }

    /// Draw all strokes at full 256x256 resolution.
    pub fn render_canvas(&self, record: &DrawingRecord) -> GrayImage {
        let mut canvas = GrayImage::new(CANVAS_SIZE, CANVAS_SIZE);
        for stroke in &record.drawing {
            for (from, to) in stroke.segments() {
                draw_wide_line(&mut canvas, from, to, BRUSH_WIDTH);
            }
        }
        canvas
    }

    /// Full pipeline: render, downsample, normalise, binarise.
    pub fn rasterize(&self, record: &DrawingRecord) -> Bitmap {
        let canvas  = self.render_canvas(record);
        let resized = imageops::resize(&canvas, self.output_size, self.output_size, FilterType::Lanczos3);

        let pixels: Vec<f32> = resized
            .into_raw()
            .into_iter()
            .map(|v| if f32::from(v) / 256.0 >= BINARIZE_THRESHOLD { 1.0 } else { 0.0 })
            .collect();

        let side   = self.output_size();
        let bitmap = Bitmap::from_pixels(side, side, pixels).unwrap_or_else(|| Bitmap::zeros(side, side));
        debug_assert!(bitmap.is_binary());
        bitmap
    }

    /// The all-zero bitmap used for padding samples.
    pub fn blank(&self) -> Bitmap {
        Bitmap::zeros(self.output_size(), self.output_size())
    }
}

/// Fill every pixel within `width / 2` of the segment, measured
/// perpendicular to it, without rounded end caps. A zero-length
/// segment paints the single pixel under it.
fn draw_wide_line(canvas: &mut GrayImage, from: (i32, i32), to: (i32, i32), width: f32) {
    let (w, h) = canvas.dimensions();
    let (max_x, max_y) = (w as i32 - 1, h as i32 - 1);
    let ink = Luma([FOREGROUND]);

    if from == to {
        let (x, y) = from;
        if (0..=max_x).contains(&x) && (0..=max_y).contains(&y) {
            canvas.put_pixel(x as u32, y as u32, ink);
        }
        return;
    }

    let half   = width / 2.0;
    let reach  = half.ceil() as i32;
    let (ax, ay) = (from.0 as f32, from.1 as f32);
    let (dx, dy) = ((to.0 - from.0) as f32, (to.1 - from.1) as f32);
    let len_sq = dx * dx + dy * dy;

    let x_lo = (from.0.min(to.0) - reach).max(0);
    let x_hi = (from.0.max(to.0) + reach).min(max_x);
    let y_lo = (from.1.min(to.1) - reach).max(0);
    let y_hi = (from.1.max(to.1) + reach).min(max_y);

    for py in y_lo..=y_hi {
        for px in x_lo..=x_hi {
            let (vx, vy) = (px as f32 - ax, py as f32 - ay);
            let t = (vx * dx + vy * dy) / len_sq;
            if !(0.0..=1.0).contains(&t) {
                continue;
            }
            let cross = vx * dy - vy * dx;
            if cross * cross <= half * half * len_sq {
                canvas.put_pixel(px as u32, py as u32, ink);
            }
        }
    }
}

// ─── Record Access ────────────────────────────────────────────────────────────

/// Reopen `path`, seek to `offset` and parse the single line there.
pub fn read_record(path: &Path, offset: u64) -> PipelineResult<DrawingRecord> {
    let read_err = |source| PipelineError::Read { path: path.to_path_buf(), source };

    let mut file = File::open(path).map_err(read_err)?;
    file.seek(SeekFrom::Start(offset)).map_err(read_err)?;

    let mut line = Vec::new();
    BufReader::new(file).read_until(b'\n', &mut line).map_err(read_err)?;

    DrawingRecord::from_json(&line).map_err(|source| PipelineError::MalformedRecord {
        path: path.to_path_buf(),
        offset,
        source,
    })
}

// ─── Materializer ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, Default)]
pub struct Materializer {
    rasterizer: Rasterizer,
}

impl Materializer {
    pub fn new(rasterizer: Rasterizer) -> Self {
        Self { rasterizer }
    }

    /// Build the sample for `slot`. The label is resolved through
    /// the index's frozen vocabulary; an unknown label is fatal.
    pub fn materialize(&self, index: &CorpusIndex, slot: SampleSlot) -> PipelineResult<Sample> {
        let vocabulary = &index.vocabulary;
        let entry = match slot {
            SampleSlot::Padding => {
                return Ok(Sample { bitmap: self.rasterizer.blank(), label: vocabulary.nothing_id() });
            }
            SampleSlot::Record(entry) => entry,
        };

        let path = index.file_path(entry.file_id).ok_or_else(|| {
            PipelineError::invalid_config(format!("index entry refers to unknown file id {}", entry.file_id))
        })?;
        let record = read_record(&path, entry.byte_offset)?;
        let label  = vocabulary
            .id_of(&record.word)
            .ok_or_else(|| PipelineError::UnknownLabel(record.word.clone()))?;

        let bitmap = self.rasterizer.rasterize(&record);
        if bitmap.foreground_count() == 0 {
            tracing::debug!("'{}' @ byte {}: drawing rasterized blank", path.display(), entry.byte_offset);
        }
        Ok(Sample { bitmap, label })
    }
}
