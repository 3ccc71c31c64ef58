// ============================================================
// Layer 3 — Sample / Bitmap Domain Types
// ============================================================
// A Sample is what the batch source hands to the training
// step: a fixed-size single-channel bitmap plus a label id.
//
// Bitmap values are f32 in row-major order. Real samples are
// binarised (every value is 0.0 or 1.0); padding samples are
// all zeros. Both have identical shape.

/// Fixed-size single-channel image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    width:  usize,
    height: usize,
    pixels: Vec<f32>,
}

impl Bitmap {
    /// An all-background bitmap.
    pub fn zeros(width: usize, height: usize) -> Self {
        Self { width, height, pixels: vec![0.0; width * height] }
    }

    /// Wrap an existing pixel buffer. Returns None if the
    /// buffer length does not match `width * height`.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<f32>) -> Option<Self> {
        (pixels.len() == width * height).then_some(Self { width, height, pixels })
    }

    pub fn width(&self) -> usize { self.width }

    pub fn height(&self) -> usize { self.height }

    pub fn pixels(&self) -> &[f32] { &self.pixels }

    /// Number of pixels set to foreground (non-zero).
    pub fn foreground_count(&self) -> usize {
        self.pixels.iter().filter(|&&v| v != 0.0).count()
    }

    /// True if every pixel is exactly 0.0 or 1.0.
    pub fn is_binary(&self) -> bool {
        self.pixels.iter().all(|&v| v == 0.0 || v == 1.0)
    }
}

/// One training example. Built lazily, never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub bitmap: Bitmap,
    pub label:  usize,
}

/// A fixed-size group of samples flattened for tensor creation.
/// `images` holds `len * height * width` values, sample-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub images: Vec<f32>,
    pub labels: Vec<usize>,
    pub height: usize,
    pub width:  usize,
}

impl SampleBatch {
    /// Stack samples into one flat batch. All bitmaps must share
    /// the shape of the first; `None` for an empty or ragged input.
    pub fn from_samples(samples: Vec<Sample>) -> Option<Self> {
        let (height, width) = {
            let first = samples.first()?;
            (first.bitmap.height(), first.bitmap.width())
        };
        let mut images = Vec::with_capacity(samples.len() * height * width);
        let mut labels = Vec::with_capacity(samples.len());
        for sample in samples {
            if sample.bitmap.height() != height || sample.bitmap.width() != width {
                return None;
            }
            images.extend_from_slice(sample.bitmap.pixels());
            labels.push(sample.label);
        }
        Some(Self { images, labels, height, width })
    }

    pub fn len(&self) -> usize { self.labels.len() }
}
