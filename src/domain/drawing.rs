// ============================================================
// Layer 3 — Drawing Record Domain Type
// ============================================================
// One logged drawing, exactly as it appears on one line of an
// .ndjson corpus file:
//
//   {"word":"cat","recognized":true,
//    "drawing":[[[x0,x1,...],[y0,y1,...]], ...]}
//
// Every stroke is a polyline on a 256x256 grid. Extra fields
// (countrycode, timestamp, key_id) are ignored by serde.
//
// Reference: Rust Book §5 (Structs), serde docs (try_from)

use serde::Deserialize;

/// A single drawing read back from the corpus. Never mutated.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DrawingRecord {
    /// Category label, e.g. "cat"
    pub word: String,

    /// Upstream flag: was the drawing recognised by the game's classifier
    #[serde(default)]
    pub recognized: bool,

    /// Ordered strokes making up the drawing
    pub drawing: Vec<Stroke>,
}

/// One brush stroke: parallel x and y coordinate arrays.
///
/// The raw (non-simplified) dataset carries a third timing
/// array per stroke; only the first two are kept.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<Vec<i32>>")]
pub struct Stroke {
    pub xs: Vec<i32>,
    pub ys: Vec<i32>,
}

impl TryFrom<Vec<Vec<i32>>> for Stroke {
    type Error = String;

    fn try_from(mut axes: Vec<Vec<i32>>) -> Result<Self, Self::Error> {
        if axes.len() < 2 {
            return Err(format!(
                "stroke needs x and y coordinate arrays, found {} array(s)",
                axes.len()
            ));
        }
        axes.truncate(2);
        let ys = axes.pop().unwrap_or_default();
        let xs = axes.pop().unwrap_or_default();
        Ok(Self { xs, ys })
    }
}

impl Stroke {
    /// Iterate the stroke's points as (x, y) pairs.
    /// Mismatched array lengths are cut to the shorter one.
    pub fn points(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }

    /// Consecutive point pairs, i.e. the segments to draw.
    pub fn segments(&self) -> impl Iterator<Item = ((i32, i32), (i32, i32))> + '_ {
        self.points().zip(self.points().skip(1))
    }
}

impl DrawingRecord {
    /// Parse one corpus line, trailing newline allowed.
    pub fn from_json(line: impl AsRef<[u8]>) -> serde_json::Result<Self> {
        serde_json::from_slice(line.as_ref())
    }
}
