use std::sync::Arc;

use crate::data::indexer::CorpusIndex;
use crate::data::rasterizer::{Materializer, SampleSlot};
use crate::domain::{sample::Sample, traits::SampleSource};
use crate::error::{PipelineError, PipelineResult};

/// Random-access view over a cached corpus index.
///
/// Logical indices below the index's real record count are
/// recognised drawings; the rest up to `len()` are padding slots.
pub struct CorpusDataset {
    index:        Arc<CorpusIndex>,
    materializer: Materializer,
}

impl CorpusDataset {
    pub fn new(index: Arc<CorpusIndex>) -> Self {
        Self { index, materializer: Materializer::default() }
    }

    pub fn with_materializer(mut self, materializer: Materializer) -> Self {
        self.materializer = materializer;
        self
    }

    /// Resolve a logical index to a record entry or a padding slot.
    pub fn slot(&self, index: usize) -> PipelineResult<SampleSlot> {
        let len = self.index.len();
        if index >= len {
            return Err(PipelineError::IndexOutOfRange { index, len });
        }
        Ok(self
            .index
            .entries
            .get(index)
            .map_or(SampleSlot::Padding, |&entry| SampleSlot::Record(entry)))
    }
}

impl SampleSource for CorpusDataset {
    fn len(&self) -> usize {
        self.index.len()
    }

    fn get(&self, index: usize) -> PipelineResult<Sample> {
        let slot = self.slot(index)?;
        self.materializer.materialize(&self.index, slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::indexer::CorpusIndexer;
    use std::fs;

    fn dataset(batch_size: usize) -> (tempfile::TempDir, CorpusDataset) {
        let dir  = tempfile::tempdir().unwrap();
        let line = r#"{"word":"cat","recognized":true,"drawing":[[[0,255],[0,255]]]}"#;
        fs::write(dir.path().join("cat.ndjson"), format!("{line}\n{line}\n{line}\n")).unwrap();
        let index = CorpusIndexer::new(dir.path(), batch_size).build().unwrap();
        (dir, CorpusDataset::new(Arc::new(index)))
    }

    #[test]
    fn test_length_is_multiple_of_batch_size() {
        let (_dir, ds) = dataset(4);
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.len() % 4, 0);
        assert!(ds.len() >= ds.index.real_len());
    }

    #[test]
    fn test_indices_past_real_len_are_padding() {
        let (_dir, ds) = dataset(5);
        let nothing = ds.index.vocabulary.nothing_id();
        for i in ds.index.real_len()..ds.len() {
            assert_eq!(ds.slot(i).unwrap(), SampleSlot::Padding);
            let sample = ds.get(i).unwrap();
            assert_eq!(sample.label, nothing);
            assert_eq!(sample.bitmap.foreground_count(), 0);
        }
    }

    #[test]
    fn test_emitted_labels_stay_inside_vocabulary() {
        let (_dir, ds) = dataset(4);
        let vocab = &ds.index.vocabulary;
        for i in 0..ds.len() {
            let sample = ds.get(i).unwrap();
            assert!(sample.label < vocab.len());
            assert!(!vocab.name_of(sample.label).unwrap().is_empty());
        }
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let (_dir, ds) = dataset(4);
        assert!(matches!(ds.get(4), Err(PipelineError::IndexOutOfRange { index: 4, len: 4 })));
    }
}
