// ============================================================
// Layer 6 — Index Cache
// ============================================================
// Persists the CorpusIndex so scanning a multi-gigabyte corpus
// is a one-time cost.
//
// File layout:
//   [4 bytes]  magic  "QDIX"
//   [4 bytes]  format version, little endian
//   [rest]     bincode (serde, standard config) CorpusIndex
//
// A cached index is reused only if it still describes the live
// corpus: same sorted file names and byte sizes, same batch
// size, same vocabulary padding multiple. Anything else (stale
// fingerprint, old format, undecodable bytes) is a cache miss
// and the caller rebuilds.
//
// Writes go to a temp file in the same directory and are then
// renamed over the target, so a crash never leaves a file that
// the next load would accept.
//
// Reference: bincode 2 docs (serde::encode_to_vec)
//            tempfile docs (NamedTempFile::persist)

use std::{
    fs,
    io::Write,
    path::PathBuf,
};

use crate::data::indexer::{list_corpus_files, CorpusIndex, CorpusIndexer};
use crate::error::{PipelineError, PipelineResult};

const MAGIC: &[u8; 4] = b"QDIX";
/// Bump whenever CorpusIndex's serialised shape changes.
pub const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8;

/// What a cached index must match to be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub root:           PathBuf,
    pub batch_size:     usize,
    pub label_multiple: Option<usize>,
}

impl From<&CorpusIndexer> for CacheKey {
    fn from(indexer: &CorpusIndexer) -> Self {
        Self {
            root:           indexer.root().to_path_buf(),
            batch_size:     indexer.batch_size(),
            label_multiple: indexer.label_multiple(),
        }
    }
}

pub struct IndexCache {
    path: PathBuf,
}

impl IndexCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Return the cached index, or build and store a fresh one.
    pub fn load_or_build(&self, indexer: &CorpusIndexer) -> PipelineResult<CorpusIndex> {
        if let Some(index) = self.load(&CacheKey::from(indexer))? {
            tracing::info!("Loaded {}", self.path.display());
            return Ok(index);
        }
        let index = indexer.build()?;
        self.store(&index)?;
        tracing::info!("Saved {}", self.path.display());
        Ok(index)
    }

    /// Load a cached index that still matches `key`.
    /// `Ok(None)` means "rebuild"; only a failure to list the live
    /// corpus directory is an error.
    pub fn load(&self, key: &CacheKey) -> PipelineResult<Option<CorpusIndex>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                tracing::warn!("Cannot read index cache '{}': {e}", self.path.display());
                return Ok(None);
            }
        };

        let Some(mut index) = self.decode(&bytes) else {
            return Ok(None);
        };

        if index.batch_size != key.batch_size || index.label_multiple != key.label_multiple {
            tracing::warn!(
                "Index cache was built for batch size {} (label multiple {:?}), need {} ({:?}); rebuilding",
                index.batch_size,
                index.label_multiple,
                key.batch_size,
                key.label_multiple
            );
            return Ok(None);
        }

        let live = list_corpus_files(&key.root)?;
        if live != index.files {
            tracing::warn!(
                "Corpus in '{}' changed since the index was cached ({} files cached, {} live); rebuilding",
                key.root.display(),
                index.files.len(),
                live.len()
            );
            return Ok(None);
        }

        index.root = key.root.clone();
        Ok(Some(index))
    }

    /// Atomically write `index` to the cache path.
    pub fn store(&self, index: &CorpusIndex) -> PipelineResult<()> {
        let payload = bincode::serde::encode_to_vec(index, bincode::config::standard())
            .map_err(|e| PipelineError::CacheEncode { path: self.path.clone(), reason: e.to_string() })?;

        let write_err = |source| PipelineError::Write { path: self.path.clone(), source };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(MAGIC).map_err(write_err)?;
        tmp.write_all(&FORMAT_VERSION.to_le_bytes()).map_err(write_err)?;
        tmp.write_all(&payload).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        tracing::debug!("Wrote {} index bytes to '{}'", payload.len(), self.path.display());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Option<CorpusIndex> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            tracing::warn!("'{}' is not an index cache file; rebuilding", self.path.display());
            return None;
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            tracing::warn!(
                "Index cache format {version} does not match {FORMAT_VERSION}; rebuilding"
            );
            return None;
        }
        match bincode::serde::decode_from_slice(&bytes[HEADER_LEN..], bincode::config::standard()) {
            Ok((index, _)) => Some(index),
            Err(e) => {
                tracing::warn!("Index cache '{}' is corrupt ({e}); rebuilding", self.path.display());
                None
            }
        }
    }
}
