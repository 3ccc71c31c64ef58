// ============================================================
// Layer 4 — Corpus Indexer
// ============================================================
// Scans a directory of .ndjson drawing files ONCE and builds a
// byte-addressable index over every recognised drawing.
//
// For each file (sorted by name):
//   - read line by line, keeping a running byte offset
//     (raw line length including the terminator)
//   - pull the label out of the FIRST line only, with a regex
//     instead of a full JSON parse; every line in a file
//     shares the same label
//   - admit a line to the index only if it contains
//     "recognized":true; skipped lines still advance the offset
//
// After all files: freeze the vocabulary (appends "nothing")
// and compute the padding needed to make the sample count an
// exact multiple of the batch size.
//
// Reference: regex crate docs (bytes::Regex)
//            Rust Book §12 (I/O and File Handling)

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::vocabulary::{LabelVocabulary, VocabularyBuilder};
use crate::error::{PipelineError, PipelineResult};

/// File extension of corpus files.
pub const CORPUS_EXTENSION: &str = "ndjson";

// ─── Index Types ──────────────────────────────────────────────────────────────

/// Location of one record: which file, and where its line starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub file_id:     u32,
    pub byte_offset: u64,
}

/// A corpus file as seen at indexing time. The list of these
/// (name + size) doubles as the corpus fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusFile {
    pub name:       String,
    pub size_bytes: u64,
}

/// Everything the indexer produces. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusIndex {
    /// Directory the file names are relative to
    pub root:           PathBuf,
    pub files:          Vec<CorpusFile>,
    pub entries:        Vec<IndexEntry>,
    pub vocabulary:     LabelVocabulary,
    /// Batch size the padding was computed for
    pub batch_size:     usize,
    /// Vocabulary padding multiple used when freezing, if any
    pub label_multiple: Option<usize>,
    pub padding_length: usize,
}

impl CorpusIndex {
    /// Number of real (recognised) records.
    pub fn real_len(&self) -> usize {
        self.entries.len()
    }

    /// Real records plus padding; always a multiple of `batch_size`.
    pub fn len(&self) -> usize {
        self.entries.len() + self.padding_length
    }

    /// Absolute path of the file an entry points into.
    pub fn file_path(&self, file_id: u32) -> Option<PathBuf> {
        self.files
            .get(file_id as usize)
            .map(|f| self.root.join(&f.name))
    }
}

/// Padding so that `count + padding` is a multiple of `batch_size`.
/// Zero when `count` already is one.
pub fn padding_length(count: usize, batch_size: usize) -> usize {
    match count % batch_size {
        0 => 0,
        rem => batch_size - rem,
    }
}

/// List corpus files in `dir`, sorted by name.
pub fn list_corpus_files(dir: &Path) -> PipelineResult<Vec<CorpusFile>> {
    let unavailable = |source| PipelineError::CorpusUnavailable {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(unavailable)? {
        let entry = entry.map_err(unavailable)?;
        let path  = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(CORPUS_EXTENSION) {
            continue;
        }
        // Follows symlinks, unlike `DirEntry::metadata`.
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("Skipping dangling corpus link: {}", path.display());
                continue;
            }
            Err(e) => return Err(unavailable(e)),
        };
        if !metadata.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!("Skipping corpus file with non UTF-8 name: {}", path.display());
            continue;
        };
        files.push(CorpusFile { name: name.to_string(), size_bytes: metadata.len() });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

// ─── Line Matcher ─────────────────────────────────────────────────────────────
// Lightweight field extraction on raw line bytes.
struct LineMatcher {
    word:       Regex,
    recognized: Regex,
}

impl LineMatcher {
    fn new() -> PipelineResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| PipelineError::invalid_config(format!("bad pattern {pattern}: {e}")))
        };
        Ok(Self {
            word:       compile(r#""word":"([\w\s-]+)""#)?,
            recognized: compile(r#""recognized":true"#)?,
        })
    }

    fn word(&self, line: &[u8]) -> Option<String> {
        let caps = self.word.captures(line)?;
        let word = caps.get(1)?;
        std::str::from_utf8(word.as_bytes()).ok().map(str::to_string)
    }

    fn is_recognized(&self, line: &[u8]) -> bool {
        self.recognized.is_match(line)
    }
}

// ─── CorpusIndexer ────────────────────────────────────────────────────────────
pub struct CorpusIndexer {
    root:           PathBuf,
    batch_size:     usize,
    label_multiple: Option<usize>,
}

impl CorpusIndexer {
    pub fn new(root: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self { root: root.into(), batch_size, label_multiple: None }
    }

    /// Pad the frozen vocabulary to a multiple of `multiple` labels.
    pub fn with_label_multiple(mut self, multiple: Option<usize>) -> Self {
        self.label_multiple = multiple;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn label_multiple(&self) -> Option<usize> {
        self.label_multiple
    }

    /// Scan every corpus file and build the index.
    pub fn build(&self) -> PipelineResult<CorpusIndex> {
        if self.batch_size == 0 {
            return Err(PipelineError::invalid_config("batch size must be positive"));
        }

        tracing::info!("Data folder: {}", self.root.display());
        let files = list_corpus_files(&self.root)?;
        if files.is_empty() {
            return Err(PipelineError::EmptyCorpus {
                path:      self.root.clone(),
                extension: CORPUS_EXTENSION.to_string(),
            });
        }

        let matcher     = LineMatcher::new()?;
        let mut vocab   = VocabularyBuilder::new();
        let mut entries = Vec::new();

        for (file_id, file) in files.iter().enumerate() {
            let path = self.root.join(&file.name);
            tracing::info!("Indexing {}", file.name);
            let before = entries.len();
            scan_file(&path, file_id as u32, &matcher, &mut vocab, &mut entries)?;
            tracing::debug!("{}: {} recognised records", file.name, entries.len() - before);
        }

        let vocabulary     = vocab.freeze(self.label_multiple);
        let padding_length = padding_length(entries.len(), self.batch_size);
        tracing::info!(
            "Indexed {} records across {} files, {} labels, padding length {}",
            entries.len(),
            files.len(),
            vocabulary.len(),
            padding_length
        );

        Ok(CorpusIndex {
            root: self.root.clone(),
            files,
            entries,
            vocabulary,
            batch_size: self.batch_size,
            label_multiple: self.label_multiple,
            padding_length,
        })
    }
}

/// Scan one file, interning its label and pushing one entry
/// per recognised line.
fn scan_file(
    path:    &Path,
    file_id: u32,
    matcher: &LineMatcher,
    vocab:   &mut VocabularyBuilder,
    entries: &mut Vec<IndexEntry>,
) -> PipelineResult<()> {
    let read_err = |source| PipelineError::Read { path: path.to_path_buf(), source };

    let mut reader      = BufReader::new(File::open(path).map_err(read_err)?);
    let mut line        = Vec::new();
    let mut byte_offset = 0u64;
    let mut line_number = 0usize;

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).map_err(read_err)?;
        if n == 0 {
            break;
        }
        line_number += 1;

        if line_number == 1 {
            let word = matcher
                .word(&line)
                .ok_or_else(|| PipelineError::MissingLabel { path: path.to_path_buf(), line: 1 })?;
            vocab.intern(&word);
        }

        if matcher.is_recognized(&line) {
            entries.push(IndexEntry { file_id, byte_offset });
        }
        byte_offset += n as u64;
    }

    if line_number == 0 {
        return Err(PipelineError::EmptyFile { path: path.to_path_buf() });
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::{Read, Seek, SeekFrom};

    fn record(word: &str, recognized: bool) -> String {
        format!(
            r#"{{"word":"{word}","countrycode":"US","recognized":{recognized},"drawing":[[[0,10],[0,0]]]}}"#
        )
    }

    fn write_corpus(dir: &Path, name: &str, lines: &[String]) {
        let mut body = lines.join("\n");
        body.push('\n');
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_two_files_three_recognised_batch_four() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), "cat.ndjson", &[record("cat", true), record("cat", false), record("cat", true)]);
        write_corpus(dir.path(), "dog.ndjson", &[record("dog", true)]);

        let index = CorpusIndexer::new(dir.path(), 4).build().unwrap();
        assert_eq!(index.real_len(), 3);
        assert_eq!(index.padding_length, 1);
        assert_eq!(index.len(), 4);
        assert_eq!(index.vocabulary.names(), &["cat", "dog", "nothing"]);
    }

    #[test]
    fn test_offsets_locate_line_starts() {
        let dir   = tempfile::tempdir().unwrap();
        let lines = vec![record("cat", true), record("cat", false), record("cat", true)];
        write_corpus(dir.path(), "cat.ndjson", &lines);

        let index = CorpusIndexer::new(dir.path(), 2).build().unwrap();
        assert_eq!(index.entries.len(), 2);
        // The skipped unrecognised line still counts toward the offset
        let expected = (lines[0].len() + 1 + lines[1].len() + 1) as u64;
        assert_eq!(index.entries[1].byte_offset, expected);

        let mut f = File::open(index.file_path(0).unwrap()).unwrap();
        f.seek(SeekFrom::Start(index.entries[1].byte_offset)).unwrap();
        let mut rest = String::new();
        f.read_to_string(&mut rest).unwrap();
        assert!(rest.starts_with(&lines[2]));
    }

    #[test]
    fn test_crlf_terminators_count_toward_offset() {
        let dir  = tempfile::tempdir().unwrap();
        let body = format!("{}\r\n{}\r\n", record("cat", true), record("cat", true));
        fs::write(dir.path().join("cat.ndjson"), &body).unwrap();

        let index = CorpusIndexer::new(dir.path(), 2).build().unwrap();
        assert_eq!(index.entries[1].byte_offset, (record("cat", true).len() + 2) as u64);
    }

    #[test]
    fn test_other_extensions_are_ignored_and_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), "zebra.ndjson", &[record("zebra", true)]);
        write_corpus(dir.path(), "apple.ndjson", &[record("apple", true)]);
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let index = CorpusIndexer::new(dir.path(), 1).build().unwrap();
        let names: Vec<_> = index.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["apple.ndjson", "zebra.ndjson"]);
        assert_eq!(index.vocabulary.id_of("apple"), Some(0));
        assert_eq!(index.padding_length, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_are_indexed() {
        let store = tempfile::tempdir().unwrap();
        let dir   = tempfile::tempdir().unwrap();
        write_corpus(store.path(), "full_cat.ndjson", &[record("cat", true), record("cat", true)]);
        std::os::unix::fs::symlink(store.path().join("full_cat.ndjson"), dir.path().join("cat.ndjson")).unwrap();
        std::os::unix::fs::symlink(store.path().join("gone.ndjson"), dir.path().join("gone.ndjson")).unwrap();

        let index = CorpusIndexer::new(dir.path(), 2).build().unwrap();
        let names: Vec<_> = index.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["cat.ndjson"]);
        assert!(index.files[0].size_bytes > 0);
        assert_eq!(index.real_len(), 2);
        assert_eq!(index.vocabulary.id_of("cat"), Some(0));
    }

    #[test]
    fn test_label_multiple_pads_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), "cat.ndjson", &[record("cat", true)]);
        let index = CorpusIndexer::new(dir.path(), 8)
            .with_label_multiple(Some(8))
            .build()
            .unwrap();
        assert_eq!(index.vocabulary.len(), 8);
        assert_eq!(index.label_multiple, Some(8));
    }

    #[test]
    fn test_first_line_without_label_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path(), "bad.ndjson", &[r#"{"recognized":true,"drawing":[]}"#.to_string()]);
        let err = CorpusIndexer::new(dir.path(), 4).build().unwrap_err();
        assert!(matches!(err, PipelineError::MissingLabel { line: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::FatalInput);
    }

    #[test]
    fn test_empty_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.ndjson"), "").unwrap();
        let err = CorpusIndexer::new(dir.path(), 4).build().unwrap_err();
        assert!(matches!(err, PipelineError::EmptyFile { .. }));
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = CorpusIndexer::new(dir.path().join("nope"), 4).build().unwrap_err();
        assert!(matches!(err, PipelineError::CorpusUnavailable { .. }));
    }

    #[test]
    fn test_padding_length() {
        assert_eq!(padding_length(3, 4), 1);
        assert_eq!(padding_length(8, 4), 0);
        assert_eq!(padding_length(0, 4), 0);
        assert_eq!(padding_length(1001, 1000), 999);
    }
}
